//! Per-symbol records.

use std::fmt;

use crate::intern::{ConstString, StringPool};
use crate::symbols::demangle::Demangler;
use crate::types::{Address, SymbolLanguage, SymbolType};

/// Value carried by a symbol: either a file address or a plain scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolValue
{
    /// Virtual address in the object file's address space.
    FileAddress(Address),
    /// Plain integer (absolute symbols, ObjC ivar offsets, ...).
    Scalar(u64),
}

impl SymbolValue
{
    /// Raw numeric value regardless of interpretation.
    #[must_use]
    pub fn raw(self) -> u64
    {
        match self {
            SymbolValue::FileAddress(address) => address.value(),
            SymbolValue::Scalar(value) => value,
        }
    }
}

impl Default for SymbolValue
{
    fn default() -> Self
    {
        SymbolValue::Scalar(0)
    }
}

/// Mangled/demangled name pair.
///
/// A raw name that looks mangled is stored as the mangled half; anything else
/// is taken to be already readable and stored as the demangled half. The
/// demangled form of a mangled name is filled in lazily by the owning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mangled
{
    mangled: Option<ConstString>,
    demangled: Option<ConstString>,
    demangled_resolved: bool,
}

impl Mangled
{
    /// Build from a raw name as found in the object file.
    pub fn new(pool: &StringPool, raw: &str) -> Self
    {
        if looks_mangled(raw) {
            Self {
                mangled: pool.intern_non_empty(raw),
                demangled: None,
                demangled_resolved: false,
            }
        } else {
            Self {
                mangled: None,
                demangled: pool.intern_non_empty(raw),
                demangled_resolved: true,
            }
        }
    }

    /// Build from both halves when the caller already knows them.
    #[must_use]
    pub fn from_parts(mangled: Option<ConstString>, demangled: Option<ConstString>) -> Self
    {
        Self {
            mangled,
            demangled,
            demangled_resolved: demangled.is_some() || mangled.is_none(),
        }
    }

    #[must_use]
    pub fn mangled_name(&self) -> Option<ConstString>
    {
        self.mangled
    }

    /// Demangled name, if it is known yet.
    #[must_use]
    pub fn demangled_name(&self) -> Option<ConstString>
    {
        self.demangled
    }

    /// Preferred name: demangled when available, otherwise mangled.
    #[must_use]
    pub fn name(&self) -> Option<ConstString>
    {
        self.demangled.or(self.mangled)
    }

    /// Whether `name` matches either half.
    #[must_use]
    pub fn matches(&self, name: ConstString) -> bool
    {
        self.mangled == Some(name) || self.demangled == Some(name)
    }

    pub(crate) fn is_demangled_resolved(&self) -> bool
    {
        self.demangled_resolved
    }

    pub(crate) fn set_demangled(&mut self, demangled: Option<ConstString>)
    {
        self.demangled = demangled;
        self.demangled_resolved = true;
    }

    /// Demangle once and cache the result in the pool.
    pub(crate) fn resolve_demangled(
        &mut self,
        pool: &StringPool,
        demangler: &dyn Demangler,
        language: SymbolLanguage,
    ) -> Option<ConstString>
    {
        if !self.demangled_resolved {
            self.demangled_resolved = true;
            if let Some(mangled) = self.mangled {
                let text = pool.resolve(mangled);
                self.demangled = demangler
                    .demangle(&text, language)
                    .and_then(|demangled| pool.intern_non_empty(&demangled.display));
            }
        }
        self.demangled
    }
}

fn looks_mangled(raw: &str) -> bool
{
    raw.starts_with("_Z") || raw.starts_with("__Z") || raw.starts_with("_R")
}

/// Cut a name at its first linker annotation: an ELF version suffix
/// (`name@VERSION`, `name@@VERSION`) or an ARM linker marker (`name$$stub`).
///
/// ```rust
/// use symdex_core::symbols::strip_linker_annotations;
///
/// assert_eq!(strip_linker_annotations("memcpy@@GLIBC_2.14"), "memcpy");
/// assert_eq!(strip_linker_annotations("foo$$Thumb"), "foo");
/// assert_eq!(strip_linker_annotations("main"), "main");
/// ```
#[must_use]
pub fn strip_linker_annotations(name: &str) -> &str
{
    let at = name.find('@').filter(|&pos| pos > 0);
    let marker = name.find("$$").filter(|&pos| pos > 0);
    match (at, marker) {
        (Some(a), Some(b)) => &name[..a.min(b)],
        (Some(pos), None) | (None, Some(pos)) => &name[..pos],
        (None, None) => name,
    }
}

/// A single entry of a symbol table.
///
/// Records are flat: nesting is expressed through [`Symbol::sibling_index`],
/// the position of the first symbol *after* this one's children, rather than
/// through parent pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol
{
    id: u32,
    mangled: Mangled,
    value: SymbolValue,
    byte_size: u64,
    size_is_synthesized: bool,
    symbol_type: SymbolType,
    language: SymbolLanguage,
    is_debug: bool,
    is_synthetic: bool,
    is_external: bool,
    contains_linker_annotations: bool,
    sibling_index: Option<u32>,
    flags: u32,
}

impl Symbol
{
    /// Create a symbol with the given id, name and type.
    ///
    /// Everything else starts empty; use the `with_*` methods to fill it in.
    #[must_use]
    pub fn new(id: u32, mangled: Mangled, symbol_type: SymbolType, value: SymbolValue) -> Self
    {
        Self {
            id,
            mangled,
            value,
            byte_size: 0,
            size_is_synthesized: false,
            symbol_type,
            language: SymbolLanguage::Unknown,
            is_debug: false,
            is_synthetic: false,
            is_external: false,
            contains_linker_annotations: false,
            sibling_index: None,
            flags: 0,
        }
    }

    /// Shorthand for a code/data symbol at a file address.
    pub fn at_address(pool: &StringPool, id: u32, name: &str, symbol_type: SymbolType, address: u64) -> Self
    {
        let mut symbol = Self::new(
            id,
            Mangled::new(pool, name),
            symbol_type,
            SymbolValue::FileAddress(Address::new(address)),
        );
        symbol.language = SymbolLanguage::guess(name);
        symbol.contains_linker_annotations = strip_linker_annotations(name).len() != name.len();
        symbol
    }

    /// Authoritative byte size as reported by the object file or debug info.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self
    {
        self.set_byte_size(size);
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: SymbolLanguage) -> Self
    {
        self.language = language;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, is_debug: bool) -> Self
    {
        self.is_debug = is_debug;
        self
    }

    #[must_use]
    pub fn with_synthetic(mut self, is_synthetic: bool) -> Self
    {
        self.is_synthetic = is_synthetic;
        self
    }

    #[must_use]
    pub fn with_external(mut self, is_external: bool) -> Self
    {
        self.is_external = is_external;
        self
    }

    #[must_use]
    pub fn with_sibling_index(mut self, sibling_index: u32) -> Self
    {
        self.sibling_index = Some(sibling_index);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self
    {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_linker_annotations(mut self, contains: bool) -> Self
    {
        self.contains_linker_annotations = contains;
        self
    }

    /// Unique id within the owning table.
    #[must_use]
    pub fn id(&self) -> u32
    {
        self.id
    }

    #[must_use]
    pub fn mangled(&self) -> &Mangled
    {
        &self.mangled
    }

    pub(crate) fn mangled_mut(&mut self) -> &mut Mangled
    {
        &mut self.mangled
    }

    /// Preferred display name.
    #[must_use]
    pub fn name(&self) -> Option<ConstString>
    {
        self.mangled.name()
    }

    #[must_use]
    pub fn value(&self) -> SymbolValue
    {
        self.value
    }

    #[must_use]
    pub fn value_is_address(&self) -> bool
    {
        matches!(self.value, SymbolValue::FileAddress(_))
    }

    /// File address, if the value is one.
    #[must_use]
    pub fn file_address(&self) -> Option<Address>
    {
        match self.value {
            SymbolValue::FileAddress(address) => Some(address),
            SymbolValue::Scalar(_) => None,
        }
    }

    /// Byte size, 0 when unknown.
    #[must_use]
    pub fn byte_size(&self) -> u64
    {
        self.byte_size
    }

    #[must_use]
    pub fn byte_size_is_valid(&self) -> bool
    {
        self.byte_size > 0
    }

    /// Whether the size was inferred from layout rather than reported.
    #[must_use]
    pub fn size_is_synthesized(&self) -> bool
    {
        self.size_is_synthesized
    }

    /// Set an authoritative size.
    pub fn set_byte_size(&mut self, size: u64)
    {
        self.byte_size = size;
        self.size_is_synthesized = false;
    }

    /// Record a size inferred from layout.
    ///
    /// Ignored when the symbol already carries an authoritative size; returns
    /// whether the size was applied.
    pub fn set_synthesized_byte_size(&mut self, size: u64) -> bool
    {
        if self.byte_size_is_valid() && !self.size_is_synthesized {
            return false;
        }
        self.byte_size = size;
        self.size_is_synthesized = true;
        true
    }

    /// Forget a previously synthesized size. Authoritative sizes are kept.
    pub(crate) fn clear_synthesized_byte_size(&mut self)
    {
        if self.size_is_synthesized {
            self.byte_size = 0;
            self.size_is_synthesized = false;
        }
    }

    /// Whether `address` falls inside `[file_address, file_address + size)`.
    #[must_use]
    pub fn contains_file_address(&self, address: Address) -> bool
    {
        match self.file_address() {
            Some(base) => address
                .offset_from(base)
                .is_some_and(|offset| offset < self.byte_size),
            None => false,
        }
    }

    #[must_use]
    pub fn symbol_type(&self) -> SymbolType
    {
        self.symbol_type
    }

    pub fn set_symbol_type(&mut self, symbol_type: SymbolType)
    {
        self.symbol_type = symbol_type;
    }

    #[must_use]
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }

    #[must_use]
    pub fn is_trampoline(&self) -> bool
    {
        self.symbol_type == SymbolType::Trampoline
    }

    #[must_use]
    pub fn is_debug(&self) -> bool
    {
        self.is_debug
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool
    {
        self.is_synthetic
    }

    #[must_use]
    pub fn is_external(&self) -> bool
    {
        self.is_external
    }

    #[must_use]
    pub fn contains_linker_annotations(&self) -> bool
    {
        self.contains_linker_annotations
    }

    /// Position of the first symbol following this symbol's children.
    #[must_use]
    pub fn sibling_index(&self) -> Option<u32>
    {
        self.sibling_index
    }

    /// Target-specific flags word (e.g. Mach-O `n_desc`).
    #[must_use]
    pub fn flags(&self) -> u32
    {
        self.flags
    }

    /// Whether this symbol is named `name` and passes the `symbol_type` filter.
    #[must_use]
    pub fn compare(&self, name: ConstString, symbol_type: SymbolType) -> bool
    {
        self.symbol_type.matches(symbol_type) && self.mangled.matches(name)
    }
}

impl fmt::Display for Symbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "id={} type={} value=0x{:x} size=0x{:x}", self.id, self.symbol_type, self.value.raw(), self.byte_size)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_mangled_classification()
    {
        let pool = StringPool::new();
        let cxx = Mangled::new(&pool, "_ZN1A3fooEv");
        assert!(cxx.mangled_name().is_some());
        assert!(cxx.demangled_name().is_none());
        assert!(!cxx.is_demangled_resolved());

        let plain = Mangled::new(&pool, "g_var");
        assert!(plain.mangled_name().is_none());
        assert_eq!(plain.name(), pool.get("g_var"));
    }

    #[test]
    fn test_synthesized_size_never_overwrites_authoritative()
    {
        let pool = StringPool::new();
        let mut sym = Symbol::at_address(&pool, 1, "f", SymbolType::Code, 0x1000).with_size(0x40);
        assert!(!sym.set_synthesized_byte_size(0x10));
        assert_eq!(sym.byte_size(), 0x40);
        assert!(!sym.size_is_synthesized());

        let mut unsized_sym = Symbol::at_address(&pool, 2, "g", SymbolType::Code, 0x2000);
        assert!(unsized_sym.set_synthesized_byte_size(0x10));
        assert!(unsized_sym.size_is_synthesized());
        // A later synthesized size may replace an earlier one.
        assert!(unsized_sym.set_synthesized_byte_size(0x8));
        assert_eq!(unsized_sym.byte_size(), 0x8);
    }

    #[test]
    fn test_contains_file_address()
    {
        let pool = StringPool::new();
        let sym = Symbol::at_address(&pool, 1, "f", SymbolType::Code, 0x1000).with_size(0x10);
        assert!(sym.contains_file_address(Address::new(0x1000)));
        assert!(sym.contains_file_address(Address::new(0x100f)));
        assert!(!sym.contains_file_address(Address::new(0x1010)));
        assert!(!sym.contains_file_address(Address::new(0xfff)));
    }

    #[test]
    fn test_linker_annotations()
    {
        let pool = StringPool::new();
        let sym = Symbol::at_address(&pool, 1, "memcpy@@GLIBC_2.14", SymbolType::Code, 0x1000);
        assert!(sym.contains_linker_annotations());
        assert_eq!(strip_linker_annotations("@weird"), "@weird");
    }
}
