//! Symbol classification types.

use std::fmt;

use bitflags::bitflags;

/// Programming language associated with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolLanguage
{
    /// Rust symbol (legacy `_ZN...17h<hash>E` or v0 `_R...` mangling).
    Rust,
    /// C++ symbol (Itanium mangling).
    Cpp,
    /// Objective-C method (`-[Class selector]` / `+[Class selector]`).
    ObjC,
    /// C symbol or unmangled global.
    C,
    /// Unknown or mixed language.
    #[default]
    Unknown,
}

impl SymbolLanguage
{
    /// Guess the language from the shape of a raw symbol name.
    #[must_use]
    pub fn guess(raw: &str) -> Self
    {
        if raw.starts_with("_R") || (raw.starts_with("_ZN") && is_legacy_rust_hash(raw)) {
            SymbolLanguage::Rust
        } else if raw.starts_with("_Z") || raw.starts_with("__Z") {
            SymbolLanguage::Cpp
        } else if (raw.starts_with("-[") || raw.starts_with("+[")) && raw.ends_with(']') {
            SymbolLanguage::ObjC
        } else {
            SymbolLanguage::Unknown
        }
    }
}

// Legacy Rust symbols end in `17h<16 hex digits>E`.
fn is_legacy_rust_hash(raw: &str) -> bool
{
    let Some(body) = raw.strip_suffix('E') else {
        return false;
    };
    body.len() > 19 && {
        let tail = &body[body.len() - 19..];
        tail.starts_with("17h") && tail[3..].bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::ObjC => "objc",
            SymbolLanguage::C => "c",
            SymbolLanguage::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// What kind of entity a symbol describes.
///
/// `Any` is only meaningful as a query filter; records never carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolType
{
    /// Wildcard used by query filters.
    Any,
    #[default]
    Invalid,
    /// Absolute value that is not an address.
    Absolute,
    Code,
    /// Indirect function that resolves the real implementation at load time.
    Resolver,
    Data,
    /// Stub that jumps somewhere else (PLT entries, Mach-O stubs).
    Trampoline,
    Runtime,
    Exception,
    SourceFile,
    HeaderFile,
    ObjectFile,
    CommonBlock,
    Block,
    Local,
    Param,
    Variable,
    LineEntry,
    ScopeBegin,
    ScopeEnd,
    Additional,
    Compiler,
    Instrumentation,
    Undefined,
    ObjCClass,
    ObjCMetaClass,
    ObjCIVar,
    /// Symbol re-exported from another image.
    ReExported,
}

impl SymbolType
{
    /// Whether a record of type `self` passes a filter of type `filter`.
    #[must_use]
    pub fn matches(self, filter: SymbolType) -> bool
    {
        filter == SymbolType::Any || self == filter
    }

    /// Code and resolver symbols take part in C++ method classification.
    #[must_use]
    pub fn is_code_like(self) -> bool
    {
        matches!(self, SymbolType::Code | SymbolType::Resolver)
    }

    /// Types that count as functions for function-name lookups.
    #[must_use]
    pub fn is_function_like(self) -> bool
    {
        matches!(self, SymbolType::Code | SymbolType::Resolver | SymbolType::ReExported)
    }

    /// Fixed label used by the symbol table dump.
    #[must_use]
    pub fn as_str(self) -> &'static str
    {
        match self {
            SymbolType::Any => "Any",
            SymbolType::Invalid => "Invalid",
            SymbolType::Absolute => "Absolute",
            SymbolType::Code => "Code",
            SymbolType::Resolver => "Resolver",
            SymbolType::Data => "Data",
            SymbolType::Trampoline => "Trampoline",
            SymbolType::Runtime => "Runtime",
            SymbolType::Exception => "Exception",
            SymbolType::SourceFile => "SourceFile",
            SymbolType::HeaderFile => "HeaderFile",
            SymbolType::ObjectFile => "ObjectFile",
            SymbolType::CommonBlock => "CommonBlock",
            SymbolType::Block => "Block",
            SymbolType::Local => "Local",
            SymbolType::Param => "Param",
            SymbolType::Variable => "Variable",
            SymbolType::LineEntry => "LineEntry",
            SymbolType::ScopeBegin => "ScopeBegin",
            SymbolType::ScopeEnd => "ScopeEnd",
            SymbolType::Additional => "Additional",
            SymbolType::Compiler => "Compiler",
            SymbolType::Instrumentation => "Instrumentation",
            SymbolType::Undefined => "Undefined",
            SymbolType::ObjCClass => "ObjCClass",
            SymbolType::ObjCMetaClass => "ObjCMetaClass",
            SymbolType::ObjCIVar => "ObjCIVar",
            SymbolType::ReExported => "ReExported",
        }
    }
}

impl fmt::Display for SymbolType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// Filter on the debug flag of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugFilter
{
    /// Only symbols that do not come from debug info.
    No,
    /// Only debug symbols.
    Yes,
    #[default]
    Any,
}

/// Filter on the external visibility of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility
{
    /// Only externally visible symbols.
    Extern,
    /// Only private (non-external) symbols.
    Private,
    #[default]
    Any,
}

bitflags! {
    /// Which name tables a function lookup consults.
    ///
    /// Each selected strategy contributes independently; overlapping hits are
    /// collapsed by a final sort and dedup of symbol indexes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FunctionNameType: u32
    {
        /// Exact full (mangled or demangled) name.
        const FULL = 1 << 1;
        /// Function basename, e.g. `foo` for a free function `ns::foo()`.
        const BASE = 1 << 2;
        /// Method name of a confirmed class member.
        const METHOD = 1 << 3;
        /// Objective-C selector.
        const SELECTOR = 1 << 4;
        const ANY = Self::FULL.bits() | Self::BASE.bits() | Self::METHOD.bits() | Self::SELECTOR.bits();
    }
}
