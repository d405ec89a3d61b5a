//! Symbol demangling utilities.
//!
//! The symbol table treats demangling as a pure function supplied by the
//! caller through the [`Demangler`] trait. A demangler turns a mangled name
//! into a display name plus the pieces the table needs for classification:
//! the function *basename*, the enclosing *context* (class or namespace) and
//! any trailing *qualifiers* (`const`, `volatile`, `&&`).
//!
//! [`DefaultDemangler`] handles the two manglings found in native images:
//!
//! - **C++**: Itanium ABI (`_Z...`), demangled with `cpp_demangle`
//! - **Rust**: legacy (`_ZN...17h<hash>E`) and v0 (`_R...`), via `rustc_demangle`

use cpp_demangle::{DemangleOptions, Symbol as CppSymbol};
use rustc_demangle::try_demangle;

use crate::types::SymbolLanguage;

/// Demangled prefix of an Itanium virtual table symbol.
pub const VTABLE_DEMANGLED_PREFIX: &str = "vtable for ";

/// Result of demangling a single name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DemangledName
{
    /// Full human-readable name, e.g. `A::foo() const`.
    pub display: String,
    /// Unqualified function name, e.g. `foo` or `~A`. Empty if the name is not
    /// a function.
    pub basename: String,
    /// Enclosing class or namespace, e.g. `A` or `ns::Outer<int>`.
    pub context: String,
    /// Trailing cv/ref qualifiers, e.g. `const`.
    pub qualifiers: String,
}

/// Pluggable demangling collaborator.
///
/// Implementations must be pure: the same input always yields the same
/// output. The symbol table calls this while holding its lock.
pub trait Demangler: Send + Sync
{
    /// Demangle `mangled`, using `language` as a hint when it is known.
    ///
    /// Returns `None` when the input cannot be parsed.
    fn demangle(&self, mangled: &str, language: SymbolLanguage) -> Option<DemangledName>;
}

/// Demangler for Itanium C++ and Rust names.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDemangler;

impl Demangler for DefaultDemangler
{
    fn demangle(&self, mangled: &str, language: SymbolLanguage) -> Option<DemangledName>
    {
        let language = match language {
            SymbolLanguage::Unknown => SymbolLanguage::guess(mangled),
            other => other,
        };
        match language {
            SymbolLanguage::Rust => demangle_rust(mangled).or_else(|| demangle_cpp(mangled)),
            SymbolLanguage::Cpp => demangle_cpp(mangled),
            _ => None,
        }
    }
}

fn demangle_rust(mangled: &str) -> Option<DemangledName>
{
    let demangled = try_demangle(mangled).ok()?;
    // The alternate form drops the trailing `::h<hash>`.
    let display = format!("{demangled:#}");
    let (context, basename) = split_scope(&display);
    Some(DemangledName {
        basename: basename.to_string(),
        context: context.to_string(),
        qualifiers: String::new(),
        display,
    })
}

fn demangle_cpp(mangled: &str) -> Option<DemangledName>
{
    // Mach-O prepends an extra underscore to every C symbol.
    let itanium = if mangled.starts_with("__Z") { &mangled[1..] } else { mangled };
    let symbol = CppSymbol::new(itanium.as_bytes()).ok()?;
    let display = symbol.demangle(&DemangleOptions::default()).ok()?;
    let display = normalize_special_name(display);

    Some(match CxxMethodName::parse(&display) {
        Some(method) => DemangledName {
            basename: method.basename.to_string(),
            context: method.context.to_string(),
            qualifiers: method.qualifiers.to_string(),
            display,
        },
        None => DemangledName {
            display,
            ..DemangledName::default()
        },
    })
}

// cpp_demangle spells vtables as `{vtable(Foo)}`; the rest of the engine keys
// off the conventional `vtable for Foo`.
fn normalize_special_name(display: String) -> String
{
    if let Some(inner) = display.strip_prefix("{vtable(") {
        if let Some(end) = inner.rfind(")}") {
            return format!("{VTABLE_DEMANGLED_PREFIX}{}", &inner[..end]);
        }
    }
    display
}

/// A demangled C++ function name split into its parts.
///
/// ```rust
/// use symdex_core::symbols::demangle::CxxMethodName;
///
/// let name = CxxMethodName::parse("ns::Widget::resize(int, int) const").unwrap();
/// assert_eq!(name.context, "ns::Widget");
/// assert_eq!(name.basename, "resize");
/// assert_eq!(name.arguments, "(int, int)");
/// assert_eq!(name.qualifiers, "const");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CxxMethodName<'a>
{
    pub context: &'a str,
    pub basename: &'a str,
    pub arguments: &'a str,
    pub qualifiers: &'a str,
}

impl<'a> CxxMethodName<'a>
{
    /// Parse a demangled function name. Returns `None` for anything without an
    /// argument list (data symbols, vtables, plain C names).
    #[must_use]
    pub fn parse(full: &'a str) -> Option<Self>
    {
        let full = full.trim();
        let close = full.rfind(')')?;
        let open = matching_open_paren(full, close)?;
        let qualifiers = full[close + 1..].trim();
        let arguments = &full[open..=close];

        let mut name = full[..open].trim_end();
        let operator_at = name.find("operator");
        let search_end = operator_at.unwrap_or(name.len());
        // Template instantiations carry their return type in front.
        if let Some(space) = last_top_level(&name[..search_end], " ") {
            name = &name[space + 1..];
        }
        if name.is_empty() {
            return None;
        }

        let (context, basename) = split_scope(name);
        Some(Self {
            context,
            basename,
            arguments,
            qualifiers,
        })
    }

    /// Whether the basename names a destructor.
    #[must_use]
    pub fn is_destructor(&self) -> bool
    {
        self.basename.starts_with('~')
    }
}

/// Split `a::b::c` into (`a::b`, `c`), ignoring `::` nested in template
/// arguments or parentheses and anything from an `operator` keyword on.
#[must_use]
pub fn split_scope(name: &str) -> (&str, &str)
{
    let limit = name.find("operator").unwrap_or(name.len());
    match last_top_level(&name[..limit], "::") {
        Some(sep) => (&name[..sep], &name[sep + 2..]),
        None => ("", name),
    }
}

fn matching_open_paren(text: &str, close: usize) -> Option<usize>
{
    let mut depth = 0usize;
    for (pos, ch) in text[..=close].char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

fn last_top_level(text: &str, needle: &str) -> Option<usize>
{
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut found = None;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'<' | b'(' | b'[' => depth += 1,
            b'>' | b')' | b']' => depth -= 1,
            _ => {
                if depth == 0 && text[pos..].starts_with(needle) {
                    found = Some(pos);
                    pos += needle.len();
                    continue;
                }
            }
        }
        pos += 1;
    }
    found
}

/// Whether `name` is an Itanium function mangling worth classifying.
///
/// Virtual tables, VTTs and typeinfo (`_ZT`), guard variables (`_ZG`) and
/// local entities (`_ZZ`) are skipped. Mach-O's extra leading underscore
/// (`__Z`) is accepted.
#[must_use]
pub fn is_cxx_function_mangling(name: &str) -> bool
{
    let name = name.strip_prefix('_').filter(|rest| rest.starts_with("_Z")).unwrap_or(name);
    let bytes = name.as_bytes();
    bytes.len() > 2 && bytes[0] == b'_' && bytes[1] == b'Z' && !matches!(bytes[2], b'T' | b'G' | b'Z')
}
