//! # Symbols
//!
//! Symbol records, the lookup indexes built over them, and the table that
//! owns both.
//!
//! - [`Symbol`]: one flat record (name pair, value, size, type, flags)
//! - [`NameIndex`] / [`RangeIndex`]: sorted multimaps by name and by address
//! - [`Symtab`]: the concurrent table with lazily built indexes
//! - [`ObjectImage`]: loads a `Symtab` and its section layout from an object file
//!
//! Name handling helpers (demangling, Objective-C method names, linker
//! annotations) live in their own modules and are re-exported here.

pub mod demangle;
mod dump;
mod image;
mod name_index;
pub mod objc;
mod range;
mod sections;
mod symbol;
mod symtab;

pub use demangle::{DefaultDemangler, DemangledName, Demangler};
pub use dump::SortOrder;
pub use image::{ImageDescriptor, ImageId, ObjectImage};
pub use name_index::{NameEntry, NameIndex};
pub use range::{RangeEntry, RangeIndex};
pub use sections::{Section, SectionGeometry, SectionList};
pub use symbol::{strip_linker_annotations, Mangled, Symbol, SymbolValue};
pub use symtab::{DuplicatePolicy, NameIndexKind, SymbolContext, SymbolFilter, Symtab, SymtabLock, SymtabOptions};
