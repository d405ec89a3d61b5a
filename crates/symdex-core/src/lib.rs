//! # symdex-core
//!
//! Symbol tables for native debuggers.
//!
//! This crate provides the symbol-side machinery a debugger needs once an
//! object file has been read:
//! - Interned names shared across every table in a session
//! - Symbol records with lazily demangled names
//! - Name indexes by full name, basename, C++ method and Objective-C selector
//! - An address index with inferred sizes for symbols that report none
//! - Dynamic C++ type discovery and helper-function calls in a live inferior
//!
//! ## Concurrency
//!
//! A [`Symtab`] is `Send + Sync`. Queries take `&self` and serialize on one
//! recursive lock per table; the first query after a change rebuilds the
//! derived indexes under that lock. Loading symbols takes `&mut self`.
//!
//! ## Errors
//!
//! A lookup that finds nothing returns `None` or an empty list. [`SymdexError`]
//! is reserved for failures the caller must handle: unreadable inferior
//! memory, failed allocations, helper calls that do not complete and object
//! files that cannot be parsed.

pub mod error;
pub mod intern;
pub mod prelude;
pub mod runtime;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SymdexError};
pub use intern::{ConstString, StringPool};
pub use symbols::{Symbol, Symtab};
pub use types::Address;
