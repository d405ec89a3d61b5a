//! # Types
//!
//! Small value types shared by the symbol table and the runtime helpers.

pub mod address;
pub mod symbols;
pub mod target;

// Re-export all public types
pub use address::Address;
pub use symbols::{DebugFilter, FunctionNameType, SymbolLanguage, SymbolType, Visibility};
pub use target::{Architecture, ByteOrder, ThreadId};
