//! Common module for library exports

pub use crate::error::{Result, SymdexError};
pub use crate::intern::{ConstString, StringPool};
pub use crate::runtime::{DynamicTypeResolver, ExpressionResult, HelperFunctionCaller, ProcessMemory, TargetImages};
pub use crate::symbols::{
    DuplicatePolicy, ImageDescriptor, NameIndexKind, ObjectImage, SortOrder, Symbol, SymbolContext, SymbolFilter,
    Symtab, SymtabOptions,
};
pub use crate::types::{Address, DebugFilter, FunctionNameType, SymbolType, Visibility};
