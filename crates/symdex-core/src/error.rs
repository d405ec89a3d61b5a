//! # Error Types
//!
//! General error handling for the symbol engine.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Note that "nothing matched" is never an error here: lookups return `None`
//! or an empty list, and a query against an empty table simply yields nothing.
//! Errors are reserved for things the caller has to react to, such as a failed
//! memory read in the inferior or a helper function that did not complete.

use thiserror::Error;

use crate::runtime::ExpressionResult;
use crate::types::Address;

/// Main error type for symbol engine operations
///
/// ## Error Categories
///
/// 1. **Argument errors**: InvalidArgument, InvalidRegex
/// 2. **Inferior memory errors**: MemoryRead, ResourceExhausted
/// 3. **Execution errors**: ExecutionFailed, NotSafeToCall
/// 4. **Object file errors**: ObjectParse
/// 5. **I/O errors**: Io (for file operations, etc.)
#[derive(Error, Debug)]
pub enum SymdexError
{
    /// Invalid argument passed to a table or runtime function
    ///
    /// Examples:
    /// - A symbol index that is out of range for a mutation
    /// - A zero pointer width
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A regular expression given to a symbol search failed to compile.
    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Reading memory from the inferior failed or came back short.
    #[error("Failed to read {length} bytes at {address}: {details}")]
    MemoryRead
    {
        /// Start of the read
        address: Address,
        /// Number of bytes requested
        length: usize,
        /// What the process layer reported
        details: String,
    },

    /// A scratch allocation inside the inferior could not be satisfied
    ///
    /// Helper function calls need a small buffer in the target process to
    /// receive their results. If the process refuses the allocation, the
    /// introspection request cannot proceed.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A function called inside the inferior did not complete
    ///
    /// The raw completion code is preserved so callers can tell a timeout
    /// from an unexpected stop or a setup failure.
    #[error("Call to {function} did not complete: {result}")]
    ExecutionFailed
    {
        /// Name of the function that was called
        function: String,
        /// Completion code reported by the execution engine
        result: ExpressionResult,
    },

    /// The selected thread cannot run functions right now.
    #[error("Not safe to call functions: {0}")]
    NotSafeToCall(String),

    /// The object file could not be parsed.
    #[error("Failed to parse object file: {0}")]
    ObjectParse(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, SymdexError>`
///
/// ```rust
/// use symdex_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SymdexError>;
