//! # Runtime
//!
//! Pieces that need a live inferior: resolving the dynamic C++ type of an
//! object through its vtable, and calling helper functions inside the target.
//!
//! The process itself is abstracted behind [`ProcessMemory`] and the set of
//! loaded images behind [`TargetImages`], so both can be backed by a real
//! debugger session or by in-memory fakes in tests.

pub mod helper;
pub mod itanium;

use std::fmt;

use bitflags::bitflags;

pub use helper::{HelperCallOptions, HelperFunctionCaller, PendingItems};
pub use itanium::{fix_up_dynamic_type, is_vtable_name, DynamicTypeInfo, DynamicTypeResolver, DynamicValue};

use crate::error::{Result, SymdexError};
use crate::symbols::{ImageId, Symtab};
use crate::types::{Address, ByteOrder, ThreadId};

/// Completion code of a function call made inside the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionResult
{
    Completed,
    SetupError,
    ParseError,
    /// The call was abandoned and its state discarded.
    Discarded,
    Interrupted,
    HitBreakpoint,
    TimedOut,
    ResultUnavailable,
    StoppedForDebug,
    /// The thread running the call exited.
    ThreadVanished,
}

impl fmt::Display for ExpressionResult
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            ExpressionResult::Completed => "completed",
            ExpressionResult::SetupError => "setup error",
            ExpressionResult::ParseError => "parse error",
            ExpressionResult::Discarded => "discarded",
            ExpressionResult::Interrupted => "interrupted",
            ExpressionResult::HitBreakpoint => "hit breakpoint",
            ExpressionResult::TimedOut => "timed out",
            ExpressionResult::ResultUnavailable => "result unavailable",
            ExpressionResult::StoppedForDebug => "stopped for debug",
            ExpressionResult::ThreadVanished => "thread vanished",
        };
        write!(f, "{label}")
    }
}

bitflags! {
    /// Protection of memory allocated inside the inferior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPermissions: u32
    {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

/// Access to a stopped inferior process.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; every method takes `&self`, so an
/// implementation wrapping a single-threaded debugger has to serialize
/// internally.
pub trait ProcessMemory: Send + Sync
{
    /// Byte order of the target.
    fn byte_order(&self) -> ByteOrder;

    /// Pointer width of the target in bytes (4 or 8).
    fn pointer_size(&self) -> u8;

    /// Read `len` bytes starting at `addr`. May return fewer bytes than asked
    /// for if the read crosses into unmapped memory.
    fn read_memory(&self, addr: Address, len: usize) -> Result<Vec<u8>>;

    /// Allocate `size` bytes with the given protection.
    fn allocate_memory(&self, size: usize, permissions: MemoryPermissions) -> Result<Address>;

    /// Free memory returned by [`ProcessMemory::allocate_memory`].
    fn deallocate_memory(&self, addr: Address) -> Result<()>;

    /// Run the function at `function` on `thread` with integer arguments.
    fn call_function(&self, thread: ThreadId, function: Address, arguments: &[u64], options: &HelperCallOptions) -> ExpressionResult;

    /// Whether `thread` is stopped somewhere functions can be called from.
    fn safe_to_call_functions(&self, _thread: ThreadId) -> bool
    {
        true
    }

    /// Read an unsigned integer of `size` bytes in target byte order.
    ///
    /// ## Errors
    ///
    /// Returns `MemoryRead` if fewer than `size` bytes could be read.
    fn read_uint(&self, addr: Address, size: usize) -> Result<u64>
    {
        let bytes = self.read_memory(addr, size)?;
        if bytes.len() < size {
            return Err(SymdexError::MemoryRead {
                address: addr,
                length: size,
                details: format!("short read ({} bytes)", bytes.len()),
            });
        }
        self.byte_order().read_uint(&bytes[..size]).ok_or_else(|| SymdexError::InvalidArgument(format!("unsupported integer width {size}")))
    }

    /// Read a pointer-sized unsigned word.
    fn read_pointer(&self, addr: Address) -> Result<u64>
    {
        self.read_uint(addr, usize::from(self.pointer_size()))
    }

    /// Read a pointer-sized word and sign-extend it.
    fn read_signed_pointer(&self, addr: Address) -> Result<i64>
    {
        let size = usize::from(self.pointer_size());
        let bytes = self.read_memory(addr, size)?;
        if bytes.len() < size {
            return Err(SymdexError::MemoryRead {
                address: addr,
                length: size,
                details: format!("short read ({} bytes)", bytes.len()),
            });
        }
        self.byte_order().read_int(&bytes[..size]).ok_or_else(|| SymdexError::InvalidArgument(format!("unsupported integer width {size}")))
    }
}

/// A load address mapped back into the image that contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress
{
    pub image: ImageId,
    pub file_address: Address,
}

/// A type found by name in the target's debug information.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeCandidate
{
    /// Fully qualified type name.
    pub name: String,
    /// Image whose debug information defines the type.
    pub image: ImageId,
    /// Whether the type is known to be a C++ class (as opposed to a typedef
    /// or forward declaration sharing the name).
    pub is_cxx_class: bool,
}

/// The images loaded into a target and their symbol and type information.
pub trait TargetImages: Send + Sync
{
    /// Map a load address to its image and file address.
    fn resolve_load_address(&self, load_address: Address) -> Option<ResolvedAddress>;

    /// Symbol table of a loaded image.
    fn symtab(&self, image: ImageId) -> Option<&Symtab>;

    /// Find types named `name`, either in one image or (with `None`) in all
    /// of them. `max_matches` of `None` means unlimited.
    fn find_types_by_name(&self, image: Option<ImageId>, name: &str, exact_match: bool, max_matches: Option<usize>) -> Vec<TypeCandidate>;
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct Words(Vec<u8>);

    impl ProcessMemory for Words
    {
        fn byte_order(&self) -> ByteOrder
        {
            ByteOrder::Little
        }

        fn pointer_size(&self) -> u8
        {
            8
        }

        fn read_memory(&self, addr: Address, len: usize) -> Result<Vec<u8>>
        {
            let start = addr.value() as usize;
            let end = (start + len).min(self.0.len());
            Ok(self.0.get(start..end).map(<[u8]>::to_vec).unwrap_or_default())
        }

        fn allocate_memory(&self, size: usize, _permissions: MemoryPermissions) -> Result<Address>
        {
            Err(SymdexError::ResourceExhausted(format!("{size} bytes")))
        }

        fn deallocate_memory(&self, _addr: Address) -> Result<()>
        {
            Ok(())
        }

        fn call_function(&self, _thread: ThreadId, _function: Address, _arguments: &[u64], _options: &HelperCallOptions) -> ExpressionResult
        {
            ExpressionResult::SetupError
        }
    }

    #[test]
    fn test_pointer_reads()
    {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        bytes.extend_from_slice(&(-16i64).to_le_bytes());
        let process = Words(bytes);

        assert_eq!(process.read_pointer(Address::new(0)).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(process.read_signed_pointer(Address::new(8)).unwrap(), -16);
    }

    #[test]
    fn test_short_read_is_error()
    {
        let process = Words(vec![0; 4]);
        let err = process.read_pointer(Address::new(0)).unwrap_err();
        assert!(matches!(err, SymdexError::MemoryRead { length: 8, .. }));
    }

    #[test]
    fn test_expression_result_display()
    {
        assert_eq!(ExpressionResult::TimedOut.to_string(), "timed out");
        assert_eq!(ExpressionResult::Completed.to_string(), "completed");
    }
}
