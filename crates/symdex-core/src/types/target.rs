//! Target description types: architecture, byte order and thread identity.

use std::fmt;

/// CPU architecture of a target image or process
///
/// The symbol table itself is architecture-neutral. The runtime helpers need
/// to know the pointer width and byte order to decode words read out of the
/// inferior (vtable pointers, `offset_to_top`, helper return buffers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit ARM
    Arm64,
    /// 64-bit x86 (Intel/AMD)
    X86_64,
    /// 32-bit ARM
    Arm,
    /// 32-bit x86
    X86,
    /// Any other architecture (or unknown)
    ///
    /// The `&'static str` contains the architecture name (e.g., "riscv64", "powerpc64").
    Unknown(&'static str),
}

impl Architecture
{
    /// Get the architecture of the currently running binary
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        match self {
            Architecture::Arm64 | Architecture::X86_64 | Architecture::Unknown(_) => 8,
            Architecture::Arm | Architecture::X86 => 4,
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Arm => write!(f, "arm"),
            Architecture::X86 => write!(f, "i386"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}

/// Byte order of words stored in target memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder
{
    #[default]
    Little,
    Big,
}

impl ByteOrder
{
    /// Decode an unsigned integer of `bytes.len()` bytes (at most 8).
    ///
    /// Returns `None` for an empty or oversized slice.
    #[must_use]
    pub fn read_uint(self, bytes: &[u8]) -> Option<u64>
    {
        if bytes.is_empty() || bytes.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        Some(match self {
            ByteOrder::Little => {
                buf[..bytes.len()].copy_from_slice(bytes);
                u64::from_le_bytes(buf)
            }
            ByteOrder::Big => {
                buf[8 - bytes.len()..].copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            }
        })
    }

    /// Decode a sign-extended integer of `bytes.len()` bytes (at most 8).
    #[must_use]
    pub fn read_int(self, bytes: &[u8]) -> Option<i64>
    {
        let raw = self.read_uint(bytes)?;
        let shift = 64 - 8 * bytes.len() as u32;
        #[allow(clippy::cast_possible_wrap)]
        Some(((raw << shift) as i64) >> shift)
    }
}

/// Identifier for a thread in the inferior
///
/// Helper function calls run on a specific thread; the value is whatever the
/// process layer uses to name threads (Mach port, Linux TID, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}
