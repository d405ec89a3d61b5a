//! File and load address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address
///
/// Symbol tables deal in two address spaces: *file addresses* (the virtual
/// addresses recorded in the object file) and *load addresses* (where the
/// image actually lives in a running process). Both are represented by this
/// wrapper so that a size or an index can never be passed where an address
/// is expected.
///
/// ## Example
///
/// ```rust
/// use symdex_core::types::Address;
///
/// let start = Address::from(0x1000);
/// let end = start + 0x20;
/// assert_eq!(end.offset_from(start), Some(0x20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use symdex_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Apply a signed displacement, checking for overflow in either direction
    ///
    /// Used for the Itanium `offset_to_top` adjustment, which is usually negative.
    ///
    /// ```rust
    /// use symdex_core::types::Address;
    ///
    /// let addr = Address::from(0x1010);
    /// assert_eq!(addr.checked_add_signed(-0x10), Some(Address::from(0x1000)));
    /// assert_eq!(Address::ZERO.checked_add_signed(-1), None);
    /// ```
    pub fn checked_add_signed(self, offset: i64) -> Option<Self>
    {
        self.0.checked_add_signed(offset).map(Address)
    }

    /// Subtract an offset from this address, checking for underflow
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset to this address, saturating at the maximum value
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Distance in bytes from `base` up to this address
    ///
    /// Returns `None` if `base` lies above this address.
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
