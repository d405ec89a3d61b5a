//! # String Pool
//!
//! Interned, immutable strings for symbol names.
//!
//! Symbol tables hold hundreds of thousands of names, and every name index
//! stores a string per entry. Interning turns those strings into small `Copy`
//! handles: identical text always maps to the identical handle, so equality
//! and hashing are integer operations.
//!
//! The pool is an explicit object rather than process-wide state. Tables take
//! an `Arc<StringPool>` at construction, which keeps them testable in
//! isolation while still letting several tables in one debugger session share
//! a pool.
//!
//! ## Example
//!
//! ```rust
//! use symdex_core::intern::StringPool;
//!
//! let pool = StringPool::new();
//! let a = pool.intern("main");
//! let b = pool.intern("main");
//! assert_eq!(a, b);
//! assert_eq!(&*pool.resolve(a), "main");
//! assert!(pool.get("not_interned").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Handle to a string stored in a [`StringPool`].
///
/// Ordering follows insertion order into the pool, not lexical order. Name
/// indexes only need a total order for binary search; anything that presents
/// names to a user sorts by the resolved text instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstString(u32);

impl ConstString
{
    /// Raw pool slot, useful for logging.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for ConstString
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct PoolInner
{
    lookup: HashMap<Arc<str>, ConstString>,
    strings: Vec<Arc<str>>,
}

/// Thread-safe interning pool.
///
/// Strings are never removed, so handles stay valid for the lifetime of the
/// pool.
#[derive(Default)]
pub struct StringPool
{
    inner: RwLock<PoolInner>,
}

impl StringPool
{
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Create an empty pool wrapped in an `Arc`, ready to hand to tables.
    #[must_use]
    pub fn shared() -> Arc<Self>
    {
        Arc::new(Self::new())
    }

    /// Intern `text`, returning the existing handle if it is already present.
    pub fn intern(&self, text: &str) -> ConstString
    {
        if let Some(existing) = self.get(text) {
            return existing;
        }

        let mut inner = self.inner.write();
        // Another thread may have inserted it between the read and write locks.
        if let Some(existing) = inner.lookup.get(text) {
            return *existing;
        }
        let handle = ConstString(inner.strings.len() as u32);
        let stored: Arc<str> = Arc::from(text);
        inner.strings.push(stored.clone());
        inner.lookup.insert(stored, handle);
        handle
    }

    /// Intern `text` unless it is empty.
    ///
    /// Symbol names treat the empty string as "no name".
    pub fn intern_non_empty(&self, text: &str) -> Option<ConstString>
    {
        if text.is_empty() {
            None
        } else {
            Some(self.intern(text))
        }
    }

    /// Look up `text` without inserting it.
    ///
    /// A name that was never interned cannot be in any index, so lookups use
    /// this to bail out early.
    pub fn get(&self, text: &str) -> Option<ConstString>
    {
        self.inner.read().lookup.get(text).copied()
    }

    /// Get the text behind a handle.
    ///
    /// Handles are only ever produced by this pool, so an unknown handle means
    /// it came from a different pool; in that case an empty string is returned.
    pub fn resolve(&self, handle: ConstString) -> Arc<str>
    {
        self.inner
            .read()
            .strings
            .get(handle.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(""))
    }

    /// Number of distinct strings in the pool.
    pub fn len(&self) -> usize
    {
        self.inner.read().strings.len()
    }

    /// Whether the pool holds no strings.
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

impl fmt::Debug for StringPool
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("StringPool").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests
{
    use std::thread;

    use super::*;

    #[test]
    fn test_identical_text_identical_handle()
    {
        let pool = StringPool::new();
        let a = pool.intern("_ZN1A3fooEv");
        let b = pool.intern("_ZN1A3barEv");
        let c = pool.intern("_ZN1A3fooEv");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_empty_text_is_no_name()
    {
        let pool = StringPool::new();
        assert_eq!(pool.intern_non_empty(""), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_interning_agrees()
    {
        let pool = StringPool::shared();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || (0..100).map(|i| pool.intern(&format!("sym{i}"))).collect::<Vec<_>>())
            })
            .collect();

        let results: Vec<Vec<ConstString>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        assert_eq!(pool.len(), 100);
    }
}
