//! Sorted multimap from interned name to symbol index.

use crate::intern::ConstString;

/// One `(name, symbol index)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameEntry
{
    pub name: ConstString,
    pub value: u32,
}

/// Name to symbol-index multimap.
///
/// Entries are appended freely and then [`sort`](NameIndex::sort)ed once;
/// lookups binary search the sorted vector. Several entries may share a
/// name, and the same `(name, value)` pair may appear more than once if it
/// was appended more than once: nothing is collapsed implicitly.
#[derive(Debug, Clone, Default)]
pub struct NameIndex
{
    entries: Vec<NameEntry>,
    sorted: bool,
}

impl NameIndex
{
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            entries: Vec::new(),
            sorted: true,
        }
    }

    pub fn reserve(&mut self, additional: usize)
    {
        self.entries.reserve(additional);
    }

    pub fn append(&mut self, name: ConstString, value: u32)
    {
        self.entries.push(NameEntry { name, value });
        self.sorted = false;
    }

    /// Sort by name, then by symbol index.
    pub fn sort(&mut self)
    {
        self.entries.sort_unstable();
        self.sorted = true;
    }

    /// Release spare capacity once building is finished.
    pub fn shrink_to_fit(&mut self)
    {
        self.entries.shrink_to_fit();
    }

    pub fn clear(&mut self)
    {
        self.entries.clear();
        self.sorted = true;
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_sorted(&self) -> bool
    {
        self.sorted
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<NameEntry>
    {
        self.entries.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameEntry>
    {
        self.entries.iter()
    }

    /// All symbol indexes recorded under `name`, in ascending order.
    ///
    /// Returns an empty slice if the index has not been sorted.
    #[must_use]
    pub fn values_for(&self, name: ConstString) -> &[NameEntry]
    {
        if !self.sorted {
            return &[];
        }
        let start = self.entries.partition_point(|entry| entry.name < name);
        let end = start + self.entries[start..].partition_point(|entry| entry.name == name);
        &self.entries[start..end]
    }

    /// Append every value recorded under `name` to `out`; returns how many
    /// were appended.
    pub fn get_values(&self, name: ConstString, out: &mut Vec<u32>) -> usize
    {
        let matches = self.values_for(name);
        out.extend(matches.iter().map(|entry| entry.value));
        matches.len()
    }

    #[must_use]
    pub fn find_first_value_for_name(&self, name: ConstString) -> Option<u32>
    {
        self.values_for(name).first().map(|entry| entry.value)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::intern::StringPool;

    #[test]
    fn test_multimap_lookup()
    {
        let pool = StringPool::new();
        let foo = pool.intern("foo");
        let bar = pool.intern("bar");
        let baz = pool.intern("baz");

        let mut index = NameIndex::new();
        index.append(foo, 3);
        index.append(bar, 1);
        index.append(foo, 0);
        index.sort();

        let mut out = Vec::new();
        assert_eq!(index.get_values(foo, &mut out), 2);
        assert_eq!(out, vec![0, 3]);
        assert_eq!(index.find_first_value_for_name(bar), Some(1));
        assert!(index.values_for(baz).is_empty());
    }

    #[test]
    fn test_duplicates_are_kept()
    {
        let pool = StringPool::new();
        let foo = pool.intern("foo");

        let mut index = NameIndex::new();
        index.append(foo, 7);
        index.append(foo, 7);
        index.sort();
        assert_eq!(index.values_for(foo).len(), 2);
    }

    #[test]
    fn test_unsorted_lookup_is_empty()
    {
        let pool = StringPool::new();
        let foo = pool.intern("foo");

        let mut index = NameIndex::new();
        index.append(foo, 1);
        assert!(index.values_for(foo).is_empty());
    }
}
