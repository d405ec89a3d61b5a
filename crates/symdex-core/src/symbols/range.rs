//! Sorted address-range index.
//!
//! A [`RangeIndex`] maps `[base, base + size)` ranges to a payload value. It
//! is built by appending entries in any order and then calling
//! [`RangeIndex::sort`]; queries on an unsorted index return nothing.
//!
//! Ranges may overlap (a function symbol nested inside a larger block
//! symbol, for example), so containment queries come in two flavours: one
//! that returns a single hit and one that reports every range containing the
//! address.

use smallvec::SmallVec;

use crate::types::Address;

/// One range and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry<T>
{
    pub base: Address,
    pub size: u64,
    pub data: T,
}

impl<T> RangeEntry<T>
{
    pub fn new(base: Address, size: u64, data: T) -> Self
    {
        Self { base, size, data }
    }

    /// One past the last address of the range, saturating at `u64::MAX`.
    #[must_use]
    pub fn end(&self) -> u64
    {
        self.base.value().saturating_add(self.size)
    }

    /// Whether `address` lies inside the range. Empty ranges contain nothing.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.base && address.value() < self.end()
    }
}

/// Range-to-payload index.
#[derive(Debug, Clone)]
pub struct RangeIndex<T>
{
    entries: Vec<RangeEntry<T>>,
    // max_end[i] is the largest end() among entries[..=i]; lets containment
    // queries stop scanning backwards once no earlier range can reach.
    max_end: Vec<u64>,
    sorted: bool,
}

impl<T> Default for RangeIndex<T>
{
    fn default() -> Self
    {
        Self {
            entries: Vec::new(),
            max_end: Vec::new(),
            sorted: true,
        }
    }
}

impl<T: Copy + Ord> RangeIndex<T>
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self
    {
        Self {
            entries: Vec::with_capacity(capacity),
            max_end: Vec::new(),
            sorted: true,
        }
    }

    pub fn append(&mut self, entry: RangeEntry<T>)
    {
        self.entries.push(entry);
        self.sorted = false;
    }

    /// Order entries by base, then size, then payload.
    pub fn sort(&mut self)
    {
        self.entries
            .sort_by(|a, b| a.base.cmp(&b.base).then(a.size.cmp(&b.size)).then(a.data.cmp(&b.data)));
        self.max_end.clear();
        let mut running = 0u64;
        for entry in &self.entries {
            running = running.max(entry.end());
            self.max_end.push(running);
        }
        self.sorted = true;
    }

    #[must_use]
    pub fn is_sorted(&self) -> bool
    {
        self.sorted
    }

    pub fn clear(&mut self)
    {
        self.entries.clear();
        self.max_end.clear();
        self.sorted = true;
    }

    pub fn shrink_to_fit(&mut self)
    {
        self.entries.shrink_to_fit();
        self.max_end.shrink_to_fit();
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
    pub fn get(&self, index: usize) -> Option<&RangeEntry<T>>
    {
        self.entries.get(index)
    }

    /// Mutable access to an entry.
    ///
    /// Changing `base` or `size` marks the index unsorted; call
    /// [`RangeIndex::sort`] again before querying.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut RangeEntry<T>>
    {
        self.sorted = false;
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RangeEntry<T>>
    {
        self.entries.iter()
    }

    // First position whose base is >= address.
    fn lower_bound(&self, address: Address) -> usize
    {
        self.entries.partition_point(|entry| entry.base < address)
    }

    // First position whose base is > address.
    fn upper_bound(&self, address: Address) -> usize
    {
        self.entries.partition_point(|entry| entry.base <= address)
    }

    /// The first entry whose range starts exactly at `address`.
    #[must_use]
    pub fn find_entry_starts_at(&self, address: Address) -> Option<&RangeEntry<T>>
    {
        if !self.sorted {
            return None;
        }
        self.entries
            .get(self.lower_bound(address))
            .filter(|entry| entry.base == address)
    }

    /// An entry containing `address`.
    ///
    /// When several ranges contain the address, the one with the lowest base
    /// wins, even if disjoint ranges sit between it and the address.
    #[must_use]
    pub fn find_entry_that_contains(&self, address: Address) -> Option<&RangeEntry<T>>
    {
        if !self.sorted {
            return None;
        }
        let mut found = None;
        let mut pos = self.upper_bound(address);
        while pos > 0 && self.max_end[pos - 1] > address.value() {
            pos -= 1;
            let entry = &self.entries[pos];
            if entry.contains(address) {
                found = Some(entry);
            }
        }
        found
    }

    /// Payloads of every entry containing `address`, in index order.
    #[must_use]
    pub fn find_entry_indexes_that_contain(&self, address: Address) -> SmallVec<[T; 4]>
    {
        let mut hits = SmallVec::new();
        if !self.sorted {
            return hits;
        }
        let mut pos = self.upper_bound(address);
        while pos > 0 && self.max_end[pos - 1] > address.value() {
            pos -= 1;
            let entry = &self.entries[pos];
            if entry.contains(address) {
                hits.push(entry.data);
            }
        }
        hits.reverse();
        hits
    }
}

impl<T: Copy + Ord> FromIterator<RangeEntry<T>> for RangeIndex<T>
{
    fn from_iter<I: IntoIterator<Item = RangeEntry<T>>>(iter: I) -> Self
    {
        let mut index = Self {
            entries: iter.into_iter().collect(),
            max_end: Vec::new(),
            sorted: false,
        };
        index.sort();
        index
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn entry(base: u64, size: u64, data: u32) -> RangeEntry<u32>
    {
        RangeEntry::new(Address::new(base), size, data)
    }

    #[test]
    fn test_unsorted_index_answers_nothing()
    {
        let mut index = RangeIndex::new();
        index.append(entry(0x1000, 0x10, 0));
        assert!(index.find_entry_that_contains(Address::new(0x1000)).is_none());
        index.sort();
        assert!(index.find_entry_that_contains(Address::new(0x1000)).is_some());
    }

    #[test]
    fn test_starts_at()
    {
        let index: RangeIndex<u32> = [entry(0x2000, 0x10, 1), entry(0x1000, 0x10, 0)].into_iter().collect();
        assert_eq!(index.find_entry_starts_at(Address::new(0x1000)).map(|e| e.data), Some(0));
        assert_eq!(index.find_entry_starts_at(Address::new(0x2000)).map(|e| e.data), Some(1));
        assert!(index.find_entry_starts_at(Address::new(0x1008)).is_none());
    }

    #[test]
    fn test_contains_and_gaps()
    {
        let index: RangeIndex<u32> = [entry(0x1000, 0x10, 0), entry(0x2000, 0x10, 1)].into_iter().collect();
        assert_eq!(index.find_entry_that_contains(Address::new(0x100f)).map(|e| e.data), Some(0));
        assert!(index.find_entry_that_contains(Address::new(0x1010)).is_none());
        assert!(index.find_entry_that_contains(Address::new(0x0fff)).is_none());
        assert_eq!(index.find_entry_that_contains(Address::new(0x2000)).map(|e| e.data), Some(1));
    }

    #[test]
    fn test_zero_size_contains_nothing()
    {
        let index: RangeIndex<u32> = [entry(0x1000, 0, 0)].into_iter().collect();
        assert!(index.find_entry_that_contains(Address::new(0x1000)).is_none());
        assert!(index.find_entry_starts_at(Address::new(0x1000)).is_some());
    }

    #[test]
    fn test_nested_ranges_report_all()
    {
        // outer [0x1000, 0x1100) holds inner [0x1040, 0x1050); a disjoint
        // range sits in between so the outer one is not adjacent.
        let index: RangeIndex<u32> = [
            entry(0x1000, 0x100, 0),
            entry(0x1010, 0x10, 1),
            entry(0x1040, 0x10, 2),
        ]
        .into_iter()
        .collect();

        let hits = index.find_entry_indexes_that_contain(Address::new(0x1044));
        assert_eq!(hits.as_slice(), &[0, 2]);

        let hits = index.find_entry_indexes_that_contain(Address::new(0x1030));
        assert_eq!(hits.as_slice(), &[0]);

        assert!(index.find_entry_indexes_that_contain(Address::new(0x1100)).is_empty());
    }

    #[test]
    fn test_contains_skips_disjoint_sibling()
    {
        let index: RangeIndex<u32> = [
            entry(0x1000, 0x100, 0),
            entry(0x1010, 0x10, 1),
            entry(0x1040, 0x10, 2),
        ]
        .into_iter()
        .collect();

        assert_eq!(index.find_entry_that_contains(Address::new(0x1030)).map(|e| e.data), Some(0));
        assert_eq!(index.find_entry_that_contains(Address::new(0x1044)).map(|e| e.data), Some(0));
        assert!(index.find_entry_that_contains(Address::new(0x1100)).is_none());
    }

    #[test]
    fn test_contains_prefers_lowest_base_in_overlapping_run()
    {
        let index: RangeIndex<u32> = [entry(0x1000, 0x100, 0), entry(0x1040, 0x10, 1)].into_iter().collect();
        assert_eq!(index.find_entry_that_contains(Address::new(0x1044)).map(|e| e.data), Some(0));
    }
}
