//! Section geometry used for symbol size inference.

use crate::symbols::range::{RangeEntry, RangeIndex};
use crate::types::Address;

/// Source of the leaf section ranges of an image.
///
/// Container sections (Mach-O segments, for instance) are flattened away:
/// only sections without children are reported.
pub trait SectionGeometry: Send + Sync
{
    /// Every leaf section as `(file address, byte size)`.
    fn leaf_sections(&self) -> Vec<(Address, u64)>;
}

/// A section and its nested children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section
{
    pub name: String,
    pub file_address: Address,
    pub byte_size: u64,
    pub children: Vec<Section>,
}

impl Section
{
    pub fn new(name: impl Into<String>, file_address: u64, byte_size: u64) -> Self
    {
        Self {
            name: name.into(),
            file_address: Address::new(file_address),
            byte_size,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: Section) -> Self
    {
        self.children.push(child);
        self
    }
}

/// Top-level sections of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionList
{
    sections: Vec<Section>,
}

impl SectionList
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn push(&mut self, section: Section)
    {
        self.sections.push(section);
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section>
    {
        self.sections.iter()
    }
}

impl FromIterator<Section> for SectionList
{
    fn from_iter<I: IntoIterator<Item = Section>>(iter: I) -> Self
    {
        Self {
            sections: iter.into_iter().collect(),
        }
    }
}

fn collect_leaves(sections: &[Section], out: &mut Vec<(Address, u64)>)
{
    for section in sections {
        if section.children.is_empty() {
            out.push((section.file_address, section.byte_size));
        } else {
            collect_leaves(&section.children, out);
        }
    }
}

impl SectionGeometry for SectionList
{
    fn leaf_sections(&self) -> Vec<(Address, u64)>
    {
        let mut leaves = Vec::new();
        collect_leaves(&self.sections, &mut leaves);
        leaves
    }
}

/// Sorted range index over the leaf sections of `geometry`.
pub(crate) fn leaf_section_ranges(geometry: &dyn SectionGeometry) -> RangeIndex<()>
{
    geometry
        .leaf_sections()
        .into_iter()
        .map(|(base, size)| RangeEntry::new(base, size, ()))
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_leaves_are_flattened()
    {
        let list: SectionList = [
            Section::new("__TEXT", 0x1000, 0x2000)
                .with_child(Section::new("__text", 0x1000, 0x800))
                .with_child(Section::new("__stubs", 0x1800, 0x40)),
            Section::new(".bss", 0x8000, 0x100),
        ]
        .into_iter()
        .collect();

        let leaves = list.leaf_sections();
        assert_eq!(
            leaves,
            vec![
                (Address::new(0x1000), 0x800),
                (Address::new(0x1800), 0x40),
                (Address::new(0x8000), 0x100),
            ]
        );
    }

    #[test]
    fn test_leaf_ranges_are_sorted()
    {
        let list: SectionList = [Section::new("b", 0x3000, 0x10), Section::new("a", 0x1000, 0x10)].into_iter().collect();
        let ranges = leaf_section_ranges(&list);
        assert!(ranges.is_sorted());
        assert_eq!(ranges.get(0).map(|e| e.base), Some(Address::new(0x1000)));
        assert!(ranges.find_entry_that_contains(Address::new(0x3008)).is_some());
    }
}
