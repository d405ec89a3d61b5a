//! Object file loading.
//!
//! Parses an executable or shared library with the `object` crate, rebuilds
//! its section tree and fills a [`Symtab`] from its symbol table.

use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolFlags, SymbolKind, SymbolSection};
use tracing::{debug, debug_span};

use super::sections::{Section, SectionList};
use super::symbol::{Mangled, Symbol, SymbolValue};
use super::symtab::Symtab;
use crate::error::{Result, SymdexError};
use crate::intern::StringPool;
use crate::types::{Address, Architecture, ByteOrder, SymbolLanguage, SymbolType};

/// Describes an object file and where it is loaded.
#[derive(Debug, Clone)]
pub struct ImageDescriptor
{
    pub path: PathBuf,
    /// Load address of the image's text segment; `None` keeps file addresses.
    pub load_address: Option<u64>,
}

impl ImageDescriptor
{
    /// An image that is not loaded anywhere.
    pub fn unloaded(path: impl Into<PathBuf>) -> Self
    {
        Self {
            path: path.into(),
            load_address: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

impl ImageId
{
    pub fn from_parts(path: &Path, load_address: u64) -> Self
    {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        load_address.hash(&mut hasher);
        ImageId(hasher.finish())
    }

    pub fn as_u64(self) -> u64
    {
        self.0
    }
}

/// A parsed object file with its section layout and symbol table.
pub struct ObjectImage
{
    id: ImageId,
    path: PathBuf,
    architecture: Architecture,
    byte_order: ByteOrder,
    slide: i64,
    runtime_range: (u64, u64),
    sections: Arc<SectionList>,
    symtab: Symtab,
}

impl std::fmt::Debug for ObjectImage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ObjectImage")
            .field("path", &self.path)
            .field("architecture", &self.architecture)
            .field("slide", &self.slide)
            .field("sections", &self.sections.len())
            .field("symbols", &self.symtab.num_symbols())
            .finish()
    }
}

fn map_architecture(arch: object::Architecture) -> Architecture
{
    match arch {
        object::Architecture::Aarch64 => Architecture::Arm64,
        object::Architecture::X86_64 => Architecture::X86_64,
        object::Architecture::Arm => Architecture::Arm,
        object::Architecture::I386 => Architecture::X86,
        _ => Architecture::Unknown("unknown"),
    }
}

fn map_symbol_type(section: SymbolSection, kind: SymbolKind) -> SymbolType
{
    match (section, kind) {
        (SymbolSection::Absolute, _) => SymbolType::Absolute,
        (SymbolSection::Common, _) => SymbolType::CommonBlock,
        (_, SymbolKind::Text) => SymbolType::Code,
        (_, SymbolKind::Data | SymbolKind::Tls) => SymbolType::Data,
        (_, SymbolKind::File) => SymbolType::SourceFile,
        (_, SymbolKind::Label) => SymbolType::Local,
        _ => SymbolType::Invalid,
    }
}

// Mach-O sections nest under their segment; everything else stays flat.
fn build_sections(file: &object::File<'_>) -> SectionList
{
    let mut segments: Vec<Section> = file
        .segments()
        .filter_map(|segment| {
            let name = segment.name().ok().flatten()?;
            Some(Section::new(name, segment.address(), segment.size()))
        })
        .collect();

    let mut flat = Vec::new();
    for section in file.sections() {
        let name = section.name().unwrap_or("");
        let leaf = Section::new(name, section.address(), section.size());
        let parent = section
            .segment_name()
            .ok()
            .flatten()
            .and_then(|segment_name| segments.iter_mut().find(|segment| segment.name == segment_name));
        match parent {
            Some(segment) => segment.children.push(leaf),
            None => flat.push(leaf),
        }
    }

    segments
        .into_iter()
        .filter(|segment| !segment.children.is_empty())
        .chain(flat)
        .collect()
}

fn build_symtab(file: &object::File<'_>, pool: &Arc<StringPool>, sections: Arc<SectionList>, path: &Path) -> Symtab
{
    let _span = debug_span!("build_symtab", path = %path.display()).entered();
    let mut symtab = Symtab::new(pool.clone())
        .with_sections(sections)
        .with_object_name(path.display().to_string());

    let mut skipped = 0usize;
    symtab.reserve(file.symbols().count());
    for symbol in file.symbols() {
        if symbol.is_undefined() {
            skipped += 1;
            continue;
        }
        let Ok(name) = symbol.name() else {
            skipped += 1;
            continue;
        };

        let symbol_type = map_symbol_type(symbol.section(), symbol.kind());
        let value = match symbol_type {
            SymbolType::Absolute => SymbolValue::Scalar(symbol.address()),
            _ => SymbolValue::FileAddress(Address::new(symbol.address())),
        };
        let flags = match symbol.flags() {
            SymbolFlags::MachO { n_desc } => u32::from(n_desc),
            SymbolFlags::Elf { st_info, st_other } => u32::from(st_info) | (u32::from(st_other) << 8),
            _ => 0,
        };

        let record = Symbol::new(symbol.index().0 as u32, Mangled::new(pool, name), symbol_type, value)
            .with_size(symbol.size())
            .with_language(SymbolLanguage::guess(name))
            .with_external(symbol.is_global())
            .with_flags(flags)
            .with_linker_annotations(super::symbol::strip_linker_annotations(name).len() != name.len());
        symtab.add_symbol(record);
    }

    debug!(symbols = symtab.num_symbols(), skipped, "symbol table loaded");
    symtab
}

impl ObjectImage
{
    /// Parse the file described by `desc`, interning names into `pool`.
    ///
    /// ## Errors
    ///
    /// Returns `Io` if the file cannot be read and `ObjectParse` if it is not
    /// a recognised object format.
    pub fn parse(desc: ImageDescriptor, pool: Arc<StringPool>) -> Result<Self>
    {
        let bytes = fs::read(&desc.path)?;
        Self::parse_bytes(&bytes, desc, pool)
    }

    /// Like [`ObjectImage::parse`] with the file contents already in memory.
    ///
    /// ## Errors
    ///
    /// Returns `ObjectParse` if `data` is not a recognised object format.
    pub fn parse_bytes(data: &[u8], desc: ImageDescriptor, pool: Arc<StringPool>) -> Result<Self>
    {
        let file = object::File::parse(data)
            .map_err(|err| SymdexError::ObjectParse(format!("failed to parse {}: {err}", desc.path.display())))?;

        let byte_order = if file.is_little_endian() {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        };
        let architecture = map_architecture(file.architecture());

        let text_vmaddr = file
            .segments()
            .find(|segment| matches!(segment.name(), Ok(Some("__TEXT" | ".text"))))
            .or_else(|| file.segments().min_by_key(|segment| segment.address()))
            .map_or(0, |segment| segment.address());
        let mut max_addr = text_vmaddr;
        for segment in file.segments() {
            max_addr = max_addr.max(segment.address().saturating_add(segment.size()));
        }

        let load_address = desc.load_address.unwrap_or(text_vmaddr);
        let runtime_start = load_address;
        let runtime_end = runtime_start.saturating_add(max_addr.saturating_sub(text_vmaddr));
        let slide = load_address.wrapping_sub(text_vmaddr) as i64;

        let sections = Arc::new(build_sections(&file));
        let symtab = build_symtab(&file, &pool, sections.clone(), &desc.path);

        Ok(Self {
            id: ImageId::from_parts(&desc.path, load_address),
            path: desc.path,
            architecture,
            byte_order,
            slide,
            runtime_range: (runtime_start, runtime_end),
            sections,
            symtab,
        })
    }

    pub fn id(&self) -> ImageId
    {
        self.id
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    pub fn byte_order(&self) -> ByteOrder
    {
        self.byte_order
    }

    pub fn pointer_size(&self) -> u8
    {
        self.architecture.pointer_size_bytes()
    }

    pub fn sections(&self) -> &Arc<SectionList>
    {
        &self.sections
    }

    pub fn symtab(&self) -> &Symtab
    {
        &self.symtab
    }

    /// Difference between load addresses and file addresses.
    pub fn slide(&self) -> i64
    {
        self.slide
    }

    /// Whether `address` (a load address) lies inside the loaded image.
    pub fn contains(&self, address: Address) -> bool
    {
        let addr = address.value();
        addr >= self.runtime_range.0 && addr < self.runtime_range.1
    }

    /// Translate a load address inside the image to a file address.
    pub fn file_address(&self, address: Address) -> Option<Address>
    {
        if !self.contains(address) {
            return None;
        }
        address.checked_add_signed(self.slide.wrapping_neg())
    }

    /// Translate a file address to where it is loaded.
    pub fn load_address(&self, file_address: Address) -> Option<Address>
    {
        file_address.checked_add_signed(self.slide)
    }
}
