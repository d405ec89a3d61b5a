//! # Symbol Table
//!
//! An ordered collection of [`Symbol`] records plus the derived indexes that
//! make it fast to query:
//!
//! - four name indexes: every name (`All`), function basenames, confirmed
//!   C++ methods and Objective-C selectors
//! - one address index mapping file-address ranges to symbol positions
//!
//! Derived indexes are built lazily on the first query that needs them and
//! thrown away (never patched) whenever a symbol is added or the section
//! layout changes. Index entries store positions in the backing vector, so
//! anything that can move a symbol invalidates them first.
//!
//! ## Thread Safety
//!
//! All queries take `&self` and serialize on one recursive lock held for the
//! whole call, including any lazy index build. The lock is recursive so a
//! caller may hold it (see [`Symtab::lock`]) across several queries, and so
//! callbacks passed to [`Symtab::for_each_symbol_containing_file_address`]
//! may query the table again. Bulk loading (`reserve`, `resize`,
//! `add_symbol`) takes `&mut self`, which gives the exclusive access those
//! operations need without locking at all.
//!
//! ## Example
//!
//! ```rust
//! use symdex_core::intern::StringPool;
//! use symdex_core::symbols::{Symbol, Symtab};
//! use symdex_core::types::{Address, FunctionNameType, SymbolType};
//!
//! let pool = StringPool::shared();
//! let mut symtab = Symtab::new(pool.clone());
//! symtab.add_symbol(Symbol::at_address(&pool, 1, "_ZN1A3fooEv", SymbolType::Code, 0x1000).with_size(0x10));
//! symtab.add_symbol(Symbol::at_address(&pool, 2, "main", SymbolType::Code, 0x1010).with_size(0x20));
//!
//! let hits = symtab.find_function_symbols("foo", FunctionNameType::METHOD);
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].symbol.id(), 1);
//!
//! let sym = symtab.find_symbol_containing_file_address(Address::new(0x1018)).unwrap();
//! assert_eq!(sym.id(), 2);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use regex::Regex;
use tracing::{debug, debug_span, trace};

use super::demangle::{is_cxx_function_mangling, DefaultDemangler, Demangler};
use super::name_index::{NameEntry, NameIndex};
use super::objc::ObjCMethodName;
use super::range::{RangeEntry, RangeIndex};
use super::sections::{leaf_section_ranges, SectionGeometry};
use super::symbol::{strip_linker_annotations, Symbol};
use crate::error::Result;
use crate::intern::{ConstString, StringPool};
use crate::types::{Address, DebugFilter, FunctionNameType, SymbolLanguage, SymbolType, Visibility};

/// Table-wide behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymtabOptions
{
    /// Put trampolines into the name indexes. Off by default so that name
    /// lookups resolve to real implementations rather than stubs.
    pub index_trampolines: bool,
    /// Infer sizes for symbols that report none, from the distance to the
    /// next symbol and the end of the containing section.
    pub synthesize_sizes: bool,
}

impl Default for SymtabOptions
{
    fn default() -> Self
    {
        Self {
            index_trampolines: false,
            synthesize_sizes: true,
        }
    }
}

/// Which of the four name indexes to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameIndexKind
{
    /// Mangled, demangled and category-stripped names.
    All,
    Basename,
    Method,
    Selector,
}

/// How [`Symtab::sort_symbol_indexes_by_value`] treats duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DuplicatePolicy
{
    /// Keep every entry.
    #[default]
    Keep,
    /// Drop repeated symbol indexes.
    SameIndex,
    /// Keep only the lowest-id symbol at each address.
    SameAddress,
}

/// Composite filter on type, debug flag and visibility.
///
/// Checks run cheapest first and stop at the first mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolFilter
{
    pub symbol_type: SymbolType,
    pub debug: DebugFilter,
    pub visibility: Visibility,
}

impl SymbolFilter
{
    /// Match any symbol.
    #[must_use]
    pub fn any() -> Self
    {
        Self::of_type(SymbolType::Any)
    }

    /// Match on type only.
    #[must_use]
    pub fn of_type(symbol_type: SymbolType) -> Self
    {
        Self {
            symbol_type,
            debug: DebugFilter::Any,
            visibility: Visibility::Any,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: DebugFilter) -> Self
    {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self
    {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn matches(&self, symbol: &Symbol) -> bool
    {
        if !symbol.symbol_type().matches(self.symbol_type) {
            return false;
        }
        let debug_ok = match self.debug {
            DebugFilter::Any => true,
            DebugFilter::Yes => symbol.is_debug(),
            DebugFilter::No => !symbol.is_debug(),
        };
        debug_ok
            && match self.visibility {
                Visibility::Any => true,
                Visibility::Extern => symbol.is_external(),
                Visibility::Private => !symbol.is_external(),
            }
    }
}

impl Default for SymbolFilter
{
    fn default() -> Self
    {
        Self::any()
    }
}

/// A symbol found by a lookup, with its position in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolContext
{
    pub index: u32,
    pub symbol: Symbol,
}

pub(crate) struct SymtabInner
{
    pub(crate) symbols: Vec<Symbol>,
    name_to_index: NameIndex,
    basename_to_index: NameIndex,
    method_to_index: NameIndex,
    selector_to_index: NameIndex,
    pub(crate) file_addr_to_index: RangeIndex<u32>,
    name_indexes_computed: bool,
    file_addr_to_index_computed: bool,
    ids_sorted: bool,
    id_order_dirty: bool,
    id_to_index: Option<HashMap<u32, u32>>,
    generation: u64,
}

impl SymtabInner
{
    fn new() -> Self
    {
        Self {
            symbols: Vec::new(),
            name_to_index: NameIndex::new(),
            basename_to_index: NameIndex::new(),
            method_to_index: NameIndex::new(),
            selector_to_index: NameIndex::new(),
            file_addr_to_index: RangeIndex::new(),
            name_indexes_computed: false,
            file_addr_to_index_computed: false,
            ids_sorted: true,
            id_order_dirty: false,
            id_to_index: None,
            generation: 0,
        }
    }

    fn invalidate(&mut self)
    {
        self.name_to_index.clear();
        self.basename_to_index.clear();
        self.method_to_index.clear();
        self.selector_to_index.clear();
        self.file_addr_to_index.clear();
        self.name_indexes_computed = false;
        self.file_addr_to_index_computed = false;
        self.generation = self.generation.wrapping_add(1);
    }

    fn index(&self, kind: NameIndexKind) -> &NameIndex
    {
        match kind {
            NameIndexKind::All => &self.name_to_index,
            NameIndexKind::Basename => &self.basename_to_index,
            NameIndexKind::Method => &self.method_to_index,
            NameIndexKind::Selector => &self.selector_to_index,
        }
    }

    fn symbol_at(&self, index: u32) -> Option<&Symbol>
    {
        self.symbols.get(index as usize)
    }

    fn needs_id_rebuild(&self) -> bool
    {
        self.id_order_dirty || (!self.ids_sorted && self.id_to_index.is_none())
    }

    fn rebuild_id_lookup(&mut self)
    {
        if self.id_order_dirty {
            self.ids_sorted = self.symbols.windows(2).all(|pair| pair[0].id() < pair[1].id());
            self.id_to_index = None;
            self.id_order_dirty = false;
        }
        if !self.ids_sorted && self.id_to_index.is_none() {
            debug!(symbols = self.symbols.len(), "symbol ids out of order, building id map");
            self.id_to_index = Some(
                self.symbols
                    .iter()
                    .enumerate()
                    .map(|(pos, symbol)| (symbol.id(), pos as u32))
                    .collect(),
            );
        }
    }

    fn index_of_id(&self, id: u32) -> Option<u32>
    {
        if self.ids_sorted {
            self.symbols.binary_search_by_key(&id, Symbol::id).ok().map(|pos| pos as u32)
        } else {
            match &self.id_to_index {
                Some(map) => map.get(&id).copied(),
                None => self.symbols.iter().position(|symbol| symbol.id() == id).map(|pos| pos as u32),
            }
        }
    }

    fn init_name_indexes(&mut self, pool: &StringPool, demangler: &dyn Demangler, options: SymtabOptions)
    {
        if self.name_indexes_computed {
            return;
        }
        self.name_indexes_computed = true;

        let num_symbols = self.symbols.len();
        let _span = debug_span!("init_name_indexes", symbols = num_symbols).entered();

        let Self {
            symbols,
            name_to_index,
            basename_to_index,
            method_to_index,
            selector_to_index,
            ..
        } = self;
        name_to_index.reserve(num_symbols);

        let mut class_contexts: HashSet<ConstString> = HashSet::new();
        // (basename, symbol index, context) whose context was not yet known
        // to be a class when the symbol was visited.
        let mut deferred: Vec<(ConstString, u32, ConstString)> = Vec::new();

        for (pos, symbol) in symbols.iter_mut().enumerate() {
            let value = pos as u32;
            if symbol.is_trampoline() && !options.index_trampolines {
                continue;
            }

            let language = symbol.language();
            let annotated = symbol.contains_linker_annotations();
            let mut classification = None;

            if let Some(mangled) = symbol.mangled().mangled_name() {
                let text = pool.resolve(mangled);
                name_to_index.append(mangled, value);
                if annotated {
                    append_stripped(pool, name_to_index, &text, mangled, value);
                }

                if symbol.symbol_type().is_code_like() && is_cxx_function_mangling(&text) {
                    let hint = if language == SymbolLanguage::Rust { language } else { SymbolLanguage::Cpp };
                    classification = demangler.demangle(&text, hint);
                }
            }

            if let Some(parts) = &classification {
                if !symbol.mangled().is_demangled_resolved() {
                    symbol.mangled_mut().set_demangled(pool.intern_non_empty(&parts.display));
                }
                if !parts.basename.is_empty() {
                    let basename = pool.intern(&parts.basename);
                    let context = pool.intern_non_empty(&parts.context);
                    if parts.basename.starts_with('~') || !parts.qualifiers.is_empty() {
                        // Destructors and cv-qualified functions only exist on classes.
                        if let Some(context) = context {
                            class_contexts.insert(context);
                        }
                        method_to_index.append(basename, value);
                    } else if let Some(context) = context {
                        if class_contexts.contains(&context) {
                            method_to_index.append(basename, value);
                        } else {
                            deferred.push((basename, value, context));
                        }
                    } else {
                        basename_to_index.append(basename, value);
                    }
                }
            }

            let Some(demangled) = symbol.mangled_mut().resolve_demangled(pool, demangler, language) else {
                continue;
            };
            let demangled_text = pool.resolve(demangled);
            name_to_index.append(demangled, value);
            if annotated {
                append_stripped(pool, name_to_index, &demangled_text, demangled, value);
            }

            if let Some(objc) = ObjCMethodName::parse(&demangled_text, true) {
                selector_to_index.append(pool.intern(objc.selector()), value);
                if let Some(without_category) = objc.full_name_without_category() {
                    name_to_index.append(pool.intern(&without_category), value);
                }
            }
        }

        let num_deferred = deferred.len();
        for (basename, value, context) in deferred {
            method_to_index.append(basename, value);
            if !class_contexts.contains(&context) {
                // Could be a namespace-scoped free function; keep it findable both ways.
                basename_to_index.append(basename, value);
            }
        }

        for index in [name_to_index, basename_to_index, method_to_index, selector_to_index] {
            index.sort();
            index.shrink_to_fit();
        }

        debug!(
            names = self.name_to_index.len(),
            basenames = self.basename_to_index.len(),
            methods = self.method_to_index.len(),
            selectors = self.selector_to_index.len(),
            class_contexts = class_contexts.len(),
            deferred = num_deferred,
            "name indexes built"
        );
    }

    fn init_address_indexes(&mut self, sections: Option<&dyn SectionGeometry>, options: SymtabOptions)
    {
        if self.file_addr_to_index_computed || self.symbols.is_empty() {
            return;
        }
        self.file_addr_to_index_computed = true;

        let _span = debug_span!("init_address_indexes", symbols = self.symbols.len()).entered();

        let Self {
            symbols,
            file_addr_to_index: index,
            ..
        } = self;
        index.clear();
        for (pos, symbol) in symbols.iter().enumerate() {
            if let Some(base) = symbol.file_address() {
                // Earlier synthesized sizes are recomputed against the current layout.
                let size = if symbol.size_is_synthesized() { 0 } else { symbol.byte_size() };
                index.append(RangeEntry::new(base, size, pos as u32));
            }
        }
        if index.is_empty() {
            return;
        }
        index.sort();

        if !options.synthesize_sizes {
            return;
        }

        let section_ranges = sections.map(leaf_section_ranges).unwrap_or_default();
        let num_entries = index.len();

        // Base of the first entry with a strictly greater base, per entry.
        let mut next_greater_base: Vec<Option<Address>> = vec![None; num_entries];
        let mut upcoming: Option<Address> = None;
        for i in (0..num_entries).rev() {
            next_greater_base[i] = upcoming;
            let base = index.get(i).map(|entry| entry.base);
            if i == 0 || index.get(i - 1).map(|entry| entry.base) != base {
                upcoming = base;
            }
        }

        let mut synthesized = 0usize;
        for (i, next_base) in next_greater_base.into_iter().enumerate() {
            let Some(entry) = index.get_mut(i) else {
                continue;
            };
            if entry.size != 0 {
                continue;
            }
            let base = entry.base;

            // Default to the end of the containing section.
            let mut size = section_ranges
                .find_entry_that_contains(base)
                .map_or(0, |section| section.end() - base.value());
            if let Some(next) = next_base.and_then(|next| next.offset_from(base)) {
                if size == 0 || next < size {
                    size = next;
                }
            }

            let symbol = &mut symbols[entry.data as usize];
            if size > 0 {
                entry.size = size;
                if symbol.set_synthesized_byte_size(size) {
                    synthesized += 1;
                }
            } else if symbol.size_is_synthesized() {
                symbol.clear_synthesized_byte_size();
            }
        }

        // Sizes changed; restore the (base, size) order.
        index.sort();
        debug!(entries = num_entries, synthesized, "address index built");
    }
}

static DEFAULT_DEMANGLER: Lazy<Arc<dyn Demangler>> = Lazy::new(|| Arc::new(DefaultDemangler));

fn append_stripped(pool: &StringPool, index: &mut NameIndex, text: &str, original: ConstString, value: u32)
{
    let stripped = pool.intern(strip_linker_annotations(text));
    if stripped != original {
        index.append(stripped, value);
    }
}

/// Guard holding the table lock; see [`Symtab::lock`].
pub struct SymtabLock<'a>
{
    _guard: ReentrantMutexGuard<'a, RefCell<SymtabInner>>,
}

/// Concurrent, lazily indexed symbol table.
pub struct Symtab
{
    pool: Arc<StringPool>,
    demangler: Arc<dyn Demangler>,
    sections: Option<Arc<dyn SectionGeometry>>,
    options: SymtabOptions,
    object_name: Option<String>,
    inner: ReentrantMutex<RefCell<SymtabInner>>,
}

impl std::fmt::Debug for Symtab
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Symtab")
            .field("object_name", &self.object_name)
            .field("num_symbols", &self.num_symbols())
            .field("options", &self.options)
            .field("has_sections", &self.sections.is_some())
            .finish()
    }
}

impl Symtab
{
    /// Create an empty table that interns names into `pool`.
    #[must_use]
    pub fn new(pool: Arc<StringPool>) -> Self
    {
        Self {
            pool,
            demangler: Arc::clone(&DEFAULT_DEMANGLER),
            sections: None,
            options: SymtabOptions::default(),
            object_name: None,
            inner: ReentrantMutex::new(RefCell::new(SymtabInner::new())),
        }
    }

    /// Replace the demangler (the default handles Itanium C++ and Rust).
    #[must_use]
    pub fn with_demangler(mut self, demangler: Arc<dyn Demangler>) -> Self
    {
        self.demangler = demangler;
        self.inner_mut().invalidate();
        self
    }

    /// Section layout used to bound synthesized symbol sizes.
    #[must_use]
    pub fn with_sections(mut self, sections: Arc<dyn SectionGeometry>) -> Self
    {
        self.set_sections(sections);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: SymtabOptions) -> Self
    {
        self.options = options;
        self.inner_mut().invalidate();
        self
    }

    /// Name of the object file, shown by [`Symtab::dump`].
    #[must_use]
    pub fn with_object_name(mut self, name: impl Into<String>) -> Self
    {
        self.object_name = Some(name.into());
        self
    }

    /// Replace the section layout; invalidates all derived indexes.
    pub fn set_sections(&mut self, sections: Arc<dyn SectionGeometry>)
    {
        self.sections = Some(sections);
        self.inner_mut().invalidate();
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<StringPool>
    {
        &self.pool
    }

    #[must_use]
    pub fn options(&self) -> SymtabOptions
    {
        self.options
    }

    #[must_use]
    pub fn object_name(&self) -> Option<&str>
    {
        self.object_name.as_deref()
    }

    fn inner_mut(&mut self) -> &mut SymtabInner
    {
        self.inner.get_mut().get_mut()
    }

    /// Hold the table lock across several queries.
    ///
    /// The lock is recursive, so queries made while the guard is alive
    /// simply re-enter it.
    pub fn lock(&self) -> SymtabLock<'_>
    {
        SymtabLock {
            _guard: self.inner.lock(),
        }
    }

    // Every query goes through here: take the lock, bring the requested
    // derived state up to date, then run `f` on a shared borrow. No borrow is
    // alive while user callbacks run, so nested calls can always rebuild.
    fn read<R>(&self, names: bool, addresses: bool, f: impl FnOnce(&SymtabInner) -> R) -> R
    {
        let guard = self.inner.lock();
        self.ensure(&guard, names, addresses);
        let inner = guard.borrow();
        f(&inner)
    }

    fn ensure(&self, cell: &RefCell<SymtabInner>, names: bool, addresses: bool)
    {
        let (need_names, need_addresses, need_ids) = {
            let inner = cell.borrow();
            (
                names && !inner.name_indexes_computed,
                addresses && !inner.file_addr_to_index_computed && !inner.symbols.is_empty(),
                inner.needs_id_rebuild(),
            )
        };
        if need_names || need_addresses || need_ids {
            let mut inner = cell.borrow_mut();
            if need_ids {
                inner.rebuild_id_lookup();
            }
            if need_names {
                inner.init_name_indexes(&self.pool, &*self.demangler, self.options);
            }
            if need_addresses {
                inner.init_address_indexes(self.sections.as_deref(), self.options);
            }
        }
    }

    /// Change counter, bumped every time derived indexes are invalidated.
    ///
    /// Callers caching symbol positions can compare generations to detect
    /// that the table changed underneath them.
    pub fn generation(&self) -> u64
    {
        self.read(false, false, |inner| inner.generation)
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    /// Reserve room for `additional` more symbols.
    pub fn reserve(&mut self, additional: usize)
    {
        self.inner_mut().symbols.reserve(additional);
    }

    /// Grow or shrink the table to `count` symbols, creating new ones with
    /// `fill(position)`, and return the whole backing slice for bulk filling.
    pub fn resize(&mut self, count: usize, mut fill: impl FnMut(u32) -> Symbol) -> &mut [Symbol]
    {
        let inner = self.inner_mut();
        inner.invalidate();
        inner.id_order_dirty = true;
        let start = inner.symbols.len();
        if count < start {
            inner.symbols.truncate(count);
        } else {
            inner.symbols.extend((start..count).map(|pos| fill(pos as u32)));
        }
        &mut inner.symbols
    }

    /// Append `symbol` and return its position. Invalidates all derived indexes.
    pub fn add_symbol(&mut self, symbol: Symbol) -> u32
    {
        let inner = self.inner_mut();
        let position = inner.symbols.len() as u32;
        if let Some(last) = inner.symbols.last() {
            if symbol.id() <= last.id() && inner.ids_sorted {
                inner.ids_sorted = false;
                inner.id_to_index = None;
            }
        }
        if let Some(map) = inner.id_to_index.as_mut() {
            map.insert(symbol.id(), position);
        }
        inner.symbols.push(symbol);
        inner.invalidate();
        position
    }

    /// Mutable access to one symbol; invalidates all derived indexes.
    pub fn symbol_at_index_mut(&mut self, index: u32) -> Option<&mut Symbol>
    {
        let inner = self.inner_mut();
        if index as usize >= inner.symbols.len() {
            return None;
        }
        inner.invalidate();
        inner.id_order_dirty = true;
        inner.symbols.get_mut(index as usize)
    }

    /// Section addresses moved: drop derived indexes so they are rebuilt.
    pub fn section_file_addresses_changed(&self)
    {
        let guard = self.inner.lock();
        guard.borrow_mut().invalidate();
    }

    #[must_use]
    pub fn num_symbols(&self) -> usize
    {
        self.read(false, false, |inner| inner.symbols.len())
    }

    /// Bounds-checked positional access.
    #[must_use]
    pub fn symbol_at_index(&self, index: u32) -> Option<Symbol>
    {
        self.read(false, false, |inner| inner.symbol_at(index).cloned())
    }

    /// Find a symbol by its id.
    ///
    /// Binary searches while ids are in ascending order (the usual case when
    /// ids are assigned in insertion order) and falls back to a hash map when
    /// they are not.
    #[must_use]
    pub fn find_symbol_by_id(&self, id: u32) -> Option<Symbol>
    {
        self.read(false, false, |inner| inner.index_of_id(id).and_then(|pos| inner.symbol_at(pos).cloned()))
    }

    /// Demangled name of `symbol`, demangling on the spot if the table has
    /// not cached it yet.
    #[must_use]
    pub fn demangled_name(&self, symbol: &Symbol) -> Option<Arc<str>>
    {
        let mangled = symbol.mangled();
        if mangled.is_demangled_resolved() {
            return mangled.demangled_name().map(|name| self.pool.resolve(name));
        }
        let raw = self.pool.resolve(mangled.mangled_name()?);
        self.demangler
            .demangle(&raw, symbol.language())
            .map(|demangled| Arc::from(demangled.display.as_str()))
    }

    /// Position of the symbol with id `id`.
    #[must_use]
    pub fn index_for_symbol_id(&self, id: u32) -> Option<u32>
    {
        self.read(false, false, |inner| inner.index_of_id(id))
    }

    // ------------------------------------------------------------------
    // Index construction
    // ------------------------------------------------------------------

    /// Build the four name indexes if they are stale. Idempotent.
    pub fn init_name_indexes(&self)
    {
        self.read(true, false, |_| ());
    }

    /// Build the address index (synthesizing missing sizes) if it is stale.
    pub fn init_address_indexes(&self)
    {
        self.read(false, true, |_| ());
    }

    /// Make sure every address symbol without a valid size gets one from the
    /// address index.
    pub fn calculate_symbol_sizes(&self)
    {
        let guard = self.inner.lock();
        self.ensure(&guard, false, true);
        let mut inner = guard.borrow_mut();
        let SymtabInner {
            symbols,
            file_addr_to_index,
            ..
        } = &mut *inner;
        for entry in file_addr_to_index.iter() {
            let symbol = &mut symbols[entry.data as usize];
            if !symbol.byte_size_is_valid() && entry.size > 0 {
                symbol.set_synthesized_byte_size(entry.size);
            }
        }
    }

    /// Whether the name indexes are currently built.
    #[must_use]
    pub fn name_indexes_computed(&self) -> bool
    {
        self.read(false, false, |inner| inner.name_indexes_computed)
    }

    /// Whether the address index is currently built.
    #[must_use]
    pub fn address_index_computed(&self) -> bool
    {
        self.read(false, false, |inner| inner.file_addr_to_index_computed)
    }

    /// Symbol indexes recorded under `name` in one name index.
    #[must_use]
    pub fn lookup_name_index(&self, kind: NameIndexKind, name: &str) -> Vec<u32>
    {
        let mut out = Vec::new();
        self.read(true, false, |inner| {
            // Basenames and demangled names are interned by the index build.
            if let Some(name) = self.pool.get(name) {
                inner.index(kind).get_values(name, &mut out);
            }
        });
        out
    }

    /// Copy of one name index's entries, in index order.
    #[must_use]
    pub fn name_index_entries(&self, kind: NameIndexKind) -> Vec<NameEntry>
    {
        self.read(true, false, |inner| inner.index(kind).iter().copied().collect())
    }

    // ------------------------------------------------------------------
    // Filtered scans
    // ------------------------------------------------------------------

    /// Append the positions of all symbols of `symbol_type`.
    pub fn append_symbol_indexes_with_type(&self, symbol_type: SymbolType, indexes: &mut Vec<u32>) -> usize
    {
        self.append_symbol_indexes_with_filter(SymbolFilter::of_type(symbol_type), 0..u32::MAX, indexes)
    }

    /// Append the positions in `window` of symbols passing `filter`.
    pub fn append_symbol_indexes_with_filter(&self, filter: SymbolFilter, window: Range<u32>, indexes: &mut Vec<u32>) -> usize
    {
        self.read(false, false, |inner| {
            let before = indexes.len();
            let end = (window.end as usize).min(inner.symbols.len());
            let start = (window.start as usize).min(end);
            indexes.extend(
                inner.symbols[start..end]
                    .iter()
                    .enumerate()
                    .filter(|(_, symbol)| filter.matches(symbol))
                    .map(|(offset, _)| (start + offset) as u32),
            );
            indexes.len() - before
        })
    }

    /// Append the positions of symbols of `symbol_type` whose flags word
    /// equals `flags_value`.
    pub fn append_symbol_indexes_with_type_and_flags_value(
        &self,
        symbol_type: SymbolType,
        flags_value: u32,
        indexes: &mut Vec<u32>,
    ) -> usize
    {
        self.read(false, false, |inner| {
            let before = indexes.len();
            indexes.extend(
                inner
                    .symbols
                    .iter()
                    .enumerate()
                    .filter(|(_, symbol)| symbol.symbol_type().matches(symbol_type) && symbol.flags() == flags_value)
                    .map(|(pos, _)| pos as u32),
            );
            indexes.len() - before
        })
    }

    /// Append the positions of every symbol named `name` (mangled,
    /// demangled or an index-only alias).
    pub fn append_symbol_indexes_with_name(&self, name: &str, indexes: &mut Vec<u32>) -> usize
    {
        self.append_symbol_indexes_with_name_filtered(name, SymbolFilter::any(), indexes)
    }

    /// Like [`Symtab::append_symbol_indexes_with_name`], keeping only
    /// symbols that pass `filter`.
    pub fn append_symbol_indexes_with_name_filtered(&self, name: &str, filter: SymbolFilter, indexes: &mut Vec<u32>) -> usize
    {
        self.read(true, false, |inner| {
            let Some(name) = self.pool.get(name) else {
                return 0;
            };
            let before = indexes.len();
            indexes.extend(
                inner
                    .name_to_index
                    .values_for(name)
                    .iter()
                    .map(|entry| entry.value)
                    .filter(|&pos| inner.symbol_at(pos).is_some_and(|symbol| filter.matches(symbol))),
            );
            indexes.len() - before
        })
    }

    /// Append positions of symbols named `name` with type `symbol_type`.
    pub fn append_symbol_indexes_with_name_and_type(&self, name: &str, symbol_type: SymbolType, indexes: &mut Vec<u32>) -> usize
    {
        self.append_symbol_indexes_with_name_filtered(name, SymbolFilter::of_type(symbol_type), indexes)
    }

    /// Append positions of symbols passing `filter` whose preferred name
    /// matches `regex`.
    pub fn append_symbol_indexes_matching_regex_and_type(
        &self,
        regex: &Regex,
        filter: SymbolFilter,
        indexes: &mut Vec<u32>,
    ) -> usize
    {
        // Preferred names are demangled, which happens during the name index build.
        self.read(true, false, |inner| {
            let before = indexes.len();
            for (pos, symbol) in inner.symbols.iter().enumerate() {
                if !filter.matches(symbol) {
                    continue;
                }
                if let Some(name) = symbol.name() {
                    if regex.is_match(&self.pool.resolve(name)) {
                        indexes.push(pos as u32);
                    }
                }
            }
            indexes.len() - before
        })
    }

    /// The first symbol at or after `*start_idx` passing `filter`.
    ///
    /// On success `*start_idx` is updated to the match's position so the
    /// caller can resume the search from `*start_idx + 1`.
    pub fn find_symbol_with_type(&self, filter: SymbolFilter, start_idx: &mut u32) -> Option<Symbol>
    {
        self.read(false, false, |inner| {
            let start = (*start_idx as usize).min(inner.symbols.len());
            let (offset, symbol) = inner.symbols[start..]
                .iter()
                .enumerate()
                .find(|(_, symbol)| filter.matches(symbol))?;
            *start_idx = (start + offset) as u32;
            Some(symbol.clone())
        })
    }

    /// All positions of symbols named `name` passing `filter`.
    #[must_use]
    pub fn find_all_symbols_with_name_and_type(&self, name: &str, filter: SymbolFilter) -> Vec<u32>
    {
        let mut indexes = Vec::new();
        self.append_symbol_indexes_with_name_filtered(name, filter, &mut indexes);
        indexes
    }

    /// All positions of symbols passing `filter` whose name matches `pattern`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidRegex` if `pattern` does not compile.
    pub fn find_all_symbols_matching_regex_and_type(&self, pattern: &str, filter: SymbolFilter) -> Result<Vec<u32>>
    {
        let regex = Regex::new(pattern)?;
        let mut indexes = Vec::new();
        self.append_symbol_indexes_matching_regex_and_type(&regex, filter, &mut indexes);
        Ok(indexes)
    }

    /// The first symbol named `name` passing `filter`.
    #[must_use]
    pub fn find_first_symbol_with_name_and_type(&self, name: &str, filter: SymbolFilter) -> Option<Symbol>
    {
        let _lock = self.lock();
        let positions = self.find_all_symbols_with_name_and_type(name, filter);
        let handle = self.pool.get(name)?;
        positions
            .into_iter()
            .filter_map(|pos| self.symbol_at_index(pos))
            .find(|symbol| symbol.compare(handle, filter.symbol_type))
    }

    /// Insert the names of the symbols at `indexes` into `map`.
    pub fn append_symbol_names_to_map(&self, indexes: &[u32], add_demangled: bool, add_mangled: bool, map: &mut NameIndex)
    {
        if !add_demangled && !add_mangled {
            return;
        }
        self.read(add_demangled, false, |inner| {
            for &pos in indexes {
                let Some(symbol) = inner.symbol_at(pos) else {
                    continue;
                };
                if add_demangled {
                    if let Some(name) = symbol.mangled().demangled_name() {
                        map.append(name, pos);
                    }
                }
                if add_mangled {
                    if let Some(name) = symbol.mangled().mangled_name() {
                        map.append(name, pos);
                    }
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Function lookup
    // ------------------------------------------------------------------

    /// Find function symbols named `name` using the strategies in `name_type_mask`.
    ///
    /// - `FULL` or `BASE`: exact-name matches of function-like symbols
    /// - `BASE`: the basename index
    /// - `METHOD`: the method index
    /// - `SELECTOR`: the selector index
    ///
    /// Results are unioned, sorted by position and deduplicated.
    #[must_use]
    pub fn find_function_symbols(&self, name: &str, name_type_mask: FunctionNameType) -> Vec<SymbolContext>
    {
        self.read(true, false, |inner| {
            let Some(handle) = self.pool.get(name) else {
                return Vec::new();
            };
            let mut symbol_indexes: Vec<u32> = Vec::new();

            if name_type_mask.intersects(FunctionNameType::BASE | FunctionNameType::FULL) {
                symbol_indexes.extend(
                    inner
                        .name_to_index
                        .values_for(handle)
                        .iter()
                        .map(|entry| entry.value)
                        .filter(|&pos| inner.symbol_at(pos).is_some_and(|s| s.symbol_type().is_function_like())),
                );
            }

            let strategies = [
                (FunctionNameType::BASE, NameIndexKind::Basename),
                (FunctionNameType::METHOD, NameIndexKind::Method),
                (FunctionNameType::SELECTOR, NameIndexKind::Selector),
            ];
            for (flag, kind) in strategies {
                if name_type_mask.contains(flag) {
                    inner.index(kind).get_values(handle, &mut symbol_indexes);
                }
            }

            symbol_indexes.sort_unstable();
            symbol_indexes.dedup();
            trace!(name, count = symbol_indexes.len(), "function symbols");

            symbol_indexes
                .into_iter()
                .filter_map(|index| {
                    inner.symbol_at(index).map(|symbol| SymbolContext {
                        index,
                        symbol: symbol.clone(),
                    })
                })
                .collect()
        })
    }

    /// Resolve positions to symbols, skipping out-of-range entries.
    #[must_use]
    pub fn symbol_indices_to_contexts(&self, indexes: &[u32]) -> Vec<SymbolContext>
    {
        self.read(false, false, |inner| {
            indexes
                .iter()
                .filter_map(|&index| {
                    inner.symbol_at(index).map(|symbol| SymbolContext {
                        index,
                        symbol: symbol.clone(),
                    })
                })
                .collect()
        })
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Stable-sort symbol positions by file address, ties broken by id.
    ///
    /// Symbols without an address sort last. Each position's sort key is
    /// resolved once, however many comparisons the sort performs.
    /// `DuplicatePolicy::SameAddress` keeps the lowest id at each address.
    pub fn sort_symbol_indexes_by_value(&self, indexes: &mut Vec<u32>, duplicates: DuplicatePolicy)
    {
        if indexes.len() <= 1 {
            return;
        }
        self.read(false, false, |inner| {
            let key = |pos: u32| -> (u64, u32) {
                inner.symbol_at(pos).map_or((u64::MAX, u32::MAX), |symbol| {
                    (symbol.file_address().map_or(u64::MAX, Address::value), symbol.id())
                })
            };
            indexes.sort_by_cached_key(|&pos| key(pos));

            match duplicates {
                DuplicatePolicy::Keep => {}
                DuplicatePolicy::SameIndex => indexes.dedup(),
                DuplicatePolicy::SameAddress => indexes.dedup_by_key(|pos| key(*pos).0),
            }
        });
    }

    // ------------------------------------------------------------------
    // Address queries
    // ------------------------------------------------------------------

    /// The symbol whose address is exactly `file_address`.
    #[must_use]
    pub fn find_symbol_at_file_address(&self, file_address: Address) -> Option<Symbol>
    {
        self.read(false, true, |inner| {
            let entry = inner.file_addr_to_index.find_entry_starts_at(file_address)?;
            inner
                .symbol_at(entry.data)
                .filter(|symbol| symbol.file_address() == Some(file_address))
                .cloned()
        })
    }

    /// A symbol whose range contains `file_address`.
    #[must_use]
    pub fn find_symbol_containing_file_address(&self, file_address: Address) -> Option<Symbol>
    {
        self.read(false, true, |inner| {
            let entry = inner.file_addr_to_index.find_entry_that_contains(file_address)?;
            inner
                .symbol_at(entry.data)
                .filter(|symbol| symbol.contains_file_address(file_address))
                .cloned()
        })
    }

    /// Visit every symbol whose range contains `file_address`, outermost
    /// (lowest base) first. Return `false` from `callback` to stop early.
    ///
    /// The table lock is held for the whole walk; the callback may query the
    /// table again.
    pub fn for_each_symbol_containing_file_address(&self, file_address: Address, mut callback: impl FnMut(u32, &Symbol) -> bool)
    {
        let _lock = self.lock();
        let hits: Vec<(u32, Symbol)> = self.read(false, true, |inner| {
            inner
                .file_addr_to_index
                .find_entry_indexes_that_contain(file_address)
                .into_iter()
                .filter_map(|pos| {
                    inner
                        .symbol_at(pos)
                        .filter(|symbol| symbol.contains_file_address(file_address))
                        .map(|symbol| (pos, symbol.clone()))
                })
                .collect()
        });

        for (pos, symbol) in &hits {
            if !callback(*pos, symbol) {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Nesting
    // ------------------------------------------------------------------

    /// Position of the nearest earlier symbol whose sibling index points past
    /// `child_index`, i.e. the innermost symbol enclosing it.
    #[must_use]
    pub fn parent_index(&self, child_index: u32) -> Option<u32>
    {
        self.read(false, false, |inner| {
            if child_index as usize >= inner.symbols.len() {
                return None;
            }
            (0..child_index)
                .rev()
                .find(|&pos| inner.symbols[pos as usize].sibling_index().is_some_and(|sibling| sibling > child_index))
        })
    }

    /// The innermost symbol enclosing the one at `child_index`, or `None` for
    /// a top-level symbol.
    #[must_use]
    pub fn get_parent(&self, child_index: u32) -> Option<Symbol>
    {
        let _lock = self.lock();
        self.parent_index(child_index).and_then(|pos| self.symbol_at_index(pos))
    }

    // Shared with the dump module.
    pub(crate) fn read_with_addresses<R>(&self, f: impl FnOnce(&SymtabInner) -> R) -> R
    {
        self.read(true, true, f)
    }

    pub(crate) fn read_plain<R>(&self, f: impl FnOnce(&SymtabInner) -> R) -> R
    {
        self.read(true, false, f)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::symbols::sections::{Section, SectionList};

    fn scenario() -> (Arc<StringPool>, Symtab)
    {
        let pool = StringPool::shared();
        let sections: SectionList = [Section::new("__text", 0x1000, 0x20)].into_iter().collect();
        let mut symtab = Symtab::new(pool.clone()).with_sections(Arc::new(sections));
        symtab.add_symbol(Symbol::at_address(&pool, 1, "_ZN1A3fooEv", SymbolType::Code, 0x1000));
        symtab.add_symbol(Symbol::at_address(&pool, 2, "_ZN1A3barEv", SymbolType::Code, 0x1010));
        symtab.add_symbol(Symbol::at_address(&pool, 3, "g_var", SymbolType::Data, 0x2000).with_size(0x100));
        (pool, symtab)
    }

    #[test]
    fn test_add_symbol_invalidates()
    {
        let (pool, mut symtab) = scenario();
        symtab.init_name_indexes();
        symtab.init_address_indexes();
        assert!(symtab.name_indexes_computed());
        assert!(symtab.address_index_computed());
        let generation = symtab.generation();

        symtab.add_symbol(Symbol::at_address(&pool, 4, "main", SymbolType::Code, 0x1018));
        assert!(!symtab.name_indexes_computed());
        assert!(!symtab.address_index_computed());
        assert!(symtab.generation() > generation);
    }

    #[test]
    fn test_resynthesis_after_insert_shrinks_sizes()
    {
        let (pool, mut symtab) = scenario();
        symtab.init_address_indexes();
        assert_eq!(symtab.symbol_at_index(1).map(|s| s.byte_size()), Some(0x10));

        symtab.add_symbol(Symbol::at_address(&pool, 4, "tail", SymbolType::Code, 0x1018));
        symtab.init_address_indexes();
        let bar = symtab.symbol_at_index(1).unwrap();
        assert_eq!(bar.byte_size(), 0x8);
        assert!(bar.size_is_synthesized());
    }

    #[test]
    fn test_id_lookup_falls_back_when_unsorted()
    {
        let pool = StringPool::shared();
        let mut symtab = Symtab::new(pool.clone());
        symtab.add_symbol(Symbol::at_address(&pool, 10, "a", SymbolType::Code, 0x10));
        symtab.add_symbol(Symbol::at_address(&pool, 5, "b", SymbolType::Code, 0x20));
        symtab.add_symbol(Symbol::at_address(&pool, 7, "c", SymbolType::Code, 0x30));

        assert_eq!(symtab.index_for_symbol_id(5), Some(1));
        assert_eq!(symtab.index_for_symbol_id(7), Some(2));
        assert_eq!(symtab.find_symbol_by_id(10).map(|s| s.id()), Some(10));
        assert!(symtab.find_symbol_by_id(11).is_none());
    }

    #[test]
    fn test_resize_and_mutation_rebuild_id_order()
    {
        let pool = StringPool::shared();
        let mut symtab = Symtab::new(pool.clone());
        let slots = symtab.resize(3, |pos| Symbol::at_address(&pool, pos + 1, "x", SymbolType::Data, 0));
        assert_eq!(slots.len(), 3);
        assert_eq!(symtab.index_for_symbol_id(3), Some(2));

        if let Some(symbol) = symtab.symbol_at_index_mut(0) {
            *symbol = Symbol::at_address(&pool, 99, "y", SymbolType::Data, 0);
        }
        assert_eq!(symtab.index_for_symbol_id(99), Some(0));
        assert_eq!(symtab.index_for_symbol_id(2), Some(1));
        assert!(symtab.symbol_at_index_mut(7).is_none());
    }

    #[test]
    fn test_trampolines_not_indexed_by_default()
    {
        let pool = StringPool::shared();
        let mut symtab = Symtab::new(pool.clone());
        symtab.add_symbol(Symbol::at_address(&pool, 1, "printf", SymbolType::Trampoline, 0x10));
        assert!(symtab.lookup_name_index(NameIndexKind::All, "printf").is_empty());

        let symtab = symtab.with_options(SymtabOptions {
            index_trampolines: true,
            ..SymtabOptions::default()
        });
        assert_eq!(symtab.lookup_name_index(NameIndexKind::All, "printf"), vec![0]);
    }

    #[test]
    fn test_filter_checks()
    {
        let pool = StringPool::shared();
        let debug_extern = Symbol::at_address(&pool, 1, "f", SymbolType::Code, 0)
            .with_debug(true)
            .with_external(true);
        let filter = SymbolFilter::of_type(SymbolType::Code)
            .with_debug(DebugFilter::Yes)
            .with_visibility(Visibility::Extern);
        assert!(filter.matches(&debug_extern));
        assert!(!filter.with_visibility(Visibility::Private).matches(&debug_extern));
        assert!(!SymbolFilter::of_type(SymbolType::Data).matches(&debug_extern));
    }
}
