//! Tests for dynamic type discovery and helper function calls against a fake inferior

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use symdex_core::error::{Result, SymdexError};
use symdex_core::intern::StringPool;
use symdex_core::runtime::helper::RETURN_BUFFER_SIZE;
use symdex_core::runtime::{
    DynamicTypeResolver, DynamicValue, ExpressionResult, HelperCallOptions, HelperFunctionCaller, MemoryPermissions,
    ProcessMemory, ResolvedAddress, TargetImages, TypeCandidate,
};
use symdex_core::symbols::{ImageId, Symbol, Symtab};
use symdex_core::types::{Address, ByteOrder, SymbolType, ThreadId};

const BUFFER_BASE: u64 = 0x5000_0000;

/// A little-endian, 64-bit inferior backed by a map of byte regions.
#[derive(Default)]
struct FakeProcess
{
    regions: Mutex<BTreeMap<u64, Vec<u8>>>,
    allocations: Mutex<Vec<Address>>,
    freed: Mutex<Vec<Address>>,
    calls: Mutex<Vec<Vec<u64>>>,
    call_result: Option<ExpressionResult>,
    result_words: Vec<u64>,
    fail_allocation: bool,
    unsafe_to_call: bool,
}

impl FakeProcess
{
    fn write(&self, addr: u64, bytes: Vec<u8>)
    {
        self.regions.lock().insert(addr, bytes);
    }

    fn write_word(&self, addr: u64, word: u64)
    {
        self.write(addr, word.to_le_bytes().to_vec());
    }
}

impl ProcessMemory for FakeProcess
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
        let regions = self.regions.lock();
        let unmapped = || SymdexError::MemoryRead {
            address: addr,
            length: len,
            details: "unmapped".to_string(),
        };
        let (base, bytes) = regions.range(..=addr.value()).next_back().ok_or_else(unmapped)?;
        let offset = (addr.value() - base) as usize;
        if offset >= bytes.len() {
            return Err(unmapped());
        }
        let end = (offset + len).min(bytes.len());
        Ok(bytes[offset..end].to_vec())
    }

    fn allocate_memory(&self, size: usize, permissions: MemoryPermissions) -> Result<Address>
    {
        assert!(permissions.contains(MemoryPermissions::READ | MemoryPermissions::WRITE));
        if self.fail_allocation {
            return Err(SymdexError::ResourceExhausted(format!("no room for {size} bytes")));
        }
        let mut allocations = self.allocations.lock();
        let addr = Address::new(BUFFER_BASE + allocations.len() as u64 * 0x100);
        allocations.push(addr);
        Ok(addr)
    }

    fn deallocate_memory(&self, addr: Address) -> Result<()>
    {
        self.freed.lock().push(addr);
        Ok(())
    }

    fn call_function(&self, _thread: ThreadId, _function: Address, arguments: &[u64], options: &HelperCallOptions) -> ExpressionResult
    {
        assert!(options.unwind_on_error);
        self.calls.lock().push(arguments.to_vec());
        let result = self.call_result.unwrap_or(ExpressionResult::Completed);
        if result == ExpressionResult::Completed {
            let bytes = self.result_words.iter().flat_map(|word| word.to_le_bytes()).collect();
            self.write(arguments[0], bytes);
        }
        result
    }

    fn safe_to_call_functions(&self, _thread: ThreadId) -> bool
    {
        !self.unsafe_to_call
    }
}

/// One loaded image with a `vtable for Derived` symbol, slid by 0x10000.
struct FakeImages
{
    image: ImageId,
    symtab: Symtab,
    types: Vec<TypeCandidate>,
    searches: Mutex<Vec<(Option<ImageId>, Option<usize>)>>,
}

const SLIDE: u64 = 0x10000;
const VTABLE_FILE_ADDRESS: u64 = 0x4000;
const OBJECT_ADDRESS: u64 = 0x9000;

impl FakeImages
{
    fn new(types: impl FnOnce(ImageId) -> Vec<TypeCandidate>) -> Self
    {
        let pool = StringPool::shared();
        let mut symtab = Symtab::new(pool.clone());
        symtab.add_symbol(Symbol::at_address(&pool, 1, "_ZTV7Derived", SymbolType::Data, VTABLE_FILE_ADDRESS).with_size(0x20));
        symtab.add_symbol(Symbol::at_address(&pool, 2, "plain_data", SymbolType::Data, 0x5000).with_size(0x20));
        let image = ImageId::from_parts(Path::new("/usr/lib/libshapes.so"), SLIDE);
        Self {
            image,
            symtab,
            types: types(image),
            searches: Mutex::new(Vec::new()),
        }
    }
}

impl TargetImages for FakeImages
{
    fn resolve_load_address(&self, load_address: Address) -> Option<ResolvedAddress>
    {
        let file_address = load_address.value().checked_sub(SLIDE)?;
        Some(ResolvedAddress {
            image: self.image,
            file_address: Address::new(file_address),
        })
    }

    fn symtab(&self, image: ImageId) -> Option<&Symtab>
    {
        (image == self.image).then_some(&self.symtab)
    }

    fn find_types_by_name(&self, image: Option<ImageId>, name: &str, exact_match: bool, max_matches: Option<usize>) -> Vec<TypeCandidate>
    {
        assert!(exact_match);
        self.searches.lock().push((image, max_matches));
        let mut found: Vec<TypeCandidate> = self
            .types
            .iter()
            .filter(|candidate| candidate.name == name && image.map_or(true, |image| candidate.image == image))
            .cloned()
            .collect();
        if let Some(max) = max_matches {
            found.truncate(max);
        }
        found
    }
}

fn class(name: &str, image: ImageId) -> TypeCandidate
{
    TypeCandidate {
        name: name.to_string(),
        image,
        is_cxx_class: true,
    }
}

fn other_image() -> ImageId
{
    ImageId::from_parts(Path::new("/usr/lib/libother.so"), 0)
}

/// Object at 0x9000 whose vtable pointer targets 16 bytes into `vtable for Derived`.
fn process_with_object(offset_to_top: i64) -> Arc<FakeProcess>
{
    let process = FakeProcess::default();
    let address_point = SLIDE + VTABLE_FILE_ADDRESS + 0x10;
    process.write_word(OBJECT_ADDRESS, address_point);
    process.write(SLIDE + VTABLE_FILE_ADDRESS, offset_to_top.to_le_bytes().to_vec());
    Arc::new(process)
}

fn base_value(images: &FakeImages) -> DynamicValue
{
    DynamicValue {
        address: Address::new(OBJECT_ADDRESS),
        static_type: class("Base", images.image),
    }
}

#[test]
fn test_dynamic_type_found_through_vtable()
{
    let images = Arc::new(FakeImages::new(|image| vec![class("Base", image), class("Derived", image)]));
    let resolver = DynamicTypeResolver::new(process_with_object(-16), images.clone());

    let info = resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap().unwrap();
    assert_eq!(info.dynamic_type.name, "Derived");
    assert_eq!(info.address, Address::new(OBJECT_ADDRESS - 16));

    // Found in the defining image, so no target-wide search.
    assert_eq!(*images.searches.lock(), vec![(Some(images.image), Some(1))]);
}

#[test]
fn test_same_type_is_not_dynamic()
{
    let images = Arc::new(FakeImages::new(|image| vec![class("Derived", image)]));
    let resolver = DynamicTypeResolver::new(process_with_object(0), images.clone());

    let value = DynamicValue {
        address: Address::new(OBJECT_ADDRESS),
        static_type: class("Derived", images.image),
    };
    assert!(resolver.get_dynamic_type_and_address(&value).unwrap().is_none());
}

#[test]
fn test_falls_back_to_all_images()
{
    let elsewhere = other_image();
    let images = Arc::new(FakeImages::new(|_| {
        vec![
            TypeCandidate {
                name: "Derived".to_string(),
                image: elsewhere,
                is_cxx_class: false,
            },
            class("Derived", elsewhere),
        ]
    }));
    let resolver = DynamicTypeResolver::new(process_with_object(0), images.clone());

    let info = resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap().unwrap();
    assert!(info.dynamic_type.is_cxx_class);
    assert_eq!(info.dynamic_type.image, elsewhere);
    assert_eq!(info.address, Address::new(OBJECT_ADDRESS));
    assert_eq!(*images.searches.lock(), vec![(Some(images.image), Some(1)), (None, None)]);
}

#[test]
fn test_ambiguous_non_class_matches_fail()
{
    let elsewhere = other_image();
    let typedef = TypeCandidate {
        name: "Derived".to_string(),
        image: elsewhere,
        is_cxx_class: false,
    };
    let images = Arc::new(FakeImages::new(move |_| vec![typedef.clone(), typedef]));
    let resolver = DynamicTypeResolver::new(process_with_object(0), images.clone());

    assert!(resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap().is_none());
}

#[test]
fn test_unknown_class_is_not_dynamic()
{
    let images = Arc::new(FakeImages::new(|image| vec![class("Base", image)]));
    let resolver = DynamicTypeResolver::new(process_with_object(0), images.clone());

    assert!(resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap().is_none());
}

#[test]
fn test_vtable_pointer_outside_a_vtable()
{
    let images = Arc::new(FakeImages::new(|image| vec![class("Derived", image)]));
    let process = FakeProcess::default();
    // Points into `plain_data`, which is not a vtable.
    process.write_word(OBJECT_ADDRESS, SLIDE + 0x5008);
    let resolver = DynamicTypeResolver::new(Arc::new(process), images.clone());
    assert!(resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap().is_none());

    let null_object = FakeProcess::default();
    null_object.write_word(OBJECT_ADDRESS, 0);
    let resolver = DynamicTypeResolver::new(Arc::new(null_object), images.clone());
    assert!(resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap().is_none());
}

#[test]
fn test_unreadable_object_is_an_error()
{
    let images = Arc::new(FakeImages::new(|image| vec![class("Derived", image)]));
    let resolver = DynamicTypeResolver::new(Arc::new(FakeProcess::default()), images.clone());

    let err = resolver.get_dynamic_type_and_address(&base_value(&images)).unwrap_err();
    assert!(matches!(err, SymdexError::MemoryRead { length: 8, .. }));
}

#[test]
fn test_helper_call_reuses_return_buffer()
{
    let process = Arc::new(FakeProcess {
        result_words: vec![0x7000, 0x100, 3],
        ..FakeProcess::default()
    });
    let caller = HelperFunctionCaller::new(process.clone(), "__dispatch_queue_get_pending_items", Address::new(0x2_0000));
    assert!(caller.return_buffer().is_none());

    let first = caller.call(ThreadId(1), &[0xabc], 3).unwrap();
    assert_eq!(first, vec![0x7000, 0x100, 3]);
    let buffer = caller.return_buffer().unwrap();
    assert_eq!(buffer, Address::new(BUFFER_BASE));

    caller.call(ThreadId(1), &[], 1).unwrap();
    assert_eq!(process.allocations.lock().len(), 1);

    let calls = process.calls.lock();
    assert_eq!(calls[0], vec![BUFFER_BASE, 0xabc]);
    assert_eq!(calls[1], vec![BUFFER_BASE]);
}

#[test]
fn test_pending_items()
{
    let process = Arc::new(FakeProcess {
        result_words: vec![0x7000, 0x100, 3],
        ..FakeProcess::default()
    });
    let caller = HelperFunctionCaller::new(process.clone(), "__dispatch_queue_get_pending_items", Address::new(0x2_0000));

    let items = caller
        .get_pending_items(ThreadId(7), Address::new(0x6000), Some((Address::new(0x8000), 0x40)))
        .unwrap();
    assert_eq!(items.items_buffer_ptr, Address::new(0x7000));
    assert_eq!(items.items_buffer_size, 0x100);
    assert_eq!(items.count, 3);
    assert_eq!(process.calls.lock()[0], vec![BUFFER_BASE, 0x6000, 0x8000, 0x40]);

    caller.get_pending_items(ThreadId(7), Address::new(0x6000), None).unwrap();
    assert_eq!(process.calls.lock()[1], vec![BUFFER_BASE, 0x6000, 0, 0]);
}

#[test]
fn test_incomplete_call_preserves_result_code()
{
    let process = Arc::new(FakeProcess {
        call_result: Some(ExpressionResult::TimedOut),
        ..FakeProcess::default()
    });
    let caller = HelperFunctionCaller::new(process, "helper", Address::new(0x2_0000));

    let err = caller.call(ThreadId(1), &[], 1).unwrap_err();
    match err {
        SymdexError::ExecutionFailed { function, result } => {
            assert_eq!(function, "helper");
            assert_eq!(result, ExpressionResult::TimedOut);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_allocation_failure_is_resource_exhaustion()
{
    let process = Arc::new(FakeProcess {
        fail_allocation: true,
        ..FakeProcess::default()
    });
    let caller = HelperFunctionCaller::new(process.clone(), "helper", Address::new(0x2_0000));

    let err = caller.call(ThreadId(1), &[], 1).unwrap_err();
    assert!(matches!(err, SymdexError::ResourceExhausted(_)));
    assert!(process.calls.lock().is_empty());
}

#[test]
fn test_call_preconditions()
{
    let process = Arc::new(FakeProcess {
        unsafe_to_call: true,
        ..FakeProcess::default()
    });
    let caller = HelperFunctionCaller::new(process.clone(), "helper", Address::new(0x2_0000));
    assert!(matches!(caller.call(ThreadId(1), &[], 1), Err(SymdexError::NotSafeToCall(_))));
    assert!(process.allocations.lock().is_empty());

    let caller = HelperFunctionCaller::new(Arc::new(FakeProcess::default()), "helper", Address::new(0x2_0000));
    let too_many = RETURN_BUFFER_SIZE / 8 + 1;
    assert!(matches!(caller.call(ThreadId(1), &[], too_many), Err(SymdexError::InvalidArgument(_))));
    assert!(matches!(caller.call(ThreadId(1), &[], usize::MAX), Err(SymdexError::InvalidArgument(_))));
}

#[test]
fn test_drop_frees_return_buffer()
{
    let process = Arc::new(FakeProcess {
        result_words: vec![1],
        ..FakeProcess::default()
    });
    let caller = HelperFunctionCaller::new(process.clone(), "helper", Address::new(0x2_0000));
    caller.call(ThreadId(1), &[], 1).unwrap();
    drop(caller);
    assert_eq!(*process.freed.lock(), vec![Address::new(BUFFER_BASE)]);

    let unused = HelperFunctionCaller::new(process.clone(), "helper", Address::new(0x2_0000));
    drop(unused);
    assert_eq!(process.freed.lock().len(), 1);
}
