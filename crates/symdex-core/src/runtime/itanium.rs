//! Dynamic type discovery for Itanium C++ ABI objects.
//!
//! A polymorphic object starts with a pointer into its class's vtable (the
//! *address point*). The symbol covering that address is `vtable for X`,
//! which names the object's dynamic class, and the word two pointers before
//! the address point holds `offset_to_top`: the distance from this subobject
//! to the start of the complete object.

use std::sync::Arc;

use tracing::debug;

use super::{ProcessMemory, TargetImages, TypeCandidate};
use crate::error::Result;
use crate::symbols::demangle::VTABLE_DEMANGLED_PREFIX;
use crate::symbols::ImageId;
use crate::types::Address;

/// A value whose static type may have subclasses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicValue
{
    /// Address of the object (the pointer's value, or the referent's address).
    pub address: Address,
    /// The type the value is declared with.
    pub static_type: TypeCandidate,
}

/// The most derived type of an object and where that object starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicTypeInfo
{
    pub dynamic_type: TypeCandidate,
    /// Start of the complete object (`address + offset_to_top`).
    pub address: Address,
}

/// Resolves the dynamic type of C++ objects in a live process.
pub struct DynamicTypeResolver
{
    process: Arc<dyn ProcessMemory>,
    images: Arc<dyn TargetImages>,
}

impl DynamicTypeResolver
{
    pub fn new(process: Arc<dyn ProcessMemory>, images: Arc<dyn TargetImages>) -> Self
    {
        Self { process, images }
    }

    /// Class named by the vtable symbol covering `vtable_address_point`.
    fn class_name_for_vtable(&self, vtable_address_point: Address) -> Option<(ImageId, String)>
    {
        let resolved = self.images.resolve_load_address(vtable_address_point)?;
        let symtab = self.images.symtab(resolved.image)?;
        let symbol = symtab.find_symbol_containing_file_address(resolved.file_address)?;
        let name = symtab.demangled_name(&symbol)?;
        let class_name = name.strip_prefix(VTABLE_DEMANGLED_PREFIX)?;
        Some((resolved.image, class_name.to_string()))
    }

    fn find_class_type(&self, image: ImageId, class_name: &str) -> Option<TypeCandidate>
    {
        let mut candidates = self.images.find_types_by_name(Some(image), class_name, true, Some(1));
        if candidates.is_empty() {
            candidates = self.images.find_types_by_name(None, class_name, true, None);
        }

        match candidates.len() {
            0 => None,
            1 => candidates.pop(),
            count => {
                debug!(class_name, count, "multiple types match vtable class, preferring a C++ class");
                candidates.into_iter().find(|candidate| candidate.is_cxx_class)
            }
        }
    }

    /// Work out the dynamic type and complete-object address of `value`.
    ///
    /// Returns `Ok(None)` when the value has no usable vtable, when the
    /// vtable's class cannot be matched to a unique type, or when the dynamic
    /// type is the static type itself.
    ///
    /// ## Errors
    ///
    /// Returns `MemoryRead` if the vtable pointer or `offset_to_top` cannot be
    /// read from the process.
    pub fn get_dynamic_type_and_address(&self, value: &DynamicValue) -> Result<Option<DynamicTypeInfo>>
    {
        let pointer_size = u64::from(self.process.pointer_size());
        let vtable_address_point = Address::new(self.process.read_pointer(value.address)?);
        if vtable_address_point == Address::ZERO {
            return Ok(None);
        }

        let Some((image, class_name)) = self.class_name_for_vtable(vtable_address_point) else {
            return Ok(None);
        };
        debug!(
            address = %value.address,
            static_type = %value.static_type.name,
            vtable = %vtable_address_point,
            class_name = %class_name,
            "static type has vtable symbol"
        );

        let Some(dynamic_type) = self.find_class_type(image, &class_name) else {
            debug!(class_name = %class_name, "no unique type for vtable class");
            return Ok(None);
        };
        if dynamic_type == value.static_type {
            return Ok(None);
        }

        let Some(offset_to_top_address) = vtable_address_point.checked_sub(2 * pointer_size) else {
            return Ok(None);
        };
        let offset_to_top = self.process.read_signed_pointer(offset_to_top_address)?;
        let Some(address) = value.address.checked_add_signed(offset_to_top) else {
            return Ok(None);
        };

        debug!(
            address = %value.address,
            dynamic_type = %dynamic_type.name,
            offset_to_top,
            "found dynamic type"
        );
        Ok(Some(DynamicTypeInfo { dynamic_type, address }))
    }
}

/// Re-apply the pointer or reference decoration of `static_type_name` to a
/// dynamic class name found through the vtable.
///
/// ```rust
/// use symdex_core::runtime::fix_up_dynamic_type;
///
/// assert_eq!(fix_up_dynamic_type("Base *", "Derived"), "Derived *");
/// assert_eq!(fix_up_dynamic_type("const Base &", "Derived"), "Derived &");
/// assert_eq!(fix_up_dynamic_type("Base", "Derived"), "Derived");
/// ```
#[must_use]
pub fn fix_up_dynamic_type(static_type_name: &str, dynamic_class_name: &str) -> String
{
    let trimmed = static_type_name.trim_end();
    let suffix = if trimmed.ends_with("&&") {
        " &&"
    } else if trimmed.ends_with('&') {
        " &"
    } else if trimmed.ends_with('*') {
        " *"
    } else {
        ""
    };
    format!("{dynamic_class_name}{suffix}")
}

/// Whether `name` is the compiler-generated vtable pointer member.
#[must_use]
pub fn is_vtable_name(name: &str) -> bool
{
    name.starts_with("_vptr$")
}
