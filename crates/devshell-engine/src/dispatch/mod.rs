//! Dispatch handles
//!
//! A dispatch handle packs a type id and a member id into one signed 32-bit
//! value, `(type_id << 16) | member_id`, so the host runtime can hold on to a
//! resolved member as a plain number. `-1` means "unresolved"; because an
//! unresolved member id is `-1` as well, OR-ing it into any type id still
//! yields `-1`.
//!
//! Handles stay valid until the owning oracle is cleared.

pub mod descriptor;
pub mod tables;

pub use descriptor::{Member, MemberKind, TypeDescriptor};
pub use tables::DispatchTables;

use crate::jsni::MalformedReference;
use std::sync::Arc;

/// Packed `(type_id << 16) | member_id`
pub type DispatchHandle = i32;

/// Handle of anything that could not be resolved
pub const UNRESOLVED: DispatchHandle = -1;

/// Type id reserved for the `null` no-op target
pub const NULL_TYPE_ID: u32 = 0xFFFF;

/// Pack a type id and member id into a handle
pub fn make_handle(type_id: u32, member_id: i32) -> DispatchHandle {
    ((type_id << 16) as i32) | member_id
}

/// Handle of the `null` no-op target
pub fn null_handle() -> DispatchHandle {
    make_handle(NULL_TYPE_ID, 0)
}

/// Type id packed into a handle
pub fn type_id_of(handle: DispatchHandle) -> u32 {
    ((handle >> 16) & 0xFFFF) as u32
}

/// Member id packed into a handle
pub fn member_id_of(handle: DispatchHandle) -> i32 {
    handle & 0xFFFF
}

/// Resolves symbolic references to dispatch handles
pub trait DispatchIdOracle {
    /// Resolve a reference to a handle
    ///
    /// Only a reference that does not parse is an error. A type or member
    /// that cannot be found is logged and yields [`UNRESOLVED`].
    fn resolve_handle(&self, reference: &str) -> Result<DispatchHandle, MalformedReference>;

    /// Descriptor of the type a handle was resolved against
    fn descriptor_for(&self, handle: DispatchHandle) -> Option<Arc<TypeDescriptor>>;

    /// Forget every descriptor; type ids restart at 0
    fn clear(&self);
}
