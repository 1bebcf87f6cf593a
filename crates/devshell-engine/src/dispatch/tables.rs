//! Append-only type table and name map

use super::descriptor::TypeDescriptor;
use super::NULL_TYPE_ID;
use crate::loader::runtime::TypeHandle;
use devshell_bytecode::descriptor::to_source_name;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Type descriptors by id and by every spelling they were reached through
#[derive(Debug)]
pub struct DispatchTables {
    /// Descriptors indexed by type id
    types: Vec<Arc<TypeDescriptor>>,
    /// Source, binary and requested spellings to descriptor
    by_name: FxHashMap<String, Arc<TypeDescriptor>>,
}

impl DispatchTables {
    /// Create empty tables
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Look up a descriptor by any spelling it was registered under
    pub fn lookup(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.by_name.get(name).cloned()
    }

    /// Descriptor by type id
    pub fn get(&self, type_id: usize) -> Option<Arc<TypeDescriptor>> {
        self.types.get(type_id).cloned()
    }

    /// Register another spelling for an existing descriptor
    pub fn alias(&mut self, name: &str, descriptor: &Arc<TypeDescriptor>) {
        self.by_name
            .entry(name.to_string())
            .or_insert_with(|| descriptor.clone());
    }

    /// Create a descriptor with the next type id, registered under the binary
    /// and source names of the type
    ///
    /// # Returns
    /// `None` once every id below the null type id is taken
    pub fn create(&mut self, runtime: TypeHandle) -> Option<Arc<TypeDescriptor>> {
        let type_id = self.types.len() as u32;
        if type_id >= NULL_TYPE_ID {
            return None;
        }

        let binary = runtime.binary_name().to_string();
        // A companion `X$` answers to the source name of `X`
        let source = to_source_name(binary.trim_end_matches('$'));
        let descriptor = Arc::new(TypeDescriptor::new(type_id, runtime));
        self.types.push(descriptor.clone());
        self.alias(&binary, &descriptor);
        self.alias(&source, &descriptor);
        Some(descriptor)
    }

    /// Get next available type id
    pub fn next_type_id(&self) -> usize {
        self.types.len()
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no descriptor exists
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Drop every descriptor and name; ids restart at 0
    pub fn clear(&mut self) {
        self.types.clear();
        self.by_name.clear();
    }
}

impl Default for DispatchTables {
    fn default() -> Self {
        Self::new()
    }
}
