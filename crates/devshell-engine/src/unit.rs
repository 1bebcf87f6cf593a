//! Compiled units and the registry that supplies them
//!
//! The registry is owned by the external compiler. The loader only reads from
//! it: class images by internal name, and units by top-level type name.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Unit state flags
pub mod unit_flags {
    /// The unit compiled successfully
    pub const COMPILED: u8 = 1 << 0;
    /// The unit has upstream compile errors
    pub const ERROR: u8 = 1 << 1;
    /// The unit comes from an overlay (emulation) source tree
    pub const OVERLAY: u8 = 1 << 2;
}

/// A native-bridged method declared by a unit
///
/// The body is host-runtime code; symbolic references inside it are resolved
/// through the dispatch oracle when the host wires the method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMethod {
    /// Reference naming the method, e.g. `@a.b.C::foo(I)`
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// Host-runtime body
    pub body: String,
    /// Line of the declaration in the unit's source
    pub line: u32,
}

impl NativeMethod {
    /// Create a native method
    pub fn new(name: impl Into<String>, params: &[&str], body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: body.into(),
            line: 0,
        }
    }
}

/// The compiled image of one class within a unit
#[derive(Debug, Clone)]
pub struct CompiledClass {
    /// Internal name (`a/b/C$Inner`)
    pub internal_name: String,
    /// Top-level type name of the owning unit
    pub unit_name: String,
    /// Encoded type image
    pub bytes: Arc<[u8]>,
}

/// One compilation unit: a top-level type and its nested types
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    type_name: String,
    flags: u8,
    classes: Vec<CompiledClass>,
    native_methods: Vec<NativeMethod>,
    anonymous_renames: BTreeMap<String, String>,
}

impl CompiledUnit {
    /// Create a successfully compiled unit for the given top-level type name
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            flags: unit_flags::COMPILED,
            classes: Vec::new(),
            native_methods: Vec::new(),
            anonymous_renames: BTreeMap::new(),
        }
    }

    /// Add a compiled class image (builder style)
    pub fn with_class(mut self, internal_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.classes.push(CompiledClass {
            internal_name: internal_name.into(),
            unit_name: self.type_name.clone(),
            bytes: bytes.into(),
        });
        self
    }

    /// Add a native-bridged method (builder style)
    pub fn with_native_method(mut self, method: NativeMethod) -> Self {
        self.native_methods.push(method);
        self
    }

    /// Add an anonymous-type rename (internal names, builder style)
    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.anonymous_renames.insert(from.into(), to.into());
        self
    }

    /// Replace the state flags (builder style)
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Top-level type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// State flags, see [`unit_flags`]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Whether the unit compiled and carries no upstream errors
    pub fn is_usable(&self) -> bool {
        self.flags & unit_flags::COMPILED != 0 && self.flags & unit_flags::ERROR == 0
    }

    /// Whether the unit comes from an overlay source tree
    pub fn is_overlay(&self) -> bool {
        self.flags & unit_flags::OVERLAY != 0
    }

    /// Compiled classes of this unit
    pub fn classes(&self) -> &[CompiledClass] {
        &self.classes
    }

    /// Declared native-bridged methods
    pub fn native_methods(&self) -> &[NativeMethod] {
        &self.native_methods
    }

    /// Anonymous-type rename map (internal names)
    pub fn anonymous_renames(&self) -> &BTreeMap<String, String> {
        &self.anonymous_renames
    }
}

/// Source of compiled units
pub trait UnitRegistry: Send + Sync {
    /// Look up a compiled class by internal name
    fn compiled_class(&self, internal_name: &str) -> Option<CompiledClass>;

    /// Look up a unit by its top-level type name
    fn unit(&self, type_name: &str) -> Option<Arc<CompiledUnit>>;

    /// Image of a compiler-generated class the registry does not list
    /// (anonymous or synthetic classes emitted next to a unit)
    fn synthetic_class(&self, _internal_name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// In-memory unit registry
#[derive(Debug, Default)]
pub struct UnitStore {
    units: FxHashMap<String, Arc<CompiledUnit>>,
    classes: FxHashMap<String, CompiledClass>,
    synthetic: FxHashMap<String, Vec<u8>>,
}

impl UnitStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit and all of its classes
    pub fn add_unit(&mut self, unit: CompiledUnit) -> Arc<CompiledUnit> {
        for class in unit.classes() {
            self.classes
                .insert(class.internal_name.clone(), class.clone());
        }
        let unit = Arc::new(unit);
        self.units
            .insert(unit.type_name().to_string(), unit.clone());
        unit
    }

    /// Register the image of a generated class that is not part of any unit
    pub fn add_synthetic(&mut self, internal_name: impl Into<String>, bytes: Vec<u8>) {
        self.synthetic.insert(internal_name.into(), bytes);
    }

    /// Number of registered units
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl UnitRegistry for UnitStore {
    fn compiled_class(&self, internal_name: &str) -> Option<CompiledClass> {
        self.classes.get(internal_name).cloned()
    }

    fn unit(&self, type_name: &str) -> Option<Arc<CompiledUnit>> {
        self.units.get(type_name).cloned()
    }

    fn synthetic_class(&self, internal_name: &str) -> Option<Vec<u8>> {
        self.synthetic.get(internal_name).cloned()
    }
}
