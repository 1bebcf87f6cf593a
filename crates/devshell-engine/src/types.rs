//! External type metadata
//!
//! The compiler's view of the type hierarchy. The loader consults it to
//! canonicalize names, to find the marker hierarchy, and to answer
//! assignability questions for the marker rewriter.

use devshell_bytecode::descriptor::{binary_to_internal, signature_of, to_source_name};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// A method as seen by the type metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Method name
    pub name: String,
    /// Full descriptor, e.g. `(I)Ljava/lang/String;`
    pub descriptor: String,
    /// Whether the method is static
    pub is_static: bool,
}

impl MethodInfo {
    /// Instance method
    pub fn instance(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: false,
        }
    }

    /// Static method
    pub fn static_method(name: &str, descriptor: &str) -> Self {
        Self {
            is_static: true,
            ..Self::instance(name, descriptor)
        }
    }

    /// `name` + `descriptor`
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// Metadata for one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Binary name (`a.b.Outer$Inner`)
    pub binary_name: String,
    /// Binary name of the superclass
    pub superclass: Option<String>,
    /// Binary names of directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared methods
    pub methods: Vec<MethodInfo>,
    /// Whether this is an interface
    pub is_interface: bool,
}

impl TypeInfo {
    /// Class with the given binary name and superclass
    pub fn class(binary_name: &str, superclass: Option<&str>) -> Self {
        Self {
            binary_name: binary_name.to_string(),
            superclass: superclass.map(str::to_string),
            interfaces: Vec::new(),
            methods: Vec::new(),
            is_interface: false,
        }
    }

    /// Add a method (builder style)
    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Add an implemented interface (builder style)
    pub fn with_interface(mut self, binary_name: &str) -> Self {
        self.interfaces.push(binary_name.to_string());
        self
    }

    /// Source name (`a.b.Outer.Inner`)
    pub fn source_name(&self) -> String {
        to_source_name(&self.binary_name)
    }

    /// Internal name (`a/b/Outer$Inner`)
    pub fn internal_name(&self) -> String {
        binary_to_internal(&self.binary_name)
    }

    /// Signature (`La/b/Outer$Inner;`)
    pub fn signature(&self) -> String {
        signature_of(&self.binary_name)
    }
}

/// Query interface over the compiler's type metadata
pub trait TypeOracle: Send + Sync {
    /// Find a type by source name
    fn find_type(&self, source_name: &str) -> Option<Arc<TypeInfo>>;

    /// All transitive subtypes of a type (binary name), excluding the type
    /// itself, in a stable order
    fn subtypes(&self, binary_name: &str) -> Vec<Arc<TypeInfo>>;

    /// Whether `from` is assignable to `to` (binary names)
    fn is_assignable(&self, from: &str, to: &str) -> bool;
}

/// In-memory type metadata
#[derive(Debug, Default)]
pub struct TypeCatalog {
    by_source: FxHashMap<String, Arc<TypeInfo>>,
}

impl TypeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type
    pub fn add_type(&mut self, info: TypeInfo) -> Arc<TypeInfo> {
        let info = Arc::new(info);
        self.by_source.insert(info.source_name(), info.clone());
        info
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    fn by_binary(&self, binary_name: &str) -> Option<&Arc<TypeInfo>> {
        self.by_source.get(&to_source_name(binary_name))
    }
}

impl TypeOracle for TypeCatalog {
    fn find_type(&self, source_name: &str) -> Option<Arc<TypeInfo>> {
        self.by_source.get(source_name).cloned()
    }

    fn subtypes(&self, binary_name: &str) -> Vec<Arc<TypeInfo>> {
        let mut out: Vec<Arc<TypeInfo>> = self
            .by_source
            .values()
            .filter(|t| t.binary_name != binary_name && self.is_assignable(&t.binary_name, binary_name))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.binary_name.cmp(&b.binary_name));
        out
    }

    fn is_assignable(&self, from: &str, to: &str) -> bool {
        let mut pending = vec![from.to_string()];
        let mut seen = FxHashSet::default();
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(info) = self.by_binary(&current) {
                pending.extend(info.superclass.iter().cloned());
                pending.extend(info.interfaces.iter().cloned());
            }
        }
        false
    }
}
