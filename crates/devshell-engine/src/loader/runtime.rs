//! Defined runtime types

use devshell_bytecode::descriptor::{internal_to_binary, to_source_name};
use devshell_bytecode::TypeImage;
use std::sync::Arc;

/// Shared handle to a defined type
pub type TypeHandle = Arc<RuntimeType>;

/// Where a defined type's image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOrigin {
    /// Pre-existing infrastructure type with the same identity on both sides
    Shared,
    /// Read from a bootstrap resource, never rewritten
    Bootstrap,
    /// Taken from the registry unchanged
    Compiled,
    /// Taken from the registry and changed by the rewriter
    Rewritten,
    /// Synthesized by the loader (marker interfaces)
    Synthesized,
}

/// A type defined in a hosted session
#[derive(Debug)]
pub struct RuntimeType {
    binary_name: String,
    image: TypeImage,
    origin: TypeOrigin,
    superclass: Option<TypeHandle>,
    interfaces: Vec<TypeHandle>,
}

impl RuntimeType {
    /// Create a type from its decoded image and already defined supertypes
    pub fn new(
        image: TypeImage,
        origin: TypeOrigin,
        superclass: Option<TypeHandle>,
        interfaces: Vec<TypeHandle>,
    ) -> TypeHandle {
        Arc::new(Self {
            binary_name: internal_to_binary(&image.name),
            image,
            origin,
            superclass,
            interfaces,
        })
    }

    /// Create a shared infrastructure type
    pub fn shared(image: TypeImage, superclass: Option<TypeHandle>) -> TypeHandle {
        Self::new(image, TypeOrigin::Shared, superclass, Vec::new())
    }

    /// Binary name (`a.b.Outer$Inner`)
    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    /// Internal name (`a/b/Outer$Inner`)
    pub fn internal_name(&self) -> &str {
        &self.image.name
    }

    /// Source name (`a.b.Outer.Inner`)
    pub fn source_name(&self) -> String {
        to_source_name(&self.binary_name)
    }

    /// The decoded image the type was defined from
    pub fn image(&self) -> &TypeImage {
        &self.image
    }

    /// Origin of the image
    pub fn origin(&self) -> TypeOrigin {
        self.origin
    }

    /// Superclass, if any
    pub fn superclass(&self) -> Option<&TypeHandle> {
        self.superclass.as_ref()
    }

    /// Directly implemented interfaces
    pub fn interfaces(&self) -> &[TypeHandle] {
        &self.interfaces
    }

    /// Whether this type is an interface
    pub fn is_interface(&self) -> bool {
        self.image.is_interface()
    }

    /// This type followed by its supertypes in lookup order: the superclass
    /// chain first, then every interface breadth-first, each type once.
    pub fn lineage(&self) -> Vec<&RuntimeType> {
        let mut out: Vec<&RuntimeType> = vec![self];
        let mut current = self.superclass.as_deref();
        while let Some(t) = current {
            out.push(t);
            current = t.superclass.as_deref();
        }

        let mut next = 0;
        while next < out.len() {
            let t = out[next];
            for iface in &t.interfaces {
                if !out.iter().any(|seen| std::ptr::eq(*seen, &**iface)) {
                    out.push(iface);
                }
            }
            next += 1;
        }
        out
    }

    /// Whether this type is, extends or implements the named type
    pub fn is_subtype_of(&self, binary_name: &str) -> bool {
        self.lineage().iter().any(|t| t.binary_name == binary_name)
    }
}
