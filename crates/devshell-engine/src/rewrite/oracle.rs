//! Declaring-type lookup for marker instance methods

use super::RewriteError;
use crate::types::{TypeInfo, TypeOracle};
use devshell_bytecode::descriptor::{internal_to_binary, to_source_name};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Answers which marker type originally declared an instance method
///
/// Built once from the type metadata: every non-static method of every
/// marker type is recorded under its signature (`name` + full descriptor).
/// Methods of the universal root override all other declarers, so calls to
/// them stay virtual.
pub struct InstanceMethodOracle {
    /// Signature to internal names of the declaring types
    declarers: FxHashMap<String, BTreeSet<String>>,
    types: Arc<dyn TypeOracle>,
}

impl InstanceMethodOracle {
    /// Build the oracle
    ///
    /// # Arguments
    /// * `types` - Type metadata, used for assignability checks
    /// * `marker_types` - The marker root and all of its subtypes
    /// * `universal_root` - The universal root type, if known
    pub fn new(
        types: Arc<dyn TypeOracle>,
        marker_types: &[Arc<TypeInfo>],
        universal_root: Option<&TypeInfo>,
    ) -> Self {
        let mut declarers: FxHashMap<String, BTreeSet<String>> = FxHashMap::default();
        for info in marker_types {
            for method in info.methods.iter().filter(|m| !m.is_static) {
                declarers
                    .entry(method.signature())
                    .or_default()
                    .insert(info.internal_name());
            }
        }

        // The universal root clobbers everything
        if let Some(root) = universal_root {
            for method in root.methods.iter().filter(|m| !m.is_static) {
                declarers.insert(
                    method.signature(),
                    BTreeSet::from([root.internal_name()]),
                );
            }
        }

        Self { declarers, types }
    }

    /// Types declaring a signature, if any
    pub fn declarers(&self, signature: &str) -> Option<&BTreeSet<String>> {
        self.declarers.get(signature)
    }

    /// Find the type that originally declared a method
    ///
    /// # Arguments
    /// * `type_desc` - Internal name of the type the call is made on
    /// * `signature` - Method name followed by its full descriptor
    ///
    /// # Returns
    /// Internal name of the declaring type. A signature with no declarer
    /// assignable from `type_desc` means the marker metadata is
    /// inconsistent; that is reported as [`RewriteError::UnresolvableOwner`]
    /// and must not be retried.
    pub fn find_original_declaring_class(
        &self,
        type_desc: &str,
        signature: &str,
    ) -> Result<String, RewriteError> {
        let unresolvable = || RewriteError::UnresolvableOwner {
            type_desc: type_desc.to_string(),
            signature: signature.to_string(),
        };

        let candidates = self.declarers.get(signature).ok_or_else(unresolvable)?;
        if candidates.len() == 1 {
            // Only one answer, it must be right
            if let Some(only) = candidates.iter().next() {
                return Ok(only.clone());
            }
        }

        if candidates.contains(type_desc) {
            return Ok(type_desc.to_string());
        }

        let declared = self
            .types
            .find_type(&to_source_name(type_desc))
            .ok_or_else(unresolvable)?;
        candidates
            .iter()
            .find(|candidate| {
                self.types
                    .is_assignable(&declared.binary_name, &internal_to_binary(candidate))
            })
            .cloned()
            .ok_or_else(unresolvable)
    }
}

impl std::fmt::Debug for InstanceMethodOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceMethodOracle")
            .field("signatures", &self.declarers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MethodInfo, TypeCatalog};

    /// Root declares toString(), M1 declares foo(), M2 extends M1, and
    /// M3 declares its own foo() alongside M1.
    fn oracle() -> InstanceMethodOracle {
        let mut catalog = TypeCatalog::new();
        let object = catalog.add_type(
            TypeInfo::class("java.lang.Object", None)
                .with_method(MethodInfo::instance("toString", "()Ljava/lang/String;")),
        );
        let root = catalog.add_type(
            TypeInfo::class("m.Root", Some("java.lang.Object"))
                .with_method(MethodInfo::instance("toString", "()Ljava/lang/String;")),
        );
        let m1 = catalog.add_type(
            TypeInfo::class("m.M1", Some("m.Root"))
                .with_method(MethodInfo::instance("foo", "()V"))
                .with_method(MethodInfo::static_method("make", "()Lm/M1;")),
        );
        let m2 = catalog.add_type(TypeInfo::class("m.M2", Some("m.M1")));
        let m3 = catalog.add_type(
            TypeInfo::class("m.M3", Some("m.Root")).with_method(MethodInfo::instance("foo", "()V")),
        );
        let markers = vec![root, m1, m2, m3];
        InstanceMethodOracle::new(Arc::new(catalog), &markers, Some(&object))
    }

    #[test]
    fn test_root_declaration_clobbers() {
        let oracle = oracle();
        for owner in ["m/Root", "m/M1", "m/M2", "m/M3"] {
            assert_eq!(
                oracle
                    .find_original_declaring_class(owner, "toString()Ljava/lang/String;")
                    .unwrap(),
                "java/lang/Object"
            );
        }
    }

    #[test]
    fn test_direct_and_inherited_declarers() {
        let oracle = oracle();
        assert_eq!(oracle.declarers("foo()V").unwrap().len(), 2);
        assert_eq!(oracle.find_original_declaring_class("m/M1", "foo()V").unwrap(), "m/M1");
        assert_eq!(oracle.find_original_declaring_class("m/M2", "foo()V").unwrap(), "m/M1");
        assert_eq!(oracle.find_original_declaring_class("m/M3", "foo()V").unwrap(), "m/M3");
    }

    #[test]
    fn test_static_methods_are_not_recorded() {
        assert!(oracle().declarers("make()Lm/M1;").is_none());
    }

    #[test]
    fn test_unresolvable_owner() {
        let oracle = oracle();
        assert!(matches!(
            oracle.find_original_declaring_class("m/Root", "foo()V"),
            Err(RewriteError::UnresolvableOwner { .. })
        ));
        assert!(matches!(
            oracle.find_original_declaring_class("m/M1", "bar()V"),
            Err(RewriteError::UnresolvableOwner { .. })
        ));
    }
}
