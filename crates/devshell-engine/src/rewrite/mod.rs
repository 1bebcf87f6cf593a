//! Marker-type specialization
//!
//! Types in the marker hierarchy stand for values that live in the host
//! runtime. The compiled form declares them as ordinary classes; at load time
//! each marker type `X` is split in two:
//!
//! - `X` becomes an empty interface extending the interface of its marker
//!   supertype, synthesized by [`MarkerRewriter::write_marker_interface`].
//! - `X$` (the companion implementation) receives the bodies of `X`. It is a
//!   final class extending `S$` and implementing `X`, and every instance
//!   method is turned into a static method taking the receiver first.
//!
//! Every other image has its call sites on marker types redirected to the
//! declaring companion, using the [`InstanceMethodOracle`] to find which
//! marker type originally declared the method.
//!
//! The rewrite is a pure function of its inputs and the rewriter's fixed
//! configuration, so equal inputs always produce byte-identical outputs.

pub mod cache;
pub mod oracle;

pub use cache::RewriteCache;
pub use oracle::InstanceMethodOracle;

use crate::types::TypeOracle;
use devshell_bytecode::descriptor::{
    binary_to_internal, map_descriptor_types, prepend_param, signature_of, to_source_name,
};
use devshell_bytecode::{access, flags, ImageError, Insn, MemberRef, TypeImage, CONSTRUCTOR_NAME};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Suffix of companion implementation names
pub const IMPL_SUFFIX: char = '$';

/// Errors raised while rewriting an image
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The input image could not be decoded
    #[error("Invalid image for '{name}': {source}")]
    Image {
        /// Binary name of the type
        name: String,
        /// Underlying codec error
        #[source]
        source: ImageError,
    },

    /// No marker declarer of the signature is assignable from the call owner
    #[error("Could not resolve signature '{signature}' from type '{type_desc}'")]
    UnresolvableOwner {
        /// Internal name of the call owner
        type_desc: String,
        /// Method name followed by its descriptor
        signature: String,
    },
}

/// Rewrites images for the marker hierarchy
#[derive(Debug)]
pub struct MarkerRewriter {
    /// Internal names of the marker root and all of its subtypes
    marker_types: BTreeSet<String>,
    /// Marker type to its superclass (internal names)
    marker_supers: BTreeMap<String, String>,
    /// Internal name of the marker root
    marker_root: String,
    /// Internal name of the universal root
    universal_root: String,
    oracle: InstanceMethodOracle,
}

impl MarkerRewriter {
    /// Build a rewriter from the type metadata
    ///
    /// # Arguments
    /// * `types` - Type metadata
    /// * `marker_root` - Binary name of the marker hierarchy root
    /// * `universal_root` - Binary name of the universal root type
    ///
    /// # Returns
    /// `None` when the metadata does not know the marker root, in which case
    /// no rewriting is needed.
    pub fn from_metadata(
        types: Arc<dyn TypeOracle>,
        marker_root: &str,
        universal_root: &str,
    ) -> Option<Self> {
        let root = types.find_type(&to_source_name(marker_root))?;
        let mut markers = types.subtypes(&root.binary_name);
        markers.push(root.clone());

        let marker_types: BTreeSet<String> = markers.iter().map(|t| t.internal_name()).collect();
        let marker_supers: BTreeMap<String, String> = markers
            .iter()
            .filter_map(|t| {
                t.superclass
                    .as_ref()
                    .map(|s| (t.internal_name(), binary_to_internal(s)))
            })
            .collect();

        let universal = types.find_type(&to_source_name(universal_root));
        let oracle = InstanceMethodOracle::new(types.clone(), &markers, universal.as_deref());

        log::debug!(
            "Marker rewriter: {} marker types under {}",
            marker_types.len(),
            root.binary_name
        );

        Some(Self {
            marker_types,
            marker_supers,
            marker_root: root.internal_name(),
            universal_root: binary_to_internal(universal_root),
            oracle,
        })
    }

    /// The instance method oracle
    pub fn oracle(&self) -> &InstanceMethodOracle {
        &self.oracle
    }

    /// Whether a binary name denotes a marker type, which loads as a
    /// synthesized interface
    pub fn is_marker_interface(&self, binary_name: &str) -> bool {
        self.marker_types.contains(&binary_to_internal(binary_name))
    }

    /// Whether a binary name denotes a companion implementation `X$`
    pub fn is_marker_impl(&self, binary_name: &str) -> bool {
        binary_name
            .strip_suffix(IMPL_SUFFIX)
            .is_some_and(|base| self.is_marker_interface(base))
    }

    /// Number of marker types
    pub fn marker_count(&self) -> usize {
        self.marker_types.len()
    }

    /// Synthesize the interface image of a marker type
    ///
    /// # Returns
    /// `None` if the name is not a marker type
    pub fn write_marker_interface(&self, binary_name: &str) -> Option<Vec<u8>> {
        let internal = binary_to_internal(binary_name);
        if !self.marker_types.contains(&internal) {
            return None;
        }

        let mut image = TypeImage::new(internal.as_str(), Some(self.universal_root.as_str()));
        image.flags = flags::SYNTHETIC;
        image.access = access::PUBLIC | access::INTERFACE | access::ABSTRACT;
        if internal != self.marker_root {
            if let Some(super_name) = self.marker_supers.get(&internal) {
                image.interfaces.push(super_name.clone());
            }
        }
        Some(image.encode())
    }

    /// Rewrite one image
    ///
    /// # Arguments
    /// * `binary_name` - Name the image is loaded under (`X$` for a
    ///   companion implementation, whose input is the image of `X`)
    /// * `bytes` - The encoded input image
    /// * `renames` - Anonymous-type renames (internal names)
    ///
    /// # Returns
    /// The input bytes unchanged when nothing applies, otherwise the
    /// re-encoded image flagged as rewritten.
    pub fn rewrite(
        &self,
        binary_name: &str,
        bytes: &[u8],
        renames: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, RewriteError> {
        let original = TypeImage::decode(bytes).map_err(|source| RewriteError::Image {
            name: binary_name.to_string(),
            source,
        })?;

        let mut image = original.clone();
        if !renames.is_empty() {
            apply_renames(&mut image, renames);
        }

        if self.is_marker_impl(binary_name) {
            self.write_marker_impl(&mut image, binary_name);
        }

        for method in &mut image.methods {
            for insn in &mut method.code {
                self.redirect_call(insn)?;
            }
        }

        if image == original {
            return Ok(bytes.to_vec());
        }
        image.flags |= flags::REWRITTEN;
        log::trace!("Rewrote {}", binary_name);
        Ok(image.encode())
    }

    /// Turn the image of marker `X` into its companion `X$`
    fn write_marker_impl(&self, image: &mut TypeImage, binary_name: &str) {
        let interface = image.name.clone();
        let receiver = signature_of(&interface);

        image.name = binary_to_internal(binary_name);
        image.access = (image.access | access::FINAL) & !(access::ABSTRACT | access::INTERFACE);
        image.super_name = Some(self.impl_super_of(&interface));
        image.interfaces = vec![interface];

        for method in &mut image.methods {
            if method.is_static() || method.is_constructor() {
                continue;
            }
            method.access |= access::STATIC;
            method.descriptor = prepend_param(&method.descriptor, &receiver);
        }
    }

    /// `S$` for the marker supertype `S`, or the universal root
    fn impl_super_of(&self, marker: &str) -> String {
        match self.marker_supers.get(marker) {
            Some(super_name) if marker != self.marker_root => {
                format!("{}{}", super_name, IMPL_SUFFIX)
            }
            _ => self.universal_root.clone(),
        }
    }

    fn is_marker_internal(&self, internal: &str) -> bool {
        self.marker_types.contains(internal)
    }

    /// Redirect an instruction that targets a marker type
    fn redirect_call(&self, insn: &mut Insn) -> Result<(), RewriteError> {
        let replacement = match insn {
            Insn::InvokeVirtual(m) | Insn::InvokeInterface(m) if self.is_marker_internal(&m.owner) => {
                let declarer = self
                    .oracle
                    .find_original_declaring_class(&m.owner, &m.signature())?;
                if declarer == self.universal_root {
                    Insn::InvokeVirtual(MemberRef::new(declarer, m.name.clone(), m.descriptor.clone()))
                } else {
                    self.static_call(&declarer, m)
                }
            }
            // Private and super calls
            Insn::InvokeSpecial(m) if self.is_marker_internal(&m.owner) && m.name != CONSTRUCTOR_NAME => {
                let owner = m.owner.clone();
                self.static_call(&owner, m)
            }
            Insn::InvokeSpecial(m)
            | Insn::InvokeStatic(m)
            | Insn::GetStatic(m)
            | Insn::PutStatic(m)
                if self.is_marker_internal(&m.owner) =>
            {
                m.owner.push(IMPL_SUFFIX);
                return Ok(());
            }
            Insn::New(t) if self.is_marker_internal(t) => {
                t.push(IMPL_SUFFIX);
                return Ok(());
            }
            _ => return Ok(()),
        };
        *insn = replacement;
        Ok(())
    }

    fn static_call(&self, declarer: &str, m: &MemberRef) -> Insn {
        Insn::InvokeStatic(MemberRef::new(
            format!("{}{}", declarer, IMPL_SUFFIX),
            m.name.clone(),
            prepend_param(&m.descriptor, &signature_of(declarer)),
        ))
    }
}

/// Replace every renamed type reference in an image
fn apply_renames(image: &mut TypeImage, renames: &BTreeMap<String, String>) {
    let rename = |name: &mut String| {
        if let Some(to) = renames.get(name.as_str()) {
            *name = to.clone();
        }
    };
    let in_descriptor = |desc: &str| map_descriptor_types(desc, |n| renames.get(n).cloned());

    rename(&mut image.name);
    if let Some(super_name) = image.super_name.as_mut() {
        rename(super_name);
    }
    image.interfaces.iter_mut().for_each(rename);

    for field in &mut image.fields {
        field.descriptor = in_descriptor(&field.descriptor);
    }
    for method in &mut image.methods {
        method.descriptor = in_descriptor(&method.descriptor);
        for insn in &mut method.code {
            if let Some(t) = insn.type_operand_mut() {
                rename(t);
            }
            if let Some(m) = insn.member_mut() {
                rename(&mut m.owner);
                m.descriptor = in_descriptor(&m.descriptor);
            }
        }
    }
}
