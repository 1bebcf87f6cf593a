//! devshell type images
//!
//! This crate provides the binary form in which compiled types reach the
//! hosted loader: the image model, its instruction set, the codec, and the
//! helpers for type signatures and name forms.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod descriptor;
pub mod encoder;
pub mod image;
pub mod insn;

pub use descriptor::{MethodDescriptor, SignatureError};
pub use encoder::{DecodeError, ImageReader, ImageWriter};
pub use image::{access, flags, FieldDef, ImageError, MethodDef, TypeImage, CONSTRUCTOR_NAME};
pub use insn::{Insn, MemberRef, Opcode};
