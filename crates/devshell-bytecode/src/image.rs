//! Type image format
//!
//! A type image is the binary form of one type as produced by the external
//! compiler: its name, supertypes, fields and methods with their bodies.
//! Every name stored in an image is an internal name (`a/b/Outer$Inner`).

use crate::encoder::{DecodeError, ImageReader, ImageWriter};
use crate::insn::Insn;
use thiserror::Error;

/// Magic number for type images: "DSTI"
pub const MAGIC: [u8; 4] = *b"DSTI";

/// Current image version
pub const VERSION: u32 = 1;

/// Size of the fixed header: magic + version + flags + checksum
pub const HEADER_SIZE: usize = 16;

/// Image encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected DSTI, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },
}

/// Image flags
pub mod flags {
    /// Image was synthesized by the loader rather than compiled
    pub const SYNTHETIC: u32 = 1 << 0;
    /// Image was produced by the marker rewriter
    pub const REWRITTEN: u32 = 1 << 1;
}

/// Access flags for types, fields and methods
pub mod access {
    /// Public
    pub const PUBLIC: u16 = 1 << 0;
    /// Static member
    pub const STATIC: u16 = 1 << 1;
    /// Final type or member
    pub const FINAL: u16 = 1 << 2;
    /// Native-bridged method (body supplied by the host)
    pub const NATIVE: u16 = 1 << 3;
    /// Abstract type or method
    pub const ABSTRACT: u16 = 1 << 4;
    /// Interface type
    pub const INTERFACE: u16 = 1 << 5;
    /// Compiler-generated
    pub const SYNTHETIC: u16 = 1 << 6;
}

/// Name of the constructor method
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type descriptor
    pub descriptor: String,
    /// Access flags
    pub access: u16,
}

impl FieldDef {
    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_str(&self.name);
        writer.emit_str(&self.descriptor);
        writer.emit_u16(self.access);
    }

    fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            descriptor: reader.read_string()?,
            access: reader.read_u16()?,
        })
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name (`<init>` for constructors)
    pub name: String,
    /// Method descriptor, e.g. `(ILjava/lang/String;)V`
    pub descriptor: String,
    /// Access flags
    pub access: u16,
    /// Method body
    pub code: Vec<Insn>,
}

impl MethodDef {
    /// Whether the method is static
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// Whether the method is native-bridged
    pub fn is_native(&self) -> bool {
        self.access & access::NATIVE != 0
    }

    /// Whether the method is a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// `name` + `descriptor`
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_str(&self.name);
        writer.emit_str(&self.descriptor);
        writer.emit_u16(self.access);
        writer.emit_u32(self.code.len() as u32);
        for insn in &self.code {
            insn.encode(writer);
        }
    }

    fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let access = reader.read_u16()?;
        let count = reader.read_u32()? as usize;
        let mut code = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            code.push(Insn::decode(reader)?);
        }
        Ok(Self {
            name,
            descriptor,
            access,
            code,
        })
    }
}

/// The binary form of one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeImage {
    /// Image flags, see [`flags`]
    pub flags: u32,
    /// Access flags of the type, see [`access`]
    pub access: u16,
    /// Internal name
    pub name: String,
    /// Internal name of the superclass (`None` only for the universal root)
    pub super_name: Option<String>,
    /// Internal names of implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
}

impl TypeImage {
    /// Create an empty public class image
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            flags: 0,
            access: access::PUBLIC,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Whether this image describes an interface
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// Add a field (builder style)
    pub fn with_field(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
        });
        self
    }

    /// Add a method (builder style)
    pub fn with_method(mut self, name: &str, descriptor: &str, access: u16, code: Vec<Insn>) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
            code,
        });
        self
    }

    /// Add an implemented interface (builder style)
    pub fn with_interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    /// Find a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Encode the image
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Access flags, name, superclass, interfaces
    /// - Field table
    /// - Method table (with bodies)
    ///
    /// Encoding is deterministic: equal images always produce equal bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ImageWriter::new();

        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.reserve_u32();

        writer.emit_u16(self.access);
        writer.emit_str(&self.name);
        writer.emit_opt_str(self.super_name.as_deref());

        writer.emit_u32(self.interfaces.len() as u32);
        for iface in &self.interfaces {
            writer.emit_str(iface);
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            field.encode(&mut writer);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode an image, verifying magic, version and checksum
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        let mut reader = ImageReader::new(data);

        let magic_bytes = reader.read_bytes(4)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&magic_bytes);
        if magic != MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ImageError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let access = reader.read_u16()?;
        let name = reader.read_string()?;
        let super_name = reader.read_opt_string()?;

        let iface_count = reader.read_u32()? as usize;
        let mut interfaces = Vec::with_capacity(iface_count.min(reader.remaining()));
        for _ in 0..iface_count {
            interfaces.push(reader.read_string()?);
        }

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(reader.remaining()));
        for _ in 0..field_count {
            fields.push(FieldDef::decode(&mut reader)?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(reader.remaining()));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        Ok(Self {
            flags,
            access,
            name,
            super_name,
            interfaces,
            fields,
            methods,
        })
    }
}
