//! Instruction set carried in method bodies of a type image
//!
//! The set is deliberately small: the loader only needs to see the
//! instructions that reference other types or members, so everything that
//! operates purely on the operand stack is folded into a handful of
//! opcodes.

use crate::encoder::{DecodeError, ImageReader, ImageWriter};

/// Instruction opcode
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack & constants
/// - 0x10-0x1F: Local variables
/// - 0x20-0x2F: Control flow
/// - 0x30-0x3F: Type operations
/// - 0x40-0x4F: Field access
/// - 0x50-0x5F: Invocation
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// No operation
    Nop = 0x00,
    /// Push null
    ConstNull = 0x01,
    /// Push integer constant (operand: i64)
    ConstInt = 0x02,
    /// Push string constant (operand: str)
    ConstStr = 0x03,
    /// Pop top of stack
    Pop = 0x04,
    /// Duplicate top of stack
    Dup = 0x05,

    /// Load local (operand: u16)
    LoadLocal = 0x10,
    /// Store local (operand: u16)
    StoreLocal = 0x11,

    /// Return void
    Return = 0x20,
    /// Return top of stack
    ReturnValue = 0x21,
    /// Throw top of stack
    Throw = 0x22,

    /// Allocate instance (operand: type)
    New = 0x30,
    /// Checked cast (operand: type)
    CheckCast = 0x31,
    /// Type test (operand: type)
    InstanceOf = 0x32,

    /// Read instance field (operand: member)
    GetField = 0x40,
    /// Write instance field (operand: member)
    PutField = 0x41,
    /// Read static field (operand: member)
    GetStatic = 0x42,
    /// Write static field (operand: member)
    PutStatic = 0x43,

    /// Virtual call (operand: member)
    InvokeVirtual = 0x50,
    /// Interface call (operand: member)
    InvokeInterface = 0x51,
    /// Non-virtual call: constructors, super calls (operand: member)
    InvokeSpecial = 0x52,
    /// Static call (operand: member)
    InvokeStatic = 0x53,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::ConstNull),
            0x02 => Some(Self::ConstInt),
            0x03 => Some(Self::ConstStr),
            0x04 => Some(Self::Pop),
            0x05 => Some(Self::Dup),
            0x10 => Some(Self::LoadLocal),
            0x11 => Some(Self::StoreLocal),
            0x20 => Some(Self::Return),
            0x21 => Some(Self::ReturnValue),
            0x22 => Some(Self::Throw),
            0x30 => Some(Self::New),
            0x31 => Some(Self::CheckCast),
            0x32 => Some(Self::InstanceOf),
            0x40 => Some(Self::GetField),
            0x41 => Some(Self::PutField),
            0x42 => Some(Self::GetStatic),
            0x43 => Some(Self::PutStatic),
            0x50 => Some(Self::InvokeVirtual),
            0x51 => Some(Self::InvokeInterface),
            0x52 => Some(Self::InvokeSpecial),
            0x53 => Some(Self::InvokeStatic),
            _ => None,
        }
    }

    /// Convert the opcode to its byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable mnemonic
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::ConstNull => "CONST_NULL",
            Self::ConstInt => "CONST_INT",
            Self::ConstStr => "CONST_STR",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::StoreLocal => "STORE_LOCAL",
            Self::Return => "RETURN",
            Self::ReturnValue => "RETURN_VALUE",
            Self::Throw => "THROW",
            Self::New => "NEW",
            Self::CheckCast => "CHECKCAST",
            Self::InstanceOf => "INSTANCEOF",
            Self::GetField => "GETFIELD",
            Self::PutField => "PUTFIELD",
            Self::GetStatic => "GETSTATIC",
            Self::PutStatic => "PUTSTATIC",
            Self::InvokeVirtual => "INVOKEVIRTUAL",
            Self::InvokeInterface => "INVOKEINTERFACE",
            Self::InvokeSpecial => "INVOKESPECIAL",
            Self::InvokeStatic => "INVOKESTATIC",
        }
    }
}

/// Symbolic reference to a field or method of another type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the owning type (`a/b/C`)
    pub owner: String,
    /// Member name
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
}

impl MemberRef {
    /// Create a member reference
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// `name` + `descriptor`, the key used for method lookups
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// A decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// See [`Opcode::Nop`]
    Nop,
    /// See [`Opcode::ConstNull`]
    ConstNull,
    /// See [`Opcode::ConstInt`]
    ConstInt(i64),
    /// See [`Opcode::ConstStr`]
    ConstStr(String),
    /// See [`Opcode::Pop`]
    Pop,
    /// See [`Opcode::Dup`]
    Dup,
    /// See [`Opcode::LoadLocal`]
    LoadLocal(u16),
    /// See [`Opcode::StoreLocal`]
    StoreLocal(u16),
    /// See [`Opcode::Return`]
    Return,
    /// See [`Opcode::ReturnValue`]
    ReturnValue,
    /// See [`Opcode::Throw`]
    Throw,
    /// See [`Opcode::New`]
    New(String),
    /// See [`Opcode::CheckCast`]
    CheckCast(String),
    /// See [`Opcode::InstanceOf`]
    InstanceOf(String),
    /// See [`Opcode::GetField`]
    GetField(MemberRef),
    /// See [`Opcode::PutField`]
    PutField(MemberRef),
    /// See [`Opcode::GetStatic`]
    GetStatic(MemberRef),
    /// See [`Opcode::PutStatic`]
    PutStatic(MemberRef),
    /// See [`Opcode::InvokeVirtual`]
    InvokeVirtual(MemberRef),
    /// See [`Opcode::InvokeInterface`]
    InvokeInterface(MemberRef),
    /// See [`Opcode::InvokeSpecial`]
    InvokeSpecial(MemberRef),
    /// See [`Opcode::InvokeStatic`]
    InvokeStatic(MemberRef),
}

impl Insn {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Insn::Nop => Opcode::Nop,
            Insn::ConstNull => Opcode::ConstNull,
            Insn::ConstInt(_) => Opcode::ConstInt,
            Insn::ConstStr(_) => Opcode::ConstStr,
            Insn::Pop => Opcode::Pop,
            Insn::Dup => Opcode::Dup,
            Insn::LoadLocal(_) => Opcode::LoadLocal,
            Insn::StoreLocal(_) => Opcode::StoreLocal,
            Insn::Return => Opcode::Return,
            Insn::ReturnValue => Opcode::ReturnValue,
            Insn::Throw => Opcode::Throw,
            Insn::New(_) => Opcode::New,
            Insn::CheckCast(_) => Opcode::CheckCast,
            Insn::InstanceOf(_) => Opcode::InstanceOf,
            Insn::GetField(_) => Opcode::GetField,
            Insn::PutField(_) => Opcode::PutField,
            Insn::GetStatic(_) => Opcode::GetStatic,
            Insn::PutStatic(_) => Opcode::PutStatic,
            Insn::InvokeVirtual(_) => Opcode::InvokeVirtual,
            Insn::InvokeInterface(_) => Opcode::InvokeInterface,
            Insn::InvokeSpecial(_) => Opcode::InvokeSpecial,
            Insn::InvokeStatic(_) => Opcode::InvokeStatic,
        }
    }

    /// Member operand, if the instruction has one
    pub fn member(&self) -> Option<&MemberRef> {
        match self {
            Insn::GetField(m)
            | Insn::PutField(m)
            | Insn::GetStatic(m)
            | Insn::PutStatic(m)
            | Insn::InvokeVirtual(m)
            | Insn::InvokeInterface(m)
            | Insn::InvokeSpecial(m)
            | Insn::InvokeStatic(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable member operand, if the instruction has one
    pub fn member_mut(&mut self) -> Option<&mut MemberRef> {
        match self {
            Insn::GetField(m)
            | Insn::PutField(m)
            | Insn::GetStatic(m)
            | Insn::PutStatic(m)
            | Insn::InvokeVirtual(m)
            | Insn::InvokeInterface(m)
            | Insn::InvokeSpecial(m)
            | Insn::InvokeStatic(m) => Some(m),
            _ => None,
        }
    }

    /// Type operand, if the instruction has one
    pub fn type_operand_mut(&mut self) -> Option<&mut String> {
        match self {
            Insn::New(t) | Insn::CheckCast(t) | Insn::InstanceOf(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_u8(self.opcode().to_u8());
        match self {
            Insn::ConstInt(v) => writer.emit_i64(*v),
            Insn::ConstStr(s) => writer.emit_str(s),
            Insn::LoadLocal(i) | Insn::StoreLocal(i) => writer.emit_u16(*i),
            Insn::New(t) | Insn::CheckCast(t) | Insn::InstanceOf(t) => writer.emit_str(t),
            Insn::GetField(m)
            | Insn::PutField(m)
            | Insn::GetStatic(m)
            | Insn::PutStatic(m)
            | Insn::InvokeVirtual(m)
            | Insn::InvokeInterface(m)
            | Insn::InvokeSpecial(m)
            | Insn::InvokeStatic(m) => {
                writer.emit_str(&m.owner);
                writer.emit_str(&m.name);
                writer.emit_str(&m.descriptor);
            }
            _ => {}
        }
    }

    pub(crate) fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;

        let member = |reader: &mut ImageReader<'_>| -> Result<MemberRef, DecodeError> {
            Ok(MemberRef {
                owner: reader.read_string()?,
                name: reader.read_string()?,
                descriptor: reader.read_string()?,
            })
        };

        Ok(match opcode {
            Opcode::Nop => Insn::Nop,
            Opcode::ConstNull => Insn::ConstNull,
            Opcode::ConstInt => Insn::ConstInt(reader.read_i64()?),
            Opcode::ConstStr => Insn::ConstStr(reader.read_string()?),
            Opcode::Pop => Insn::Pop,
            Opcode::Dup => Insn::Dup,
            Opcode::LoadLocal => Insn::LoadLocal(reader.read_u16()?),
            Opcode::StoreLocal => Insn::StoreLocal(reader.read_u16()?),
            Opcode::Return => Insn::Return,
            Opcode::ReturnValue => Insn::ReturnValue,
            Opcode::Throw => Insn::Throw,
            Opcode::New => Insn::New(reader.read_string()?),
            Opcode::CheckCast => Insn::CheckCast(reader.read_string()?),
            Opcode::InstanceOf => Insn::InstanceOf(reader.read_string()?),
            Opcode::GetField => Insn::GetField(member(reader)?),
            Opcode::PutField => Insn::PutField(member(reader)?),
            Opcode::GetStatic => Insn::GetStatic(member(reader)?),
            Opcode::PutStatic => Insn::PutStatic(member(reader)?),
            Opcode::InvokeVirtual => Insn::InvokeVirtual(member(reader)?),
            Opcode::InvokeInterface => Insn::InvokeInterface(member(reader)?),
            Opcode::InvokeSpecial => Insn::InvokeSpecial(member(reader)?),
            Opcode::InvokeStatic => Insn::InvokeStatic(member(reader)?),
        })
    }
}
