//! haltwatch-classfile: structured class-file model used by the haltwatch agent.
//!
//! The crate parses a class file into an editable form, lets callers grow the
//! constant pool and splice an assembled instruction fragment in front of a
//! method body, and serialises the result back to canonical bytes.

pub mod class;
pub mod code;
pub mod constant_pool;
pub mod descriptor;
pub mod io;
pub mod mutf8;
pub mod types;

// Re-exports for convenience (flattened imports)
pub use class::{AttributeInfo, ClassFile, MemberInfo};
pub use code::assembler::{Assembler, Fragment};
pub use code::CodeAttribute;
pub use constant_pool::{Constant, ConstantPool};
pub use descriptor::{FieldType, MethodDescriptor, ReturnType};
pub use types::{ClassFileError, Result};

/// Access flags used by the agent and its fixtures.
pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_ABSTRACT: u16 = 0x0400;
}
