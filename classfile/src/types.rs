use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unexpected end of class data at offset {0}")]
    UnexpectedEof(usize),

    #[error("{0} trailing bytes after class data")]
    TrailingBytes(usize),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("constant pool index {0} is out of range or unusable")]
    BadConstantIndex(u16),

    #[error("constant pool entry {index} is not a {expected}")]
    WrongConstantType { index: u16, expected: &'static str },

    #[error("invalid modified UTF-8 in constant pool")]
    InvalidUtf8,

    #[error("invalid descriptor '{0}'")]
    InvalidDescriptor(String),

    #[error("constant pool is full")]
    PoolOverflow,

    #[error("code length {0} exceeds the 65535 byte limit")]
    CodeTooLarge(usize),

    #[error("malformed {attribute} attribute: {reason}")]
    MalformedAttribute {
        attribute: &'static str,
        reason: String,
    },

    #[error("invalid opcode {opcode:#04x} at offset {pc}")]
    InvalidOpcode { opcode: u8, pc: usize },

    #[error("offset {target} referenced from {pc} is not an instruction boundary")]
    BadBranchTarget { pc: usize, target: i64 },

    #[error("operand stack underflow at {0}")]
    StackUnderflow(String),

    #[error("fragment leaves {0} values on the operand stack")]
    UnbalancedStack(i32),

    #[error("fragment length {0} is not a multiple of four")]
    MisalignedFragment(usize),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;
