//! JVM opcodes referenced by the decoder and assembler.

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1A;
pub const LLOAD_0: u8 = 0x1E;
pub const ALOAD_0: u8 = 0x2A;
pub const ALOAD_1: u8 = 0x2B;
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3A;
pub const ISTORE_0: u8 = 0x3B;
pub const ASTORE_1: u8 = 0x4C;
pub const POP: u8 = 0x57;
pub const DUP: u8 = 0x59;
pub const IINC: u8 = 0x84;
pub const L2I: u8 = 0x88;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9A;
pub const IF_ACMPNE: u8 = 0xA6;
pub const GOTO: u8 = 0xA7;
pub const JSR: u8 = 0xA8;
pub const RET: u8 = 0xA9;
pub const TABLESWITCH: u8 = 0xAA;
pub const LOOKUPSWITCH: u8 = 0xAB;
pub const IRETURN: u8 = 0xAC;
pub const ARETURN: u8 = 0xB0;
pub const RETURN: u8 = 0xB1;
pub const GETSTATIC: u8 = 0xB2;
pub const PUTSTATIC: u8 = 0xB3;
pub const GETFIELD: u8 = 0xB4;
pub const PUTFIELD: u8 = 0xB5;
pub const INVOKEVIRTUAL: u8 = 0xB6;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const INVOKESTATIC: u8 = 0xB8;
pub const INVOKEINTERFACE: u8 = 0xB9;
pub const INVOKEDYNAMIC: u8 = 0xBA;
pub const NEW: u8 = 0xBB;
pub const NEWARRAY: u8 = 0xBC;
pub const ANEWARRAY: u8 = 0xBD;
pub const ATHROW: u8 = 0xBF;
pub const CHECKCAST: u8 = 0xC0;
pub const INSTANCEOF: u8 = 0xC1;
pub const MONITORENTER: u8 = 0xC2;
pub const MONITOREXIT: u8 = 0xC3;
pub const WIDE: u8 = 0xC4;
pub const MULTIANEWARRAY: u8 = 0xC5;
pub const IFNULL: u8 = 0xC6;
pub const IFNONNULL: u8 = 0xC7;
pub const GOTO_W: u8 = 0xC8;
pub const JSR_W: u8 = 0xC9;

/// Length of an instruction whose size does not depend on its position.
///
/// Returns `None` for the variable-length switches, `wide`, and opcodes that
/// are not valid in a class file.
pub fn fixed_length(opcode: u8) -> Option<usize> {
    match opcode {
        0x00..=0x0F => Some(1),
        BIPUSH => Some(2),
        SIPUSH => Some(3),
        LDC => Some(2),
        LDC_W | LDC2_W => Some(3),
        0x15..=0x19 => Some(2), // xload index
        0x1A..=0x35 => Some(1), // xload_n, array loads
        0x36..=0x3A => Some(2), // xstore index
        0x3B..=0x83 => Some(1), // xstore_n, array stores, stack ops, arithmetic
        IINC => Some(3),
        0x85..=0x98 => Some(1), // conversions, comparisons
        0x99..=0xA8 => Some(3), // if<cond>, if_<cmp>, goto, jsr
        RET => Some(2),
        0xAC..=0xB1 => Some(1), // returns
        0xB2..=0xB8 => Some(3), // field access, invokevirtual/special/static
        INVOKEINTERFACE | INVOKEDYNAMIC => Some(5),
        NEW => Some(3),
        NEWARRAY => Some(2),
        ANEWARRAY => Some(3),
        0xBE | ATHROW => Some(1), // arraylength, athrow
        CHECKCAST | INSTANCEOF => Some(3),
        MONITORENTER | MONITOREXIT => Some(1),
        MULTIANEWARRAY => Some(4),
        IFNULL | IFNONNULL => Some(3),
        GOTO_W | JSR_W => Some(5),
        _ => None,
    }
}

/// Whether the opcode carries a signed 16-bit branch offset.
pub fn is_branch16(opcode: u8) -> bool {
    matches!(opcode, 0x99..=0xA8 | IFNULL | IFNONNULL)
}
