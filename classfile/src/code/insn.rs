use crate::code::opcode::*;
use crate::io::{be_i32, be_u16};
use crate::types::{ClassFileError, Result};

// ── Decoded instruction ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub opcode: u8,
    pub len: usize,
}

/// Switch padding: operands start at the next multiple of four after the opcode.
#[inline]
fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn truncated(pc: usize) -> ClassFileError {
    ClassFileError::UnexpectedEof(pc)
}

/// Decode the instruction starting at `pc`.
pub fn decode(code: &[u8], pc: usize) -> Result<Instruction> {
    let opcode = *code.get(pc).ok_or_else(|| truncated(pc))?;
    let len = match opcode {
        TABLESWITCH => {
            let base = pc + 1 + switch_padding(pc);
            let low = be_i32(code, base + 4).ok_or_else(|| truncated(pc))? as i64;
            let high = be_i32(code, base + 8).ok_or_else(|| truncated(pc))? as i64;
            if high < low {
                return Err(ClassFileError::InvalidOpcode { opcode, pc });
            }
            base + 12 + (high - low + 1) as usize * 4 - pc
        }
        LOOKUPSWITCH => {
            let base = pc + 1 + switch_padding(pc);
            let npairs = be_i32(code, base + 4).ok_or_else(|| truncated(pc))?;
            if npairs < 0 {
                return Err(ClassFileError::InvalidOpcode { opcode, pc });
            }
            base + 8 + npairs as usize * 8 - pc
        }
        WIDE => match code.get(pc + 1).copied() {
            Some(IINC) => 6,
            Some(0x15..=0x19 | 0x36..=0x3A | RET) => 4,
            Some(other) => {
                return Err(ClassFileError::InvalidOpcode {
                    opcode: other,
                    pc: pc + 1,
                })
            }
            None => return Err(truncated(pc)),
        },
        _ => fixed_length(opcode).ok_or(ClassFileError::InvalidOpcode { opcode, pc })?,
    };
    if pc + len > code.len() {
        return Err(truncated(pc));
    }
    Ok(Instruction { pc, opcode, len })
}

/// Absolute offsets this instruction may transfer control to.
pub fn branch_targets(code: &[u8], insn: &Instruction) -> Vec<i64> {
    let pc = insn.pc;
    let rel16 = |at: usize| be_u16(code, at).map(|v| pc as i64 + (v as i16) as i64);
    let rel32 = |at: usize| be_i32(code, at).map(|v| pc as i64 + v as i64);

    match insn.opcode {
        op if is_branch16(op) => rel16(pc + 1).into_iter().collect(),
        GOTO_W | JSR_W => rel32(pc + 1).into_iter().collect(),
        TABLESWITCH => {
            let base = pc + 1 + switch_padding(pc);
            let low = be_i32(code, base + 4).unwrap_or(0) as i64;
            let high = be_i32(code, base + 8).unwrap_or(-1) as i64;
            let mut targets: Vec<i64> = rel32(base).into_iter().collect();
            for i in 0..(high - low + 1).max(0) as usize {
                targets.extend(rel32(base + 12 + i * 4));
            }
            targets
        }
        LOOKUPSWITCH => {
            let base = pc + 1 + switch_padding(pc);
            let npairs = be_i32(code, base + 4).unwrap_or(0).max(0) as usize;
            let mut targets: Vec<i64> = rel32(base).into_iter().collect();
            for i in 0..npairs {
                targets.extend(rel32(base + 8 + i * 8 + 4));
            }
            targets
        }
        _ => Vec::new(),
    }
}

/// Iterator over the instructions of a code array.
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pc: 0,
            failed: false,
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        match decode(self.code, self.pc) {
            Ok(insn) => {
                self.pc += insn.len;
                Some(Ok(insn))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Check that the code decodes end to end and that every branch target and
/// every extra offset in `referenced` lands on an instruction boundary.
///
/// `referenced` holds `(origin, offset)` pairs such as exception handler
/// ranges; an offset equal to the code length is accepted as an exclusive end.
pub fn check_layout(code: &[u8], referenced: &[(usize, usize)]) -> Result<()> {
    let mut boundary = vec![false; code.len() + 1];
    boundary[code.len()] = true;
    let mut branches = Vec::new();
    for insn in Instructions::new(code) {
        let insn = insn?;
        boundary[insn.pc] = true;
        for target in branch_targets(code, &insn) {
            branches.push((insn.pc, target));
        }
    }
    let on_boundary =
        |target: i64| target >= 0 && (target as usize) < code.len() && boundary[target as usize];
    for (pc, target) in branches {
        if !on_boundary(target) {
            return Err(ClassFileError::BadBranchTarget { pc, target });
        }
    }
    for &(origin, offset) in referenced {
        if offset > code.len() || !boundary[offset] {
            return Err(ClassFileError::BadBranchTarget {
                pc: origin,
                target: offset as i64,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_fixed_length_instructions() {
        let code = [ALOAD_0, GETFIELD, 0x00, 0x05, INVOKEINTERFACE, 0x00, 0x07, 0x01, 0x00, ARETURN];
        let lens: Vec<usize> = Instructions::new(&code).map(|i| i.unwrap().len).collect();
        assert_eq!(lens, vec![1, 3, 5, 1]);
    }

    #[test]
    fn decode_wide_forms() {
        let code = [WIDE, ALOAD, 0x01, 0x00, WIDE, IINC, 0x01, 0x00, 0x00, 0x01];
        let lens: Vec<usize> = Instructions::new(&code).map(|i| i.unwrap().len).collect();
        assert_eq!(lens, vec![4, 6]);
    }

    #[test]
    fn tableswitch_padding_depends_on_position() {
        // tableswitch at pc=1: pads two bytes to reach offset 4.
        let mut code = vec![ILOAD_0, TABLESWITCH, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes()); // default -> 21
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&23i32.to_be_bytes()); // 0 -> 24
        code.extend_from_slice(&23i32.to_be_bytes()); // 1 -> 24
        code.push(RETURN); // 24
        let insn = decode(&code, 1).unwrap();
        assert_eq!(insn.len, 23);
        assert_eq!(branch_targets(&code, &insn), vec![21, 24, 24]);
    }

    #[test]
    fn lookupswitch_targets() {
        // lookupswitch at pc=0: pads three bytes.
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes()); // default -> 20
        code.extend_from_slice(&1i32.to_be_bytes()); // npairs
        code.extend_from_slice(&7i32.to_be_bytes()); // match 7
        code.extend_from_slice(&20i32.to_be_bytes()); // -> 20
        code.push(RETURN); // 20
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.len, 20);
        assert_eq!(branch_targets(&code, &insn), vec![20, 20]);
        check_layout(&code, &[]).unwrap();
    }

    #[test]
    fn branch16_is_signed() {
        let code = [NOP, NOP, GOTO, 0xFF, 0xFE];
        let insn = decode(&code, 2).unwrap();
        assert_eq!(branch_targets(&code, &insn), vec![0]);
        check_layout(&code, &[]).unwrap();
    }

    #[test]
    fn branch_into_middle_of_instruction_is_rejected() {
        // goto +1 lands inside itself.
        let code = [GOTO, 0x00, 0x01, RETURN];
        assert_eq!(
            check_layout(&code, &[]),
            Err(ClassFileError::BadBranchTarget { pc: 0, target: 1 })
        );
    }

    #[test]
    fn referenced_offsets_are_checked() {
        let code = [SIPUSH, 0x00, 0x01, POP, RETURN];
        check_layout(&code, &[(0, 0), (0, 3), (0, 5)]).unwrap();
        assert_eq!(
            check_layout(&code, &[(9, 2)]),
            Err(ClassFileError::BadBranchTarget { pc: 9, target: 2 })
        );
    }

    #[test]
    fn invalid_and_truncated_code_is_rejected() {
        assert_eq!(
            decode(&[0xCB], 0),
            Err(ClassFileError::InvalidOpcode { opcode: 0xCB, pc: 0 })
        );
        assert_eq!(decode(&[GETSTATIC, 0x00], 0), Err(ClassFileError::UnexpectedEof(0)));
    }
}
