//! Instruction assembler for prologue fragments.
//!
//! Every `put_*` call appends one instruction, interns whatever constant pool
//! entries it references and updates the tracked operand stack depth from the
//! referenced descriptor. `finish` pads the result to a four-byte multiple and
//! requires the stack to be empty again.

use crate::code::opcode::*;
use crate::constant_pool::ConstantPool;
use crate::descriptor::{FieldType, MethodDescriptor};
use crate::io::ByteSink;
use crate::types::{ClassFileError, Result};

/// Assembled instructions plus the frame they need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

pub struct Assembler<'p> {
    pool: &'p mut ConstantPool,
    code: Vec<u8>,
    depth: u16,
    max_stack: u16,
    max_locals: u16,
}

impl<'p> Assembler<'p> {
    pub fn new(pool: &'p mut ConstantPool) -> Self {
        Self {
            pool,
            code: Vec::with_capacity(64),
            depth: 0,
            max_stack: 0,
            max_locals: 0,
        }
    }

    /// Offset of the next instruction.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Current operand stack depth in slots.
    pub fn depth(&self) -> u16 {
        self.depth
    }

    fn push(&mut self, slots: u16) {
        self.depth += slots;
        self.max_stack = self.max_stack.max(self.depth);
    }

    fn pop(&mut self, slots: u16, insn: &str) -> Result<()> {
        self.depth = self
            .depth
            .checked_sub(slots)
            .ok_or_else(|| ClassFileError::StackUnderflow(insn.to_string()))?;
        Ok(())
    }

    fn emit_u16_operand(&mut self, opcode: u8, operand: u16) {
        self.code.put_u8(opcode);
        self.code.put_u16(operand);
    }

    // ── Constants and locals ─────────────────────────────────────────

    pub fn put_nop(&mut self) {
        self.code.put_u8(NOP);
    }

    /// `aload <index>`, using the one-byte forms for slots 0-3.
    pub fn put_aload(&mut self, index: u16) {
        match index {
            0..=3 => self.code.put_u8(ALOAD_0 + index as u8),
            4..=255 => {
                self.code.put_u8(ALOAD);
                self.code.put_u8(index as u8);
            }
            _ => {
                self.code.put_u8(WIDE);
                self.emit_u16_operand(ALOAD, index);
            }
        }
        self.max_locals = self.max_locals.max(index.saturating_add(1));
        self.push(1);
    }

    /// Push a string literal: `ldc` when the entry index fits a byte, `ldc_w` otherwise.
    pub fn put_ldc_string(&mut self, value: &str) -> Result<()> {
        let index = self.pool.string_index(value)?;
        if index <= u8::MAX as u16 {
            self.code.put_u8(LDC);
            self.code.put_u8(index as u8);
        } else {
            self.emit_u16_operand(LDC_W, index);
        }
        self.push(1);
        Ok(())
    }

    // ── Fields ───────────────────────────────────────────────────────

    pub fn put_getstatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<()> {
        let ty: FieldType = descriptor.parse()?;
        let index = self.pool.field_ref_index(class, name, descriptor)?;
        self.emit_u16_operand(GETSTATIC, index);
        self.push(ty.slots());
        Ok(())
    }

    pub fn put_getfield(&mut self, class: &str, name: &str, descriptor: &str) -> Result<()> {
        let ty: FieldType = descriptor.parse()?;
        let index = self.pool.field_ref_index(class, name, descriptor)?;
        self.pop(1, "getfield")?;
        self.emit_u16_operand(GETFIELD, index);
        self.push(ty.slots());
        Ok(())
    }

    // ── Calls ────────────────────────────────────────────────────────

    pub fn put_invokestatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<()> {
        let desc: MethodDescriptor = descriptor.parse()?;
        let index = self.pool.method_ref_index(class, name, descriptor)?;
        self.pop(desc.param_slots(), "invokestatic")?;
        self.emit_u16_operand(INVOKESTATIC, index);
        self.push(desc.ret.slots());
        Ok(())
    }

    pub fn put_invokevirtual(&mut self, class: &str, name: &str, descriptor: &str) -> Result<()> {
        let desc: MethodDescriptor = descriptor.parse()?;
        let index = self.pool.method_ref_index(class, name, descriptor)?;
        self.pop(desc.param_slots() + 1, "invokevirtual")?;
        self.emit_u16_operand(INVOKEVIRTUAL, index);
        self.push(desc.ret.slots());
        Ok(())
    }

    /// `invokeinterface`; the count operand is the argument slots plus the receiver.
    pub fn put_invokeinterface(&mut self, class: &str, name: &str, descriptor: &str) -> Result<()> {
        let desc: MethodDescriptor = descriptor.parse()?;
        let index = self.pool.interface_method_ref_index(class, name, descriptor)?;
        let count = desc.param_slots() + 1;
        self.pop(count, "invokeinterface")?;
        self.emit_u16_operand(INVOKEINTERFACE, index);
        self.code.put_u8(count as u8);
        self.code.put_u8(0);
        self.push(desc.ret.slots());
        Ok(())
    }

    /// Pad with `nop` to a four-byte multiple and hand back the fragment.
    pub fn finish(mut self) -> Result<Fragment> {
        if self.depth != 0 {
            return Err(ClassFileError::UnbalancedStack(self.depth as i32));
        }
        while self.code.len() % 4 != 0 {
            self.put_nop();
        }
        Ok(Fragment {
            code: self.code,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
        })
    }
}
