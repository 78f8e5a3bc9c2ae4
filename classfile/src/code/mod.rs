//! The `Code` attribute and prologue insertion.

pub mod assembler;
pub mod insn;
pub mod opcode;
pub mod stackmap;

use crate::class::AttributeInfo;
use crate::constant_pool::ConstantPool;
use crate::io::{ByteSink, Reader};
use crate::types::{ClassFileError, Result};
use assembler::Fragment;
use stackmap::StackMapTable;

/// Largest code array a method may carry.
pub const MAX_CODE_LENGTH: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Decode the body of a `Code` attribute.
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut r = Reader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code = r.blob_u32()?.to_vec();
        let count = r.u16()?;
        let exception_table = (0..count)
            .map(|_| {
                Ok(ExceptionEntry {
                    start_pc: r.u16()?,
                    end_pc: r.u16()?,
                    handler_pc: r.u16()?,
                    catch_type: r.u16()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let attributes = AttributeInfo::parse_list(&mut r)?;
        if !r.is_empty() {
            return Err(ClassFileError::MalformedAttribute {
                attribute: "Code",
                reason: format!("{} trailing bytes", r.remaining()),
            });
        }
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        out.put_u16(self.max_stack);
        out.put_u16(self.max_locals);
        out.put_u32(self.code.len() as u32);
        out.extend_from_slice(&self.code);
        out.put_u16(self.exception_table.len() as u16);
        for entry in &self.exception_table {
            out.put_u16(entry.start_pc);
            out.put_u16(entry.end_pc);
            out.put_u16(entry.handler_pc);
            out.put_u16(entry.catch_type);
        }
        AttributeInfo::write_list(&self.attributes, &mut out);
        out
    }

    /// Splice `fragment` in front of the first original instruction.
    ///
    /// Every code offset recorded next to the body moves by the fragment
    /// length, so the original instructions and their metadata keep pointing
    /// at each other. Local variable ranges starting at 0 are widened instead
    /// of moved: parameters stay live across the prologue. Type annotations
    /// inside the attribute are dropped since their offsets are not decoded.
    /// On error `self` is left untouched.
    pub fn insert_prologue(&mut self, pool: &ConstantPool, fragment: &Fragment) -> Result<()> {
        let shift = fragment.code.len();
        if shift % 4 != 0 {
            return Err(ClassFileError::MisalignedFragment(shift));
        }
        let new_len = shift + self.code.len();
        if new_len > MAX_CODE_LENGTH {
            return Err(ClassFileError::CodeTooLarge(new_len));
        }
        let by = shift as u16;

        let mut referenced = Vec::with_capacity(self.exception_table.len() * 3);
        let exception_table = self
            .exception_table
            .iter()
            .map(|e| {
                let moved = ExceptionEntry {
                    start_pc: shift_pc(e.start_pc, by, "Code")?,
                    end_pc: shift_pc(e.end_pc, by, "Code")?,
                    handler_pc: shift_pc(e.handler_pc, by, "Code")?,
                    catch_type: e.catch_type,
                };
                referenced.push((moved.start_pc as usize, moved.start_pc as usize));
                referenced.push((moved.start_pc as usize, moved.end_pc as usize));
                referenced.push((moved.handler_pc as usize, moved.handler_pc as usize));
                Ok(moved)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            let name = pool.utf8(attr.name_index)?;
            let info = match name.as_str() {
                "LineNumberTable" => shift_line_numbers(&attr.info, by)?,
                "LocalVariableTable" => shift_local_variables(&attr.info, by, "LocalVariableTable")?,
                "LocalVariableTypeTable" => {
                    shift_local_variables(&attr.info, by, "LocalVariableTypeTable")?
                }
                "StackMapTable" => {
                    let mut table = StackMapTable::parse(&attr.info)?;
                    table.shift(by)?;
                    referenced.extend(table.offsets().into_iter().map(|o| (o, o)));
                    table.to_bytes()
                }
                "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => continue,
                _ => attr.info.clone(),
            };
            attributes.push(AttributeInfo {
                name_index: attr.name_index,
                info,
            });
        }

        let mut code = Vec::with_capacity(new_len);
        code.extend_from_slice(&fragment.code);
        code.extend_from_slice(&self.code);
        insn::check_layout(&code, &referenced)?;

        self.code = code;
        self.exception_table = exception_table;
        self.attributes = attributes;
        self.max_stack = self.max_stack.max(fragment.max_stack);
        self.max_locals = self.max_locals.max(fragment.max_locals);
        Ok(())
    }
}

fn shift_pc(pc: u16, by: u16, attribute: &'static str) -> Result<u16> {
    pc.checked_add(by)
        .ok_or_else(|| ClassFileError::MalformedAttribute {
            attribute,
            reason: format!("offset {} overflows after shifting by {}", pc, by),
        })
}

fn check_consumed(r: &Reader<'_>, attribute: &'static str) -> Result<()> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(ClassFileError::MalformedAttribute {
            attribute,
            reason: format!("{} trailing bytes", r.remaining()),
        })
    }
}

fn shift_line_numbers(info: &[u8], by: u16) -> Result<Vec<u8>> {
    let mut r = Reader::new(info);
    let mut out = Vec::with_capacity(info.len());
    let count = r.u16()?;
    out.put_u16(count);
    for _ in 0..count {
        out.put_u16(shift_pc(r.u16()?, by, "LineNumberTable")?);
        out.put_u16(r.u16()?);
    }
    check_consumed(&r, "LineNumberTable")?;
    Ok(out)
}

/// Shared layout of `LocalVariableTable` and `LocalVariableTypeTable`.
fn shift_local_variables(info: &[u8], by: u16, attribute: &'static str) -> Result<Vec<u8>> {
    let mut r = Reader::new(info);
    let mut out = Vec::with_capacity(info.len());
    let count = r.u16()?;
    out.put_u16(count);
    for _ in 0..count {
        let start_pc = r.u16()?;
        let length = r.u16()?;
        if start_pc == 0 {
            out.put_u16(0);
            out.put_u16(shift_pc(length, by, attribute)?);
        } else {
            out.put_u16(shift_pc(start_pc, by, attribute)?);
            out.put_u16(length);
        }
        // name, descriptor or signature, slot
        out.extend_from_slice(r.bytes(6)?);
    }
    check_consumed(&r, attribute)?;
    Ok(out)
}
