//! `StackMapTable` decoding, shifting and re-encoding.
//!
//! Only the first frame's `offset_delta` is absolute (relative to offset 0);
//! later frames are relative to their predecessor. Moving the whole body by
//! `n` bytes therefore touches the first delta plus every `Uninitialized`
//! verification type, which records the offset of its `new` instruction.

use crate::io::{ByteSink, Reader};
use crate::types::{ClassFileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    Uninitialized(u16),
}

impl VerificationType {
    fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let tag = r.u8()?;
        Ok(match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(r.u16()?),
            8 => VerificationType::Uninitialized(r.u16()?),
            _ => return Err(malformed(format!("unknown verification type tag {}", tag))),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            VerificationType::Top => out.put_u8(0),
            VerificationType::Integer => out.put_u8(1),
            VerificationType::Float => out.put_u8(2),
            VerificationType::Double => out.put_u8(3),
            VerificationType::Long => out.put_u8(4),
            VerificationType::Null => out.put_u8(5),
            VerificationType::UninitializedThis => out.put_u8(6),
            VerificationType::Object(index) => {
                out.put_u8(7);
                out.put_u16(*index);
            }
            VerificationType::Uninitialized(offset) => {
                out.put_u8(8);
                out.put_u16(*offset);
            }
        }
    }

    fn shift(&mut self, by: u16) -> Result<()> {
        if let VerificationType::Uninitialized(offset) = self {
            *offset = offset
                .checked_add(by)
                .ok_or_else(|| malformed("uninitialized offset overflow".into()))?;
        }
        Ok(())
    }
}

/// One frame. `Same` and `SameLocals1StackItem` cover both the compact and
/// the `_extended` encodings; the encoding is picked from the delta on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same {
        offset_delta: u16,
    },
    SameLocals1StackItem {
        offset_delta: u16,
        stack: VerificationType,
    },
    Chop {
        k: u8,
        offset_delta: u16,
    },
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    fn offset_delta_mut(&mut self) -> &mut u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => offset_delta,
        }
    }

    fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let frame_type = r.u8()?;
        let frame = match frame_type {
            0..=63 => StackMapFrame::Same {
                offset_delta: frame_type as u16,
            },
            64..=127 => StackMapFrame::SameLocals1StackItem {
                offset_delta: (frame_type - 64) as u16,
                stack: VerificationType::parse(r)?,
            },
            247 => StackMapFrame::SameLocals1StackItem {
                offset_delta: r.u16()?,
                stack: VerificationType::parse(r)?,
            },
            248..=250 => StackMapFrame::Chop {
                k: 251 - frame_type,
                offset_delta: r.u16()?,
            },
            251 => StackMapFrame::Same {
                offset_delta: r.u16()?,
            },
            252..=254 => {
                let offset_delta = r.u16()?;
                let locals = (0..frame_type - 251)
                    .map(|_| VerificationType::parse(r))
                    .collect::<Result<Vec<_>>>()?;
                StackMapFrame::Append {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = r.u16()?;
                let nlocals = r.u16()?;
                let locals = (0..nlocals)
                    .map(|_| VerificationType::parse(r))
                    .collect::<Result<Vec<_>>>()?;
                let nstack = r.u16()?;
                let stack = (0..nstack)
                    .map(|_| VerificationType::parse(r))
                    .collect::<Result<Vec<_>>>()?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            _ => return Err(malformed(format!("reserved frame type {}", frame_type))),
        };
        Ok(frame)
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            StackMapFrame::Same { offset_delta } if *offset_delta <= 63 => {
                out.put_u8(*offset_delta as u8);
            }
            StackMapFrame::Same { offset_delta } => {
                out.put_u8(251);
                out.put_u16(*offset_delta);
            }
            StackMapFrame::SameLocals1StackItem {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    out.put_u8(64 + *offset_delta as u8);
                } else {
                    out.put_u8(247);
                    out.put_u16(*offset_delta);
                }
                stack.write(out);
            }
            StackMapFrame::Chop { k, offset_delta } => {
                out.put_u8(251 - k);
                out.put_u16(*offset_delta);
            }
            StackMapFrame::Append {
                offset_delta,
                locals,
            } => {
                out.put_u8(251 + locals.len() as u8);
                out.put_u16(*offset_delta);
                for local in locals {
                    local.write(out);
                }
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                out.put_u8(255);
                out.put_u16(*offset_delta);
                out.put_u16(locals.len() as u16);
                for local in locals {
                    local.write(out);
                }
                out.put_u16(stack.len() as u16);
                for item in stack {
                    item.write(out);
                }
            }
        }
    }

    fn types_mut(&mut self) -> Vec<&mut VerificationType> {
        match self {
            StackMapFrame::Same { .. } | StackMapFrame::Chop { .. } => Vec::new(),
            StackMapFrame::SameLocals1StackItem { stack, .. } => vec![stack],
            StackMapFrame::Append { locals, .. } => locals.iter_mut().collect(),
            StackMapFrame::Full { locals, stack, .. } => {
                locals.iter_mut().chain(stack.iter_mut()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut r = Reader::new(info);
        let count = r.u16()?;
        let frames = (0..count)
            .map(|_| StackMapFrame::parse(&mut r))
            .collect::<Result<Vec<_>>>()?;
        if !r.is_empty() {
            return Err(malformed(format!("{} trailing bytes", r.remaining())));
        }
        Ok(Self { frames })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16(self.frames.len() as u16);
        for frame in &self.frames {
            frame.write(&mut out);
        }
        out
    }

    /// Absolute code offsets of every frame.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.frames.len());
        let mut previous: Option<usize> = None;
        for frame in &self.frames {
            let offset = match previous {
                None => frame.offset_delta() as usize,
                Some(p) => p + frame.offset_delta() as usize + 1,
            };
            offsets.push(offset);
            previous = Some(offset);
        }
        offsets
    }

    /// Account for `by` bytes inserted at offset 0 of the code array.
    pub fn shift(&mut self, by: u16) -> Result<()> {
        if let Some(first) = self.frames.first_mut() {
            let delta = first.offset_delta_mut();
            *delta = delta
                .checked_add(by)
                .ok_or_else(|| malformed("frame offset overflow".into()))?;
        }
        for frame in &mut self.frames {
            for ty in frame.types_mut() {
                ty.shift(by)?;
            }
        }
        Ok(())
    }
}

fn malformed(reason: String) -> ClassFileError {
    ClassFileError::MalformedAttribute {
        attribute: "StackMapTable",
        reason,
    }
}
