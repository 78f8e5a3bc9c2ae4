//! Constant pool parsing, lookup and add-or-find entry creation.

use crate::io::{ByteSink, Reader};
use crate::mutf8;
use crate::types::{ClassFileError, Result};

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// One constant pool entry. `Utf8` keeps the raw modified UTF-8 bytes so that
/// untouched entries serialise byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => TAG_UTF8,
            Constant::Integer(_) => TAG_INTEGER,
            Constant::Float(_) => TAG_FLOAT,
            Constant::Long(_) => TAG_LONG,
            Constant::Double(_) => TAG_DOUBLE,
            Constant::Class { .. } => TAG_CLASS,
            Constant::String { .. } => TAG_STRING,
            Constant::FieldRef { .. } => TAG_FIELDREF,
            Constant::MethodRef { .. } => TAG_METHODREF,
            Constant::InterfaceMethodRef { .. } => TAG_INTERFACE_METHODREF,
            Constant::NameAndType { .. } => TAG_NAME_AND_TYPE,
            Constant::MethodHandle { .. } => TAG_METHOD_HANDLE,
            Constant::MethodType { .. } => TAG_METHOD_TYPE,
            Constant::Dynamic { .. } => TAG_DYNAMIC,
            Constant::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            Constant::Module { .. } => TAG_MODULE,
            Constant::Package { .. } => TAG_PACKAGE,
        }
    }

    /// Long and double entries occupy two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn parse(r: &mut Reader<'_>, index: u16) -> Result<Self> {
        let tag = r.u8()?;
        let constant = match tag {
            TAG_UTF8 => {
                let len = r.u16()? as usize;
                Constant::Utf8(r.bytes(len)?.to_vec())
            }
            TAG_INTEGER => Constant::Integer(r.u32()?),
            TAG_FLOAT => Constant::Float(r.u32()?),
            TAG_LONG => Constant::Long(r.u64()?),
            TAG_DOUBLE => Constant::Double(r.u64()?),
            TAG_CLASS => Constant::Class { name_index: r.u16()? },
            TAG_STRING => Constant::String {
                string_index: r.u16()?,
            },
            TAG_FIELDREF => Constant::FieldRef {
                class_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_METHODREF => Constant::MethodRef {
                class_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                class_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_NAME_AND_TYPE => Constant::NameAndType {
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
            },
            TAG_METHOD_HANDLE => Constant::MethodHandle {
                reference_kind: r.u8()?,
                reference_index: r.u16()?,
            },
            TAG_METHOD_TYPE => Constant::MethodType {
                descriptor_index: r.u16()?,
            },
            TAG_DYNAMIC => Constant::Dynamic {
                bootstrap_method_attr_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap_method_attr_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_MODULE => Constant::Module { name_index: r.u16()? },
            TAG_PACKAGE => Constant::Package { name_index: r.u16()? },
            _ => return Err(ClassFileError::UnknownConstantTag { tag, index }),
        };
        Ok(constant)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.put_u8(self.tag());
        match self {
            Constant::Utf8(bytes) => {
                out.put_u16(bytes.len() as u16);
                out.extend_from_slice(bytes);
            }
            Constant::Integer(v) | Constant::Float(v) => out.put_u32(*v),
            Constant::Long(v) | Constant::Double(v) => out.put_u64(*v),
            Constant::Class { name_index: i }
            | Constant::String { string_index: i }
            | Constant::MethodType {
                descriptor_index: i,
            }
            | Constant::Module { name_index: i }
            | Constant::Package { name_index: i } => out.put_u16(*i),
            Constant::FieldRef {
                class_index: a,
                name_and_type_index: b,
            }
            | Constant::MethodRef {
                class_index: a,
                name_and_type_index: b,
            }
            | Constant::InterfaceMethodRef {
                class_index: a,
                name_and_type_index: b,
            }
            | Constant::NameAndType {
                name_index: a,
                descriptor_index: b,
            }
            | Constant::Dynamic {
                bootstrap_method_attr_index: a,
                name_and_type_index: b,
            }
            | Constant::InvokeDynamic {
                bootstrap_method_attr_index: a,
                name_and_type_index: b,
            } => {
                out.put_u16(*a);
                out.put_u16(*b);
            }
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                out.put_u8(*reference_kind);
                out.put_u16(*reference_index);
            }
        }
    }
}

/// The constant pool of one class.
///
/// Slot 0 and the second slot of every long/double entry are `None`, so
/// `entries[i]` is the constant with pool index `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
        }
    }

    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(None);
        let mut index: u16 = 1;
        while index < count {
            let constant = Constant::parse(r, index)?;
            let wide = constant.is_wide();
            entries.push(Some(constant));
            index += 1;
            if wide {
                if index >= count {
                    return Err(ClassFileError::BadConstantIndex(index));
                }
                entries.push(None);
                index += 1;
            }
        }
        Ok(Self { entries })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u16(self.count());
        for constant in self.entries.iter().flatten() {
            constant.write(out);
        }
    }

    /// The `constant_pool_count` value: number of slots including slot 0.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(ClassFileError::BadConstantIndex(index))
    }

    /// Decoded text of a `CONSTANT_Utf8` entry.
    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => mutf8::decode(bytes),
            _ => Err(ClassFileError::WrongConstantType {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Compare a `CONSTANT_Utf8` entry with `text` without decoding it.
    pub fn utf8_eq(&self, index: u16, text: &str) -> bool {
        match self.get(index) {
            Ok(Constant::Utf8(bytes)) => *bytes == mutf8::encode(text),
            _ => false,
        }
    }

    /// Internal name referenced by a `CONSTANT_Class` entry.
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::WrongConstantType {
                index,
                expected: "Class",
            }),
        }
    }

    /// `(class, name, descriptor)` of a field, method or interface method reference.
    pub fn member_ref(&self, index: u16) -> Result<(String, String, String)> {
        let (class_index, nat_index) = match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            _ => {
                return Err(ClassFileError::WrongConstantType {
                    index,
                    expected: "member reference",
                })
            }
        };
        match self.get(nat_index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                self.class_name(class_index)?,
                self.utf8(*name_index)?,
                self.utf8(*descriptor_index)?,
            )),
            _ => Err(ClassFileError::WrongConstantType {
                index: nat_index,
                expected: "NameAndType",
            }),
        }
    }

    // ── Add-or-find ──────────────────────────────────────────────────

    pub fn utf8_index(&mut self, text: &str) -> Result<u16> {
        self.intern(Constant::Utf8(mutf8::encode(text)))
    }

    pub fn class_index(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.utf8_index(internal_name)?;
        self.intern(Constant::Class { name_index })
    }

    pub fn string_index(&mut self, value: &str) -> Result<u16> {
        let string_index = self.utf8_index(value)?;
        self.intern(Constant::String { string_index })
    }

    pub fn name_and_type_index(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.utf8_index(name)?;
        let descriptor_index = self.utf8_index(descriptor)?;
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn field_ref_index(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.class_index(class)?;
        let name_and_type_index = self.name_and_type_index(name, descriptor)?;
        self.intern(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn method_ref_index(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.class_index(class)?;
        let name_and_type_index = self.name_and_type_index(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn interface_method_ref_index(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.class_index(class)?;
        let name_and_type_index = self.name_and_type_index(name, descriptor)?;
        self.intern(Constant::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Return the index of an identical entry, appending one if none exists.
    fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.find(&constant) {
            return Ok(index);
        }
        self.push(constant)
    }

    fn find(&self, constant: &Constant) -> Option<u16> {
        self.entries
            .iter()
            .position(|slot| slot.as_ref() == Some(constant))
            .map(|i| i as u16)
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(ClassFileError::PoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(pool: &ConstantPool) -> ConstantPool {
        let mut out = Vec::new();
        pool.write(&mut out);
        let mut r = Reader::new(&out);
        let parsed = ConstantPool::parse(&mut r).unwrap();
        assert!(r.is_empty());
        parsed
    }

    #[test]
    fn add_or_find_reuses_existing_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.method_ref_index("java/lang/Thread", "dumpStack", "()V").unwrap();
        let count = pool.count();
        let b = pool.method_ref_index("java/lang/Thread", "dumpStack", "()V").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), count);
    }

    #[test]
    fn class_and_string_share_utf8_entry() {
        let mut pool = ConstantPool::new();
        let class = pool.class_index("java/lang/Thread").unwrap();
        let before = pool.count();
        let string = pool.string_index("java/lang/Thread").unwrap();
        assert_ne!(class, string);
        assert_eq!(pool.count(), before + 1);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.push(Constant::Long(42)).unwrap();
        let next = pool.utf8_index("after").unwrap();
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert_eq!(pool.get(2), Err(ClassFileError::BadConstantIndex(2)));

        let parsed = round_trip(&pool);
        assert_eq!(parsed, pool);
        assert_eq!(parsed.utf8(3).unwrap(), "after");
    }

    #[test]
    fn member_ref_resolves_names() {
        let mut pool = ConstantPool::new();
        let index = pool
            .field_ref_index("java/lang/System", "err", "Ljava/io/PrintStream;")
            .unwrap();
        let parsed = round_trip(&pool);
        assert_eq!(
            parsed.member_ref(index).unwrap(),
            (
                "java/lang/System".to_string(),
                "err".to_string(),
                "Ljava/io/PrintStream;".to_string()
            )
        );
    }

    #[test]
    fn wrong_entry_type_is_reported() {
        let mut pool = ConstantPool::new();
        let index = pool.utf8_index("halt").unwrap();
        assert_eq!(
            pool.class_name(index),
            Err(ClassFileError::WrongConstantType {
                index,
                expected: "Class"
            })
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let data = [0x00, 0x02, 0x02, 0x00];
        let mut r = Reader::new(&data);
        assert_eq!(
            ConstantPool::parse(&mut r),
            Err(ClassFileError::UnknownConstantTag { tag: 2, index: 1 })
        );
    }

    #[test]
    fn full_pool_overflows() {
        let mut pool = ConstantPool::new();
        for i in 0..(u16::MAX as usize - 1) {
            pool.push(Constant::Integer(i as u32)).unwrap();
        }
        assert_eq!(pool.count(), u16::MAX);
        assert_eq!(pool.utf8_index("one more"), Err(ClassFileError::PoolOverflow));
    }
}
