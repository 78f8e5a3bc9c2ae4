//! Top-level class file structure: parse, query, build, serialise.

use crate::code::CodeAttribute;
use crate::constant_pool::ConstantPool;
use crate::io::{ByteSink, Reader};
use crate::types::{ClassFileError, Result};

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Attribute kept as raw bytes; only the attributes that get edited are decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub(crate) fn parse_list(r: &mut Reader<'_>) -> Result<Vec<Self>> {
        let count = r.u16()?;
        (0..count)
            .map(|_| {
                let name_index = r.u16()?;
                let info = r.blob_u32()?.to_vec();
                Ok(Self { name_index, info })
            })
            .collect()
    }

    pub(crate) fn write_list(list: &[Self], out: &mut Vec<u8>) {
        out.put_u16(list.len() as u16);
        for attr in list {
            out.put_u16(attr.name_index);
            out.put_u32(attr.info.len() as u32);
            out.extend_from_slice(&attr.info);
        }
    }
}

/// A field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MemberInfo {
    fn parse_list(r: &mut Reader<'_>) -> Result<Vec<Self>> {
        let count = r.u16()?;
        (0..count)
            .map(|_| {
                Ok(Self {
                    access_flags: r.u16()?,
                    name_index: r.u16()?,
                    descriptor_index: r.u16()?,
                    attributes: AttributeInfo::parse_list(r)?,
                })
            })
            .collect()
    }

    fn write_list(list: &[Self], out: &mut Vec<u8>) {
        out.put_u16(list.len() as u16);
        for member in list {
            out.put_u16(member.access_flags);
            out.put_u16(member.name_index);
            out.put_u16(member.descriptor_index);
            AttributeInfo::write_list(&member.attributes, out);
        }
    }

    pub fn attribute(&self, pool: &ConstantPool, name: &str) -> Option<&AttributeInfo> {
        self.attributes
            .iter()
            .find(|a| pool.utf8_eq(a.name_index, name))
    }

    pub fn has_attribute(&self, pool: &ConstantPool, name: &str) -> bool {
        self.attribute(pool, name).is_some()
    }

    fn matches(&self, pool: &ConstantPool, name: &str, descriptor: &str) -> bool {
        pool.utf8_eq(self.name_index, name) && pool.utf8_eq(self.descriptor_index, descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let interfaces = (0..interface_count)
            .map(|_| r.u16())
            .collect::<Result<Vec<_>>>()?;
        let fields = MemberInfo::parse_list(&mut r)?;
        let methods = MemberInfo::parse_list(&mut r)?;
        let attributes = AttributeInfo::parse_list(&mut r)?;
        if !r.is_empty() {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }
        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4096);
        out.put_u32(MAGIC);
        out.put_u16(self.minor_version);
        out.put_u16(self.major_version);
        self.constant_pool.write(&mut out);
        out.put_u16(self.access_flags);
        out.put_u16(self.this_class);
        out.put_u16(self.super_class);
        out.put_u16(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            out.put_u16(*interface);
        }
        MemberInfo::write_list(&self.fields, &mut out);
        MemberInfo::write_list(&self.methods, &mut out);
        AttributeInfo::write_list(&self.attributes, &mut out);
        out
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Internal name of this class.
    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn member_name(&self, member: &MemberInfo) -> Result<String> {
        self.constant_pool.utf8(member.name_index)
    }

    pub fn member_descriptor(&self, member: &MemberInfo) -> Result<String> {
        self.constant_pool.utf8(member.descriptor_index)
    }

    /// Index of the method with exactly this name and descriptor.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.matches(&self.constant_pool, name, descriptor))
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.matches(&self.constant_pool, name, descriptor))
    }

    /// Indices of every overload called `name`.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| self.constant_pool.utf8_eq(m.name_index, name))
            .map(|(i, _)| i)
    }

    /// Decoded `Code` attribute of a method, `None` for native/abstract methods.
    pub fn method_code(&self, index: usize) -> Result<Option<CodeAttribute>> {
        self.methods[index]
            .attribute(&self.constant_pool, "Code")
            .map(|attr| CodeAttribute::parse(&attr.info))
            .transpose()
    }

    /// Replace the `Code` attribute of a method, adding one if it has none.
    pub fn set_method_code(&mut self, index: usize, code: &CodeAttribute) -> Result<()> {
        let info = code.to_bytes();
        let name_index = self.constant_pool.utf8_index("Code")?;
        let pool = &self.constant_pool;
        let method = &mut self.methods[index];
        match method
            .attributes
            .iter_mut()
            .find(|a| pool.utf8_eq(a.name_index, "Code"))
        {
            Some(attr) => attr.info = info,
            None => method.attributes.push(AttributeInfo { name_index, info }),
        }
        Ok(())
    }

    /// Add an attribute to a method unless one with the same name is present.
    pub fn add_method_attribute(&mut self, index: usize, name: &str, info: Vec<u8>) -> Result<()> {
        let name_index = self.constant_pool.utf8_index(name)?;
        let pool = &self.constant_pool;
        let method = &mut self.methods[index];
        if !method.attributes.iter().any(|a| pool.utf8_eq(a.name_index, name)) {
            method.attributes.push(AttributeInfo { name_index, info });
        }
        Ok(())
    }

    // ── Builder ──────────────────────────────────────────────────────

    /// Start an empty class with no members.
    pub fn new(internal_name: &str, super_name: &str, major_version: u16) -> Result<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.class_index(internal_name)?;
        let super_class = constant_pool.class_index(super_name)?;
        Ok(Self {
            minor_version: 0,
            major_version,
            constant_pool,
            access_flags: crate::access::ACC_PUBLIC | crate::access::ACC_SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    pub fn add_field(&mut self, access_flags: u16, name: &str, descriptor: &str) -> Result<usize> {
        let name_index = self.constant_pool.utf8_index(name)?;
        let descriptor_index = self.constant_pool.utf8_index(descriptor)?;
        self.fields.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        Ok(self.fields.len() - 1)
    }

    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<&CodeAttribute>,
    ) -> Result<usize> {
        let name_index = self.constant_pool.utf8_index(name)?;
        let descriptor_index = self.constant_pool.utf8_index(descriptor)?;
        self.methods.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        let index = self.methods.len() - 1;
        if let Some(code) = code {
            self.set_method_code(index, code)?;
        }
        Ok(index)
    }
}
