//! Class file model used by the remapper.
//!
//! Only the structures that carry symbol names are decoded: the constant
//! pool, the class header, field and method tables, and attribute envelopes.
//! Attribute bodies are kept as raw bytes so everything the remapper does not
//! touch is written back exactly as read.

use thiserror::Error;

const MAGIC: u32 = 0xCAFEBABE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("constant pool entry {index} is not valid UTF-8")]
    Utf8Decode { index: u16 },
    #[error("constant pool exceeds 65535 entries")]
    ConstantPoolOverflow,
    #[error("malformed {name} attribute")]
    MalformedAttribute { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
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
    /// Slot 0 and the slot following a long or double.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// An empty pool holding only the unused slot 0.
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(reader.read_slice(length)?.to_vec())
                }
                3 => Constant::Integer(reader.read_u4()?),
                4 => Constant::Float(reader.read_u4()?),
                5 => Constant::Long(reader.read_u8()?),
                6 => Constant::Double(reader.read_u8()?),
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };

            let wide = entry.is_wide();
            entries.push(entry);
            index += 1;
            if wide {
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u2(out, self.entries.len() as u16);
        for entry in self.entries.iter().skip(1) {
            match entry {
                Constant::Utf8(bytes) => {
                    out.push(1);
                    put_u2(out, bytes.len() as u16);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(value) => {
                    out.push(3);
                    put_u4(out, *value);
                }
                Constant::Float(value) => {
                    out.push(4);
                    put_u4(out, *value);
                }
                Constant::Long(value) => {
                    out.push(5);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                Constant::Double(value) => {
                    out.push(6);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                Constant::Class { name_index } => {
                    out.push(7);
                    put_u2(out, *name_index);
                }
                Constant::String { string_index } => {
                    out.push(8);
                    put_u2(out, *string_index);
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                } => put_pair(out, 9, *class_index, *name_and_type_index),
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                } => put_pair(out, 10, *class_index, *name_and_type_index),
                Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => put_pair(out, 11, *class_index, *name_and_type_index),
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => put_pair(out, 12, *name_index, *descriptor_index),
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    out.push(15);
                    out.push(*reference_kind);
                    put_u2(out, *reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    out.push(16);
                    put_u2(out, *descriptor_index);
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => put_pair(out, 17, *bootstrap_method_attr_index, *name_and_type_index),
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => put_pair(out, 18, *bootstrap_method_attr_index, *name_and_type_index),
                Constant::Module { name_index } => {
                    out.push(19);
                    put_u2(out, *name_index);
                }
                Constant::Package { name_index } => {
                    out.push(20);
                    put_u2(out, *name_index);
                }
                Constant::Unusable => {}
            }
        }
    }

    /// Number of slots including the unused slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index as u16, entry))
    }

    pub fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassParseError::InvalidConstantIndex { index }),
            Some(entry) => Ok(entry),
        }
    }

    pub fn get_mut(&mut self, index: u16) -> Result<&mut Constant, ClassParseError> {
        match self.entries.get_mut(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassParseError::InvalidConstantIndex { index }),
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => {
                std::str::from_utf8(bytes).map_err(|_| ClassParseError::Utf8Decode { index })
            }
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    /// Returns `(name, descriptor)` of a `NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassParseError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    /// Appends an entry and returns its index.
    pub fn push(&mut self, entry: Constant) -> Result<u16, ClassParseError> {
        let slots = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(ClassParseError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = entry.is_wide();
        self.entries.push(entry);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
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
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassParseError> {
        let mut reader = ClassReader::new(bytes);
        reader.expect_magic()?;
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = reader.read_u2()?;
        let super_class = reader.read_u2()?;

        let interfaces_count = reader.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(reader.read_u2()?);
        }

        let fields = read_members(&mut reader)?;
        let methods = read_members(&mut reader)?;
        let attributes = read_attributes(&mut reader)?;

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
        let mut out = Vec::new();
        put_u4(&mut out, MAGIC);
        put_u2(&mut out, self.minor_version);
        put_u2(&mut out, self.major_version);
        self.constant_pool.write(&mut out);
        put_u2(&mut out, self.access_flags);
        put_u2(&mut out, self.this_class);
        put_u2(&mut out, self.super_class);
        put_u2(&mut out, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut out, *interface);
        }
        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        out
    }

    /// Internal name of this class, e.g. `net/x/Foo`.
    pub fn name(&self) -> Result<&str, ClassParseError> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<&str>, ClassParseError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ClassParseError> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name(*index))
            .collect()
    }

    pub fn attribute_name(&self, attribute: &AttributeInfo) -> Result<&str, ClassParseError> {
        self.constant_pool.utf8(attribute.name_index)
    }

    /// Names held by every `Class` constant, in pool order.
    pub fn referenced_classes(&self) -> Vec<&str> {
        self.constant_pool
            .iter()
            .filter_map(|(_, entry)| match entry {
                Constant::Class { name_index } => self.constant_pool.utf8(*name_index).ok(),
                _ => None,
            })
            .collect()
    }
}

/// Class name, super class and interfaces; enough to build a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
}

pub fn parse_header(bytes: &[u8]) -> Result<ClassHeader, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;
    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(pool.class_name(index)?.to_string());
    }

    let super_name = if super_class == 0 {
        None
    } else {
        Some(pool.class_name(super_class)?.to_string())
    };

    Ok(ClassHeader {
        name: pool.class_name(this_class)?.to_string(),
        super_name,
        interfaces,
    })
}

fn read_members(reader: &mut ClassReader<'_>) -> Result<Vec<MemberInfo>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name_index = reader.read_u2()?;
        let descriptor_index = reader.read_u2()?;
        let attributes = read_attributes(reader)?;
        members.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

fn read_attributes(reader: &mut ClassReader<'_>) -> Result<Vec<AttributeInfo>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_slice(length)?.to_vec();
        attributes.push(AttributeInfo { name_index, info });
    }
    Ok(attributes)
}

fn write_members(out: &mut Vec<u8>, members: &[MemberInfo]) {
    put_u2(out, members.len() as u16);
    for member in members {
        put_u2(out, member.access_flags);
        put_u2(out, member.name_index);
        put_u2(out, member.descriptor_index);
        write_attributes(out, &member.attributes);
    }
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[AttributeInfo]) {
    put_u2(out, attributes.len() as u16);
    for attribute in attributes {
        put_u2(out, attribute.name_index);
        put_u4(out, attribute.info.len() as u32);
        out.extend_from_slice(&attribute.info);
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_pair(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    out.push(tag);
    put_u2(out, first);
    put_u2(out, second);
}

pub(crate) struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassParseError> {
        let magic = self.read_u4()?;
        if magic != MAGIC {
            return Err(ClassParseError::InvalidMagic);
        }
        Ok(())
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        let value = *self.data.get(self.pos).ok_or(ClassParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let slice = self.read_slice(2)?;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let slice = self.read_slice(4)?;
        Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn read_u8(&mut self) -> Result<u64, ClassParseError> {
        let high = self.read_u4()? as u64;
        let low = self.read_u4()? as u64;
        Ok((high << 32) | low)
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        if self.pos + len > self.data.len() {
            return Err(ClassParseError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}
