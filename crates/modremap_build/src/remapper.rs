//! Remapping engine.
//!
//! [`Remapper`] is the capability the driver and the refmap pass depend on;
//! [`ClassRemapper`] implements it by rewriting class files in place. Utf8
//! and `NameAndType` constants are never edited: renamed symbols get new
//! constants appended to the pool, so literals that happen to spell a class
//! name keep their value.

use crate::archive::{for_each_file, is_archive, is_class_entry, open_archive, ArchiveError, OutputSink};
use crate::classfile::{parse_header, ClassFile, ClassParseError, Constant, ConstantPool};
use crate::descriptor::{remap_class_reference, remap_descriptor, remap_signature};
use crate::mappings::{MappingError, MappingSet, MappingTable};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("Malformed class '{entry}' in '{archive}': {source}")]
    ClassFile {
        archive: PathBuf,
        entry: String,
        #[source]
        source: ClassParseError,
    },
    #[error("IO error while reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("remapper used before configure")]
    NotConfigured,
}

/// Binary remapping capability.
///
/// The lifecycle is `configure` → `register_root`* → `apply` → `release`.
/// `release` must be idempotent and must keep the class-name map available
/// to [`Remapper::map_class_name`].
pub trait Remapper {
    fn configure(&mut self, mappings: &MappingTable, from: &str, to: &str)
    -> Result<(), TransformError>;

    fn register_root(&mut self, root: &Path) -> Result<(), TransformError>;

    /// Rewrites every class entry of `input` into `sink`. Returns the number
    /// of classes written.
    fn apply(&mut self, input: &Path, sink: &mut OutputSink) -> Result<usize, TransformError>;

    fn map_class_name(&self, name: &str) -> Option<String>;

    fn release(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ClassNode {
    super_name: Option<String>,
    interfaces: Vec<String>,
}

/// Super types of every class seen in the registered roots.
#[derive(Debug, Clone, Default)]
struct Hierarchy {
    nodes: HashMap<String, ClassNode>,
}

impl Hierarchy {
    fn insert(&mut self, name: String, node: ClassNode) {
        self.nodes.entry(name).or_insert(node);
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Breadth-first search from `owner` through super classes and
    /// interfaces, returning the first hit of `lookup`.
    fn resolve<'m, F>(&self, owner: &str, lookup: F) -> Option<&'m str>
    where
        F: Fn(&str) -> Option<&'m str>,
    {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(found) = lookup(&current) {
                return Some(found);
            }
            if let Some(node) = self.nodes.get(&current) {
                queue.extend(node.super_name.iter().cloned());
                queue.extend(node.interfaces.iter().cloned());
            }
        }
        None
    }
}

/// Result of rewriting one class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemappedClass {
    pub original_name: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Constant-pool based implementation of [`Remapper`].
#[derive(Debug, Default)]
pub struct ClassRemapper {
    mappings: Option<MappingSet>,
    hierarchy: Hierarchy,
    roots: Vec<PathBuf>,
}

impl ClassRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: MappingSet) -> Self {
        Self {
            mappings: Some(mappings),
            ..Self::default()
        }
    }

    /// Roots registered since the last release.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn known_classes(&self) -> usize {
        self.hierarchy.len()
    }

    fn mappings(&self) -> Result<&MappingSet, TransformError> {
        self.mappings.as_ref().ok_or(TransformError::NotConfigured)
    }

    fn record_header(&mut self, bytes: &[u8], source: &str) {
        match parse_header(bytes) {
            Ok(header) => self.hierarchy.insert(
                header.name,
                ClassNode {
                    super_name: header.super_name,
                    interfaces: header.interfaces,
                },
            ),
            Err(error) => debug!(class = source, error = %error, "skipping unreadable class"),
        }
    }

    fn scan_directory(&mut self, root: &Path) -> Result<(), TransformError> {
        let io_error = |path: &Path, source| TransformError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            for entry in fs::read_dir(&dir).map_err(|source| io_error(&dir, source))? {
                let entry = entry.map_err(|source| io_error(&dir, source))?;
                let path = entry.path();
                let metadata = entry.metadata().map_err(|source| io_error(&path, source))?;
                if metadata.is_dir() {
                    dirs.push(path);
                    continue;
                }
                let is_class = path
                    .extension()
                    .and_then(OsStr::to_str)
                    .map(|ext| ext == "class")
                    .unwrap_or(false);
                if is_class {
                    let bytes = fs::read(&path).map_err(|source| io_error(&path, source))?;
                    self.record_header(&bytes, &path.display().to_string());
                }
            }
        }
        Ok(())
    }

    /// Rewrites a single class file.
    pub fn remap_class(&self, bytes: &[u8]) -> Result<RemappedClass, ClassParseError> {
        // Unconfigured: every name maps to itself.
        let empty = MappingSet::default();
        let mappings = self.mappings.as_ref().unwrap_or(&empty);
        ClassRewriter {
            mappings,
            hierarchy: &self.hierarchy,
        }
        .rewrite(bytes)
    }
}

impl Remapper for ClassRemapper {
    fn configure(
        &mut self,
        mappings: &MappingTable,
        from: &str,
        to: &str,
    ) -> Result<(), TransformError> {
        let set = mappings.mapping_set(from, to)?;
        debug!(from, to, classes = set.class_count(), "configured class remapper");
        self.mappings = Some(set);
        Ok(())
    }

    fn register_root(&mut self, root: &Path) -> Result<(), TransformError> {
        if !root.exists() {
            warn!(root = %root.display(), "resolution root does not exist, skipping");
            return Ok(());
        }

        let before = self.hierarchy.len();
        if root.is_dir() {
            self.scan_directory(root)?;
        } else if is_archive(root) {
            let mut headers = Vec::new();
            for_each_file(root, |name, bytes| {
                if is_class_entry(name) {
                    headers.push((name.to_string(), bytes.to_vec()));
                }
                Ok(())
            })?;
            for (name, bytes) in headers {
                self.record_header(&bytes, &name);
            }
        } else {
            warn!(root = %root.display(), "unsupported resolution root, skipping");
            return Ok(());
        }

        debug!(
            root = %root.display(),
            classes = self.hierarchy.len() - before,
            "registered resolution root"
        );
        self.roots.push(root.to_path_buf());
        Ok(())
    }

    fn apply(&mut self, input: &Path, sink: &mut OutputSink) -> Result<usize, TransformError> {
        self.mappings()?;

        let mut archive = open_archive(input)?;
        let mut written = 0;
        let mut buffer = Vec::new();
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx).map_err(|source| ArchiveError::Zip {
                path: input.to_path_buf(),
                source,
            })?;
            if entry.is_dir() || !is_class_entry(entry.name()) {
                continue;
            }
            let entry_name = entry.name().to_string();
            buffer.clear();
            entry
                .read_to_end(&mut buffer)
                .map_err(|source| TransformError::Io {
                    path: input.to_path_buf(),
                    source,
                })?;

            let remapped = self
                .remap_class(&buffer)
                .map_err(|source| TransformError::ClassFile {
                    archive: input.to_path_buf(),
                    entry: entry_name.clone(),
                    source,
                })?;
            let target = remapped_entry_name(&entry_name, &remapped.original_name, &remapped.name);
            sink.write_entry(&target, &remapped.bytes)?;
            written += 1;
        }

        debug!(input = %input.display(), classes = written, "rewrote class entries");
        Ok(written)
    }

    fn map_class_name(&self, name: &str) -> Option<String> {
        self.mappings.as_ref()?.map_class(name)
    }

    fn release(&mut self) {
        if self.roots.is_empty() && self.hierarchy.nodes.is_empty() {
            return;
        }
        self.hierarchy.clear();
        self.roots.clear();
        debug!("released class remapper inputs");
    }
}

/// Moves `entry` to the path of the renamed class, keeping any directory
/// prefix such as `META-INF/versions/9/`.
fn remapped_entry_name(entry: &str, original: &str, mapped: &str) -> String {
    if original == mapped {
        return entry.to_string();
    }
    let suffix = format!("{original}.class");
    match entry.strip_suffix(&suffix) {
        Some(prefix) if prefix.is_empty() || prefix.ends_with('/') => {
            format!("{prefix}{mapped}.class")
        }
        _ => entry.to_string(),
    }
}

/// Appends constants, reusing identical Utf8 and `NameAndType` entries.
struct PoolWriter<'p> {
    pool: &'p mut ConstantPool,
    utf8: HashMap<String, u16>,
    name_and_types: HashMap<(u16, u16), u16>,
}

impl<'p> PoolWriter<'p> {
    fn new(pool: &'p mut ConstantPool) -> Self {
        let mut utf8 = HashMap::new();
        let mut name_and_types = HashMap::new();
        for (index, entry) in pool.iter() {
            match entry {
                Constant::Utf8(bytes) => {
                    if let Ok(value) = std::str::from_utf8(bytes) {
                        utf8.entry(value.to_string()).or_insert(index);
                    }
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    name_and_types
                        .entry((*name_index, *descriptor_index))
                        .or_insert(index);
                }
                _ => {}
            }
        }
        Self {
            pool,
            utf8,
            name_and_types,
        }
    }

    fn utf8(&mut self, value: &str) -> Result<u16, ClassParseError> {
        if let Some(index) = self.utf8.get(value) {
            return Ok(*index);
        }
        let index = self.pool.push(Constant::Utf8(value.as_bytes().to_vec()))?;
        self.utf8.insert(value.to_string(), index);
        Ok(index)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassParseError> {
        let key = (self.utf8(name)?, self.utf8(descriptor)?);
        if let Some(index) = self.name_and_types.get(&key) {
            return Ok(*index);
        }
        let index = self.pool.push(Constant::NameAndType {
            name_index: key.0,
            descriptor_index: key.1,
        })?;
        self.name_and_types.insert(key, index);
        Ok(index)
    }

    fn set(&mut self, index: u16, constant: Constant) -> Result<(), ClassParseError> {
        *self.pool.get_mut(index)? = constant;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Field,
    Method,
}

struct ClassRewriter<'a> {
    mappings: &'a MappingSet,
    hierarchy: &'a Hierarchy,
}

impl<'a> ClassRewriter<'a> {
    fn class(&self, name: &str) -> Option<String> {
        self.mappings.map_class(name)
    }

    fn descriptor(&self, descriptor: &str) -> String {
        remap_descriptor(descriptor, |name| self.class(name))
    }

    fn member_name(&self, kind: MemberKind, owner: &str, name: &str, descriptor: &str) -> String {
        if owner.starts_with('[') || name == "<init>" || name == "<clinit>" {
            return name.to_string();
        }
        let mappings = self.mappings;
        let found = match kind {
            MemberKind::Field => self
                .hierarchy
                .resolve(owner, |class| mappings.map_field(class, name, descriptor)),
            MemberKind::Method => self
                .hierarchy
                .resolve(owner, |class| mappings.map_method(class, name, descriptor)),
        };
        found.unwrap_or(name).to_string()
    }

    fn rewrite(&self, bytes: &[u8]) -> Result<RemappedClass, ClassParseError> {
        let mut class = ClassFile::parse(bytes)?;
        let original_name = class.name()?.to_string();
        let original = class.constant_pool.clone();
        let mut writer = PoolWriter::new(&mut class.constant_pool);

        for (index, entry) in original.iter() {
            match entry {
                Constant::Class { name_index } => {
                    let name = original.utf8(*name_index)?;
                    let mapped = remap_class_reference(name, |name| self.class(name));
                    if mapped != name {
                        let name_index = writer.utf8(&mapped)?;
                        writer.set(index, Constant::Class { name_index })?;
                    }
                }
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
                } => {
                    let kind = if matches!(entry, Constant::FieldRef { .. }) {
                        MemberKind::Field
                    } else {
                        MemberKind::Method
                    };
                    let owner = original.class_name(*class_index)?;
                    let (name, descriptor) = original.name_and_type(*name_and_type_index)?;
                    let new_name = self.member_name(kind, owner, name, descriptor);
                    let new_descriptor = self.descriptor(descriptor);
                    if new_name != name || new_descriptor != descriptor {
                        let nat = writer.name_and_type(&new_name, &new_descriptor)?;
                        let updated = match entry {
                            Constant::FieldRef { .. } => Constant::FieldRef {
                                class_index: *class_index,
                                name_and_type_index: nat,
                            },
                            Constant::MethodRef { .. } => Constant::MethodRef {
                                class_index: *class_index,
                                name_and_type_index: nat,
                            },
                            _ => Constant::InterfaceMethodRef {
                                class_index: *class_index,
                                name_and_type_index: nat,
                            },
                        };
                        writer.set(index, updated)?;
                    }
                }
                Constant::MethodType { descriptor_index } => {
                    let descriptor = original.utf8(*descriptor_index)?;
                    let mapped = self.descriptor(descriptor);
                    if mapped != descriptor {
                        let descriptor_index = writer.utf8(&mapped)?;
                        writer.set(index, Constant::MethodType { descriptor_index })?;
                    }
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
                | Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    let (name, descriptor) = original.name_and_type(*name_and_type_index)?;
                    let mapped = self.descriptor(descriptor);
                    if mapped != descriptor {
                        let nat = writer.name_and_type(name, &mapped)?;
                        let updated = if matches!(entry, Constant::Dynamic { .. }) {
                            Constant::Dynamic {
                                bootstrap_method_attr_index: *bootstrap_method_attr_index,
                                name_and_type_index: nat,
                            }
                        } else {
                            Constant::InvokeDynamic {
                                bootstrap_method_attr_index: *bootstrap_method_attr_index,
                                name_and_type_index: nat,
                            }
                        };
                        writer.set(index, updated)?;
                    }
                }
                _ => {}
            }
        }

        for (kind, members) in [
            (MemberKind::Field, &mut class.fields),
            (MemberKind::Method, &mut class.methods),
        ] {
            for member in members.iter_mut() {
                let name = original.utf8(member.name_index)?;
                let descriptor = original.utf8(member.descriptor_index)?;
                let new_name = self.member_name(kind, &original_name, name, descriptor);
                let new_descriptor = self.descriptor(descriptor);
                if new_name != name {
                    member.name_index = writer.utf8(&new_name)?;
                }
                if new_descriptor != descriptor {
                    member.descriptor_index = writer.utf8(&new_descriptor)?;
                }
                for attribute in member.attributes.iter_mut() {
                    let name = original.utf8(attribute.name_index)?;
                    self.rewrite_attribute(&original, &mut writer, name, &mut attribute.info)?;
                }
            }
        }

        for attribute in class.attributes.iter_mut() {
            match original.utf8(attribute.name_index)? {
                "InnerClasses" => self.rewrite_inner_classes(&original, &mut writer, &mut attribute.info)?,
                "EnclosingMethod" => self.rewrite_enclosing_method(&original, &mut writer, &mut attribute.info)?,
                "Record" => {
                    self.rewrite_record(&original, &mut writer, &original_name, &mut attribute.info)?
                }
                name => self.rewrite_attribute(&original, &mut writer, name, &mut attribute.info)?,
            }
        }

        let name = self.class(&original_name).unwrap_or_else(|| original_name.clone());
        Ok(RemappedClass {
            original_name,
            name,
            bytes: class.to_bytes(),
        })
    }

    /// Rewrites the attributes that may appear on classes, members, record
    /// components and inside `Code`. Unknown attributes are left alone.
    fn rewrite_attribute(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        name: &str,
        info: &mut [u8],
    ) -> Result<(), ClassParseError> {
        let mut cursor = AttributeCursor::new(name, info);
        match name {
            "Signature" => self.rewrite_utf8(original, writer, &mut cursor, |value| {
                remap_signature(value, |class| self.class(class))
            })?,
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                self.rewrite_annotations(original, writer, &mut cursor)?
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let parameters = cursor.u1()?;
                for _ in 0..parameters {
                    self.rewrite_annotations(original, writer, &mut cursor)?;
                }
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                let count = cursor.u2()?;
                for _ in 0..count {
                    skip_type_annotation_target(&mut cursor)?;
                    self.rewrite_annotation(original, writer, &mut cursor)?;
                }
            }
            "AnnotationDefault" => self.rewrite_element_value(original, writer, &mut cursor)?,
            "Code" => {
                cursor.skip(4)?;
                let code_length = cursor.u4()? as usize;
                cursor.skip(code_length)?;
                let handlers = cursor.u2()? as usize;
                cursor.skip(handlers * 8)?;
                self.rewrite_nested_attributes(original, writer, &mut cursor)?;
            }
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                let generic = name == "LocalVariableTypeTable";
                let count = cursor.u2()?;
                for _ in 0..count {
                    // start_pc, length, name
                    cursor.skip(6)?;
                    if generic {
                        self.rewrite_utf8(original, writer, &mut cursor, |value| {
                            remap_signature(value, |class| self.class(class))
                        })?;
                    } else {
                        self.rewrite_utf8(original, writer, &mut cursor, |value| {
                            self.descriptor(value)
                        })?;
                    }
                    cursor.skip(2)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn rewrite_nested_attributes(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        cursor: &mut AttributeCursor<'_>,
    ) -> Result<(), ClassParseError> {
        let count = cursor.u2()?;
        for _ in 0..count {
            let name = original.utf8(cursor.u2()?)?;
            let length = cursor.u4()? as usize;
            let body = cursor.take(length)?;
            self.rewrite_attribute(original, writer, name, body)?;
        }
        Ok(())
    }

    fn rewrite_record(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        owner: &str,
        info: &mut [u8],
    ) -> Result<(), ClassParseError> {
        let mut cursor = AttributeCursor::new("Record", info);
        let components = cursor.u2()?;
        for _ in 0..components {
            let name_at = cursor.pos;
            let name = original.utf8(cursor.u2()?)?;
            let descriptor_at = cursor.pos;
            let descriptor = original.utf8(cursor.u2()?)?;

            let new_name = self.member_name(MemberKind::Field, owner, name, descriptor);
            if new_name != name {
                cursor.set_u2(name_at, writer.utf8(&new_name)?);
            }
            let new_descriptor = self.descriptor(descriptor);
            if new_descriptor != descriptor {
                cursor.set_u2(descriptor_at, writer.utf8(&new_descriptor)?);
            }
            self.rewrite_nested_attributes(original, writer, &mut cursor)?;
        }
        Ok(())
    }

    fn rewrite_annotations(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        cursor: &mut AttributeCursor<'_>,
    ) -> Result<(), ClassParseError> {
        let count = cursor.u2()?;
        for _ in 0..count {
            self.rewrite_annotation(original, writer, cursor)?;
        }
        Ok(())
    }

    fn rewrite_annotation(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        cursor: &mut AttributeCursor<'_>,
    ) -> Result<(), ClassParseError> {
        self.rewrite_utf8(original, writer, cursor, |value| self.descriptor(value))?;
        let pairs = cursor.u2()?;
        for _ in 0..pairs {
            // element names belong to the annotation interface
            cursor.skip(2)?;
            self.rewrite_element_value(original, writer, cursor)?;
        }
        Ok(())
    }

    fn rewrite_element_value(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        cursor: &mut AttributeCursor<'_>,
    ) -> Result<(), ClassParseError> {
        match cursor.u1()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => cursor.skip(2)?,
            b'e' => {
                let type_at = cursor.pos;
                let enum_type = original.utf8(cursor.u2()?)?;
                let constant_at = cursor.pos;
                let constant = original.utf8(cursor.u2()?)?;

                if let Some(owner) = enum_type.strip_prefix('L').and_then(|t| t.strip_suffix(';')) {
                    let mapped = self.member_name(MemberKind::Field, owner, constant, enum_type);
                    if mapped != constant {
                        cursor.set_u2(constant_at, writer.utf8(&mapped)?);
                    }
                }
                let mapped_type = self.descriptor(enum_type);
                if mapped_type != enum_type {
                    cursor.set_u2(type_at, writer.utf8(&mapped_type)?);
                }
            }
            b'c' => self.rewrite_utf8(original, writer, cursor, |value| self.descriptor(value))?,
            b'@' => self.rewrite_annotation(original, writer, cursor)?,
            b'[' => {
                let count = cursor.u2()?;
                for _ in 0..count {
                    self.rewrite_element_value(original, writer, cursor)?;
                }
            }
            _ => return Err(cursor.malformed()),
        }
        Ok(())
    }

    /// Points the Utf8 index under the cursor at the remapped value.
    fn rewrite_utf8<F>(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        cursor: &mut AttributeCursor<'_>,
        remap: F,
    ) -> Result<(), ClassParseError>
    where
        F: Fn(&str) -> String,
    {
        let at = cursor.pos;
        let index = cursor.u2()?;
        if index == 0 {
            return Ok(());
        }
        let value = original.utf8(index)?;
        let mapped = remap(value);
        if mapped != value {
            cursor.set_u2(at, writer.utf8(&mapped)?);
        }
        Ok(())
    }

    fn rewrite_inner_classes(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        info: &mut [u8],
    ) -> Result<(), ClassParseError> {
        let count = read_u2_at(info, 0)? as usize;
        for i in 0..count {
            let offset = 2 + i * 8;
            let inner_index = read_u2_at(info, offset)?;
            let simple_index = read_u2_at(info, offset + 4)?;
            if inner_index == 0 || simple_index == 0 {
                continue;
            }
            let inner = original.class_name(inner_index)?;
            let Some(mapped) = self.class(inner) else {
                continue;
            };
            let Some((_, mapped_simple)) = mapped.rsplit_once('$') else {
                continue;
            };
            let simple = original.utf8(simple_index)?;
            if mapped_simple != simple {
                write_u2_at(info, offset + 4, writer.utf8(mapped_simple)?);
            }
        }
        Ok(())
    }

    fn rewrite_enclosing_method(
        &self,
        original: &ConstantPool,
        writer: &mut PoolWriter<'_>,
        info: &mut [u8],
    ) -> Result<(), ClassParseError> {
        let class_index = read_u2_at(info, 0)?;
        let method_index = read_u2_at(info, 2)?;
        if method_index == 0 {
            return Ok(());
        }
        let owner = original.class_name(class_index)?;
        let (name, descriptor) = original.name_and_type(method_index)?;
        let new_name = self.member_name(MemberKind::Method, owner, name, descriptor);
        let new_descriptor = self.descriptor(descriptor);
        if new_name != name || new_descriptor != descriptor {
            write_u2_at(info, 2, writer.name_and_type(&new_name, &new_descriptor)?);
        }
        Ok(())
    }
}

/// Reads an attribute body in place. Only u2 constant indices are ever
/// patched, so the body never changes length.
struct AttributeCursor<'b> {
    name: &'b str,
    bytes: &'b mut [u8],
    pos: usize,
}

impl<'b> AttributeCursor<'b> {
    fn new(name: &'b str, bytes: &'b mut [u8]) -> Self {
        Self { name, bytes, pos: 0 }
    }

    fn malformed(&self) -> ClassParseError {
        ClassParseError::MalformedAttribute {
            name: self.name.to_string(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&mut [u8], ClassParseError> {
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.malformed())?;
        self.pos = end;
        Ok(&mut self.bytes[start..end])
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.take(len).map(|_| ())
    }

    fn u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16, ClassParseError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u4(&mut self) -> Result<u32, ClassParseError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Overwrites a u2 that has already been read.
    fn set_u2(&mut self, at: usize, value: u16) {
        write_u2_at(self.bytes, at, value);
    }
}

/// Skips `target_type`, `target_info` and `type_path` of a type annotation.
fn skip_type_annotation_target(cursor: &mut AttributeCursor<'_>) -> Result<(), ClassParseError> {
    let target_info = match cursor.u1()? {
        0x00 | 0x01 | 0x16 => 1,
        0x10 | 0x11 | 0x12 | 0x17 | 0x42..=0x46 => 2,
        0x13..=0x15 => 0,
        0x47..=0x4B => 3,
        0x40 | 0x41 => {
            let entries = cursor.u2()? as usize;
            entries * 6
        }
        _ => return Err(cursor.malformed()),
    };
    cursor.skip(target_info)?;
    let path_length = cursor.u1()? as usize;
    cursor.skip(path_length * 2)
}

fn read_u2_at(bytes: &[u8], offset: usize) -> Result<u16, ClassParseError> {
    match bytes.get(offset..offset + 2) {
        Some(slice) => Ok(u16::from_be_bytes([slice[0], slice[1]])),
        None => Err(ClassParseError::UnexpectedEof),
    }
}

fn write_u2_at(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_entry;
    use crate::classfile::tests::ClassBuilder;
    use std::fs::File;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const MAPPINGS: &str = "v1\tofficial\tintermediary\tnamed\n\
        CLASS\ta\tnet/x/abc\tnet/x/Foo\n\
        CLASS\tb\tnet/x/def\tnet/x/Bar\n\
        FIELD\ta\tI\tc\tfield_1\tcount\n\
        FIELD\ta\tLa;\te\tfield_3\tFIRST\n\
        METHOD\ta\t(Lb;)V\td\tmethod_2\taccept\n";

    fn configured() -> ClassRemapper {
        let table = MappingTable::parse(MAPPINGS.as_bytes()).unwrap();
        let mut remapper = ClassRemapper::new();
        remapper.configure(&table, "intermediary", "named").unwrap();
        remapper
    }

    fn string_literals(class: &ClassFile) -> Vec<String> {
        class
            .constant_pool
            .iter()
            .filter_map(|(_, entry)| match entry {
                Constant::String { string_index } => {
                    class.constant_pool.utf8(*string_index).ok().map(str::to_string)
                }
                _ => None,
            })
            .collect()
    }

    fn u2(out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a nested attribute and returns the offset of its body.
    fn nested(out: &mut Vec<u8>, name_index: u16, body: &[u8]) -> usize {
        u2(out, name_index);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        let start = out.len();
        out.extend_from_slice(body);
        start
    }

    fn utf8_at(class: &ClassFile, info: &[u8], at: usize) -> String {
        let index = read_u2_at(info, at).unwrap();
        class.constant_pool.utf8(index).unwrap().to_string()
    }

    fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn class_references_are_renamed_and_literals_kept() {
        let remapper = configured();
        let bytes = ClassBuilder::new("net/x/user/A", "java/lang/Object")
            .literal("net/x/abc")
            .field_ref("net/x/abc", "field_1", "I")
            .build();

        let remapped = remapper.remap_class(&bytes).unwrap();
        let class = ClassFile::parse(&remapped.bytes).unwrap();

        let classes = class.referenced_classes();
        assert!(classes.contains(&"net/x/Foo"));
        assert!(!classes.contains(&"net/x/abc"));
        assert_eq!(string_literals(&class), vec!["net/x/abc".to_string()]);
        assert_eq!(remapped.name, "net/x/user/A");
    }

    #[test]
    fn inherited_members_resolve_through_hierarchy() {
        let mut remapper = configured();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("lib.jar");
        write_jar(
            &root,
            &[(
                "net/x/Child.class",
                ClassBuilder::new("net/x/Child", "net/x/abc").build(),
            )],
        );
        remapper.register_root(&root).unwrap();
        assert_eq!(remapper.known_classes(), 1);

        let bytes = ClassBuilder::new("net/x/user/B", "java/lang/Object")
            .field_ref("net/x/Child", "field_1", "I")
            .method_ref("net/x/Child", "method_2", "(Lnet/x/def;)V")
            .build();
        let class = ClassFile::parse(&remapper.remap_class(&bytes).unwrap().bytes).unwrap();

        let mut names = Vec::new();
        for (_, entry) in class.constant_pool.iter() {
            if let Constant::FieldRef {
                name_and_type_index,
                ..
            }
            | Constant::MethodRef {
                name_and_type_index,
                ..
            } = entry
            {
                let (name, descriptor) =
                    class.constant_pool.name_and_type(*name_and_type_index).unwrap();
                names.push(format!("{name}{descriptor}"));
            }
        }
        assert_eq!(names, vec!["countI", "accept(Lnet/x/Bar;)V"]);
    }

    #[test]
    fn declared_members_and_signatures_are_rewritten() {
        let remapper = configured();
        let bytes = ClassBuilder::new("net/x/abc", "java/lang/Object")
            .field("field_1", "I")
            .method("method_2", "(Lnet/x/def;)V")
            .signature("Ljava/lang/Object;Ljava/lang/Comparable<Lnet/x/abc;>;")
            .build();

        let remapped = remapper.remap_class(&bytes).unwrap();
        assert_eq!(remapped.name, "net/x/Foo");

        let class = ClassFile::parse(&remapped.bytes).unwrap();
        let pool = &class.constant_pool;
        assert_eq!(pool.utf8(class.fields[0].name_index).unwrap(), "count");
        assert_eq!(pool.utf8(class.methods[0].name_index).unwrap(), "accept");
        assert_eq!(
            pool.utf8(class.methods[0].descriptor_index).unwrap(),
            "(Lnet/x/Bar;)V"
        );
        let signature = read_u2_at(&class.attributes[0].info, 0).unwrap();
        assert_eq!(
            pool.utf8(signature).unwrap(),
            "Ljava/lang/Object;Ljava/lang/Comparable<Lnet/x/Foo;>;"
        );
    }

    #[test]
    fn inner_class_names_follow_outer_mapping() {
        let remapper = configured();
        let bytes = ClassBuilder::new("net/x/abc$1", "java/lang/Object")
            .inner_class("net/x/def$a", "net/x/def", "a")
            .build();

        let remapped = remapper.remap_class(&bytes).unwrap();
        assert_eq!(remapped.name, "net/x/Foo$1");

        let class = ClassFile::parse(&remapped.bytes).unwrap();
        let simple = read_u2_at(&class.attributes[0].info, 6).unwrap();
        assert_eq!(class.constant_pool.utf8(simple).unwrap(), "a");
        assert!(class.referenced_classes().contains(&"net/x/Bar$a"));
    }

    #[test]
    fn mixin_target_class_literal_is_remapped() {
        let remapper = configured();
        let mut builder = ClassBuilder::new("net/mod/MixinA", "java/lang/Object");
        let mixin = builder.utf8("Lorg/spongepowered/asm/mixin/Mixin;");
        let value = builder.utf8("value");
        let target = builder.utf8("Lnet/x/abc;");
        let shadow = builder.utf8("Lnet/x/def;");

        let mut info = Vec::new();
        u2(&mut info, 1);
        u2(&mut info, mixin);
        u2(&mut info, 2);
        u2(&mut info, value);
        info.push(b'[');
        u2(&mut info, 1);
        info.push(b'c');
        let literal_at = info.len();
        u2(&mut info, target);
        u2(&mut info, value);
        info.push(b'@');
        let nested_at = info.len();
        u2(&mut info, shadow);
        u2(&mut info, 0);

        let bytes = builder.attribute("RuntimeInvisibleAnnotations", info).build();
        let class = ClassFile::parse(&remapper.remap_class(&bytes).unwrap().bytes).unwrap();
        let info = &class.attributes[0].info;

        assert_eq!(utf8_at(&class, info, 2), "Lorg/spongepowered/asm/mixin/Mixin;");
        assert_eq!(utf8_at(&class, info, literal_at), "Lnet/x/Foo;");
        assert_eq!(utf8_at(&class, info, nested_at), "Lnet/x/Bar;");
    }

    #[test]
    fn parameter_annotations_enums_and_defaults_are_remapped() {
        let remapper = configured();
        let mut builder = ClassBuilder::new("net/mod/Marker", "java/lang/Object");
        let marker = builder.utf8("Lnet/x/def;");
        let value = builder.utf8("value");
        let enum_type = builder.utf8("Lnet/x/abc;");
        let constant = builder.utf8("field_3");
        let default_class = builder.utf8("Lnet/x/def;");

        let mut parameters = vec![1];
        u2(&mut parameters, 1);
        let marker_at = parameters.len();
        u2(&mut parameters, marker);
        u2(&mut parameters, 1);
        u2(&mut parameters, value);
        parameters.push(b'e');
        let enum_at = parameters.len();
        u2(&mut parameters, enum_type);
        u2(&mut parameters, constant);

        let mut default = vec![b'c'];
        u2(&mut default, default_class);

        let bytes = builder
            .method("method_2", "(Lnet/x/def;)V")
            .method_attribute("RuntimeVisibleParameterAnnotations", parameters)
            .method("target", "()Ljava/lang/Class;")
            .method_attribute("AnnotationDefault", default)
            .build();
        let class = ClassFile::parse(&remapper.remap_class(&bytes).unwrap().bytes).unwrap();

        let info = &class.methods[0].attributes[0].info;
        assert_eq!(utf8_at(&class, info, marker_at), "Lnet/x/Bar;");
        assert_eq!(utf8_at(&class, info, enum_at), "Lnet/x/Foo;");
        assert_eq!(utf8_at(&class, info, enum_at + 2), "FIRST");

        let info = &class.methods[1].attributes[0].info;
        assert_eq!(utf8_at(&class, info, 1), "Lnet/x/Bar;");
    }

    #[test]
    fn code_debug_tables_and_type_annotations_are_remapped() {
        let remapper = configured();
        let mut builder = ClassBuilder::new("net/mod/User", "java/lang/Object");
        let lvt = builder.utf8("LocalVariableTable");
        let lvtt = builder.utf8("LocalVariableTypeTable");
        let type_annotations = builder.utf8("RuntimeVisibleTypeAnnotations");
        let local = builder.utf8("other");
        let descriptor = builder.utf8("Lnet/x/abc;");
        let signature = builder.utf8("Ljava/util/List<Lnet/x/def;>;");
        let annotation_type = builder.utf8("Lnet/x/def;");

        let mut table = Vec::new();
        u2(&mut table, 1);
        u2(&mut table, 0);
        u2(&mut table, 1);
        u2(&mut table, local);
        u2(&mut table, descriptor);
        u2(&mut table, 1);

        let mut generic_table = Vec::new();
        u2(&mut generic_table, 1);
        u2(&mut generic_table, 0);
        u2(&mut generic_table, 1);
        u2(&mut generic_table, local);
        u2(&mut generic_table, signature);
        u2(&mut generic_table, 1);

        // one localvar-targeted annotation with an empty type path
        let mut annotated = Vec::new();
        u2(&mut annotated, 1);
        annotated.push(0x40);
        u2(&mut annotated, 1);
        u2(&mut annotated, 0);
        u2(&mut annotated, 1);
        u2(&mut annotated, 1);
        annotated.push(0);
        let annotation_at = annotated.len();
        u2(&mut annotated, annotation_type);
        u2(&mut annotated, 0);

        let mut code = Vec::new();
        u2(&mut code, 1);
        u2(&mut code, 2);
        code.extend_from_slice(&1u32.to_be_bytes());
        code.push(0xB1);
        u2(&mut code, 0);
        u2(&mut code, 3);
        let table_at = nested(&mut code, lvt, &table);
        let generic_at = nested(&mut code, lvtt, &generic_table);
        let annotated_at = nested(&mut code, type_annotations, &annotated);

        let bytes = builder
            .method("run", "()V")
            .method_attribute("Code", code)
            .build();
        let remapped = remapper.remap_class(&bytes).unwrap();
        let class = ClassFile::parse(&remapped.bytes).unwrap();
        let info = &class.methods[0].attributes[0].info;

        assert_eq!(utf8_at(&class, info, table_at + 6), "other");
        assert_eq!(utf8_at(&class, info, table_at + 8), "Lnet/x/Foo;");
        assert_eq!(
            utf8_at(&class, info, generic_at + 8),
            "Ljava/util/List<Lnet/x/Bar;>;"
        );
        assert_eq!(
            utf8_at(&class, info, annotated_at + annotation_at),
            "Lnet/x/Bar;"
        );
    }

    #[test]
    fn record_components_follow_field_mappings() {
        let remapper = configured();
        let mut builder = ClassBuilder::new("net/x/abc", "java/lang/Record");
        let count = builder.utf8("field_1");
        let count_type = builder.utf8("I");
        let other = builder.utf8("other");
        let other_type = builder.utf8("Lnet/x/def;");

        let mut record = Vec::new();
        u2(&mut record, 2);
        u2(&mut record, count);
        u2(&mut record, count_type);
        u2(&mut record, 0);
        u2(&mut record, other);
        u2(&mut record, other_type);
        u2(&mut record, 0);

        let bytes = builder.attribute("Record", record).build();
        let class = ClassFile::parse(&remapper.remap_class(&bytes).unwrap().bytes).unwrap();
        let info = &class.attributes[0].info;

        assert_eq!(utf8_at(&class, info, 2), "count");
        assert_eq!(utf8_at(&class, info, 4), "I");
        assert_eq!(utf8_at(&class, info, 8), "other");
        assert_eq!(utf8_at(&class, info, 10), "Lnet/x/Bar;");
    }

    #[test]
    fn truncated_annotation_is_reported() {
        let remapper = configured();
        let bytes = ClassBuilder::new("net/mod/Broken", "java/lang/Object")
            .attribute("RuntimeVisibleAnnotations", vec![0, 1])
            .build();

        let error = remapper.remap_class(&bytes).unwrap_err();
        assert_eq!(
            error,
            ClassParseError::MalformedAttribute {
                name: "RuntimeVisibleAnnotations".to_string()
            }
        );
    }

    #[test]
    fn apply_renames_entries_and_release_keeps_class_map() {
        let mut remapper = configured();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        let output = dir.path().join("out.jar");
        write_jar(
            &input,
            &[
                (
                    "net/x/abc.class",
                    ClassBuilder::new("net/x/abc", "java/lang/Object").build(),
                ),
                ("readme.txt", b"text".to_vec()),
            ],
        );
        remapper.register_root(&input).unwrap();

        let mut sink = OutputSink::create(&output).unwrap();
        assert_eq!(remapper.apply(&input, &mut sink).unwrap(), 1);
        sink.close().unwrap();

        assert!(read_entry(&output, "net/x/Foo.class").unwrap().is_some());
        assert!(read_entry(&output, "readme.txt").unwrap().is_none());

        remapper.release();
        remapper.release();
        assert!(remapper.roots().is_empty());
        assert_eq!(remapper.known_classes(), 0);
        assert_eq!(
            remapper.map_class_name("net/x/def").as_deref(),
            Some("net/x/Bar")
        );
    }

    #[test]
    fn missing_roots_are_skipped_and_unconfigured_apply_fails() {
        let mut remapper = ClassRemapper::new();
        remapper
            .register_root(Path::new("/definitely/not/here.jar"))
            .unwrap();
        assert!(remapper.roots().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        write_jar(&input, &[]);
        let mut sink = OutputSink::create(&dir.path().join("out.jar")).unwrap();
        assert!(matches!(
            remapper.apply(&input, &mut sink),
            Err(TransformError::NotConfigured)
        ));
    }

    #[test]
    fn entry_names_keep_version_prefix() {
        assert_eq!(
            remapped_entry_name("META-INF/versions/9/net/x/abc.class", "net/x/abc", "net/x/Foo"),
            "META-INF/versions/9/net/x/Foo.class"
        );
        assert_eq!(
            remapped_entry_name("other/abc.class", "net/x/abc", "net/x/Foo"),
            "other/abc.class"
        );
    }
}
