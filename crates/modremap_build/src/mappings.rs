//! Tiny v1 mapping tables.
//!
//! ```text
//! v1	official	intermediary	named
//! CLASS	a	net/x/abc	net/x/Foo
//! FIELD	a	I	b	field_1	count
//! METHOD	a	(La;)V	c	method_2	update
//! ```
//!
//! Member owners and descriptors are written in the first namespace. A
//! [`MappingSet`] is the directional view used by the remapper, with every
//! key translated into the source namespace.

use crate::descriptor::remap_descriptor;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mappings '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read mappings: {0}")]
    Read(#[from] io::Error),
    #[error("mapping table is empty")]
    Empty,
    #[error("unsupported mapping header '{0}', expected 'v1' with at least two namespaces")]
    UnsupportedHeader(String),
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
    #[error("namespace '{0}' is not defined by the mapping table")]
    UnknownNamespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberRow {
    owner: String,
    descriptor: String,
    names: Vec<String>,
}

/// Mapping rows for every namespace of a tiny file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    namespaces: Vec<String>,
    classes: Vec<Vec<String>>,
    fields: Vec<MemberRow>,
    methods: Vec<MemberRow>,
}

impl MappingTable {
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let file = File::open(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(BufReader::new(file))?;
        debug!(
            path = %path.display(),
            classes = table.classes.len(),
            fields = table.fields.len(),
            methods = table.methods.len(),
            "loaded mapping table"
        );
        Ok(table)
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self, MappingError> {
        let mut lines = reader.lines();
        let header = lines.next().ok_or(MappingError::Empty)??;
        let header = header.trim_end_matches('\r');
        let mut columns = header.split('\t');
        if columns.next() != Some("v1") {
            return Err(MappingError::UnsupportedHeader(header.to_string()));
        }
        let namespaces: Vec<String> = columns.map(str::to_string).collect();
        if namespaces.len() < 2 || namespaces.iter().any(|ns| ns.is_empty()) {
            return Err(MappingError::UnsupportedHeader(header.to_string()));
        }

        let mut table = Self {
            namespaces,
            classes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        let width = table.namespaces.len();

        for (offset, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            let number = offset + 2;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = line.split('\t').collect();
            let syntax = |reason: String| MappingError::Syntax {
                line: number,
                reason,
            };
            match columns[0] {
                "CLASS" => {
                    if columns.len() != 1 + width {
                        return Err(syntax(format!(
                            "CLASS expects {} names, found {}",
                            width,
                            columns.len() - 1
                        )));
                    }
                    table.classes.push(fill_names(&columns[1..]));
                }
                kind @ ("FIELD" | "METHOD") => {
                    if columns.len() != 3 + width {
                        return Err(syntax(format!(
                            "{kind} expects owner, descriptor and {width} names"
                        )));
                    }
                    let row = MemberRow {
                        owner: columns[1].to_string(),
                        descriptor: columns[2].to_string(),
                        names: fill_names(&columns[3..]),
                    };
                    if kind == "FIELD" {
                        table.fields.push(row);
                    } else {
                        table.methods.push(row);
                    }
                }
                other => return Err(syntax(format!("unknown row kind '{other}'"))),
            }
        }

        Ok(table)
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    fn namespace_index(&self, namespace: &str) -> Result<usize, MappingError> {
        self.namespaces
            .iter()
            .position(|ns| ns == namespace)
            .ok_or_else(|| MappingError::UnknownNamespace(namespace.to_string()))
    }

    /// Builds the `from` → `to` view of the table.
    pub fn mapping_set(&self, from: &str, to: &str) -> Result<MappingSet, MappingError> {
        let from_index = self.namespace_index(from)?;
        let to_index = self.namespace_index(to)?;

        // Member owners and descriptors are stored in the first namespace.
        let mut primary_to_from = HashMap::new();
        let mut classes = HashMap::new();
        for names in &self.classes {
            if from_index != 0 && names[0] != names[from_index] {
                primary_to_from.insert(names[0].clone(), names[from_index].clone());
            }
            if names[from_index] != names[to_index] {
                classes.insert(names[from_index].clone(), names[to_index].clone());
            }
        }

        let translate = |row: &MemberRow| -> (String, String) {
            if from_index == 0 {
                return (row.owner.clone(), row.descriptor.clone());
            }
            let owner = lookup_class(&primary_to_from, &row.owner)
                .unwrap_or_else(|| row.owner.clone());
            let descriptor =
                remap_descriptor(&row.descriptor, |name| lookup_class(&primary_to_from, name));
            (owner, descriptor)
        };

        let mut members = |rows: &[MemberRow]| -> HashMap<MemberKey, String> {
            let mut map = HashMap::new();
            for row in rows {
                if row.names[from_index] == row.names[to_index] {
                    continue;
                }
                let (owner, descriptor) = translate(row);
                map.insert(
                    MemberKey::new(owner, row.names[from_index].clone(), descriptor),
                    row.names[to_index].clone(),
                );
            }
            map
        };

        let fields = members(&self.fields);
        let methods = members(&self.methods);

        Ok(MappingSet {
            from: from.to_string(),
            to: to.to_string(),
            classes,
            fields,
            methods,
        })
    }
}

fn fill_names(columns: &[&str]) -> Vec<String> {
    let primary = columns[0];
    columns
        .iter()
        .map(|name| {
            if name.is_empty() {
                primary.to_string()
            } else {
                name.to_string()
            }
        })
        .collect()
}

/// Looks up a class, falling back to the outer class for unmapped inner classes.
fn lookup_class(classes: &HashMap<String, String>, name: &str) -> Option<String> {
    if let Some(mapped) = classes.get(name) {
        return Some(mapped.clone());
    }
    let (outer, inner) = name.rsplit_once('$')?;
    lookup_class(classes, outer).map(|mapped| format!("{mapped}${inner}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Directional mapping with keys in the source namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    from: String,
    to: String,
    classes: HashMap<String, String>,
    fields: HashMap<MemberKey, String>,
    methods: HashMap<MemberKey, String>,
}

impl MappingSet {
    pub fn from_namespace(&self) -> &str {
        &self.from
    }

    pub fn to_namespace(&self) -> &str {
        &self.to
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn map_class(&self, name: &str) -> Option<String> {
        lookup_class(&self.classes, name)
    }

    pub fn map_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.fields
            .get(&MemberKey::new(owner, name, descriptor))
            .map(String::as_str)
    }

    pub fn map_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods
            .get(&MemberKey::new(owner, name, descriptor))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "v1\tofficial\tintermediary\tnamed\n\
        # comment\n\
        CLASS\ta\tnet/x/abc\tnet/x/Foo\n\
        CLASS\tb\tnet/x/def\tnet/x/Bar\n\
        FIELD\ta\tLb;\tc\tfield_1\tbar\n\
        METHOD\ta\t(Lb;)La;\td\tmethod_2\tcopy\n\
        \n";

    #[test]
    fn parses_header_and_rows() {
        let table = MappingTable::parse(SAMPLE.as_bytes()).expect("valid table");
        assert_eq!(table.namespaces(), ["official", "intermediary", "named"]);
        assert_eq!(table.class_count(), 2);
    }

    #[test]
    fn mapping_set_translates_member_keys_into_source_namespace() {
        let table = MappingTable::parse(SAMPLE.as_bytes()).unwrap();
        let set = table.mapping_set("intermediary", "named").unwrap();

        assert_eq!(set.map_class("net/x/abc").as_deref(), Some("net/x/Foo"));
        assert_eq!(set.map_class("net/x/abc$1").as_deref(), Some("net/x/Foo$1"));
        assert_eq!(set.map_class("java/lang/Object"), None);
        assert_eq!(
            set.map_field("net/x/abc", "field_1", "Lnet/x/def;"),
            Some("bar")
        );
        assert_eq!(
            set.map_method("net/x/abc", "method_2", "(Lnet/x/def;)Lnet/x/abc;"),
            Some("copy")
        );
        assert_eq!(set.map_method("a", "d", "(Lb;)La;"), None);
    }

    #[test]
    fn primary_namespace_keys_are_used_verbatim() {
        let table = MappingTable::parse(SAMPLE.as_bytes()).unwrap();
        let set = table.mapping_set("official", "intermediary").unwrap();
        assert_eq!(set.map_class("a").as_deref(), Some("net/x/abc"));
        assert_eq!(set.map_method("a", "d", "(Lb;)La;"), Some("method_2"));
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        let table = MappingTable::parse(SAMPLE.as_bytes()).unwrap();
        let error = table.mapping_set("intermediary", "yarn").unwrap_err();
        assert!(matches!(error, MappingError::UnknownNamespace(ns) if ns == "yarn"));
    }

    #[test]
    fn rejects_bad_header_and_rows() {
        assert!(matches!(
            MappingTable::parse("v2\ta\tb\n".as_bytes()),
            Err(MappingError::UnsupportedHeader(_))
        ));
        assert!(matches!(
            MappingTable::parse("".as_bytes()),
            Err(MappingError::Empty)
        ));
        assert!(matches!(
            MappingTable::parse("v1\ta\tb\nCLASS\tx\n".as_bytes()),
            Err(MappingError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            MappingTable::parse("v1\ta\tb\nPACKAGE\tx\ty\n".as_bytes()),
            Err(MappingError::Syntax { line: 2, .. })
        ));
    }
}
