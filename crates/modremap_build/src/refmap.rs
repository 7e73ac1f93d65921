//! Mixin reference map consistency pass.
//!
//! A reference map ties mixin targets to symbol names:
//!
//! ```json
//! {
//!   "mappings": { "net/mod/MixinA": { "tick": "Lnet/x/abc;method_2(I)V" } },
//!   "data": { "named:intermediary": { "net/mod/MixinA": { ... } } }
//! }
//! ```
//!
//! Class names inside mixin keys and target references are rewritten through
//! the engine's class map. Member names stay as they are.

use crate::archive::{for_each_file, replace_entries, ArchiveError};
use crate::descriptor::remap_descriptor;
use crate::remapper::Remapper;
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RefmapError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Malformed reference map '{entry}' in '{archive}': {source}")]
    Malformed {
        archive: PathBuf,
        entry: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Rewrites the reference maps inside `output`. Returns `false` and leaves
/// the archive untouched when there is nothing to change.
pub fn fix_reference_maps<R: Remapper + ?Sized>(
    remapper: &R,
    output: &Path,
) -> Result<bool, RefmapError> {
    let mut json_entries = HashMap::new();
    for_each_file(output, |name, bytes| {
        if name.ends_with(".json") {
            json_entries.insert(name.to_string(), bytes.to_vec());
        }
        Ok(())
    })?;

    let refmaps = recognize_reference_maps(&json_entries);
    if refmaps.is_empty() {
        return Ok(false);
    }

    let map = |name: &str| remapper.map_class_name(name);
    let mut replacements = HashMap::new();
    for entry in &refmaps {
        let Some(bytes) = json_entries.get(entry) else {
            continue;
        };
        let mut document: Value =
            serde_json::from_slice(bytes).map_err(|source| RefmapError::Malformed {
                archive: output.to_path_buf(),
                entry: entry.clone(),
                source,
            })?;
        if !rewrite_document(&mut document, &map) {
            continue;
        }
        let encoded =
            serde_json::to_vec_pretty(&document).map_err(|source| RefmapError::Malformed {
                archive: output.to_path_buf(),
                entry: entry.clone(),
                source,
            })?;
        debug!(entry = %entry, "rewrote reference map");
        replacements.insert(entry.clone(), encoded);
    }

    if replacements.is_empty() {
        return Ok(false);
    }
    replace_entries(output, &replacements)?;
    Ok(true)
}

/// Entry names of every reference map in the archive: those named by a mixin
/// configuration plus any `*refmap.json` carrying a `mappings` table.
fn recognize_reference_maps(json_entries: &HashMap<String, Vec<u8>>) -> IndexSet<String> {
    let mut names: Vec<&String> = json_entries.keys().collect();
    names.sort();

    let mut refmaps = IndexSet::new();
    for name in names {
        let Ok(document) = serde_json::from_slice::<Value>(&json_entries[name]) else {
            continue;
        };
        if let Some(refmap) = mixin_config_refmap(&document) {
            if json_entries.contains_key(refmap) {
                refmaps.insert(refmap.to_string());
            }
        }
        if name.ends_with("refmap.json") && document.get("mappings").is_some_and(Value::is_object) {
            refmaps.insert(name.clone());
        }
    }
    refmaps
}

fn mixin_config_refmap(document: &Value) -> Option<&str> {
    let object = document.as_object()?;
    let refmap = object.get("refmap")?.as_str()?;
    let has_mixins = ["mixins", "client", "server"]
        .iter()
        .any(|key| object.get(*key).is_some_and(Value::is_array));
    has_mixins.then_some(refmap)
}

fn rewrite_document<F>(document: &mut Value, map: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let mut changed = false;
    if let Some(mappings) = document.get_mut("mappings").and_then(Value::as_object_mut) {
        changed |= rewrite_table(mappings, map);
    }
    if let Some(data) = document.get_mut("data").and_then(Value::as_object_mut) {
        for table in data.values_mut() {
            if let Some(table) = table.as_object_mut() {
                changed |= rewrite_table(table, map);
            }
        }
    }
    changed
}

/// Rewrites `{ mixin class: { reference: target } }`.
fn rewrite_table<F>(table: &mut Map<String, Value>, map: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let mut changed = false;
    for (mixin, mut references) in std::mem::take(table) {
        let key = map(&mixin).unwrap_or_else(|| mixin.clone());
        changed |= key != mixin;

        if let Some(references) = references.as_object_mut() {
            for target in references.values_mut() {
                if let Some(value) = target.as_str() {
                    let mapped = remap_reference(value, map);
                    if mapped != value {
                        *target = Value::String(mapped);
                        changed = true;
                    }
                }
            }
        }
        table.insert(key, references);
    }
    changed
}

/// Rewrites the class names of a mixin target reference. Accepted forms are
/// `Lowner;name(desc)`, `Lowner;name:desc`, `owner`, `name(desc)` and
/// `name:desc`; anything else is returned unchanged.
pub fn remap_reference<F>(value: &str, map: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some((owner, member)) = value.strip_prefix('L').and_then(|rest| rest.split_once(';')) {
        if !owner.is_empty() && !owner.contains(['(', ':', '.']) {
            let owner = map(owner).unwrap_or_else(|| owner.to_string());
            return format!("L{owner};{}", remap_member(member, map));
        }
    }
    if value.contains(['(', ':']) {
        return remap_member(value, map);
    }
    map(value).unwrap_or_else(|| value.to_string())
}

fn remap_member<F>(member: &str, map: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(start) = member.find('(') {
        let (name, descriptor) = member.split_at(start);
        return format!("{name}{}", remap_descriptor(descriptor, map));
    }
    if let Some((name, descriptor)) = member.split_once(':') {
        return format!("{name}:{}", remap_descriptor(descriptor, map));
    }
    member.to_string()
}
