//! `modremap.toml` project configuration.
//!
//! Every section is optional; missing keys fall back to the defaults used by
//! the remapping pipeline (`intermediary` → `named`, mods taken from
//! `modCompile`, installer libraries declared on `compile`).

use crate::{
    COMPILE_CONFIGURATION, MOD_COMPILE_CONFIGURATION, MOD_COMPILE_MAPPED_CONFIGURATION,
    ProjectError,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "modremap.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub remap: RemapSection,
    pub mappings: MappingsSection,
    pub platform: PlatformSection,
    pub repositories: Vec<RepositoryEntry>,
    /// Files pre-resolved into named configurations.
    pub configurations: IndexMap<String, Vec<PathBuf>>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let text = fs::read_to_string(path).map_err(|source| ProjectError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProjectError> {
        Ok(toml::from_str(text)?)
    }
}

/// Namespace direction and the configurations the pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RemapSection {
    pub from: String,
    pub to: String,
    pub mod_configuration: String,
    pub compile_configuration: String,
    pub remapped_configuration: String,
}

impl Default for RemapSection {
    fn default() -> Self {
        Self {
            from: "intermediary".to_string(),
            to: "named".to_string(),
            mod_configuration: MOD_COMPILE_CONFIGURATION.to_string(),
            compile_configuration: COMPILE_CONFIGURATION.to_string(),
            remapped_configuration: MOD_COMPILE_MAPPED_CONFIGURATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingsSection {
    pub path: PathBuf,
}

impl Default for MappingsSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mappings/mappings.tiny"),
        }
    }
}

/// The platform artifact (already in the source namespace) and its libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSection {
    pub artifact: PathBuf,
    pub dependencies: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}
