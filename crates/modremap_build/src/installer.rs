//! Installer metadata embedded in mod archives.
//!
//! ```json
//! { "libraries": { "common": [ { "name": "g:a:1.0", "url": "https://maven.example/" } ] } }
//! ```
//!
//! Reading is best effort: a missing or unreadable document is `None`.
//! Applying is strict: the whole document is validated before the build
//! context is touched.

use crate::archive::read_entry;
use crate::context::BuildContext;
use modremap_pm::{ArtifactCoordinates, ExternalDependency, ProjectError};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Entry name of the installer metadata document.
pub const INSTALLER_METADATA_ENTRY: &str = "fabric-installer.json";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Malformed installer metadata: {0}")]
    Malformed(String),
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Parsed but not yet validated installer metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallerDocument(Value);

impl InstallerDocument {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[derive(Debug, Deserialize)]
struct InstallerMetadata {
    libraries: Libraries,
}

#[derive(Debug, Deserialize)]
struct Libraries {
    common: Vec<LibraryRecord>,
}

#[derive(Debug, Deserialize)]
struct LibraryRecord {
    name: String,
    #[serde(default)]
    url: Option<String>,
}

/// Counts of what [`apply_installer_metadata`] added to the build context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedMetadata {
    pub dependencies: usize,
    pub repositories: usize,
}

/// Reads `fabric-installer.json` from `archive`. Failures are logged and
/// reported as `None`.
pub fn read_installer_metadata(archive: &Path) -> Option<InstallerDocument> {
    let bytes = match read_entry(archive, INSTALLER_METADATA_ENTRY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(error) => {
            warn!(archive = %archive.display(), error = %error, "failed to read installer metadata");
            return None;
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => {
            warn!(archive = %archive.display(), error = %error, "installer metadata is not UTF-8");
            return None;
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Some(InstallerDocument(value)),
        Err(error) => {
            warn!(archive = %archive.display(), error = %error, "failed to parse installer metadata");
            None
        }
    }
}

/// Declares every library of `document` as a non-transitive dependency of
/// `configuration` and registers the repositories they come from.
pub fn apply_installer_metadata<C: BuildContext + ?Sized>(
    document: &InstallerDocument,
    ctx: &mut C,
    configuration: &str,
) -> Result<AppliedMetadata, MetadataError> {
    let metadata = InstallerMetadata::deserialize(&document.0)
        .map_err(|error| MetadataError::Malformed(error.to_string()))?;

    let mut libraries = Vec::with_capacity(metadata.libraries.common.len());
    for record in &metadata.libraries.common {
        let coordinates = ArtifactCoordinates::parse(&record.name).map_err(|error| {
            MetadataError::Malformed(format!("library '{}': {error}", record.name))
        })?;
        let url = match record.url.as_deref().map(str::trim) {
            Some(url) => {
                Url::parse(url).map_err(|error| {
                    MetadataError::Malformed(format!(
                        "library '{}': invalid repository url '{url}': {error}",
                        record.name
                    ))
                })?;
                Some(url)
            }
            None => None,
        };
        libraries.push((coordinates, url));
    }

    let mut applied = AppliedMetadata::default();
    for (coordinates, url) in libraries {
        let dependency = ExternalDependency::new(coordinates).non_transitive();
        if ctx.add_dependency(configuration, dependency)? {
            applied.dependencies += 1;
        }
        if let Some(url) = url {
            if ctx.has_repository(url) {
                debug!(url, "repository already registered");
            } else if ctx.add_repository(url)? {
                applied.repositories += 1;
            }
        }
    }

    debug!(
        configuration,
        dependencies = applied.dependencies,
        repositories = applied.repositories,
        "applied installer metadata"
    );
    Ok(applied)
}
