// modremap_pm - Project model: configurations, dependencies and repositories
pub mod config;
mod configuration;
mod coordinates;
mod project;
pub mod repository;

pub use config::{
    MappingsSection, PlatformSection, ProjectConfig, RemapSection, RepositoryEntry,
    CONFIG_FILE_NAME,
};
pub use configuration::{Configuration, ExternalDependency};
pub use coordinates::ArtifactCoordinates;
pub use project::{PlatformArtifacts, Project};
pub use repository::{MavenRepository, RepositorySet};

use std::path::PathBuf;
use thiserror::Error;

/// Default configuration names known to every project.
pub const COMPILE_CONFIGURATION: &str = "compile";
pub const MOD_COMPILE_CONFIGURATION: &str = "modCompile";
pub const MOD_COMPILE_MAPPED_CONFIGURATION: &str = "modCompileMapped";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Unknown configuration: {0}")]
    UnknownConfiguration(String),
    #[error("Invalid dependency notation '{name}': {reason}")]
    InvalidCoordinate { name: String, reason: String },
    #[error("Invalid repository URL '{url}': {reason}")]
    InvalidRepository { url: String, reason: String },
    #[error("Failed to read project configuration '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse project configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
