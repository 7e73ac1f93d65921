use crate::ArtifactCoordinates;
use std::fmt;
use std::path::{Path, PathBuf};

/// A declared dependency on an external module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalDependency {
    pub coordinates: ArtifactCoordinates,
    /// Whether the dependency may pull its own dependency graph into the build.
    pub transitive: bool,
}

impl ExternalDependency {
    pub fn new(coordinates: ArtifactCoordinates) -> Self {
        Self {
            coordinates,
            transitive: true,
        }
    }

    pub fn non_transitive(mut self) -> Self {
        self.transitive = false;
        self
    }
}

impl fmt::Display for ExternalDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coordinates)?;
        if !self.transitive {
            write!(f, " (non-transitive)")?;
        }
        Ok(())
    }
}

/// Named bucket of resolved files and declared dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    name: String,
    files: Vec<PathBuf>,
    dependencies: Vec<ExternalDependency>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn dependencies(&self) -> &[ExternalDependency] {
        &self.dependencies
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.iter().any(|file| file == path)
    }

    /// Adds a file unless it is already part of the set.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.contains_file(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    /// Declares a dependency; identical declarations are kept once.
    pub fn add_dependency(&mut self, dependency: ExternalDependency) -> bool {
        if self.dependencies.contains(&dependency) {
            return false;
        }
        self.dependencies.push(dependency);
        true
    }
}
