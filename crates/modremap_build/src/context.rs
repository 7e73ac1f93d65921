//! Build context consumed by the pipeline.

use modremap_pm::{ExternalDependency, Project, ProjectError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Tracing target used for progress notices.
pub const LIFECYCLE_TARGET: &str = "modremap::lifecycle";

/// The mutable build state the pipeline reads inputs from and declares
/// dependencies, repositories and outputs into.
pub trait BuildContext {
    /// Files currently resolved for the named configuration.
    fn configuration_files(&self, name: &str) -> Result<Vec<PathBuf>, ProjectError>;

    fn add_file(&mut self, configuration: &str, path: &Path) -> Result<bool, ProjectError>;

    fn add_dependency(
        &mut self,
        configuration: &str,
        dependency: ExternalDependency,
    ) -> Result<bool, ProjectError>;

    /// Whether a repository with an equivalent URL is already known.
    fn has_repository(&self, url: &str) -> bool;

    fn add_repository(&mut self, url: &str) -> Result<bool, ProjectError>;

    fn platform_artifact(&self) -> &Path;

    fn platform_dependencies(&self) -> &[PathBuf];

    fn mappings_path(&self) -> &Path;

    /// Emits a human readable progress notice.
    fn lifecycle(&self, message: &str) {
        info!(target: LIFECYCLE_TARGET, "{message}");
    }
}

impl BuildContext for Project {
    fn configuration_files(&self, name: &str) -> Result<Vec<PathBuf>, ProjectError> {
        Ok(self.configuration(name)?.files().to_vec())
    }

    fn add_file(&mut self, configuration: &str, path: &Path) -> Result<bool, ProjectError> {
        Ok(self.configuration_mut(configuration)?.add_file(path))
    }

    fn add_dependency(
        &mut self,
        configuration: &str,
        dependency: ExternalDependency,
    ) -> Result<bool, ProjectError> {
        Project::add_dependency(self, configuration, dependency)
    }

    fn has_repository(&self, url: &str) -> bool {
        self.repositories().contains_url(url)
    }

    fn add_repository(&mut self, url: &str) -> Result<bool, ProjectError> {
        Project::add_repository(self, url)
    }

    fn platform_artifact(&self) -> &Path {
        &self.platform().artifact
    }

    fn platform_dependencies(&self) -> &[PathBuf] {
        &self.platform().dependencies
    }

    fn mappings_path(&self) -> &Path {
        Project::mappings_path(self)
    }
}
