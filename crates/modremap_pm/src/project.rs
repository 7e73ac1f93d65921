use crate::config::ProjectConfig;
use crate::{
    COMPILE_CONFIGURATION, Configuration, ExternalDependency, MOD_COMPILE_CONFIGURATION,
    MOD_COMPILE_MAPPED_CONFIGURATION, MavenRepository, ProjectError, RepositorySet,
};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Platform artifact already in the source namespace plus its library closure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformArtifacts {
    pub artifact: PathBuf,
    pub dependencies: Vec<PathBuf>,
}

/// In-memory project state: configurations, repositories and the locations
/// the remapping pipeline reads from.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    configurations: IndexMap<String, Configuration>,
    repositories: RepositorySet,
    platform: PlatformArtifacts,
    mappings_path: PathBuf,
}

impl Project {
    /// Creates a project with the default configurations and no repositories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut configurations = IndexMap::new();
        for name in [
            COMPILE_CONFIGURATION,
            MOD_COMPILE_CONFIGURATION,
            MOD_COMPILE_MAPPED_CONFIGURATION,
        ] {
            configurations.insert(name.to_string(), Configuration::new(name));
        }

        Self {
            root: root.into(),
            configurations,
            repositories: RepositorySet::new(),
            platform: PlatformArtifacts::default(),
            mappings_path: PathBuf::new(),
        }
    }

    /// Builds a project from `modremap.toml`, resolving relative paths against `root`.
    pub fn from_config(root: impl Into<PathBuf>, config: &ProjectConfig) -> Self {
        let mut project = Self::new(root);

        project.mappings_path = project.resolve(&config.mappings.path);
        project.platform = PlatformArtifacts {
            artifact: project.resolve(&config.platform.artifact),
            dependencies: config
                .platform
                .dependencies
                .iter()
                .map(|path| project.resolve(path))
                .collect(),
        };

        for entry in &config.repositories {
            let added = match &entry.name {
                Some(name) => project
                    .repositories
                    .insert(MavenRepository::new(name.clone(), entry.url.trim())),
                None => project.repositories.add_url(&entry.url),
            };
            if !added {
                debug!(url = %entry.url, "skipping duplicate repository");
            }
        }

        for (name, files) in &config.configurations {
            let resolved: Vec<PathBuf> = files.iter().map(|path| project.resolve(path)).collect();
            let configuration = project.configuration_or_create(name);
            for file in resolved {
                configuration.add_file(file);
            }
        }

        project
    }

    /// Loads `<root>/modremap.toml`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let root = root.into();
        let config = ProjectConfig::load(&root.join(crate::CONFIG_FILE_NAME))?;
        Ok(Self::from_config(root, &config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn with_platform(mut self, platform: PlatformArtifacts) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_mappings(mut self, path: impl Into<PathBuf>) -> Self {
        self.mappings_path = path.into();
        self
    }

    pub fn platform(&self) -> &PlatformArtifacts {
        &self.platform
    }

    pub fn mappings_path(&self) -> &Path {
        &self.mappings_path
    }

    pub fn repositories(&self) -> &RepositorySet {
        &self.repositories
    }

    pub fn repositories_mut(&mut self) -> &mut RepositorySet {
        &mut self.repositories
    }

    pub fn configuration(&self, name: &str) -> Result<&Configuration, ProjectError> {
        self.configurations
            .get(name)
            .ok_or_else(|| ProjectError::UnknownConfiguration(name.to_string()))
    }

    pub fn configuration_mut(&mut self, name: &str) -> Result<&mut Configuration, ProjectError> {
        self.configurations
            .get_mut(name)
            .ok_or_else(|| ProjectError::UnknownConfiguration(name.to_string()))
    }

    pub fn configuration_or_create(&mut self, name: &str) -> &mut Configuration {
        self.configurations
            .entry(name.to_string())
            .or_insert_with(|| Configuration::new(name))
    }

    pub fn configurations(&self) -> impl Iterator<Item = &Configuration> {
        self.configurations.values()
    }

    /// Declares `dependency` on the named configuration.
    pub fn add_dependency(
        &mut self,
        configuration: &str,
        dependency: ExternalDependency,
    ) -> Result<bool, ProjectError> {
        let added = self.configuration_mut(configuration)?.add_dependency(dependency.clone());
        if added {
            debug!(configuration, dependency = %dependency, "declared dependency");
        }
        Ok(added)
    }

    /// Registers a Maven repository unless an equivalent URL is known.
    pub fn add_repository(&mut self, url: &str) -> Result<bool, ProjectError> {
        let trimmed = url.trim();
        if let Err(error) = Url::parse(trimmed) {
            return Err(ProjectError::InvalidRepository {
                url: url.to_string(),
                reason: error.to_string(),
            });
        }
        let added = self.repositories.add_url(trimmed);
        if added {
            debug!(url = trimmed, "registered repository");
        }
        Ok(added)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() || path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
