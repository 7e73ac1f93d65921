use modremap_pm::{
    COMPILE_CONFIGURATION, MOD_COMPILE_CONFIGURATION, MOD_COMPILE_MAPPED_CONFIGURATION,
    ProjectConfig,
};

/// Settings for [`crate::ModProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapSettings {
    /// Namespace the input archives are written in.
    pub from: String,
    /// Namespace to produce.
    pub to: String,
    /// Configuration holding the archives to remap; its files are also the
    /// sibling resolution roots.
    pub mod_configuration: String,
    /// Configuration receiving libraries declared by installer metadata.
    pub compile_configuration: String,
    /// Configuration receiving remapped outputs.
    pub remapped_configuration: String,
}

impl Default for RemapSettings {
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

impl RemapSettings {
    pub fn from_config(config: &ProjectConfig) -> Self {
        let remap = &config.remap;
        Self {
            from: remap.from.clone(),
            to: remap.to.clone(),
            mod_configuration: remap.mod_configuration.clone(),
            compile_configuration: remap.compile_configuration.clone(),
            remapped_configuration: remap.remapped_configuration.clone(),
        }
    }

    pub fn with_namespaces(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = from.into();
        self.to = to.into();
        self
    }
}
