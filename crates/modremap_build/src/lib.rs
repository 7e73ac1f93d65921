// modremap_build - Mod archive remapping between mapping namespaces
pub mod archive;
pub mod classfile;
mod classpath;
mod config;
mod context;
pub mod descriptor;
mod driver;
mod installer;
pub mod mappings;
mod refmap;
mod remapper;

pub use classpath::build_resolution_roots;
pub use config::RemapSettings;
pub use context::{BuildContext, LIFECYCLE_TARGET};
pub use driver::{remap_jar, RemapError, RemapRequest};
pub use installer::{
    apply_installer_metadata, read_installer_metadata, AppliedMetadata, InstallerDocument,
    MetadataError, INSTALLER_METADATA_ENTRY,
};
pub use mappings::{MappingError, MappingSet, MappingTable};
pub use refmap::{fix_reference_maps, RefmapError};
pub use remapper::{ClassRemapper, RemappedClass, Remapper, TransformError};

use archive::is_archive;
use modremap_pm::ProjectError;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to load mappings: {0}")]
    Mappings(#[from] MappingError),
    #[error(transparent)]
    Remap(#[from] RemapError),
    #[error("Failed to rewrite reference maps: {0}")]
    Refmap(#[from] RefmapError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Result of processing one mod archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub output: PathBuf,
    pub classes: usize,
    pub refmaps_rewritten: bool,
    /// `None` when the archive carries no installer metadata.
    pub metadata: Option<AppliedMetadata>,
}

/// Result of [`ModProcessor::remap_configuration`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationOutcome {
    pub remapped: Vec<ProcessOutcome>,
    /// Outputs that were newer than their input and kept as is.
    pub up_to_date: Vec<PathBuf>,
}

/// Remaps mod archives into the target namespace and feeds their installer
/// metadata into the build context.
///
/// The mapping table is loaded on first use and shared by every archive the
/// processor handles.
pub struct ModProcessor {
    settings: RemapSettings,
    mappings: OnceCell<Arc<MappingTable>>,
}

impl ModProcessor {
    pub fn new(settings: RemapSettings) -> Self {
        Self {
            settings,
            mappings: OnceCell::new(),
        }
    }

    /// Uses an already loaded table instead of the context's mappings file.
    pub fn with_mappings(settings: RemapSettings, mappings: Arc<MappingTable>) -> Self {
        Self {
            settings,
            mappings: OnceCell::with_value(mappings),
        }
    }

    pub fn settings(&self) -> &RemapSettings {
        &self.settings
    }

    pub fn mappings<C: BuildContext + ?Sized>(
        &self,
        ctx: &C,
    ) -> Result<Arc<MappingTable>, MappingError> {
        self.mappings
            .get_or_try_init(|| MappingTable::load(ctx.mappings_path()).map(Arc::new))
            .cloned()
    }

    /// Remaps `input` into `output` with a fresh [`ClassRemapper`].
    pub fn handle_mod<C: BuildContext + ?Sized>(
        &self,
        input: &Path,
        output: &Path,
        ctx: &mut C,
    ) -> Result<ProcessOutcome, ProcessError> {
        let mut remapper = ClassRemapper::new();
        self.handle_mod_with(&mut remapper, input, output, ctx)
    }

    /// Remaps `input` into `output` using `remapper`, rewrites the reference
    /// maps of the result and applies the installer metadata of `input`.
    pub fn handle_mod_with<R, C>(
        &self,
        remapper: &mut R,
        input: &Path,
        output: &Path,
        ctx: &mut C,
    ) -> Result<ProcessOutcome, ProcessError>
    where
        R: Remapper + ?Sized,
        C: BuildContext + ?Sized,
    {
        let mappings = self.mappings(ctx)?;
        let siblings = ctx.configuration_files(&self.settings.mod_configuration)?;
        let roots = build_resolution_roots(
            input,
            &siblings,
            ctx.platform_artifact(),
            ctx.platform_dependencies(),
        );

        let file_name = display_name(input);
        let (from, to) = (self.settings.from.as_str(), self.settings.to.as_str());
        ctx.lifecycle(&format!(":remapping {file_name} (ClassRemapper, {from} -> {to})"));

        let request = RemapRequest {
            input,
            output,
            mappings: &mappings,
            roots: &roots,
            from,
            to,
        };
        let classes = remap_jar(remapper, &request)?;

        let refmaps_rewritten = match fix_reference_maps(&*remapper, output) {
            Ok(rewritten) => rewritten,
            Err(error) => {
                remapper.release();
                return Err(error.into());
            }
        };
        if refmaps_rewritten {
            ctx.lifecycle(&format!(":remapping {file_name} (Mixin reference maps)"));
            remapper.release();
        }

        let metadata = self.apply_metadata(input, ctx)?;

        Ok(ProcessOutcome {
            output: output.to_path_buf(),
            classes,
            refmaps_rewritten,
            metadata,
        })
    }

    /// Remaps every archive of the mod configuration into `output_dir` as
    /// `<stem>-<to>.jar` and registers the results on the remapped
    /// configuration. Outputs newer than their input are reused.
    pub fn remap_configuration<C: BuildContext + ?Sized>(
        &self,
        ctx: &mut C,
        output_dir: &Path,
    ) -> Result<ConfigurationOutcome, ProcessError> {
        let inputs = ctx.configuration_files(&self.settings.mod_configuration)?;
        let mut outcome = ConfigurationOutcome::default();

        for input in inputs {
            if !is_archive(&input) {
                warn!(path = %input.display(), "skipping non-archive mod file");
                continue;
            }

            let output = output_dir.join(remapped_file_name(&input, &self.settings.to));
            if is_up_to_date(&input, &output) {
                debug!(output = %output.display(), "remapped archive is up to date");
                self.apply_metadata(&input, ctx)?;
                ctx.add_file(&self.settings.remapped_configuration, &output)?;
                outcome.up_to_date.push(output);
                continue;
            }

            let processed = self.handle_mod(&input, &output, ctx)?;
            ctx.add_file(&self.settings.remapped_configuration, &output)?;
            outcome.remapped.push(processed);
        }

        Ok(outcome)
    }

    fn apply_metadata<C: BuildContext + ?Sized>(
        &self,
        input: &Path,
        ctx: &mut C,
    ) -> Result<Option<AppliedMetadata>, ProcessError> {
        let Some(document) = read_installer_metadata(input) else {
            return Ok(None);
        };
        let applied =
            apply_installer_metadata(&document, ctx, &self.settings.compile_configuration)?;
        Ok(Some(applied))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `mods/foo-1.0.jar` remapped to `named` becomes `foo-1.0-named.jar`.
pub fn remapped_file_name(input: &Path, to: &str) -> String {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mod".to_string());
    format!("{stem}-{to}.jar")
}

fn is_up_to_date(input: &Path, output: &Path) -> bool {
    let (Ok(input_meta), Ok(output_meta)) = (fs::metadata(input), fs::metadata(output)) else {
        return false;
    };
    if output_meta.len() == 0 {
        return false;
    }
    match (input_meta.modified(), output_meta.modified()) {
        (Ok(input_time), Ok(output_time)) => output_time >= input_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests;
