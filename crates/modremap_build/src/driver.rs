//! Drives one archive through the remapping engine.

use crate::archive::OutputSink;
use crate::mappings::MappingTable;
use crate::remapper::{Remapper, TransformError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RemapError {
    #[error("Failed to remove stale output '{path}': {source}")]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remap archive to {to}")]
    Failed {
        to: String,
        #[source]
        source: TransformError,
    },
    #[error("remapping to {to} did not produce '{path}'")]
    OutputMissing { to: String, path: PathBuf },
}

/// Everything needed to remap one archive.
#[derive(Debug, Clone, Copy)]
pub struct RemapRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub mappings: &'a MappingTable,
    pub roots: &'a [PathBuf],
    pub from: &'a str,
    pub to: &'a str,
}

/// Releases the engine when dropped.
pub(crate) struct ReleaseGuard<'r, R: Remapper + ?Sized> {
    remapper: &'r mut R,
}

impl<'r, R: Remapper + ?Sized> ReleaseGuard<'r, R> {
    pub(crate) fn new(remapper: &'r mut R) -> Self {
        Self { remapper }
    }

    pub(crate) fn remapper(&mut self) -> &mut R {
        &mut *self.remapper
    }
}

impl<R: Remapper + ?Sized> Drop for ReleaseGuard<'_, R> {
    fn drop(&mut self) {
        self.remapper.release();
    }
}

/// Writes `request.output` from `request.input` with every class renamed
/// from `request.from` to `request.to`. Returns the number of classes
/// written.
///
/// The engine is released before this returns, whatever the outcome. On
/// failure the partially written output is removed.
pub fn remap_jar<R: Remapper + ?Sized>(
    remapper: &mut R,
    request: &RemapRequest<'_>,
) -> Result<usize, RemapError> {
    remove_stale_output(request.output)?;

    let result = {
        let mut guard = ReleaseGuard::new(remapper);
        transform(guard.remapper(), request)
    };

    let classes = match result {
        Ok(classes) => classes,
        Err(source) => {
            discard_partial_output(request.output);
            return Err(RemapError::Failed {
                to: request.to.to_string(),
                source,
            });
        }
    };

    match fs::metadata(request.output) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {}
        _ => {
            return Err(RemapError::OutputMissing {
                to: request.to.to_string(),
                path: request.output.to_path_buf(),
            });
        }
    }

    debug!(
        input = %request.input.display(),
        output = %request.output.display(),
        classes,
        "remapped archive"
    );
    Ok(classes)
}

fn transform<R: Remapper + ?Sized>(
    remapper: &mut R,
    request: &RemapRequest<'_>,
) -> Result<usize, TransformError> {
    remapper.configure(request.mappings, request.from, request.to)?;

    let mut sink = OutputSink::create(request.output)?;
    let resources = sink.add_non_class_files(request.input)?;

    for root in request.roots {
        remapper.register_root(root)?;
    }

    let classes = remapper.apply(request.input, &mut sink)?;
    sink.close()?;

    debug!(resources, classes, roots = request.roots.len(), "wrote output archive");
    Ok(classes)
}

fn remove_stale_output(path: &Path) -> Result<(), RemapError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RemapError::StaleOutput {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn discard_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path.display(), error = %error, "failed to remove partial output"),
    }
}
