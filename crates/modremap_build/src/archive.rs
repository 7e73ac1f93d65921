//! Zip archive helpers shared by the remapping pipeline.
//!
//! Class entries are recognised by their `.class` suffix; every other entry
//! (directories included) is a resource. Resources are copied with
//! [`ZipWriter::raw_copy_file`] so their compressed payload is never
//! re-encoded.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error while accessing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read ZIP archive '{path}': {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("Output archive '{0}' is already closed")]
    Closed(PathBuf),
}

impl ArchiveError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(path: &Path, source: ZipError) -> Self {
        Self::Zip {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub fn is_class_entry(name: &str) -> bool {
    !name.ends_with('/') && name.ends_with(".class")
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ["jar", "zip"].iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

pub fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::io(path, source))?;
    ZipArchive::new(BufReader::new(file)).map_err(|source| ArchiveError::zip(path, source))
}

/// Reads a single entry, returning `None` when the archive does not contain it.
pub fn read_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let mut archive = open_archive(path)?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(source) => return Err(ArchiveError::zip(path, source)),
    };
    let mut buffer = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buffer)
        .map_err(|source| ArchiveError::io(path, source))?;
    Ok(Some(buffer))
}

/// Streams every file entry through `visit` as `(name, bytes)`.
pub fn for_each_file<F>(path: &Path, mut visit: F) -> Result<(), ArchiveError>
where
    F: FnMut(&str, &[u8]) -> Result<(), ArchiveError>,
{
    let mut archive = open_archive(path)?;
    let mut buffer = Vec::new();
    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|source| ArchiveError::zip(path, source))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        buffer.clear();
        entry
            .read_to_end(&mut buffer)
            .map_err(|source| ArchiveError::io(path, source))?;
        visit(&name, &buffer)?;
    }
    Ok(())
}

/// Names of all entries, in archive order.
pub fn entry_names(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut archive = open_archive(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let entry = archive
            .by_index_raw(idx)
            .map_err(|source| ArchiveError::zip(path, source))?;
        names.push(entry.name().to_string());
    }
    Ok(names)
}

/// Scoped writer for the output archive.
///
/// The archive is finalized by [`OutputSink::close`]; if the sink is dropped
/// first (an error path) the central directory is still written so the file
/// handle is released.
pub struct OutputSink {
    path: PathBuf,
    writer: Option<ZipWriter<BufWriter<File>>>,
    written: HashSet<String>,
}

impl OutputSink {
    pub fn create(path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ArchiveError::io(parent, source))?;
            }
        }
        let file = File::create(path).map_err(|source| ArchiveError::io(path, source))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(ZipWriter::new(BufWriter::new(file))),
            written: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.written.contains(name)
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<BufWriter<File>>, ArchiveError> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| ArchiveError::Closed(path.clone()))
    }

    /// Copies every non-class entry of `input` unchanged. Returns the number
    /// of entries copied.
    pub fn add_non_class_files(&mut self, input: &Path) -> Result<usize, ArchiveError> {
        let mut archive = open_archive(input)?;
        let mut copied = 0;
        for idx in 0..archive.len() {
            let entry = archive
                .by_index_raw(idx)
                .map_err(|source| ArchiveError::zip(input, source))?;
            let name = entry.name().to_string();
            if is_class_entry(&name) {
                continue;
            }
            if !self.written.insert(name.clone()) {
                warn!(entry = %name, archive = %input.display(), "duplicate resource entry skipped");
                continue;
            }
            let output = self.path.clone();
            self.writer()?
                .raw_copy_file(entry)
                .map_err(|source| ArchiveError::zip(&output, source))?;
            copied += 1;
        }
        debug!(copied, archive = %input.display(), "copied resource entries");
        Ok(copied)
    }

    /// Writes a new deflated entry. A second entry with the same name is ignored.
    pub fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        if !self.written.insert(name.to_string()) {
            warn!(entry = %name, "duplicate output entry skipped");
            return Ok(());
        }
        let path = self.path.clone();
        let writer = self.writer()?;
        writer
            .start_file(name, deflated())
            .map_err(|source| ArchiveError::zip(&path, source))?;
        writer
            .write_all(bytes)
            .map_err(|source| ArchiveError::io(&path, source))
    }

    /// Finalizes the archive and flushes it to disk.
    pub fn close(mut self) -> Result<(), ArchiveError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let mut inner = writer
            .finish()
            .map_err(|source| ArchiveError::zip(&self.path, source))?;
        inner
            .flush()
            .map_err(|source| ArchiveError::io(&self.path, source))
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if let Err(error) = self.finish() {
            warn!(error = %error, "failed to finalize output archive");
        }
    }
}

/// Replaces the content of the named entries, keeping every other entry
/// byte-for-byte. The archive is rebuilt in a temporary file next to `path`
/// and renamed over it once complete.
pub fn replace_entries(
    path: &Path,
    replacements: &HashMap<String, Vec<u8>>,
) -> Result<(), ArchiveError> {
    if replacements.is_empty() {
        return Ok(());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = tempfile::NamedTempFile::new_in(&dir).map_err(|source| ArchiveError::io(&dir, source))?;
    let temp_path = temp.path().to_path_buf();

    {
        let file = temp
            .as_file()
            .try_clone()
            .map_err(|source| ArchiveError::io(&temp_path, source))?;
        let mut writer = ZipWriter::new(BufWriter::new(file));
        let mut archive = open_archive(path)?;

        for idx in 0..archive.len() {
            let entry = archive
                .by_index_raw(idx)
                .map_err(|source| ArchiveError::zip(path, source))?;
            let name = entry.name().to_string();
            match replacements.get(&name) {
                Some(bytes) => {
                    drop(entry);
                    writer
                        .start_file(name.as_str(), deflated())
                        .map_err(|source| ArchiveError::zip(&temp_path, source))?;
                    writer
                        .write_all(bytes)
                        .map_err(|source| ArchiveError::io(&temp_path, source))?;
                }
                None => writer
                    .raw_copy_file(entry)
                    .map_err(|source| ArchiveError::zip(&temp_path, source))?,
            }
        }

        let mut inner = writer
            .finish()
            .map_err(|source| ArchiveError::zip(&temp_path, source))?;
        inner
            .flush()
            .map_err(|source| ArchiveError::io(&temp_path, source))?;
    }

    temp.persist(path)
        .map_err(|error| ArchiveError::io(path, error.error))?;
    Ok(())
}

fn deflated() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}
