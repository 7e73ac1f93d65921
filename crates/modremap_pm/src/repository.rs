//! Remote Maven repositories known to a project.
//!
//! Repositories are identified by their URL. Two URLs name the same
//! repository when their normalized forms are equal ignoring ASCII case, so
//! `HTTP://Repo.Example/maven` and `http://repo.example/maven/` collapse into
//! one entry.

use serde::{Deserialize, Serialize};
use url::Url;

/// A remote Maven repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MavenRepository {
    pub name: String,
    pub url: String,
}

impl MavenRepository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Normalized URL used for identity comparisons.
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.key().eq_ignore_ascii_case(&normalize_url(url))
    }
}

/// Insertion-ordered repository registry without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySet {
    entries: Vec<MavenRepository>,
}

impl RepositorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MavenRepository> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.entries.iter().any(|repo| repo.matches_url(url))
    }

    /// Adds the repository unless an equivalent URL is already registered.
    pub fn insert(&mut self, repository: MavenRepository) -> bool {
        if self.contains_url(&repository.url) {
            return false;
        }
        self.entries.push(repository);
        true
    }

    /// Registers a repository for `url` under the first free name of
    /// `maven`, `maven2`, `maven3`, ...
    pub fn add_url(&mut self, url: &str) -> bool {
        if self.contains_url(url) {
            return false;
        }
        let name = std::iter::once("maven".to_string())
            .chain((2..).map(|n| format!("maven{n}")))
            .find(|candidate| !self.entries.iter().any(|repo| repo.name == *candidate))
            .unwrap_or_default();
        self.insert(MavenRepository::new(name, url.trim()))
    }
}

/// Parses and re-serializes the URL, dropping a trailing slash. Strings that
/// are not valid URLs are compared as trimmed text.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let normalized = match Url::parse(trimmed) {
        Ok(url) => url.to_string(),
        Err(_) => trimmed.to_string(),
    };
    normalized.trim_end_matches('/').to_string()
}
