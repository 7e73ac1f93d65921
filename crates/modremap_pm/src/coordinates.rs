use crate::ProjectError;
use std::fmt;
use std::str::FromStr;

/// Maven style artifact notation: `group:artifact[:version[:classifier]][@extension]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub extension: Option<String>,
}

impl ArtifactCoordinates {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: None,
            classifier: None,
            extension: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Parses a dependency notation string.
    pub fn parse(raw: &str) -> Result<Self, ProjectError> {
        let invalid = |reason: &str| ProjectError::InvalidCoordinate {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("dependency notation is empty"));
        }

        let (body, extension) = match trimmed.split_once('@') {
            Some((body, ext)) if !ext.is_empty() => (body, Some(ext.to_string())),
            Some(_) => return Err(invalid("extension after '@' is empty")),
            None => (trimmed, None),
        };

        let parts: Vec<&str> = body.split(':').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid(
                "expected 'group:artifact[:version[:classifier]]'",
            ));
        }
        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid("notation contains an empty segment"));
        }

        Ok(Self {
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts.get(2).map(|value| value.to_string()),
            classifier: parts.get(3).map(|value| value.to_string()),
            extension,
        })
    }

    /// `group:artifact`, ignoring version and classifier.
    pub fn module_id(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

impl FromStr for ArtifactCoordinates {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        if let Some(extension) = &self.extension {
            write!(f, "@{extension}")?;
        }
        Ok(())
    }
}
