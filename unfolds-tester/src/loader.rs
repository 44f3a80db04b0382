use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use unfolds_engine::{StoryDocument, ValidationError, parse_documents};

const BUNDLED_LEGACY: &str = include_str!("../../unfolds-web/static/database.json");
const BUNDLED_UNFOLDS: &str = include_str!("../../unfolds-web/static/unfolds-database.json");

#[derive(Debug, Error)]
#[error("{source_name}: {error}")]
pub struct StoryFileError {
    pub source_name: String,
    #[source]
    pub error: ValidationError,
}

/// Story payloads read up front so every scenario iteration sees the same
/// documents.
#[derive(Debug, Clone)]
pub struct StoryFiles {
    payloads: Vec<(String, String)>,
}

impl StoryFiles {
    /// The story files shipped with the web build.
    pub fn bundled() -> Self {
        Self {
            payloads: vec![
                ("database.json".to_string(), BUNDLED_LEGACY.to_string()),
                ("unfolds-database.json".to_string(), BUNDLED_UNFOLDS.to_string()),
            ],
        }
    }

    pub fn read(paths: &[PathBuf]) -> Result<Self> {
        let mut payloads = Vec::with_capacity(paths.len());
        for path in paths {
            let body = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            payloads.push((path.display().to_string(), body));
        }
        Ok(Self { payloads })
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.payloads.iter().map(|(name, _)| name.as_str())
    }
}

impl unfolds_engine::StoryLoader for StoryFiles {
    type Error = StoryFileError;

    fn load_documents(&self) -> Result<Vec<StoryDocument>, Self::Error> {
        let mut docs = Vec::new();
        for (source_name, body) in &self.payloads {
            let parsed = parse_documents(body).map_err(|error| StoryFileError {
                source_name: source_name.clone(),
                error,
            })?;
            docs.extend(parsed);
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unfolds_engine::StoryLoader;

    #[test]
    fn bundled_files_parse() {
        let docs = StoryFiles::bundled().load_documents().expect("bundled stories");
        assert!(docs.len() >= 3);
    }

    #[test]
    fn parse_errors_name_their_file() {
        let files = StoryFiles {
            payloads: vec![("broken.json".to_string(), "{\"nope\": 1}".to_string())],
        };
        let err = files.load_documents().expect_err("unrecognized document");
        assert!(err.to_string().starts_with("broken.json: "));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = StoryFiles::read(&[PathBuf::from("/definitely/not/here.json")])
            .expect_err("missing file");
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }
}
