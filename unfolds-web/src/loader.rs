//! Bundled story files served next to the app.

use unfolds_engine::{StoryDocument, StoryLoader, ValidationError, parse_documents};

use crate::dom;

/// Legacy quest database shipped with the site.
pub const LEGACY_DATABASE_URL: &str = "./database.json";
/// Newer-schema stories shipped with the site.
pub const UNFOLDS_DATABASE_URL: &str = "./unfolds-database.json";

#[derive(Debug, thiserror::Error)]
pub enum WebLoadError {
    #[error("could not parse {source_name}: {error}")]
    Parse {
        source_name: String,
        error: ValidationError,
    },
}

/// Payloads already fetched from the network, parsed on demand.
#[derive(Debug, Clone, Default)]
pub struct FetchedStories {
    payloads: Vec<(String, String)>,
}

impl FetchedStories {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_payload(mut self, source_name: impl Into<String>, json: impl Into<String>) -> Self {
        self.payloads.push((source_name.into(), json.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Fetch every bundled file. Missing files are logged and skipped.
    #[allow(clippy::future_not_send)]
    pub async fn fetch_bundled() -> Self {
        let mut fetched = Self::new();
        for url in [LEGACY_DATABASE_URL, UNFOLDS_DATABASE_URL] {
            match dom::fetch_text(url).await {
                Ok(text) => fetched = fetched.with_payload(url, text),
                Err(err) => {
                    log::warn!("no bundled stories at {url}: {}", dom::js_error_message(&err));
                }
            }
        }
        fetched
    }
}

impl StoryLoader for FetchedStories {
    type Error = WebLoadError;

    fn load_documents(&self) -> Result<Vec<StoryDocument>, Self::Error> {
        let mut docs = Vec::new();
        for (source_name, json) in &self.payloads {
            let parsed = parse_documents(json).map_err(|error| WebLoadError::Parse {
                source_name: source_name.clone(),
                error,
            })?;
            docs.extend(parsed);
        }
        Ok(docs)
    }
}
