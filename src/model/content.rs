//! Candidate content as yielded by a platform adapter.

use serde::{Deserialize, Serialize};

/// Where a candidate item was found.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The home / recommendation feed.
    #[default]
    Discovery,
    /// "Up next" / related items of something already watched.
    Related,
    /// Short-form feed.
    Shorts,
    /// Direct keyword search.
    Search,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Discovery => "discovery",
            SourceKind::Related => "related",
            SourceKind::Shorts => "shorts",
            SourceKind::Search => "search",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discovery" | "home" | "feed" => Ok(SourceKind::Discovery),
            "related" => Ok(SourceKind::Related),
            "shorts" => Ok(SourceKind::Shorts),
            "search" => Ok(SourceKind::Search),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// One piece of content offered by a platform.
///
/// Created fresh on every discovery poll; the engine never persists these
/// on their own, only as part of a [`SessionRecord`](super::SessionRecord).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Platform-native identifier. De-duplication is keyed on this.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    /// Length in seconds, if the listing exposed it.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: SourceKind,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: String::new(),
            url: String::new(),
            duration_secs: None,
            tags: Vec::new(),
            source: SourceKind::Discovery,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }
}
