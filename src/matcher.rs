//! Keyword match evaluation.
//!
//! Matching is plain substring containment over title, author and
//! (optionally) tags. There is no word-boundary tokenization: "cat" matches
//! "concatenate". Callers that need stricter matching should pick longer
//! keywords.

use serde::{Deserialize, Serialize};

use crate::model::ContentItem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// At least one keyword must be present.
    #[default]
    Any,
    /// Every keyword must be present.
    All,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(MatchMode::Any),
            "all" => Ok(MatchMode::All),
            other => Err(format!("unknown match mode: {other}")),
        }
    }
}

/// Pure predicate deciding which configured keywords an item matches.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    /// Keywords as compared against the search text (case-folded unless
    /// `case_sensitive`). Same order as `keywords`.
    needles: Vec<String>,
    mode: MatchMode,
    case_sensitive: bool,
    include_tags: bool,
}

impl KeywordMatcher {
    pub fn new(keywords: Vec<String>, mode: MatchMode, case_sensitive: bool) -> Self {
        let needles = keywords
            .iter()
            .map(|k| fold(k, case_sensitive))
            .collect();
        Self {
            keywords,
            needles,
            mode,
            case_sensitive,
            include_tags: true,
        }
    }

    /// Whether tags take part in the search text.
    pub fn include_tags(mut self, include: bool) -> Self {
        self.include_tags = include;
        self
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// The text keywords are searched in.
    pub fn search_text(&self, item: &ContentItem) -> String {
        let mut text = format!("{} {}", item.title, item.author);
        if self.include_tags && !item.tags.is_empty() {
            text.push(' ');
            text.push_str(&item.tags.join(" "));
        }
        fold(&text, self.case_sensitive)
    }

    /// Keywords matched by `item`. Empty means no match.
    ///
    /// In [`MatchMode::All`] a successful match returns the complete keyword
    /// list and a partial match returns nothing.
    pub fn matches(&self, item: &ContentItem) -> Vec<String> {
        let text = self.search_text(item);
        let present = |needle: &String| !needle.is_empty() && text.contains(needle.as_str());

        match self.mode {
            MatchMode::Any => self
                .keywords
                .iter()
                .zip(&self.needles)
                .filter(|&(_, needle)| present(needle))
                .map(|(keyword, _)| keyword.clone())
                .collect(),
            MatchMode::All => {
                if !self.needles.is_empty() && self.needles.iter().all(present) {
                    self.keywords.clone()
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Whether `item` matches at all.
    pub fn is_match(&self, item: &ContentItem) -> bool {
        !self.matches(item).is_empty()
    }
}

fn fold(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}
