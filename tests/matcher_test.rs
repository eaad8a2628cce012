//! Keyword matching over titles, authors and tags.

use feedshaper::matcher::{KeywordMatcher, MatchMode};
use feedshaper::model::ContentItem;

fn matcher(keywords: &[&str], mode: MatchMode) -> KeywordMatcher {
    KeywordMatcher::new(keywords.iter().map(|k| k.to_string()).collect(), mode, false)
}

#[test]
fn any_mode_returns_present_keywords() {
    let m = matcher(&["cat", "dog"], MatchMode::Any);
    let item = ContentItem::new("1", "Cat Rescue");
    assert_eq!(m.matches(&item), vec!["cat"]);
    assert!(m.is_match(&item));
}

#[test]
fn all_mode_requires_every_keyword() {
    let m = matcher(&["cat", "dog"], MatchMode::All);
    assert!(m.matches(&ContentItem::new("1", "Cat Rescue")).is_empty());
    assert_eq!(
        m.matches(&ContentItem::new("2", "Dog meets cat")),
        vec!["cat", "dog"]
    );
}

#[test]
fn matches_keep_configured_order() {
    let m = matcher(&["dog", "cat"], MatchMode::Any);
    let item = ContentItem::new("1", "cat and dog");
    assert_eq!(m.matches(&item), vec!["dog", "cat"]);
}

#[test]
fn case_sensitive_match_respects_case() {
    let m = KeywordMatcher::new(vec!["Rust".into()], MatchMode::Any, true);
    assert!(m.is_match(&ContentItem::new("1", "Learning Rust")));
    assert!(!m.is_match(&ContentItem::new("2", "learning rust")));
}

#[test]
fn author_is_searched() {
    let m = matcher(&["gamer"], MatchMode::Any);
    let item = ContentItem::new("1", "Speedrun").author("ProGamer42");
    assert_eq!(m.matches(&item), vec!["gamer"]);
}

#[test]
fn tags_can_be_excluded() {
    let item = ContentItem::new("1", "Untitled").tags(["kittens"]);
    assert!(matcher(&["kitten"], MatchMode::Any).is_match(&item));
    assert!(
        !matcher(&["kitten"], MatchMode::Any)
            .include_tags(false)
            .is_match(&item)
    );
}

#[test]
fn substring_matches_inside_words() {
    let m = matcher(&["cat"], MatchMode::Any);
    assert!(m.is_match(&ContentItem::new("1", "concatenate strings")));
}

#[test]
fn empty_keyword_list_never_matches() {
    for mode in [MatchMode::Any, MatchMode::All] {
        let m = matcher(&[], mode);
        assert!(!m.is_match(&ContentItem::new("1", "anything")));
    }
}

#[test]
fn match_mode_parses() {
    assert_eq!("ALL".parse::<MatchMode>().unwrap(), MatchMode::All);
    assert_eq!(" any ".parse::<MatchMode>().unwrap(), MatchMode::Any);
    assert!("some".parse::<MatchMode>().is_err());
}
