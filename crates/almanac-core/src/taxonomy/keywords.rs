//! Keyword heuristics used when Wikidata classification yields nothing.
//!
//! The heuristic has no notion of class hierarchy, so it both misses true
//! positives and admits false ones. It only runs as a whole-run fallback.

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::model::Category;

/// Patterns per category, checked in this order.
const KEYWORD_PATTERNS: &[(Category, &str)] = &[
    (
        Category::Music,
        r"\b(singer|songwriter|musician|composer|rapper|band|album|song|single|guitarist|pianist|violinist|drummer|bassist|conductor|opera|symphony|record producer|disc jockey|dj)\b",
    ),
    (
        Category::FilmTv,
        r"\b(actor|actress|film|movie|director|screenwriter|television|tv series|sitcom|cinematographer|animated)\b",
    ),
    (
        Category::Books,
        r"\b(novel|novelist|author|writer|poet|poem|poetry|book|playwright|comics?|manga|publisher)\b",
    ),
    (
        Category::Performance,
        r"\b(painter|sculptor|artist|photographer|dancer|ballet|choreographer|theatre|theater|comedian|musical|exhibition|museum)\b",
    ),
];

/// Ordered, case-insensitive keyword rules.
#[derive(Debug, Clone)]
pub struct KeywordRules {
    rules: Vec<(Category, Regex)>,
}

impl KeywordRules {
    /// Compile the built-in keyword table.
    pub fn standard() -> Result<Self> {
        let rules = KEYWORD_PATTERNS
            .iter()
            .map(|(category, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (*category, re))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// First category whose pattern occurs in `text`.
    pub fn classify(&self, text: &str) -> Option<Category> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(category, _)| *category)
    }
}
