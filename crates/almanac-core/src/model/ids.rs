use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Prefix used by Wikidata for entity URIs in SPARQL result bindings.
const ENTITY_URI_PREFIXES: &[&str] = &[
    "http://www.wikidata.org/entity/",
    "https://www.wikidata.org/entity/",
    "http://www.wikidata.org/wiki/",
    "https://www.wikidata.org/wiki/",
];

/// A Wikidata item identifier such as `Q42`.
///
/// Stored as the numeric part so that ordering is numeric (`Q9 < Q10`).
/// Parsing accepts the bare form as well as full entity URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Qid(u64);

impl Qid {
    #[must_use]
    pub const fn from_number(n: u64) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn number(&self) -> u64 {
        self.0
    }

    /// The `wd:Q…` prefixed form used inside SPARQL queries.
    #[must_use]
    pub fn sparql_term(&self) -> String {
        format!("wd:Q{}", self.0)
    }
}

impl fmt::Display for Qid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

impl FromStr for Qid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = ENTITY_URI_PREFIXES
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .unwrap_or(trimmed);

        let digits = bare
            .strip_prefix('Q')
            .or_else(|| bare.strip_prefix('q'))
            .ok_or_else(|| Error::InvalidQid(s.to_string()))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidQid(s.to_string()));
        }

        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| Error::InvalidQid(s.to_string()))
    }
}

impl TryFrom<String> for Qid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Qid> for String {
    fn from(qid: Qid) -> Self {
        qid.to_string()
    }
}
