//! "On This Day" feed items and the pages they reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::model::Qid;

const WIKIPEDIA_ARTICLE_BASE: &str = "https://en.wikipedia.org/wiki/";

/// A named partition of the daily feed.
///
/// [`Bucket::All`] is only a fetch target: the umbrella endpoint returns
/// every other bucket in one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Events,
    Births,
    Deaths,
    Selected,
    Holidays,
    All,
}

impl Bucket {
    /// Every concrete bucket, in the order they are fetched by default.
    pub const DAILY: [Self; 5] = [
        Self::Events,
        Self::Births,
        Self::Deaths,
        Self::Selected,
        Self::Holidays,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Births => "births",
            Self::Deaths => "deaths",
            Self::Selected => "selected",
            Self::Holidays => "holidays",
            Self::All => "all",
        }
    }

    #[must_use]
    pub const fn is_umbrella(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::DAILY
            .iter()
            .chain(std::iter::once(&Self::All))
            .find(|b| b.as_str().eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| Error::UnknownBucket(s.to_string()))
    }
}

/// Title variants attached to a page summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTitles {
    #[serde(default)]
    pub canonical: Option<String>,
    #[serde(default)]
    pub normalized: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
}

/// Desktop and mobile URLs for a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUrls {
    #[serde(default)]
    pub desktop: Option<PageUrl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUrl {
    #[serde(default)]
    pub page: Option<String>,
}

/// A Wikipedia article referenced by a feed item.
///
/// Mirrors the page-summary shape of the REST feed. Only `title` is
/// required; everything else may be missing on older or stub pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Raw article title, with underscores (e.g. `Thriller_(album)`).
    pub title: String,

    #[serde(default)]
    pub normalizedtitle: Option<String>,

    #[serde(default)]
    pub titles: Option<PageTitles>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub content_urls: Option<PageUrls>,

    /// Linked Wikidata item, when the article has one.
    #[serde(default)]
    pub wikibase_item: Option<String>,
}

impl Page {
    /// A page with only a title, for building fixtures.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            normalizedtitle: None,
            titles: None,
            description: None,
            content_urls: None,
            wikibase_item: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_qid(mut self, qid: Qid) -> Self {
        self.wikibase_item = Some(qid.to_string());
        self
    }

    /// The linked entity, if present and well formed.
    pub fn qid(&self) -> Option<Qid> {
        self.wikibase_item.as_deref().and_then(|s| s.parse().ok())
    }

    /// Human-readable title: the normalized form when the feed provides
    /// one, otherwise the raw title with underscores turned into spaces.
    pub fn display_title(&self) -> String {
        self.normalizedtitle
            .as_deref()
            .or_else(|| self.titles.as_ref().and_then(|t| t.normalized.as_deref()))
            .map(str::to_string)
            .unwrap_or_else(|| self.title.replace('_', " "))
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    /// Canonical desktop URL, or one built from the raw title.
    pub fn url(&self) -> String {
        self.content_urls
            .as_ref()
            .and_then(|u| u.desktop.as_ref())
            .and_then(|d| d.page.clone())
            .unwrap_or_else(|| format!("{WIKIPEDIA_ARTICLE_BASE}{}", self.title.replace(' ', "_")))
    }
}

/// One factoid from the daily feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtdItem {
    pub bucket: Bucket,
    pub text: String,
    pub year: Option<i32>,
    pub pages: Vec<Page>,
}

impl OtdItem {
    pub fn new(bucket: Bucket, text: impl Into<String>) -> Self {
        Self {
            bucket,
            text: text.into(),
            year: None,
            pages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    /// Pages that carry a usable entity identifier, in feed order.
    pub fn classifiable_pages(&self) -> impl Iterator<Item = (Qid, &Page)> {
        self.pages.iter().filter_map(|p| p.qid().map(|q| (q, p)))
    }
}
