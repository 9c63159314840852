use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Bucket, MonthDay, Qid};

/// Arts category assigned to an entity.
///
/// Variant order is the classification priority order, and also the
/// primary sort key of emitted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Music,
    FilmTv,
    Books,
    Performance,
    Awards,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Music,
        Self::FilmTv,
        Self::Books,
        Self::Performance,
        Self::Awards,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::FilmTv => "film_tv",
            Self::Books => "books",
            Self::Performance => "performance",
            Self::Awards => "awards",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted unit: one classified entity for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: Qid,
    pub date: MonthDay,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub category: Category,
    pub year: Option<i32>,
    pub bucket: Bucket,
    /// Consumed by the posting rotation; always zero when a record is built.
    pub times_seen: u32,
}
