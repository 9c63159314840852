//! Filter for calendar and list pages that carry an entity id but can never
//! be an arts subject (`January 1`, `1999`, `1990s`, `AD 79`, `List of …`).
//! Dropping them before classification keeps batches small.

use regex::Regex;

use crate::error::Result;

const CALENDAR_PATTERNS: &[&str] = &[
    r"^(January|February|March|April|May|June|July|August|September|October|November|December) \d{1,2}$",
    r"^(January|February|March|April|May|June|July|August|September|October|November|December)( \d{1,4})?$",
    r"^(AD )?\d{1,4}( (BC|BCE|AD|CE))?$",
    r"^\d{1,4}0s( (BC|BCE))?$",
    r"^\d{1,2}(st|nd|rd|th) century( (BC|BCE))?$",
    r"^(List|Lists|Timeline) of ",
];

#[derive(Debug, Clone)]
pub struct CalendarFilter {
    patterns: Vec<Regex>,
}

impl CalendarFilter {
    pub fn new() -> Result<Self> {
        let patterns = CALENDAR_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// `true` when `title` names a date, year, decade, century or list page.
    pub fn is_calendar_page(&self, title: &str) -> bool {
        let title = title.trim();
        self.patterns.iter().any(|re| re.is_match(title))
    }
}
