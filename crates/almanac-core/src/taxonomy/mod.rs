//! Classification tables: Wikidata class rules, keyword fallback, and the
//! calendar-page filter.

pub mod calendar;
pub mod keywords;
pub mod rules;

pub use calendar::CalendarFilter;
pub use keywords::KeywordRules;
pub use rules::{ArtsRules, ClassRule, EntityFacts, RuleFamily, RuleLabel, RuleRef, HUMAN};
