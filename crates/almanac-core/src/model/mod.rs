//! Domain model: feed items, entity identifiers, categories and records.

mod date;
mod feed;
mod ids;
mod record;

pub use date::MonthDay;
pub use feed::{Bucket, OtdItem, Page, PageTitles, PageUrl, PageUrls};
pub use ids::Qid;
pub use record::{Category, OutputRecord};
