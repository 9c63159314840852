//! Core domain model for almanac.
//!
//! This crate defines the "On This Day" feed model (items, pages, buckets),
//! Wikidata entity identifiers, the arts categories and output records, and
//! the ordered classification rule tables. Nothing here performs I/O.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod taxonomy;

pub use error::{Error, Result};
pub use model::{Bucket, Category, MonthDay, OtdItem, OutputRecord, Page, Qid};
