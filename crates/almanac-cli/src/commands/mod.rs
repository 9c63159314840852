pub mod config;
pub mod harvest;

pub use harvest::run_harvest;
