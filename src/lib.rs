//! Lotus - a Vietnamese postal address normalization engine
//!
//! This library provides shared types and modules for the ingest and query
//! binaries: a read-only reference store over the administrative hierarchy,
//! an inverted token index, and the five-phase matching pipeline that turns
//! a free-form address string into a structured (province, district, ward)
//! identification with a confidence score.

pub mod config;
pub mod geocoder;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod text;

pub use config::MatcherConfig;
pub use models::{AdminLevel, AdminRow, Candidate, MatchResult, MatchType, Potential, QualityFlag};
pub use pipeline::{AddressMatcher, Hints};
pub use store::ReferenceStore;
