//! Record types flowing through the matching pipeline.

mod admin;
mod candidate;
mod potential;
mod result;

pub use admin::{AdminLevel, AdminName, AdminRow};
pub use candidate::{Candidate, CandidateSource, LevelMatch};
pub use potential::{MatchSource, Potential, Span};
pub use result::{MatchResult, MatchType, PhaseTimings, QualityFlag};
