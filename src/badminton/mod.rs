/// Badminton domain model: rally windows, per-rally analysis and match summary

pub mod analysis;
pub mod rally;
pub mod summary;
pub mod timestamp;

pub use analysis::{EventLog, PlayerPair, RallyAnalysis, Side, SmashLog, StaminaReading};
pub use rally::{validate_windows, RallySegmentation, RallyWindow};
pub use summary::{
    MatchStats, MatchSummary, MatchSummaryBuilder, PlayerStats, RallyEntry, RallyOutcome, Score,
    SegmentStage,
};
pub use timestamp::{format_timestamp, parse_timestamp};
