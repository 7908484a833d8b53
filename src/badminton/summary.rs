use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use super::analysis::{RallyAnalysis, Side};
use super::rally::RallyWindow;

/// Pipeline stage a segment was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStage {
    Split,
    Upload,
    Readiness,
    Inference,
    Decode,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub player1: u32,
    pub player2: u32,
}

impl Score {
    fn award(&mut self, side: Side) {
        match side {
            Side::Player1 => self.player1 += 1,
            Side::Player2 => self.player2 += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RallyOutcome {
    Analyzed {
        analysis: RallyAnalysis,
        /// Match-level side credited with the point
        point_to: Option<Side>,
    },
    Failed {
        stage: SegmentStage,
        reason: String,
    },
}

/// One rally of the match, analyzed or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RallyEntry {
    /// 1-based segment index, matching `segment_{index:03}`
    pub index: usize,
    pub window: Option<RallyWindow>,
    pub clip_path: Option<PathBuf>,
    #[serde(flatten)]
    pub outcome: RallyOutcome,
    /// Running score after this rally
    pub score_after: Score,
}

impl RallyEntry {
    pub fn analysis(&self) -> Option<&RallyAnalysis> {
        match &self.outcome {
            RallyOutcome::Analyzed { analysis, .. } => Some(analysis),
            RallyOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RallyOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub name: Option<String>,
    pub points: u32,
    pub smashes: u32,
    pub fouls: u32,
    pub average_stamina: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub analyzed: usize,
    pub failed: usize,
    pub total_shots: u32,
    pub average_shots: Option<f64>,
    pub longest_rally_secs: Option<f64>,
    pub shortest_rally_secs: Option<f64>,
    pub average_rally_secs: Option<f64>,
    pub player1: PlayerStats,
    pub player2: PlayerStats,
}

/// Whole-match result: every rally in window order plus the running score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub player1: Option<String>,
    pub player2: Option<String>,
    pub score: Score,
    pub rally_count: usize,
    pub rallies: Vec<RallyEntry>,
    pub stats: MatchStats,
}

impl MatchSummary {
    pub fn failed(&self) -> impl Iterator<Item = &RallyEntry> {
        self.rallies.iter().filter(|r| r.is_failed())
    }
}

struct PendingEntry {
    window: Option<RallyWindow>,
    clip_path: Option<PathBuf>,
    outcome: Result<RallyAnalysis, (SegmentStage, String)>,
}

/// Collects segment results in any arrival order and finalizes them by index
#[derive(Default)]
pub struct MatchSummaryBuilder {
    entries: BTreeMap<usize, PendingEntry>,
}

impl MatchSummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_analysis(
        &mut self,
        index: usize,
        window: Option<RallyWindow>,
        clip_path: Option<PathBuf>,
        analysis: RallyAnalysis,
    ) {
        self.insert(index, window, clip_path, Ok(analysis));
    }

    pub fn record_failure(
        &mut self,
        index: usize,
        window: Option<RallyWindow>,
        clip_path: Option<PathBuf>,
        stage: SegmentStage,
        reason: impl Into<String>,
    ) {
        self.insert(index, window, clip_path, Err((stage, reason.into())));
    }

    fn insert(
        &mut self,
        index: usize,
        window: Option<RallyWindow>,
        clip_path: Option<PathBuf>,
        outcome: Result<RallyAnalysis, (SegmentStage, String)>,
    ) {
        if self.entries.contains_key(&index) {
            warn!(segment = index, "Segment reported twice, keeping the latest result");
        }
        self.entries.insert(index, PendingEntry { window, clip_path, outcome });
    }

    pub fn finish(self) -> MatchSummary {
        let mut score = Score::default();
        let mut rallies = Vec::with_capacity(self.entries.len());
        let mut orientations = Vec::with_capacity(self.entries.len());
        let mut players: Option<(String, String)> = None;

        for (index, pending) in self.entries {
            let mut orientation = None;
            let outcome = match pending.outcome {
                Ok(analysis) => {
                    let (player1, player2) =
                        &*players.get_or_insert_with(|| (analysis.player1.clone(), analysis.player2.clone()));
                    orientation = Orientation::of(&analysis, player1, player2);
                    if orientation.is_none() {
                        warn!(
                            segment = index,
                            "Players '{}' and '{}' match neither '{}' nor '{}', point not awarded",
                            analysis.player1,
                            analysis.player2,
                            player1,
                            player2
                        );
                    }

                    let point_to = orientation.and_then(|o| analysis.winner().map(|side| o.to_match(side)));
                    match point_to {
                        Some(side) => score.award(side),
                        None if orientation.is_some() => warn!(
                            segment = index,
                            "Point winner '{}' matches neither player", analysis.point_winner
                        ),
                        None => {}
                    }
                    RallyOutcome::Analyzed { analysis, point_to }
                }
                Err((stage, reason)) => RallyOutcome::Failed { stage, reason },
            };

            orientations.push(orientation);
            rallies.push(RallyEntry {
                index,
                window: pending.window,
                clip_path: pending.clip_path,
                outcome,
                score_after: score,
            });
        }

        let (player1, player2) = match players {
            Some((p1, p2)) => (Some(p1), Some(p2)),
            None => (None, None),
        };

        let mut stats = compute_stats(&rallies, &orientations);
        stats.player1.name = player1.clone();
        stats.player2.name = player2.clone();
        stats.player1.points = score.player1;
        stats.player2.points = score.player2;

        MatchSummary {
            player1,
            player2,
            score,
            rally_count: rallies.len(),
            rallies,
            stats,
        }
    }
}

/// How a clip's `Player1`/`Player2` line up with the match-level players
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Same,
    Swapped,
}

impl Orientation {
    /// `None` when the clip names neither match player, or contradicts itself
    fn of(analysis: &RallyAnalysis, player1: &str, player2: &str) -> Option<Self> {
        use Side::{Player1, Player2};
        match (analysis.side_of(player1), analysis.side_of(player2)) {
            (Some(Player1), Some(Player2)) | (Some(Player1), None) | (None, Some(Player2)) => Some(Self::Same),
            (Some(Player2), Some(Player1)) | (Some(Player2), None) | (None, Some(Player1)) => Some(Self::Swapped),
            _ => None,
        }
    }

    /// Match-level side of a side named in the clip
    fn to_match(self, side: Side) -> Side {
        match (self, side) {
            (Self::Same, side) => side,
            (Self::Swapped, Side::Player1) => Side::Player2,
            (Self::Swapped, Side::Player2) => Side::Player1,
        }
    }
}

fn compute_stats(rallies: &[RallyEntry], orientations: &[Option<Orientation>]) -> MatchStats {
    let mut stats = MatchStats::default();
    let mut stamina = [(0u64, 0u32); 2];
    let mut durations = Vec::new();

    for (entry, orientation) in rallies.iter().zip(orientations) {
        let Some(analysis) = entry.analysis() else {
            stats.failed += 1;
            continue;
        };
        stats.analyzed += 1;
        stats.total_shots = stats.total_shots.saturating_add(analysis.rally_shots_count);

        if let Some(window) = entry.window {
            durations.push(window.duration());
        }

        let Some(orientation) = orientation else {
            continue;
        };
        for side in [Side::Player1, Side::Player2] {
            let (slot, player) = match orientation.to_match(side) {
                Side::Player1 => (0, &mut stats.player1),
                Side::Player2 => (1, &mut stats.player2),
            };
            let fouls = u32::try_from(analysis.foul_count(side)).unwrap_or(u32::MAX);
            player.smashes = player.smashes.saturating_add(analysis.smash_count(side));
            player.fouls = player.fouls.saturating_add(fouls);
            stamina[slot].0 += u64::from(analysis.stamina(side));
            stamina[slot].1 += 1;
        }
    }

    if stats.analyzed > 0 {
        stats.average_shots = Some(f64::from(stats.total_shots) / stats.analyzed as f64);
    }
    if !durations.is_empty() {
        stats.longest_rally_secs = durations.iter().copied().reduce(f64::max);
        stats.shortest_rally_secs = durations.iter().copied().reduce(f64::min);
        stats.average_rally_secs = Some(durations.iter().sum::<f64>() / durations.len() as f64);
    }
    for (slot, (total, count)) in stamina.into_iter().enumerate() {
        if count > 0 {
            let average = Some(total as f64 / f64::from(count));
            if slot == 0 {
                stats.player1.average_stamina = average;
            } else {
                stats.player2.average_stamina = average;
            }
        }
    }

    stats
}
