use serde::{Deserialize, Serialize};

use super::timestamp::parse_timestamp;
use crate::error::DecodeError;

/// Slack allowed when checking action timestamps against the clip length
pub const TIMESTAMP_TOLERANCE_SECS: f64 = 1.0;

/// Which of the two players a value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Player1,
    Player2,
}

/// A per-player record; the schema allows exactly these two players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerPair<T> {
    #[serde(rename = "Player1")]
    pub player1: T,
    #[serde(rename = "Player2")]
    pub player2: T,
}

impl<T> PlayerPair<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Player1 => &self.player1,
            Side::Player2 => &self.player2,
        }
    }

    fn sides(&self) -> [(Side, &T); 2] {
        [(Side::Player1, &self.player1), (Side::Player2, &self.player2)]
    }
}

/// Observations with one timestamp per description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventLog {
    #[serde(rename = "Description")]
    pub description: Vec<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaminaReading {
    #[serde(rename = "Description")]
    pub description: String,
    pub percentage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmashLog {
    pub count: u32,
    #[serde(rename = "Timestamp")]
    pub timestamp: Vec<String>,
}

/// Structured analysis of a single rally as returned by the Analyze request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RallyAnalysis {
    #[serde(rename = "Player1")]
    pub player1: String,
    #[serde(rename = "Player2")]
    pub player2: String,
    #[serde(rename = "Point_winner")]
    pub point_winner: String,
    pub rally_shots_count: u32,
    #[serde(rename = "CourtReach")]
    pub court_reach: PlayerPair<EventLog>,
    #[serde(rename = "Footwork")]
    pub footwork: PlayerPair<EventLog>,
    #[serde(rename = "Stamina")]
    pub stamina: PlayerPair<StaminaReading>,
    #[serde(rename = "Fouls")]
    pub fouls: PlayerPair<EventLog>,
    #[serde(rename = "Smashes")]
    pub smashes: PlayerPair<SmashLog>,
}

impl RallyAnalysis {
    /// Check the invariants the schema cannot express.
    ///
    /// `clip_duration` bounds action timestamps, which are relative to the
    /// start of the analyzed clip.
    pub fn validate(&self, clip_duration: Option<f64>) -> Result<(), DecodeError> {
        for (path, name) in [("$.Player1", &self.player1), ("$.Player2", &self.player2)] {
            if name.trim().is_empty() {
                return Err(DecodeError::Inconsistent {
                    path: path.to_string(),
                    detail: "player identifier is empty".to_string(),
                });
            }
        }
        if self.player1.trim().eq_ignore_ascii_case(self.player2.trim()) {
            return Err(DecodeError::Inconsistent {
                path: "$.Player2".to_string(),
                detail: format!("both players are named '{}'", self.player1),
            });
        }

        for (side, reading) in self.stamina.sides() {
            if reading.percentage > 100 {
                return Err(DecodeError::OutOfRange {
                    path: format!("$.Stamina.{:?}.percentage", side),
                    detail: format!("{} is outside 0..=100", reading.percentage),
                });
            }
        }

        for (section, pair) in [
            ("CourtReach", &self.court_reach),
            ("Footwork", &self.footwork),
            ("Fouls", &self.fouls),
        ] {
            for (side, log) in pair.sides() {
                let path = format!("$.{}.{:?}", section, side);
                if log.description.len() != log.timestamp.len() {
                    return Err(DecodeError::Inconsistent {
                        path,
                        detail: format!(
                            "{} descriptions but {} timestamps",
                            log.description.len(),
                            log.timestamp.len()
                        ),
                    });
                }
                check_timestamps(&format!("{}.Timestamp", path), &log.timestamp, clip_duration)?;
            }
        }

        for (side, log) in self.smashes.sides() {
            if (log.count as usize) < log.timestamp.len() {
                return Err(DecodeError::Inconsistent {
                    path: format!("$.Smashes.{:?}.count", side),
                    detail: format!("count {} but {} timestamps", log.count, log.timestamp.len()),
                });
            }
            let path = format!("$.Smashes.{:?}.Timestamp", side);
            check_timestamps(&path, &log.timestamp, clip_duration)?;
        }

        Ok(())
    }

    /// Resolve `Point_winner` to a side, by name or by `Player1`/`Player 2` label
    pub fn winner(&self) -> Option<Side> {
        let winner = normalize(&self.point_winner);
        if winner.is_empty() {
            return None;
        }
        if winner == normalize(&self.player1) || winner == "player1" {
            Some(Side::Player1)
        } else if winner == normalize(&self.player2) || winner == "player2" {
            Some(Side::Player2)
        } else {
            None
        }
    }

    /// Side whose player name matches `name`, ignoring case, spaces and underscores
    pub fn side_of(&self, name: &str) -> Option<Side> {
        let name = normalize(name);
        if name.is_empty() {
            None
        } else if name == normalize(&self.player1) {
            Some(Side::Player1)
        } else if name == normalize(&self.player2) {
            Some(Side::Player2)
        } else {
            None
        }
    }

    pub fn player_name(&self, side: Side) -> &str {
        match side {
            Side::Player1 => &self.player1,
            Side::Player2 => &self.player2,
        }
    }

    pub fn foul_count(&self, side: Side) -> usize {
        self.fouls.get(side).description.len()
    }

    pub fn smash_count(&self, side: Side) -> u32 {
        self.smashes.get(side).count
    }

    pub fn stamina(&self, side: Side) -> u32 {
        self.stamina.get(side).percentage
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn check_timestamps(path: &str, stamps: &[String], clip_duration: Option<f64>) -> Result<(), DecodeError> {
    let mut previous = 0.0_f64;
    for (i, stamp) in stamps.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        let seconds = parse_timestamp(stamp).ok_or_else(|| DecodeError::WrongType {
            path: item_path.clone(),
            expected: "timestamp".to_string(),
            found: format!("'{}'", stamp),
        })?;
        if seconds < previous {
            return Err(DecodeError::Inconsistent {
                path: item_path,
                detail: format!("'{}' is earlier than the preceding timestamp", stamp),
            });
        }
        if let Some(limit) = clip_duration {
            if seconds > limit + TIMESTAMP_TOLERANCE_SECS {
                return Err(DecodeError::OutOfRange {
                    path: item_path,
                    detail: format!("'{}' lies beyond the {:.2}s rally", stamp, limit),
                });
            }
        }
        previous = seconds;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn log(entries: &[(&str, &str)]) -> EventLog {
        EventLog {
            description: entries.iter().map(|(d, _)| d.to_string()).collect(),
            timestamp: entries.iter().map(|(_, t)| t.to_string()).collect(),
        }
    }

    /// A well-formed rally won by the first player
    pub fn sample_analysis() -> RallyAnalysis {
        RallyAnalysis {
            player1: "Lee".to_string(),
            player2: "Axelsen".to_string(),
            point_winner: "Lee".to_string(),
            rally_shots_count: 9,
            court_reach: PlayerPair {
                player1: log(&[("Covers rear court", "00:01"), ("Retrieves net drop", "00:04")]),
                player2: log(&[("Strong at the net", "00:02")]),
            },
            footwork: PlayerPair {
                player1: log(&[("Split step before return", "00:01.5")]),
                player2: log(&[("Late recovery to base", "00:05")]),
            },
            stamina: PlayerPair {
                player1: StaminaReading {
                    description: "Fresh".to_string(),
                    percentage: 90,
                },
                player2: StaminaReading {
                    description: "Breathing hard".to_string(),
                    percentage: 70,
                },
            },
            fouls: PlayerPair {
                player1: EventLog::default(),
                player2: log(&[("Service fault", "00:00.5")]),
            },
            smashes: PlayerPair {
                player1: SmashLog {
                    count: 2,
                    timestamp: vec!["00:03".to_string(), "00:06".to_string()],
                },
                player2: SmashLog::default(),
            },
        }
    }
}
