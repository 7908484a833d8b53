use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

use super::SamplingParams;
use crate::config::PromptConfig;

/// The two request kinds the pipeline sends to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Segment,
    Analyze,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Segment => f.write_str("segment"),
            TaskKind::Analyze => f.write_str("analyze"),
        }
    }
}

/// Everything needed to issue one kind of request
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub kind: TaskKind,
    pub system_instruction: String,
    pub prompt: String,
    pub output_schema: Value,
    pub sampling: SamplingParams,
}

const SEGMENT_INSTRUCTION: &str = "\
You are a badminton match video editor. Split the video into rallies.
A rally starts with the serve and ends when the shuttle touches the ground or a point is scored.
When the shuttle leaves the frame it has been played high; the rally is still in progress.
Report every rally in order. Rallies never overlap.
Give start and end as timestamps in MM:SS.ss format measured from the start of the video.";

const SEGMENT_PROMPT: &str = "\
List the start and end time of every rally in this badminton video.";

const ANALYZE_INSTRUCTION: &str = "\
You are a badminton coach reviewing a single rally between two players.
Identify the two players and call them by name when they are recognisable, otherwise Player1 and Player2.
Every timestamp is measured from the start of this clip in MM:SS.ss format and must lie inside the clip.
Description and Timestamp lists always have the same length and timestamps are in chronological order.";

const ANALYZE_PROMPT: &str = "\
Analyze this rally and report:
1. Which player won the point.
2. How many shots were played in the rally.
3. Court reach of each player: how well they covered the court, with timestamps.
4. Footwork of each player: split steps, recovery to base, lunges, with timestamps.
5. Stamina of each player as a percentage from 0 to 100 with a short description.
6. Fouls committed by each player, with timestamps.
7. Smashes played by each player: the count and the timestamp of each smash.";

/// Response schema for the Segment request
pub fn segment_schema() -> Value {
    json!({
        "type": "OBJECT",
        "required": ["rallies"],
        "properties": {
            "rallies": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "required": ["start", "end"],
                    "properties": {
                        "start": {"type": "STRING"},
                        "end": {"type": "STRING"}
                    }
                }
            }
        }
    })
}

/// Response schema for the Analyze request
pub fn analyze_schema() -> Value {
    let string_list = json!({"type": "ARRAY", "items": {"type": "STRING"}});
    let event_log = json!({
        "type": "OBJECT",
        "required": ["Description", "Timestamp"],
        "properties": {
            "Description": string_list,
            "Timestamp": string_list
        }
    });
    let stamina = json!({
        "type": "OBJECT",
        "required": ["Description", "percentage"],
        "properties": {
            "Description": {"type": "STRING"},
            "percentage": {"type": "INTEGER"}
        }
    });
    let smashes = json!({
        "type": "OBJECT",
        "required": ["count", "Timestamp"],
        "properties": {
            "count": {"type": "INTEGER"},
            "Timestamp": string_list
        }
    });

    json!({
        "type": "OBJECT",
        "required": [
            "Player1", "Player2", "Point_winner", "rally_shots_count",
            "CourtReach", "Footwork", "Stamina", "Fouls", "Smashes"
        ],
        "properties": {
            "Player1": {"type": "STRING"},
            "Player2": {"type": "STRING"},
            "Point_winner": {"type": "STRING"},
            "rally_shots_count": {"type": "INTEGER"},
            "CourtReach": per_player(&event_log),
            "Footwork": per_player(&event_log),
            "Stamina": per_player(&stamina),
            "Fouls": per_player(&event_log),
            "Smashes": per_player(&smashes)
        }
    })
}

fn per_player(record: &Value) -> Value {
    json!({
        "type": "OBJECT",
        "required": ["Player1", "Player2"],
        "properties": {
            "Player1": record,
            "Player2": record
        }
    })
}

/// Built-in request configuration for a task kind
pub fn task_config(kind: TaskKind) -> TaskConfig {
    match kind {
        TaskKind::Segment => TaskConfig {
            kind,
            system_instruction: SEGMENT_INSTRUCTION.to_string(),
            prompt: SEGMENT_PROMPT.to_string(),
            output_schema: segment_schema(),
            sampling: SamplingParams {
                temperature: 1.0,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: None,
            },
        },
        TaskKind::Analyze => TaskConfig {
            kind,
            system_instruction: ANALYZE_INSTRUCTION.to_string(),
            prompt: ANALYZE_PROMPT.to_string(),
            output_schema: analyze_schema(),
            sampling: SamplingParams {
                temperature: 1.0,
                top_p: 0.95,
                top_k: 64,
                max_output_tokens: None,
            },
        },
    }
}

/// Resolved configurations for both task kinds
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    segment: TaskConfig,
    analyze: TaskConfig,
}

impl PromptRegistry {
    /// Registry with the built-in prompts
    pub fn new() -> Self {
        Self {
            segment: task_config(TaskKind::Segment),
            analyze: task_config(TaskKind::Analyze),
        }
    }

    /// Registry whose instructions and prompts may be overridden by files in
    /// `config.prompt_dir`. Missing or unreadable files keep the built-in text.
    pub async fn from_config(config: &PromptConfig) -> Self {
        let mut registry = Self::new();

        registry.segment.system_instruction =
            load_or_default(config, &config.segment_instruction_file, registry.segment.system_instruction).await;
        registry.segment.prompt =
            load_or_default(config, &config.segment_prompt_file, registry.segment.prompt).await;
        registry.analyze.system_instruction =
            load_or_default(config, &config.analyze_instruction_file, registry.analyze.system_instruction).await;
        registry.analyze.prompt =
            load_or_default(config, &config.analyze_prompt_file, registry.analyze.prompt).await;

        registry
    }

    /// Apply a model-wide output token limit to both task kinds
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.segment.sampling.max_output_tokens = max_output_tokens;
        self.analyze.sampling.max_output_tokens = max_output_tokens;
        self
    }

    pub fn config(&self, kind: TaskKind) -> &TaskConfig {
        match kind {
            TaskKind::Segment => &self.segment,
            TaskKind::Analyze => &self.analyze,
        }
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_or_default(config: &PromptConfig, filename: &str, default: String) -> String {
    if !config.prompt_dir.join(filename).exists() {
        debug!("No prompt override {}, using built-in text", filename);
        return default;
    }
    match config.load_prompt(filename).await {
        Ok(content) if !content.is_empty() => {
            debug!("Loaded prompt override from {}", filename);
            content
        }
        Ok(_) => {
            warn!("⚠️ Prompt file {} is empty, using built-in text", filename);
            default
        }
        Err(e) => {
            warn!("⚠️ {}, using built-in text", e);
            default
        }
    }
}
