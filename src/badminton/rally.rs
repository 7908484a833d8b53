use serde::{Deserialize, Deserializer, Serialize};

use super::timestamp::{format_timestamp, parse_timestamp};
use crate::error::DecodeError;

/// Start and end of one rally, in seconds from the start of the source video
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RallyWindow {
    #[serde(deserialize_with = "deserialize_seconds")]
    pub start: f64,
    #[serde(deserialize_with = "deserialize_seconds")]
    pub end: f64,
}

impl RallyWindow {
    pub fn new(start: f64, end: f64) -> Result<Self, DecodeError> {
        let window = Self { start, end };
        window.check("window")?;
        Ok(window)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn label(&self) -> String {
        format!("{} - {}", format_timestamp(self.start), format_timestamp(self.end))
    }

    fn check(&self, path: &str) -> Result<(), DecodeError> {
        if !self.start.is_finite() || !self.end.is_finite() || self.start < 0.0 {
            return Err(DecodeError::OutOfRange {
                path: path.to_string(),
                detail: format!("invalid bounds {} .. {}", self.start, self.end),
            });
        }
        if self.start >= self.end {
            return Err(DecodeError::Inconsistent {
                path: path.to_string(),
                detail: format!("start {} is not before end {}", self.start, self.end),
            });
        }
        Ok(())
    }
}

/// Check an ordered window list: each window valid, none overlapping its predecessor
pub fn validate_windows(windows: &[RallyWindow]) -> Result<(), DecodeError> {
    for (i, window) in windows.iter().enumerate() {
        let path = format!("$.rallies[{}]", i);
        window.check(&path)?;
        if i > 0 && window.start < windows[i - 1].end {
            return Err(DecodeError::Inconsistent {
                path,
                detail: format!(
                    "starts at {} before previous rally ends at {}",
                    window.start,
                    windows[i - 1].end
                ),
            });
        }
    }
    Ok(())
}

/// Output of the segmentation request, also the on-disk windows file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RallySegmentation {
    pub rallies: Vec<RallyWindow>,
}

impl RallySegmentation {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.rallies.is_empty() {
            return Err(DecodeError::Inconsistent {
                path: "$.rallies".to_string(),
                detail: "no rallies detected".to_string(),
            });
        }
        validate_windows(&self.rallies)
    }

    /// Load a windows file (`{"rallies": [{"start": .., "end": ..}]}`)
    pub async fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let segmentation: Self = serde_json::from_str(&content)
            .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
        segmentation.validate()?;
        Ok(segmentation)
    }
}

/// Accept seconds either as a JSON number or as a timestamp string
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => parse_timestamp(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", text))),
    }
}
