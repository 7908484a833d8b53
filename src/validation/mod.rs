//! Decoding of raw model output into validated rally data.
//!
//! Every response goes through the same steps: strip a markdown fence if the
//! model added one, parse JSON, check it against the declared response
//! schema, deserialize into typed structures and finally check the
//! invariants the schema cannot express. Any failure is a [`DecodeError`].

pub mod schema;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::badminton::{RallyAnalysis, RallySegmentation};
use crate::error::DecodeError;

/// Remove a surrounding ```` ```json ```` fence and whitespace
pub fn strip_code_fence(raw: &str) -> &str {
    let content = raw.trim();
    if let Some(rest) = content.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        return body.trim_end().trim_end_matches("```").trim();
    }
    content
}

pub fn parse_json(raw: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| DecodeError::MalformedJson(e.to_string()))
}

fn decode_typed<T: DeserializeOwned>(raw: &str, response_schema: &Value) -> Result<T, DecodeError> {
    let value = parse_json(raw)?;
    schema::check(&value, response_schema)?;
    serde_json::from_value(value).map_err(|e| DecodeError::Shape(e.to_string()))
}

/// Decode the Segment response into ordered, non-overlapping rally windows
pub fn decode_segmentation(raw: &str, response_schema: &Value) -> Result<RallySegmentation, DecodeError> {
    let segmentation: RallySegmentation = decode_typed(raw, response_schema)?;
    segmentation.validate()?;
    debug!("Decoded {} rally windows", segmentation.rallies.len());
    Ok(segmentation)
}

/// Decode the Analyze response for one rally.
///
/// `clip_duration` is the length of the analyzed clip; when known, action
/// timestamps must fall inside it.
pub fn decode_rally_analysis(
    raw: &str,
    response_schema: &Value,
    clip_duration: Option<f64>,
) -> Result<RallyAnalysis, DecodeError> {
    let analysis: RallyAnalysis = decode_typed(raw, response_schema)?;
    analysis.validate(clip_duration)?;
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badminton::analysis::fixtures::sample_analysis;
    use crate::badminton::RallyWindow;
    use crate::llm::prompts::{analyze_schema, segment_schema};

    fn sample_json() -> Value {
        serde_json::to_value(sample_analysis()).unwrap()
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_roundtrip_analysis() {
        let original = sample_analysis();
        let raw = serde_json::to_string(&original).unwrap();

        let decoded = decode_rally_analysis(&raw, &analyze_schema(), Some(8.0)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_truncated_json() {
        let raw = serde_json::to_string(&sample_json()).unwrap();
        let truncated = &raw[..raw.len() / 2];

        let err = decode_rally_analysis(truncated, &analyze_schema(), None).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedJson(_)));
    }

    #[test]
    fn test_missing_top_level_key() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("Point_winner");

        let err = decode_rally_analysis(&value.to_string(), &analyze_schema(), None).unwrap_err();
        assert_eq!(err, DecodeError::MissingKey { path: "$.Point_winner".to_string() });
    }

    #[test]
    fn test_stamina_percentage_out_of_range() {
        let mut value = sample_json();
        value["Stamina"]["Player1"]["percentage"] = serde_json::json!(150);

        let err = decode_rally_analysis(&value.to_string(), &analyze_schema(), None).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { .. }));

        value["Stamina"]["Player1"]["percentage"] = serde_json::json!(-5);
        let err = decode_rally_analysis(&value.to_string(), &analyze_schema(), None).unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut value = sample_json();
        value["rally_shots_count"] = serde_json::json!("nine");

        let err = decode_rally_analysis(&value.to_string(), &analyze_schema(), None).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { .. }));
    }

    #[test]
    fn test_third_player_rejected() {
        let mut value = sample_json();
        value["Footwork"]["Player3"] = serde_json::json!({"Description": [], "Timestamp": []});

        let err = decode_rally_analysis(&value.to_string(), &analyze_schema(), None).unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
    }

    #[test]
    fn test_decode_segmentation() {
        let raw = "```json\n{\"rallies\": [{\"start\": \"00:05\", \"end\": \"00:20\"}, {\"start\": \"00:24\", \"end\": \"00:39\"}]}\n```";
        let segmentation = decode_segmentation(raw, &segment_schema()).unwrap();

        assert_eq!(
            segmentation.rallies,
            vec![
                RallyWindow { start: 5.0, end: 20.0 },
                RallyWindow { start: 24.0, end: 39.0 },
            ]
        );
    }

    #[test]
    fn test_segmentation_with_numbers_fails_schema() {
        let raw = r#"{"rallies": [{"start": 5, "end": 20}]}"#;
        let err = decode_segmentation(raw, &segment_schema()).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { .. }));
    }

    #[test]
    fn test_segmentation_overlap_rejected() {
        let raw = r#"{"rallies": [{"start": "0:05", "end": "0:20"}, {"start": "0:10", "end": "0:30"}]}"#;
        let err = decode_segmentation(raw, &segment_schema()).unwrap_err();
        assert!(matches!(err, DecodeError::Inconsistent { .. }));
    }
}
