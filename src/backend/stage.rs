//! Wire types of the model-building backend and their decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, ClientResult};

/// Phases of model construction reported by the backend, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parsing,
    Scraping,
    Finetuning,
    Deploying,
}

impl Stage {
    /// All stages, index-aligned with the response slots.
    pub const ALL: [Stage; 4] = [
        Stage::Parsing,
        Stage::Scraping,
        Stage::Finetuning,
        Stage::Deploying,
    ];

    /// Slot index of this stage.
    pub fn index(self) -> usize {
        match self {
            Stage::Parsing => 0,
            Stage::Scraping => 1,
            Stage::Finetuning => 2,
            Stage::Deploying => 3,
        }
    }

    /// Static header label of the card that shows this stage.
    pub fn header(self) -> &'static str {
        match self {
            Stage::Parsing => "Deciding your model",
            Stage::Scraping => "Scraping data for your model",
            Stage::Finetuning => "Creating your model",
            Stage::Deploying => "Deploying your model",
        }
    }

    /// Wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Parsing => "parsing",
            Stage::Scraping => "scraping",
            Stage::Finetuning => "finetuning",
            Stage::Deploying => "deploying",
        }
    }

    /// The last stage the backend reports.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Deploying)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ClientError::UnknownStage(s.to_string()))
    }
}

/// One decoded answer of the stage endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub summary: String,
}

impl StageReport {
    pub fn new(stage: Stage, summary: impl Into<String>) -> Self {
        Self {
            stage,
            summary: summary.into(),
        }
    }
}

/// The parser's answer to a model request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelPlan {
    /// Search prompt the scraper will use; shown on the first card
    pub webscraping_prompt: String,
    /// Model family chosen by the parser
    #[serde(default)]
    pub model_type: Option<String>,
    /// Kind of data that will be collected
    #[serde(default)]
    pub data_type: Option<String>,
}

impl ModelPlan {
    /// One-line description of the chosen model, if the backend sent one.
    pub fn annotation(&self) -> Option<String> {
        match (&self.model_type, &self.data_type) {
            (Some(model), Some(data)) => Some(format!("{} model on {} data", model, data)),
            (Some(model), None) => Some(format!("{} model", model)),
            (None, Some(data)) => Some(format!("{} data", data)),
            (None, None) => None,
        }
    }
}

#[derive(Deserialize)]
struct RawStageReport {
    stage: String,
    #[serde(default)]
    summary: Option<String>,
}

/// Decode the body of `POST /request_model/`.
///
/// The backend serialises its plan with `json.dumps` and then returns that
/// string from a JSON endpoint, so the body is usually a JSON string holding a
/// JSON object. A body that is already an object is accepted too.
pub fn decode_model_plan(body: &str) -> ClientResult<ModelPlan> {
    const ENDPOINT: &str = "request_model";

    let outer: Value =
        serde_json::from_str(body).map_err(|e| ClientError::malformed(ENDPOINT, e))?;
    let inner = match outer {
        Value::String(encoded) => {
            serde_json::from_str(&encoded).map_err(|e| ClientError::malformed(ENDPOINT, e))?
        }
        other => other,
    };
    serde_json::from_value(inner).map_err(|e| ClientError::malformed(ENDPOINT, e))
}

/// Decode the body of `GET /request_stage/`.
///
/// An empty body, `null`, `{}` or a report without a stage yields `Ok(None)`:
/// the backend has nothing to say yet.
pub fn decode_stage_report(body: &str) -> ClientResult<Option<StageReport>> {
    const ENDPOINT: &str = "request_stage";

    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| ClientError::malformed(ENDPOINT, e))?;
    match &value {
        Value::Null => return Ok(None),
        Value::Object(map) if map.get("stage").map_or(true, Value::is_null) => return Ok(None),
        Value::Object(_) => {}
        other => {
            return Err(ClientError::malformed(
                ENDPOINT,
                format!("expected an object, got {}", other),
            ))
        }
    }

    let raw: RawStageReport =
        serde_json::from_value(value).map_err(|e| ClientError::malformed(ENDPOINT, e))?;
    let stage = raw.stage.parse::<Stage>()?;
    Ok(Some(StageReport {
        stage,
        summary: raw.summary.unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_stage_mapping_is_total_and_unique() {
        let indices: HashSet<usize> = ["parsing", "scraping", "finetuning", "deploying"]
            .iter()
            .map(|name| name.parse::<Stage>().unwrap().index())
            .collect();
        assert_eq!(indices.len(), 4);
        assert!(indices.iter().all(|i| *i <= 3));
    }

    #[test]
    fn test_index_round_trips_through_all() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::ALL[stage.index()], *stage);
        }
    }

    #[test]
    fn test_unknown_stage_is_an_error() {
        let err = "not_ready".parse::<Stage>().unwrap_err();
        assert_eq!(err, ClientError::UnknownStage("not_ready".to_string()));
    }

    #[test]
    fn test_headers() {
        assert_eq!(Stage::Parsing.header(), "Deciding your model");
        assert_eq!(Stage::Deploying.header(), "Deploying your model");
    }

    #[test]
    fn test_decode_double_encoded_plan() {
        let body = serde_json::to_string(
            r#"{"model_type": "gpt4o-mini", "data_type": "images", "webscraping_prompt": "searching for cat images"}"#,
        )
        .unwrap();
        let plan = decode_model_plan(&body).unwrap();
        assert_eq!(plan.webscraping_prompt, "searching for cat images");
        assert_eq!(plan.model_type.as_deref(), Some("gpt4o-mini"));
        assert_eq!(
            plan.annotation().as_deref(),
            Some("gpt4o-mini model on images data")
        );
    }

    #[test]
    fn test_decode_plain_object_plan() {
        let plan = decode_model_plan(r#"{"webscraping_prompt": "searching for cat images"}"#)
            .unwrap();
        assert_eq!(plan.webscraping_prompt, "searching for cat images");
        assert_eq!(plan.annotation(), None);
    }

    #[test]
    fn test_decode_plan_missing_prompt() {
        let body = serde_json::to_string(r#"{"model_type": "mistral"}"#).unwrap();
        let err = decode_model_plan(&body).unwrap_err();
        assert!(matches!(
            err,
            ClientError::MalformedPayload {
                endpoint: "request_model",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_plan_string_that_is_not_json() {
        let err = decode_model_plan(r#""just words""#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_stage_report() {
        let report =
            decode_stage_report(r#"{"stage": "deploying", "summary": "live at endpoint X"}"#)
                .unwrap()
                .unwrap();
        assert_eq!(report, StageReport::new(Stage::Deploying, "live at endpoint X"));
        assert_eq!(report.stage.index(), 3);
    }

    #[test]
    fn test_decode_empty_stage_results() {
        assert_eq!(decode_stage_report("").unwrap(), None);
        assert_eq!(decode_stage_report("null").unwrap(), None);
        assert_eq!(decode_stage_report("{}").unwrap(), None);
        assert_eq!(decode_stage_report(r#"{"stage": null}"#).unwrap(), None);
    }

    #[test]
    fn test_decode_stage_unknown_name() {
        let err = decode_stage_report(r#"{"stage": "not_ready", "summary": ""}"#).unwrap_err();
        assert_eq!(err, ClientError::UnknownStage("not_ready".to_string()));
    }

    #[test]
    fn test_decode_stage_wrong_shape() {
        assert!(matches!(
            decode_stage_report("[1, 2]").unwrap_err(),
            ClientError::MalformedPayload { .. }
        ));
        assert!(matches!(
            decode_stage_report("{not json").unwrap_err(),
            ClientError::MalformedPayload { .. }
        ));
    }
}
