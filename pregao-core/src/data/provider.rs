//! Portfolio source trait, request descriptor and fetch error types.
//!
//! The `PortfolioSource` trait abstracts over where the day's index
//! composition comes from (the B3 endpoint in production, a fake in tests).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::RequestConfig;

/// One constituent row exactly as the endpoint returned it.
pub type PortfolioRecord = Map<String, Value>;

/// Errors a single fetch can end with.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status} from portfolio endpoint")]
    Status { status: u16 },

    #[error("malformed JSON response: {0}")]
    MalformedJson(String),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("write snapshot {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Request descriptor the endpoint expects, base64-encoded into the URL path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRequest {
    pub language: String,
    pub page_number: u32,
    pub page_size: u32,
    #[serde(serialize_with = "serialize_date")]
    pub date: NaiveDate,
    pub index: String,
}

fn serialize_date<S: serde::Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&date.format("%Y-%m-%d"))
}

impl PortfolioRequest {
    /// First page of the configured index for `date`.
    pub fn for_date(config: &RequestConfig, date: NaiveDate) -> Self {
        Self {
            language: config.language.clone(),
            page_number: 1,
            page_size: config.page_size,
            date,
            index: config.index.clone(),
        }
    }

    /// Compact JSON of the descriptor, standard padded base64.
    pub fn encode(&self) -> String {
        // Serializing plain strings and integers into a Vec cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Full request URL: the encoded descriptor is the last path segment.
    pub fn url(&self, base_url: &str) -> String {
        format!("{base_url}{}", self.encode())
    }
}

/// Anything that can produce the day's portfolio records.
pub trait PortfolioSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the records for one request.
    ///
    /// `Ok(vec![])` means the endpoint answered but had nothing for the day.
    fn fetch(&self, request: &PortfolioRequest) -> Result<Vec<PortfolioRecord>, FetchError>;
}

/// Pull the `results` collection out of a response envelope.
///
/// A missing or `null` `results` is an empty day, not an error.
pub fn extract_results(envelope: Value) -> Result<Vec<PortfolioRecord>, FetchError> {
    let Value::Object(mut envelope) = envelope else {
        return Err(FetchError::UnexpectedShape(
            "response is not a JSON object".into(),
        ));
    };

    let results = match envelope.remove("results") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(FetchError::UnexpectedShape(format!(
                "`results` is {}, expected an array",
                json_kind(&other)
            )))
        }
    };

    results
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(FetchError::UnexpectedShape(format!(
                "results[{i}] is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
