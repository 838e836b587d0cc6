//! Compliance judgments for requirement/description pairs.
//!
//! The model is asked for JSON. Its answer arrives wrapped in a completion
//! envelope and may be nested (`{"Result": {"Result": "Yes"}}`) or flat
//! (`{"Result": "Yes"}`). Anything that cannot be read becomes
//! [`Verdict::NotAvailable`] with the parse failure as the reason; only a
//! failing completion service is an error.


use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DEFAULT_PROMPT_TEMPLATE;
use crate::llm::{CompletionEnvelope, CompletionService};

const RESULT_KEY: &str = "Result";
const REASON_KEY: &str = "Reason";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verdict {
    Yes,
    No,
    Partial,
    /// The model's answer could not be read. Never the same as `No`.
    NotAvailable,
}

impl fmt::Display for Verdict {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "Yes",
            Self::No => "No",
            Self::Partial => "Partial",
            Self::NotAvailable => NOT_AVAILABLE,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unrecognised result value '{0}'")]
pub struct UnknownVerdict(pub String);

impl FromStr for Verdict {
    type Err = UnknownVerdict;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "partial" => Ok(Self::Partial),
            "n/a" => Ok(Self::NotAvailable),
            _ => Err(UnknownVerdict(s.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub verdict: Verdict,
    pub reason: String,
}

impl Judgment {
    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::NotAvailable,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Completion service failed: {0:#}")]
    Service(#[source] anyhow::Error),
}

pub struct ComplianceJudge {
    service: Arc<dyn CompletionService>,
    template: String,
}

impl ComplianceJudge {
    #[inline]
    pub fn new(service: Arc<dyn CompletionService>, template: impl Into<String>) -> Self {
        Self {
            service,
            template: template.into(),
        }
    }

    #[inline]
    pub fn with_default_template(service: Arc<dyn CompletionService>) -> Self {
        Self::new(service, DEFAULT_PROMPT_TEMPLATE)
    }

    #[inline]
    pub fn build_prompt(&self, requirement_text: &str, description_text: &str) -> String {
        self.template
            .replace("{requirement_text}", requirement_text)
            .replace("{description_text}", description_text)
    }

    /// Ask the model whether the description satisfies the requirement
    #[inline]
    pub async fn judge(
        &self,
        requirement_text: &str,
        description_text: &str,
    ) -> Result<Judgment, JudgeError> {
        let prompt = self.build_prompt(requirement_text, description_text);
        let body = self
            .service
            .complete(&prompt)
            .await
            .map_err(JudgeError::Service)?;

        let judgment = parse_response(&body);
        if judgment.verdict == Verdict::NotAvailable {
            warn!("Judgment unavailable: {}", judgment.reason);
        } else {
            debug!("Judged {}: {}", judgment.verdict, judgment.reason);
        }
        Ok(judgment)
    }
}

/// Read a completion envelope body into a judgment. Never fails.
#[inline]
pub fn parse_response(body: &str) -> Judgment {
    let envelope: CompletionEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => return Judgment::unavailable(format!("Response is not valid JSON: {}", e)),
    };
    let Some(text) = envelope.text else {
        return Judgment::unavailable("Response has no text field");
    };

    let fields = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Judgment::unavailable("Model output is not a JSON object"),
        Err(e) => {
            return Judgment::unavailable(format!("Model output is not valid JSON: {}", e));
        }
    };

    let reason = read_field(&fields, REASON_KEY).unwrap_or_else(|| NOT_AVAILABLE.to_string());
    match read_field(&fields, RESULT_KEY) {
        None => Judgment {
            verdict: Verdict::NotAvailable,
            reason,
        },
        Some(raw) => match raw.parse::<Verdict>() {
            Ok(verdict) => Judgment { verdict, reason },
            Err(e) => Judgment::unavailable(format!("{} (model reason: {})", e, reason)),
        },
    }
}

/// `key` at the top level, or one level down when the top-level value is an object
fn read_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let value = match fields.get(key)? {
        Value::Object(nested) => nested.get(key)?,
        flat => flat,
    };

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
