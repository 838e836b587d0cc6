// Progress events
// Closed set of event kinds and the `{type, data}` envelopes a live client receives

pub mod bus;


use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::tools::ToolOutput;

pub use bus::{BusError, EventBus, EventStream};

/// What happened. Each variant carries its own payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    RetrievalStart {
        requirement_index: usize,
        requirement_id: String,
    },
    RetrievalEnd {
        requirement_index: usize,
        requirement_id: String,
        matched: bool,
    },
    ReasoningStart {
        requirement_index: usize,
        requirement_id: String,
    },
    ReasoningEnd {
        requirement_index: usize,
        requirement_id: String,
    },
    /// Context lookup; `source_count == 0` means the lookup has started
    Retrieve {
        query: Option<String>,
        source_count: usize,
    },
    FunctionCall {
        tool: String,
        arguments: Value,
    },
    AgentStep {
        output: Option<ToolOutput>,
    },
    ReportReady {
        path: String,
    },
}

/// A single notification as it travels through the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
}

/// Envelope delivered to a live client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EventResponse {
    Events(EventMessage),
    Tools(ToolMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    pub title: String,
    #[serde(rename = "fileUrl", skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolMessage {
    #[serde(rename = "toolOutput")]
    pub tool_output: ToolOutputMessage,
    #[serde(rename = "toolCall")]
    pub tool_call: ToolCallMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutputMessage {
    pub output: Value,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallMessage {
    /// Tool outputs carry no call id
    pub id: Option<String>,
    pub name: String,
    pub input: Value,
}

fn titled(title: String) -> EventResponse {
    EventResponse::Events(EventMessage {
        title,
        file_url: None,
    })
}

impl EventKind {
    /// The client-facing message for this event, or `None` when the event
    /// has nothing to show
    #[inline]
    pub fn to_response(&self) -> Option<EventResponse> {
        match self {
            Self::RetrievalStart {
                requirement_index,
                requirement_id,
            } => Some(titled(format!(
                "Retrieving context for requirement {} ({})...",
                requirement_index + 1,
                requirement_id
            ))),
            Self::RetrievalEnd {
                requirement_index,
                requirement_id,
                matched,
            } => Some(titled(if *matched {
                format!(
                    "Found top match for requirement {} ({})",
                    requirement_index + 1,
                    requirement_id
                )
            } else {
                format!(
                    "No matching description for requirement {} ({})",
                    requirement_index + 1,
                    requirement_id
                )
            })),
            Self::ReasoningStart {
                requirement_index,
                requirement_id,
            } => Some(titled(format!(
                "Start reasoning between requirement {} ({}) and description",
                requirement_index + 1,
                requirement_id
            ))),
            Self::ReasoningEnd {
                requirement_index,
                requirement_id,
            } => Some(titled(format!(
                "End reasoning between requirement {} ({}) and description",
                requirement_index + 1,
                requirement_id
            ))),
            Self::Retrieve {
                query,
                source_count,
            } => {
                if *source_count > 0 {
                    Some(titled(format!(
                        "Retrieved {} sources to use as context for the query",
                        source_count
                    )))
                } else {
                    query.as_ref().map(|query| {
                        titled(format!("Retrieving context for query: '{}'", query))
                    })
                }
            }
            Self::FunctionCall { tool, arguments } => Some(titled(format!(
                "Calling tool: {} with inputs: {}",
                tool, arguments
            ))),
            Self::AgentStep { output } => output.as_ref().map(|output| {
                EventResponse::Tools(ToolMessage {
                    tool_output: ToolOutputMessage {
                        output: output.output.clone(),
                        is_error: output.is_error,
                    },
                    tool_call: ToolCallMessage {
                        id: None,
                        name: output.tool_name.clone(),
                        input: output.raw_input.clone(),
                    },
                })
            }),
            Self::ReportReady { path } => Some(EventResponse::Events(EventMessage {
                title: "Task completed. Report is available for download.".to_string(),
                file_url: Some(path.clone()),
            })),
        }
    }
}

impl ProgressEvent {
    #[inline]
    pub fn new(run_id: Uuid, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            kind,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn to_response(&self) -> Option<EventResponse> {
        self.kind.to_response()
    }
}
