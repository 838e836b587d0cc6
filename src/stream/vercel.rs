// Vercel AI data-stream framing
// `0:` carries a JSON string of text, `8:` a JSON array of message annotations

use serde_json::Value;

use super::StreamItem;

/// Empty text frame sent before anything else
pub const PREAMBLE: &str = "0:\"\"\n";

/// One frame per item. Events without a client message produce nothing.
#[inline]
pub fn encode(item: &StreamItem) -> Option<String> {
    match item {
        StreamItem::Text(text) => Some(format!("0:{}\n", Value::String(text.clone()))),
        StreamItem::Event(event) => {
            let response = event.to_response()?;
            serde_json::to_string(&[response])
                .ok()
                .map(|json| format!("8:{}\n", json))
        }
    }
}
