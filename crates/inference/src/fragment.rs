//! Classification of stream lines by wire sub-format.
//!
//! Each non-empty line of the inference body is sniffed by prefix:
//!
//! | Prefix    | Format                     | On JSON parse failure     |
//! |-----------|----------------------------|---------------------------|
//! | `0:`      | AI SDK data-stream part    | [`Fragment::Unparseable`] |
//! | `data: `  | Server-sent event payload  | remainder taken literally |
//! | otherwise | plain text                 | n/a                       |

use std::borrow::Cow;

use serde_json::Value;

/// Prefix of AI SDK data-stream text parts.
pub const SDK_PREFIX: &str = "0:";

/// Prefix of server-sent event data lines.
pub const SSE_PREFIX: &str = "data: ";

/// SSE payload marking the end of the event stream.
pub const SSE_DONE: &str = "[DONE]";

/// One classified line of the inference stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// `0:` part; carries the text of `text-delta` / `text` parts.
    Delta(Option<String>),
    /// `data: ` event; carries `textDelta` / `text`, or the raw remainder
    /// when it is not JSON.
    SseEvent(Option<String>),
    /// Unprefixed line.
    PlainText(String),
    /// A `0:` line whose remainder is not valid JSON.
    Unparseable { line: String, reason: String },
}

impl Fragment {
    /// Text this fragment contributes to the accumulated document.
    ///
    /// Plain text lines contribute the line plus a trailing space so that
    /// consecutive lines do not run together.
    pub fn delta(&self) -> Option<Cow<'_, str>> {
        match self {
            Fragment::Delta(text) | Fragment::SseEvent(text) => {
                text.as_deref().map(Cow::Borrowed)
            }
            Fragment::PlainText(line) => Some(Cow::Owned(format!("{line} "))),
            Fragment::Unparseable { .. } => None,
        }
    }
}

/// Classify one line (without its terminating newline).
pub fn classify_line(line: &str) -> Fragment {
    if let Some(rest) = line.strip_prefix(SDK_PREFIX) {
        return classify_sdk_part(line, rest);
    }
    if let Some(rest) = line.strip_prefix(SSE_PREFIX) {
        return classify_sse_data(rest);
    }
    Fragment::PlainText(line.to_string())
}

fn classify_sdk_part(line: &str, rest: &str) -> Fragment {
    match serde_json::from_str::<Value>(rest) {
        Ok(Value::Object(part)) => {
            let text = match part.get("type").and_then(Value::as_str) {
                Some("text-delta") => part
                    .get("textDelta")
                    .or_else(|| part.get("delta"))
                    .and_then(Value::as_str),
                Some("text") => part.get("text").and_then(Value::as_str),
                _ => None,
            };
            Fragment::Delta(text.map(str::to_string))
        }
        // Data-stream protocol v1 encodes text parts as bare JSON strings.
        Ok(Value::String(text)) => Fragment::Delta(Some(text)),
        Ok(_) => Fragment::Delta(None),
        Err(e) => Fragment::Unparseable {
            line: line.to_string(),
            reason: e.to_string(),
        },
    }
}

fn classify_sse_data(rest: &str) -> Fragment {
    if rest.trim() == SSE_DONE {
        return Fragment::SseEvent(None);
    }
    match serde_json::from_str::<Value>(rest) {
        Ok(Value::Object(event)) => {
            let text = event
                .get("textDelta")
                .or_else(|| event.get("text"))
                .and_then(Value::as_str);
            Fragment::SseEvent(text.map(str::to_string))
        }
        // Valid JSON of any other shape carries no text.
        Ok(_) => Fragment::SseEvent(None),
        Err(_) => Fragment::SseEvent(Some(rest.to_string())),
    }
}
