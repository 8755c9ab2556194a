use serde::{Deserialize, Serialize};

/// One tagged unit in the per-session producer/consumer stream (spec §3
/// "Stream frame", §4.5).
///
/// Exactly one terminal frame (`Done`, `Stopped`, or `Error`) is pushed per
/// turn; frames preserve producer order. `Done` never reaches the HTTP wire
/// directly — see `slab-stream`'s SSE bridge and `DESIGN.md` Open Question 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamFrame {
    /// Retrieved context chunks, pushed once before the first token.
    Docs(serde_json::Value),
    /// A single generated token.
    Text(String),
    /// Generation completed normally.
    Done,
    /// Generation was cancelled via the `stop` control flag.
    Stopped,
    /// Generation failed; carries a human-readable message.
    Error(String),
}

impl StreamFrame {
    /// Encode as the wire form used in the KV list (`"TAG:payload"`).
    pub fn encode(&self) -> String {
        match self {
            StreamFrame::Docs(v) => format!("DOCS:{v}"),
            StreamFrame::Text(t) => format!("TEXT:{t}"),
            StreamFrame::Done => "DONE:".to_string(),
            StreamFrame::Stopped => "STOPPED:".to_string(),
            StreamFrame::Error(m) => format!("ERROR:{m}"),
        }
    }

    /// Decode a frame previously produced by [`Self::encode`].
    ///
    /// Returns `None` for input that doesn't match any known tag; callers
    /// treat that as a poisoned entry and drop it with a logged warning
    /// (spec §4.2 "Failure semantics").
    pub fn decode(raw: &str) -> Option<Self> {
        let (tag, payload) = raw.split_once(':')?;
        match tag {
            "DOCS" => serde_json::from_str(payload)
                .ok()
                .or_else(|| Some(serde_json::Value::String(payload.to_string())))
                .map(StreamFrame::Docs),
            "TEXT" => Some(StreamFrame::Text(payload.to_string())),
            "DONE" => Some(StreamFrame::Done),
            "STOPPED" => Some(StreamFrame::Stopped),
            "ERROR" => Some(StreamFrame::Error(payload.to_string())),
            _ => None,
        }
    }

    /// True for any of the three terminal variants.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Done | StreamFrame::Stopped | StreamFrame::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_text() {
        let f = StreamFrame::Text("hello".into());
        assert!(matches!(StreamFrame::decode(&f.encode()), Some(StreamFrame::Text(t)) if t == "hello"));
    }

    #[test]
    fn round_trips_terminal_variants() {
        assert!(StreamFrame::decode(&StreamFrame::Done.encode()).unwrap().is_terminal());
        assert!(StreamFrame::decode(&StreamFrame::Stopped.encode()).unwrap().is_terminal());
        assert!(StreamFrame::decode(&StreamFrame::Error("boom".into()).encode()).unwrap().is_terminal());
        assert!(!StreamFrame::Text("x".into()).is_terminal());
    }

    #[test]
    fn unknown_tag_decodes_to_none() {
        assert!(StreamFrame::decode("BOGUS:abc").is_none());
    }
}
