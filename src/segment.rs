use serde::{Deserialize, Serialize};

pub const DEFAULT_OPEN_MARKER: &str = "<think>";
pub const DEFAULT_CLOSE_MARKER: &str = "</think>";

/// Delimiters around the hidden reasoning span of a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReasoningMarkers {
    #[serde(default = "default_open")]
    pub open: String,
    #[serde(default = "default_close")]
    pub close: String,
}

impl Default for ReasoningMarkers {
    fn default() -> Self {
        Self {
            open: default_open(),
            close: default_close(),
        }
    }
}

impl ReasoningMarkers {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    fn is_usable(&self) -> bool {
        !self.open.is_empty() && !self.close.is_empty()
    }
}

fn default_open() -> String {
    DEFAULT_OPEN_MARKER.to_string()
}

fn default_close() -> String {
    DEFAULT_CLOSE_MARKER.to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Segment {
    pub reasoning: Option<String>,
    pub body: String,
}

impl Segment {
    fn unsplit(raw: &str) -> Self {
        Self {
            reasoning: None,
            body: raw.to_string(),
        }
    }
}

pub fn extract(raw: &str) -> Segment {
    extract_with(raw, &ReasoningMarkers::default())
}

/// Splits `raw` at the first opening marker and the nearest closing marker after it.
///
/// The span including both markers is removed from the body exactly once. Replies without a
/// complete pair come back untouched, and any later pairs stay in the body.
pub fn extract_with(raw: &str, markers: &ReasoningMarkers) -> Segment {
    if !markers.is_usable() {
        return Segment::unsplit(raw);
    }

    let Some(open_at) = raw.find(&markers.open) else {
        return Segment::unsplit(raw);
    };
    let inner_start = open_at + markers.open.len();
    let Some(close_offset) = raw[inner_start..].find(&markers.close) else {
        return Segment::unsplit(raw);
    };
    let inner_end = inner_start + close_offset;
    let span_end = inner_end + markers.close.len();

    let mut body = String::with_capacity(raw.len() - (span_end - open_at));
    body.push_str(&raw[..open_at]);
    body.push_str(&raw[span_end..]);

    Segment {
        reasoning: Some(raw[inner_start..inner_end].to_string()),
        body,
    }
}
