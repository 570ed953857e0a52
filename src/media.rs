use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif"];

static EMBEDDED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#)
        .expect("valid embedded image regex")
});

static LINKED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)\[([^\]]*)\]\(\s*([^)\s]+?\.(?:{})(?:\?[^)\s]*)?)(?:\s+"[^"]*")?\s*\)"#,
        IMAGE_EXTENSIONS.join("|")
    ))
    .expect("valid linked image regex")
});

static IMAGE_TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\.(?:{})(?:\?\S*)?$",
        IMAGE_EXTENSIONS.join("|")
    ))
    .expect("valid image target regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaOrigin {
    Embedded,
    Linked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaReference {
    pub source_url: String,
    pub alt_text: String,
    pub origin: MediaOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub span: Range<usize>,
    pub reference: MediaReference,
}

/// One harvesting pass. Rules run in the order of [`RULES`] and a later rule never claims
/// text an earlier rule already matched.
pub struct MediaRule {
    pub origin: MediaOrigin,
    pattern: &'static Lazy<Regex>,
}

pub static RULES: [MediaRule; 2] = [
    MediaRule {
        origin: MediaOrigin::Embedded,
        pattern: &EMBEDDED_RE,
    },
    MediaRule {
        origin: MediaOrigin::Linked,
        pattern: &LINKED_RE,
    },
];

impl MediaRule {
    pub fn apply(&self, body: &str, claimed: &[Range<usize>]) -> Vec<RuleMatch> {
        let re: &Regex = self.pattern;
        let mut found = Vec::new();
        let mut pos = 0;
        while pos <= body.len() {
            let Some(caps) = re.captures_at(body, pos) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };
            let span = whole.range();
            if claimed.iter().any(|taken| overlaps(taken, &span)) {
                pos = next_char_boundary(body, span.start);
                continue;
            }
            found.push(RuleMatch {
                reference: MediaReference {
                    source_url: caps[2].to_string(),
                    alt_text: caps[1].to_string(),
                    origin: self.origin,
                },
                span: span.clone(),
            });
            pos = span.end.max(next_char_boundary(body, span.start));
        }
        found
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map(|ch| at + ch.len_utf8())
        .unwrap_or(text.len() + 1)
}

/// Runs every rule over `body`, returning the matches grouped by rule order.
pub fn rule_matches(body: &str) -> Vec<RuleMatch> {
    let mut all: Vec<RuleMatch> = Vec::new();
    for rule in RULES.iter() {
        let claimed: Vec<Range<usize>> = all.iter().map(|m| m.span.clone()).collect();
        all.extend(rule.apply(body, &claimed));
    }
    all
}

/// Embedded images first, then linked images, each group in order of appearance.
pub fn harvest(body: &str) -> Vec<MediaReference> {
    let media: Vec<MediaReference> = rule_matches(body)
        .into_iter()
        .map(|found| found.reference)
        .collect();
    tracing::trace!(count = media.len(), "harvested media references");
    media
}

/// Removes every harvested reference from `body`, leaving all other text as written.
pub fn sanitize(body: &str) -> String {
    let mut current = body.to_string();
    loop {
        let mut spans: Vec<Range<usize>> = rule_matches(&current)
            .into_iter()
            .map(|found| found.span)
            .collect();
        if spans.is_empty() {
            return current;
        }
        spans.sort_by_key(|span| span.start);

        let mut next = String::with_capacity(current.len());
        let mut cursor = 0;
        for span in spans {
            next.push_str(&current[cursor..span.start]);
            cursor = span.end;
        }
        next.push_str(&current[cursor..]);
        current = next;
    }
}

pub fn is_image_target(target: &str) -> bool {
    IMAGE_TARGET_RE.is_match(target.trim())
}

/// Returns the trimmed URL when it may be handed to an image surface.
pub fn validated_image_url(target: &str) -> Option<String> {
    let trimmed = target.trim();
    if trimmed.is_empty() || !is_image_target(trimmed) {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(trimmed.to_string()),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => Some(trimmed.to_string()),
        Err(_) => None,
    }
}
