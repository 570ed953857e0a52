//! Plain-text projections of a sanitized reply body.
//!
//! Speech output drops everything that should not be read aloud (code in particular), while
//! clipboard output keeps the readable structure of the document: heading text, quotes,
//! list items and code content survive as plain text.

use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::render;

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"``([^`\n]+?)``|`([^`\n]+)`").expect("valid inline code regex"));

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").expect("valid placeholder regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub speech_text: String,
    pub clipboard_text: String,
}

impl Projection {
    pub fn from_body(sanitized_body: &str) -> Self {
        Self {
            speech_text: speech_text(sanitized_body),
            clipboard_text: clipboard_text(sanitized_body),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Speech,
    Clipboard,
}

impl ProjectionKind {
    /// Markup rules applied, in order, to prose (never to code).
    pub fn rules(self) -> &'static [ProjectionRule] {
        match self {
            ProjectionKind::Speech => &SPEECH_RULES,
            ProjectionKind::Clipboard => &CLIPBOARD_RULES,
        }
    }

    fn whitespace_rules(self) -> &'static [ProjectionRule] {
        match self {
            ProjectionKind::Speech => &SPEECH_WHITESPACE,
            ProjectionKind::Clipboard => &CLIPBOARD_WHITESPACE,
        }
    }
}

pub struct ProjectionRule {
    pub name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl ProjectionRule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).unwrap_or_else(|err| panic!("rule {name}: {err}")),
            replacement,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement)
            .into_owned()
    }
}

// Bold and italic spans must hug their content, so "2 * 3 * 4" is left alone.
const STRONG_STAR: &str = r"\*\*([^*\s](?:[^*\n]*[^*\s])?)\*\*";
const STRONG_UNDERSCORE: &str = r"__([^_\s](?:[^_\n]*[^_\s])?)__";
const EM_STAR: &str = r"\*([^*\s](?:(?:[^*\n]|[ \t]\*[ \t])*[^*\s])?)\*";
// `_` is a word character, so `\b` on both sides means "not inside an identifier".
const EM_UNDERSCORE: &str = r"\b_([^_\s](?:[^_\n]*[^_\s])?)_\b";
const STRIKE: &str = r"~~([^~\n]+?)~~";
const TAG: &str = r"</?[A-Za-z!][^<>\n]*>";
const STRAY_TAG: &str =
    r"(?m)</?[A-Za-z][A-Za-z0-9-]*(?:[ \t]+[^<>\n]*=[^<>\n]*|[ \t]*/?)$|<!--[^\n]*$";
// One level of nested parentheses in the target, e.g. wiki URLs.
const IMAGE: &str = r"!\[([^\]]*)\]\((?:[^()\n]|\([^()\n]*\))*\)";
const LINK: &str = r"\[([^\]]*)\]\((?:[^()\n]|\([^()\n]*\))*\)";
const HEADING_CLOSE: &str = r"(?m)^([ \t]{0,3}#{1,6}[ \t].*?)[ \t]+#+[ \t]*$";
const TABLE_DELIMITER: &str =
    r"(?m)^[ \t]*\|?(?:[ \t]*:?-+:?[ \t]*\|)+[ \t]*(?::?-+:?)?[ \t]*(?:\n|\z)";

static SPEECH_RULES: Lazy<Vec<ProjectionRule>> = Lazy::new(|| {
    vec![
        ProjectionRule::new("image", IMAGE, ""),
        ProjectionRule::new("link", LINK, "$1"),
        ProjectionRule::new("heading_close", HEADING_CLOSE, "$1"),
        ProjectionRule::new("heading", r"(?m)^[ \t]{0,3}#{1,6}(?:[ \t]+|$)", ""),
        ProjectionRule::new("table_delimiter", TABLE_DELIMITER, ""),
        ProjectionRule::new("table_row", r"(?m)^[ \t]*\|(.*)\|[ \t]*$", "$1"),
        ProjectionRule::new("table_cell", r"[ \t]+\|[ \t]+", ", "),
        ProjectionRule::new("rule", r"(?m)^[ \t]{0,3}(?:[-*_][ \t]*){3,}$", ""),
        ProjectionRule::new("blockquote", r"(?m)^[ \t]{0,3}(?:>[ \t]?)+", ""),
        ProjectionRule::new("bullet", r"(?m)^[ \t]*[-*+][ \t]+", ""),
        ProjectionRule::new("strong_star", STRONG_STAR, "$1"),
        ProjectionRule::new("strong_underscore", STRONG_UNDERSCORE, "$1"),
        ProjectionRule::new("strike", STRIKE, "$1"),
        ProjectionRule::new("em_star", EM_STAR, "$1"),
        ProjectionRule::new("em_underscore", EM_UNDERSCORE, "$1"),
        ProjectionRule::new("tag", TAG, ""),
        ProjectionRule::new("stray_tag", STRAY_TAG, ""),
        ProjectionRule::new("stray_image", r"!\[", "["),
        ProjectionRule::new("stray_link", r"\]\(", "] ("),
        ProjectionRule::new("stray_emphasis", r"\*\*+|__+|~~+", ""),
        ProjectionRule::new("stray_backtick", r"`+", ""),
    ]
});

static CLIPBOARD_RULES: Lazy<Vec<ProjectionRule>> = Lazy::new(|| {
    vec![
        ProjectionRule::new("image", IMAGE, ""),
        ProjectionRule::new("link", LINK, "$1"),
        ProjectionRule::new("heading_close", HEADING_CLOSE, "$1"),
        ProjectionRule::new("heading", r"(?m)^[ \t]{0,3}#{1,6}(?:[ \t]+|$)", ""),
        ProjectionRule::new("rule", r"(?m)^[ \t]{0,3}(?:[-*_][ \t]*){3,}$", ""),
        ProjectionRule::new("blockquote", r"(?m)^[ \t]{0,3}(?:>[ \t]?)+", ""),
        ProjectionRule::new("bullet", r"(?m)^([ \t]*)[*+][ \t]+", "$1- "),
        ProjectionRule::new("strong_star", STRONG_STAR, "$1"),
        ProjectionRule::new("strong_underscore", STRONG_UNDERSCORE, "$1"),
        ProjectionRule::new("strike", STRIKE, "$1"),
        ProjectionRule::new("em_star", EM_STAR, "$1"),
        ProjectionRule::new("em_underscore", EM_UNDERSCORE, "$1"),
        ProjectionRule::new("tag", TAG, ""),
        ProjectionRule::new("stray_tag", STRAY_TAG, ""),
        ProjectionRule::new("stray_image", r"!\[", "["),
        ProjectionRule::new("stray_link", r"\]\(", "] ("),
        ProjectionRule::new("stray_emphasis", r"\*\*+|__+|~~+", ""),
        ProjectionRule::new("stray_backtick", r"`+", ""),
    ]
});

static SPEECH_WHITESPACE: Lazy<Vec<ProjectionRule>> = Lazy::new(|| {
    vec![
        ProjectionRule::new("spaces", r"[ \t]+", " "),
        ProjectionRule::new("line_edges", r"(?m)^ | $", ""),
        ProjectionRule::new("blank_lines", r"\n{3,}", "\n\n"),
    ]
});

static CLIPBOARD_WHITESPACE: Lazy<Vec<ProjectionRule>> = Lazy::new(|| {
    vec![
        ProjectionRule::new("spaces", r"([^ \t\n])[ \t]{2,}", "$1 "),
        ProjectionRule::new("trailing", r"(?m)[ \t]+$", ""),
        ProjectionRule::new("blank_lines", r"\n{3,}", "\n\n"),
    ]
});

pub fn speech_text(sanitized_body: &str) -> String {
    let mut spoken = String::with_capacity(sanitized_body.len());
    for piece in split_code(sanitized_body) {
        match piece {
            Piece::Prose(text) => spoken.push_str(&project_prose(text, ProjectionKind::Speech)),
            // Code is not read aloud; keep the paragraph break it occupied.
            Piece::Code { info, .. } => {
                tracing::trace!(language = info.as_str(), "code block left out of speech");
                spoken.push('\n');
            }
        }
    }
    let spoken = apply_all(ProjectionKind::Speech.whitespace_rules(), spoken);
    spoken.trim().to_string()
}

pub fn clipboard_text(sanitized_body: &str) -> String {
    let mut copied = String::with_capacity(sanitized_body.len());
    let mut after_code = false;
    for piece in split_code(sanitized_body) {
        match piece {
            Piece::Prose(text) => {
                let projected = apply_all(
                    ProjectionKind::Clipboard.whitespace_rules(),
                    project_prose(text, ProjectionKind::Clipboard),
                );
                let mut prose = projected.as_str();
                if after_code {
                    // At most one blank line between a code block and what follows.
                    let rest = prose.trim_start_matches('\n');
                    if rest.len() < prose.len() {
                        copied.push('\n');
                    }
                    prose = rest;
                }
                copied.push_str(prose);
                after_code = false;
            }
            Piece::Code { content, .. } => {
                if !copied.is_empty() && !copied.ends_with('\n') {
                    copied.push('\n');
                }
                copied.push_str(&content);
                if !content.ends_with('\n') {
                    copied.push('\n');
                }
                after_code = true;
            }
        }
    }
    copied.trim().to_string()
}

fn apply_all(rules: &[ProjectionRule], text: String) -> String {
    rules.iter().fold(text, |acc, rule| rule.apply(&acc))
}

/// Runs the markup rules over prose while inline code is parked behind placeholders.
fn project_prose(text: &str, kind: ProjectionKind) -> String {
    let mut parked: Vec<String> = Vec::new();
    let shielded = INLINE_CODE_RE.replace_all(text, |caps: &Captures| {
        let code = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        parked.push(code);
        format!("{PLACEHOLDER_OPEN}{}{PLACEHOLDER_CLOSE}", parked.len() - 1)
    });

    let stripped = apply_all(kind.rules(), shielded.into_owned());

    PLACEHOLDER_RE
        .replace_all(&stripped, |caps: &Captures| match kind {
            ProjectionKind::Speech => String::new(),
            ProjectionKind::Clipboard => caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| parked.get(index).cloned())
                .unwrap_or_default(),
        })
        .into_owned()
}

#[derive(Debug, PartialEq, Eq)]
enum Piece<'a> {
    Prose(&'a str),
    Code { info: String, content: String },
}

/// Splits a body into prose and code blocks (fenced or indented), using the same parser
/// the renderer uses. A fence left open runs to the end of its container.
fn split_code(body: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut prose_start = 0;
    let mut block: Option<(String, String)> = None;

    for (event, range) in Parser::new_ext(body, render::parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                if range.start > prose_start {
                    pieces.push(Piece::Prose(&body[prose_start..range.start]));
                }
                let info = match kind {
                    CodeBlockKind::Fenced(info) => info.trim().to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                block = Some((info, String::new()));
            }
            Event::Text(text) => {
                if let Some((_, content)) = block.as_mut() {
                    content.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((info, content)) = block.take() {
                    pieces.push(Piece::Code { info, content });
                    prose_start = prose_start.max(range.end);
                }
            }
            _ => {}
        }
    }

    if prose_start < body.len() {
        pieces.push(Piece::Prose(&body[prose_start..]));
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIPPED_TOKENS: [&str; 9] = ["![", "](", "```", "`", "**", "__", "~~", "<b>", "<span"];

    // A lone `*` or `_` glued to a word on one side only is a leftover emphasis marker.
    static EMPHASIS_MARKER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:^|[^\w*])[*_][^\s*_]|[^\s*_][*_](?:[^\w*]|$)").unwrap()
    });

    fn assert_clean(text: &str) {
        for token in STRIPPED_TOKENS {
            assert!(!text.contains(token), "{token:?} left in {text:?}");
        }
        assert!(
            !EMPHASIS_MARKER.is_match(text),
            "emphasis marker left in {text:?}"
        );
        for line in text.lines() {
            let trimmed = line.trim_start();
            assert!(!trimmed.starts_with('#'), "heading marker left in {text:?}");
            assert!(!trimmed.starts_with('>'), "quote marker left in {text:?}");
        }
    }

    #[test]
    fn speech_collapses_links_and_spacing() {
        assert_eq!(
            speech_text("Answer:  see [details](page.html)."),
            "Answer: see details."
        );
    }

    #[test]
    fn speech_drops_code_entirely() {
        let body = "Run this:\n\n```bash\ncargo run --release\n```\n\nthen call `main()` twice.";
        let spoken = speech_text(body);
        assert_eq!(spoken, "Run this:\n\nthen call twice.");
    }

    #[test]
    fn clipboard_keeps_code_content() {
        let body = "Run this:\n\n```bash\ncargo run --release\n    --flag\n```\n\nthen call `main()` twice.";
        let copied = clipboard_text(body);
        assert_eq!(
            copied,
            "Run this:\n\ncargo run --release\n    --flag\n\nthen call main() twice."
        );
    }

    #[test]
    fn speech_strips_structure_markers() {
        let body = "# Title\n\n> quoted **bold** and *soft* and ~~gone~~\n\n- item one\n- item two\n\n---\n\n<b>done</b>";
        let spoken = speech_text(body);
        assert_eq!(
            spoken,
            "Title\n\nquoted bold and soft and gone\n\nitem one\nitem two\n\ndone"
        );
        assert_clean(&spoken);
    }

    #[test]
    fn clipboard_retains_headings_quotes_and_lists() {
        let body = "## Steps ##\n\n> keep __this__\n\n* first\n+ second\n\n<i>x</i>";
        let copied = clipboard_text(body);
        assert_eq!(copied, "Steps\n\nkeep this\n\n- first\n- second\n\nx");
        assert_clean(&copied);
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let body = "Intro\n```python\nprint('hi')\n";
        assert_eq!(speech_text(body), "Intro");
        assert_eq!(clipboard_text(body), "Intro\nprint('hi')");
    }

    #[test]
    fn arithmetic_asterisks_survive() {
        assert_eq!(speech_text("2 * 3 * 4 = 24"), "2 * 3 * 4 = 24");
    }

    #[test]
    fn snake_case_is_not_emphasis() {
        assert_eq!(speech_text("call my_long_name now"), "call my_long_name now");
        assert_eq!(speech_text("this is _quiet_ text"), "this is quiet text");
    }

    #[test]
    fn stray_tokens_never_survive() {
        let bodies = [
            "unbalanced **bold and `tick",
            "broken ![alt without target",
            "half [link](",
            "~~open strike",
            "<b>bold tag never closed",
            "``` only a fence",
            "_a_ _b_",
            "*x * y*",
            "text <span class=\"x\" unclosed",
            "see [wiki](https://en.wikipedia.org/wiki/Foo_(bar)) ok",
        ];
        for body in bodies {
            assert_clean(&speech_text(body));
            assert_clean(&clipboard_text(body));
        }
    }

    #[test]
    fn repeated_blank_lines_collapse() {
        assert_eq!(speech_text("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clipboard_text("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn projections_are_total_on_empty_input() {
        let projection = Projection::from_body("");
        assert_eq!(projection.speech_text, "");
        assert_eq!(projection.clipboard_text, "");
    }

    #[test]
    fn splits_fences_with_info() {
        let pieces = split_code("a\n~~~~ rust\nlet x = 1;\n~~~~\nb");
        assert_eq!(pieces.len(), 3, "pieces: {pieces:?}");
        assert_eq!(pieces[0], Piece::Prose("a\n"));
        assert_eq!(
            pieces[1],
            Piece::Code {
                info: "rust".into(),
                content: "let x = 1;\n".into()
            }
        );
        assert!(matches!(pieces[2], Piece::Prose(text) if text.trim() == "b"));
    }

    #[test]
    fn indented_code_is_code() {
        let body = "Run:\n\n    rm -rf /tmp/x\n\nDone";
        let pieces = split_code(body);
        assert!(pieces.contains(&Piece::Code {
            info: String::new(),
            content: "rm -rf /tmp/x\n".into()
        }));
        assert_eq!(speech_text(body), "Run:\n\nDone");
        let copied = clipboard_text(body);
        assert!(copied.starts_with("Run:\n\nrm -rf /tmp/x\n"), "copied: {copied:?}");
        assert!(copied.ends_with("\nDone"), "copied: {copied:?}");
    }

    #[test]
    fn adjacent_underscore_emphasis() {
        assert_eq!(speech_text("_a_ _b_"), "a b");
        assert_eq!(clipboard_text("_a_ _b_"), "a b");
        assert_eq!(speech_text("(_quiet_), _loud_."), "(quiet), loud.");
    }

    #[test]
    fn emphasis_may_contain_spaced_operators() {
        assert_eq!(speech_text("*x * y*"), "x * y");
        assert_eq!(speech_text("*a* and *b*"), "a and b");
    }

    #[test]
    fn unclosed_tags_are_dropped() {
        assert_eq!(speech_text("text <span class=\"x\" unclosed"), "text");
        assert_eq!(clipboard_text("before <div\nafter"), "before\nafter");
        assert_eq!(speech_text("x < y and 3 <= 4"), "x < y and 3 <= 4");
    }

    #[test]
    fn link_targets_may_nest_parentheses() {
        let body = "see [wiki](https://en.wikipedia.org/wiki/Foo_(bar)) ok";
        assert_eq!(speech_text(body), "see wiki ok");
        assert_eq!(clipboard_text(body), "see wiki ok");
    }

    #[test]
    fn closing_hashes_only_on_heading_lines() {
        assert_eq!(speech_text("Rate it 10 #"), "Rate it 10 #");
        assert_eq!(speech_text("## Done ##"), "Done");
    }

    #[test]
    fn speech_reads_tables_without_pipes() {
        let body = "| a | b |\n|---|:--:|\n| 1 | 2 |";
        assert_eq!(speech_text(body), "a, b\n1, 2");
    }

    #[test]
    fn rule_chains_are_ordered() {
        let names: Vec<&str> = ProjectionKind::Speech
            .rules()
            .iter()
            .map(|rule| rule.name)
            .collect();
        let image = names.iter().position(|name| *name == "image");
        let link = names.iter().position(|name| *name == "link");
        assert!(image < link);
    }
}
