use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag};
use serde::Serialize;

use crate::media;
use crate::video::{self, VideoEmbed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericKind {
    BlockQuote,
    List,
    Item,
    Emphasis,
    Strong,
    Strikethrough,
    Rule,
    SoftBreak,
    HardBreak,
    Html,
    FootnoteDefinition,
    FootnoteReference,
    TaskListMarker,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    Paragraph {
        children: Vec<Fragment>,
    },
    Heading {
        level: u8,
        children: Vec<Fragment>,
    },
    Text {
        text: String,
    },
    Link {
        href: String,
        children: Vec<Fragment>,
    },
    Image {
        src: String,
        alt: String,
    },
    Table {
        children: Vec<Fragment>,
    },
    TableHead {
        children: Vec<Fragment>,
    },
    TableRow {
        children: Vec<Fragment>,
    },
    TableCell {
        children: Vec<Fragment>,
    },
    Code {
        text: String,
        language: Option<String>,
        block: bool,
    },
    Generic {
        generic: GenericKind,
        children: Vec<Fragment>,
    },
}

impl Fragment {
    pub fn children(&self) -> &[Fragment] {
        match self {
            Fragment::Paragraph { children }
            | Fragment::Heading { children, .. }
            | Fragment::Link { children, .. }
            | Fragment::Table { children }
            | Fragment::TableHead { children }
            | Fragment::TableRow { children }
            | Fragment::TableCell { children }
            | Fragment::Generic { children, .. } => children,
            Fragment::Text { .. } | Fragment::Image { .. } | Fragment::Code { .. } => &[],
        }
    }

    /// Concatenated text of this fragment and its descendants.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Fragment::Text { text } | Fragment::Code { text, .. } => out.push_str(text),
            Fragment::Image { alt, .. } => out.push_str(alt),
            Fragment::Generic {
                generic: GenericKind::SoftBreak,
                ..
            } => out.push(' '),
            Fragment::Generic {
                generic: GenericKind::HardBreak,
                ..
            } => out.push('\n'),
            other => {
                for child in other.children() {
                    child.collect_text(out);
                }
            }
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Fragment::Text { text } => text.trim().is_empty(),
            Fragment::Generic {
                generic: GenericKind::SoftBreak | GenericKind::HardBreak,
                ..
            } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageTile {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RenderStrategy {
    VideoEmbed { embed: VideoEmbed },
    ImageTile { image: ImageTile },
    PlainLink { href: String },
    ImageGrid { group: usize, images: Vec<ImageTile> },
    SingleImage { image: ImageTile },
    Prose,
    Table,
    TableHeader,
    TableRow,
    TableCell,
    CodeBlock { language: Option<String> },
    InlineCode,
    Passthrough,
}

/// Render state owned by one response. Image groups are numbered per response so that two
/// replies rendered side by side never share a gallery.
#[derive(Debug, Default)]
pub struct RenderContext {
    next_group: usize,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups_issued(&self) -> usize {
        self.next_group
    }

    fn open_group(&mut self) -> usize {
        let group = self.next_group;
        self.next_group += 1;
        group
    }
}

pub fn dispatch(fragment: &Fragment, ctx: &mut RenderContext) -> RenderStrategy {
    match fragment {
        Fragment::Link { href, .. } => {
            if let Some(embed) = video::detect(href) {
                RenderStrategy::VideoEmbed { embed }
            } else if let Some(src) = media::validated_image_url(href) {
                RenderStrategy::ImageTile {
                    image: ImageTile {
                        src,
                        alt: fragment.plain_text(),
                    },
                }
            } else {
                RenderStrategy::PlainLink { href: href.clone() }
            }
        }
        Fragment::Paragraph { children } => paragraph_strategy(children, ctx),
        Fragment::Image { src, alt } => match media::validated_image_url(src) {
            Some(src) => RenderStrategy::ImageTile {
                image: ImageTile {
                    src,
                    alt: alt.clone(),
                },
            },
            None => RenderStrategy::Passthrough,
        },
        Fragment::Table { .. } => RenderStrategy::Table,
        Fragment::TableHead { .. } => RenderStrategy::TableHeader,
        Fragment::TableRow { .. } => RenderStrategy::TableRow,
        Fragment::TableCell { .. } => RenderStrategy::TableCell,
        Fragment::Code {
            text,
            language,
            block,
        } => {
            if *block || text.contains('\n') {
                RenderStrategy::CodeBlock {
                    language: language.clone(),
                }
            } else {
                RenderStrategy::InlineCode
            }
        }
        Fragment::Heading { .. } | Fragment::Text { .. } | Fragment::Generic { .. } => {
            RenderStrategy::Passthrough
        }
    }
}

fn paragraph_strategy(children: &[Fragment], ctx: &mut RenderContext) -> RenderStrategy {
    let mut images = Vec::new();
    for child in children.iter().filter(|child| !child.is_blank()) {
        match child {
            Fragment::Image { src, alt } => {
                if let Some(src) = media::validated_image_url(src) {
                    images.push(ImageTile {
                        src,
                        alt: alt.clone(),
                    });
                }
            }
            _ => return RenderStrategy::Prose,
        }
    }

    match images.len() {
        0 => RenderStrategy::Prose,
        1 => RenderStrategy::SingleImage {
            image: images.remove(0),
        },
        _ => RenderStrategy::ImageGrid {
            group: ctx.open_group(),
            images,
        },
    }
}

/// Markdown extensions shared by every pass that reads a sanitized body.
pub(crate) fn parser_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts
}

pub fn parse(body: &str) -> Vec<Fragment> {
    let mut builder = TreeBuilder::default();
    for event in Parser::new_ext(body, parser_options()) {
        builder.event(event);
    }
    builder.finish()
}

enum FrameKind {
    Paragraph,
    Heading(u8),
    Link(String),
    Image(String),
    Table,
    TableHead,
    TableRow,
    TableCell,
    CodeBlock(Option<String>),
    Generic(GenericKind),
}

struct Frame {
    kind: FrameKind,
    children: Vec<Fragment>,
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Fragment>,
    stack: Vec<Frame>,
}

impl TreeBuilder {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(_) => self.end_tag(),
            Event::Text(text) => self.text(text),
            Event::Code(code) => self.push(Fragment::Code {
                text: code.into_string(),
                language: None,
                block: false,
            }),
            Event::Html(html) | Event::InlineHtml(html) => {
                self.push(leaf(GenericKind::Html, Some(html.into_string())))
            }
            Event::FootnoteReference(name) => {
                self.push(leaf(GenericKind::FootnoteReference, Some(name.into_string())))
            }
            Event::SoftBreak => self.push(leaf(GenericKind::SoftBreak, None)),
            Event::HardBreak => self.push(leaf(GenericKind::HardBreak, None)),
            Event::Rule => self.push(leaf(GenericKind::Rule, None)),
            Event::TaskListMarker(done) => self.push(leaf(
                GenericKind::TaskListMarker,
                Some(if done { "[x]" } else { "[ ]" }.to_string()),
            )),
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        let kind = match tag {
            Tag::Paragraph => FrameKind::Paragraph,
            Tag::Heading { level, .. } => FrameKind::Heading(level_to_u8(level)),
            Tag::BlockQuote => FrameKind::Generic(GenericKind::BlockQuote),
            Tag::CodeBlock(kind) => FrameKind::CodeBlock(match kind {
                CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.into_string()),
                _ => None,
            }),
            Tag::List(_) => FrameKind::Generic(GenericKind::List),
            Tag::Item => FrameKind::Generic(GenericKind::Item),
            Tag::Emphasis => FrameKind::Generic(GenericKind::Emphasis),
            Tag::Strong => FrameKind::Generic(GenericKind::Strong),
            Tag::Strikethrough => FrameKind::Generic(GenericKind::Strikethrough),
            Tag::Link { dest_url, .. } => FrameKind::Link(dest_url.into_string()),
            Tag::Image { dest_url, .. } => FrameKind::Image(dest_url.into_string()),
            Tag::Table(_) => FrameKind::Table,
            Tag::TableHead => FrameKind::TableHead,
            Tag::TableRow => FrameKind::TableRow,
            Tag::TableCell => FrameKind::TableCell,
            Tag::FootnoteDefinition(_) => FrameKind::Generic(GenericKind::FootnoteDefinition),
            Tag::HtmlBlock => FrameKind::Generic(GenericKind::Html),
            Tag::MetadataBlock(_) => FrameKind::Generic(GenericKind::Metadata),
        };
        self.stack.push(Frame {
            kind,
            children: Vec::new(),
        });
    }

    fn end_tag(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let children = frame.children;
        let fragment = match frame.kind {
            FrameKind::Paragraph => Fragment::Paragraph { children },
            FrameKind::Heading(level) => Fragment::Heading { level, children },
            FrameKind::Link(href) => Fragment::Link { href, children },
            FrameKind::Image(src) => {
                let alt = children
                    .iter()
                    .map(Fragment::plain_text)
                    .collect::<String>();
                Fragment::Image { src, alt }
            }
            FrameKind::Table => Fragment::Table { children },
            FrameKind::TableHead => Fragment::TableHead { children },
            FrameKind::TableRow => Fragment::TableRow { children },
            FrameKind::TableCell => Fragment::TableCell { children },
            FrameKind::CodeBlock(language) => Fragment::Code {
                text: children
                    .iter()
                    .map(Fragment::plain_text)
                    .collect::<String>(),
                language,
                block: true,
            },
            FrameKind::Generic(generic) => Fragment::Generic { generic, children },
        };
        self.push(fragment);
    }

    fn text(&mut self, text: CowStr<'_>) {
        let siblings = self.siblings();
        if let Some(Fragment::Text { text: last }) = siblings.last_mut() {
            last.push_str(&text);
            return;
        }
        siblings.push(Fragment::Text {
            text: text.into_string(),
        });
    }

    fn push(&mut self, fragment: Fragment) {
        self.siblings().push(fragment);
    }

    fn siblings(&mut self) -> &mut Vec<Fragment> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => &mut self.root,
        }
    }

    fn finish(mut self) -> Vec<Fragment> {
        while !self.stack.is_empty() {
            self.end_tag();
        }
        self.root
    }
}

fn leaf(generic: GenericKind, text: Option<String>) -> Fragment {
    Fragment::Generic {
        generic,
        children: text
            .map(|text| vec![Fragment::Text { text }])
            .unwrap_or_default(),
    }
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_block(body: &str) -> Fragment {
        parse(body).into_iter().next().expect("at least one block")
    }

    fn link(href: &str) -> Fragment {
        Fragment::Link {
            href: href.to_string(),
            children: vec![Fragment::Text {
                text: "label".to_string(),
            }],
        }
    }

    #[test]
    fn links_pick_video_then_image_then_plain() {
        let mut ctx = RenderContext::new();
        assert!(matches!(
            dispatch(&link("https://youtu.be/dQw4w9WgXcQ"), &mut ctx),
            RenderStrategy::VideoEmbed { .. }
        ));
        assert_eq!(
            dispatch(&link("https://img.test/cat.webp"), &mut ctx),
            RenderStrategy::ImageTile {
                image: ImageTile {
                    src: "https://img.test/cat.webp".into(),
                    alt: "label".into(),
                }
            }
        );
        assert_eq!(
            dispatch(&link("https://docs.test/page.html"), &mut ctx),
            RenderStrategy::PlainLink {
                href: "https://docs.test/page.html".into()
            }
        );
    }

    #[test]
    fn image_only_paragraphs_become_grids() {
        let mut ctx = RenderContext::new();
        let grid = first_block("![a](a.png) ![b](b.png)\n![c](c.gif)");
        match dispatch(&grid, &mut ctx) {
            RenderStrategy::ImageGrid { group, images } => {
                assert_eq!(group, 0);
                assert_eq!(images.len(), 3);
                assert_eq!(images[2].src, "c.gif");
            }
            other => panic!("unexpected strategy {other:?}"),
        }

        let single = first_block("![only](one.png)");
        assert!(matches!(
            dispatch(&single, &mut ctx),
            RenderStrategy::SingleImage { .. }
        ));

        let mixed = first_block("look ![a](a.png) here");
        assert_eq!(dispatch(&mixed, &mut ctx), RenderStrategy::Prose);
        assert_eq!(ctx.groups_issued(), 1);
    }

    #[test]
    fn image_groups_are_per_context() {
        let body = "![a](a.png) ![b](b.png)";
        let mut left = RenderContext::new();
        let mut right = RenderContext::new();
        let block = first_block(body);
        dispatch(&block, &mut left);
        let second_left = dispatch(&block, &mut left);
        let first_right = dispatch(&block, &mut right);
        assert!(matches!(second_left, RenderStrategy::ImageGrid { group: 1, .. }));
        assert!(matches!(first_right, RenderStrategy::ImageGrid { group: 0, .. }));
    }

    #[test]
    fn unsafe_images_pass_through() {
        let mut ctx = RenderContext::new();
        let image = Fragment::Image {
            src: "javascript:alert(1).png".into(),
            alt: "x".into(),
        };
        assert_eq!(dispatch(&image, &mut ctx), RenderStrategy::Passthrough);
    }

    #[test]
    fn tables_use_structural_strategies() {
        let mut ctx = RenderContext::new();
        let table = first_block("| a | b |\n|---|---|\n| 1 | 2 |");
        assert_eq!(dispatch(&table, &mut ctx), RenderStrategy::Table);
        let head = &table.children()[0];
        assert_eq!(dispatch(head, &mut ctx), RenderStrategy::TableHeader);
        assert_eq!(
            dispatch(&head.children()[0], &mut ctx),
            RenderStrategy::TableCell
        );
        let row = &table.children()[1];
        assert_eq!(dispatch(row, &mut ctx), RenderStrategy::TableRow);
        assert_eq!(row.children()[1].plain_text(), "2");
    }

    #[test]
    fn code_shape_decides_renderer() {
        let mut ctx = RenderContext::new();
        let block = first_block("```rust\nfn main() {}\n```");
        assert_eq!(
            dispatch(&block, &mut ctx),
            RenderStrategy::CodeBlock {
                language: Some("rust".into())
            }
        );
        let paragraph = first_block("call `run()` now");
        let inline = &paragraph.children()[1];
        assert_eq!(dispatch(inline, &mut ctx), RenderStrategy::InlineCode);
    }

    #[test]
    fn everything_else_passes_through() {
        let mut ctx = RenderContext::new();
        for body in ["# Title", "> quoted", "- item", "---"] {
            assert_eq!(
                dispatch(&first_block(body), &mut ctx),
                RenderStrategy::Passthrough,
                "body: {body}"
            );
        }
    }

    #[test]
    fn parse_keeps_link_text() {
        let paragraph = first_block("see [details](page.html).");
        assert_eq!(paragraph.plain_text(), "see details.");
        match &paragraph.children()[1] {
            Fragment::Link { href, .. } => assert_eq!(href, "page.html"),
            other => panic!("unexpected fragment {other:?}"),
        }
    }
}
