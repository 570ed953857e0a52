use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

use crate::media::{MediaOrigin, MediaReference};
use crate::render::{self, Fragment, GenericKind, RenderContext, RenderStrategy};
use crate::reply::ResponseView;
use crate::window::{Breakpoints, Overlay};

const REASONING_WIDTH: usize = 76;

/// Terminal preview of a reply, drawn the way the comparison column lays it out.
pub struct Renderer {
    breakpoints: Breakpoints,
    show_reasoning: bool,
}

impl Renderer {
    pub fn new(breakpoints: Breakpoints) -> Self {
        Self {
            breakpoints,
            show_reasoning: false,
        }
    }

    pub fn with_reasoning(mut self, show: bool) -> Self {
        self.show_reasoning = show;
        self
    }

    pub fn render(&self, view: &ResponseView, viewport_width: u32) -> Text<'static> {
        let mut writer = PreviewWriter::default();
        let artifacts = view.artifacts();

        if let Some(reasoning) = &artifacts.reasoning {
            writer.reasoning(reasoning, self.show_reasoning);
        }
        writer.blocks(&view.fragments());

        let (visible, overlay) = view.visible_media(viewport_width, &self.breakpoints);
        writer.gallery(visible, overlay, artifacts.media.len());
        writer.into_text()
    }
}

/// Flattens styled lines into plain strings, e.g. for printing to a pipe.
pub fn plain_lines(text: &Text<'_>) -> Vec<String> {
    text.lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect()
}

#[derive(Default)]
struct PreviewWriter {
    lines: Vec<Line<'static>>,
    ctx: RenderContext,
    quote_depth: usize,
    list_depth: usize,
    pending_marker: Option<String>,
}

impl PreviewWriter {
    fn blocks(&mut self, fragments: &[Fragment]) {
        for fragment in fragments {
            self.block(fragment);
        }
    }

    fn reasoning(&mut self, reasoning: &str, expanded: bool) {
        let style = Style::default().fg(Color::DarkGray);
        let chars = reasoning.trim().chars().count();
        if expanded {
            self.lines.push(Line::from(Span::styled("▾ Reasoning", style)));
            for line in textwrap::wrap(reasoning.trim(), REASONING_WIDTH) {
                self.lines
                    .push(Line::from(Span::styled(format!("  {}", line), style)));
            }
        } else {
            self.lines.push(Line::from(Span::styled(
                format!("▸ Reasoning ({} chars hidden)", chars),
                style,
            )));
        }
        self.separator();
    }

    fn block(&mut self, fragment: &Fragment) {
        let strategy = render::dispatch(fragment, &mut self.ctx);
        match (fragment, strategy) {
            (_, RenderStrategy::SingleImage { image }) => {
                self.push_spans(vec![
                    Span::styled("[image] ", Style::default().fg(Color::Yellow)),
                    Span::raw(display_alt(&image.alt)),
                    Span::styled(format!("  {}", image.src), Style::default().fg(Color::DarkGray)),
                ]);
                self.separator();
            }
            (_, RenderStrategy::ImageGrid { group, images }) => {
                let alts: Vec<String> = images.iter().map(|image| display_alt(&image.alt)).collect();
                self.push_spans(vec![
                    Span::styled(
                        format!("[gallery {} · {} images] ", group, images.len()),
                        Style::default().fg(Color::Yellow),
                    ),
                    Span::raw(alts.join(" | ")),
                ]);
                self.separator();
            }
            (Fragment::Paragraph { children }, _) => {
                let spans = self.inline(children, Style::default());
                self.push_spans(spans);
                if self.list_depth == 0 {
                    self.separator();
                }
            }
            (Fragment::Heading { level, children }, _) => {
                let spans = self.inline(children, heading_style(*level));
                self.push_spans(spans);
                self.separator();
            }
            (Fragment::Code { text, .. }, RenderStrategy::CodeBlock { language }) => {
                self.push_spans(vec![Span::raw(format!(
                    "```{}",
                    language.unwrap_or_default()
                ))]);
                for line in text.trim_end_matches('\n').split('\n') {
                    self.push_line(vec![Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::Cyan),
                    )]);
                }
                self.push_spans(vec![Span::raw("```")]);
                self.separator();
            }
            (Fragment::Table { children }, _) => {
                for row in children {
                    self.table_row(row);
                }
                self.separator();
            }
            (
                Fragment::Generic {
                    generic: GenericKind::BlockQuote,
                    children,
                },
                _,
            ) => {
                self.quote_depth += 1;
                for child in children {
                    self.block(child);
                }
                self.quote_depth -= 1;
            }
            (
                Fragment::Generic {
                    generic: GenericKind::List,
                    children,
                },
                _,
            ) => {
                self.list_depth += 1;
                for child in children {
                    self.block(child);
                }
                self.list_depth -= 1;
                if self.list_depth == 0 {
                    self.separator();
                }
            }
            (
                Fragment::Generic {
                    generic: GenericKind::Item,
                    children,
                },
                _,
            ) => self.item(children),
            (
                Fragment::Generic {
                    generic: GenericKind::Rule,
                    ..
                },
                _,
            ) => {
                self.push_spans(vec![Span::raw("―".repeat(20))]);
                self.separator();
            }
            (
                Fragment::Generic {
                    generic: GenericKind::Html,
                    ..
                },
                _,
            ) => {}
            (Fragment::Generic { children, .. }, _) => {
                for child in children {
                    self.block(child);
                }
            }
            (other, _) => {
                let spans = self.inline(std::slice::from_ref(other), Style::default());
                self.push_spans(spans);
            }
        }
    }

    fn item(&mut self, children: &[Fragment]) {
        let indent = "  ".repeat(self.list_depth.saturating_sub(1));
        self.pending_marker = Some(format!("{}• ", indent));

        let mut inline_run: Vec<Fragment> = Vec::new();
        for child in children {
            if is_block(child) {
                self.flush_inline_run(&mut inline_run);
                self.block(child);
            } else {
                inline_run.push(child.clone());
            }
        }
        self.flush_inline_run(&mut inline_run);
        self.pending_marker = None;
    }

    fn flush_inline_run(&mut self, run: &mut Vec<Fragment>) {
        if run.is_empty() {
            return;
        }
        let spans = self.inline(run, Style::default());
        self.push_spans(spans);
        run.clear();
    }

    fn table_row(&mut self, row: &Fragment) {
        let style = match render::dispatch(row, &mut self.ctx) {
            RenderStrategy::TableHeader => Style::default().add_modifier(Modifier::BOLD),
            RenderStrategy::TableRow => Style::default(),
            _ => return,
        };
        let mut spans = vec![Span::raw("|")];
        for cell in row.children() {
            if render::dispatch(cell, &mut self.ctx) != RenderStrategy::TableCell {
                continue;
            }
            spans.push(Span::raw(" "));
            spans.extend(self.inline(cell.children(), style));
            spans.push(Span::raw(" |"));
        }
        self.push_spans(spans);
    }

    fn inline(&mut self, children: &[Fragment], style: Style) -> Vec<Span<'static>> {
        let mut spans = Vec::new();
        for child in children {
            self.inline_fragment(child, style, &mut spans);
        }
        spans
    }

    fn inline_fragment(&mut self, fragment: &Fragment, style: Style, out: &mut Vec<Span<'static>>) {
        match fragment {
            Fragment::Text { text } => out.push(Span::styled(text.clone(), style)),
            Fragment::Code { text, .. } => {
                match render::dispatch(fragment, &mut self.ctx) {
                    RenderStrategy::InlineCode => out.push(Span::styled(
                        format!("`{}`", text),
                        style.fg(Color::Cyan),
                    )),
                    _ => out.push(Span::styled(text.clone(), style.fg(Color::Cyan))),
                }
            }
            Fragment::Link { children, .. } => {
                let label = fragment.plain_text();
                match render::dispatch(fragment, &mut self.ctx) {
                    RenderStrategy::VideoEmbed { embed } => {
                        out.push(Span::styled(
                            format!("▶ {} ", label),
                            style.fg(Color::Magenta).add_modifier(Modifier::BOLD),
                        ));
                        out.push(Span::styled(
                            format!("({})", embed.embed_url),
                            style.fg(Color::DarkGray),
                        ));
                    }
                    RenderStrategy::ImageTile { image } => out.push(Span::styled(
                        format!("[image: {}]", display_alt(&image.alt)),
                        style.fg(Color::Yellow),
                    )),
                    RenderStrategy::PlainLink { href } => {
                        let link_style = style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
                        for span in self.inline(children, link_style) {
                            out.push(span);
                        }
                        if label.trim() != href {
                            out.push(Span::styled(format!(" <{}>", href), style.fg(Color::DarkGray)));
                        }
                    }
                    _ => out.extend(self.inline(children, style)),
                }
            }
            Fragment::Image { alt, .. } => match render::dispatch(fragment, &mut self.ctx) {
                RenderStrategy::ImageTile { image } => out.push(Span::styled(
                    format!("[image: {}]", display_alt(&image.alt)),
                    style.fg(Color::Yellow),
                )),
                _ => out.push(Span::styled(alt.clone(), style)),
            },
            Fragment::Generic { generic, children } => match generic {
                GenericKind::Emphasis => {
                    out.extend(self.inline(children, style.add_modifier(Modifier::ITALIC)))
                }
                GenericKind::Strong => {
                    out.extend(self.inline(children, style.add_modifier(Modifier::BOLD)))
                }
                GenericKind::Strikethrough => out.extend(
                    self.inline(children, style.add_modifier(Modifier::CROSSED_OUT)),
                ),
                GenericKind::SoftBreak | GenericKind::HardBreak => {
                    out.push(Span::styled(" ", style))
                }
                GenericKind::Html => {}
                GenericKind::FootnoteReference => {
                    out.push(Span::styled(format!("[{}]", fragment.plain_text()), style))
                }
                GenericKind::TaskListMarker => {
                    out.push(Span::styled(format!("{} ", fragment.plain_text()), style))
                }
                _ => out.extend(self.inline(children, style)),
            },
            other => out.extend(self.inline(other.children(), style)),
        }
    }

    fn gallery(&mut self, visible: &[MediaReference], overlay: Option<Overlay>, total: usize) {
        if total == 0 {
            return;
        }
        self.push_spans(vec![Span::styled(
            format!("Media ({} of {})", visible.len(), total),
            Style::default().add_modifier(Modifier::BOLD),
        )]);
        for (index, item) in visible.iter().enumerate() {
            let origin = match item.origin {
                MediaOrigin::Embedded => "embedded",
                MediaOrigin::Linked => "linked",
            };
            let mut spans = vec![
                Span::styled(format!("  [{}] ", index + 1), Style::default().fg(Color::Yellow)),
                Span::raw(display_alt(&item.alt_text)),
                Span::styled(
                    format!("  {} ({})", item.source_url, origin),
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            if let Some(overlay) = overlay.filter(|overlay| overlay.tile_index == index) {
                spans.push(Span::styled(
                    format!("  +{} more", overlay.remainder),
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            self.lines.push(Line::from(spans));
        }
    }

    fn push_spans(&mut self, spans: Vec<Span<'static>>) {
        if spans.iter().all(|span| span.content.trim().is_empty()) {
            return;
        }
        self.push_line(spans);
    }

    fn push_line(&mut self, spans: Vec<Span<'static>>) {
        let mut prefixed = Vec::with_capacity(spans.len() + 2);
        if self.quote_depth > 0 {
            prefixed.push(Span::styled(
                format!("{} ", ">".repeat(self.quote_depth)),
                Style::default().fg(Color::Green),
            ));
        }
        if let Some(marker) = self.pending_marker.take() {
            prefixed.push(Span::styled(marker, Style::default().fg(Color::Yellow)));
        } else if self.list_depth > 0 {
            prefixed.push(Span::raw("  ".repeat(self.list_depth)));
        }
        prefixed.extend(spans);
        self.lines.push(Line::from(prefixed));
    }

    fn separator(&mut self) {
        if !matches!(self.lines.last(), Some(line) if line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn into_text(mut self) -> Text<'static> {
        while matches!(self.lines.last(), Some(line) if line.spans.is_empty()) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(Line::from(Span::raw("")));
        }
        Text {
            lines: self.lines,
            alignment: Some(Alignment::Left),
            style: Style::default(),
        }
    }
}

fn is_block(fragment: &Fragment) -> bool {
    match fragment {
        Fragment::Paragraph { .. }
        | Fragment::Heading { .. }
        | Fragment::Table { .. }
        | Fragment::Code { block: true, .. } => true,
        Fragment::Generic { generic, .. } => matches!(
            generic,
            GenericKind::BlockQuote | GenericKind::List | GenericKind::Rule
        ),
        _ => false,
    }
}

fn display_alt(alt: &str) -> String {
    let trimmed = alt.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        2 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        3 => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Magenta),
    }
}
