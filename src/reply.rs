use serde::Serialize;

use crate::media::{self, MediaReference};
use crate::projection::Projection;
use crate::render::{self, Fragment, RenderContext, RenderStrategy};
use crate::segment::{self, ReasoningMarkers};
use crate::speech::{SpeechConfig, SpeechRequest};
use crate::window::{Breakpoints, DisplayWindow, Gallery, Overlay};

/// One model reply as received. Never mutated after arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseContent {
    pub response_id: String,
    pub model_id: String,
    pub raw: String,
}

impl ResponseContent {
    pub fn new(
        response_id: impl Into<String>,
        model_id: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            response_id: response_id.into(),
            model_id: model_id.into(),
            raw: raw.into(),
        }
    }
}

/// Everything the pipeline derives from a raw reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyArtifacts {
    pub reasoning: Option<String>,
    pub body: String,
    pub media: Vec<MediaReference>,
    pub sanitized_body: String,
    pub projection: Projection,
}

impl ReplyArtifacts {
    pub fn derive(raw: &str, markers: &ReasoningMarkers) -> Self {
        let segment = segment::extract_with(raw, markers);
        let media = media::harvest(&segment.body);
        let sanitized_body = media::sanitize(&segment.body);
        let projection = Projection::from_body(&sanitized_body);
        tracing::debug!(
            has_reasoning = segment.reasoning.is_some(),
            media = media.len(),
            "derived reply artifacts"
        );
        Self {
            reasoning: segment.reasoning,
            body: segment.body,
            media,
            sanitized_body,
            projection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFragment {
    pub fragment: Fragment,
    pub strategy: RenderStrategy,
}

/// A reply as shown in one comparison column: derived artifacts plus its own UI state.
#[derive(Debug, Clone)]
pub struct ResponseView {
    content: ResponseContent,
    artifacts: ReplyArtifacts,
    gallery: Gallery,
}

impl ResponseView {
    pub fn new(content: ResponseContent, markers: &ReasoningMarkers) -> Self {
        let artifacts = ReplyArtifacts::derive(&content.raw, markers);
        Self {
            content,
            artifacts,
            gallery: Gallery::new(),
        }
    }

    pub fn content(&self) -> &ResponseContent {
        &self.content
    }

    pub fn artifacts(&self) -> &ReplyArtifacts {
        &self.artifacts
    }

    pub fn media_window(&self, viewport_width: u32, breakpoints: &Breakpoints) -> DisplayWindow {
        self.gallery
            .window(self.artifacts.media.len(), viewport_width, breakpoints)
    }

    pub fn visible_media(
        &self,
        viewport_width: u32,
        breakpoints: &Breakpoints,
    ) -> (&[MediaReference], Option<Overlay>) {
        let window = self.media_window(viewport_width, breakpoints);
        (window.visible(&self.artifacts.media), window.overlay())
    }

    /// Activated from the "+N" overlay. There is no way back.
    pub fn expand_media(&mut self) {
        self.gallery.expand();
    }

    pub fn fragments(&self) -> Vec<Fragment> {
        render::parse(&self.artifacts.sanitized_body)
    }

    /// Top-level fragments of the visible body with the strategy chosen for each.
    pub fn render_plan(&self) -> Vec<PlannedFragment> {
        let mut ctx = RenderContext::new();
        self.fragments()
            .into_iter()
            .map(|fragment| {
                let strategy = render::dispatch(&fragment, &mut ctx);
                PlannedFragment { fragment, strategy }
            })
            .collect()
    }

    pub fn speech_request(&self, config: &SpeechConfig) -> SpeechRequest {
        SpeechRequest::new(self.artifacts.projection.speech_text.clone(), config)
    }

    pub fn clipboard_text(&self) -> &str {
        &self.artifacts.projection.clipboard_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaOrigin;

    fn view(raw: &str) -> ResponseView {
        ResponseView::new(
            ResponseContent::new("resp-1", "model-a", raw),
            &ReasoningMarkers::new("<r>", "</r>"),
        )
    }

    #[test]
    fn end_to_end_example() {
        let view = view("<r>step one</r>Answer: ![chart](chart.png) see [details](page.html).");
        let artifacts = view.artifacts();
        assert_eq!(artifacts.reasoning.as_deref(), Some("step one"));
        assert_eq!(
            artifacts.body,
            "Answer: ![chart](chart.png) see [details](page.html)."
        );
        assert_eq!(
            artifacts.media,
            vec![MediaReference {
                source_url: "chart.png".into(),
                alt_text: "chart".into(),
                origin: MediaOrigin::Embedded,
            }]
        );
        assert_eq!(artifacts.sanitized_body, "Answer:  see [details](page.html).");
        assert_eq!(artifacts.projection.speech_text, "Answer: see details.");
        assert_eq!(artifacts.projection.clipboard_text, "Answer: see details.");
    }

    #[test]
    fn projections_never_include_reasoning() {
        let view = view("<r>secret plan</r>Visible text.");
        assert!(!view.artifacts().projection.speech_text.contains("secret"));
        assert!(!view.clipboard_text().contains("secret"));
    }

    #[test]
    fn gallery_state_is_per_view() {
        let raw = "![1](1.png)![2](2.png)![3](3.png)![4](4.png)![5](5.png)![6](6.png)";
        let bp = Breakpoints::default();
        let mut left = view(raw);
        let right = view(raw);

        let (visible, overlay) = left.visible_media(320, &bp);
        assert_eq!(visible.len(), 2);
        assert_eq!(overlay.map(|o| o.remainder), Some(4));

        left.expand_media();
        assert_eq!(left.visible_media(320, &bp).0.len(), 6);
        assert_eq!(right.visible_media(320, &bp).0.len(), 2);
    }

    #[test]
    fn render_plan_covers_every_block() {
        let view = view("Intro [clip](https://youtu.be/dQw4w9WgXcQ)\n\n```\ncode\n```\n\n| a |\n|---|\n| 1 |");
        let plan = view.render_plan();
        let strategies: Vec<&RenderStrategy> = plan.iter().map(|p| &p.strategy).collect();
        assert_eq!(
            strategies,
            vec![
                &RenderStrategy::Prose,
                &RenderStrategy::CodeBlock { language: None },
                &RenderStrategy::Table,
            ]
        );
    }

    #[test]
    fn speech_request_uses_speech_projection() {
        let view = view("# Hi\n\n`code` spoken");
        let request = view.speech_request(&SpeechConfig::default());
        assert_eq!(request.text, "Hi\n\nspoken");
    }
}
