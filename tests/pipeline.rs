use replyview::media::{self, MediaOrigin};
use replyview::render::RenderStrategy;
use replyview::segment::ReasoningMarkers;
use replyview::window::Breakpoints;
use replyview::{ReplyArtifacts, ResponseContent, ResponseView};

fn markers() -> ReasoningMarkers {
    ReasoningMarkers::default()
}

#[test]
fn reply_with_everything() {
    let raw = "<think>weigh the options</think># Result\n\n\
Here is a **chart** ![trend](https://img.test/trend.png) and a \
[photo](https://img.test/cat.jpeg?size=large).\n\n\
Watch [the demo](https://www.youtube.com/watch?v=dQw4w9WgXcQ).\n\n\
```python\nprint('hi')\n```\n";
    let view = ResponseView::new(ResponseContent::new("r-1", "model-a", raw), &markers());
    let artifacts = view.artifacts();

    assert_eq!(artifacts.reasoning.as_deref(), Some("weigh the options"));
    assert_eq!(
        artifacts
            .media
            .iter()
            .map(|item| (item.source_url.as_str(), item.origin))
            .collect::<Vec<_>>(),
        vec![
            ("https://img.test/trend.png", MediaOrigin::Embedded),
            ("https://img.test/cat.jpeg?size=large", MediaOrigin::Linked),
        ]
    );
    assert!(!artifacts.sanitized_body.contains("img.test"));

    let speech = &artifacts.projection.speech_text;
    assert!(speech.contains("Result"));
    assert!(speech.contains("Watch the demo."));
    assert!(!speech.contains("print"));
    assert!(!speech.contains("weigh"));
    for token in ["**", "#", "](", "```"] {
        assert!(!speech.contains(token), "speech kept {token:?}: {speech}");
    }

    let clipboard = view.clipboard_text();
    assert!(clipboard.contains("print('hi')"));
    assert!(!clipboard.contains("```"));

    let plan = view.render_plan();
    assert_eq!(plan[0].strategy, RenderStrategy::Passthrough);
    assert_eq!(plan[1].strategy, RenderStrategy::Prose);
    assert_eq!(plan[2].strategy, RenderStrategy::Prose);
    assert_eq!(
        plan[3].strategy,
        RenderStrategy::CodeBlock {
            language: Some("python".into())
        }
    );
}

#[test]
fn derivation_is_deterministic() {
    let raw = "Text ![a](a.png) [b](b.gif) <think>x</think> tail";
    let first = ReplyArtifacts::derive(raw, &markers());
    let second = ReplyArtifacts::derive(raw, &markers());
    assert_eq!(first, second);
}

#[test]
fn sanitize_is_idempotent_and_harvest_matches_removals() {
    let body = "a ![x](1.png) b [y](2.svg) c [![z](3.png)](4.png) d";
    let once = media::sanitize(body);
    assert_eq!(media::sanitize(&once), once);
    assert!(media::harvest(&once).is_empty());
    assert!(!media::harvest(body).is_empty());
}

#[test]
fn media_window_follows_viewport_per_call() {
    let raw = (1..=7)
        .map(|n| format!("![{n}](img{n}.png)"))
        .collect::<Vec<_>>()
        .join(" ");
    let view = ResponseView::new(ResponseContent::new("r", "m", raw), &markers());
    let bp = Breakpoints::default();

    for (width, visible, remainder) in [(320, 2, 5), (800, 3, 4), (1440, 4, 3)] {
        let window = view.media_window(width, &bp);
        assert_eq!(window.visible_count(), visible, "width {width}");
        assert_eq!(window.remainder(), remainder, "width {width}");
        let overlay = window.overlay().expect("overlay");
        assert_eq!(overlay.tile_index, visible - 1);
        assert_eq!(overlay.remainder, remainder);
    }
}
