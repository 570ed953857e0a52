use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use replyview::clipboard::{self, SystemClipboard};
use replyview::config::{self, LoadOptions};
use replyview::feedback::{Feedback, FeedbackCoordinator, FeedbackEvent, HttpFeedbackService};
use replyview::markdown::{self, Renderer};
use replyview::speech::{CommandSpeechEngine, SpeechPlayer};
use replyview::{ResponseContent, ResponseView};
use serde_json::json;

const DEFAULT_WIDTH: u32 = 1280;
const HELP: &str = "replyview - Render a model reply the way the comparison view shows it.

Usage: replyview [OPTIONS] [FILE]

Reads the raw reply from FILE, or stdin when FILE is omitted or '-'.

  --width <px>             Viewport width used to pick the media tier (default 1280)
  --expand                 Show every harvested media item
  --reasoning              Print the hidden reasoning under its disclosure line
  --json                   Print derived artifacts and the render plan as JSON
  --copy                   Copy the clipboard projection to the system clipboard
  --speak                  Read the speech projection aloud
  --like, --dislike        Submit feedback for this reply
  --response-id <id>       Identifier used for feedback (default \"local\")
  --model-id <id>          Model identifier reported in JSON output
  --config <path>          Config file (default: <config dir>/replyview/config.yaml)
  --version, -V            Show version and exit
  --help,    -h            Show this help message";

#[derive(Debug, Default)]
struct CliArgs {
    width: Option<u32>,
    expand: bool,
    reasoning: bool,
    json: bool,
    copy: bool,
    speak: bool,
    feedback: Option<Feedback>,
    response_id: Option<String>,
    model_id: Option<String>,
    config: Option<PathBuf>,
    input: Option<PathBuf>,
}

enum Invocation {
    Exit,
    Run(CliArgs),
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Exit) => return,
        Ok(Invocation::Run(args)) => args,
        Err(err) => {
            eprintln!("error: {err:?}\n\nRun with --help for usage.");
            std::process::exit(2);
        }
    };

    replyview::logging::init();

    if let Err(err) = run(args) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Invocation> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("replyview {}", replyview::VERSION);
                return Ok(Invocation::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Invocation::Exit);
            }
            "--width" => {
                let value = flag_value(&mut args, "--width")?;
                let width = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --width value: {value}"))?;
                parsed.width = Some(width);
            }
            "--expand" => parsed.expand = true,
            "--reasoning" => parsed.reasoning = true,
            "--json" => parsed.json = true,
            "--copy" => parsed.copy = true,
            "--speak" => parsed.speak = true,
            "--like" => parsed.feedback = Some(Feedback::Liked),
            "--dislike" => parsed.feedback = Some(Feedback::Disliked),
            "--response-id" => parsed.response_id = Some(flag_value(&mut args, "--response-id")?),
            "--model-id" => parsed.model_id = Some(flag_value(&mut args, "--model-id")?),
            "--config" => parsed.config = Some(PathBuf::from(flag_value(&mut args, "--config")?)),
            "-" => parsed.input = None,
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if parsed.input.is_some() {
                    bail!("only one input file may be given");
                }
                parsed.input = Some(PathBuf::from(other));
            }
        }
    }
    Ok(Invocation::Run(parsed))
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read reply from {}", path.display())),
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read reply from stdin")?;
            Ok(raw)
        }
    }
}

fn run(args: CliArgs) -> Result<()> {
    let cfg = config::load(LoadOptions {
        config_file: args.config.clone(),
        env_prefix: None,
    })?;
    let raw = read_input(args.input.as_ref())?;
    let response_id = args.response_id.clone().unwrap_or_else(|| "local".to_string());
    let content = ResponseContent::new(
        response_id.clone(),
        args.model_id.clone().unwrap_or_default(),
        raw,
    );
    let mut view = ResponseView::new(content, &cfg.reasoning);
    if args.expand {
        view.expand_media();
    }
    let width = args.width.unwrap_or(DEFAULT_WIDTH);

    if args.json {
        let window = view.media_window(width, &cfg.display);
        let (visible, overlay) = view.visible_media(width, &cfg.display);
        let report = json!({
            "response": view.content(),
            "artifacts": view.artifacts(),
            "window": window,
            "overlay": overlay,
            "visible_media": visible,
            "render_plan": view.render_plan(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        let text = Renderer::new(cfg.display.clone())
            .with_reasoning(args.reasoning)
            .render(&view, width);
        for line in markdown::plain_lines(&text) {
            println!("{line}");
        }
    }

    if args.copy {
        let mut sink = SystemClipboard::new()?;
        clipboard::copy_text(&mut sink, view.clipboard_text())?;
        eprintln!("Copied reply to clipboard.");
    }

    if args.speak {
        let engine = Arc::new(CommandSpeechEngine::new(cfg.speech.command.clone())?);
        let mut player = SpeechPlayer::new(engine);
        player.speak(view.speech_request(&cfg.speech))?;
        if let Some(completion) = player.wait_finished() {
            if let Some(err) = completion.error {
                eprintln!("speech: {err}");
            }
        }
    }

    if let Some(requested) = args.feedback {
        submit_feedback(&cfg.feedback, &response_id, requested)?;
    }

    Ok(())
}

fn submit_feedback(
    cfg: &config::FeedbackConfig,
    response_id: &str,
    requested: Feedback,
) -> Result<()> {
    let service = HttpFeedbackService::new(&cfg.endpoint, cfg.timeout)?;
    let mut coordinator = FeedbackCoordinator::new(Arc::new(service));
    coordinator.request(response_id, requested);
    match coordinator.wait_event(cfg.timeout + Duration::from_secs(1)) {
        Some(FeedbackEvent::Applied { value, .. }) => {
            eprintln!("Feedback recorded: {}", value.label());
            Ok(())
        }
        Some(FeedbackEvent::Failed { message, .. }) => Err(anyhow!(message)),
        None => Err(anyhow!("feedback: no reply before timeout")),
    }
}
