use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const POLL_INTERVAL: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_command")]
    pub command: Vec<String>,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_unit")]
    pub pitch: f32,
    #[serde(default = "default_unit")]
    pub rate: f32,
    #[serde(default = "default_unit")]
    pub volume: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: default_speech_command(),
            voice_id: default_voice_id(),
            pitch: default_unit(),
            rate: default_unit(),
            volume: default_unit(),
        }
    }
}

fn default_speech_command() -> Vec<String> {
    [
        "espeak-ng", "-v", "%VOICE%", "-p", "%PITCH%", "-s", "%RATE%", "-a", "%VOLUME%",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

fn default_voice_id() -> String {
    "en".into()
}

fn default_unit() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub pitch: f32,
    pub rate: f32,
    pub volume: f32,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, config: &SpeechConfig) -> Self {
        Self {
            text: text.into(),
            voice_id: config.voice_id.clone(),
            pitch: config.pitch,
            rate: config.rate,
            volume: config.volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCompletion {
    pub utterance: u64,
    pub error: Option<String>,
}

/// External synthesizer. Completion is reported on `done` exactly once per accepted
/// utterance; `stop` is best effort.
pub trait SpeechEngine: Send + Sync {
    fn speak(
        &self,
        utterance: u64,
        request: SpeechRequest,
        done: Sender<SpeechCompletion>,
    ) -> Result<()>;
    fn stop(&self);
}

/// Tracks whether this reply is currently being read aloud.
pub struct SpeechPlayer {
    engine: Arc<dyn SpeechEngine>,
    speaking: bool,
    utterance: u64,
    done_tx: Sender<SpeechCompletion>,
    done_rx: Receiver<SpeechCompletion>,
}

impl SpeechPlayer {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            engine,
            speaking: false,
            utterance: 0,
            done_tx,
            done_rx,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Starts reading `request`. Anything already playing is stopped first.
    pub fn speak(&mut self, request: SpeechRequest) -> Result<()> {
        if request.text.trim().is_empty() {
            return Ok(());
        }
        if self.speaking {
            self.stop();
        }
        self.utterance += 1;
        self.speaking = true;
        if let Err(err) = self
            .engine
            .speak(self.utterance, request, self.done_tx.clone())
        {
            self.speaking = false;
            return Err(err);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.engine.stop();
        self.speaking = false;
    }

    /// Drains engine completions; returns true when playback just went idle.
    pub fn poll(&mut self) -> bool {
        let mut finished = false;
        while let Ok(completion) = self.done_rx.try_recv() {
            finished |= self.finish(completion);
        }
        finished
    }

    /// Blocks until the current utterance completes. Returns immediately when idle.
    pub fn wait_finished(&mut self) -> Option<SpeechCompletion> {
        while self.speaking {
            let completion = self.done_rx.recv().ok()?;
            let current = completion.utterance == self.utterance;
            self.finish(completion.clone());
            if current {
                return Some(completion);
            }
        }
        None
    }

    fn finish(&mut self, completion: SpeechCompletion) -> bool {
        if completion.utterance != self.utterance || !self.speaking {
            return false;
        }
        if let Some(err) = &completion.error {
            tracing::warn!(error = err.as_str(), "speech engine reported an error");
        }
        self.speaking = false;
        true
    }
}

/// Runs an external synthesizer such as `espeak-ng` for each utterance.
///
/// Arguments may contain `%TEXT%`, `%VOICE%`, `%PITCH%`, `%RATE%` and `%VOLUME%`. Numeric
/// placeholders are rendered in espeak-ng units: pitch 0-99, words per minute, amplitude
/// 0-200. Without a `%TEXT%` argument the text is written to the process stdin.
pub struct CommandSpeechEngine {
    command: Vec<String>,
    active: Mutex<Option<Sender<()>>>,
}

impl CommandSpeechEngine {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(anyhow!("speech: command not configured"));
        }
        Ok(Self {
            command,
            active: Mutex::new(None),
        })
    }

    fn render_args(&self, request: &SpeechRequest) -> (Vec<String>, bool) {
        let pitch = (request.pitch.clamp(0.0, 2.0) * 50.0).round().min(99.0) as u32;
        let rate = (request.rate.clamp(0.1, 10.0) * 175.0).round() as u32;
        let volume = (request.volume.clamp(0.0, 1.0) * 100.0).round() as u32;

        let mut uses_text_arg = false;
        let args = self.command[1..]
            .iter()
            .map(|arg| {
                if arg.contains("%TEXT%") {
                    uses_text_arg = true;
                }
                arg.replace("%TEXT%", &request.text)
                    .replace("%VOICE%", &request.voice_id)
                    .replace("%PITCH%", &pitch.to_string())
                    .replace("%RATE%", &rate.to_string())
                    .replace("%VOLUME%", &volume.to_string())
            })
            .collect();
        (args, uses_text_arg)
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn speak(
        &self,
        utterance: u64,
        request: SpeechRequest,
        done: Sender<SpeechCompletion>,
    ) -> Result<()> {
        let (args, text_in_args) = self.render_args(&request);
        let mut command = Command::new(&self.command[0]);
        command.args(&args);
        command.stdin(if text_in_args {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());

        tracing::debug!(program = self.command[0].as_str(), ?args, "starting speech");
        let mut child = command
            .spawn()
            .with_context(|| format!("speech: launch {}", self.command[0]))?;
        if !text_in_args {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(request.text.as_bytes())
                    .context("speech: write text to synthesizer")?;
            }
        }

        let (kill_tx, kill_rx) = bounded::<()>(1);
        *self.active.lock() = Some(kill_tx);

        thread::spawn(move || {
            let result = (|| -> Result<ExitStatus> {
                loop {
                    if kill_rx.try_recv().is_ok() {
                        let _ = child.kill();
                        return child.wait().context("wait for synthesizer after stop");
                    }
                    match child.try_wait() {
                        Ok(Some(status)) => return Ok(status),
                        Ok(None) => thread::sleep(POLL_INTERVAL),
                        Err(err) => return Err(anyhow!(err)).context("poll synthesizer"),
                    }
                }
            })();
            let error = match result {
                Ok(status) if status.success() => None,
                Ok(status) => Some(format!("synthesizer exited with {status}")),
                Err(err) => Some(format!("{err:#}")),
            };
            let _ = done.send(SpeechCompletion { utterance, error });
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(kill) = self.active.lock().take() {
            let _ = kill.send(());
        }
    }
}
