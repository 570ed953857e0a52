use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::segment::ReasoningMarkers;
use crate::speech::SpeechConfig;
use crate::window::Breakpoints;

const DEFAULT_ENV_PREFIX: &str = "REPLYVIEW";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reasoning: ReasoningMarkers,
    #[serde(default)]
    pub display: Breakpoints,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_feedback_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: default_feedback_timeout(),
        }
    }
}

fn default_feedback_timeout() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.reasoning.open.is_empty() {
        base.reasoning.open = other.reasoning.open;
    }
    if !other.reasoning.close.is_empty() {
        base.reasoning.close = other.reasoning.close;
    }

    if other.display.medium != 0 {
        base.display.medium = other.display.medium;
    }
    if other.display.large != 0 {
        base.display.large = other.display.large;
    }
    if other.display.small_limit != 0 {
        base.display.small_limit = other.display.small_limit;
    }
    if other.display.medium_limit != 0 {
        base.display.medium_limit = other.display.medium_limit;
    }
    if other.display.large_limit != 0 {
        base.display.large_limit = other.display.large_limit;
    }

    if !other.speech.command.is_empty() {
        base.speech.command = other.speech.command;
    }
    if !other.speech.voice_id.is_empty() {
        base.speech.voice_id = other.speech.voice_id;
    }
    base.speech.pitch = other.speech.pitch;
    base.speech.rate = other.speech.rate;
    base.speech.volume = other.speech.volume;

    if !other.feedback.endpoint.is_empty() {
        base.feedback.endpoint = other.feedback.endpoint;
    }
    base.feedback.timeout = other.feedback.timeout;

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reasoning.open" => {
            if !value.is_empty() {
                cfg.reasoning.open = value;
            }
        }
        "reasoning.close" => {
            if !value.is_empty() {
                cfg.reasoning.close = value;
            }
        }
        "display.medium" => set_parsed(&mut cfg.display.medium, &value),
        "display.large" => set_parsed(&mut cfg.display.large, &value),
        "display.small_limit" => set_parsed(&mut cfg.display.small_limit, &value),
        "display.medium_limit" => set_parsed(&mut cfg.display.medium_limit, &value),
        "display.large_limit" => set_parsed(&mut cfg.display.large_limit, &value),
        "speech.command" => {
            cfg.speech.command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "speech.voice_id" => cfg.speech.voice_id = value,
        "speech.pitch" => set_parsed(&mut cfg.speech.pitch, &value),
        "speech.rate" => set_parsed(&mut cfg.speech.rate, &value),
        "speech.volume" => set_parsed(&mut cfg.speech.volume, &value),
        "feedback.endpoint" => cfg.feedback.endpoint = value.trim().to_string(),
        "feedback.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feedback.timeout = duration;
            }
        }
        _ => {}
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
    if let Ok(parsed) = value.trim().parse::<T>() {
        *slot = parsed;
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("replyview").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated(config_file: PathBuf, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(config_file),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("missing.yaml"), "RV_TEST_DEFAULTS")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.reasoning.open, "<think>");
        assert_eq!(cfg.display.large_limit, 4);
        assert_eq!(cfg.feedback.timeout, Duration::from_secs(15));
    }

    #[test]
    fn file_values_are_merged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "reasoning:\n  open: \"<r>\"\n  close: \"</r>\"\ndisplay:\n  medium: 600\nspeech:\n  voice_id: en-gb\n  rate: 1.5\nfeedback:\n  endpoint: https://api.test/feedback\n  timeout: 3s\n",
        )
        .unwrap();
        let cfg = load(isolated(path, "RV_TEST_FILE")).unwrap();
        assert_eq!(cfg.reasoning, ReasoningMarkers::new("<r>", "</r>"));
        assert_eq!(cfg.display.medium, 600);
        assert_eq!(cfg.display.large, 1024);
        assert_eq!(cfg.speech.voice_id, "en-gb");
        assert_eq!(cfg.speech.rate, 1.5);
        assert_eq!(cfg.speech.pitch, 1.0);
        assert_eq!(cfg.feedback.endpoint, "https://api.test/feedback");
        assert_eq!(cfg.feedback.timeout, Duration::from_secs(3));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "display: [not, a, map]").unwrap();
        assert!(load(isolated(path, "RV_TEST_BAD")).is_err());
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("RV_TEST_ENV_DISPLAY__LARGE_LIMIT", "6");
        env::set_var("RV_TEST_ENV_SPEECH__COMMAND", "say, %TEXT%");
        env::set_var("RV_TEST_ENV_FEEDBACK__TIMEOUT", "250ms");
        env::set_var("RV_TEST_ENV_DISPLAY__MEDIUM", "not-a-number");
        let cfg = load(isolated(dir.path().join("none.yaml"), "RV_TEST_ENV")).unwrap();
        env::remove_var("RV_TEST_ENV_DISPLAY__LARGE_LIMIT");
        env::remove_var("RV_TEST_ENV_SPEECH__COMMAND");
        env::remove_var("RV_TEST_ENV_FEEDBACK__TIMEOUT");
        env::remove_var("RV_TEST_ENV_DISPLAY__MEDIUM");

        assert_eq!(cfg.display.large_limit, 6);
        assert_eq!(cfg.display.medium, 768);
        assert_eq!(cfg.speech.command, vec!["say", "%TEXT%"]);
        assert_eq!(cfg.feedback.timeout, Duration::from_millis(250));
    }
}
