use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "MEDIOS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_video_command")]
    pub video_command: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: default_video_command(),
        }
    }
}

fn default_video_command() -> Vec<String> {
    vec!["mpv".into(), "--fs".into(), "%URL%".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeConfig {
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
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
    cfg = apply_env(cfg, prefix);

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
    if !other.supabase.url.is_empty() {
        base.supabase.url = other.supabase.url;
    }
    if !other.supabase.key.is_empty() {
        base.supabase.key = other.supabase.key;
    }

    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    if !other.player.video_command.is_empty() {
        base.player.video_command = other.player.video_command;
    }

    base.realtime.enabled = other.realtime.enabled;
    if !other.realtime.reconnect_delay.is_zero() {
        base.realtime.reconnect_delay = other.realtime.reconnect_delay;
    }

    base.log.debug = other.log.debug;
    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }

    base
}

fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "supabase.url" => cfg.supabase.url = value,
        "supabase.key" => cfg.supabase.key = value,
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                if parsed > 0 {
                    cfg.feed.page_size = parsed;
                }
            }
        }
        "ui.theme" => cfg.ui.theme = value,
        "player.video_command" => {
            cfg.player.video_command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "realtime.enabled" => {
            cfg.realtime.enabled = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "realtime.reconnect_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.realtime.reconnect_delay = duration;
            }
        }
        "log.debug" => {
            cfg.log.debug = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("medios-tui").join("config.yaml"))
}

pub fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("medios-tui").join("medios-tui.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("MEDIOS_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.feed.page_size, 20);
        assert!(cfg.realtime.enabled);
        assert_eq!(cfg.realtime.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "supabase:\n  url: https://proj.supabase.co\n  key: anon-key\nfeed:\n  page_size: 50\nrealtime:\n  enabled: false\n  reconnect_delay: 30s\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("MEDIOS_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.supabase.url, "https://proj.supabase.co");
        assert_eq!(cfg.supabase.key, "anon-key");
        assert_eq!(cfg.feed.page_size, 50);
        assert!(!cfg.realtime.enabled);
        assert_eq!(cfg.realtime.reconnect_delay, Duration::from_secs(30));
    }

    #[test]
    fn env_overrides() {
        env::set_var("MEDIOS_TESTENV_SUPABASE__URL", "https://env.supabase.co");
        env::set_var("MEDIOS_TESTENV_FEED__PAGE_SIZE", "5");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("MEDIOS_TESTENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.supabase.url, "https://env.supabase.co");
        assert_eq!(cfg.feed.page_size, 5);
        env::remove_var("MEDIOS_TESTENV_SUPABASE__URL");
        env::remove_var("MEDIOS_TESTENV_FEED__PAGE_SIZE");
    }
}
