use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Typed configuration for the bot process.
#[derive(Clone, Debug)]
pub struct Config {
    // Secrets
    pub telegram_bot_token: String,
    pub gemini_api_key: String,

    // Backend
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout: Duration,

    // Storage
    pub history_db_path: PathBuf,

    // Follow-ups
    pub followup: FollowupConfig,

    // Outbound flood control
    pub throttle_global: Duration,
    pub throttle_per_chat: Duration,
}

/// Tuning for the decaying follow-up chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FollowupConfig {
    pub initial_probability: f64,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            initial_probability: 0.5,
            delay_min: Duration::from_secs(2),
            delay_max: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let gemini_api_key = env_str("GEMINI_API_KEY")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("GEMINI_API_KEY environment variable is required".to_string())
            })?;

        let gemini_model = env_str("GEMINI_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_base_url = env_str("GEMINI_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
        let gemini_timeout = Duration::from_secs(env_u64("GEMINI_TIMEOUT_SECS").unwrap_or(60));

        let history_db_path = env_path("HISTORY_DB_PATH")
            .unwrap_or_else(|| PathBuf::from("chat_history.db"));

        let followup = followup_from_parts(
            env_f64("FOLLOWUP_INITIAL_PROBABILITY"),
            env_u64("FOLLOWUP_DELAY_MIN_SECS"),
            env_u64("FOLLOWUP_DELAY_MAX_SECS"),
        );

        let throttle_global = Duration::from_millis(env_u64("THROTTLE_GLOBAL_MS").unwrap_or(40));
        let throttle_per_chat =
            Duration::from_millis(env_u64("THROTTLE_PER_CHAT_MS").unwrap_or(1050));

        Ok(Self {
            telegram_bot_token,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            gemini_timeout,
            history_db_path,
            followup,
            throttle_global,
            throttle_per_chat,
        })
    }
}

fn followup_from_parts(
    probability: Option<f64>,
    min_secs: Option<u64>,
    max_secs: Option<u64>,
) -> FollowupConfig {
    let defaults = FollowupConfig::default();

    let initial_probability = probability
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 1.0))
        .unwrap_or(defaults.initial_probability);

    let mut delay_min = min_secs.map(Duration::from_secs).unwrap_or(defaults.delay_min);
    let mut delay_max = max_secs.map(Duration::from_secs).unwrap_or(defaults.delay_max);
    if delay_max < delay_min {
        std::mem::swap(&mut delay_min, &mut delay_max);
    }

    FollowupConfig {
        initial_probability,
        delay_min,
        delay_max,
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key).and_then(|s| s.trim().parse::<f64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# secrets\nTELEGRAM_BOT_TOKEN=\"123:abc\"\nexport GEMINI_API_KEY='k'\n\nBROKEN\n=novalue\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string()),
                ("GEMINI_API_KEY".to_string(), "k".to_string()),
            ]
        );
    }

    #[test]
    fn followup_defaults_match_chain_constants() {
        let cfg = followup_from_parts(None, None, None);
        assert_eq!(cfg, FollowupConfig::default());
        assert_eq!(cfg.initial_probability, 0.5);
        assert_eq!(cfg.delay_min, Duration::from_secs(2));
        assert_eq!(cfg.delay_max, Duration::from_secs(10));
    }

    #[test]
    fn followup_probability_is_clamped_and_delays_ordered() {
        let cfg = followup_from_parts(Some(3.0), Some(12), Some(4));
        assert_eq!(cfg.initial_probability, 1.0);
        assert_eq!(cfg.delay_min, Duration::from_secs(4));
        assert_eq!(cfg.delay_max, Duration::from_secs(12));

        let cfg = followup_from_parts(Some(f64::NAN), None, None);
        assert_eq!(cfg.initial_probability, 0.5);
    }
}
