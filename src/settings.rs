use std::path::PathBuf;
use std::time::Duration;

/// Maximum script or require body size (10MB)
const DEFAULT_MAX_SCRIPT_BYTES: usize = 10 * 1024 * 1024;

/// Runtime settings for the launcher.
///
/// Every field has a default; `from_env` overrides individual fields from
/// `SCRIPT_LAUNCHER_*` variables and ignores values that fail to parse.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding `config.json`
    pub data_dir: PathBuf,
    /// Directory bundle artifacts are written to
    pub bundle_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub max_script_bytes: usize,
    pub user_agent: String,
    /// Delay between root/head appearing and `document-start` injection
    pub settle_delay: Duration,
    /// Poll interval while waiting for `document.body`
    pub body_poll_interval: Duration,
    /// Time after the first page-load signal before progress is forced to 100
    pub progress_fallback: Duration,
    /// Delay between reaching 100 and revealing the game window
    pub reveal_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("UserscriptLauncher"),
            bundle_dir: std::env::temp_dir(),
            fetch_timeout: Duration::from_secs(30),
            max_script_bytes: DEFAULT_MAX_SCRIPT_BYTES,
            user_agent: format!("UserscriptLauncher/{}", env!("CARGO_PKG_VERSION")),
            settle_delay: Duration::from_millis(50),
            body_poll_interval: Duration::from_millis(10),
            progress_fallback: Duration::from_secs(5),
            reveal_delay: Duration::from_millis(500),
        }
    }
}

impl Settings {
    /// Create settings from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(&format!("SCRIPT_LAUNCHER_{}", name));
        let number = |name: &str| var(name).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            bundle_dir: var("BUNDLE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.bundle_dir),
            fetch_timeout: number("FETCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            max_script_bytes: number("MAX_SCRIPT_BYTES")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_script_bytes),
            user_agent: var("USER_AGENT").unwrap_or(defaults.user_agent),
            settle_delay: number("SETTLE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            body_poll_interval: number("BODY_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.body_poll_interval),
            progress_fallback: number("PROGRESS_FALLBACK_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.progress_fallback),
            reveal_delay: number("REVEAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reveal_delay),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("SCRIPT_LAUNCHER_DATA_DIR", "/tmp/launcher"),
            ("SCRIPT_LAUNCHER_SETTLE_DELAY_MS", "120"),
            ("SCRIPT_LAUNCHER_BODY_POLL_MS", "fast"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.data_dir, PathBuf::from("/tmp/launcher"));
        assert_eq!(settings.config_path(), PathBuf::from("/tmp/launcher/config.json"));
        assert_eq!(settings.settle_delay, Duration::from_millis(120));
        assert_eq!(settings.body_poll_interval, Duration::from_millis(10));
        assert_eq!(settings.progress_fallback, Duration::from_secs(5));
    }
}
