use std::env;

const DEFAULT_BASE_URL: &str = "https://edgeprobe-demo.workers.dev";
const BASE_URL_ENV: &str = "EDGEPROBE_BASE_URL";

/// Where the remote edge endpoint lives. Only used to derive the two
/// endpoint URLs; everything else about a run is fixed by the engine.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    /// Settings with the base URL taken from `EDGEPROBE_BASE_URL`,
    /// falling back to the built-in default.
    pub fn from_env() -> Self {
        match env::var(BASE_URL_ENV) {
            Ok(base_url) if !base_url.is_empty() => Self { base_url },
            _ => Self::default(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.base_url.trim_end_matches('/'))
    }

    pub fn down_url(&self) -> String {
        format!("{}/down", self.base_url.trim_end_matches('/'))
    }
}
