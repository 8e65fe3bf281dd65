use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Catalog configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub data_dir: PathBuf,

    // Refresh
    pub refresh_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub max_m3u_size_mb: usize,
    pub user_agent: String,

    // Runner
    pub playlist_url: String,
    pub playlist_name: String,
    pub logo_list_url: Option<String>,
    pub load_cache: bool,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Storage
            data_dir: env::var("CATALOG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),

            // Refresh
            refresh_timeout_ms: env::var("REFRESH_TIMEOUT_MS")
                .unwrap_or_else(|_| "300000".to_string())
                .parse()
                .unwrap_or(300_000), // 5 minutes

            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "300000".to_string())
                .parse()
                .unwrap_or(300_000), // 5 minutes

            max_m3u_size_mb: env::var("MAX_M3U_SIZE_MB")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),

            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),

            // Runner
            playlist_url: env::var("PLAYLIST_URL").unwrap_or_default(),
            playlist_name: env::var("PLAYLIST_NAME").unwrap_or_else(|_| "default".to_string()),
            logo_list_url: env::var("LOGO_LIST_URL").ok().filter(|v| !v.is_empty()),
            load_cache: env::var("LOAD_CACHE")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        }
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Same defaults as `from_env` without reading the environment
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            refresh_timeout_ms: 300_000,
            fetch_timeout_ms: 300_000,
            max_m3u_size_mb: 500,
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
            playlist_url: String::new(),
            playlist_name: "default".to_string(),
            logo_list_url: None,
            load_cache: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("ativeplay"))
        .unwrap_or_else(|| PathBuf::from(".ativeplay"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_data_dir_defaults() {
        let config = Config::with_data_dir("/tmp/catalog");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/catalog"));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(300));
        assert!(config.load_cache);
    }
}
