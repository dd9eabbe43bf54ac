use dotenv::dotenv;
use std::path::PathBuf;

/// Service-level settings read from the environment.
pub struct Config {
    /// Base directory under which user workspaces are created.
    pub workspaces_base: PathBuf,
    /// When true, a sources manifest is written next to each generated config.
    pub config_debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv().ok();

        Ok(Config {
            workspaces_base: std::env::var("BOTFORGE_WS_BASE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./workspaces")),
            config_debug: std::env::var("BOTFORGE_CONFIG_DEBUG")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<i32>()
                .map(|v| v != 0)
                .unwrap_or(false),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspaces_base: PathBuf::from("./workspaces"),
            config_debug: false,
        }
    }
}
