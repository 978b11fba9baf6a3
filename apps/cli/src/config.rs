use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".into(),
            poll_interval_secs: 3,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = std::fs::read_to_string("analyzer.toml") {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings);

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("server_url") {
            settings.server_url = v.clone();
        }
        if let Some(v) = file_cfg.get("poll_interval_secs") {
            if let Ok(parsed) = v.parse::<u64>() {
                settings.poll_interval_secs = parsed;
            }
        }
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var("ANALYZER_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("ANALYZER_POLL_INTERVAL_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.poll_interval_secs = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_replace_defaults() {
        let mut settings = Settings::default();
        apply_file_overrides(
            &mut settings,
            "server_url = \"http://10.0.0.5:9000\"\npoll_interval_secs = \"5\"\n",
        );
        assert_eq!(settings.server_url, "http://10.0.0.5:9000");
        assert_eq!(settings.poll_interval_secs, 5);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let mut settings = Settings::default();
        apply_file_overrides(&mut settings, "not toml at all [");
        assert_eq!(settings.server_url, Settings::default().server_url);
        assert_eq!(
            settings.poll_interval_secs,
            Settings::default().poll_interval_secs
        );
    }

    #[test]
    fn unparseable_interval_keeps_the_default() {
        let mut settings = Settings::default();
        apply_file_overrides(&mut settings, "poll_interval_secs = \"soon\"\n");
        assert_eq!(
            settings.poll_interval_secs,
            Settings::default().poll_interval_secs
        );
    }
}
