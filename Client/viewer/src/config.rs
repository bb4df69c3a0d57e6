use layout_player::SessionConfig;
use std::path::Path;
use tracing::info;

/// Reads session settings from a YAML file; missing keys keep their defaults.
pub fn load_session_config(path: Option<&Path>) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
    let config = parse_session_config(&text)?;
    info!("Loaded session config from {}", path.display());
    Ok(config)
}

pub fn parse_session_config(text: &str) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    if text.trim().is_empty() {
        return Ok(SessionConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}
