//! Settings file discovery and loading.

use anyhow::{Context, Result};
use shared::settings::ClientSettings;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_BASE_URL: &str = "CHATLINE_BASE_URL";
pub const ENV_SCROLL: &str = "CHATLINE_SCROLL";

pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "Chatline", "chatline")
        .map(|proj| proj.config_dir().join("settings.json"))
}

/// Load settings from an explicit path (which must exist) or from the
/// default location, falling back to defaults when there is no file.
pub fn load_settings(explicit: Option<&Path>) -> Result<ClientSettings> {
    let mut settings = match explicit {
        Some(path) => read_settings(path)?,
        None => match config_path() {
            Some(path) if path.exists() => match read_settings(&path) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
                    ClientSettings::default()
                }
            },
            _ => ClientSettings::default(),
        },
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<ClientSettings> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

pub fn save_settings(path: &Path, settings: &ClientSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_vec_pretty(settings)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
        settings.base_url = url.trim().to_string();
    }
    if let Some(raw) = lookup(ENV_SCROLL) {
        match raw.parse() {
            Ok(policy) => settings.scroll_policy = policy,
            Err(e) => tracing::warn!(error = %e, "ignoring {}", ENV_SCROLL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::settings::ScrollPolicy;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = ClientSettings::default();
        settings.base_url = "https://chat.example.com".into();
        settings.scroll_policy = ScrollPolicy::Always;
        save_settings(&path, &settings).unwrap();

        let loaded = read_settings(&path).unwrap();
        assert_eq!(loaded.base_url, "https://chat.example.com");
        assert_eq!(loaded.scroll_policy, ScrollPolicy::Always);
        assert_eq!(loaded.presets, settings.presets);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(&mut settings, |key| match key {
            ENV_BASE_URL => Some(" http://10.0.0.2:9000 ".into()),
            ENV_SCROLL => Some("never".into()),
            _ => None,
        });
        assert_eq!(settings.base_url, "http://10.0.0.2:9000");
        assert_eq!(settings.scroll_policy, ScrollPolicy::Never);

        apply_env_overrides(&mut settings, |key| (key == ENV_SCROLL).then(|| "bogus".into()));
        assert_eq!(settings.scroll_policy, ScrollPolicy::Never);
    }
}
