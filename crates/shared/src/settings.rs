use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::ModelInfo;

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_timeout() -> u64 {
    120
}

fn default_near_bottom() -> f32 {
    48.0
}

fn default_collapse_threshold() -> f32 {
    200.0
}

fn default_presets() -> Vec<PresetBinding> {
    vec![
        PresetBinding::new("fast", "gpt-4o-mini", "Fast"),
        PresetBinding::new("smart", "gpt-4o", "Smart"),
        PresetBinding::new("reasoning", "o3-mini", "Reasoning"),
        PresetBinding::new("vision", "gemini-1.5-flash", "Vision"),
    ]
}

/// How the chat view follows streamed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPolicy {
    /// Always jump to the bottom after an update.
    Always,
    /// Follow only when the view was already near the bottom.
    #[default]
    WhenNearBottom,
    Never,
}

impl FromStr for ScrollPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(ScrollPolicy::Always),
            "when_near_bottom" | "near_bottom" => Ok(ScrollPolicy::WhenNearBottom),
            "never" => Ok(ScrollPolicy::Never),
            other => Err(format!("unknown scroll policy: {}", other)),
        }
    }
}

/// A named slot bound to a model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetBinding {
    pub slot: String,
    pub model_id: String,
    #[serde(default)]
    pub label: String,
}

impl PresetBinding {
    fn new(slot: &str, model_id: &str, label: &str) -> Self {
        Self {
            slot: slot.into(),
            model_id: model_id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub scroll_policy: ScrollPolicy,
    /// Distance from the bottom (px) still counted as "at the bottom".
    #[serde(default = "default_near_bottom")]
    pub near_bottom_px: f32,
    #[serde(default = "default_collapse_threshold")]
    pub collapse_threshold_px: f32,
    /// Preset selected at startup.
    #[serde(default)]
    pub default_preset: Option<String>,
    #[serde(default = "default_presets")]
    pub presets: Vec<PresetBinding>,
    /// Capabilities used until the live model list has been fetched.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_timeout(),
            scroll_policy: ScrollPolicy::default(),
            near_bottom_px: default_near_bottom(),
            collapse_threshold_px: default_collapse_threshold(),
            default_preset: Some("fast".into()),
            presets: default_presets(),
            models: vec![
                ModelInfo {
                    id: "gpt-4o-mini".into(),
                    name: "GPT-4o mini".into(),
                    supports_images: true,
                    supports_pdf: false,
                    supports_reasoning: false,
                },
                ModelInfo {
                    id: "gpt-4o".into(),
                    name: "GPT-4o".into(),
                    supports_images: true,
                    supports_pdf: true,
                    supports_reasoning: false,
                },
                ModelInfo {
                    id: "o3-mini".into(),
                    name: "o3-mini".into(),
                    supports_images: false,
                    supports_pdf: false,
                    supports_reasoning: true,
                },
                ModelInfo {
                    id: "gemini-1.5-flash".into(),
                    name: "Gemini 1.5 Flash".into(),
                    supports_images: true,
                    supports_pdf: true,
                    supports_reasoning: false,
                },
            ],
        }
    }
}
