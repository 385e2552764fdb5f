//! Named model presets and capability checks.

use shared::api::ModelInfo;
use shared::chat::Attachment;
use shared::settings::{ClientSettings, PresetBinding};
use shared::ChatError;
use std::collections::HashMap;

pub struct PresetRegistry {
    presets: Vec<PresetBinding>,
    models: HashMap<String, ModelInfo>,
}

impl PresetRegistry {
    pub fn new(presets: Vec<PresetBinding>, models: Vec<ModelInfo>) -> Self {
        let mut registry = Self {
            presets,
            models: HashMap::new(),
        };
        registry.set_models(models);
        registry
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.presets.clone(), settings.models.clone())
    }

    pub fn presets(&self) -> &[PresetBinding] {
        &self.presets
    }

    pub fn resolve(&self, slot: &str) -> Result<&PresetBinding, ChatError> {
        self.presets
            .iter()
            .find(|p| p.slot == slot)
            .ok_or_else(|| ChatError::UnknownPreset(slot.to_string()))
    }

    /// Replace the capability catalogue, e.g. after fetching `/api/models`.
    pub fn set_models(&mut self, models: Vec<ModelInfo>) {
        self.models = models.into_iter().map(|m| (m.id.clone(), m)).collect();
    }

    pub fn model(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    /// Reject attachments the model can't take. Models missing from the
    /// catalogue are let through; the server has the final say.
    pub fn check_attachments(
        &self,
        model_id: &str,
        attachments: &[Attachment],
    ) -> Result<(), ChatError> {
        let Some(info) = self.model(model_id) else {
            tracing::debug!(model = model_id, "no capability data, skipping attachment check");
            return Ok(());
        };
        let reject = |reason: &str| ChatError::Capability {
            model: model_id.to_string(),
            reason: reason.to_string(),
        };
        if !info.supports_pdf && attachments.iter().any(|a| !a.is_image()) {
            return Err(reject("this model does not support PDF attachments"));
        }
        if !info.supports_images && attachments.iter().any(Attachment::is_image) {
            return Err(reject("this model does not support image attachments"));
        }
        Ok(())
    }

    /// Presets whose model can take the given attachments.
    pub fn compatible(&self, attachments: &[Attachment]) -> Vec<&PresetBinding> {
        self.presets
            .iter()
            .filter(|p| self.check_attachments(&p.model_id, attachments).is_ok())
            .collect()
    }
}
