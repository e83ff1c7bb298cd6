use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Falls back to the first registered model when the request is empty or
    /// unknown, and says why.
    pub fn select_text(&self, requested: Option<&str>) -> Result<ModelSelection, String> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let fallback_reason = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.get(requested_value) {
                return Ok(ModelSelection {
                    model: model.clone(),
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            format!("Requested model '{requested_value}' is not available.")
        } else {
            "No model specified; using default.".to_string()
        };

        let Some(model) = self.registry.first().cloned() else {
            return Err("No text models are registered.".to_string());
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
