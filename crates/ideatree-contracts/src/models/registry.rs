use indexmap::IndexMap;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn first(&self) -> Option<&ModelSpec> {
        self.models.values().next()
    }
}

// Registry order is selection order: the first model is the default.
fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
            },
        );
    };

    insert(DEFAULT_TEXT_MODEL, "gemini");
    insert("gemini-2.5-pro", "gemini");
    insert("gemini-2.0-flash", "gemini");
    insert("gpt-4o-mini", "openai");
    insert("gpt-4.1-mini", "openai");
    insert("dryrun-text-1", "dryrun");

    map
}
