use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jurisdiction {
    pub name: &'static str,
    pub reference_url: &'static str,
}

pub const JURISDICTIONS: &[Jurisdiction] = &[
    Jurisdiction {
        name: "Taiwan",
        reference_url: "https://www.fda.gov.tw/",
    },
    Jurisdiction {
        name: "Hong Kong",
        reference_url: "https://www.cfs.gov.hk/",
    },
    Jurisdiction {
        name: "Mainland China",
        reference_url: "https://www.samr.gov.cn/",
    },
    Jurisdiction {
        name: "Japan",
        reference_url: "https://www.mhlw.go.jp/",
    },
    Jurisdiction {
        name: "South Korea",
        reference_url: "https://www.mfds.go.kr/",
    },
    Jurisdiction {
        name: "Singapore",
        reference_url: "https://www.sfa.gov.sg/",
    },
    Jurisdiction {
        name: "Malaysia",
        reference_url: "https://www.moh.gov.my/",
    },
    Jurisdiction {
        name: "Thailand",
        reference_url: "https://www.fda.moph.go.th/",
    },
    Jurisdiction {
        name: "United States",
        reference_url: "https://www.fda.gov/food/food-additives-petitions/food-additive-status-list",
    },
    Jurisdiction {
        name: "European Union",
        reference_url: "https://food.ec.europa.eu/safety/food-improvement-agents/additives/database_en",
    },
    Jurisdiction {
        name: "Codex Alimentarius",
        reference_url: "https://www.fao.org/gsfaonline/",
    },
];

pub fn jurisdiction(name: &str) -> Option<&'static Jurisdiction> {
    let wanted = name.trim();
    JURISDICTIONS
        .iter()
        .find(|item| item.name.eq_ignore_ascii_case(wanted))
}

pub fn jurisdiction_names() -> Vec<&'static str> {
    JURISDICTIONS.iter().map(|item| item.name).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub dish: String,
    pub ingredients: Vec<String>,
    pub additives: Vec<String>,
    pub steps: Vec<String>,
}

impl Recipe {
    /// Best-effort read of a recipe payload; `concept` names the dish when
    /// the payload does not.
    pub fn from_value(value: &Value, concept: &str) -> Self {
        let empty = Map::new();
        let object = recipe_object(value).unwrap_or(&empty);
        let dish = ["dish", "name", "title"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(|value| {
                value
                    .as_str()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| concept.trim().to_string());
        Self {
            dish,
            ingredients: coerce_text_list(first_of(object, &["ingredients"])),
            additives: coerce_text_list(first_of(object, &["additives", "food_additives"])),
            steps: coerce_text_list(first_of(object, &["steps", "method", "instructions"])),
        }
    }
}

fn recipe_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => match map.get("recipe") {
            Some(Value::Object(inner)) => Some(inner),
            _ => Some(map),
        },
        Value::Array(items) => items.iter().find_map(Value::as_object),
        _ => None,
    }
}

fn first_of<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

fn coerce_text_list(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let raw_items: Vec<String> = match value {
        Value::Array(rows) => rows.iter().filter_map(item_text).collect(),
        Value::String(text) => text.split([',', '\n']).map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut cleaned: Vec<String> = Vec::new();
    for row in raw_items {
        let text = row.split_whitespace().collect::<Vec<&str>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if cleaned
            .iter()
            .any(|existing| existing.to_lowercase() == text.to_lowercase())
        {
            continue;
        }
        cleaned.push(text);
    }
    cleaned
}

fn item_text(item: &Value) -> Option<String> {
    match item {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => ["name", "title", "additive", "ingredient", "step"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub const REGULATION_COLUMNS: [&str; 6] = [
    "country",
    "additive",
    "allowed",
    "max_quantity",
    "food_category",
    "source",
];

const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("allowed", "allowed"),
    ("allowed_status", "allowed"),
    ("status", "allowed"),
    ("permitted", "allowed"),
    ("max_quantity", "max_quantity"),
    ("max_level", "max_quantity"),
    ("maximum", "max_quantity"),
    ("limit", "max_quantity"),
    ("food_category", "food_category"),
    ("category", "food_category"),
    ("scope", "food_category"),
    ("source", "source"),
    ("reference", "source"),
    ("url", "source"),
];

fn canonical_column(key: &str) -> Option<&'static str> {
    let lowered = key.trim().to_ascii_lowercase();
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| *canonical)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegulationRow {
    cells: IndexMap<String, String>,
}

impl RegulationRow {
    /// Builds a row from one lookup response. Country and additive always
    /// come from the lookup itself, never from the model.
    pub fn from_response(country: &str, additive: &str, response: &Value) -> Self {
        let mut cells = IndexMap::new();
        cells.insert("country".to_string(), country.to_string());
        cells.insert("additive".to_string(), additive.to_string());
        if let Some(object) = response_object(response) {
            for (key, value) in object {
                let Some(column) = canonical_column(key) else {
                    continue;
                };
                if cells.contains_key(column) {
                    continue;
                }
                if let Some(text) = cell_text(value) {
                    cells.insert(column.to_string(), text);
                }
            }
        }
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn has(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }
}

fn response_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if map.keys().any(|key| canonical_column(key).is_some()) {
                return Some(map);
            }
            ["results", "nodes", "rows"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
                .and_then(|rows| rows.iter().find_map(Value::as_object))
                .or(Some(map))
        }
        Value::Array(items) => items.iter().find_map(Value::as_object),
        _ => None,
    }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}

/// Lookup results projected onto the recognized columns that occur in at
/// least one row, in canonical column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulationTable {
    pub columns: Vec<String>,
    pub rows: Vec<RegulationRow>,
}

impl RegulationTable {
    pub fn from_rows(rows: Vec<RegulationRow>) -> Self {
        let columns = REGULATION_COLUMNS
            .iter()
            .filter(|column| rows.iter().any(|row| row.has(column)))
            .map(|column| (*column).to_string())
            .collect();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|row| row.get(column))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeAnalysis {
    pub concept: String,
    pub recipe: Recipe,
    pub countries: Vec<String>,
    pub table: RegulationTable,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        jurisdiction, Recipe, RecipeAnalysis, RegulationRow, RegulationTable, JURISDICTIONS,
    };

    #[test]
    fn jurisdiction_lookup_is_case_insensitive() {
        assert_eq!(jurisdiction(" japan ").map(|item| item.name), Some("Japan"));
        assert!(jurisdiction("Atlantis").is_none());
        assert!(JURISDICTIONS
            .iter()
            .all(|item| item.reference_url.starts_with("https://")));
    }

    #[test]
    fn recipe_reads_mixed_item_shapes() {
        let recipe = Recipe::from_value(
            &json!({
                "dish": "Matcha Mochi Roll",
                "ingredients": ["glutinous rice flour", {"name": "matcha powder"}, "  "],
                "additives": "sorbitol, Sorbitol, gardenia yellow",
                "steps": [{"step": "steam"}, "roll"]
            }),
            "matcha dessert",
        );
        assert_eq!(recipe.dish, "Matcha Mochi Roll");
        assert_eq!(recipe.ingredients, vec!["glutinous rice flour", "matcha powder"]);
        assert_eq!(recipe.additives, vec!["sorbitol", "gardenia yellow"]);
        assert_eq!(recipe.steps, vec!["steam", "roll"]);
    }

    #[test]
    fn recipe_falls_back_to_concept_name() {
        let recipe = Recipe::from_value(&json!({"recipe": {"additives": ["E330"]}}), " yuzu soda ");
        assert_eq!(recipe.dish, "yuzu soda");
        assert_eq!(recipe.additives, vec!["E330"]);

        let nothing = Recipe::from_value(&json!("just prose"), "tea");
        assert_eq!(nothing.dish, "tea");
        assert!(nothing.additives.is_empty());
    }

    #[test]
    fn row_folds_aliases_and_pins_lookup_keys() {
        let row = RegulationRow::from_response(
            "Japan",
            "sorbitol",
            &json!({
                "country": "Narnia",
                "status": "permitted",
                "max_level": 30,
                "category": "confectionery",
                "notes": "ignored"
            }),
        );
        assert_eq!(row.get("country"), Some("Japan"));
        assert_eq!(row.get("additive"), Some("sorbitol"));
        assert_eq!(row.get("allowed"), Some("permitted"));
        assert_eq!(row.get("max_quantity"), Some("30"));
        assert_eq!(row.get("food_category"), Some("confectionery"));
        assert!(!row.has("source"));
        assert!(!row.has("notes"));
    }

    #[test]
    fn row_reads_first_object_from_wrapped_results() {
        let row = RegulationRow::from_response(
            "Taiwan",
            "E202",
            &json!({"results": [{"allowed": true, "source": " https://example.test "}]}),
        );
        assert_eq!(row.get("allowed"), Some("true"));
        assert_eq!(row.get("source"), Some("https://example.test"));
    }

    #[test]
    fn analysis_serializes_rows_as_ordered_objects() -> anyhow::Result<()> {
        let table = RegulationTable::from_rows(vec![RegulationRow::from_response(
            "Japan",
            "sorbitol",
            &json!({"limit": "none", "allowed": "yes"}),
        )]);
        let analysis = RecipeAnalysis {
            concept: "matcha mochi".to_string(),
            countries: vec!["Japan".to_string()],
            table,
            ..RecipeAnalysis::default()
        };

        let text = serde_json::to_string(&analysis)?;
        assert!(text.contains(
            r#""rows":[{"country":"Japan","additive":"sorbitol","max_quantity":"none","allowed":"yes"}]"#
        ));
        let back: RecipeAnalysis = serde_json::from_str(&text)?;
        assert_eq!(back, analysis);
        Ok(())
    }

    #[test]
    fn table_keeps_only_columns_present_in_some_row() {
        let rows = vec![
            RegulationRow::from_response("Japan", "a", &json!({"allowed": "yes"})),
            RegulationRow::from_response("Taiwan", "a", &json!({"source": "ref"})),
            RegulationRow::from_response("Korea", "a", &json!("not an object")),
        ];
        let table = RegulationTable::from_rows(rows);
        assert_eq!(table.columns, vec!["country", "additive", "allowed", "source"]);
        assert_eq!(table.cell(0, "source"), "");
        assert_eq!(table.cell(1, "source"), "ref");
        assert_eq!(table.cell(2, "country"), "Korea");
        assert_eq!(table.cell(9, "country"), "");
    }
}
