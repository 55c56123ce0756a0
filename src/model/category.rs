use crate::error::{Error, ErrorType, Result};
use crate::model::record::IdVisitor;
use crate::utils;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// The identity of a category, e.g. `food`. Referenced by records through their `categoryId`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CategoryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CategoryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for CategoryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CategoryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor).map(CategoryId)
    }
}

/// Expense and income categories live in separate namespaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    #[default]
    Expense,
    Income,
}

serde_plain::derive_display_from_serialize!(CategoryKind);
serde_plain::derive_fromstr_from_deserialize!(CategoryKind);

/// A named, colored category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    id: CategoryId,
    name: String,
    #[serde(default = "default_color")]
    color: String,
}

impl Category {
    /// Creates a category with a known id. Used for the built-in defaults.
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
        }
    }

    /// Creates a category with a fresh id, rejecting a blank name or a name that already exists in
    /// `existing` when compared case-insensitively.
    pub fn create(name: &str, color: Option<&str>, existing: &[Category]) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::msg(
                ErrorType::Validation,
                "Please enter a category name",
            ));
        }
        let lower = name.to_lowercase();
        if existing.iter().any(|c| c.name.to_lowercase() == lower) {
            return Err(Error::msg(
                ErrorType::DuplicateCategory,
                format!("Category '{name}' already exists"),
            ));
        }
        Ok(Self {
            id: CategoryId(utils::generate_id()),
            name: name.to_string(),
            color: color.map(str::to_string).unwrap_or_else(default_color),
        })
    }

    pub fn id(&self) -> &CategoryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> &str {
        &self.color
    }
}

fn default_color() -> String {
    "#cccccc".to_string()
}

/// The expense categories a new ledger starts with.
pub fn default_expense_categories() -> Vec<Category> {
    vec![
        Category::new("food", "Food & Dining", "#ff6b6b"),
        Category::new("transport", "Transportation", "#4ecdc4"),
        Category::new("utilities", "Utilities", "#45b7d1"),
        Category::new("healthcare", "Healthcare", "#96ceb4"),
        Category::new("entertainment", "Entertainment", "#feca57"),
        Category::new("shopping", "Shopping", "#ff9ff3"),
        Category::new("business", "Business", "#54a0ff"),
        Category::new("other", "Other", "#5f27cd"),
    ]
}

/// The income categories a new ledger starts with.
pub fn default_income_categories() -> Vec<Category> {
    vec![
        Category::new("salary", "Salary", "#51cf66"),
        Category::new("freelance", "Freelance", "#339af0"),
        Category::new("investment", "Investment", "#fcc419"),
        Category::new("business", "Business", "#845ef7"),
        Category::new("other", "Other", "#868e96"),
    ]
}
