//! Types that represent the ledger data model, such as `Expense`, `Category` and the
//! `LedgerSnapshot` that is persisted and transferred as a whole.
mod amount;
mod category;
mod record;

pub use amount::{Amount, AmountError};
pub use category::{
    default_expense_categories, default_income_categories, Category, CategoryId, CategoryKind,
};
pub use record::{
    Expense, ExpenseFields, Income, IncomeFields, Payment, PettyCashEntry, PettyCashFields,
    PettyCashKind, Record, RecordId,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The complete set of ledger collections at one instant. This is the unit of persistence and of
/// remote transfer; it is never partially written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub(crate) expenses: Vec<Expense>,
    #[serde(default)]
    pub(crate) income: Vec<Income>,
    #[serde(default)]
    pub(crate) petty_cash: Vec<PettyCashEntry>,
    #[serde(default = "default_expense_categories")]
    pub(crate) categories: Vec<Category>,
    #[serde(default = "default_income_categories")]
    pub(crate) income_categories: Vec<Category>,
    #[serde(default = "Utc::now")]
    pub(crate) last_updated: DateTime<Utc>,
}

impl Default for LedgerSnapshot {
    /// An empty ledger with the default categories.
    fn default() -> Self {
        Self {
            expenses: Vec::new(),
            income: Vec::new(),
            petty_cash: Vec::new(),
            categories: default_expense_categories(),
            income_categories: default_income_categories(),
            last_updated: Utc::now(),
        }
    }
}

impl LedgerSnapshot {
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn income(&self) -> &[Income] {
        &self.income
    }

    pub fn petty_cash(&self) -> &[PettyCashEntry] {
        &self.petty_cash
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn income_categories(&self) -> &[Category] {
        &self.income_categories
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Expenses flagged as reimbursable, paid or not.
    pub fn reimbursements(&self) -> impl Iterator<Item = &Expense> {
        self.expenses.iter().filter(|e| e.is_reimbursement())
    }

    /// The categories of the given namespace.
    pub fn categories_of(&self, kind: CategoryKind) -> &[Category] {
        match kind {
            CategoryKind::Expense => &self.categories,
            CategoryKind::Income => &self.income_categories,
        }
    }

    /// Finds a category by id within a namespace.
    pub fn category(&self, kind: CategoryKind, id: &CategoryId) -> Option<&Category> {
        self.categories_of(kind).iter().find(|c| c.id() == id)
    }

    /// True if no record of any collection has been entered.
    pub fn has_no_records(&self) -> bool {
        self.expenses.is_empty() && self.income.is_empty() && self.petty_cash.is_empty()
    }

    /// Whether any record references the category `id` of namespace `kind`.
    pub fn is_category_referenced(&self, kind: CategoryKind, id: &CategoryId) -> bool {
        match kind {
            CategoryKind::Expense => {
                self.expenses.iter().any(|e| e.category_id() == id)
                    || self.petty_cash.iter().any(|p| p.category_id() == id)
            }
            CategoryKind::Income => self.income.iter().any(|i| i.category_id() == id),
        }
    }

    /// Compares the ledger contents, ignoring `last_updated`.
    pub fn same_contents(&self, other: &LedgerSnapshot) -> bool {
        self.expenses == other.expenses
            && self.income == other.income
            && self.petty_cash == other.petty_cash
            && self.categories == other.categories
            && self.income_categories == other.income_categories
    }

    pub(crate) fn categories_mut(&mut self, kind: CategoryKind) -> &mut Vec<Category> {
        match kind {
            CategoryKind::Expense => &mut self.categories,
            CategoryKind::Income => &mut self.income_categories,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_has_categories() {
        let s = LedgerSnapshot::default();
        assert!(s.has_no_records());
        assert_eq!(s.categories().len(), 8);
        assert_eq!(s.income_categories().len(), 5);
    }

    #[test]
    fn test_partial_remote_document_fills_defaults() {
        // An older bin layout: no pettyCash or incomeCategories, plus a version marker.
        let json = r##"{"expenses":[],"income":[],"categories":[
            {"id":"food","name":"Food & Dining","color":"#ff6b6b"}],
            "lastUpdated":"2024-06-01T00:00:00.000Z","version":"1.0"}"##;
        let s: LedgerSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(s.categories().len(), 1);
        assert_eq!(s.income_categories(), default_income_categories().as_slice());
        assert!(s.petty_cash().is_empty());
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let v = serde_json::to_value(LedgerSnapshot::default()).unwrap();
        assert!(v.get("pettyCash").is_some());
        assert!(v.get("incomeCategories").is_some());
        assert!(v.get("lastUpdated").is_some());
    }
}
