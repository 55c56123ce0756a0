//! The edits a user can make to the ledger. A `Mutation` is applied to a copy of the snapshot; if it
//! is rejected the copy is thrown away, so a rejected mutation never changes anything.

use crate::error::{Error, ErrorType, Result};
use crate::model::{
    Category, CategoryId, CategoryKind, Expense, ExpenseFields, Income, IncomeFields,
    LedgerSnapshot, Payment, PettyCashEntry, PettyCashFields, Record, RecordId,
};
use chrono::NaiveDate;
use serde::Serialize;

/// A single change to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddExpense(Expense),
    UpdateExpense(RecordId, ExpenseFields),
    DeleteExpense(RecordId),
    AddIncome(Income),
    UpdateIncome(RecordId, IncomeFields),
    DeleteIncome(RecordId),
    AddPettyCash(PettyCashEntry),
    UpdatePettyCash(RecordId, PettyCashFields),
    DeletePettyCash(RecordId),
    AddCategory {
        kind: CategoryKind,
        name: String,
        color: Option<String>,
    },
    DeleteCategory {
        kind: CategoryKind,
        id: CategoryId,
    },
    /// Marks every listed reimbursement as paid on `date`. Either all of them are marked or, if any
    /// id is unknown or not a reimbursement, none are.
    MarkPaid {
        ids: Vec<RecordId>,
        date: NaiveDate,
    },
    MarkUnpaid(RecordId),
}

/// What a successful mutation touched, for reporting back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Applied {
    Record(RecordId),
    Records(Vec<RecordId>),
    Category(CategoryId),
}

impl Mutation {
    pub(crate) fn apply(self, ledger: &mut LedgerSnapshot) -> Result<Applied> {
        match self {
            Mutation::AddExpense(expense) => {
                require_category(ledger, CategoryKind::Expense, expense.category_id())?;
                insert(&mut ledger.expenses, expense, "expense")
            }
            Mutation::UpdateExpense(id, fields) => {
                require_category(ledger, CategoryKind::Expense, &fields.category_id)?;
                find_mut(&mut ledger.expenses, &id, "expense")?.replace(fields)?;
                Ok(Applied::Record(id))
            }
            Mutation::DeleteExpense(id) => remove(&mut ledger.expenses, id, "expense"),
            Mutation::AddIncome(income) => {
                require_category(ledger, CategoryKind::Income, income.category_id())?;
                insert(&mut ledger.income, income, "income")
            }
            Mutation::UpdateIncome(id, fields) => {
                require_category(ledger, CategoryKind::Income, &fields.category_id)?;
                find_mut(&mut ledger.income, &id, "income")?.replace(fields)?;
                Ok(Applied::Record(id))
            }
            Mutation::DeleteIncome(id) => remove(&mut ledger.income, id, "income"),
            Mutation::AddPettyCash(entry) => {
                require_category(ledger, CategoryKind::Expense, entry.category_id())?;
                insert(&mut ledger.petty_cash, entry, "petty cash entry")
            }
            Mutation::UpdatePettyCash(id, fields) => {
                require_category(ledger, CategoryKind::Expense, &fields.category_id)?;
                find_mut(&mut ledger.petty_cash, &id, "petty cash entry")?.replace(fields)?;
                Ok(Applied::Record(id))
            }
            Mutation::DeletePettyCash(id) => remove(&mut ledger.petty_cash, id, "petty cash entry"),
            Mutation::AddCategory { kind, name, color } => {
                let category = Category::create(&name, color.as_deref(), ledger.categories_of(kind))?;
                let id = category.id().clone();
                ledger.categories_mut(kind).push(category);
                Ok(Applied::Category(id))
            }
            Mutation::DeleteCategory { kind, id } => {
                if ledger.category(kind, &id).is_none() {
                    return Err(not_found(&format!("{kind} category"), id.as_str()));
                }
                if ledger.is_category_referenced(kind, &id) {
                    return Err(Error::msg(
                        ErrorType::CategoryInUse,
                        format!("Cannot delete category '{id}' because records still use it"),
                    ));
                }
                ledger.categories_mut(kind).retain(|c| c.id() != &id);
                Ok(Applied::Category(id))
            }
            Mutation::MarkPaid { ids, date } => {
                for id in &ids {
                    let expense = find_reimbursement(&mut ledger.expenses, id)?;
                    expense.set_payment(Payment::Paid(date));
                }
                Ok(Applied::Records(ids))
            }
            Mutation::MarkUnpaid(id) => {
                find_reimbursement(&mut ledger.expenses, &id)?.set_payment(Payment::Pending);
                Ok(Applied::Record(id))
            }
        }
    }
}

fn not_found(what: &str, id: &str) -> Error {
    Error::msg(ErrorType::NotFound, format!("No {what} with id '{id}'"))
}

fn require_category(ledger: &LedgerSnapshot, kind: CategoryKind, id: &CategoryId) -> Result<()> {
    match ledger.category(kind, id) {
        Some(_) => Ok(()),
        None => Err(Error::msg(
            ErrorType::Validation,
            format!("Unknown {kind} category '{id}'"),
        )),
    }
}

fn insert<T: Record>(records: &mut Vec<T>, record: T, what: &str) -> Result<Applied> {
    let id = record.id().clone();
    if records.iter().any(|r| r.id() == &id) {
        return Err(Error::msg(
            ErrorType::Validation,
            format!("A {what} with id '{id}' already exists"),
        ));
    }
    records.push(record);
    Ok(Applied::Record(id))
}

fn find_mut<'a, T: Record>(records: &'a mut [T], id: &RecordId, what: &str) -> Result<&'a mut T> {
    records
        .iter_mut()
        .find(|r| r.id() == id)
        .ok_or_else(|| not_found(what, id.as_str()))
}

fn remove<T: Record>(records: &mut Vec<T>, id: RecordId, what: &str) -> Result<Applied> {
    let before = records.len();
    records.retain(|r| r.id() != &id);
    if records.len() == before {
        return Err(not_found(what, id.as_str()));
    }
    Ok(Applied::Record(id))
}

fn find_reimbursement<'a>(expenses: &'a mut [Expense], id: &RecordId) -> Result<&'a mut Expense> {
    let expense = find_mut(expenses, id, "expense")?;
    if !expense.is_reimbursement() {
        return Err(Error::msg(
            ErrorType::Validation,
            format!("Expense '{id}' is not a reimbursement"),
        ));
    }
    Ok(expense)
}
