//! Handlers for the commands that change the ledger.
//!
//! Each handler loads the ledger remote-first, applies one `Mutation`, and reports whether the
//! change reached the remote. A failed push is not an error: the change is already in the local
//! cache and goes out with the next successful push.

use crate::api::Mode;
use crate::args::{
    AddArgs, AddSubcommand, DeleteArgs, DeleteSubcommand, ExpenseArgs, IncomeArgs, PayArgs,
    PettyCashArgs, UnpayArgs, UpdateArgs, UpdateSubcommand,
};
use crate::commands::{open_synced, plural, Out};
use crate::model::{
    CategoryId, CategoryKind, Expense, ExpenseFields, Income, IncomeFields, PettyCashEntry,
    PettyCashFields, RecordId,
};
use crate::{Applied, Config, Mutation, Result, SyncStatus, SyncedLedgerStore};
use chrono::{Local, NaiveDate};

/// Adds an expense, income entry, petty cash entry or category.
pub async fn add(config: Config, mode: Mode, args: AddArgs) -> Result<Out<Applied>> {
    let (what, mutation) = match args.entity() {
        AddSubcommand::Expense(a) => ("expense", Mutation::AddExpense(Expense::create(expense(a))?)),
        AddSubcommand::Income(a) => ("income", Mutation::AddIncome(Income::create(income(a))?)),
        AddSubcommand::PettyCash(a) => (
            "petty cash entry",
            Mutation::AddPettyCash(PettyCashEntry::create(petty_cash(a))?),
        ),
        AddSubcommand::Category(a) => (
            "category",
            Mutation::AddCategory {
                kind: category_kind(a.income),
                name: a.name.clone(),
                color: a.color.clone(),
            },
        ),
    };
    apply(&config, mode, "Added", what, mutation).await
}

/// Replaces the editable fields of a record.
pub async fn update(config: Config, mode: Mode, args: UpdateArgs) -> Result<Out<Applied>> {
    let (what, mutation) = match args.entity() {
        UpdateSubcommand::Expense { id, fields } => (
            "expense",
            Mutation::UpdateExpense(RecordId::from(id.as_str()), expense(fields)),
        ),
        UpdateSubcommand::Income { id, fields } => (
            "income",
            Mutation::UpdateIncome(RecordId::from(id.as_str()), income(fields)),
        ),
        UpdateSubcommand::PettyCash { id, fields } => (
            "petty cash entry",
            Mutation::UpdatePettyCash(RecordId::from(id.as_str()), petty_cash(fields)),
        ),
    };
    apply(&config, mode, "Updated", what, mutation).await
}

/// Deletes a record, or a category that no record uses.
pub async fn delete(config: Config, mode: Mode, args: DeleteArgs) -> Result<Out<Applied>> {
    let (what, mutation) = match args.entity() {
        DeleteSubcommand::Expense { id } => {
            ("expense", Mutation::DeleteExpense(RecordId::from(id.as_str())))
        }
        DeleteSubcommand::Income { id } => {
            ("income", Mutation::DeleteIncome(RecordId::from(id.as_str())))
        }
        DeleteSubcommand::PettyCash { id } => (
            "petty cash entry",
            Mutation::DeletePettyCash(RecordId::from(id.as_str())),
        ),
        DeleteSubcommand::Category { id, income } => (
            "category",
            Mutation::DeleteCategory {
                kind: category_kind(*income),
                id: CategoryId::from(id.as_str()),
            },
        ),
    };
    apply(&config, mode, "Deleted", what, mutation).await
}

/// Marks reimbursements as paid. Either every id is marked or none is.
pub async fn pay(config: Config, mode: Mode, args: PayArgs) -> Result<Out<Applied>> {
    let ids: Vec<RecordId> = args.ids().iter().map(|id| RecordId::from(id.as_str())).collect();
    let what = plural(ids.len(), "reimbursement", "reimbursements");
    let mutation = Mutation::MarkPaid {
        ids,
        date: args.date().unwrap_or_else(today),
    };
    apply(&config, mode, "Marked as paid:", &what, mutation).await
}

/// Marks a reimbursement as not paid.
pub async fn unpay(config: Config, mode: Mode, args: UnpayArgs) -> Result<Out<Applied>> {
    let mutation = Mutation::MarkUnpaid(RecordId::from(args.id()));
    apply(&config, mode, "Marked as unpaid:", "reimbursement", mutation).await
}

async fn apply(
    config: &Config,
    mode: Mode,
    verb: &str,
    what: &str,
    mutation: Mutation,
) -> Result<Out<Applied>> {
    let store = open_synced(config, mode).await?;
    let applied = store.mutate(mutation).await?;
    let message = format!(
        "{verb} {what} {}. {}",
        describe(&applied),
        sync_note(&store)
    );
    Ok(Out::new(message, applied))
}

fn describe(applied: &Applied) -> String {
    match applied {
        Applied::Record(id) => id.to_string(),
        Applied::Records(ids) => ids
            .iter()
            .map(RecordId::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Applied::Category(id) => id.to_string(),
    }
}

fn sync_note(store: &SyncedLedgerStore) -> &'static str {
    match (store.has_remote(), store.status()) {
        (false, _) => "Saved locally",
        (true, SyncStatus::Synced) => "Saved and synced",
        (true, SyncStatus::Error) => "Saved locally, the push to the remote failed",
        (true, _) => "Saved locally, the remote needs credentials",
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn category_kind(income: bool) -> CategoryKind {
    if income {
        CategoryKind::Income
    } else {
        CategoryKind::Expense
    }
}

fn expense(args: &ExpenseArgs) -> ExpenseFields {
    ExpenseFields {
        description: args.description.clone(),
        amount: args.amount,
        category_id: CategoryId::from(args.category.as_str()),
        date: args.date.unwrap_or_else(today),
        is_reimbursement: args.reimbursement,
    }
}

fn income(args: &IncomeArgs) -> IncomeFields {
    IncomeFields {
        description: args.description.clone(),
        amount: args.amount,
        category_id: CategoryId::from(args.category.as_str()),
        date: args.date.unwrap_or_else(today),
    }
}

fn petty_cash(args: &PettyCashArgs) -> PettyCashFields {
    PettyCashFields {
        description: args.description.clone(),
        amount: args.amount,
        category_id: CategoryId::from(args.category.as_str()),
        date: args.date.unwrap_or_else(today),
        kind: args.kind,
    }
}
