//! Read-only commands. They work from the local cache and never contact the remote.

use crate::api::Mode;
use crate::args::{ListArgs, ListTarget, SummaryArgs};
use crate::commands::{open_cached, plural, Out};
use crate::config::RemoteKind;
use crate::model::{Category, CategoryKind, Expense, Income, LedgerSnapshot, PettyCashEntry, Record};
use crate::report::{self, money, CategoryTotal, MonthTotals, MonthlyStats, Summary, Tip};
use crate::{Config, Result, SnapshotSource};
use chrono::{DateTime, Days, Local, Months, NaiveDate, Utc};
use serde::Serialize;
use std::fmt::Write;

/// What `ledger status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub remote: RemoteKind,
    pub source: SnapshotSource,
    pub last_updated: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub expenses: usize,
    pub income: usize,
    pub petty_cash: usize,
    pub pending_reimbursements: usize,
    pub categories: usize,
    pub income_categories: usize,
}

/// What `ledger summary` reports.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub summary: Summary,
    pub month: MonthlyStats,
    pub categories: Vec<CategoryTotal>,
    pub trend: Vec<MonthTotals>,
    pub tips: Vec<Tip>,
}

/// The records or categories printed by `ledger list`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Listing {
    Expenses(Vec<Expense>),
    Income(Vec<Income>),
    PettyCash(Vec<PettyCashEntry>),
    Categories(Vec<Category>),
}

/// Shows where the local ledger came from, when it last reached the remote and how much it holds.
pub async fn status(config: Config, mode: Mode) -> Result<Out<StatusReport>> {
    let store = open_cached(&config, mode).await?;
    let ledger = store.snapshot().await;
    let report = StatusReport {
        remote: config.remote_kind(),
        source: store.source().await,
        last_updated: ledger.last_updated(),
        last_sync: store.last_sync().await,
        expenses: ledger.expenses().len(),
        income: ledger.income().len(),
        petty_cash: ledger.petty_cash().len(),
        pending_reimbursements: ledger
            .reimbursements()
            .filter(|e| e.is_pending_reimbursement())
            .count(),
        categories: ledger.categories().len(),
        income_categories: ledger.income_categories().len(),
    };

    let last_sync = match report.last_sync {
        Some(t) => t.to_rfc3339(),
        None => "never".to_string(),
    };
    let message = format!(
        "Ledger home: {}\nRemote: {}\nLoaded from: {}\nLast updated: {}\nLast sync: {last_sync}\n\
        {}, {}, {}, {} pending\n{}, {}",
        config.root().display(),
        report.remote,
        report.source,
        report.last_updated.to_rfc3339(),
        plural(report.expenses, "expense", "expenses"),
        plural(report.income, "income entry", "income entries"),
        plural(report.petty_cash, "petty cash entry", "petty cash entries"),
        plural(
            report.pending_reimbursements,
            "reimbursement",
            "reimbursements"
        ),
        plural(report.categories, "expense category", "expense categories"),
        plural(report.income_categories, "income category", "income categories"),
    );
    Ok(Out::new(message, report))
}

/// Lists records newest first, or categories in their stored order.
pub async fn list(config: Config, mode: Mode, args: ListArgs) -> Result<Out<Listing>> {
    let store = open_cached(&config, mode).await?;
    let ledger = store.snapshot().await;
    let (lines, listing) = match args.target() {
        ListTarget::Expenses => {
            let records = newest_first(ledger.expenses());
            (expense_lines(&ledger, &records), Listing::Expenses(records))
        }
        ListTarget::Reimbursements => {
            let records: Vec<Expense> = newest_first(ledger.expenses())
                .into_iter()
                .filter(Expense::is_reimbursement)
                .collect();
            (expense_lines(&ledger, &records), Listing::Expenses(records))
        }
        ListTarget::Income => {
            let records = newest_first(ledger.income());
            let lines = records
                .iter()
                .map(|r| record_line(&ledger, CategoryKind::Income, r, ""))
                .collect();
            (lines, Listing::Income(records))
        }
        ListTarget::PettyCash => {
            let records = newest_first(ledger.petty_cash());
            let lines = records
                .iter()
                .map(|r| record_line(&ledger, CategoryKind::Expense, r, &r.kind().to_string()))
                .collect();
            (lines, Listing::PettyCash(records))
        }
        ListTarget::Categories => category_listing(ledger.categories()),
        ListTarget::IncomeCategories => category_listing(ledger.income_categories()),
    };

    let mut message = format!("{}: {}", args.target(), lines.len());
    for line in lines {
        message.push('\n');
        message.push_str(&line);
    }
    Ok(Out::new(message, listing))
}

/// Shows all-time totals and one month's statistics, followed by spending by category, the
/// six-month trend and tips for that month.
pub async fn summary(config: Config, mode: Mode, args: SummaryArgs) -> Result<Out<SummaryReport>> {
    let store = open_cached(&config, mode).await?;
    let ledger = store.snapshot().await;
    let today = Local::now().date_naive();
    let as_of = match args.month() {
        Some(month) => month_end(month.first_day()).min(today).max(month.first_day()),
        None => today,
    };
    let report = SummaryReport {
        summary: report::summary(&ledger),
        month: report::monthly_stats(&ledger, as_of),
        categories: report::category_totals(&ledger),
        trend: report::six_month_trend(&ledger, as_of),
        tips: report::tips(&ledger, as_of),
    };
    let message = summary_message(&report);
    Ok(Out::new(message, report))
}

fn summary_message(report: &SummaryReport) -> String {
    let s = &report.summary;
    let m = &report.month;
    let mut out = String::new();
    let _ = writeln!(out, "Total income:           {}", money(s.total_income));
    let _ = writeln!(out, "Total expenses:         {}", money(s.total_expenses));
    let _ = writeln!(out, "Pending reimbursements: {}", money(s.pending_reimbursements));
    let _ = writeln!(out, "Net balance:            {}", money(s.net_balance));
    let _ = writeln!(out, "Petty cash:             {}", money(s.petty_cash_balance));
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", m.month.format("%B %Y"));
    let _ = writeln!(out, "  Income:            {}", money(m.income));
    let _ = writeln!(out, "  Expenses:          {}", money(m.expenses));
    let _ = writeln!(out, "  Net:               {}", money(m.net));
    let _ = writeln!(out, "  Avg daily spend:   {}", money(m.average_daily_spend));
    let _ = writeln!(
        out,
        "  Top category:      {}",
        m.top_category.as_deref().unwrap_or("-")
    );
    if !report.categories.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "By category");
        for c in &report.categories {
            let _ = writeln!(out, "  {:<20} {:>14}", c.name, money(c.total));
        }
    }
    let _ = writeln!(out);
    let _ = write!(out, "Last six months");
    for t in &report.trend {
        let _ = write!(
            out,
            "\n  {}  in {:>14}  out {:>14}",
            t.month.format("%Y-%m"),
            money(t.income),
            money(t.expenses)
        );
    }
    let _ = writeln!(out);
    let _ = write!(out, "\nTips");
    for tip in &report.tips {
        let _ = write!(
            out,
            "\n  [{}] {}: {}\n    {}",
            serde_plain::to_string(&tip.kind()).unwrap_or_default(),
            tip.title(),
            tip.description(),
            tip.action()
        );
    }
    out
}

fn month_end(first_day: NaiveDate) -> NaiveDate {
    first_day
        .checked_add_months(Months::new(1))
        .and_then(|next| next.checked_sub_days(Days::new(1)))
        .unwrap_or(first_day)
}

fn newest_first<R: Record + Clone>(records: &[R]) -> Vec<R> {
    let mut records = records.to_vec();
    records.sort_by(|a, b| {
        b.date()
            .cmp(&a.date())
            .then_with(|| b.created_at().cmp(&a.created_at()))
    });
    records
}

fn category_name(ledger: &LedgerSnapshot, kind: CategoryKind, record: &impl Record) -> String {
    ledger
        .category(kind, record.category_id())
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| report::UNKNOWN_CATEGORY.to_string())
}

fn record_line(
    ledger: &LedgerSnapshot,
    kind: CategoryKind,
    record: &impl Record,
    note: &str,
) -> String {
    format!(
        "{}  {:>12}  {:<20} {}  [{}]{}{}",
        record.date(),
        record.amount().to_string(),
        category_name(ledger, kind, record),
        record.description(),
        record.id(),
        if note.is_empty() { "" } else { "  " },
        note
    )
}

fn expense_lines(ledger: &LedgerSnapshot, expenses: &[Expense]) -> Vec<String> {
    expenses
        .iter()
        .map(|e| {
            let note = match (e.is_reimbursement(), e.payment_date()) {
                (false, _) => String::new(),
                (true, Some(paid)) => format!("reimbursed {paid}"),
                (true, None) => "reimbursement pending".to_string(),
            };
            record_line(ledger, CategoryKind::Expense, e, &note)
        })
        .collect()
}

fn category_listing(categories: &[Category]) -> (Vec<String>, Listing) {
    let lines = categories
        .iter()
        .map(|c| format!("{:<20} {:<20} {}", c.id().as_str(), c.name(), c.color()))
        .collect();
    (lines, Listing::Categories(categories.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Args, Command, Month};
    use crate::commands::add;
    use crate::test::TestEnv;
    use chrono::Datelike;
    use clap::Parser;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    async fn run_add(env: &TestEnv, argv: &[&str]) {
        let mut full = vec!["ledger", "add"];
        full.extend_from_slice(argv);
        let Command::Add(args) = Args::try_parse_from(full).unwrap().command().clone() else {
            panic!("expected add");
        };
        add(env.config(), Mode::Test, args).await.unwrap();
    }

    async fn populate(env: &TestEnv) {
        run_add(
            env,
            &[
                "expense", "--description", "Groceries", "--amount", "80", "--category", "food",
                "--date", "2024-06-05",
            ],
        )
        .await;
        run_add(
            env,
            &[
                "expense", "--description", "Client lunch", "--amount", "45", "--category", "food",
                "--date", "2024-06-07", "--reimbursement",
            ],
        )
        .await;
        run_add(
            env,
            &[
                "income", "--description", "Salary", "--amount", "3000", "--category", "salary",
                "--date", "2024-06-01",
            ],
        )
        .await;
        run_add(
            env,
            &[
                "petty-cash", "--description", "Float", "--amount", "100", "--date", "2024-06-01",
                "--kind", "topUp",
            ],
        )
        .await;
    }

    #[tokio::test]
    async fn test_status_counts() {
        let env = TestEnv::local().await;
        populate(&env).await;
        let out = status(env.config(), Mode::Test).await.unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.remote, RemoteKind::None);
        assert_eq!(report.source, SnapshotSource::LocalCache);
        assert_eq!(report.expenses, 2);
        assert_eq!(report.income, 1);
        assert_eq!(report.petty_cash, 1);
        assert_eq!(report.pending_reimbursements, 1);
        assert_eq!(report.categories, 8);
        assert!(out.message().contains("Last sync: never"));
    }

    #[tokio::test]
    async fn test_status_does_not_contact_remote() {
        let env = TestEnv::new().await;
        status(env.config(), Mode::Test).await.unwrap();
        assert_eq!(env.get_state().fetches, 0);
    }

    #[tokio::test]
    async fn test_list_expenses_newest_first() {
        let env = TestEnv::local().await;
        populate(&env).await;
        let out = list(env.config(), Mode::Test, ListArgs::new(ListTarget::Expenses))
            .await
            .unwrap();
        let Listing::Expenses(expenses) = out.structure().unwrap() else {
            panic!("expected expenses");
        };
        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[0].description(), "Client lunch");
        assert!(out.message().contains("reimbursement pending"));
        assert!(out.message().contains("Food & Dining"));
    }

    #[tokio::test]
    async fn test_list_reimbursements_and_categories() {
        let env = TestEnv::local().await;
        populate(&env).await;
        let out = list(env.config(), Mode::Test, ListArgs::new(ListTarget::Reimbursements))
            .await
            .unwrap();
        let Listing::Expenses(expenses) = out.structure().unwrap() else {
            panic!("expected expenses");
        };
        assert_eq!(expenses.len(), 1);

        let out = list(
            env.config(),
            Mode::Test,
            ListArgs::new(ListTarget::IncomeCategories),
        )
        .await
        .unwrap();
        let Listing::Categories(categories) = out.structure().unwrap() else {
            panic!("expected categories");
        };
        assert!(categories.iter().any(|c| c.id().as_str() == "salary"));
    }

    #[tokio::test]
    async fn test_summary_for_past_month() {
        let env = TestEnv::local().await;
        populate(&env).await;
        let month = Month::from_str("2024-06").unwrap();
        let out = summary(env.config(), Mode::Test, SummaryArgs::new(Some(month)))
            .await
            .unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.summary.total_expenses, Decimal::from(125));
        assert_eq!(report.summary.net_balance, Decimal::from(2920));
        assert_eq!(report.summary.petty_cash_balance, Decimal::from(100));
        assert_eq!(report.month.month.month(), 6);
        // The whole of June counts: 125 / 30.
        assert_eq!(report.month.average_daily_spend, Decimal::new(417, 2));
        assert_eq!(report.month.top_category.as_deref(), Some("Food & Dining"));
        assert_eq!(report.trend.len(), 6);
        assert!(out.message().contains("Net balance:            $2,920.00"));
        assert_eq!(report.tips.len(), report::TIP_COUNT);
        assert!(out.message().contains("\nTips\n  ["));
    }

    #[test]
    fn test_month_end() {
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(month_end(feb), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }
}
