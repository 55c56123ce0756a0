//! These structs provide the CLI interface for the ledger CLI.

use crate::config::RemoteKind;
use crate::model::{Amount, PettyCashKind};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// ledger: a local-first personal finance ledger.
///
/// Track expenses, income, reimbursements and petty cash. Every change is saved to a local cache
/// in your ledger home directory and, if you configure a remote, mirrored there as a full snapshot.
/// When the remote is unreachable the ledger keeps working from local data.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the ledger home directory and initialize the configuration files.
    ///
    /// This is the first command you should run. By default the ledger is kept locally only. To
    /// mirror it, pass --remote bin (a JSON bin service) or --remote documents (a per-user document
    /// store) and a --credentials file containing `access_key` and/or `id_token`. The access key
    /// can also be supplied later through the LEDGER_ACCESS_KEY environment variable.
    Init(InitArgs),
    /// Show where the ledger was loaded from, the sync status and the record counts.
    Status,
    /// Add an expense, income, petty cash entry or category.
    Add(AddArgs),
    /// Replace every field of an existing record. The id and creation time are kept.
    Update(UpdateArgs),
    /// Delete a record or an unused category.
    Delete(DeleteArgs),
    /// Mark one or more reimbursements as paid.
    Pay(PayArgs),
    /// Mark a reimbursement as not paid.
    Unpay(UnpayArgs),
    /// List records or categories.
    List(ListArgs),
    /// Show totals, this month's statistics and the six-month trend.
    Summary(SummaryArgs),
    /// Push the ledger to the remote, or replace the local ledger with the remote one.
    Sync(SyncArgs),
    /// Push the ledger to the remote periodically until interrupted with Ctrl-C.
    Watch(WatchArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where ledger data and configuration is held. Defaults to ~/ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }
}

/// Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// Where the ledger is mirrored to.
    #[arg(long, value_enum, default_value_t = RemoteKind::None)]
    remote: RemoteKind,

    /// The base URL of the remote service. Required for the documents remote.
    #[arg(long)]
    remote_url: Option<String>,

    /// The user identity the documents remote stores data under.
    #[arg(long)]
    user_id: Option<String>,

    /// A JSON file with `access_key` and/or `id_token`. It is copied into the secrets directory.
    #[arg(long)]
    credentials: Option<PathBuf>,
}

impl InitArgs {
    pub fn new(
        remote: RemoteKind,
        remote_url: Option<String>,
        user_id: Option<String>,
        credentials: Option<PathBuf>,
    ) -> Self {
        Self {
            remote,
            remote_url,
            user_id,
            credentials,
        }
    }

    pub fn remote(&self) -> RemoteKind {
        self.remote
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn credentials(&self) -> Option<&Path> {
        self.credentials.as_deref()
    }
}

/// Args for the `ledger add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    #[command(subcommand)]
    entity: AddSubcommand,
}

impl AddArgs {
    pub fn entity(&self) -> &AddSubcommand {
        &self.entity
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum AddSubcommand {
    Expense(ExpenseArgs),
    Income(IncomeArgs),
    PettyCash(PettyCashArgs),
    Category(CategoryArgs),
}

/// The fields of an expense.
#[derive(Debug, Parser, Clone)]
pub struct ExpenseArgs {
    #[arg(long)]
    pub description: String,

    /// The amount, e.g. 12.50 or $1,200.00
    #[arg(long)]
    pub amount: Amount,

    /// The expense category id, e.g. food
    #[arg(long)]
    pub category: String,

    /// The date as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// The expense will be paid back by someone else.
    #[arg(long)]
    pub reimbursement: bool,
}

/// The fields of an income entry.
#[derive(Debug, Parser, Clone)]
pub struct IncomeArgs {
    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub amount: Amount,

    /// The income category id, e.g. salary
    #[arg(long)]
    pub category: String,

    /// The date as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// The fields of a petty cash entry.
#[derive(Debug, Parser, Clone)]
pub struct PettyCashArgs {
    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub amount: Amount,

    /// The expense category id.
    #[arg(long, default_value = "other")]
    pub category: String,

    /// The date as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// topUp puts cash into the box, payout takes it out.
    #[arg(long, default_value_t = PettyCashKind::Payout)]
    pub kind: PettyCashKind,
}

/// Args for adding a category.
#[derive(Debug, Parser, Clone)]
pub struct CategoryArgs {
    #[arg(long)]
    pub name: String,

    /// A CSS color, e.g. #ff6b6b
    #[arg(long)]
    pub color: Option<String>,

    /// Add to the income categories instead of the expense categories.
    #[arg(long)]
    pub income: bool,
}

/// Args for the `ledger update` command.
#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    #[command(subcommand)]
    entity: UpdateSubcommand,
}

impl UpdateArgs {
    pub fn entity(&self) -> &UpdateSubcommand {
        &self.entity
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum UpdateSubcommand {
    Expense {
        id: String,
        #[clap(flatten)]
        fields: ExpenseArgs,
    },
    Income {
        id: String,
        #[clap(flatten)]
        fields: IncomeArgs,
    },
    PettyCash {
        id: String,
        #[clap(flatten)]
        fields: PettyCashArgs,
    },
}

/// Args for the `ledger delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    #[command(subcommand)]
    entity: DeleteSubcommand,
}

impl DeleteArgs {
    pub fn entity(&self) -> &DeleteSubcommand {
        &self.entity
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum DeleteSubcommand {
    Expense {
        id: String,
    },
    Income {
        id: String,
    },
    PettyCash {
        id: String,
    },
    Category {
        id: String,
        /// Delete from the income categories instead of the expense categories.
        #[arg(long)]
        income: bool,
    },
}

/// Args for the `ledger pay` command.
#[derive(Debug, Parser, Clone)]
pub struct PayArgs {
    /// The ids of the reimbursements that were paid back.
    #[arg(required = true, num_args = 1..)]
    ids: Vec<String>,

    /// The payment date as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
}

impl PayArgs {
    pub fn new(ids: Vec<String>, date: Option<NaiveDate>) -> Self {
        Self { ids, date }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }
}

/// Args for the `ledger unpay` command.
#[derive(Debug, Parser, Clone)]
pub struct UnpayArgs {
    id: String,
}

impl UnpayArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ListTarget {
    #[default]
    Expenses,
    Income,
    PettyCash,
    Reimbursements,
    Categories,
    IncomeCategories,
}

serde_plain::derive_display_from_serialize!(ListTarget);
serde_plain::derive_fromstr_from_deserialize!(ListTarget);

/// Args for the `ledger list` command.
#[derive(Debug, Parser, Clone)]
pub struct ListArgs {
    #[arg(value_enum)]
    target: ListTarget,
}

impl ListArgs {
    pub fn new(target: ListTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> ListTarget {
        self.target
    }
}

/// Args for the `ledger summary` command.
#[derive(Debug, Parser, Clone)]
pub struct SummaryArgs {
    /// The month to report on as YYYY-MM. Defaults to the current month.
    #[arg(long)]
    month: Option<Month>,
}

impl SummaryArgs {
    pub fn new(month: Option<Month>) -> Self {
        Self { month }
    }

    pub fn month(&self) -> Option<Month> {
        self.month
    }
}

/// A calendar month given as YYYY-MM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month(NaiveDate);

impl Month {
    /// The first day of the month.
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for Month {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d").map(Month)
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m"))
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UpDown {
    /// Push the local ledger to the remote.
    Up,
    /// Replace the local ledger with the remote one.
    #[default]
    Down,
}

serde_plain::derive_display_from_serialize!(UpDown);
serde_plain::derive_fromstr_from_deserialize!(UpDown);

/// Args for the `ledger sync` command.
#[derive(Debug, Parser, Clone)]
pub struct SyncArgs {
    /// The direction to sync: "up" or "down"
    #[arg(value_enum)]
    direction: UpDown,
}

impl SyncArgs {
    pub fn new(direction: UpDown) -> Self {
        Self { direction }
    }

    pub fn direction(&self) -> UpDown {
        self.direction
    }
}

/// Args for the `ledger watch` command.
#[derive(Debug, Parser, Clone)]
pub struct WatchArgs {
    /// Seconds between pushes, at least 1. Defaults to sync_interval_secs from config.json.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

impl WatchArgs {
    pub fn new(interval: Option<u64>) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Option<u64> {
        self.interval
    }
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["ledger", "--ledger-home", "/tmp/ledger-test"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_add_expense_parses_amount_and_date() {
        let args = parse(&[
            "add",
            "expense",
            "--description",
            "Taxi",
            "--amount",
            "$1,234.50",
            "--category",
            "transport",
            "--date",
            "2024-06-01",
            "--reimbursement",
        ]);
        let Command::Add(add) = args.command() else {
            panic!("expected add");
        };
        let AddSubcommand::Expense(e) = add.entity() else {
            panic!("expected expense");
        };
        assert_eq!(e.amount.value(), Decimal::new(123450, 2));
        assert_eq!(e.date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert!(e.reimbursement);
        assert_eq!(args.common().ledger_home().path(), Path::new("/tmp/ledger-test"));
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let result = Args::try_parse_from([
            "ledger",
            "add",
            "income",
            "--description",
            "x",
            "--amount",
            "-5",
            "--category",
            "salary",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pay_many() {
        let args = parse(&["pay", "a", "b", "--date", "2024-06-09"]);
        let Command::Pay(pay) = args.command() else {
            panic!("expected pay");
        };
        assert_eq!(pay.ids(), ["a".to_string(), "b".to_string()]);
        assert_eq!(pay.date(), NaiveDate::from_ymd_opt(2024, 6, 9));
    }

    #[test]
    fn test_petty_cash_kind() {
        let args = parse(&[
            "add",
            "petty-cash",
            "--description",
            "Float",
            "--amount",
            "100",
            "--kind",
            "topUp",
        ]);
        let Command::Add(add) = args.command() else {
            panic!("expected add");
        };
        let AddSubcommand::PettyCash(p) = add.entity() else {
            panic!("expected petty cash");
        };
        assert_eq!(p.kind, PettyCashKind::TopUp);
        assert_eq!(p.category, "other");
    }

    #[test]
    fn test_summary_month() {
        let args = parse(&["summary", "--month", "2024-02"]);
        let Command::Summary(s) = args.command() else {
            panic!("expected summary");
        };
        assert_eq!(
            s.month().unwrap().first_day(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
        assert!("2024-13".parse::<Month>().is_err());
    }

    #[test]
    fn test_init_remote() {
        let args = parse(&["init", "--remote", "documents", "--user-id", "alice"]);
        let Command::Init(init) = args.command() else {
            panic!("expected init");
        };
        assert_eq!(init.remote(), RemoteKind::Documents);
        assert_eq!(init.user_id(), Some("alice"));
    }

    #[test]
    fn test_watch_interval_must_be_positive() {
        let args = parse(&["watch", "--interval", "5"]);
        let Command::Watch(w) = args.command() else {
            panic!("expected watch");
        };
        assert_eq!(w.interval(), Some(5));
        let result = Args::try_parse_from(["ledger", "watch", "--interval", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_and_delete_take_ids() {
        let args = parse(&[
            "update",
            "income",
            "42",
            "--description",
            "Pay",
            "--amount",
            "10",
            "--category",
            "salary",
        ]);
        assert!(matches!(
            args.command(),
            Command::Update(u) if matches!(u.entity(), UpdateSubcommand::Income { id, .. } if id == "42")
        ));
        let args = parse(&["delete", "category", "pets", "--income"]);
        assert!(matches!(
            args.command(),
            Command::Delete(d) if matches!(d.entity(), DeleteSubcommand::Category { income: true, .. })
        ));
    }
}
