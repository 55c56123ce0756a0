//! Totals and statistics computed from a ledger snapshot.

use crate::model::{Amount, CategoryId, CategoryKind, LedgerSnapshot, PettyCashKind, Record};
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Category totals and trends label records whose category no longer exists with this name.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// All-time totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    /// Reimbursable expenses that have not been paid back yet.
    pub pending_reimbursements: Decimal,
    /// Income plus pending reimbursements minus expenses.
    pub net_balance: Decimal,
    pub petty_cash_balance: Decimal,
}

/// Figures for a single calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyStats {
    /// The first day of the month.
    pub month: NaiveDate,
    pub income: Decimal,
    pub expenses: Decimal,
    /// `income - expenses` for the month.
    pub net: Decimal,
    /// Month's expenses divided by the number of days counted so far (`as_of`'s day of month when
    /// `as_of` is in this month, otherwise the whole month).
    pub average_daily_spend: Decimal,
    /// The expense category name with the highest all-time total.
    pub top_category: Option<String>,
}

/// Total spent in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub id: Option<CategoryId>,
    pub name: String,
    pub total: Decimal,
}

/// Income and expenses of one month in a trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTotals {
    pub month: NaiveDate,
    pub income: Decimal,
    pub expenses: Decimal,
}

/// Formats a signed money value the way `Amount` displays, e.g. `-$1,250.50`.
pub fn money(value: Decimal) -> String {
    let sign = if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else {
        ""
    };
    let magnitude = value.abs().round_dp(2).to_f64().unwrap_or_default();
    format!("{sign}${}", format_num::format_num!(",.2", magnitude))
}

fn total<'a, R: Record + 'a>(records: impl IntoIterator<Item = &'a R>) -> Decimal {
    records
        .into_iter()
        .map(|r| r.amount())
        .sum::<Amount>()
        .into()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn in_month<R: Record>(record: &R, month: NaiveDate) -> bool {
    record.date().year() == month.year() && record.date().month() == month.month()
}

fn days_in_month(month: NaiveDate) -> u32 {
    let first = first_of_month(month);
    match first.checked_add_months(Months::new(1)) {
        Some(next) => (next - first).num_days() as u32,
        None => 31,
    }
}

pub fn summary(ledger: &LedgerSnapshot) -> Summary {
    let total_income = total(ledger.income());
    let total_expenses = total(ledger.expenses());
    let pending_reimbursements = total(
        ledger
            .expenses()
            .iter()
            .filter(|e| e.is_pending_reimbursement()),
    );
    Summary {
        total_income,
        total_expenses,
        pending_reimbursements,
        net_balance: total_income + pending_reimbursements - total_expenses,
        petty_cash_balance: petty_cash_balance(ledger),
    }
}

/// Top-ups minus payouts.
pub fn petty_cash_balance(ledger: &LedgerSnapshot) -> Decimal {
    ledger
        .petty_cash()
        .iter()
        .map(|p| match p.kind() {
            PettyCashKind::TopUp => p.amount().value(),
            PettyCashKind::Payout => -p.amount().value(),
        })
        .sum()
}

/// Statistics for the month containing `as_of`.
pub fn monthly_stats(ledger: &LedgerSnapshot, as_of: NaiveDate) -> MonthlyStats {
    let month = first_of_month(as_of);
    let income = total(ledger.income().iter().filter(|i| in_month(*i, month)));
    let expenses = total(ledger.expenses().iter().filter(|e| in_month(*e, month)));
    let days = as_of.day().min(days_in_month(month)).max(1);
    let top_category = category_totals(ledger)
        .into_iter()
        .next()
        .map(|c| c.name);
    MonthlyStats {
        month,
        income,
        expenses,
        net: income - expenses,
        average_daily_spend: (expenses / Decimal::from(days)).round_dp(2),
        top_category,
    }
}

/// All-time expense totals per category, largest first. Ties are broken by name.
pub fn category_totals(ledger: &LedgerSnapshot) -> Vec<CategoryTotal> {
    let mut by_id: BTreeMap<Option<CategoryId>, Decimal> = BTreeMap::new();
    for expense in ledger.expenses() {
        let key = ledger
            .category(CategoryKind::Expense, expense.category_id())
            .map(|c| c.id().clone());
        *by_id.entry(key).or_default() += expense.amount().value();
    }
    let mut totals: Vec<CategoryTotal> = by_id
        .into_iter()
        .map(|(id, total)| {
            let name = id
                .as_ref()
                .and_then(|id| ledger.category(CategoryKind::Expense, id))
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            CategoryTotal { id, name, total }
        })
        .collect();
    totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    totals
}

/// Income and expenses for the six months ending with the month of `as_of`, oldest first.
pub fn six_month_trend(ledger: &LedgerSnapshot, as_of: NaiveDate) -> Vec<MonthTotals> {
    let current = first_of_month(as_of);
    (0..6u32)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(|month| MonthTotals {
            month,
            income: total(ledger.income().iter().filter(|i| in_month(*i, month))),
            expenses: total(ledger.expenses().iter().filter(|e| in_month(*e, month))),
        })
        .collect()
}

/// The number of tips `tips` always returns.
pub const TIP_COUNT: usize = 3;

/// Spending above this share of the month's income draws a warning.
const HIGH_EXPENSE_PERCENT: i64 = 80;
/// Spending below this share of the month's income is praised.
const LOW_EXPENSE_PERCENT: i64 = 50;
/// A monthly net above this is a strong position.
const STRONG_NET: i64 = 1000;
/// Reimbursements pending longer than this many days are old.
const OLD_PENDING_DAYS: i64 = 30;

/// How a tip should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TipKind {
    Warning,
    Success,
    Info,
}

/// A piece of advice derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tip", rename_all = "snake_case")]
pub enum Tip {
    /// The month's expenses are more than 80% of its income.
    HighExpenseRatio {
        percent: Decimal,
        expenses: Decimal,
        income: Decimal,
    },
    /// The month's expenses are less than 50% of its income.
    ExcellentSavingsRate { percent: Decimal },
    NegativeMonthlyBalance { shortfall: Decimal },
    StrongFinancialPosition { net: Decimal },
    /// The oldest pending reimbursement is more than 30 days old.
    OldPendingReimbursements { days: i64, total: Decimal },
    PendingReimbursements { total: Decimal },
    TrackIncomeSources,
    AutomateSavings,
    RegularFinancialReviews,
}

impl Tip {
    pub fn kind(&self) -> TipKind {
        match self {
            Tip::HighExpenseRatio { .. }
            | Tip::NegativeMonthlyBalance { .. }
            | Tip::OldPendingReimbursements { .. } => TipKind::Warning,
            Tip::ExcellentSavingsRate { .. }
            | Tip::StrongFinancialPosition { .. }
            | Tip::TrackIncomeSources
            | Tip::RegularFinancialReviews => TipKind::Success,
            Tip::PendingReimbursements { .. } | Tip::AutomateSavings => TipKind::Info,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Tip::HighExpenseRatio { .. } => "High Expense Ratio",
            Tip::ExcellentSavingsRate { .. } => "Excellent Savings Rate!",
            Tip::NegativeMonthlyBalance { .. } => "Negative Monthly Balance",
            Tip::StrongFinancialPosition { .. } => "Strong Financial Position",
            Tip::OldPendingReimbursements { .. } => "Old Pending Reimbursements",
            Tip::PendingReimbursements { .. } => "Pending Reimbursements",
            Tip::TrackIncomeSources => "Track Income Sources",
            Tip::AutomateSavings => "Automate Savings",
            Tip::RegularFinancialReviews => "Regular Financial Reviews",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Tip::HighExpenseRatio {
                percent,
                expenses,
                income,
            } => format!(
                "You're spending {:.1}% of your income this month ({} of {}).",
                percent,
                money(*expenses),
                money(*income)
            ),
            Tip::ExcellentSavingsRate { percent } => format!(
                "You're only spending {:.1}% of your income. Great financial discipline!",
                percent
            ),
            Tip::NegativeMonthlyBalance { shortfall } => format!(
                "Your expenses exceed income by {} this month.",
                money(*shortfall)
            ),
            Tip::StrongFinancialPosition { net } => {
                format!("You have a positive balance of {} this month.", money(*net))
            }
            Tip::OldPendingReimbursements { days, total } => format!(
                "You have reimbursements pending for {days} days totaling {}.",
                money(*total)
            ),
            Tip::PendingReimbursements { total } => {
                format!("You have {} in pending reimbursements.", money(*total))
            }
            Tip::TrackIncomeSources => "Diversifying income sources provides financial security \
                and growth opportunities."
                .to_string(),
            Tip::AutomateSavings => {
                "Set up automatic transfers to savings when you receive income.".to_string()
            }
            Tip::RegularFinancialReviews => {
                "Monthly reviews help identify spending patterns and opportunities.".to_string()
            }
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Tip::HighExpenseRatio { .. } => {
                "Consider reducing non-essential expenses to improve your savings rate."
            }
            Tip::ExcellentSavingsRate { .. } => {
                "Consider investing the surplus or building your emergency fund."
            }
            Tip::NegativeMonthlyBalance { .. } => {
                "Review your expenses and consider additional income sources or expense reduction."
            }
            Tip::StrongFinancialPosition { .. } => {
                "Consider investing this surplus or increasing your emergency fund."
            }
            Tip::OldPendingReimbursements { .. } => {
                "Follow up on old reimbursements to improve your cash flow."
            }
            Tip::PendingReimbursements { .. } => {
                "Use `ledger pay` with several ids to mark reimbursements as paid in one go."
            }
            Tip::TrackIncomeSources => {
                "Consider adding freelance work, investments, or side businesses to your income mix."
            }
            Tip::AutomateSavings => {
                "Save 20% of income automatically before you have a chance to spend it."
            }
            Tip::RegularFinancialReviews => {
                "Use `ledger summary` to review your financial patterns monthly."
            }
        }
    }
}

/// Advice for the month containing `as_of`. Ledger-specific tips come first and general tips fill
/// the list up to `TIP_COUNT`.
pub fn tips(ledger: &LedgerSnapshot, as_of: NaiveDate) -> Vec<Tip> {
    let month = first_of_month(as_of);
    let income = total(ledger.income().iter().filter(|i| in_month(*i, month)));
    let expenses = total(ledger.expenses().iter().filter(|e| in_month(*e, month)));
    let net = income - expenses;
    let mut tips = Vec::with_capacity(TIP_COUNT);

    if income > Decimal::ZERO {
        let percent = expenses / income * Decimal::ONE_HUNDRED;
        if percent > Decimal::from(HIGH_EXPENSE_PERCENT) {
            tips.push(Tip::HighExpenseRatio {
                percent,
                expenses,
                income,
            });
        } else if percent < Decimal::from(LOW_EXPENSE_PERCENT) {
            tips.push(Tip::ExcellentSavingsRate { percent });
        }
    }

    if net < Decimal::ZERO {
        tips.push(Tip::NegativeMonthlyBalance { shortfall: -net });
    } else if net > Decimal::from(STRONG_NET) {
        tips.push(Tip::StrongFinancialPosition { net });
    }

    let pending = ledger
        .expenses()
        .iter()
        .filter(|e| e.is_pending_reimbursement())
        .collect::<Vec<_>>();
    if let Some(oldest) = pending.iter().map(|e| e.date()).min() {
        let pending_total = total(pending.iter().copied());
        let days = (as_of - oldest).num_days();
        if days > OLD_PENDING_DAYS {
            tips.push(Tip::OldPendingReimbursements {
                days,
                total: pending_total,
            });
        } else {
            tips.push(Tip::PendingReimbursements {
                total: pending_total,
            });
        }
    }

    let general = [
        Tip::TrackIncomeSources,
        Tip::AutomateSavings,
        Tip::RegularFinancialReviews,
    ];
    let missing = TIP_COUNT.saturating_sub(tips.len());
    tips.extend(general.into_iter().take(missing));
    tips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Expense, ExpenseFields, Income, IncomeFields, Payment, PettyCashEntry, PettyCashFields,
    };
    use std::str::FromStr;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn expense(amount: &str, category: &str, date: NaiveDate, reimbursement: bool) -> Expense {
        Expense::create(ExpenseFields {
            description: "x".to_string(),
            amount: Amount::from_str(amount).unwrap(),
            category_id: CategoryId::from(category),
            date,
            is_reimbursement: reimbursement,
        })
        .unwrap()
    }

    fn income(amount: &str, date: NaiveDate) -> Income {
        Income::create(IncomeFields {
            description: "pay".to_string(),
            amount: Amount::from_str(amount).unwrap(),
            category_id: CategoryId::from("salary"),
            date,
        })
        .unwrap()
    }

    fn ledger() -> LedgerSnapshot {
        let mut l = LedgerSnapshot::default();
        l.income.push(income("3000", d(2024, 6, 1)));
        l.income.push(income("500", d(2024, 5, 20)));
        l.expenses.push(expense("100", "food", d(2024, 6, 2), false));
        l.expenses.push(expense("40", "transport", d(2024, 6, 3), true));
        let mut paid = expense("60", "transport", d(2024, 5, 3), true);
        paid.set_payment(Payment::Paid(d(2024, 5, 10)));
        l.expenses.push(paid);
        l.expenses.push(expense("10", "deleted-category", d(2024, 6, 4), false));
        l
    }

    #[test]
    fn test_summary() {
        let s = summary(&ledger());
        assert_eq!(s.total_income, dec("3500"));
        assert_eq!(s.total_expenses, dec("210"));
        assert_eq!(s.pending_reimbursements, dec("40"));
        assert_eq!(s.net_balance, dec("3330"));
        assert_eq!(s.petty_cash_balance, Decimal::ZERO);
    }

    #[test]
    fn test_monthly_stats() {
        let stats = monthly_stats(&ledger(), d(2024, 6, 10));
        assert_eq!(stats.month, d(2024, 6, 1));
        assert_eq!(stats.income, dec("3000"));
        assert_eq!(stats.expenses, dec("150"));
        assert_eq!(stats.net, dec("2850"));
        assert_eq!(stats.average_daily_spend, dec("15.00"));
        assert_eq!(stats.top_category.as_deref(), Some("Food & Dining"));
    }

    #[test]
    fn test_category_totals_labels_unknown() {
        let totals = category_totals(&ledger());
        // Food and transport tie at 100; the name breaks the tie.
        assert_eq!(totals[0].name, "Food & Dining");
        assert_eq!(totals[1].name, "Transportation");
        assert_eq!(totals[1].total, dec("100"));
        let unknown = totals.iter().find(|t| t.id.is_none()).unwrap();
        assert_eq!(unknown.name, UNKNOWN_CATEGORY);
        assert_eq!(unknown.total, dec("10"));
    }

    #[test]
    fn test_six_month_trend() {
        let trend = six_month_trend(&ledger(), d(2024, 6, 30));
        assert_eq!(trend.len(), 6);
        assert_eq!(trend[0].month, d(2024, 1, 1));
        assert_eq!(trend[5].month, d(2024, 6, 1));
        assert_eq!(trend[4].income, dec("500"));
        assert_eq!(trend[4].expenses, dec("60"));
        assert_eq!(trend[5].expenses, dec("150"));
    }

    #[test]
    fn test_money() {
        assert_eq!(money(dec("1250.5")), "$1,250.50");
        assert_eq!(money(dec("-42")), "-$42.00");
        assert_eq!(money(Decimal::ZERO), "$0.00");
    }

    #[test]
    fn test_money_beyond_a_single_amount() {
        assert_eq!(money(dec("20000000000000")), "$20,000,000,000,000.00");
    }

    #[test]
    fn test_summary_of_largest_amounts() {
        let mut l = LedgerSnapshot::default();
        for _ in 0..3 {
            l.expenses.push(expense(
                "9,999,999,999,999.99",
                "food",
                d(2024, 6, 2),
                true,
            ));
        }
        let s = summary(&l);
        assert_eq!(s.total_expenses, dec("29999999999999.97"));
        assert_eq!(s.net_balance, Decimal::ZERO);
    }

    fn month_ledger(income_amount: &str, expense_amount: &str) -> LedgerSnapshot {
        let mut l = LedgerSnapshot::default();
        l.income.push(income(income_amount, d(2024, 6, 1)));
        l.expenses.push(expense(expense_amount, "food", d(2024, 6, 2), false));
        l
    }

    #[test]
    fn test_tips_high_expense_ratio() {
        let tips = tips(&month_ledger("1000", "900"), d(2024, 6, 10));
        assert_eq!(
            tips[0],
            Tip::HighExpenseRatio {
                percent: dec("90"),
                expenses: dec("900"),
                income: dec("1000"),
            }
        );
        assert_eq!(tips[0].kind(), TipKind::Warning);
        assert_eq!(
            tips[0].description(),
            "You're spending 90.0% of your income this month ($900.00 of $1,000.00)."
        );
        // Net is 100: neither negative nor strong, so general tips fill the rest.
        assert_eq!(tips[1], Tip::TrackIncomeSources);
        assert_eq!(tips[2], Tip::AutomateSavings);
    }

    #[test]
    fn test_tips_ratio_between_thresholds_is_silent() {
        let tips = tips(&month_ledger("1000", "800"), d(2024, 6, 10));
        assert_eq!(
            tips,
            vec![
                Tip::TrackIncomeSources,
                Tip::AutomateSavings,
                Tip::RegularFinancialReviews
            ]
        );
    }

    #[test]
    fn test_tips_savings_rate_and_strong_position() {
        let tips = tips(&month_ledger("3000", "600"), d(2024, 6, 10));
        assert_eq!(tips[0], Tip::ExcellentSavingsRate { percent: dec("20") });
        assert_eq!(tips[1], Tip::StrongFinancialPosition { net: dec("2400") });
        assert_eq!(tips[2], Tip::TrackIncomeSources);
    }

    #[test]
    fn test_tips_negative_balance_without_income() {
        let mut l = LedgerSnapshot::default();
        l.expenses.push(expense("250", "food", d(2024, 6, 2), false));
        let tips = tips(&l, d(2024, 6, 10));
        assert_eq!(tips[0], Tip::NegativeMonthlyBalance { shortfall: dec("250") });
        assert_eq!(
            tips[0].description(),
            "Your expenses exceed income by $250.00 this month."
        );
        assert_eq!(tips.len(), TIP_COUNT);
    }

    #[test]
    fn test_tips_pending_reimbursements() {
        let mut l = month_ledger("1000", "800");
        l.expenses.push(expense("40", "transport", d(2024, 5, 20), true));
        l.expenses.push(expense("25", "transport", d(2024, 5, 25), true));

        // 21 days after the oldest.
        let recent = tips(&l, d(2024, 6, 10));
        assert_eq!(recent[0], Tip::PendingReimbursements { total: dec("65") });
        assert_eq!(recent[0].kind(), TipKind::Info);

        // Exactly 30 days is not old yet, 31 is.
        let boundary = tips(&l, d(2024, 6, 19));
        assert_eq!(boundary[0], Tip::PendingReimbursements { total: dec("65") });
        let old = tips(&l, d(2024, 6, 20));
        assert_eq!(
            old[0],
            Tip::OldPendingReimbursements {
                days: 31,
                total: dec("65")
            }
        );
    }

    #[test]
    fn test_tips_never_exceed_count() {
        let mut l = month_ledger("100", "500");
        l.expenses.push(expense("40", "transport", d(2024, 1, 2), true));
        let tips = tips(&l, d(2024, 6, 10));
        assert_eq!(tips.len(), TIP_COUNT);
        assert!(matches!(tips[0], Tip::HighExpenseRatio { .. }));
        assert!(matches!(tips[1], Tip::NegativeMonthlyBalance { .. }));
        assert!(matches!(tips[2], Tip::OldPendingReimbursements { .. }));
    }

    #[test]
    fn test_petty_cash_balance() {
        let mut l = LedgerSnapshot::default();
        for (amount, kind) in [("50", PettyCashKind::TopUp), ("12.25", PettyCashKind::Payout)] {
            l.petty_cash.push(
                PettyCashEntry::create(PettyCashFields {
                    description: "box".to_string(),
                    amount: Amount::from_str(amount).unwrap(),
                    category_id: CategoryId::from("other"),
                    date: d(2024, 6, 1),
                    kind,
                })
                .unwrap(),
            );
        }
        assert_eq!(petty_cash_balance(&l), dec("37.75"));
    }
}
