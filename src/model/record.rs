use crate::error::{Error, ErrorType, Result};
use crate::model::{Amount, CategoryId};
use crate::utils;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{Error as _, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use tracing::debug;

/// The identity of a record. Assigned once, from the client clock, when the record is created.
///
/// Older ledgers stored ids as bare JSON numbers (millisecond timestamps). Those are accepted and
/// kept in their decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a new id: a millisecond timestamp followed by a random suffix.
    pub fn generate() -> Self {
        Self(utils::generate_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor).map(RecordId)
    }
}

/// Accepts an id stored either as a string or as an integer.
pub(crate) struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("a string or integer id")
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<String, E> {
        if v.fract() == 0.0 && v.is_finite() {
            Ok(format!("{v:.0}"))
        } else {
            Err(E::custom(format!("a fractional number cannot be an id: {v}")))
        }
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<String, E> {
        if v.is_empty() {
            return Err(E::custom("ids cannot be empty"));
        }
        Ok(v.to_string())
    }
}

/// Fields common to every record, used by the store to manage collections generically.
pub trait Record {
    fn id(&self) -> &RecordId;
    fn description(&self) -> &str;
    fn amount(&self) -> Amount;
    fn category_id(&self) -> &CategoryId;
    fn date(&self) -> NaiveDate;
    fn created_at(&self) -> DateTime<Utc>;
}

macro_rules! impl_record {
    ($t:ty) => {
        impl Record for $t {
            fn id(&self) -> &RecordId {
                &self.id
            }
            fn description(&self) -> &str {
                &self.description
            }
            fn amount(&self) -> Amount {
                self.amount
            }
            fn category_id(&self) -> &CategoryId {
                &self.category_id
            }
            fn date(&self) -> NaiveDate {
                self.date
            }
            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
        }
    };
}

/// Whether a reimbursable expense has been paid back, and when.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Payment {
    #[default]
    Pending,
    Paid(NaiveDate),
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        matches!(self, Payment::Paid(_))
    }

    pub fn payment_date(&self) -> Option<NaiveDate> {
        match self {
            Payment::Pending => None,
            Payment::Paid(d) => Some(*d),
        }
    }
}

/// A single expense. Reimbursements are expenses with `is_reimbursement` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ExpenseWire", from = "ExpenseWire")]
pub struct Expense {
    id: RecordId,
    description: String,
    amount: Amount,
    category_id: CategoryId,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    is_reimbursement: bool,
    payment: Payment,
}

impl_record!(Expense);

impl Expense {
    /// Creates a new expense with a fresh id. Returns an error if `fields` are invalid.
    pub fn create(fields: ExpenseFields) -> Result<Self> {
        fields.validate()?;
        Ok(Self {
            id: RecordId::generate(),
            description: fields.description.trim().to_string(),
            amount: fields.amount,
            category_id: fields.category_id,
            date: fields.date,
            created_at: Utc::now(),
            is_reimbursement: fields.is_reimbursement,
            payment: Payment::Pending,
        })
    }

    /// Replaces all editable fields. The id and creation time are preserved. An expense that stops
    /// being a reimbursement loses its payment status.
    pub fn replace(&mut self, fields: ExpenseFields) -> Result<()> {
        fields.validate()?;
        self.description = fields.description.trim().to_string();
        self.amount = fields.amount;
        self.category_id = fields.category_id;
        self.date = fields.date;
        self.is_reimbursement = fields.is_reimbursement;
        if !self.is_reimbursement {
            self.payment = Payment::Pending;
        }
        Ok(())
    }

    pub fn is_reimbursement(&self) -> bool {
        self.is_reimbursement
    }

    pub fn payment(&self) -> Payment {
        self.payment
    }

    pub fn is_paid(&self) -> bool {
        self.payment.is_paid()
    }

    pub fn payment_date(&self) -> Option<NaiveDate> {
        self.payment.payment_date()
    }

    /// A reimbursement that has not been paid back yet.
    pub fn is_pending_reimbursement(&self) -> bool {
        self.is_reimbursement && !self.is_paid()
    }

    pub(crate) fn set_payment(&mut self, payment: Payment) {
        self.payment = payment;
    }
}

/// The editable fields of an expense, used both to create and to replace one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseFields {
    pub description: String,
    pub amount: Amount,
    pub category_id: CategoryId,
    pub date: NaiveDate,
    pub is_reimbursement: bool,
}

impl ExpenseFields {
    fn validate(&self) -> Result<()> {
        validate_common(&self.description, self.amount, &self.category_id)
    }
}

/// The stored shape of an expense. `paymentDate` decides the payment status; `isPaid` is written
/// for readers that expect it but is not trusted on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseWire {
    id: RecordId,
    description: String,
    amount: Amount,
    #[serde(alias = "category")]
    category_id: CategoryId,
    date: NaiveDate,
    #[serde(alias = "timestamp", default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_reimbursement: bool,
    #[serde(default)]
    is_paid: bool,
    #[serde(default)]
    payment_date: Option<NaiveDate>,
}

impl From<Expense> for ExpenseWire {
    fn from(e: Expense) -> Self {
        Self {
            id: e.id,
            description: e.description,
            amount: e.amount,
            category_id: e.category_id,
            date: e.date,
            created_at: e.created_at,
            is_reimbursement: e.is_reimbursement,
            is_paid: e.payment.is_paid(),
            payment_date: e.payment.payment_date(),
        }
    }
}

impl From<ExpenseWire> for Expense {
    fn from(w: ExpenseWire) -> Self {
        if w.is_paid != w.payment_date.is_some() {
            debug!(
                "Expense {} has isPaid={} but paymentDate={:?}, using paymentDate",
                w.id, w.is_paid, w.payment_date
            );
        }
        // Only reimbursements can be paid back.
        let payment = match w.payment_date {
            Some(d) if w.is_reimbursement => Payment::Paid(d),
            Some(d) => {
                debug!(
                    "Expense {} is not a reimbursement but has paymentDate={d}, reading it as pending",
                    w.id
                );
                Payment::Pending
            }
            None => Payment::Pending,
        };
        Self {
            id: w.id,
            description: w.description,
            amount: w.amount,
            category_id: w.category_id,
            date: w.date,
            created_at: w.created_at,
            is_reimbursement: w.is_reimbursement,
            payment,
        }
    }
}

/// A single income entry. Its category lives in the income-category namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    id: RecordId,
    description: String,
    amount: Amount,
    #[serde(alias = "type")]
    category_id: CategoryId,
    date: NaiveDate,
    #[serde(alias = "timestamp", default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl_record!(Income);

impl Income {
    pub fn create(fields: IncomeFields) -> Result<Self> {
        fields.validate()?;
        Ok(Self {
            id: RecordId::generate(),
            description: fields.description.trim().to_string(),
            amount: fields.amount,
            category_id: fields.category_id,
            date: fields.date,
            created_at: Utc::now(),
        })
    }

    pub fn replace(&mut self, fields: IncomeFields) -> Result<()> {
        fields.validate()?;
        self.description = fields.description.trim().to_string();
        self.amount = fields.amount;
        self.category_id = fields.category_id;
        self.date = fields.date;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomeFields {
    pub description: String,
    pub amount: Amount,
    pub category_id: CategoryId,
    pub date: NaiveDate,
}

impl IncomeFields {
    fn validate(&self) -> Result<()> {
        validate_common(&self.description, self.amount, &self.category_id)
    }
}

/// Whether cash went into or out of the petty-cash box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PettyCashKind {
    TopUp,
    #[default]
    Payout,
}

serde_plain::derive_display_from_serialize!(PettyCashKind);
serde_plain::derive_fromstr_from_deserialize!(PettyCashKind);

/// A single movement of the petty-cash box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PettyCashEntry {
    id: RecordId,
    description: String,
    amount: Amount,
    #[serde(alias = "category")]
    category_id: CategoryId,
    date: NaiveDate,
    #[serde(alias = "timestamp", default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    kind: PettyCashKind,
}

impl_record!(PettyCashEntry);

impl PettyCashEntry {
    pub fn create(fields: PettyCashFields) -> Result<Self> {
        fields.validate()?;
        Ok(Self {
            id: RecordId::generate(),
            description: fields.description.trim().to_string(),
            amount: fields.amount,
            category_id: fields.category_id,
            date: fields.date,
            created_at: Utc::now(),
            kind: fields.kind,
        })
    }

    pub fn replace(&mut self, fields: PettyCashFields) -> Result<()> {
        fields.validate()?;
        self.description = fields.description.trim().to_string();
        self.amount = fields.amount;
        self.category_id = fields.category_id;
        self.date = fields.date;
        self.kind = fields.kind;
        Ok(())
    }

    pub fn kind(&self) -> PettyCashKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PettyCashFields {
    pub description: String,
    pub amount: Amount,
    pub category_id: CategoryId,
    pub date: NaiveDate,
    pub kind: PettyCashKind,
}

impl PettyCashFields {
    fn validate(&self) -> Result<()> {
        validate_common(&self.description, self.amount, &self.category_id)
    }
}

fn validate_common(description: &str, amount: Amount, category_id: &CategoryId) -> Result<()> {
    if description.trim().is_empty() {
        return Err(Error::msg(ErrorType::Validation, "A description is required"));
    }
    if amount.is_zero() {
        return Err(Error::msg(
            ErrorType::Validation,
            "The amount must be greater than zero",
        ));
    }
    if category_id.as_str().is_empty() {
        return Err(Error::msg(ErrorType::Validation, "A category is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn fields() -> ExpenseFields {
        ExpenseFields {
            description: "Coffee".to_string(),
            amount: Amount::from_str("4.50").unwrap(),
            category_id: CategoryId::from("food"),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            is_reimbursement: true,
        }
    }

    #[test]
    fn test_create_assigns_distinct_ids() {
        let a = Expense::create(fields()).unwrap();
        let b = Expense::create(fields()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.description(), "Coffee");
        assert_eq!(a.payment(), Payment::Pending);
    }

    #[test]
    fn test_create_rejects_missing_fields() {
        let mut f = fields();
        f.description = "   ".to_string();
        let err = Expense::create(f).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);

        let mut f = fields();
        f.amount = Amount::ZERO;
        assert!(Expense::create(f).is_err());

        let mut f = fields();
        f.category_id = CategoryId::from("");
        assert!(Expense::create(f).is_err());
    }

    #[test]
    fn test_replace_preserves_identity() {
        let mut e = Expense::create(fields()).unwrap();
        let id = e.id().clone();
        let created = e.created_at();
        let mut f = fields();
        f.description = "Tea".to_string();
        e.replace(f).unwrap();
        assert_eq!(e.id(), &id);
        assert_eq!(e.created_at(), created);
        assert_eq!(e.description(), "Tea");
    }

    #[test]
    fn test_replace_non_reimbursement_clears_payment() {
        let mut e = Expense::create(fields()).unwrap();
        e.set_payment(Payment::Paid(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        let mut f = fields();
        f.is_reimbursement = false;
        e.replace(f).unwrap();
        assert!(!e.is_paid());
        assert_eq!(e.payment_date(), None);
    }

    #[test]
    fn test_expense_wire_format() {
        let mut e = Expense::create(fields()).unwrap();
        e.set_payment(Payment::Paid(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["isPaid"], true);
        assert_eq!(v["paymentDate"], "2024-06-03");
        assert_eq!(v["categoryId"], "food");
        assert_eq!(v["amount"], 4.5);
        let back: Expense = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_legacy_expense_is_read() {
        let json = r#"{
            "id": 1717236000000,
            "description": "Taxi",
            "amount": 23.4,
            "category": "transport",
            "date": "2024-06-01",
            "isReimbursement": true,
            "isPaid": false,
            "paymentDate": null,
            "timestamp": "2024-06-01T10:00:00.000Z"
        }"#;
        let e: Expense = serde_json::from_str(json).unwrap();
        assert_eq!(e.id().as_str(), "1717236000000");
        assert_eq!(e.category_id().as_str(), "transport");
        assert!(e.is_pending_reimbursement());
    }

    #[test]
    fn test_payment_date_is_authoritative() {
        // Paid without a date cannot be represented, so it reads as pending.
        let json = r#"{"id":"a","description":"x","amount":1,"categoryId":"food",
            "date":"2024-06-01","isReimbursement":true,"isPaid":true,"paymentDate":null}"#;
        let e: Expense = serde_json::from_str(json).unwrap();
        assert!(!e.is_paid());

        // Unpaid with a date reads as paid on that date.
        let json = r#"{"id":"a","description":"x","amount":1,"categoryId":"food",
            "date":"2024-06-01","isReimbursement":true,"isPaid":false,"paymentDate":"2024-06-09"}"#;
        let e: Expense = serde_json::from_str(json).unwrap();
        assert_eq!(e.payment_date(), NaiveDate::from_ymd_opt(2024, 6, 9));
        assert!(e.is_paid());
    }

    #[test]
    fn test_payment_date_ignored_for_non_reimbursement() {
        let json = r#"{"id":"a","description":"x","amount":1,"categoryId":"food",
            "date":"2024-06-01","isReimbursement":false,"isPaid":true,"paymentDate":"2024-06-09"}"#;
        let e: Expense = serde_json::from_str(json).unwrap();
        assert_eq!(e.payment(), Payment::Pending);
        assert!(!e.is_paid());
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["isPaid"], false);
        assert!(v["paymentDate"].is_null());
    }

    #[test]
    fn test_income_accepts_type_alias() {
        let json = r#"{"id":5,"description":"Pay","amount":2500,"type":"salary",
            "date":"2024-06-01","timestamp":"2024-06-01T10:00:00Z"}"#;
        let i: Income = serde_json::from_str(json).unwrap();
        assert_eq!(i.category_id().as_str(), "salary");
        let v = serde_json::to_value(&i).unwrap();
        assert_eq!(v["categoryId"], "salary");
    }

    #[test]
    fn test_petty_cash_kind_round_trip() {
        assert_eq!(PettyCashKind::TopUp.to_string(), "topUp");
        assert_eq!(
            PettyCashKind::from_str("payout").unwrap(),
            PettyCashKind::Payout
        );
    }

    #[test]
    fn test_record_id_rejects_fraction() {
        assert!(serde_json::from_str::<RecordId>("1.5").is_err());
        assert!(serde_json::from_str::<RecordId>("\"\"").is_err());
    }
}
