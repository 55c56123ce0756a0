//! Implements the `Remote` trait on top of a per-user document store.
//!
//! Every record and category is its own document, grouped in collections under the user's
//! identity:
//!
//! ```text
//! users/{user}/expenses/{id}
//! users/{user}/income/{id}
//! users/{user}/pettyCash/{id}
//! users/{user}/categories/{id}
//! users/{user}/incomeCategories/{id}
//! users/{user}/meta/ledger          { "lastUpdated", "categoryOrder", "incomeCategoryOrder" }
//! ```
//!
//! Replacing a collection upserts every current document first and only then deletes the
//! documents that are no longer present, so an interrupted push never leaves a collection empty.

use crate::api::{check_status, http_client, transport_error, Remote};
use crate::error::{Error, ErrorType, IntoResult, Result};
use crate::model::{
    default_expense_categories, default_income_categories, Category, Expense, Income,
    LedgerSnapshot, PettyCashEntry, Record,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, trace};
use url::Url;

const EXPENSES: &str = "expenses";
const INCOME: &str = "income";
const PETTY_CASH: &str = "pettyCash";
const CATEGORIES: &str = "categories";
const INCOME_CATEGORIES: &str = "incomeCategories";
const META: &str = "meta";
const META_ID: &str = "ledger";

/// A minimal document-store client: collections of JSON documents keyed by id.
#[async_trait::async_trait]
pub(crate) trait Documents: Send {
    /// All documents of `collection` as `(id, document)` pairs.
    async fn list(&mut self, collection: &str) -> Result<Vec<(String, Value)>>;

    /// Creates or overwrites the document `id` of `collection`.
    async fn upsert(&mut self, collection: &str, id: &str, document: &Value) -> Result<()>;

    /// Deletes the document `id` of `collection`. Deleting a missing document is not an error.
    async fn delete(&mut self, collection: &str, id: &str) -> Result<()>;
}

/// A `Remote` that stores the ledger as one document per record.
pub(crate) struct DocumentRemote<D: Documents> {
    documents: D,
    user: String,
}

impl<D: Documents> DocumentRemote<D> {
    pub(crate) fn new(documents: D, user: impl Into<String>) -> Self {
        Self {
            documents,
            user: user.into(),
        }
    }

    fn collection(&self, name: &str) -> String {
        format!("users/{}/{name}", self.user)
    }

    async fn read<T: DeserializeOwned>(&mut self, name: &str) -> Result<Vec<T>> {
        let collection = self.collection(name);
        let docs = self.documents.list(&collection).await?;
        docs.into_iter()
            .map(|(id, doc)| {
                serde_json::from_value(doc).map_err(|e| {
                    Error::new(
                        ErrorType::RemoteRejected,
                        anyhow::Error::new(e)
                            .context(format!("Unreadable document '{id}' in {collection}")),
                    )
                })
            })
            .collect()
    }

    /// Upserts every entry of `documents`, then deletes whatever else the collection holds.
    async fn replace(&mut self, name: &str, documents: Vec<(String, Value)>) -> Result<()> {
        let collection = self.collection(name);
        let keep: HashSet<String> = documents.iter().map(|(id, _)| id.clone()).collect();
        for (id, doc) in &documents {
            self.documents.upsert(&collection, id, doc).await?;
        }
        let existing = self.documents.list(&collection).await?;
        for (id, _) in existing {
            if !keep.contains(&id) {
                trace!("Deleting stale document {collection}/{id}");
                self.documents.delete(&collection, &id).await?;
            }
        }
        debug!("Replaced {collection} with {} documents", keep.len());
        Ok(())
    }
}

#[async_trait::async_trait]
impl<D: Documents> Remote for DocumentRemote<D> {
    async fn fetch(&mut self) -> Result<Option<LedgerSnapshot>> {
        let meta: Vec<Meta> = self.read(META).await?;
        let expenses: Vec<Expense> = self.read(EXPENSES).await?;
        let income: Vec<Income> = self.read(INCOME).await?;
        let petty_cash: Vec<PettyCashEntry> = self.read(PETTY_CASH).await?;
        let categories: Vec<Category> = self.read(CATEGORIES).await?;
        let income_categories: Vec<Category> = self.read(INCOME_CATEGORIES).await?;

        let nothing_stored = meta.is_empty()
            && expenses.is_empty()
            && income.is_empty()
            && petty_cash.is_empty()
            && categories.is_empty()
            && income_categories.is_empty();
        if nothing_stored {
            return Ok(None);
        }

        let meta = meta.into_iter().next();
        let mut snapshot = LedgerSnapshot {
            expenses: by_creation(expenses),
            income: by_creation(income),
            petty_cash: by_creation(petty_cash),
            categories: non_empty_or(categories, default_expense_categories),
            income_categories: non_empty_or(income_categories, default_income_categories),
            ..LedgerSnapshot::default()
        };
        if let Some(meta) = meta {
            snapshot.last_updated = meta.last_updated;
            order_by(&mut snapshot.categories, &meta.category_order);
            order_by(&mut snapshot.income_categories, &meta.income_category_order);
        }
        Ok(Some(snapshot))
    }

    async fn push(&mut self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.replace(EXPENSES, record_documents(snapshot.expenses())?)
            .await?;
        self.replace(INCOME, record_documents(snapshot.income())?)
            .await?;
        self.replace(PETTY_CASH, record_documents(snapshot.petty_cash())?)
            .await?;
        self.replace(CATEGORIES, category_documents(snapshot.categories())?)
            .await?;
        self.replace(
            INCOME_CATEGORIES,
            category_documents(snapshot.income_categories())?,
        )
        .await?;
        let meta = to_document(&Meta {
            last_updated: snapshot.last_updated(),
            category_order: ids(snapshot.categories()),
            income_category_order: ids(snapshot.income_categories()),
        })?;
        let collection = self.collection(META);
        self.documents.upsert(&collection, META_ID, &meta).await
    }

    fn identity(&self) -> Option<String> {
        Some(self.user.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    last_updated: DateTime<Utc>,
    /// Category documents carry no position, so the display order is kept here.
    #[serde(default)]
    category_order: Vec<String>,
    #[serde(default)]
    income_category_order: Vec<String>,
}

fn ids(categories: &[Category]) -> Vec<String> {
    categories.iter().map(|c| c.id().to_string()).collect()
}

/// Sorts `categories` by their position in `order`. Categories missing from `order` go last.
fn order_by(categories: &mut [Category], order: &[String]) {
    categories.sort_by_key(|c| {
        order
            .iter()
            .position(|id| id == c.id().as_str())
            .unwrap_or(usize::MAX)
    });
}

/// Document listings come back ordered by id; records are returned in creation order.
fn by_creation<T: Record>(mut records: Vec<T>) -> Vec<T> {
    records.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
    records
}

fn non_empty_or(categories: Vec<Category>, default: fn() -> Vec<Category>) -> Vec<Category> {
    if categories.is_empty() {
        default()
    } else {
        categories
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).pub_result(ErrorType::RemoteRejected)
}

fn record_documents<T: Record + Serialize>(records: &[T]) -> Result<Vec<(String, Value)>> {
    records
        .iter()
        .map(|r| Ok((r.id().to_string(), to_document(r)?)))
        .collect()
}

fn category_documents(categories: &[Category]) -> Result<Vec<(String, Value)>> {
    categories
        .iter()
        .map(|c| Ok((c.id().to_string(), to_document(c)?)))
        .collect()
}

/// A `Documents` client for a REST document service:
///
/// - `GET    {base}/{collection}` answers `{ "documents": [{ "id": ..., "data": {...} }] }`
/// - `PUT    {base}/{collection}/{id}` stores the request body
/// - `DELETE {base}/{collection}/{id}`
///
/// Requests carry the user's id token as a bearer token.
pub(crate) struct RestDocuments {
    client: reqwest::Client,
    base: Url,
    id_token: Option<String>,
}

impl RestDocuments {
    pub(crate) fn new(base: Url, id_token: Option<String>) -> Result<Self> {
        let mut base = base;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: http_client()?,
            base,
            id_token,
        })
    }

    fn token(&self) -> Result<&str> {
        self.id_token.as_deref().ok_or_else(|| {
            Error::msg(
                ErrorType::AuthRequired,
                "No id token is available for the document remote. Add id_token to \
                .secrets/credentials.json",
            )
        })
    }

    fn endpoint(&self, collection: &str, id: Option<&str>) -> Result<Url> {
        let path = match id {
            Some(id) => format!("{collection}/{id}"),
            None => collection.to_string(),
        };
        self.base.join(&path).pub_result(ErrorType::Config)
    }
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    documents: Vec<ListedDocument>,
}

#[derive(Deserialize)]
struct ListedDocument {
    id: String,
    data: Value,
}

#[async_trait::async_trait]
impl Documents for RestDocuments {
    async fn list(&mut self, collection: &str) -> Result<Vec<(String, Value)>> {
        let url = self.endpoint(collection, None)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(|e| transport_error(e, "Listing documents"))?;
        let response = check_status(response, "Listing documents").await?;
        let listing: Listing = response
            .json()
            .await
            .map_err(|e| transport_error(e, "Reading the document listing"))?;
        Ok(listing
            .documents
            .into_iter()
            .map(|d| (d.id, d.data))
            .collect())
    }

    async fn upsert(&mut self, collection: &str, id: &str, document: &Value) -> Result<()> {
        let url = self.endpoint(collection, Some(id))?;
        let response = self
            .client
            .put(url)
            .bearer_auth(self.token()?)
            .json(document)
            .send()
            .await
            .map_err(|e| transport_error(e, "Writing a document"))?;
        check_status(response, "Writing a document").await?;
        Ok(())
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<()> {
        let url = self.endpoint(collection, Some(id))?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(|e| transport_error(e, "Deleting a document"))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response, "Deleting a document").await?;
        Ok(())
    }
}

type Collections = HashMap<String, BTreeMap<String, Value>>;

fn test_collections() -> &'static Mutex<Collections> {
    static COLLECTIONS: OnceLock<Mutex<Collections>> = OnceLock::new();
    COLLECTIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// An in-memory `Documents` implementation. All instances share one process-wide store, so two
/// stores opened for the same user see each other's writes.
///
/// Note: this is compiled into the program so that the document remote can be exercised end to
/// end without a network.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TestDocuments;

impl TestDocuments {
    fn with<R>(f: impl FnOnce(&mut Collections) -> R) -> R {
        let mut guard = test_collections()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[async_trait::async_trait]
impl Documents for TestDocuments {
    async fn list(&mut self, collection: &str) -> Result<Vec<(String, Value)>> {
        Ok(Self::with(|c| {
            c.get(collection)
                .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()
        }))
    }

    async fn upsert(&mut self, collection: &str, id: &str, document: &Value) -> Result<()> {
        Self::with(|c| {
            c.entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), document.clone());
        });
        Ok(())
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<()> {
        Self::with(|c| {
            if let Some(docs) = c.get_mut(collection) {
                docs.remove(id);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, CategoryId, Expense, ExpenseFields};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn unique_user() -> String {
        format!("user-{}", uuid::Uuid::new_v4())
    }

    fn expense(description: &str) -> Expense {
        Expense::create(ExpenseFields {
            description: description.to_string(),
            amount: Amount::from_str("12.00").unwrap(),
            category_id: CategoryId::from("food"),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            is_reimbursement: false,
        })
        .unwrap()
    }

    /// Wraps `TestDocuments` and records the size of every collection after each write.
    struct Observed {
        inner: TestDocuments,
        sizes: Vec<(String, usize)>,
    }

    impl Observed {
        async fn record(&mut self, collection: &str) {
            let len = self.inner.list(collection).await.unwrap().len();
            self.sizes.push((collection.to_string(), len));
        }
    }

    #[async_trait::async_trait]
    impl Documents for Observed {
        async fn list(&mut self, collection: &str) -> Result<Vec<(String, Value)>> {
            self.inner.list(collection).await
        }

        async fn upsert(&mut self, collection: &str, id: &str, document: &Value) -> Result<()> {
            self.inner.upsert(collection, id, document).await?;
            self.record(collection).await;
            Ok(())
        }

        async fn delete(&mut self, collection: &str, id: &str) -> Result<()> {
            self.inner.delete(collection, id).await?;
            self.record(collection).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_store_fetches_nothing() {
        let mut remote = DocumentRemote::new(TestDocuments, unique_user());
        assert!(remote.fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_then_fetch() {
        let user = unique_user();
        let mut snapshot = LedgerSnapshot::default();
        snapshot.expenses.push(expense("Lunch"));
        let mut remote = DocumentRemote::new(TestDocuments, &user);
        remote.push(&snapshot).await.unwrap();

        let mut other = DocumentRemote::new(TestDocuments, &user);
        let fetched = other.fetch().await.unwrap().unwrap();
        assert!(fetched.same_contents(&snapshot));
        assert_eq!(fetched.last_updated(), snapshot.last_updated());
    }

    #[tokio::test]
    async fn test_replace_never_empties_collection() {
        let user = unique_user();
        let mut first = LedgerSnapshot::default();
        first.expenses.push(expense("Old A"));
        first.expenses.push(expense("Old B"));
        let mut remote = DocumentRemote::new(
            Observed {
                inner: TestDocuments,
                sizes: Vec::new(),
            },
            &user,
        );
        remote.push(&first).await.unwrap();

        let mut second = LedgerSnapshot::default();
        second.expenses.push(expense("New"));
        remote.documents.sizes.clear();
        remote.push(&second).await.unwrap();

        let expenses = format!("users/{user}/expenses");
        let sizes: Vec<usize> = remote
            .documents
            .sizes
            .iter()
            .filter(|(c, _)| c == &expenses)
            .map(|(_, n)| *n)
            .collect();
        assert!(!sizes.is_empty());
        assert!(sizes.iter().all(|n| *n > 0), "{sizes:?}");
        assert_eq!(sizes.last(), Some(&1));

        let fetched = remote.fetch().await.unwrap().unwrap();
        assert_eq!(fetched.expenses().len(), 1);
        assert_eq!(fetched.expenses()[0].description(), "New");
    }

    #[tokio::test]
    async fn test_unreadable_document_is_rejected() {
        let user = unique_user();
        let mut docs = TestDocuments;
        docs.upsert(
            &format!("users/{user}/expenses"),
            "x",
            &serde_json::json!({"amount": "not a number"}),
        )
        .await
        .unwrap();
        let mut remote = DocumentRemote::new(TestDocuments, &user);
        let e = remote.fetch().await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::RemoteRejected);
    }

    #[tokio::test]
    async fn test_rest_documents_without_token_is_auth_required() {
        let mut docs =
            RestDocuments::new(Url::parse("https://docs.example.com/api").unwrap(), None).unwrap();
        let e = docs.list("users/u/expenses").await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::AuthRequired);
        assert_eq!(
            docs.endpoint("users/u/expenses", Some("1")).unwrap().as_str(),
            "https://docs.example.com/api/users/u/expenses/1"
        );
    }
}
