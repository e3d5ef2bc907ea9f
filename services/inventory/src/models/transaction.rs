//! Ledger entries

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Rent,
    Return,
    Restock,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "buy",
            TransactionKind::Rent => "rent",
            TransactionKind::Return => "return",
            TransactionKind::Restock => "restock",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TransactionKind::Buy),
            "rent" => Ok(TransactionKind::Rent),
            "return" => Ok(TransactionKind::Return),
            "restock" => Ok(TransactionKind::Restock),
            other => Err(anyhow::anyhow!("Unknown transaction kind: {other}")),
        }
    }
}

/// One row of the inventory ledger
///
/// The rental columns are only populated for `kind = rent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub item_id: i64,
    pub kind: TransactionKind,
    pub qty: i32,
    pub timestamp: DateTime<Utc>,
    pub rent_days: Option<i32>,
    pub rent_start_date: Option<NaiveDate>,
    pub rent_due_date: Option<NaiveDate>,
    pub returned: bool,
    pub return_date: Option<DateTime<Utc>>,
    pub extension_requested: bool,
    /// Requested days until approved, then the approved days
    pub extension_days: Option<i32>,
    pub extension_approved: bool,
    pub extension_approved_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_rental(&self) -> bool {
        self.kind == TransactionKind::Rent
    }

    pub fn is_open_rental(&self) -> bool {
        self.is_rental() && !self.returned
    }

    /// Open rental whose due date lies strictly before `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open_rental() && self.rent_due_date.is_some_and(|due| due < today)
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        match self.rent_due_date {
            Some(due) if self.is_overdue(today) => (today - due).num_days(),
            _ => 0,
        }
    }
}

/// Rental period attached to a `rent` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalTerms {
    pub days: i32,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl RentalTerms {
    pub fn new(start_date: NaiveDate, days: i32) -> Self {
        Self {
            days,
            start_date,
            due_date: start_date + Duration::days(i64::from(days)),
        }
    }
}

/// A ledger append together with the stock change it accompanies
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Option<Uuid>,
    pub item_id: i64,
    pub kind: TransactionKind,
    pub qty: i32,
    pub timestamp: DateTime<Utc>,
    pub rental: Option<RentalTerms>,
}

impl NewTransaction {
    pub fn new(
        kind: TransactionKind,
        item_id: i64,
        user_id: Option<Uuid>,
        qty: i32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            item_id,
            kind,
            qty,
            timestamp,
            rental: None,
        }
    }

    pub fn with_rental(mut self, terms: RentalTerms) -> Self {
        self.rental = Some(terms);
        self
    }
}

/// A committed stock movement
#[derive(Debug, Clone, Serialize)]
pub struct Recorded {
    pub item: Item,
    pub transaction: Transaction,
}

/// A committed rental return
#[derive(Debug, Clone, Serialize)]
pub struct RentalClosed {
    /// The original `rent` entry, now marked returned
    pub rental: Transaction,
    /// The `return` entry appended to the ledger
    pub entry: Transaction,
    pub item: Item,
}

/// Ledger query filters; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<TransactionKind>,
    pub user_id: Option<Uuid>,
    pub returned: Option<bool>,
    /// Only entries with a due date on or after this day
    pub due_from: Option<NaiveDate>,
    /// Only entries with a due date strictly before this day
    pub due_before: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        let due = transaction.rent_due_date;
        self.from.is_none_or(|from| transaction.timestamp >= from)
            && self.to.is_none_or(|to| transaction.timestamp <= to)
            && self.kind.is_none_or(|kind| transaction.kind == kind)
            && self
                .user_id
                .is_none_or(|user_id| transaction.user_id == Some(user_id))
            && self.returned.is_none_or(|returned| transaction.returned == returned)
            && self.due_from.is_none_or(|day| due.is_some_and(|due| due >= day))
            && self.due_before.is_none_or(|day| due.is_some_and(|due| due < day))
    }
}

/// A user's view of their own rentals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    /// Out and not yet due
    #[default]
    Active,
    Overdue,
    Returned,
}

impl RentalStatus {
    /// Narrow `filter` to rentals in this state as of `today`
    pub fn narrow(self, filter: TransactionFilter, today: NaiveDate) -> TransactionFilter {
        let filter = TransactionFilter {
            kind: Some(TransactionKind::Rent),
            ..filter
        };
        match self {
            RentalStatus::Active => TransactionFilter {
                returned: Some(false),
                due_from: Some(today),
                ..filter
            },
            RentalStatus::Overdue => TransactionFilter {
                returned: Some(false),
                due_before: Some(today),
                ..filter
            },
            RentalStatus::Returned => TransactionFilter {
                returned: Some(true),
                ..filter
            },
        }
    }
}

/// How many entries of one kind were written, and when the latest was
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindActivity {
    pub count: i64,
    pub latest: Option<DateTime<Utc>>,
}
