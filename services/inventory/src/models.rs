//! Inventory models: the item catalog and the transaction ledger

pub mod item;
pub mod transaction;

pub use item::{Item, ItemQuery, MAX_STOCK, NewItem};
pub use transaction::{
    KindActivity, NewTransaction, RentalClosed, RentalStatus, RentalTerms, Recorded, Transaction,
    TransactionFilter, TransactionKind,
};
