//! Web transaction coordinator: opens a real IndexedDB transaction
//! synchronously (`IDBDatabase.transaction()` itself never suspends;
//! only individual requests inside it do) and lets it auto-commit once
//! its microtask queue drains.

use idb::{Transaction, TransactionMode};

use corestack_core::error::Error;
use corestack_core::transaction::TransactionCoordinator;
use corestack_core::TransactionContext;

use crate::store::WebStore;

/// The opaque handle `IdbAdapter` downcasts to. Wraps the open
/// `idb::Transaction` plus the store names it was declared over, so
/// adapters can reject operations on undeclared stores before they
/// ever reach IndexedDB.
pub struct WebTxContext {
    transaction: Transaction,
    declared_stores: Vec<String>,
}

impl TransactionContext for WebTxContext {}

impl WebTxContext {
    pub fn object_store(&self, name: &str) -> Result<idb::ObjectStore, Error> {
        if !self.declared_stores.iter().any(|s| s == name) {
            return Err(Error::transaction(
                name,
                format!("store {name} was not declared for this transaction"),
                None,
            ));
        }
        self.transaction
            .object_store(name)
            .map_err(|e| Error::transaction(name, format!("open object store: {e:?}"), None))
    }
}

pub struct WebTransactionCoordinator {
    store: std::sync::Arc<WebStore>,
}

impl WebTransactionCoordinator {
    pub fn new(store: std::sync::Arc<WebStore>) -> Self {
        Self { store }
    }
}

impl TransactionCoordinator for WebTransactionCoordinator {
    type Ctx = WebTxContext;

    fn transaction<R>(
        &self,
        stores: &[&str],
        work: impl FnOnce(&mut Self::Ctx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let store_names: Vec<String> = stores.iter().map(|s| s.to_string()).collect();
        let transaction = self
            .store
            .db()
            .transaction(stores, TransactionMode::ReadWrite)
            .map_err(|e| Error::transaction("WebTransactionCoordinator", format!("open transaction: {e:?}"), None))?;

        let mut ctx = WebTxContext {
            transaction,
            declared_stores: store_names,
        };

        match work(&mut ctx) {
            Ok(value) => Ok(value),
            Err(e) => {
                // Best-effort: the transaction also auto-aborts once any
                // request inside it has reported an error, but an early
                // application-level failure (one that never touched
                // IndexedDB) needs an explicit abort to roll back.
                let _ = ctx.transaction.abort();
                let message = e.to_string();
                Err(Error::transaction("WebTransactionCoordinator", message, Some(Box::new(e))))
            }
        }
    }
}
