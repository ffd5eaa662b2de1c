//! Native transaction coordinator: stages writes in memory, then
//! commits them atomically through `sled`'s multi-tree transaction
//! support in one pass.
//!
//! Operations are collected in an in-memory buffer (`ops`) and only
//! touch real `sled` trees at `commit()` time, with reads checked
//! against the buffer first for read-your-writes.

use std::sync::Arc;

use corestack_core::error::Error;
use corestack_core::transaction::TransactionCoordinator;
use corestack_core::TransactionContext;
use sled::Transactional;

use crate::store::NativeStore;

#[derive(Debug, Clone)]
enum TxOp {
    Put { tree: String, key: Vec<u8>, value: Vec<u8> },
    Delete { tree: String, key: Vec<u8> },
}

/// The opaque transaction handle `SledAdapter` downcasts to directly
/// (it is the only implementation of `TransactionContext` this crate
/// produces).
///
/// Operations staged through `stage_put`/`stage_delete` are not
/// visible to `sled` until the owning [`NativeTransactionCoordinator::transaction`]
/// call commits them; `staged_value` lets an adapter read its own
/// uncommitted writes back before that happens.
pub struct NativeTxContext {
    store: Arc<NativeStore>,
    ops: Vec<TxOp>,
}

impl TransactionContext for NativeTxContext {}

impl NativeTxContext {
    pub fn store(&self) -> &NativeStore {
        &self.store
    }

    pub fn stage_put(&mut self, tree: &str, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(TxOp::Put {
            tree: tree.to_string(),
            key,
            value,
        });
    }

    pub fn stage_delete(&mut self, tree: &str, key: Vec<u8>) {
        self.ops.push(TxOp::Delete {
            tree: tree.to_string(),
            key,
        });
    }

    /// The most recently staged value for `(tree, key)`, if any:
    /// `Some(Some(bytes))` for a staged put, `Some(None)` for a staged
    /// delete, `None` if nothing in this transaction touched it yet.
    pub fn staged_value(&self, tree: &str, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.ops.iter().rev().find_map(|op| match op {
            TxOp::Put { tree: t, key: k, value } if t == tree && k.as_slice() == key => {
                Some(Some(value.clone()))
            }
            TxOp::Delete { tree: t, key: k } if t == tree && k.as_slice() == key => Some(None),
            _ => None,
        })
    }
}

/// Opens a [`NativeTxContext`], runs `work`, and, only if `work`
/// succeeds, commits every staged op across `stores` inside one real
/// `sled` transaction. A failure in `work` discards the buffer without
/// ever touching `sled`, satisfying the "nothing written on error"
/// contract without needing `sled` to roll anything back.
pub struct NativeTransactionCoordinator {
    store: Arc<NativeStore>,
}

impl NativeTransactionCoordinator {
    pub fn new(store: Arc<NativeStore>) -> Self {
        Self { store }
    }

    fn commit(&self, stores: &[&str], ops: Vec<TxOp>) -> Result<(), Error> {
        if ops.is_empty() {
            return Ok(());
        }

        let trees: Vec<sled::Tree> = stores
            .iter()
            .map(|name| self.store.open_tree(name))
            .collect::<Result<_, _>>()?;
        let tree_refs: Vec<&sled::Tree> = trees.iter().collect();

        let result: Result<(), sled::transaction::TransactionError<Error>> =
            tree_refs.as_slice().transaction(|views| {
                for op in &ops {
                    let (tree_name, action) = match op {
                        TxOp::Put { tree, key, value } => (tree, Action::Put(key, value)),
                        TxOp::Delete { tree, key } => (tree, Action::Delete(key)),
                    };
                    let idx = stores
                        .iter()
                        .position(|s| s == tree_name)
                        .ok_or_else(|| {
                            sled::transaction::ConflictableTransactionError::Abort(Error::transaction(
                                "NativeTransactionCoordinator",
                                format!("op touched undeclared store {tree_name}"),
                                None,
                            ))
                        })?;
                    match action {
                        Action::Put(key, value) => {
                            views[idx].insert(key.as_slice(), value.as_slice())?;
                        }
                        Action::Delete(key) => {
                            views[idx].remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(sled::transaction::TransactionError::Abort(e)) => Err(e),
            Err(sled::transaction::TransactionError::Storage(e)) => {
                Err(Error::transaction("NativeTransactionCoordinator", e.to_string(), Some(Box::new(e))))
            }
        }
    }
}

enum Action<'a> {
    Put(&'a [u8], &'a [u8]),
    Delete(&'a [u8]),
}

impl TransactionCoordinator for NativeTransactionCoordinator {
    type Ctx = NativeTxContext;

    fn transaction<R>(
        &self,
        stores: &[&str],
        work: impl FnOnce(&mut Self::Ctx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut ctx = NativeTxContext {
            store: self.store.clone(),
            ops: Vec::new(),
        };
        let result = work(&mut ctx)?;
        self.commit(stores, ctx.ops)?;
        Ok(result)
    }
}
