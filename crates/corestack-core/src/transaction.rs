//! The abstract atomic context handlers and adapters share.
//!
//! Batches staged operations in memory and flushes them atomically at
//! commit time, generalized to a caller-supplied synchronous closure
//! so lifecycle handlers can drive it directly.

use crate::adapter::TransactionContext;
use crate::error::Error;

/// Opens an atomic context, runs a synchronous callback, commits or
/// rolls back.
///
/// - **Atomicity.** Any sequence of `*InTx` operations on the same
///   `ctx` either all persist or none do.
/// - **Isolation.** Reads inside the transaction see writes done
///   earlier in the same transaction (read-your-writes).
/// - **Suspension rule.** `work` must be synchronous: no `await`
///   (backend B) and no asynchronous hop (backend A) may occur inside
///   it. This is why `work` is a plain `FnOnce`, not a future.
/// - **Nesting.** Not supported; implementations may panic or error if
///   `transaction` is called again from inside `work`.
pub trait TransactionCoordinator: Send + Sync {
    /// The transaction context type this coordinator opens.
    type Ctx: TransactionContext;

    /// Run `work` inside a single transaction over `stores` (the set of
    /// object-store/tree names the work will touch; required on
    /// backend B, advisory on backend A).
    ///
    /// On normal completion, commits and returns `work`'s result. On
    /// any `Err`, rolls back and returns [`Error::TransactionError`]
    /// with `rolled_back = true`.
    fn transaction<R>(
        &self,
        stores: &[&str],
        work: impl FnOnce(&mut Self::Ctx) -> Result<R, Error>,
    ) -> Result<R, Error>;
}

/// Placeholder [`TransactionCoordinator`] used as
/// [`crate::repository::Repository`]'s default type parameter when no
/// coordinator is configured. Never actually invoked: `Repository`
/// only calls `transaction()` through `Option<C>::Some`.
pub struct NoCoordinator<Ctx>(std::marker::PhantomData<fn() -> Ctx>);

impl<Ctx: TransactionContext> TransactionCoordinator for NoCoordinator<Ctx> {
    type Ctx = Ctx;

    fn transaction<R>(
        &self,
        _stores: &[&str],
        _work: impl FnOnce(&mut Self::Ctx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        unreachable!("NoCoordinator is never invoked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCtx;
    impl TransactionContext for FakeCtx {}

    struct FakeCoordinator {
        fail: bool,
    }

    impl TransactionCoordinator for FakeCoordinator {
        type Ctx = FakeCtx;

        fn transaction<R>(
            &self,
            _stores: &[&str],
            work: impl FnOnce(&mut Self::Ctx) -> Result<R, Error>,
        ) -> Result<R, Error> {
            if self.fail {
                return Err(Error::transaction("Test", "forced failure", None));
            }
            let mut ctx = FakeCtx;
            work(&mut ctx)
        }
    }

    #[test]
    fn successful_work_returns_its_result() {
        let coordinator = FakeCoordinator { fail: false };
        let result = coordinator.transaction(&["entities"], |_ctx| Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn failure_rolls_back_with_flag_set() {
        let coordinator = FakeCoordinator { fail: true };
        let result = coordinator.transaction(&["entities"], |_ctx| Ok::<_, Error>(42));
        let err = result.unwrap_err();
        assert!(err.is_rolled_back());
    }
}
