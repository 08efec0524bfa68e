//! Blocking wait on asynchronous provider operations.

use std::fmt;

use tracing::debug;

use crate::backend::{
    Backend, BackendFuture, OperationHandle, OperationScope, OperationStatus, ProviderError,
};

/// Outcome of an idempotent delete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeleteOutcome {
    /// The resource existed and was removed.
    Deleted,
    /// The resource was already gone.
    Missing,
    /// The provider rejected the delete or the operation failed.
    Failed(ProviderError),
}

impl DeleteOutcome {
    /// Returns `false` only for [`DeleteOutcome::Failed`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => f.write_str("deleted"),
            Self::Missing => f.write_str("already absent"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Resolves [`OperationHandle`]s to success or a structured error.
///
/// The provider's wait endpoint returns after a bounded server-side delay
/// even when the operation is still running, so the waiter re-issues the wait
/// until the operation reports done. No client-side deadline is applied.
#[derive(Debug)]
pub struct OperationWaiter<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> OperationWaiter<'a, B> {
    /// Creates a waiter over `backend`.
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Blocks until `handle` completes.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error when it finished unsuccessfully, or
    /// the failure of the wait call itself.
    pub async fn wait(&self, handle: &OperationHandle) -> Result<(), ProviderError> {
        let mut rounds: u32 = 0;
        loop {
            rounds = rounds.saturating_add(1);
            match self.backend.wait_operation(handle).await? {
                OperationStatus::Done(result) => {
                    debug!(
                        operation = %handle.name,
                        scope = scope_label(&handle.scope),
                        rounds,
                        "operation finished"
                    );
                    return result;
                }
                OperationStatus::Pending => {
                    debug!(operation = %handle.name, rounds, "operation still running");
                }
            }
        }
    }

    /// Awaits a mutating call and then waits on the operation it returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the mutating call or of the operation.
    pub async fn complete(
        &self,
        issued: BackendFuture<'_, OperationHandle>,
    ) -> Result<(), ProviderError> {
        let handle = issued.await?;
        self.wait(&handle).await
    }

    /// Like [`OperationWaiter::complete`] for deletes: a missing resource
    /// counts as success.
    pub async fn complete_delete(
        &self,
        issued: BackendFuture<'_, OperationHandle>,
    ) -> DeleteOutcome {
        match self.complete(issued).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(err) if err.is_not_found() => DeleteOutcome::Missing,
            Err(err) => DeleteOutcome::Failed(err),
        }
    }
}

fn scope_label(scope: &OperationScope) -> &str {
    match scope {
        OperationScope::Zone(zone) => zone.as_str(),
        OperationScope::Global => "global",
    }
}
