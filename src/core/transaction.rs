//! Commit-or-rollback for units of work

use crate::core::error::Result;
use crate::core::store::UnitOfWork;

/// Finish a unit of work according to the outcome of its steps
///
/// On success the unit of work is committed and a failed commit is returned.
/// On failure it is rolled back; a rollback error is logged and the original
/// error is returned.
pub async fn finish<T, U: UnitOfWork>(tx: U, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, cause = %err, "rollback failed");
            }
            Err(err)
        }
    }
}
