//! Cooperative cancellation (SPEC_FULL.md §4.5/§5).
//!
//! A shared atomic flag that C5/C6 workers observe at batch/gene
//! boundaries and a request-level deadline the orchestrator enforces
//! between pipeline steps. Raising the deadline sets the same flag, so a
//! worker mid-run only ever has one thing to check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::err::EngineError;

/// Shared across one `evaluate()` call. A caller holding a clone can flip
/// it from another thread to cooperatively stop an in-flight request;
/// workers check it at batch/gene boundaries and bail out with
/// `EngineError::Cancelled` instead of starting more work.
pub type CancellationToken = Arc<AtomicBool>;

/// A fresh, unset token for a new request.
pub fn new_token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// Raise `cancel` if `deadline` has passed, then check it. Call at
/// pipeline step boundaries in the orchestrator, not inside worker loops
/// (those only need [`check_cancelled`]).
pub fn check_deadline(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<(), EngineError> {
    if let Some(deadline) = deadline {
        if Instant::now() >= deadline {
            cancel.store(true, Ordering::Relaxed);
        }
    }
    check_cancelled(cancel)
}

/// Check `cancel` alone. Cheap enough to call at every batch/gene boundary
/// inside C5/C6 workers.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.load(Ordering::Relaxed) {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(check_cancelled(&new_token()).is_ok());
    }

    #[test]
    fn raised_token_is_cancelled() {
        let token = new_token();
        token.store(true, Ordering::Relaxed);
        assert!(matches!(
            check_cancelled(&token),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn past_deadline_raises_and_fails() {
        let token = new_token();
        let deadline = Instant::now() - Duration::from_secs(1);
        assert!(matches!(
            check_deadline(&token, Some(deadline)),
            Err(EngineError::Cancelled)
        ));
        assert!(token.load(Ordering::Relaxed));
    }

    #[test]
    fn future_deadline_passes() {
        let token = new_token();
        let deadline = Instant::now() + Duration::from_secs(60);
        assert!(check_deadline(&token, Some(deadline)).is_ok());
    }
}
