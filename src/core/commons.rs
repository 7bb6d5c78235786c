// src/core/commons.rs

use crate::CancellationToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// The cancellation flag was raised.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Operation was cancelled.")]
pub struct Cancelled;

/// Creates a fresh, unset cancellation flag.
pub fn new_cancellation_token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// Raises the cancellation flag. Every resolution holding a clone observes it
/// at its next suspension point.
pub fn cancel(token: &CancellationToken) {
    token.store(true, Ordering::SeqCst);
}

/// Returns `Err(Cancelled)` once the flag has been raised.
pub fn check_for_cancellation(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.load(Ordering::SeqCst) {
        Err(Cancelled)
    } else {
        Ok(())
    }
}

/// Resolves once the flag is raised, checking it every `poll`.
pub async fn wait_for_cancellation(token: &CancellationToken, poll: Duration) {
    while check_for_cancellation(token).is_ok() {
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag_round_trip() {
        let token = new_cancellation_token();
        assert!(check_for_cancellation(&token).is_ok());

        let shared = Arc::clone(&token);
        cancel(&shared);
        assert_eq!(check_for_cancellation(&token), Err(Cancelled));
    }

    #[tokio::test]
    async fn test_wait_for_cancellation_resolves_after_cancel() {
        let token = new_cancellation_token();
        let trigger = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel(&trigger);
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_cancellation(&token, Duration::from_millis(1)),
        )
        .await
        .unwrap();
        assert!(check_for_cancellation(&token).is_err());
    }
}
