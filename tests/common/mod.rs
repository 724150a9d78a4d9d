//! Shared helpers for integration tests.

use std::time::Duration;

/// Poll `check` until it passes or a generous timeout elapses.
pub async fn poll_until<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
