//! Duration instrumentation for units of work.
//!
//! Wraps an operation to emit a structured start event, then either a
//! success event with elapsed milliseconds or an error event with the
//! error's display form. The original error is always re-raised
//! unchanged; this layer never swallows or substitutes. Durations come
//! from a monotonic clock.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

/// Runs a suspending operation with start/success/error events.
///
/// # Errors
///
/// Propagates the operation's error unchanged after logging it.
pub async fn timed<T, E, F>(operation: &str, fut: F) -> Result<T, E>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    tracing::debug!(operation, "operation started");
    let start = Instant::now();
    match fut.await {
        Ok(value) => {
            tracing::info!(
                operation,
                duration_ms = elapsed_ms(start),
                "operation succeeded"
            );
            Ok(value)
        }
        Err(error) => {
            tracing::error!(
                operation,
                duration_ms = elapsed_ms(start),
                error = %error,
                "operation failed"
            );
            Err(error)
        }
    }
}

/// Runs a direct (non-suspending) operation with the same events as
/// [`timed`].
///
/// # Errors
///
/// Propagates the operation's error unchanged after logging it.
pub fn timed_blocking<T, E, F>(operation: &str, op: F) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    tracing::debug!(operation, "operation started");
    let start = Instant::now();
    match op() {
        Ok(value) => {
            tracing::info!(
                operation,
                duration_ms = elapsed_ms(start),
                "operation succeeded"
            );
            Ok(value)
        }
        Err(error) => {
            tracing::error!(
                operation,
                duration_ms = elapsed_ms(start),
                error = %error,
                "operation failed"
            );
            Err(error)
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_value_passes_through() {
        let result: Result<u32, String> = timed("noop", async { Ok(41 + 1) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn error_is_reraised_unchanged() {
        let result: Result<u32, String> =
            timed("failing", async { Err("original error".to_string()) }).await;
        assert_eq!(result, Err("original error".to_string()));
    }

    #[test]
    fn blocking_variant_mirrors_async_behavior() {
        let ok: Result<&str, String> = timed_blocking("noop", || Ok("done"));
        assert_eq!(ok, Ok("done"));

        let err: Result<(), String> = timed_blocking("failing", || Err("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));
    }
}
