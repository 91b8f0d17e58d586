//! Retry with exponential backoff and jitter
//!
//! Used for calls made once at startup that can fail while the local API
//! server is still coming up, such as installing the CRDs:
//!
//! ```ignore
//! use microk8s_operator::retry::{retry_with_backoff, RetryConfig};
//!
//! retry_with_backoff(&RetryConfig::with_max_attempts(10), "install_crd", || async {
//!     crds.patch(name, &params, &Patch::Apply(&crd)).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff parameters
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = retry forever)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Factor applied to the delay after every failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff, giving up after `attempts` attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is reached.
///
/// The delay grows by `backoff_multiplier` after each failure, capped at
/// `max_delay`, and is jittered by 0.5x to 1.5x. Returns the last error when
/// attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if config.max_attempts > 0 && attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "operation failed, giving up"
            );
            return Err(e);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let wait = delay.mul_f64(jitter);
        warn!(
            operation = %operation_name,
            attempt,
            error = %e,
            delay_ms = wait.as_millis(),
            "operation failed, retrying"
        );
        tokio::time::sleep(wait).await;

        delay = delay
            .mul_f64(config.backoff_multiplier)
            .min(config.max_delay);
    }
}
