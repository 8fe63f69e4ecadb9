//! Bounded Waits
//!
//! Wraps collaborator calls that must not stall the relay, such as the
//! credential harvester and deregistration at shutdown.
//!
//! ```ignore
//! use crate::resilience::timeout::with_timeout;
//!
//! let pair = with_timeout(
//!     Duration::from_secs(60),
//!     async { run_harvester().await },
//!     "credential harvest",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{RelayError, Result};

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(operation_name, timeout)),
    }
}

/// Execute an async operation with a timeout, mapping the inner result
///
/// This variant accepts futures that return non-Result types and wraps them.
pub async fn with_timeout_map<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(timed_out(operation_name, timeout)),
    }
}

fn timed_out(operation_name: &str, timeout: Duration) -> RelayError {
    RelayError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("{} timed out after {:?}", operation_name, timeout),
    ))
}
