//! Panic recovery for tool bodies.
//!
//! A panicking body must fail its job, not the worker that ran it.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Await `future`, converting a panic into `Err(message)`.
pub async fn with_recovery_async<Fut, T>(future: Fut, operation_name: &str) -> Result<T, String>
where
    Fut: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let panic_msg = extract_panic_message(payload.as_ref());
            tracing::error!(
                operation = operation_name,
                panic = %panic_msg,
                "panic_recovered"
            );
            Err(format!("panic in {}: {}", operation_name, panic_msg))
        }
    }
}

/// Extract panic message from panic payload.
pub fn extract_panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}
