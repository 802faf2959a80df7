use futures::future::join_all;
use std::any::Any;
use std::future::Future;

use super::JobError;

/// Failure of one fanned-out task
#[derive(Debug, thiserror::Error)]
pub enum FanOutError {
    #[error(transparent)]
    Failed(#[from] JobError),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task cancelled")]
    Cancelled,
}

/// Spawn one task per item and wait for all of them.
///
/// Results come back in item order. A failing or panicking task only
/// affects its own slot.
pub async fn fan_out<T, R, F, Fut>(items: Vec<T>, task: F) -> Vec<Result<R, FanOutError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, JobError>> + Send + 'static,
{
    let handles: Vec<_> = items.into_iter().map(|item| tokio::spawn(task(item))).collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FanOutError::Failed(e)),
            Err(e) if e.is_panic() => Err(FanOutError::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(FanOutError::Cancelled),
        })
        .collect()
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
