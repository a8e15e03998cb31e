//! S1 (pass-through dispatch), S2 (queue-then-drain), S3 (queue timeout).
mod support;

use std::sync::Arc;
use std::time::Duration;

use fnbroker::config::FunctionProfile;
use fnbroker::error::{AppError, AppResult, BrokerError};
use fnbroker::metrics::Metrics;
use fnbroker::WorkerBroker;

use support::ImmediateDelegate;

#[tokio::test]
async fn pass_through_dispatch_skips_the_queue_when_a_worker_is_free() -> AppResult<()> {
    let broker = Arc::new(WorkerBroker::new(
        FunctionProfile::new("hello"),
        Arc::new(Metrics::new()),
        Arc::new(ImmediateDelegate::new()),
    ));

    broker.register_credential("w1", "cred-1").await.map_err(AppError::broker)?;
    broker.bind_worker("cred-1").await.map_err(AppError::broker)?;

    let result = broker.invoke("req-1".to_owned(), vec![], u64::MAX, None).await;
    if result.is_err() {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected pass-through dispatch to succeed with a bound worker".to_owned(),
        }));
    }
    if broker.queue_depth().await != 0 {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "pass-through dispatch must never touch the pending queue".to_owned(),
        }));
    }
    Ok(())
}

#[tokio::test]
async fn queued_request_drains_once_a_worker_binds() -> AppResult<()> {
    let broker = Arc::new(WorkerBroker::new(
        FunctionProfile::new("hello"),
        Arc::new(Metrics::new()),
        Arc::new(ImmediateDelegate::new()),
    ));
    broker.register_credential("w1", "cred-1").await.map_err(AppError::broker)?;

    let broker_for_invoke = Arc::clone(&broker);
    let invoke_task = tokio::spawn(async move { broker_for_invoke.invoke("req-1".to_owned(), vec![], u64::MAX, None).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    if broker.queue_depth().await != 1 {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected the request to be queued before any worker bound".to_owned(),
        }));
    }

    broker.bind_worker("cred-1").await.map_err(AppError::broker)?;

    let result = invoke_task.await.map_err(AppError::from)?;
    if result.is_err() {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected the queued request to drain onto the newly bound worker".to_owned(),
        }));
    }
    if broker.queue_depth().await != 0 {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected the queue to be empty after draining".to_owned(),
        }));
    }
    Ok(())
}

#[tokio::test]
async fn queued_request_times_out_if_no_worker_ever_binds() -> AppResult<()> {
    let broker = Arc::new(WorkerBroker::new(
        FunctionProfile::new("hello"),
        Arc::new(Metrics::new()),
        Arc::new(ImmediateDelegate::new()),
    ));

    let deadline_epoch_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|since_epoch| u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(u64::MAX)
        .saturating_add(20);

    let result = broker.invoke("req-1".to_owned(), vec![], deadline_epoch_ms, None).await;

    match result {
        Err(BrokerError::DeadlineExceeded { function, request_id }) => {
            if function != "hello" || request_id != "req-1" {
                return Err(AppError::broker(BrokerError::FastFailed {
                    message: "deadline error did not name the timed-out request".to_owned(),
                }));
            }
        }
        _ => {
            return Err(AppError::broker(BrokerError::FastFailed {
                message: "expected a DeadlineExceeded error".to_owned(),
            }))
        }
    }

    if broker.queue_depth().await != 0 {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "timed-out request must be evicted from the queue".to_owned(),
        }));
    }
    Ok(())
}

#[tokio::test]
async fn disposable_worker_drains_after_exactly_one_dispatch() -> AppResult<()> {
    let mut profile = FunctionProfile::new("thumbnail");
    profile.disposable = true;
    let broker = Arc::new(WorkerBroker::new(profile, Arc::new(Metrics::new()), Arc::new(ImmediateDelegate::new())));

    broker.register_credential("w1", "cred-1").await.map_err(AppError::broker)?;
    broker.bind_worker("cred-1").await.map_err(AppError::broker)?;

    let result = broker.invoke("req-1".to_owned(), vec![], u64::MAX, None).await;
    if result.is_err() {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected the first request to a disposable worker to succeed".to_owned(),
        }));
    }

    // A disposable worker's traffic is closed after its one dispatch, so a
    // second invocation (bounded so this test cannot hang) must queue rather
    // than reuse the same worker.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let deadline_epoch_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|since_epoch| u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(u64::MAX)
        .saturating_add(30);
    let broker_for_second = Arc::clone(&broker);
    let second_task =
        tokio::spawn(async move { broker_for_second.invoke("req-2".to_owned(), vec![], deadline_epoch_ms, None).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    if broker.queue_depth().await != 1 {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected the second request to queue behind the drained disposable worker".to_owned(),
        }));
    }

    let second_result = second_task.await.map_err(AppError::from)?;
    if !matches!(second_result, Err(BrokerError::DeadlineExceeded { .. })) {
        return Err(AppError::broker(BrokerError::FastFailed {
            message: "expected the second request to eventually time out with no worker bound".to_owned(),
        }));
    }
    Ok(())
}
