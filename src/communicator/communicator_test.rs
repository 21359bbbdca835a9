use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use super::*;
use crate::transport::direct;
use crate::transport::Transport;

/// Captures outbound records instead of delivering them anywhere.
struct RecordingTransport {
    sent: Arc<Mutex<Vec<Invoke>>>,
    ready: Result<()>,
    fail_send: bool,
}

impl RecordingTransport {
    fn ready() -> Self {
        RecordingTransport {
            sent: Arc::new(Mutex::new(vec![])),
            ready: Ok(()),
            fail_send: false,
        }
    }

    fn not_ready(err: Error) -> Self {
        RecordingTransport {
            ready: Err(err),
            ..RecordingTransport::ready()
        }
    }

    fn failing() -> Self {
        RecordingTransport {
            fail_send: true,
            ..RecordingTransport::ready()
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_data(&self, invoke: &Invoke) -> Result<()> {
        if self.fail_send {
            return Err(Error::ErrTransport {
                reason: "send rejected".to_owned(),
            });
        }
        self.sent.lock().await.push(invoke.clone());
        Ok(())
    }

    fn inspect_ready(&self) -> Result<()> {
        self.ready.clone()
    }

    async fn request_close(&self) -> Result<()> {
        Ok(())
    }
}

async fn wait_for_sent(sent: &Arc<Mutex<Vec<Invoke>>>, count: usize) {
    for _ in 0..200 {
        if sent.lock().await.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} outbound record(s)");
}

#[tokio::test]
async fn test_uid_allocation_is_monotonic_from_zero() -> Result<()> {
    let communicator = Communicator::new(None);
    let transport = Arc::new(RecordingTransport::ready());
    let sent = Arc::clone(&transport.sent);
    communicator.register_transport(transport).await;

    for expected_uid in 0..5u32 {
        let task = {
            let communicator = Arc::clone(&communicator);
            tokio::spawn(async move {
                communicator
                    .send_invoke(InvokeFunction {
                        uid: 0,
                        listener: "echo".to_owned(),
                        parameters: vec![],
                    })
                    .await
            })
        };

        wait_for_sent(&sent, expected_uid as usize + 1).await;
        let uid = sent.lock().await.last().unwrap().uid();
        assert_eq!(uid, expected_uid);

        // Settle the call so the next one starts from a clean table.
        communicator
            .reply_data(Invoke::success(uid, json!(null)))
            .await;
        task.await.unwrap()?;
    }

    assert_eq!(communicator.pending_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_destruct_drains_pending_calls_with_close_error() -> Result<()> {
    let communicator = Communicator::new(None);
    let transport = Arc::new(RecordingTransport::ready());
    let sent = Arc::clone(&transport.sent);
    communicator.register_transport(transport).await;

    let mut tasks = vec![];
    for _ in 0..3 {
        let communicator = Arc::clone(&communicator);
        tasks.push(tokio::spawn(async move {
            communicator
                .send_invoke(InvokeFunction {
                    uid: 0,
                    listener: "never_answered".to_owned(),
                    parameters: vec![],
                })
                .await
        }));
    }
    wait_for_sent(&sent, 3).await;

    // One return races the close and still wins.
    communicator
        .reply_data(Invoke::success(0, json!("raced")))
        .await;

    communicator
        .destruct(Some(Error::ErrTransport {
            reason: "peer disappeared".to_owned(),
        }))
        .await;
    assert_eq!(communicator.pending_count().await, 0);

    let mut outcomes = vec![];
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }
    // Task order is not uid order; exactly the call whose return raced the
    // close succeeded, the rest observed the close error.
    let raced = outcomes
        .iter()
        .filter(|outcome| **outcome == Ok(json!("raced")))
        .count();
    let closed = outcomes
        .iter()
        .filter(|outcome| {
            **outcome
                == Err(Error::ErrTransport {
                    reason: "peer disappeared".to_owned(),
                })
        })
        .count();
    assert_eq!((raced, closed), (1, 2));

    // Second destruct is a no-op on the (empty) table but still resolves.
    communicator.destruct(None).await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_uid_return_leaves_state_unchanged() -> Result<()> {
    let communicator = Communicator::new(None);
    let transport = Arc::new(RecordingTransport::ready());
    let sent = Arc::clone(&transport.sent);
    communicator.register_transport(transport).await;

    let task = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move {
            communicator
                .send_invoke(InvokeFunction {
                    uid: 0,
                    listener: "echo".to_owned(),
                    parameters: vec![],
                })
                .await
        })
    };
    wait_for_sent(&sent, 1).await;
    assert_eq!(communicator.pending_count().await, 1);

    // A return nobody asked for is silently dropped.
    communicator
        .reply_data(Invoke::success(99, json!("spurious")))
        .await;
    assert_eq!(communicator.pending_count().await, 1);

    // The real return still lands.
    communicator.reply_data(Invoke::success(0, json!(1))).await;
    assert_eq!(task.await.unwrap()?, json!(1));
    Ok(())
}

#[tokio::test]
async fn test_send_refused_while_not_ready() {
    let communicator = Communicator::new(None);

    // No transport registered at all.
    let err = communicator
        .send_invoke(InvokeFunction {
            uid: 0,
            listener: "echo".to_owned(),
            parameters: vec![],
        })
        .await
        .expect_err("no transport registered");
    assert_eq!(err, Error::ErrNotOpened);

    // A transport whose readiness check fails.
    let transport = Arc::new(RecordingTransport::not_ready(Error::ErrClosingInProgress));
    communicator.register_transport(transport).await;
    let err = communicator
        .send_invoke(InvokeFunction {
            uid: 0,
            listener: "echo".to_owned(),
            parameters: vec![],
        })
        .await
        .expect_err("readiness check fails");
    assert_eq!(err, Error::ErrClosingInProgress);
    assert_eq!(communicator.pending_count().await, 0);
}

#[tokio::test]
async fn test_send_failure_removes_pending_entry() {
    let communicator = Communicator::new(None);
    let transport = Arc::new(RecordingTransport::failing());
    communicator.register_transport(transport).await;

    let err = communicator
        .send_invoke(InvokeFunction {
            uid: 0,
            listener: "echo".to_owned(),
            parameters: vec![],
        })
        .await
        .expect_err("the transport rejects every send");
    assert!(matches!(err, Error::ErrTransport { .. }));
    assert_eq!(communicator.pending_count().await, 0);
}

#[tokio::test]
async fn test_send_after_destruct_is_refused() {
    let (client, _server) = direct::couple(None, None).await;
    client.destruct(None).await;

    let err = client
        .send_invoke(InvokeFunction {
            uid: 0,
            listener: "echo".to_owned(),
            parameters: vec![],
        })
        .await
        .expect_err("communicator is gone");
    assert_eq!(err, Error::ErrCommunicatorClosed);
}

#[tokio::test]
async fn test_incoming_function_with_no_provider_answers_failure() -> Result<()> {
    let communicator = Communicator::new(None);
    let transport = Arc::new(RecordingTransport::ready());
    let sent = Arc::clone(&transport.sent);
    communicator.register_transport(transport).await;

    communicator
        .reply_data(Invoke::Function(InvokeFunction {
            uid: 7,
            listener: "anything".to_owned(),
            parameters: vec![],
        }))
        .await;
    wait_for_sent(&sent, 1).await;

    let sent = sent.lock().await;
    match &sent[0] {
        Invoke::Return(ret) => {
            assert_eq!(ret.uid, 7);
            assert!(!ret.success);
            let error = ErrorValue::from_value(ret.value.clone());
            assert_eq!(error.name, "NoProviderError");
        }
        other => panic!("expected a return, got: {other:?}"),
    }
    Ok(())
}
