use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::communicator::Communicator;
use crate::error::{Error, Result};
use crate::invoke::Invoke;
use crate::provider::Provider;
use crate::transport::Transport;

/// DirectTransport is the symmetric in-process pseudo-transport: the sender
/// is a plain channel into the peer communicator's inbound queue. No state
/// machine, constantly ready. Used primarily by tests.
pub struct DirectTransport {
    peer_tx: mpsc::UnboundedSender<Invoke>,
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send_data(&self, invoke: &Invoke) -> Result<()> {
        self.peer_tx
            .send(invoke.clone())
            .map_err(|_| Error::ErrTransport {
                reason: "peer communicator is gone".to_owned(),
            })
    }

    fn inspect_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn request_close(&self) -> Result<()> {
        // There is no socket underneath; teardown happens through [`close`].
        Ok(())
    }
}

/// Wires two communicators back to back and returns them. One forwarding
/// task per direction preserves send order and linearizes delivery onto the
/// receiving communicator.
pub async fn couple(
    provider_a: Option<Provider>,
    provider_b: Option<Provider>,
) -> (Arc<Communicator>, Arc<Communicator>) {
    let communicator_a = Communicator::new(provider_a);
    let communicator_b = Communicator::new(provider_b);

    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();

    communicator_a
        .register_transport(Arc::new(DirectTransport { peer_tx: a_to_b_tx }))
        .await;
    communicator_b
        .register_transport(Arc::new(DirectTransport { peer_tx: b_to_a_tx }))
        .await;

    tokio::spawn(forward(a_to_b_rx, Arc::clone(&communicator_b)));
    tokio::spawn(forward(b_to_a_rx, Arc::clone(&communicator_a)));

    (communicator_a, communicator_b)
}

/// Tears a coupled pair down: destructs both sides, draining whatever calls
/// are still pending on either one.
pub async fn close(communicator_a: &Arc<Communicator>, communicator_b: &Arc<Communicator>) {
    communicator_a.destruct(None).await;
    communicator_b.destruct(None).await;
}

async fn forward(mut rx: mpsc::UnboundedReceiver<Invoke>, peer: Arc<Communicator>) {
    while let Some(invoke) = rx.recv().await {
        peer.reply_data(invoke).await;
    }
}
