#[cfg(test)]
mod communicator_test;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::invoke::{ErrorValue, Invoke, InvokeFunction, InvokeReturn};
use crate::provider::Provider;
use crate::transport::Transport;

type CompletionTx = oneshot::Sender<Result<Value>>;

/// Communicator is the per-connection engine: it owns the pending-call
/// table, resolves incoming invokes against the local provider, and routes
/// returns back to their suspended callers.
///
/// Transports bind in through [`Communicator::register_transport`] and feed
/// every decoded inbound record to [`Communicator::reply_data`]; their close
/// path calls [`Communicator::destruct`] exactly once.
pub struct Communicator {
    /// Next call id. Strictly increasing per communicator, starting at 0.
    uid: AtomicU32,

    /// uid → completion handle. A BTreeMap keeps drain order equal to
    /// insertion order, since uids are monotonic.
    pending: Mutex<BTreeMap<u32, CompletionTx>>,

    provider: Mutex<Option<Arc<Provider>>>,

    transport: Mutex<Option<Arc<dyn Transport>>>,

    destructed: AtomicBool,
}

impl Communicator {
    pub fn new(provider: Option<Provider>) -> Arc<Self> {
        Arc::new(Communicator {
            uid: AtomicU32::new(0),
            pending: Mutex::new(BTreeMap::new()),
            provider: Mutex::new(provider.map(Arc::new)),
            transport: Mutex::new(None),
            destructed: AtomicBool::new(false),
        })
    }

    /// Returns a fresh driver rooted at this communicator with an empty
    /// member path. Multiple drivers may coexist.
    pub fn get_driver(self: &Arc<Self>) -> Driver {
        Driver::new(Arc::downgrade(self), String::new())
    }

    /// Installs the provider incoming invokes are resolved against. Set once
    /// by accept; cleared again by destruct.
    pub async fn set_provider(&self, provider: Option<Provider>) {
        *self.provider.lock().await = provider.map(Arc::new);
    }

    /// Wires the transport adapter whose send hook and readiness predicate
    /// this communicator uses.
    pub async fn register_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.lock().await = Some(transport);
    }

    /// The readiness check consulted by every outbound operation: delegated
    /// to the registered transport adapter.
    pub async fn inspect_ready(&self) -> Result<()> {
        if self.destructed.load(Ordering::SeqCst) {
            return Err(Error::ErrCommunicatorClosed);
        }
        match &*self.transport.lock().await {
            Some(transport) => transport.inspect_ready(),
            None => Err(Error::ErrNotOpened),
        }
    }

    /// Assigns a fresh uid, registers the completion handle, hands the
    /// record to the transport, and suspends until the matching return.
    pub(crate) async fn send_invoke(&self, mut invoke: InvokeFunction) -> Result<Value> {
        self.inspect_ready().await?;

        invoke.uid = self.uid.fetch_add(1, Ordering::SeqCst);
        let uid = invoke.uid;

        let (completion_tx, completion_rx) = oneshot::channel();
        self.pending.lock().await.insert(uid, completion_tx);

        // destruct may have drained between the readiness check and the
        // insert; a stranded entry would never settle.
        if self.destructed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&uid);
            return Err(Error::ErrCommunicatorClosed);
        }

        let transport = self.transport.lock().await.clone();
        let send_result = match transport {
            Some(transport) => transport.send_data(&Invoke::Function(invoke)).await,
            None => Err(Error::ErrNotOpened),
        };
        if let Err(err) = send_result {
            self.pending.lock().await.remove(&uid);
            return Err(err);
        }

        match completion_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ErrCommunicatorClosed),
        }
    }

    /// Routes one decoded inbound record: function invokes are resolved and
    /// answered, returns settle their pending entry. Called by the transport
    /// adapter in arrival order.
    pub async fn reply_data(self: &Arc<Self>, invoke: Invoke) {
        match invoke {
            Invoke::Function(invoke) => {
                // Run the provider call in its own task so a suspending
                // method cannot wedge the message pump; tasks start in
                // arrival order.
                let communicator = Arc::clone(self);
                tokio::spawn(async move {
                    communicator.handle_function(invoke).await;
                });
            }
            Invoke::Return(invoke) => self.handle_return(invoke).await,
        }
    }

    async fn handle_function(&self, invoke: InvokeFunction) {
        let uid = invoke.uid;

        let provider = self.provider.lock().await.clone();
        let outcome = match provider {
            Some(provider) => provider.call(&invoke.listener, invoke.parameters).await,
            None => Err(ErrorValue::from(&Error::ErrNoProvider)),
        };

        let reply = match outcome {
            Ok(value) => Invoke::success(uid, value),
            Err(error) => Invoke::failure(uid, error),
        };

        let transport = self.transport.lock().await.clone();
        let Some(transport) = transport else {
            log::warn!("reply for uid={uid} dropped: communicator already shut down");
            return;
        };
        if let Err(err) = transport.send_data(&reply).await {
            // Closing window: the adapter no longer accepts output.
            log::warn!("reply for uid={uid} dropped: {err}");
        }
    }

    async fn handle_return(&self, invoke: InvokeReturn) {
        let completion_tx = self.pending.lock().await.remove(&invoke.uid);
        let Some(completion_tx) = completion_tx else {
            log::debug!("dropping return with unknown uid={}", invoke.uid);
            return;
        };

        let result = if invoke.success {
            Ok(invoke.value)
        } else {
            Err(Error::ErrRemote(ErrorValue::from_value(invoke.value)))
        };
        let _ = completion_tx.send(result);
    }

    /// Marks the communicator as shut down and completes every pending call
    /// with failure, in insertion order. Idempotent; after it returns the
    /// pending table is empty.
    pub async fn destruct(&self, error: Option<Error>) {
        self.destructed.store(true, Ordering::SeqCst);

        let drained = std::mem::take(&mut *self.pending.lock().await);
        if !drained.is_empty() {
            log::debug!("destructing with {} pending call(s)", drained.len());
        }
        for (_, completion_tx) in drained {
            let err = error.clone().unwrap_or(Error::ErrCommunicatorClosed);
            let _ = completion_tx.send(Err(err));
        }

        *self.provider.lock().await = None;
        *self.transport.lock().await = None;
    }

    #[cfg(test)]
    pub(crate) async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("uid", &self.uid.load(Ordering::SeqCst))
            .field("destructed", &self.destructed.load(Ordering::SeqCst))
            .finish()
    }
}
