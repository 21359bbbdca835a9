
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::acceptor::{Acceptor, AcceptorState};
use crate::communicator::Communicator;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::invoke::Invoke;
use crate::provider::Provider;
use crate::transport::{Transport, CLOSE, READY};

/// One end of an in-process duplex text port, the worker-style message
/// channel: both control strings and JSON payloads travel as posted
/// messages.
pub struct ChannelPort {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl ChannelPort {
    /// Creates two connected ports.
    pub fn pair() -> (ChannelPort, ChannelPort) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            ChannelPort {
                tx: a_tx,
                rx: Mutex::new(Some(b_rx)),
            },
            ChannelPort {
                tx: b_tx,
                rx: Mutex::new(Some(a_rx)),
            },
        )
    }

    fn post(&self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| Error::ErrTransport {
            reason: "channel port is gone".to_owned(),
        })
    }

    async fn take_rx(&self) -> Result<mpsc::UnboundedReceiver<String>> {
        self.rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Other("channel port already attached".to_owned()))
    }
}

struct ChannelTransport {
    port: Arc<ChannelPort>,
    acceptor: Arc<Acceptor>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_data(&self, invoke: &Invoke) -> Result<()> {
        let text = serde_json::to_string(invoke).map_err(Error::transport)?;
        self.port.post(text)
    }

    fn inspect_ready(&self) -> Result<()> {
        self.acceptor.inspect_ready()
    }

    async fn request_close(&self) -> Result<()> {
        self.port.post(CLOSE.to_owned())
    }
}

/// ChannelConnector is the initiating end: it posts `"READY"` and suspends
/// until the peer echoes it, which proves the peer has attached its message
/// handler.
pub struct ChannelConnector {
    acceptor: Arc<Acceptor>,
    communicator: Arc<Communicator>,
    transport: Arc<ChannelTransport>,
}

impl std::fmt::Debug for ChannelConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnector").finish()
    }
}

impl ChannelConnector {
    pub async fn connect(port: ChannelPort, provider: Option<Provider>) -> Result<Self> {
        let acceptor = Arc::new(Acceptor::new());
        acceptor.begin_accept()?;

        let port = Arc::new(port);
        let communicator = Communicator::new(provider);
        let transport = Arc::new(ChannelTransport {
            port: Arc::clone(&port),
            acceptor: Arc::clone(&acceptor),
        });
        communicator
            .register_transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .await;

        let rx = port.take_rx().await?;
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(read_loop(
            rx,
            Arc::clone(&communicator),
            Arc::clone(&acceptor),
            Arc::clone(&port),
            ReadySide::Initiator(Some(ready_tx)),
        ));

        port.post(READY.to_owned())?;
        ready_rx.await.map_err(|_| Error::ErrTransport {
            reason: "channel closed during handshake".to_owned(),
        })?;
        acceptor.complete_accept();

        Ok(ChannelConnector {
            acceptor,
            communicator,
            transport,
        })
    }

    pub fn state(&self) -> AcceptorState {
        self.acceptor.state()
    }

    pub fn get_driver(&self) -> Driver {
        self.communicator.get_driver()
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    /// Posts `"CLOSE"` and suspends until the peer's acknowledgement has
    /// drained this side.
    pub async fn close(&self) -> Result<()> {
        close_endpoint(&self.acceptor, &self.communicator, &self.transport).await
    }

    /// Suspends until this end reaches `Closed`.
    pub async fn join(&self) {
        self.acceptor.wait_closed().await;
    }
}

/// ChannelAcceptor is the accepting end. Until `accept` attaches the message
/// handler, inbound messages (including the peer's `"READY"`) stay buffered
/// in the port.
pub struct ChannelAcceptor {
    acceptor: Arc<Acceptor>,
    communicator: Arc<Communicator>,
    transport: Arc<ChannelTransport>,
}

impl ChannelAcceptor {
    pub fn new(port: ChannelPort) -> Self {
        let acceptor = Arc::new(Acceptor::new());
        let transport = Arc::new(ChannelTransport {
            port: Arc::new(port),
            acceptor: Arc::clone(&acceptor),
        });
        ChannelAcceptor {
            acceptor,
            communicator: Communicator::new(None),
            transport,
        }
    }

    pub fn state(&self) -> AcceptorState {
        self.acceptor.state()
    }

    /// Registers the provider and the message handler, echoing `"READY"`
    /// once the peer's handshake arrives. Calling it twice is a domain
    /// error; the first accept keeps serving.
    pub async fn accept(&self, provider: Option<Provider>) -> Result<()> {
        self.acceptor.begin_accept()?;

        self.communicator.set_provider(provider).await;
        self.communicator
            .register_transport(Arc::clone(&self.transport) as Arc<dyn Transport>)
            .await;

        let rx = self.transport.port.take_rx().await?;
        tokio::spawn(read_loop(
            rx,
            Arc::clone(&self.communicator),
            Arc::clone(&self.acceptor),
            Arc::clone(&self.transport.port),
            ReadySide::Echoer,
        ));

        self.acceptor.complete_accept();
        Ok(())
    }

    /// Refuses the connection without ever attaching a handler.
    pub async fn reject(&self) -> Result<()> {
        self.acceptor.begin_reject()?;
        let _ = self.transport.request_close().await;
        self.communicator.destruct(None).await;
        self.acceptor.complete_reject();
        Ok(())
    }

    pub fn get_driver(&self) -> Driver {
        self.communicator.get_driver()
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    pub async fn close(&self) -> Result<()> {
        close_endpoint(&self.acceptor, &self.communicator, &self.transport).await
    }

    pub async fn join(&self) {
        self.acceptor.wait_closed().await;
    }
}

enum ReadySide {
    /// Sent the first `"READY"`; the incoming one completes the handshake.
    /// Later ones are ignored.
    Initiator(Option<oneshot::Sender<()>>),
    /// Echoes the incoming `"READY"` back.
    Echoer,
}

async fn close_endpoint(
    acceptor: &Arc<Acceptor>,
    communicator: &Arc<Communicator>,
    transport: &Arc<ChannelTransport>,
) -> Result<()> {
    acceptor.begin_close()?;
    if let Err(err) = transport.request_close().await {
        // The peer is already gone; there is nothing left to drain against.
        communicator.destruct(Some(err.clone())).await;
        acceptor.complete_close();
        return Err(err);
    }
    acceptor.wait_closed().await;
    Ok(())
}

async fn read_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    communicator: Arc<Communicator>,
    acceptor: Arc<Acceptor>,
    port: Arc<ChannelPort>,
    mut ready_side: ReadySide,
) {
    while let Some(text) = rx.recv().await {
        match text.as_str() {
            READY => match &mut ready_side {
                ReadySide::Initiator(ready_tx) => {
                    if let Some(ready_tx) = ready_tx.take() {
                        let _ = ready_tx.send(());
                    }
                }
                ReadySide::Echoer => {
                    log::debug!("echoing channel handshake");
                    let _ = port.post(READY.to_owned());
                }
            },
            CLOSE => {
                if acceptor.begin_close().is_ok() {
                    // Peer initiated; acknowledge so it can drain too.
                    let _ = port.post(CLOSE.to_owned());
                }
                log::debug!("channel closing cooperatively");
                communicator.destruct(None).await;
                acceptor.complete_close();
                return;
            }
            payload => match serde_json::from_str::<Invoke>(payload) {
                Ok(invoke) => communicator.reply_data(invoke).await,
                Err(err) => log::warn!("dropping malformed channel payload: {err}"),
            },
        }
    }

    // The peer dropped its port without a close handshake.
    if acceptor.state() != AcceptorState::Closed {
        let _ = acceptor.begin_close();
        communicator
            .destruct(Some(Error::ErrTransport {
                reason: "channel port dropped".to_owned(),
            }))
            .await;
        acceptor.complete_close();
    }
}
