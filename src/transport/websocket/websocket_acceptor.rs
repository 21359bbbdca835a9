use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::WebSocketStream;

use super::{close_endpoint, read_loop, WsTransport};
use crate::acceptor::{Acceptor, AcceptorState};
use crate::communicator::Communicator;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::transport::Transport;

/// WebSocketAcceptor wraps a single handshaken server-side connection.
///
/// The application decides per connection, typically by looking at
/// [`WebSocketAcceptor::path`], whether to `accept` it with a provider or
/// `reject` it.
pub struct WebSocketAcceptor {
    path: String,
    acceptor: Arc<Acceptor>,
    communicator: Arc<Communicator>,
    stream: Mutex<Option<WebSocketStream<TcpStream>>>,
    transport: Mutex<Option<Arc<WsTransport<TcpStream>>>>,
    clean_close_codes: Vec<u16>,
}

impl WebSocketAcceptor {
    pub(crate) fn new(
        stream: WebSocketStream<TcpStream>,
        path: String,
        clean_close_codes: Vec<u16>,
    ) -> Self {
        WebSocketAcceptor {
            path,
            acceptor: Arc::new(Acceptor::new()),
            communicator: Communicator::new(None),
            stream: Mutex::new(Some(stream)),
            transport: Mutex::new(None),
            clean_close_codes,
        }
    }

    /// The path of the HTTP upgrade URL this connection arrived on.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> AcceptorState {
        self.acceptor.state()
    }

    /// Accepts the connection: installs the provider, wires the transport
    /// and starts the read loop. May only be called once, from `None`.
    pub async fn accept(&self, provider: Option<Provider>) -> Result<()> {
        self.acceptor.begin_accept()?;

        let ws = self
            .stream
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Other("websocket stream already consumed".to_owned()))?;
        let (sink, stream) = ws.split();
        let transport = Arc::new(WsTransport::new(sink, Arc::clone(&self.acceptor)));

        self.communicator.set_provider(provider).await;
        self.communicator
            .register_transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .await;
        *self.transport.lock().await = Some(Arc::clone(&transport));

        tokio::spawn(read_loop(
            stream,
            transport,
            Arc::clone(&self.communicator),
            Arc::clone(&self.acceptor),
            self.clean_close_codes.clone(),
        ));

        self.acceptor.complete_accept();
        log::debug!("accepted websocket connection at {}", self.path);
        Ok(())
    }

    /// Refuses the connection with a policy-violation close frame. May only
    /// be called once, from `None`.
    pub async fn reject(&self) -> Result<()> {
        self.acceptor.begin_reject()?;

        if let Some(mut ws) = self.stream.lock().await.take() {
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "rejected".into(),
                }))
                .await;
        }
        self.communicator.destruct(None).await;
        self.acceptor.complete_reject();
        log::debug!("rejected websocket connection at {}", self.path);
        Ok(())
    }

    /// Closes the connection and suspends until every pending call has
    /// settled and the socket is gone.
    pub async fn close(&self) -> Result<()> {
        let transport = self.transport.lock().await.clone();
        match transport {
            Some(transport) => {
                close_endpoint(&self.acceptor, &self.communicator, &transport).await
            }
            None => Err(match Acceptor::inspect(self.state()) {
                Err(err) => err,
                Ok(()) => Error::ErrNotOpened,
            }),
        }
    }

    /// Suspends until this connection reaches `Closed`.
    pub async fn join(&self) {
        self.acceptor.wait_closed().await;
    }

    pub fn get_driver(&self) -> Driver {
        self.communicator.get_driver()
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }
}
