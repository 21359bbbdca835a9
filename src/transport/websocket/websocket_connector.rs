use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use super::{close_endpoint, read_loop, WebSocketConfig, WsTransport};
use crate::acceptor::{Acceptor, AcceptorState};
use crate::communicator::Communicator;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::transport::Transport;

/// WebSocketConnector is the client end of a websocket connection: it dials
/// the server, optionally exposing its own provider for calls coming the
/// other way.
pub struct WebSocketConnector {
    url: String,
    acceptor: Arc<Acceptor>,
    communicator: Arc<Communicator>,
    transport: Arc<WsTransport<MaybeTlsStream<TcpStream>>>,
}

impl WebSocketConnector {
    pub async fn connect(url: &str, provider: Option<Provider>) -> Result<Self> {
        WebSocketConnector::connect_with(url, provider, WebSocketConfig::default()).await
    }

    pub async fn connect_with(
        url: &str,
        provider: Option<Provider>,
        config: WebSocketConfig,
    ) -> Result<Self> {
        let acceptor = Arc::new(Acceptor::new());
        acceptor.begin_accept()?;

        let (ws, _response) = connect_async(url).await.map_err(Error::transport)?;
        let (sink, stream) = ws.split();

        let communicator = Communicator::new(provider);
        let transport = Arc::new(WsTransport::new(sink, Arc::clone(&acceptor)));
        communicator
            .register_transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .await;

        tokio::spawn(read_loop(
            stream,
            Arc::clone(&transport),
            Arc::clone(&communicator),
            Arc::clone(&acceptor),
            config.clean_close_codes,
        ));

        acceptor.complete_accept();
        log::debug!("connected to {url}");

        Ok(WebSocketConnector {
            url: url.to_owned(),
            acceptor,
            communicator,
            transport,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
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

    /// Closes the connection and suspends until every pending call has
    /// settled and the socket is gone. A second close observes the
    /// closing/closed state and fails.
    pub async fn close(&self) -> Result<()> {
        close_endpoint(&self.acceptor, &self.communicator, &self.transport).await
    }

    /// Suspends until this connection reaches `Closed`.
    pub async fn join(&self) {
        self.acceptor.wait_closed().await;
    }
}
