use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use super::{WebSocketAcceptor, WebSocketConfig};
use crate::acceptor::{Acceptor, AcceptorState};
use crate::error::{Error, Result};

/// WebSocketServer listens for upgrade requests and hands each handshaken
/// connection out as a [`WebSocketAcceptor`].
///
/// Closing the listener does not touch connections that were already
/// accepted; the server may be re-opened afterwards, possibly on a different
/// address.
pub struct WebSocketServer {
    config: WebSocketConfig,
    lifecycle: Arc<Acceptor>,
    local_addr: Mutex<Option<SocketAddr>>,
    incoming_rx: Mutex<Option<mpsc::Receiver<WebSocketAcceptor>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Default for WebSocketServer {
    fn default() -> Self {
        WebSocketServer::new()
    }
}

impl WebSocketServer {
    pub fn new() -> Self {
        WebSocketServer::with_config(WebSocketConfig::default())
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        WebSocketServer {
            config,
            lifecycle: Arc::new(Acceptor::new()),
            local_addr: Mutex::new(None),
            incoming_rx: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AcceptorState {
        self.lifecycle.state()
    }

    /// The address the listener is bound to. Useful with port 0.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        (*self.local_addr.lock().await).ok_or(Error::ErrNotOpened)
    }

    /// Binds the listener and starts accepting upgrade requests. Permitted
    /// from `None` (initial open) and `Closed` (re-open).
    pub async fn open(&self, addr: &str) -> Result<()> {
        self.lifecycle.begin_open()?;

        let (listener, local_addr) = match TcpListener::bind(addr).await {
            Ok(listener) => match listener.local_addr() {
                Ok(local_addr) => (listener, local_addr),
                Err(err) => {
                    self.lifecycle.complete_close();
                    return Err(Error::transport(err));
                }
            },
            Err(err) => {
                self.lifecycle.complete_close();
                return Err(Error::transport(err));
            }
        };
        *self.local_addr.lock().await = Some(local_addr);

        let (incoming_tx, incoming_rx) = mpsc::channel(self.config.accept_backlog);
        *self.incoming_rx.lock().await = Some(incoming_rx);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        tokio::spawn(accept_loop(
            listener,
            incoming_tx,
            shutdown_rx,
            self.config.clean_close_codes.clone(),
        ));

        self.lifecycle.complete_open();
        log::debug!("websocket server listening on {addr}");
        Ok(())
    }

    /// Waits for and returns the next handshaken connection.
    pub async fn accept(&self) -> Result<WebSocketAcceptor> {
        let mut incoming_rx = self.incoming_rx.lock().await;
        let rx = incoming_rx.as_mut().ok_or(Error::ErrNotOpened)?;
        rx.recv().await.ok_or(Error::ErrAlreadyClosed)
    }

    /// Stops listening. Connections already accepted live on.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.begin_close()?;
        if let Some(shutdown_tx) = self.shutdown_tx.lock().await.take() {
            let _ = shutdown_tx.send(());
        }
        *self.incoming_rx.lock().await = None;
        *self.local_addr.lock().await = None;
        self.lifecycle.complete_close();
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    incoming_tx: mpsc::Sender<WebSocketAcceptor>,
    mut shutdown_rx: oneshot::Receiver<()>,
    clean_close_codes: Vec<u16>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => {
                let (tcp_stream, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        log::warn!("tcp accept failed: {err}");
                        continue;
                    }
                };
                match handshake(tcp_stream, clean_close_codes.clone()).await {
                    Ok(acceptor) => {
                        log::debug!(
                            "websocket upgrade from {remote_addr} at {}",
                            acceptor.path()
                        );
                        if incoming_tx.send(acceptor).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => log::warn!("websocket upgrade from {remote_addr} failed: {err}"),
                }
            }
        }
    }
    log::debug!("websocket server stopped listening");
}

async fn handshake(
    tcp_stream: TcpStream,
    clean_close_codes: Vec<u16>,
) -> Result<WebSocketAcceptor> {
    let mut path = String::from("/");
    let ws = accept_hdr_async(tcp_stream, |request: &Request, response: Response| {
        path = request.uri().path().to_owned();
        Ok(response)
    })
    .await
    .map_err(Error::transport)?;

    Ok(WebSocketAcceptor::new(ws, path, clean_close_codes))
}
