
mod websocket_acceptor;
mod websocket_connector;
mod websocket_server;

pub use websocket_acceptor::WebSocketAcceptor;
pub use websocket_connector::WebSocketConnector;
pub use websocket_server::WebSocketServer;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::acceptor::Acceptor;
use crate::communicator::Communicator;
use crate::error::{Error, Result};
use crate::invoke::Invoke;
use crate::transport::Transport;

/// Close codes treated as a clean shutdown: normal closure (1000) and going
/// away (1001). Anything else is surfaced to pending calls as a transport
/// error carrying the code and reason.
pub const CLEAN_CLOSE_CODES: &[u16] = &[1000, 1001];

/// Tunables shared by the server, acceptor and connector.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Close codes that destruct the communicator without an error.
    pub clean_close_codes: Vec<u16>,

    /// How many handshaken connections may queue before `accept` is called.
    pub accept_backlog: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            clean_close_codes: CLEAN_CLOSE_CODES.to_vec(),
            accept_backlog: 8,
        }
    }
}

/// The adapter half binding a websocket sink into a communicator.
pub(crate) struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    acceptor: Arc<Acceptor>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        sink: SplitSink<WebSocketStream<S>, Message>,
        acceptor: Arc<Acceptor>,
    ) -> Self {
        WsTransport {
            sink: Mutex::new(sink),
            acceptor,
        }
    }

    pub(crate) async fn send_close(&self, frame: Option<CloseFrame<'static>>) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Close(frame))
            .await
            .map_err(Error::transport)
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_data(&self, invoke: &Invoke) -> Result<()> {
        let text = serde_json::to_string(invoke).map_err(Error::transport)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(Error::transport)
    }

    fn inspect_ready(&self) -> Result<()> {
        self.acceptor.inspect_ready()
    }

    async fn request_close(&self) -> Result<()> {
        self.send_close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }))
        .await
    }
}

/// Drains inbound frames in arrival order until the connection closes, then
/// runs the close path exactly once: derive the destructor error from the
/// close frame, drain the pending table, settle the state machine.
pub(crate) async fn read_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    transport: Arc<WsTransport<S>>,
    communicator: Arc<Communicator>,
    acceptor: Arc<Acceptor>,
    clean_close_codes: Vec<u16>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut close_error = Some(Error::ErrTransport {
        reason: "connection dropped without a close frame".to_owned(),
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Invoke>(&text) {
                Ok(invoke) => communicator.reply_data(invoke).await,
                Err(err) => log::warn!("dropping malformed websocket payload: {err}"),
            },
            Ok(Message::Close(frame)) => {
                close_error = close_error_from_frame(&frame, &clean_close_codes);
                if acceptor.begin_close().is_ok() {
                    // Peer initiated; finish the close handshake so it can
                    // drain cleanly too.
                    let _ = transport.send_close(frame).await;
                }
                break;
            }
            Ok(_) => {
                // Binary frames, pings and pongs are not part of the
                // protocol.
            }
            Err(err) => {
                close_error = Some(Error::transport(err));
                break;
            }
        }
    }

    let _ = acceptor.begin_close();
    communicator.destruct(close_error).await;
    acceptor.complete_close();
    log::debug!("websocket connection shut down");
}

fn close_error_from_frame(
    frame: &Option<CloseFrame<'static>>,
    clean_close_codes: &[u16],
) -> Option<Error> {
    let frame = frame.as_ref()?;
    let code = u16::from(frame.code);
    if clean_close_codes.contains(&code) {
        None
    } else {
        Some(Error::ErrTransport {
            reason: format!("connection closed with code {code}: {}", frame.reason),
        })
    }
}

/// The locally initiated close: send the close frame, then suspend until the
/// read loop has drained the table and confirmed the physical close.
pub(crate) async fn close_endpoint<S>(
    acceptor: &Arc<Acceptor>,
    communicator: &Arc<Communicator>,
    transport: &Arc<WsTransport<S>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    acceptor.begin_close()?;
    if let Err(err) = transport.request_close().await {
        // The socket is already dead; drain against the send failure.
        communicator.destruct(Some(err.clone())).await;
        acceptor.complete_close();
        return Err(err);
    }
    acceptor.wait_closed().await;
    Ok(())
}
