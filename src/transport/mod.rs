pub mod channel;
pub mod direct;
pub mod websocket;

#[cfg(test)]
mod direct_test;

use async_trait::async_trait;

use crate::error::Result;
use crate::invoke::Invoke;

/// Control message announcing that a message handler is attached. Sent as a
/// raw non-JSON string so decoders can detect it before parsing.
pub const READY: &str = "READY";

/// Control message requesting a cooperative shutdown. Raw string, like
/// [`READY`].
pub const CLOSE: &str = "CLOSE";

/// Transport is the contract every adapter satisfies to plug into a
/// [`Communicator`](crate::communicator::Communicator).
///
/// The other half of the contract is behavioral: the adapter decodes inbound
/// payloads and hands them to `reply_data` in arrival order (dropping
/// malformed ones), and calls `destruct` exactly once from its close path,
/// passing an error for a non-clean close. The adapter owns the underlying
/// socket or port; the communicator never closes it directly.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serializes the record to the transport's payload type and hands it
    /// off. Buffering is the transport's concern.
    async fn send_data(&self, invoke: &Invoke) -> Result<()>;

    /// The readiness predicate consulted by every outbound operation.
    /// Acceptor-backed transports delegate to
    /// [`Acceptor::inspect`](crate::acceptor::Acceptor::inspect); transports
    /// without a state machine are constantly ready.
    fn inspect_ready(&self) -> Result<()>;

    /// Asks the transport to begin its physical close: emit the close frame
    /// or control message its protocol uses. The communicator never closes
    /// the underlying socket or port itself.
    async fn request_close(&self) -> Result<()>;
}
