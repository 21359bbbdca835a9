
mod acceptor_state;

pub use acceptor_state::AcceptorState;

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Acceptor is the lifecycle state machine shared by every transport.
///
/// Transports drive it through the begin/complete transition pairs; every
/// outbound operation consults [`Acceptor::inspect`] before touching the
/// wire. Illegal transitions are programmer errors and fail synchronously.
pub struct Acceptor {
    state: AtomicU8,
    closed_tx: watch::Sender<bool>,
}

impl Default for Acceptor {
    fn default() -> Self {
        Acceptor::new()
    }
}

impl Acceptor {
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Acceptor {
            state: AtomicU8::new(AcceptorState::None.into()),
            closed_tx,
        }
    }

    pub fn state(&self) -> AcceptorState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Returns an error iff the given state is not `Open`, distinguishing
    /// not-yet-opened, already-closed and closing-in-progress.
    pub fn inspect(state: AcceptorState) -> Result<()> {
        match state {
            AcceptorState::Open => Ok(()),
            AcceptorState::Closed => Err(Error::ErrAlreadyClosed),
            AcceptorState::Closing => Err(Error::ErrClosingInProgress),
            AcceptorState::None
            | AcceptorState::Accepting
            | AcceptorState::Rejecting
            | AcceptorState::Opening => Err(Error::ErrNotOpened),
        }
    }

    /// The readiness check every outbound call consults.
    pub fn inspect_ready(&self) -> Result<()> {
        Acceptor::inspect(self.state())
    }

    /// `None → Accepting`. Anything else has already accepted or rejected.
    pub(crate) fn begin_accept(&self) -> Result<()> {
        self.transit(AcceptorState::None, AcceptorState::Accepting)
            .map_err(|_| Error::ErrAlreadyAccepted)
    }

    /// `Accepting → Open`, after callbacks are registered.
    pub(crate) fn complete_accept(&self) {
        self.force(AcceptorState::Open);
    }

    /// `None → Rejecting`.
    pub(crate) fn begin_reject(&self) -> Result<()> {
        self.transit(AcceptorState::None, AcceptorState::Rejecting)
            .map_err(|_| Error::ErrAlreadyAccepted)
    }

    /// `Rejecting → Closed`.
    pub(crate) fn complete_reject(&self) {
        self.force(AcceptorState::Closed);
        let _ = self.closed_tx.send(true);
    }

    /// `Open → Closing`, whether locally or peer initiated.
    pub(crate) fn begin_close(&self) -> Result<()> {
        self.transit(AcceptorState::Open, AcceptorState::Closing)
            .map_err(|actual| match Acceptor::inspect(actual) {
                Err(err) => err,
                Ok(()) => Error::ErrNotOpened,
            })
    }

    /// `Closing → Closed`, once the table is drained and the transport has
    /// confirmed its physical close.
    pub(crate) fn complete_close(&self) {
        self.force(AcceptorState::Closed);
        let _ = self.closed_tx.send(true);
    }

    /// `None | Closed → Opening` (server-side listeners only).
    pub(crate) fn begin_open(&self) -> Result<()> {
        self.transit(AcceptorState::None, AcceptorState::Opening)
            .or_else(|_| self.transit(AcceptorState::Closed, AcceptorState::Opening))
            .map_err(|actual| match actual {
                AcceptorState::Open | AcceptorState::Opening | AcceptorState::Accepting => {
                    Error::ErrAlreadyOpened
                }
                AcceptorState::Closing => Error::ErrClosingInProgress,
                _ => Error::ErrNotOpened,
            })
    }

    /// `Opening → Open`, once the listener is bound.
    pub(crate) fn complete_open(&self) {
        self.force(AcceptorState::Open);
        let _ = self.closed_tx.send(false);
    }

    /// Suspends until the state reaches `Closed`.
    pub async fn wait_closed(&self) {
        let mut closed_rx = self.closed_tx.subscribe();
        while !*closed_rx.borrow_and_update() {
            if closed_rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn transit(
        &self,
        from: AcceptorState,
        to: AcceptorState,
    ) -> std::result::Result<(), AcceptorState> {
        self.state
            .compare_exchange(from.into(), to.into(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(AcceptorState::from)
    }

    fn force(&self, to: AcceptorState) {
        self.state.store(to.into(), Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor").field("state", &self.state()).finish()
    }
}
