//! Remote Function Call over pluggable transports.
//!
//! One endpoint exposes a [`Provider`], a tree of named async functions,
//! and its peer invokes those functions through a [`Driver`] as if they were
//! local: natural return values come back, thrown errors come back with
//! their identity intact. Many concurrent calls multiplex over a single
//! ordered message stream; correlation is by per-call id.
//!
//! The engine itself is transport agnostic. A [`Communicator`] holds the
//! pending-call table and routes records; anything able to move small text
//! payloads can carry it by implementing [`transport::Transport`]. Three
//! adapters ship with the crate: a symmetric in-process pair, a worker-style
//! message channel with a `"READY"`/`"CLOSE"` handshake, and a WebSocket
//! family (server, per-connection acceptor, connector).

#![warn(rust_2018_idioms)]

pub mod acceptor;
pub mod communicator;
pub mod driver;
pub mod error;
pub mod invoke;
pub mod provider;
pub mod transport;

pub use crate::acceptor::{Acceptor, AcceptorState};
pub use crate::communicator::Communicator;
pub use crate::driver::Driver;
pub use crate::error::{Error, Result};
pub use crate::invoke::{ErrorValue, Invoke, InvokeFunction, InvokeReturn, Parameter};
pub use crate::provider::Provider;
