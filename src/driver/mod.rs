
use std::fmt;
use std::sync::Weak;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::communicator::Communicator;
use crate::error::{Error, Result};
use crate::invoke::{InvokeFunction, Parameter};

/// Driver is the client-side façade over a remote provider: member access
/// extends the dot-separated path without touching the wire, invocation
/// materializes a function invoke and suspends until its return.
///
/// A driver holds only a weak reference back to its communicator, so a
/// caller keeping drivers alive cannot keep a destroyed connection alive.
/// It is deliberately not a future: it cannot be awaited by accident, and a
/// member named `then` is an ordinary path segment.
#[derive(Clone)]
pub struct Driver {
    communicator: Weak<Communicator>,

    /// Dot-separated member path; empty at the root.
    path: String,
}

impl Driver {
    pub(crate) fn new(communicator: Weak<Communicator>, path: String) -> Self {
        Driver { communicator, path }
    }

    /// Returns a new driver whose path is this one's extended by `name`.
    /// No wire traffic.
    pub fn member(&self, name: &str) -> Driver {
        let path = if self.path.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{}", self.path, name)
        };
        Driver {
            communicator: self.communicator.clone(),
            path,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Invokes the member this driver points at and suspends until the
    /// matching return, yielding the raw value.
    pub async fn invoke(&self, parameters: Vec<Parameter>) -> Result<Value> {
        if self.path.is_empty() {
            // The root driver names no member; there is nothing to call.
            return Err(Error::ErrResolve {
                listener: String::new(),
            });
        }
        let communicator = self
            .communicator
            .upgrade()
            .ok_or(Error::ErrCommunicatorClosed)?;
        communicator
            .send_invoke(InvokeFunction {
                uid: 0,
                listener: self.path.clone(),
                parameters,
            })
            .await
    }

    /// Invokes the member and decodes the returned value into `T`.
    pub async fn call<T: DeserializeOwned>(&self, parameters: Vec<Parameter>) -> Result<T> {
        let value = self.invoke(parameters).await?;
        serde_json::from_value(value).map_err(|err| Error::Other(err.to_string()))
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("path", &self.path).finish()
    }
}
