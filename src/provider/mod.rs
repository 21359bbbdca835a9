
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::Error;
use crate::invoke::{ErrorValue, Parameter};

/// A registered provider function: arguments in, value or error descriptor
/// out. Functions may suspend; the communicator awaits them before sending
/// the return.
pub type ProviderFn = Box<
    dyn (Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = Result<Value, ErrorValue>> + Send>>)
        + Send
        + Sync,
>;

enum Member {
    Function(ProviderFn),
    Namespace(Provider),
}

/// Provider is the object whose members are exposed for remote invocation:
/// named async functions, possibly nested inside plain-object namespaces.
///
/// Incoming function invokes are resolved against it by walking the
/// dot-separated listener path.
#[derive(Default)]
pub struct Provider {
    members: HashMap<String, Member>,
}

impl Provider {
    pub fn new() -> Self {
        Provider::default()
    }

    /// Registers a function member under the given name.
    pub fn with_function<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorValue>> + Send + 'static,
    {
        self.members.insert(
            name.to_owned(),
            Member::Function(Box::new(move |params| Box::pin(f(params)))),
        );
        self
    }

    /// Registers a nested namespace under the given name.
    pub fn with_namespace(mut self, name: &str, namespace: Provider) -> Self {
        self.members
            .insert(name.to_owned(), Member::Namespace(namespace));
        self
    }

    /// Resolves the listener path and applies the function it leads to.
    ///
    /// A missing intermediate or final segment, or a final segment that is a
    /// namespace rather than a function, is a resolution error.
    pub(crate) async fn call(
        &self,
        listener: &str,
        parameters: Vec<Parameter>,
    ) -> Result<Value, ErrorValue> {
        let function = self.resolve(listener)?;
        let arguments = parameters.into_iter().map(Parameter::into_value).collect();
        function(arguments).await
    }

    fn resolve(&self, listener: &str) -> Result<&ProviderFn, ErrorValue> {
        let unresolved = || {
            ErrorValue::from(&Error::ErrResolve {
                listener: listener.to_owned(),
            })
        };

        let mut current = self;
        let mut segments = listener.split('.').peekable();
        while let Some(segment) = segments.next() {
            match current.members.get(segment) {
                Some(Member::Function(f)) if segments.peek().is_none() => return Ok(f),
                Some(Member::Namespace(namespace)) if segments.peek().is_some() => {
                    current = namespace;
                }
                _ => return Err(unresolved()),
            }
        }
        Err(unresolved())
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.members.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Provider").field("members", &names).finish()
    }
}
