//! The `mongo.Client()` handle.

use super::{outcome, Collection, Database, Shared};
use crate::backend::{Backend, Namespace};
use crate::{cast, codec, Error, Result};
use mlua::{Lua, MultiValue, UserData, UserDataMethods, Value};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;

/// Connection state of one client, shared with the handles it creates.
pub(crate) struct ClientInner {
    shared: Arc<Shared>,
    backend: Mutex<Option<Arc<dyn Backend>>>,
    timeout: Mutex<Duration>,
}

impl ClientInner {
    fn new(shared: Arc<Shared>) -> Self {
        let timeout = shared.options.timeout;
        Self { shared, backend: Mutex::new(None), timeout: Mutex::new(timeout) }
    }

    pub(crate) fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    fn is_connected(&self) -> bool {
        self.backend.lock().is_some()
    }

    /// Drives `fut` to completion on the shared runtime, bounded by the
    /// client's timeout.
    ///
    /// A host may call into Lua from inside its own tokio runtime, where
    /// blocking on another runtime panics. In that case the future is driven
    /// from a scoped helper thread instead.
    pub(crate) fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let timeout = self.timeout();
        let task = async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(timeout)),
            }
        };

        let runtime = self.shared.runtime()?;
        if Handle::try_current().is_err() {
            return runtime.block_on(task);
        }
        log::trace!("inside a host runtime, blocking from a helper thread");
        thread::scope(|s| match s.spawn(move || runtime.block_on(task)).join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        })
    }

    /// Runs an operation against the live backend.
    pub(crate) fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let backend = self.backend.lock().clone().ok_or_else(Error::not_connected)?;
        self.run(op(backend))
    }

    fn connect(&self, uri: &str) -> Result<()> {
        if self.is_connected() {
            return Err(Error::operation("mongo client already connected"));
        }
        let connector = Arc::clone(&self.shared.connector);
        let backend = self.run(async move { connector.connect(uri).await })?;
        *self.backend.lock() = Some(backend);
        log::info!("mongo client connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        // State is cleared before teardown so a failed shutdown still leaves
        // the client reusable.
        let Some(backend) = self.backend.lock().take() else {
            return Ok(());
        };
        let result = self.run(async move { backend.shutdown().await });
        match &result {
            Ok(()) => log::info!("mongo client disconnected"),
            Err(e) => log::warn!("mongo client teardown failed: {}", e),
        }
        result
    }
}

/// A script-facing client handle.
///
/// A client owns at most one live connection. `connect` on a connected client
/// fails rather than replacing it; `disconnect` is idempotent.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { inner: Arc::new(ClientInner::new(shared)) }
    }

    /// Returns whether the client holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Returns the current operation timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout()
    }
}

pub(crate) fn required_name(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(Error::invalid_argument(format!("{} required", what))),
    }
}

fn timeout_millis(value: &Value<'_>) -> Result<u64> {
    codec::integral(value)
        .and_then(|ms| u64::try_from(ms).ok())
        .ok_or_else(|| Error::invalid_argument("timeout must be a non-negative number of milliseconds"))
}

fn database_names<'lua>(lua: &'lua Lua, inner: &ClientInner, filter: Value<'lua>) -> Result<Value<'lua>> {
    let filter = cast::to_document(&filter)?;
    let names = inner.call(|backend| async move { backend.list_database_names(filter).await })?;
    codec::to_lua(lua, &names)
}

impl UserData for Client {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("connect", |lua, this, uri: Option<String>| -> mlua::Result<MultiValue<'lua>> {
            let uri = required_name(uri, "uri")?;
            outcome(lua, this.inner.connect(&uri).map(|()| Value::Boolean(true)))
        });

        methods.add_method("disconnect", |lua, this, ()| {
            outcome(lua, this.inner.disconnect().map(|()| Value::Boolean(true)))
        });

        methods.add_method("set_timeout", |_, this, ms: Value<'lua>| {
            let ms = timeout_millis(&ms)?;
            this.inner.set_timeout(Duration::from_millis(ms));
            Ok(true)
        });

        methods.add_method("getDatabase", |_, this, name: Option<String>| {
            let name = required_name(name, "database name")?;
            Ok(Database::new(Arc::clone(&this.inner), name))
        });

        methods.add_method(
            "getCollection",
            |_, this, (database, collection): (Option<String>, Option<String>)| {
                let database = required_name(database, "database name")?;
                let collection = required_name(collection, "collection name")?;
                Ok(Collection::new(Arc::clone(&this.inner), Namespace::new(database, collection)))
            },
        );

        methods.add_method("getDatabaseNames", |lua, this, filter: Value<'lua>| {
            outcome(lua, database_names(lua, &this.inner, filter))
        });
    }
}
