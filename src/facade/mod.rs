//! The `mongo` and `bson` Lua modules.
//!
//! # Architecture
//!
//! ```text
//! Lua script
//!    │  require 'mongo'
//!    ▼
//! Client ──► Database ──► Collection      (userdata handles)
//!    │             │             │
//!    └─────────────┴──── ClientInner ────► Arc<dyn Backend>
//!                             │
//!                             ▼
//!              shared tokio runtime, block_on + timeout
//! ```
//!
//! Every handle shares its client's connection state, so a collection
//! obtained before `disconnect` fails cleanly afterwards instead of holding a
//! stale connection.
//!
//! # Error convention
//!
//! Operation failures (server errors, timeouts, a missing connection) are
//! returned to the script as `nil, message`. Argument errors and codec
//! invariant violations are raised.
//!
//! # Example
//!
//! ```rust,no_run
//! use luamongo::{facade, Options};
//! use luamongo::backend::MemoryConnector;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), luamongo::Error> {
//! let lua = mlua::Lua::new();
//! facade::preload_with(&lua, Arc::new(MemoryConnector::new()), Options::default())?;
//!
//! lua.load(r#"
//!     local mongo = require 'mongo'
//!     local client = mongo.Client()
//!     assert(client:connect('memory://local'))
//!     local users = client:getCollection('app', 'users')
//!     users:insert({ name = 'ann', joined = mongo.DateTime(0) })
//!     assert(users:findOne({ name = 'ann' }).joined == mongo.DateTime(0))
//! "#).exec()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod collection;
pub mod database;
pub mod options;

pub use client::Client;
pub use collection::Collection;
pub use database::Database;
pub use options::QueryOptions;

use crate::backend::Connector;
use crate::{scalar, Error, Options, Result};
use mlua::{IntoLuaMulti, Lua, MultiValue, Table, Value};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// State shared by every client created from one registered module.
pub(crate) struct Shared {
    pub(crate) connector: Arc<dyn Connector>,
    runtime: Option<Runtime>,
    pub(crate) options: Options,
}

impl Shared {
    pub(crate) fn new(connector: Arc<dyn Connector>, options: Options) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(options.worker_threads.max(1))
            .thread_name("luamongo-worker")
            .enable_all()
            .build()
            .map_err(|e| Error::operation(format!("failed to start async runtime: {}", e)))?;
        Ok(Self { connector, runtime: Some(runtime), options })
    }

    pub(crate) fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| Error::operation("async runtime has shut down"))
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // The Lua state may be dropped from inside a host's async context,
        // where a blocking runtime shutdown panics.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Converts an operation result into the script-facing return values.
///
/// `Ok(v)` returns `v`. An operation failure returns `nil, message`. Every
/// other error is raised.
pub(crate) fn outcome<'lua>(lua: &'lua Lua, result: Result<Value<'lua>>) -> mlua::Result<MultiValue<'lua>> {
    match result {
        Ok(value) => value.into_lua_multi(lua),
        Err(e) if e.is_operation_failure() => {
            log::warn!("{}", e);
            (Value::Nil, e.to_string()).into_lua_multi(lua)
        }
        Err(e) => Err(e.into()),
    }
}

/// Builds the `mongo` module table: `Client`, the scalar constructors,
/// `Null`, `_VERSION` and `_DEBUG`.
pub(crate) fn create_module<'lua>(lua: &'lua Lua, shared: &Arc<Shared>) -> mlua::Result<Table<'lua>> {
    let module = lua.create_table()?;

    let for_clients = Arc::clone(shared);
    module.set(
        "Client",
        lua.create_function(move |_, ()| Ok(Client::new(Arc::clone(&for_clients))))?,
    )?;
    scalar::register(lua, &module)?;
    module.set("_DEBUG", shared.options.debug)?;
    module.set("_VERSION", env!("CARGO_PKG_VERSION"))?;

    Ok(module)
}

/// Builds the standalone `bson` module: scalar constructors and `Null` only.
pub fn create_bson_module(lua: &Lua) -> mlua::Result<Table<'_>> {
    let module = lua.create_table()?;
    scalar::register(lua, &module)?;
    Ok(module)
}

/// Registers both modules in `package.preload` with the default connector
/// and options.
///
/// With the `mongodb` feature the default connector is
/// [`MongoConnector`](crate::backend::MongoConnector); without it scripts get
/// the in-process [`MemoryConnector`](crate::backend::MemoryConnector).
pub fn preload(lua: &Lua) -> Result<()> {
    #[cfg(feature = "mongodb")]
    let connector: Arc<dyn Connector> = Arc::new(crate::backend::MongoConnector);
    #[cfg(not(feature = "mongodb"))]
    let connector: Arc<dyn Connector> = Arc::new(crate::backend::MemoryConnector::new());

    preload_with(lua, connector, Options::default())
}

/// Registers both modules in `package.preload`, connecting clients through
/// `connector`.
pub fn preload_with(lua: &Lua, connector: Arc<dyn Connector>, options: Options) -> Result<()> {
    let shared = Arc::new(Shared::new(connector, options)?);
    let preload: Table<'_> = lua.globals().get::<_, Table<'_>>("package")?.get("preload")?;

    let loader_state = Arc::clone(&shared);
    let loader = lua.create_function(move |lua, _: MultiValue<'_>| create_module(lua, &loader_state))?;
    preload.set(shared.options.module_name.as_str(), loader)?;

    let bson_loader = lua.create_function(|lua, _: MultiValue<'_>| create_bson_module(lua))?;
    preload.set(shared.options.bson_module_name.as_str(), bson_loader)?;

    log::debug!(
        "preloaded modules {:?} and {:?}",
        shared.options.module_name,
        shared.options.bson_module_name
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryConnector;

    #[test]
    fn test_outcome_convention() {
        let lua = Lua::new();

        let ok = outcome(&lua, Ok(Value::Boolean(true))).unwrap();
        assert_eq!(ok.len(), 1);

        let failed = outcome(&lua, Err(Error::operation("boom"))).unwrap().into_vec();
        assert_eq!(failed.len(), 2);
        assert!(failed[0].is_nil());
        assert_eq!(failed[1].as_str(), Some("boom"));

        assert!(outcome(&lua, Err(Error::type_mismatch("bad"))).is_err());
    }

    #[test]
    fn test_module_tables() {
        let lua = Lua::new();
        let options = Options::default().with_module_name("db").with_debug(true);
        preload_with(&lua, Arc::new(MemoryConnector::new()), options).unwrap();

        let (debug, version, has_client, bson_has_client, nulls_match): (bool, String, bool, bool, bool) = lua
            .load(
                r#"
                local db = require 'db'
                local bson = require 'bson'
                return db._DEBUG, db._VERSION, db.Client ~= nil, bson.Client ~= nil, db.Null == bson.Null
                "#,
            )
            .eval()
            .unwrap();

        assert!(debug);
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
        assert!(has_client);
        assert!(!bson_has_client);
        assert!(nulls_match);
    }
}
