//! Database handles returned by `client:getDatabase(name)`.

use super::client::{required_name, ClientInner};
use super::{outcome, Collection};
use crate::backend::Namespace;
use crate::{cast, codec, Result};
use mlua::{Lua, MetaMethod, UserData, UserDataMethods, Value};
use std::sync::Arc;

/// A named database of a client.
#[derive(Clone)]
pub struct Database {
    client: Arc<ClientInner>,
    name: String,
}

impl Database {
    pub(crate) fn new(client: Arc<ClientInner>, name: String) -> Self {
        Self { client, name }
    }

    /// The database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn collection_names<'lua>(&self, lua: &'lua Lua, filter: Value<'lua>) -> Result<Value<'lua>> {
        let filter = cast::to_document(&filter)?;
        let database = self.name.clone();
        let names = self
            .client
            .call(|backend| async move { backend.list_collection_names(&database, filter).await })?;
        codec::to_lua(lua, &names)
    }
}

impl UserData for Database {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(format!("Database({})", this.name)));

        methods.add_method("getName", |_, this, ()| Ok(this.name.clone()));

        methods.add_method("getCollection", |_, this, name: Option<String>| {
            let name = required_name(name, "collection name")?;
            Ok(Collection::new(Arc::clone(&this.client), Namespace::new(this.name.clone(), name)))
        });

        methods.add_method("getCollectionNames", |lua, this, filter: Value<'lua>| {
            outcome(lua, this.collection_names(lua, filter))
        });
    }
}
