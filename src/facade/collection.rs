//! Collection handles and the document operations.

use super::client::ClientInner;
use super::{outcome, QueryOptions};
use crate::backend::{Namespace, UpdateSpec};
use crate::cast::{self, into_document};
use crate::{codec, Error, Result};
use bson::{Bson, Document};
use mlua::{Lua, MetaMethod, UserData, UserDataMethods, Value};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct InsertResult {
    #[serde(rename = "nInserted")]
    inserted: u64,
}

#[derive(Debug, Serialize)]
struct UpdateResult {
    #[serde(rename = "nMatched")]
    matched: u64,
    #[serde(rename = "nModified")]
    modified: u64,
    #[serde(rename = "nUpserted")]
    upserted: u64,
}

#[derive(Debug, Serialize)]
struct RemoveResult {
    #[serde(rename = "nRemoved")]
    removed: u64,
}

/// A collection of a client's database.
#[derive(Clone)]
pub struct Collection {
    client: Arc<ClientInner>,
    ns: Namespace,
}

impl Collection {
    pub(crate) fn new(client: Arc<ClientInner>, ns: Namespace) -> Self {
        Self { client, ns }
    }

    /// The `database.collection` this handle addresses.
    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn find<'lua>(&self, lua: &'lua Lua, query: Value<'lua>, opts: Value<'lua>) -> Result<Value<'lua>> {
        let filter = cast::cast_document(&query)?;
        let options = QueryOptions::from_lua(&opts)?.find();
        let ns = self.ns.clone();
        log::debug!("find on {}: {}", ns, filter);

        let docs = self.client.call(|backend| async move { backend.find(&ns, filter, options).await })?;
        Ok(Value::Table(codec::decode_documents(lua, &docs)?))
    }

    fn find_one<'lua>(&self, lua: &'lua Lua, query: Value<'lua>, opts: Value<'lua>) -> Result<Value<'lua>> {
        let filter = cast::cast_document(&query)?;
        let options = QueryOptions::from_lua(&opts)?.find_one();
        let ns = self.ns.clone();
        log::debug!("findOne on {}: {}", ns, filter);

        let found = self.client.call(|backend| async move { backend.find_one(&ns, filter, options).await })?;
        match found {
            Some(doc) => Ok(Value::Table(codec::decode_document(lua, &doc)?)),
            None => Ok(Value::Nil),
        }
    }

    fn insert<'lua>(&self, lua: &'lua Lua, docs: Value<'lua>) -> Result<Value<'lua>> {
        let ns = self.ns.clone();
        let inserted = match cast::cast_bson(&docs)? {
            Bson::Array(items) => {
                let docs = items.into_iter().map(into_document).collect::<Result<Vec<Document>>>()?;
                log::debug!("insert of {} documents into {}", docs.len(), ns);
                self.client.call(|backend| async move { backend.insert_many(&ns, docs).await })?
            }
            Bson::Document(doc) => {
                log::debug!("insert into {}", ns);
                self.client.call(|backend| async move { backend.insert_one(&ns, doc).await })?;
                1
            }
            other => return Err(Error::type_mismatch(format!("cannot insert {:?}", other.element_type()))),
        };
        codec::to_lua(lua, &InsertResult { inserted })
    }

    fn update<'lua>(
        &self,
        lua: &'lua Lua,
        query: Value<'lua>,
        update: Value<'lua>,
        opts: Value<'lua>,
    ) -> Result<Value<'lua>> {
        let filter = cast::cast_document(&query)?;
        let spec = match cast::cast_bson(&update)? {
            Bson::Array(stages) => {
                UpdateSpec::Pipeline(stages.into_iter().map(into_document).collect::<Result<Vec<_>>>()?)
            }
            Bson::Document(doc) => UpdateSpec::Document(doc),
            other => return Err(Error::type_mismatch(format!("cannot update with {:?}", other.element_type()))),
        };
        let options = QueryOptions::from_lua(&opts)?.update();
        let ns = self.ns.clone();
        log::debug!("update on {}: {} ({:?})", ns, filter, options);

        let res = self
            .client
            .call(|backend| async move { backend.update(&ns, filter, spec, options).await })?;
        codec::to_lua(
            lua,
            &UpdateResult { matched: res.matched, modified: res.modified, upserted: res.upserted },
        )
    }

    fn remove<'lua>(&self, lua: &'lua Lua, query: Value<'lua>, opts: Value<'lua>) -> Result<Value<'lua>> {
        let filter = cast::cast_document(&query)?;
        let just_one = QueryOptions::from_remove_arg(&opts)?.just_one;
        let ns = self.ns.clone();
        log::debug!("remove on {}: {} (justOne: {})", ns, filter, just_one);

        let removed = self
            .client
            .call(|backend| async move { backend.remove(&ns, filter, just_one).await })?;
        codec::to_lua(lua, &RemoveResult { removed })
    }

    fn count<'lua>(&self, query: Value<'lua>, opts: Value<'lua>) -> Result<Value<'lua>> {
        let filter = cast::cast_document(&query)?;
        let options = QueryOptions::from_lua(&opts)?.count();
        let ns = self.ns.clone();
        log::debug!("count on {}: {}", ns, filter);

        let n = self.client.call(|backend| async move { backend.count(&ns, filter, options).await })?;
        Ok(Value::Integer(i64::try_from(n).unwrap_or(i64::MAX)))
    }

    fn aggregate<'lua>(&self, lua: &'lua Lua, pipeline: Value<'lua>) -> Result<Value<'lua>> {
        let pipeline = cast::cast_pipeline(&pipeline)?;
        let ns = self.ns.clone();
        log::debug!("aggregate on {} with {} stages", ns, pipeline.len());

        let docs = self.client.call(|backend| async move { backend.aggregate(&ns, pipeline).await })?;
        Ok(Value::Table(codec::decode_documents(lua, &docs)?))
    }
}

impl UserData for Collection {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(format!("Collection({})", this.ns)));

        methods.add_method("getName", |_, this, ()| Ok(this.ns.collection.clone()));

        methods.add_method("find", |lua, this, (query, opts): (Value<'lua>, Value<'lua>)| {
            outcome(lua, this.find(lua, query, opts))
        });

        methods.add_method("findOne", |lua, this, (query, opts): (Value<'lua>, Value<'lua>)| {
            outcome(lua, this.find_one(lua, query, opts))
        });

        methods.add_method("insert", |lua, this, docs: Value<'lua>| outcome(lua, this.insert(lua, docs)));

        methods.add_method(
            "update",
            |lua, this, (query, update, opts): (Value<'lua>, Value<'lua>, Value<'lua>)| {
                outcome(lua, this.update(lua, query, update, opts))
            },
        );

        methods.add_method("remove", |lua, this, (query, opts): (Value<'lua>, Value<'lua>)| {
            outcome(lua, this.remove(lua, query, opts))
        });

        methods.add_method("count", |lua, this, (query, opts): (Value<'lua>, Value<'lua>)| {
            outcome(lua, this.count(query, opts))
        });

        methods.add_method("aggregate", |lua, this, pipeline: Value<'lua>| {
            outcome(lua, this.aggregate(lua, pipeline))
        });
    }
}
