//! Recognized-key option documents passed as trailing arguments.
//!
//! ```text
//! coll:find({}, { sort = { age = -1 }, skip = 10, limit = 5 })
//! coll:update(q, u, { multi = true, upsert = false })
//! coll:remove(q, { justOne = true })
//! ```
//!
//! Unknown keys are ignored. A recognized key holding a value of the wrong
//! shape is an `InvalidArgument`.

use crate::backend::{CountOptions, FindOneOptions, FindOptions, UpdateOptions};
use crate::cast;
use crate::{Error, Result};
use bson::{Bson, Document};
use mlua::Value;

/// Every option the façade understands, parsed from one options document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// `projection`
    pub projection: Option<Document>,
    /// `sort`
    pub sort: Option<Document>,
    /// `skip`
    pub skip: Option<u64>,
    /// `limit`; negative values ask for a single batch, as in the shell.
    pub limit: Option<i64>,
    /// `multi`
    pub multi: bool,
    /// `upsert`
    pub upsert: bool,
    /// `justOne`
    pub just_one: bool,
}

impl QueryOptions {
    /// Parses an already cast options document.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut opts = QueryOptions::default();
        for (key, value) in doc {
            match key.as_str() {
                "projection" => opts.projection = Some(document_option(key, value)?),
                "sort" => opts.sort = Some(document_option(key, value)?),
                "skip" => {
                    let skip = integer_option(key, value)?;
                    let skip = u64::try_from(skip)
                        .map_err(|_| Error::invalid_argument("skip must not be negative"))?;
                    opts.skip = Some(skip);
                }
                "limit" => opts.limit = Some(integer_option(key, value)?),
                "multi" => opts.multi = bool_option(key, value)?,
                "upsert" => opts.upsert = bool_option(key, value)?,
                "justOne" => opts.just_one = bool_option(key, value)?,
                _ => {}
            }
        }
        Ok(opts)
    }

    /// Parses an optional Lua argument (table, extended JSON or nil).
    pub fn from_lua(value: &Value<'_>) -> Result<Self> {
        match cast::to_document(value)? {
            Some(doc) => Self::from_document(&doc),
            None => Ok(Self::default()),
        }
    }

    /// Parses the second argument of `remove`: a `justOne` boolean or an
    /// options document.
    pub fn from_remove_arg(value: &Value<'_>) -> Result<Self> {
        match value {
            Value::Boolean(just_one) => Ok(QueryOptions { just_one: *just_one, ..Default::default() }),
            Value::Nil | Value::Table(_) | Value::String(_) => Self::from_lua(value),
            other => Err(Error::invalid_argument(format!(
                "remove expects a boolean or an options table, got {}",
                other.type_name()
            ))),
        }
    }

    /// Options for `find`.
    pub fn find(&self) -> FindOptions {
        FindOptions {
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
        }
    }

    /// Options for `findOne`; `limit` does not apply.
    pub fn find_one(&self) -> FindOneOptions {
        self.find().into()
    }

    /// Options for `count`.
    pub fn count(&self) -> CountOptions {
        self.find().into()
    }

    /// Options for `update`.
    pub fn update(&self) -> UpdateOptions {
        UpdateOptions { multi: self.multi, upsert: self.upsert }
    }
}

fn document_option(key: &str, value: &Bson) -> Result<Document> {
    match value {
        Bson::Document(doc) => Ok(doc.clone()),
        // `{}` encodes as an empty array below the top level.
        Bson::Array(items) if items.is_empty() => Ok(Document::new()),
        other => Err(Error::invalid_argument(format!(
            "invalid {} option: document expected, got {:?}",
            key,
            other.element_type()
        ))),
    }
}

fn integer_option(key: &str, value: &Bson) -> Result<i64> {
    match value {
        Bson::Int32(i) => Ok(i64::from(*i)),
        Bson::Int64(i) => Ok(*i),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Ok(*f as i64),
        other => Err(Error::invalid_argument(format!(
            "invalid {} option: integer expected, got {:?}",
            key,
            other.element_type()
        ))),
    }
}

fn bool_option(key: &str, value: &Bson) -> Result<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        other => Err(Error::invalid_argument(format!(
            "invalid {} option: boolean expected, got {:?}",
            key,
            other.element_type()
        ))),
    }
}
