//! Casting of Lua arguments into BSON documents and arrays.
//!
//! Operation arguments arrive either as tables or as extended JSON text:
//!
//! ```text
//! coll:find({ a = 1 })                       -- table
//! coll:update({ a = 1 }, '{"$set": {"a": 2}}') -- extended JSON
//! ```
//!
//! An empty table is an empty *document* here, even though the codec encodes
//! it as an empty array. Query, update and insert arguments are object-shaped
//! far more often than not, so `{}` must mean "match everything", not `[]`.

use crate::codec;
use crate::{Error, Result};
use bson::{Bson, Document};
use mlua::Value;

/// Parses extended JSON text into a `Document` or an `Array`.
///
/// After trimming, the text must start with `{` or `[`; anything else fails
/// with `InvalidBson`. Parser errors are passed through unchanged as
/// `Error::Parse`.
pub fn parse_extended_json(text: &str) -> Result<Bson> {
    let text = text.trim();
    let expect_document = match text.as_bytes().first() {
        Some(b'{') => true,
        Some(b'[') => false,
        _ => return Err(Error::InvalidBson("document or array expected".to_string())),
    };

    let json: serde_json::Value = serde_json::from_str(text)?;
    let bson = Bson::try_from(json)?;
    match (expect_document, bson) {
        (true, Bson::Document(doc)) => Ok(Bson::Document(doc)),
        (false, Bson::Array(items)) => Ok(Bson::Array(items)),
        // `{"$oid": ...}` and friends parse to a bare scalar.
        (_, other) => Err(Error::InvalidBson(format!(
            "document or array expected, got {:?}",
            other.element_type()
        ))),
    }
}

/// Casts a Lua argument into a `Document` or an `Array`.
///
/// Strings are parsed as extended JSON, tables are encoded by the codec with
/// an empty table becoming an empty document. Any other value fails with
/// `TypeMismatch`.
pub fn cast_bson(value: &Value<'_>) -> Result<Bson> {
    match value {
        Value::String(s) => {
            let text = s
                .to_str()
                .map_err(|_| Error::InvalidBson("extended JSON text must be valid UTF-8".to_string()))?;
            log::debug!("casting extended JSON argument ({} bytes)", text.len());
            parse_extended_json(text)
        }
        Value::Table(t) => match codec::encode_table(t)? {
            Bson::Array(items) if items.is_empty() => Ok(Bson::Document(Document::new())),
            other => Ok(other),
        },
        _ => Err(Error::type_mismatch("string or table expected")),
    }
}

/// Like [`cast_bson`], but `nil` yields `None` instead of an error.
///
/// Used for optional arguments, where an omitted argument must stay
/// distinguishable from an empty document.
pub fn to_bson(value: &Value<'_>) -> Result<Option<Bson>> {
    match value {
        Value::Nil => Ok(None),
        other => cast_bson(other).map(Some),
    }
}

/// Casts an argument that must be a document (queries, filters, updates).
pub fn cast_document(value: &Value<'_>) -> Result<Document> {
    match cast_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        _ => Err(Error::type_mismatch("document expected, got an array")),
    }
}

/// Casts an optional document argument.
pub fn to_document(value: &Value<'_>) -> Result<Option<Document>> {
    match value {
        Value::Nil => Ok(None),
        other => cast_document(other).map(Some),
    }
}

/// Casts an aggregation pipeline: an array of stage documents, or a single
/// document taken as a one-stage pipeline.
pub fn cast_pipeline(value: &Value<'_>) -> Result<Vec<Document>> {
    match cast_bson(value)? {
        Bson::Document(doc) => Ok(vec![doc]),
        Bson::Array(items) => items.into_iter().map(into_document).collect(),
        _ => Err(Error::type_mismatch("pipeline must be an array of documents")),
    }
}

/// Unwraps an array element that must be a document.
pub(crate) fn into_document(item: Bson) -> Result<Document> {
    match item {
        Bson::Document(doc) => Ok(doc),
        other => Err(Error::type_mismatch(format!(
            "document expected in array, got {:?}",
            other.element_type()
        ))),
    }
}
