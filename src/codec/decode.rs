//! BSON -> Lua value decoding.

use super::encode::integral_f64;
use super::structural::to_lua;
use crate::scalar::Scalar;
use crate::Result;
use bson::{Bson, Document};
use mlua::{Lua, Table, Value};

/// Decodes a BSON value into the Lua state.
///
/// Object ids, date-times, timestamps and nulls become [`Scalar`] handles
/// (null is the shared `Null` singleton). Kinds without a direct Lua shape,
/// such as `Decimal128` or regular expressions, are exposed as their relaxed
/// extended JSON structure, e.g. `{ ["$numberDecimal"] = "1.5" }`.
pub fn decode<'lua>(lua: &'lua Lua, value: &Bson) -> Result<Value<'lua>> {
    if let Some(scalar) = Scalar::from_bson(value) {
        return Ok(scalar.into_lua_value(lua)?);
    }
    let decoded = match value {
        Bson::Boolean(b) => Value::Boolean(*b),
        Bson::Int32(i) => Value::Integer(i64::from(*i)),
        Bson::Int64(i) => Value::Integer(*i),
        Bson::Double(f) => lua_number(*f),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(lua.create_string(s)?),
        Bson::Binary(bin) => Value::String(lua.create_string(&bin.bytes)?),
        Bson::Array(items) => Value::Table(decode_array(lua, items)?),
        Bson::Document(doc) => Value::Table(decode_document(lua, doc)?),
        Bson::Undefined => Value::Nil,
        other => to_lua(lua, &other.clone().into_relaxed_extjson())?,
    };
    Ok(decoded)
}

/// Decodes a document into a table keyed by field name.
pub fn decode_document<'lua>(lua: &'lua Lua, doc: &Document) -> Result<Table<'lua>> {
    let table = lua.create_table()?;
    for (key, value) in doc {
        table.raw_set(key.as_str(), decode(lua, value)?)?;
    }
    Ok(table)
}

/// Decodes an array into a 1-indexed table.
pub fn decode_array<'lua>(lua: &'lua Lua, items: &[Bson]) -> Result<Table<'lua>> {
    let table = lua.create_table()?;
    for (i, item) in items.iter().enumerate() {
        table.raw_set(i as i64 + 1, decode(lua, item)?)?;
    }
    Ok(table)
}

/// Decodes a list of documents (a cursor result) into a 1-indexed table.
pub fn decode_documents<'lua>(lua: &'lua Lua, docs: &[Document]) -> Result<Table<'lua>> {
    let table = lua.create_table()?;
    for (i, doc) in docs.iter().enumerate() {
        table.raw_set(i as i64 + 1, decode_document(lua, doc)?)?;
    }
    Ok(table)
}

/// Lua number for a float, folding integral values into the integer subtype.
pub(crate) fn lua_number<'lua>(n: f64) -> Value<'lua> {
    match integral_f64(n) {
        Some(i) => Value::Integer(i),
        None => Value::Number(n),
    }
}
