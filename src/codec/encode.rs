//! Lua value -> BSON encoding.

use crate::scalar::Scalar;
use crate::{Error, Result};
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use mlua::{AnyUserData, Table, Value};

/// Nesting limit for tables; deeper structures are almost always cycles.
const MAX_DEPTH: usize = 128;

/// How a Lua table maps onto the document model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableShape {
    /// Keys form the dense run `1..=len`.
    Array(usize),
    /// Any other key set.
    Document,
}

/// Classifies a table by its keys.
///
/// A table is array-like iff every key is a positive integer and the keys
/// cover `1..=N` exactly, where `N` is the number of entries. A single key of
/// any other kind makes the whole table document-like. An empty key set is
/// the (vacuously dense) empty array.
pub fn classify(keys: &[Value<'_>]) -> TableShape {
    let len = keys.len();
    let dense = keys.iter().all(|key| match integral(key) {
        Some(i) => i >= 1 && (i as u64) <= len as u64,
        None => false,
    });
    if dense {
        TableShape::Array(len)
    } else {
        TableShape::Document
    }
}

/// Returns the integer value of a Lua number without a fractional part.
pub fn integral(value: &Value<'_>) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Number(n) => integral_f64(*n),
        _ => None,
    }
}

pub(crate) fn integral_f64(n: f64) -> Option<i64> {
    // i64::MAX is not representable as f64, so the upper bound is exclusive.
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < -(i64::MIN as f64) {
        Some(n as i64)
    } else {
        None
    }
}

/// Encodes a Lua value.
///
/// `nil` encodes to `None`; the caller decides whether that means "omit the
/// field" or an explicit null.
///
/// # Errors
///
/// - `UnknownHandleKind` for userdata that is not a scalar handle
/// - `UnsupportedType` for functions, threads and light userdata
/// - `TypeMismatch` for table keys that cannot become document keys
pub fn encode(value: &Value<'_>) -> Result<Option<Bson>> {
    encode_at(value, 0)
}

/// Encodes a table as an `Array` or a `Document` according to [`classify`].
///
/// An empty table becomes an empty `Array`; the casting layer turns that into
/// an empty document for operation arguments.
pub fn encode_table(table: &Table<'_>) -> Result<Bson> {
    encode_table_at(table, 0)
}

fn encode_at(value: &Value<'_>, depth: usize) -> Result<Option<Bson>> {
    let bson = match value {
        Value::Nil => return Ok(None),
        Value::Boolean(b) => Bson::Boolean(*b),
        Value::Integer(i) => integer(*i),
        Value::Number(n) => match integral_f64(*n) {
            Some(i) => integer(i),
            None => Bson::Double(*n),
        },
        Value::String(s) => match s.to_str() {
            Ok(text) => Bson::String(text.to_owned()),
            Err(_) => Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: s.as_bytes().to_vec() }),
        },
        Value::Table(t) => encode_table_at(t, depth)?,
        Value::UserData(ud) => encode_handle(ud)?,
        other => return Err(Error::UnsupportedType(other.type_name().to_string())),
    };
    Ok(Some(bson))
}

fn integer(i: i64) -> Bson {
    match i32::try_from(i) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(i),
    }
}

fn encode_handle(ud: &AnyUserData<'_>) -> Result<Bson> {
    match ud.borrow::<Scalar>() {
        Ok(scalar) => Ok(scalar.to_bson()),
        Err(_) => Err(Error::UnknownHandleKind("userdata is not a BSON scalar handle".to_string())),
    }
}

fn encode_table_at(table: &Table<'_>, depth: usize) -> Result<Bson> {
    if depth >= MAX_DEPTH {
        return Err(Error::type_mismatch("table nesting too deep (cyclic table?)"));
    }

    let mut keys = Vec::new();
    let mut values = Vec::new();
    for pair in table.clone().pairs::<Value<'_>, Value<'_>>() {
        let (key, value) = pair?;
        keys.push(key);
        values.push(value);
    }

    match classify(&keys) {
        TableShape::Array(len) => {
            let mut items = vec![Bson::Null; len];
            for (key, value) in keys.iter().zip(values.iter()) {
                // classify() guarantees 1 <= key <= len.
                let index = integral(key).unwrap_or(1) as usize - 1;
                items[index] = encode_element(value, depth)?;
            }
            Ok(Bson::Array(items))
        }
        TableShape::Document => {
            let mut doc = Document::new();
            for (key, value) in keys.iter().zip(values.iter()) {
                let key = document_key(key)?;
                if doc.contains_key(&key) {
                    return Err(Error::type_mismatch(format!("duplicate document key {:?}", key)));
                }
                doc.insert(key, encode_element(value, depth)?);
            }
            Ok(Bson::Document(doc))
        }
    }
}

fn encode_element(value: &Value<'_>, depth: usize) -> Result<Bson> {
    // pairs() never yields nil values.
    Ok(encode_at(value, depth + 1)?.unwrap_or(Bson::Null))
}

fn document_key(key: &Value<'_>) -> Result<String> {
    match key {
        Value::String(s) => s
            .to_str()
            .map(str::to_owned)
            .map_err(|_| Error::type_mismatch("document keys must be valid UTF-8")),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(match integral_f64(*n) {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        other => Err(Error::type_mismatch(format!("unsupported table key type: {}", other.type_name()))),
    }
}
