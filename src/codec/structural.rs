//! Structural encoding of host records into Lua values.
//!
//! Records describe themselves through `serde::Serialize`, usually derived.
//! The derive attributes carry the field-level metadata:
//!
//! | attribute               | effect                                           |
//! |-------------------------|--------------------------------------------------|
//! | `#[serde(rename = "x")]`| field appears under key `x`                      |
//! | `#[serde(flatten)]`     | inner fields are spliced into the parent table   |
//! | `#[serde(skip)]`        | field is omitted                                 |
//!
//! Structs and maps become keyed tables, sequences and tuples become
//! 1-indexed tables, `None` becomes nil. Unit values and every enum variant
//! shape have no table form and fail with `UnsupportedType`.

use super::decode::lua_number;
use crate::{Error, Result};
use mlua::{Lua, Table, Value};
use serde::ser::{self, Impossible, Serialize};

/// Encodes a serializable host record as a Lua value.
///
/// # Example
///
/// ```
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct RemoveResult {
///     #[serde(rename = "nRemoved")]
///     removed: u64,
/// }
///
/// let lua = mlua::Lua::new();
/// let value = luamongo::codec::to_lua(&lua, &RemoveResult { removed: 3 }).unwrap();
/// let table = value.as_table().unwrap();
/// assert_eq!(table.get::<_, i64>("nRemoved").unwrap(), 3);
/// ```
pub fn to_lua<'lua, T: Serialize + ?Sized>(lua: &'lua Lua, value: &T) -> Result<Value<'lua>> {
    value.serialize(Serializer { lua })
}

/// A `serde::Serializer` whose output is a Lua value.
#[derive(Clone, Copy)]
pub struct Serializer<'lua> {
    lua: &'lua Lua,
}

impl<'lua> Serializer<'lua> {
    /// Creates a serializer writing into `lua`.
    pub fn new(lua: &'lua Lua) -> Self {
        Self { lua }
    }
}

fn unsupported<T>(name: impl Into<String>) -> Result<T> {
    Err(Error::UnsupportedType(name.into()))
}

impl<'lua> ser::Serializer for Serializer<'lua> {
    type Ok = Value<'lua>;
    type Error = Error;

    type SerializeSeq = SeqEncoder<'lua>;
    type SerializeTuple = SeqEncoder<'lua>;
    type SerializeTupleStruct = SeqEncoder<'lua>;
    type SerializeTupleVariant = Impossible<Value<'lua>, Error>;
    type SerializeMap = MapEncoder<'lua>;
    type SerializeStruct = MapEncoder<'lua>;
    type SerializeStructVariant = Impossible<Value<'lua>, Error>;

    fn serialize_bool(self, v: bool) -> Result<Value<'lua>> {
        Ok(Value::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value<'lua>> {
        Ok(Value::Integer(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value<'lua>> {
        Ok(Value::Integer(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value<'lua>> {
        Ok(Value::Integer(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value<'lua>> {
        Ok(Value::Integer(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value<'lua>> {
        Ok(Value::Integer(i64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value<'lua>> {
        Ok(Value::Integer(i64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value<'lua>> {
        Ok(Value::Integer(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value<'lua>> {
        Ok(match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Number(v as f64),
        })
    }

    fn serialize_f32(self, v: f32) -> Result<Value<'lua>> {
        Ok(lua_number(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value<'lua>> {
        Ok(lua_number(v))
    }

    fn serialize_char(self, v: char) -> Result<Value<'lua>> {
        let mut buf = [0u8; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<Value<'lua>> {
        Ok(Value::String(self.lua.create_string(v)?))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value<'lua>> {
        Ok(Value::String(self.lua.create_string(v)?))
    }

    fn serialize_none(self) -> Result<Value<'lua>> {
        Ok(Value::Nil)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value<'lua>> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value<'lua>> {
        unsupported("()")
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Value<'lua>> {
        unsupported(name)
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value<'lua>> {
        unsupported(format!("{}::{}", name, variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value<'lua>> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Value<'lua>> {
        unsupported(format!("{}::{}", name, variant))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<SeqEncoder<'lua>> {
        Ok(SeqEncoder { lua: self.lua, table: self.lua.create_table()?, next: 1 })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqEncoder<'lua>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqEncoder<'lua>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        unsupported(format!("{}::{}", name, variant))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapEncoder<'lua>> {
        Ok(MapEncoder { lua: self.lua, table: self.lua.create_table()?, key: None })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapEncoder<'lua>> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        unsupported(format!("{}::{}", name, variant))
    }
}

/// Builds a 1-indexed table from sequence elements.
pub struct SeqEncoder<'lua> {
    lua: &'lua Lua,
    table: Table<'lua>,
    next: i64,
}

impl<'lua> SeqEncoder<'lua> {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let value = value.serialize(Serializer { lua: self.lua })?;
        self.table.raw_set(self.next, value)?;
        self.next += 1;
        Ok(())
    }
}

impl<'lua> ser::SerializeSeq for SeqEncoder<'lua> {
    type Ok = Value<'lua>;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value<'lua>> {
        Ok(Value::Table(self.table))
    }
}

impl<'lua> ser::SerializeTuple for SeqEncoder<'lua> {
    type Ok = Value<'lua>;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value<'lua>> {
        Ok(Value::Table(self.table))
    }
}

impl<'lua> ser::SerializeTupleStruct for SeqEncoder<'lua> {
    type Ok = Value<'lua>;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value<'lua>> {
        Ok(Value::Table(self.table))
    }
}

/// Builds a keyed table from map entries or struct fields.
pub struct MapEncoder<'lua> {
    lua: &'lua Lua,
    table: Table<'lua>,
    key: Option<Value<'lua>>,
}

impl<'lua> ser::SerializeMap for MapEncoder<'lua> {
    type Ok = Value<'lua>;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        let key = key.serialize(Serializer { lua: self.lua })?;
        if key.is_nil() {
            return unsupported("nil map key");
        }
        self.key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = match self.key.take() {
            Some(key) => key,
            None => return unsupported("map value without a key"),
        };
        let value = value.serialize(Serializer { lua: self.lua })?;
        self.table.raw_set(key, value)?;
        Ok(())
    }

    fn end(self) -> Result<Value<'lua>> {
        Ok(Value::Table(self.table))
    }
}

impl<'lua> ser::SerializeStruct for MapEncoder<'lua> {
    type Ok = Value<'lua>;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        let value = value.serialize(Serializer { lua: self.lua })?;
        self.table.raw_set(key, value)?;
        Ok(())
    }

    fn end(self) -> Result<Value<'lua>> {
        Ok(Value::Table(self.table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Audit {
        #[serde(rename = "createdBy")]
        created_by: String,
        revision: u32,
    }

    #[derive(Serialize)]
    struct Record {
        name: String,
        #[serde(rename = "nItems")]
        items: Vec<u8>,
        #[serde(flatten)]
        audit: Audit,
        #[serde(skip)]
        #[allow(dead_code)]
        secret: String,
        note: Option<String>,
        parent: Option<Box<Record>>,
    }

    #[derive(Serialize)]
    enum Shape {
        Circle(f64),
    }

    #[derive(Serialize)]
    struct Marker;

    fn record() -> Record {
        Record {
            name: "root".into(),
            items: vec![1, 2, 3],
            audit: Audit { created_by: "ops".into(), revision: 4 },
            secret: "hidden".into(),
            note: None,
            parent: Some(Box::new(Record {
                name: "parent".into(),
                items: vec![],
                audit: Audit { created_by: "sys".into(), revision: 1 },
                secret: String::new(),
                note: Some("top".into()),
                parent: None,
            })),
        }
    }

    #[test]
    fn test_struct_with_field_attributes() {
        let lua = Lua::new();
        let value = to_lua(&lua, &record()).unwrap();
        lua.globals().set("r", value).unwrap();

        let (name, count, created_by, revision): (String, i64, String, i64) = lua
            .load("return r.name, #r.nItems, r.createdBy, r.revision")
            .eval()
            .unwrap();
        assert_eq!(name, "root");
        assert_eq!(count, 3);
        assert_eq!(created_by, "ops");
        assert_eq!(revision, 4);

        let (secret_absent, audit_absent, note_nil): (bool, bool, bool) = lua
            .load("return r.secret == nil, r.audit == nil, r.note == nil")
            .eval()
            .unwrap();
        assert!(secret_absent);
        assert!(audit_absent);
        assert!(note_nil);

        let parent_note: String = lua.load("return r.parent.note").eval().unwrap();
        assert_eq!(parent_note, "top");
    }

    #[test]
    fn test_sequence_is_one_indexed() {
        let lua = Lua::new();
        let value = to_lua(&lua, &vec!["admin", "local"]).unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.raw_len(), 2);
        assert_eq!(table.get::<_, String>(1).unwrap(), "admin");
        assert_eq!(table.get::<_, String>(2).unwrap(), "local");
    }

    #[test]
    fn test_map_entries() {
        let lua = Lua::new();
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), 1.5f64);
        map.insert("y".to_string(), 2.0f64);
        let value = to_lua(&lua, &map).unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.get::<_, f64>("x").unwrap(), 1.5);
        assert!(matches!(table.get::<_, Value<'_>>("y").unwrap(), Value::Integer(2)));
    }

    #[test]
    fn test_none_is_nil() {
        let lua = Lua::new();
        let value = to_lua(&lua, &Option::<u8>::None).unwrap();
        assert!(value.is_nil());
        let value = to_lua(&lua, &Some(7u8)).unwrap();
        assert!(matches!(value, Value::Integer(7)));
    }

    #[test]
    fn test_unsupported_shapes_name_the_type() {
        let lua = Lua::new();
        match to_lua(&lua, &Shape::Circle(1.0)) {
            Err(Error::UnsupportedType(name)) => assert_eq!(name, "Shape::Circle"),
            other => panic!("expected UnsupportedType, got {:?}", other.map(|_| ())),
        }
        match to_lua(&lua, &Marker) {
            Err(Error::UnsupportedType(name)) => assert_eq!(name, "Marker"),
            other => panic!("expected UnsupportedType, got {:?}", other.map(|_| ())),
        }
        assert!(to_lua(&lua, &()).unwrap_err().is_fatal());
    }

    #[test]
    fn test_large_unsigned_falls_back_to_float() {
        let lua = Lua::new();
        let value = to_lua(&lua, &u64::MAX).unwrap();
        assert!(matches!(value, Value::Number(_)));
    }
}
