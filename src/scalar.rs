//! Scalar handles exposed to Lua scripts.
//!
//! The four document scalar kinds without a native Lua counterpart are wrapped
//! in a single closed enum, [`Scalar`], which is registered as one userdata
//! type. Equality and rendering are plain pattern matches, so a handle of one
//! kind never compares equal to a handle of another kind, and comparing a
//! handle with a non-userdata value (a number, nil) is simply false.
//!
//! ```text
//! ObjectId(hex?)             -> fresh id, or parsed from 24 hex digits
//! DateTime(millis?)          -> milliseconds since the epoch, default 0
//! Timestamp(seconds?, ord?)  -> exactly 0 or 2 arguments, default (0, 0)
//! Null                       -> process-wide singleton
//! ```

use crate::codec::integral;
use crate::{Error, Result};
use bson::oid::ObjectId;
use bson::{Bson, DateTime, Timestamp};
use mlua::{AnyUserData, Lua, MetaMethod, Table, UserData, UserDataMethods, Value, Variadic};
use std::fmt;

/// Registry slot holding the shared `Null` handle.
const NULL_REGISTRY_KEY: &str = "luamongo.null";

/// A document scalar without a native Lua representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    /// 12-byte object identifier.
    ObjectId(ObjectId),
    /// Signed milliseconds since the Unix epoch.
    DateTime(DateTime),
    /// Replication timestamp: seconds and an ordinal within the second.
    Timestamp(Timestamp),
    /// Explicit document null, distinct from Lua nil.
    Null,
}

impl Scalar {
    /// Builds an ObjectId handle.
    ///
    /// `None` (or an empty string) generates a fresh identifier; otherwise the
    /// input must be exactly 24 hexadecimal digits.
    pub fn object_id(hex: Option<&str>) -> Result<Self> {
        match hex {
            None | Some("") => Ok(Scalar::ObjectId(ObjectId::new())),
            Some(hex) => {
                if hex.len() != 24 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(Error::invalid_argument("invalid format"));
                }
                ObjectId::parse_str(hex)
                    .map(Scalar::ObjectId)
                    .map_err(|e| Error::invalid_argument(e.to_string()))
            }
        }
    }

    /// Builds a DateTime handle from milliseconds since the epoch.
    pub fn date_time(millis: i64) -> Self {
        Scalar::DateTime(DateTime::from_millis(millis))
    }

    /// Builds a Timestamp handle.
    pub fn timestamp(time: u32, increment: u32) -> Self {
        Scalar::Timestamp(Timestamp { time, increment })
    }

    /// Name of the handle kind as seen by scripts.
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::ObjectId(_) => "ObjectId",
            Scalar::DateTime(_) => "DateTime",
            Scalar::Timestamp(_) => "Timestamp",
            Scalar::Null => "Null",
        }
    }

    /// Converts the handle into its document value.
    pub fn to_bson(&self) -> Bson {
        match *self {
            Scalar::ObjectId(oid) => Bson::ObjectId(oid),
            Scalar::DateTime(dt) => Bson::DateTime(dt),
            Scalar::Timestamp(ts) => Bson::Timestamp(ts),
            Scalar::Null => Bson::Null,
        }
    }

    /// Returns the handle matching a document scalar, if the value is one of
    /// the four handle kinds.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::ObjectId(oid) => Some(Scalar::ObjectId(*oid)),
            Bson::DateTime(dt) => Some(Scalar::DateTime(*dt)),
            Bson::Timestamp(ts) => Some(Scalar::Timestamp(*ts)),
            Bson::Null => Some(Scalar::Null),
            _ => None,
        }
    }

    /// Pushes the handle into the Lua state. `Null` always yields the shared
    /// singleton.
    pub fn into_lua_value(self, lua: &Lua) -> mlua::Result<Value<'_>> {
        match self {
            Scalar::Null => null_handle(lua).map(Value::UserData),
            other => lua.create_userdata(other).map(Value::UserData),
        }
    }

    fn expect_kind(&self, method: &str, kind: &str) -> Error {
        Error::type_mismatch(format!("{}() expects a {} handle, got {}", method, kind, self.kind()))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
            Scalar::DateTime(dt) => write!(f, "DateTime({})", dt.timestamp_millis()),
            Scalar::Timestamp(ts) => write!(f, "Timestamp({}, {})", ts.time, ts.increment),
            Scalar::Null => write!(f, "null"),
        }
    }
}

impl UserData for Scalar {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        // Lua hands either operand to __eq, so the left one may be a foreign
        // userdata (a client handle, say). That comparison is false, not an error.
        methods.add_meta_function(MetaMethod::Eq, |_, (a, b): (AnyUserData<'lua>, AnyUserData<'lua>)| {
            let (a, b) = match (a.borrow::<Scalar>(), b.borrow::<Scalar>()) {
                (Ok(a), Ok(b)) => (*a, *b),
                _ => return Ok(false),
            };
            Ok(a == b)
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.to_string()));

        methods.add_method("kind", |_, this, ()| Ok(this.kind()));
        methods.add_method("hex", |_, this, ()| match this {
            Scalar::ObjectId(oid) => Ok(oid.to_hex()),
            other => Err(other.expect_kind("hex", "ObjectId").into()),
        });
        methods.add_method("timestamp", |_, this, ()| match this {
            Scalar::ObjectId(oid) => Ok(oid.timestamp().timestamp_millis() / 1000),
            other => Err(other.expect_kind("timestamp", "ObjectId").into()),
        });
        methods.add_method("millis", |_, this, ()| match this {
            Scalar::DateTime(dt) => Ok(dt.timestamp_millis()),
            other => Err(other.expect_kind("millis", "DateTime").into()),
        });
        methods.add_method("time", |_, this, ()| match this {
            Scalar::Timestamp(ts) => Ok(ts.time),
            other => Err(other.expect_kind("time", "Timestamp").into()),
        });
        methods.add_method("increment", |_, this, ()| match this {
            Scalar::Timestamp(ts) => Ok(ts.increment),
            other => Err(other.expect_kind("increment", "Timestamp").into()),
        });
    }
}

/// Returns the shared `Null` handle, creating it on first use.
pub fn null_handle(lua: &Lua) -> mlua::Result<AnyUserData<'_>> {
    if let Value::UserData(ud) = lua.named_registry_value::<Value<'_>>(NULL_REGISTRY_KEY)? {
        return Ok(ud);
    }
    let ud = lua.create_userdata(Scalar::Null)?;
    lua.set_named_registry_value(NULL_REGISTRY_KEY, ud.clone())?;
    Ok(ud)
}

fn new_object_id<'lua>(lua: &'lua Lua, arg: Value<'lua>) -> mlua::Result<Value<'lua>> {
    let scalar = match arg {
        Value::Nil => Scalar::object_id(None)?,
        Value::String(s) => {
            let hex = s.to_str().map_err(|_| Error::invalid_argument("invalid format"))?;
            Scalar::object_id(Some(hex))?
        }
        other => {
            return Err(Error::invalid_argument(format!(
                "ObjectId expects a hex string, got {}",
                other.type_name()
            ))
            .into())
        }
    };
    scalar.into_lua_value(lua)
}

fn new_date_time<'lua>(lua: &'lua Lua, arg: Value<'lua>) -> mlua::Result<Value<'lua>> {
    let millis = match arg {
        Value::Nil => 0,
        other => integral(&other).ok_or_else(|| {
            Error::invalid_argument(format!(
                "DateTime expects integer milliseconds, got {}",
                other.type_name()
            ))
        })?,
    };
    Scalar::date_time(millis).into_lua_value(lua)
}

fn new_timestamp<'lua>(lua: &'lua Lua, args: Variadic<Value<'lua>>) -> mlua::Result<Value<'lua>> {
    let scalar = match args.len() {
        // The server fills in a zero timestamp when the document is written.
        0 => Scalar::timestamp(0, 0),
        2 => Scalar::timestamp(timestamp_part(&args[0])?, timestamp_part(&args[1])?),
        _ => return Err(Error::invalid_argument("Timestamp needs 0 or 2 arguments").into()),
    };
    scalar.into_lua_value(lua)
}

fn timestamp_part(value: &Value<'_>) -> Result<u32> {
    integral(value)
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| Error::invalid_argument("Timestamp arguments must be unsigned 32-bit integers"))
}

/// Registers the scalar constructors and the `Null` singleton in `module`.
pub fn register<'lua>(lua: &'lua Lua, module: &Table<'lua>) -> mlua::Result<()> {
    let object_id = lua.create_function(new_object_id)?;
    module.set("ObjectId", object_id.clone())?;
    module.set("ObjectID", object_id)?;
    module.set("DateTime", lua.create_function(new_date_time)?)?;
    module.set("Timestamp", lua.create_function(new_timestamp)?)?;
    module.set("Null", null_handle(lua)?)?;
    Ok(())
}
