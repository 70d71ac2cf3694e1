// Tests of the standalone `bson` module and the codec seen from scripts.

use bson::{doc, Bson};
use luamongo::backend::MemoryConnector;
use luamongo::{cast, codec, preload_with, Error, Options};
use mlua::{Lua, Table, Value};
use std::sync::Arc;

fn setup() -> Lua {
    let lua = Lua::new();
    preload_with(&lua, Arc::new(MemoryConnector::new()), Options::default()).unwrap();
    lua
}

/// Test handle equality is reflexive, symmetric and kind-exclusive
#[test]
fn test_handle_equality() {
    let lua = setup();

    let checks: Table<'_> = lua
        .load(
            r#"
            local bson = require 'bson'
            local hex = '6092e50e4ed1be4939967323'
            local a, b = bson.ObjectId(hex), bson.ObjectID(hex)
            return {
                a == b,
                b == a,
                a == a,
                bson.DateTime(0) ~= bson.Timestamp(0, 0),
                bson.DateTime(5) == bson.DateTime(5),
                bson.Null == require('mongo').Null,
                bson.ObjectId() ~= bson.ObjectId(),
                tostring(a) == hex,
                tostring(bson.Timestamp()) == 'Timestamp(0, 0)',
            }
            "#,
        )
        .eval()
        .unwrap();

    let checks: Vec<bool> = checks.sequence_values().collect::<mlua::Result<_>>().unwrap();
    assert_eq!(checks.len(), 9);
    assert!(checks.iter().all(|c| *c), "{:?}", checks);
}

/// Test constructor argument errors surface their messages
#[test]
fn test_constructor_errors() {
    let lua = setup();

    let (arity, format): (String, String) = lua
        .load(
            r#"
            local bson = require 'bson'
            local _, arity = pcall(bson.Timestamp, 5)
            local _, format = pcall(bson.ObjectId, 'xyz')
            return tostring(arity), tostring(format)
            "#,
        )
        .eval()
        .unwrap();

    assert!(arity.contains("Timestamp needs 0 or 2 arguments"), "{}", arity);
    assert!(format.contains("invalid format"), "{}", format);
}

/// Test a document-like table round trips through the codec
#[test]
fn test_table_round_trip() {
    let lua = Lua::new();
    let table: Value<'_> = lua.load("return { a = 1, b = 2 }").eval().unwrap();

    let encoded = codec::encode(&table).unwrap().unwrap();
    assert_eq!(encoded.as_document().unwrap().len(), 2);

    let decoded = codec::decode(&lua, &encoded).unwrap();
    let decoded = decoded.as_table().unwrap();
    assert_eq!(decoded.get::<_, Value<'_>>("a").unwrap(), Value::Integer(1));
    assert_eq!(decoded.get::<_, Value<'_>>("b").unwrap(), Value::Integer(2));
}

/// Test the empty table is an array to the codec but a document to the caster
#[test]
fn test_empty_table_asymmetry() {
    let lua = Lua::new();
    let empty: Value<'_> = lua.load("return {}").eval().unwrap();

    assert_eq!(codec::encode(&empty).unwrap(), Some(Bson::Array(vec![])));
    assert_eq!(cast::cast_bson(&empty).unwrap(), Bson::Document(bson::Document::new()));
}

/// Test extended JSON casting examples
#[test]
fn test_extended_json_casting() {
    assert_eq!(
        cast::parse_extended_json(r#"{"a": 1, "b": 2}"#).unwrap(),
        Bson::Document(doc! { "a": 1i32, "b": 2i32 })
    );
    assert_eq!(
        cast::parse_extended_json(r#"["a", 1]"#).unwrap(),
        Bson::Array(vec![Bson::String("a".to_string()), Bson::Int32(1)])
    );
    assert!(matches!(cast::parse_extended_json(""), Err(Error::InvalidBson(_))));
}

/// Test decoded documents keep scalar handles usable from Lua
#[test]
fn test_decoded_handles_in_scripts() {
    let lua = setup();
    let doc = cast::parse_extended_json(
        r#"{"_id": {"$oid": "6092e50e4ed1be4939967323"}, "at": {"$date": {"$numberLong": "86400000"}}, "n": null}"#,
    )
    .unwrap();
    let decoded = codec::decode(&lua, &doc).unwrap();
    lua.globals().set("doc", decoded).unwrap();

    let (hex, millis, is_null): (String, i64, bool) = lua
        .load(
            r#"
            local bson = require 'bson'
            return doc._id:hex(), doc.at:millis(), doc.n == bson.Null
            "#,
        )
        .eval()
        .unwrap();

    assert_eq!(hex, "6092e50e4ed1be4939967323");
    assert_eq!(millis, 86_400_000);
    assert!(is_null);
}

/// Test host records encode through the structural encoder
#[test]
fn test_structural_encoder_from_host() {
    use serde::Serialize;

    #[derive(Serialize)]
    struct Audit {
        actor: String,
        #[serde(skip)]
        _secret: String,
    }

    #[derive(Serialize)]
    struct Event {
        #[serde(rename = "eventName")]
        name: String,
        #[serde(flatten)]
        audit: Audit,
        tags: Vec<String>,
        parent: Option<u32>,
    }

    let lua = Lua::new();
    let event = Event {
        name: "login".to_string(),
        audit: Audit { actor: "ann".to_string(), _secret: "x".to_string() },
        tags: vec!["web".to_string()],
        parent: None,
    };
    let value = codec::to_lua(&lua, &event).unwrap();
    let table = value.as_table().unwrap();

    assert_eq!(table.get::<_, String>("eventName").unwrap(), "login");
    assert_eq!(table.get::<_, String>("actor").unwrap(), "ann");
    assert!(table.get::<_, Value<'_>>("_secret").unwrap().is_nil());
    assert!(table.get::<_, Value<'_>>("parent").unwrap().is_nil());
    assert_eq!(table.get::<_, Table<'_>>("tags").unwrap().get::<_, String>(1).unwrap(), "web");
}
