// Property-based tests for the Lua <-> BSON codec.

use bson::Bson;
use luamongo::codec::{self, TableShape};
use mlua::{Lua, Value};
use proptest::prelude::*;

proptest! {
    /// Integral numbers come back as Lua integers equal to the input,
    /// whether they start out as integers or integral floats.
    #[test]
    fn prop_integral_numbers_round_trip(n in any::<i64>(), as_float in any::<bool>()) {
        let lua = Lua::new();
        let value = if as_float && (n as f64) as i64 == n && n.unsigned_abs() < (1u64 << 53) {
            Value::Number(n as f64)
        } else {
            Value::Integer(n)
        };

        let encoded = codec::encode(&value).unwrap().unwrap();
        let decoded = codec::decode(&lua, &encoded).unwrap();
        prop_assert_eq!(decoded, Value::Integer(n));
    }

    /// Small integers encode as Int32, larger ones as Int64.
    #[test]
    fn prop_integer_width(n in any::<i64>()) {
        let encoded = codec::encode(&Value::Integer(n)).unwrap().unwrap();
        match i32::try_from(n) {
            Ok(small) => prop_assert_eq!(encoded, Bson::Int32(small)),
            Err(_) => prop_assert_eq!(encoded, Bson::Int64(n)),
        }
    }

    /// Dense 1..N tables are arrays of length N.
    #[test]
    fn prop_dense_tables_are_arrays(items in prop::collection::vec(any::<i32>(), 1..64)) {
        let lua = Lua::new();
        let table = lua.create_sequence_from(items.clone()).unwrap();

        let encoded = codec::encode_table(&table).unwrap();
        let expected: Vec<Bson> = items.into_iter().map(Bson::Int32).collect();
        prop_assert_eq!(encoded, Bson::Array(expected));
    }

    /// A single string key makes any table a document.
    #[test]
    fn prop_string_key_makes_document(len in 0usize..32, key in "[a-z]{1,8}") {
        let lua = Lua::new();
        let table = lua.create_sequence_from(0..len as i64).unwrap();
        table.set(key.as_str(), true).unwrap();

        let encoded = codec::encode_table(&table).unwrap();
        prop_assert!(matches!(encoded, Bson::Document(ref doc) if doc.len() == len + 1));
    }

    /// Classification agrees with the dense-run definition for arbitrary
    /// integer key sets.
    #[test]
    fn prop_classify_integer_keys(keys in prop::collection::btree_set(-4i64..40, 0..24)) {
        let values: Vec<Value<'_>> = keys.iter().map(|k| Value::Integer(*k)).collect();
        let dense = keys.iter().copied().eq(1..=keys.len() as i64);

        let expected = if dense { TableShape::Array(keys.len()) } else { TableShape::Document };
        prop_assert_eq!(codec::classify(&values), expected);
    }
}
