//! Two-way conversion between Lua values and BSON values.
//!
//! The codec is split in three parts:
//!
//! - [`encode`]: Lua value -> BSON. Tables are classified as arrays or
//!   documents by their keys (see [`classify`]).
//! - [`decode`]: BSON -> Lua value. Domain scalars come back as
//!   [`Scalar`](crate::scalar::Scalar) handles, never as bare numbers.
//! - [`structural`]: any `serde::Serialize` host record -> Lua value, used for
//!   operation results that are not already documents.
//!
//! # Numbers
//!
//! Lua 5.4 distinguishes integer and float subtypes, the document model does
//! not need to. A number with no fractional part always travels as an integer
//! (`Int32` when it fits, `Int64` otherwise), and an integral `Double` read back
//! from the database becomes a Lua integer, so integers never pick up a
//! decimal point on a round trip.

pub mod decode;
pub mod encode;
pub mod structural;

pub use decode::{decode, decode_array, decode_document, decode_documents};
pub use encode::{classify, encode, encode_table, integral, TableShape};
pub use structural::to_lua;
