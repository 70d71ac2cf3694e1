//! # luamongo - MongoDB bindings for embedded Lua
//!
//! luamongo exposes a document database to Lua 5.4 scripts running inside a
//! Rust host. Scripts see plain tables and a handful of scalar handles; the
//! host sees `bson` documents.
//!
//! ## Architecture
//!
//! - **Scalar**: `ObjectId`, `DateTime`, `Timestamp` and `Null` handles
//! - **Codec**: Lua values to BSON and back, plus a serde-based encoder for
//!   host records
//! - **Cast**: turns script arguments (tables or extended JSON) into documents
//! - **Backend**: the async database capability, MongoDB or in-memory
//! - **Facade**: the `mongo` and `bson` Lua modules
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # fn main() -> Result<(), luamongo::Error> {
//! let lua = mlua::Lua::new();
//! luamongo::preload(&lua)?;
//!
//! lua.load(r#"
//!     local mongo = require 'mongo'
//!     local client = mongo.Client()
//!     local ok, err = client:connect('mongodb://localhost:27017/admin')
//!     if not ok then error(err) end
//!
//!     local users = client:getCollection('app', 'users')
//!     users:insert({ name = 'ann', created = mongo.DateTime(1700000000000) })
//!
//!     local res, err = users:update({ name = 'ann' }, { ['$set'] = { admin = true } })
//!     print(res.nMatched, res.nModified)
//!
//!     client:disconnect()
//! "#).exec()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod backend;
pub mod cast;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod scalar;

// Re-exports
pub use config::Options;
pub use error::{Error, Result};
pub use facade::{create_bson_module, preload, preload_with};
pub use scalar::Scalar;
