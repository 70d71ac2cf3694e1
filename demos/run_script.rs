//! Runs a Lua script with the `mongo` and `bson` modules preloaded.
//!
//! ```text
//! cargo run --example run_script -- script.lua
//! cargo run --example run_script -- --memory script.lua
//! cargo run --example run_script              # built-in demo, in-memory
//! ```
//!
//! With `--memory` (or without a script) clients connect to an in-process
//! store through `memory://` URIs instead of a MongoDB server.

use anyhow::Context;
use luamongo::backend::{Connector, MemoryConnector};
use luamongo::{preload_with, Options};
use mlua::Lua;
use std::sync::Arc;

const DEMO: &str = r#"
local mongo = require 'mongo'

local client = mongo.Client()
assert(client:connect('memory://demo'))

local users = client:getCollection('app', 'users')
print('inserted', users:insert({
    { name = 'ann', age = 31, joined = mongo.DateTime(1700000000000) },
    { name = 'bob', age = 25 },
}).nInserted)

local res = users:update({ name = 'bob' }, { ['$inc'] = { age = 1 } })
print('matched', res.nMatched, 'modified', res.nModified)

for _, user in ipairs(users:find({}, { sort = { age = -1 } })) do
    print(user._id, user.name, user.age, user.joined)
end

local nobody, err = users:findOne({ name = 'nobody' })
print('findOne miss', nobody, err)

print('disconnect', client:disconnect())
"#;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let memory = match args.iter().position(|a| a == "--memory") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    let (name, source) = match args.first() {
        Some(path) => {
            let source = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
            (path.clone(), source)
        }
        None => ("demo".to_string(), DEMO.to_string()),
    };

    let connector: Arc<dyn Connector> = if memory || args.is_empty() {
        Arc::new(MemoryConnector::new())
    } else {
        default_connector()
    };

    let lua = Lua::new();
    preload_with(&lua, connector, Options::default()).context("failed to register Lua modules")?;
    lua.load(source.as_str())
        .set_name(name.as_str())
        .exec()
        .with_context(|| format!("script {} failed", name))?;

    Ok(())
}

#[cfg(feature = "mongodb")]
fn default_connector() -> Arc<dyn Connector> {
    Arc::new(luamongo::backend::MongoConnector)
}

#[cfg(not(feature = "mongodb"))]
fn default_connector() -> Arc<dyn Connector> {
    Arc::new(MemoryConnector::new())
}
