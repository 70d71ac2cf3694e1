//! In-process document store implementing [`Backend`].
//!
//! `MemoryBackend` keeps databases in memory behind a `parking_lot::RwLock`.
//! It understands the subset of the query language scripts use most:
//!
//! - filters: equality (numbers compare across Int32/Int64/Double), dotted
//!   paths, `$and`, `$or`, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//!   `$nin`, `$exists`
//! - updates: `$set`, `$unset`, `$inc` or a replacement document
//! - aggregation stages: `$match`, `$sort`, `$skip`, `$limit`, `$project`,
//!   `$count`
//!
//! Anything else is reported as an operation failure, the same way a server
//! rejects an unknown operator.

use super::{
    Backend, Connector, CountOptions, FindOneOptions, FindOptions, Namespace, UpdateOptions, UpdateOutcome,
    UpdateSpec,
};
use crate::{Error, Result};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

/// URI scheme accepted by [`MemoryConnector`].
pub const MEMORY_SCHEME: &str = "memory://";

type Collections = BTreeMap<String, Vec<Document>>;

/// Hands out one shared [`MemoryBackend`] per `memory://` URI, so a client
/// that reconnects sees the data it wrote before.
#[derive(Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<String, Arc<MemoryBackend>>>,
    latency: Option<Duration>,
}

impl MemoryConnector {
    /// Creates a connector with no artificial latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector whose backends delay every operation by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self { stores: Mutex::new(HashMap::new()), latency: Some(latency) }
    }

    /// Returns the backend behind `uri`, creating it if needed.
    pub fn backend(&self, uri: &str) -> Arc<MemoryBackend> {
        let mut stores = self.stores.lock();
        let latency = self.latency;
        Arc::clone(stores.entry(uri.to_string()).or_insert_with(|| {
            let mut backend = MemoryBackend::new();
            backend.latency = latency;
            Arc::new(backend)
        }))
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn Backend>> {
        if !uri.starts_with(MEMORY_SCHEME) {
            return Err(Error::operation(format!("memory backend cannot connect to {:?}", uri)));
        }
        let backend: Arc<dyn Backend> = self.backend(uri);
        Ok(backend)
    }
}

/// An in-memory document database.
#[derive(Default)]
pub struct MemoryBackend {
    databases: RwLock<BTreeMap<String, Collections>>,
    latency: Option<Duration>,
    fail_shutdown: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `shutdown` call report a failure.
    pub fn fail_next_shutdown(&self) {
        self.fail_shutdown.store(true, AtomicOrdering::SeqCst);
    }

    /// Returns a snapshot of a collection's documents.
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.databases
            .read()
            .get(&ns.database)
            .and_then(|colls| colls.get(&ns.collection))
            .cloned()
            .unwrap_or_default()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn read<R>(&self, ns: &Namespace, f: impl FnOnce(&[Document]) -> R) -> R {
        let databases = self.databases.read();
        let docs = databases.get(&ns.database).and_then(|colls| colls.get(&ns.collection));
        f(docs.map(Vec::as_slice).unwrap_or(&[]))
    }

    fn write<R>(&self, ns: &Namespace, f: impl FnOnce(&mut Vec<Document>) -> R) -> R {
        let mut databases = self.databases.write();
        let docs = databases
            .entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default();
        f(docs)
    }

    fn query(&self, ns: &Namespace, filter: &Document, options: &FindOptions) -> Result<Vec<Document>> {
        let mut docs = self.read(ns, |docs| -> Result<Vec<Document>> {
            let mut out = Vec::new();
            for doc in docs {
                if matches(doc, filter)? {
                    out.push(doc.clone());
                }
            }
            Ok(out)
        })?;

        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit.map(i64::unsigned_abs) {
            Some(0) | None => usize::MAX,
            Some(n) => n as usize,
        };
        let docs = docs.into_iter().skip(skip).take(limit);
        Ok(match &options.projection {
            Some(projection) => docs.map(|d| project(&d, projection)).collect(),
            None => docs.collect(),
        })
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list_database_names(&self, filter: Option<Document>) -> Result<Vec<String>> {
        self.delay().await;
        let names: Vec<String> = self
            .databases
            .read()
            .iter()
            .filter(|(_, colls)| !colls.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        filter_names(names, filter.as_ref())
    }

    async fn list_collection_names(&self, database: &str, filter: Option<Document>) -> Result<Vec<String>> {
        self.delay().await;
        let names: Vec<String> = self
            .databases
            .read()
            .get(database)
            .map(|colls| colls.keys().cloned().collect())
            .unwrap_or_default();
        filter_names(names, filter.as_ref())
    }

    async fn find(&self, ns: &Namespace, filter: Document, options: FindOptions) -> Result<Vec<Document>> {
        self.delay().await;
        let docs = self.query(ns, &filter, &options)?;
        log::debug!("memory find on {} returned {} documents", ns, docs.len());
        Ok(docs)
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOneOptions,
    ) -> Result<Option<Document>> {
        self.delay().await;
        let options = FindOptions {
            projection: options.projection,
            sort: options.sort,
            skip: options.skip,
            limit: Some(1),
        };
        Ok(self.query(ns, &filter, &options)?.into_iter().next())
    }

    async fn insert_one(&self, ns: &Namespace, doc: Document) -> Result<()> {
        self.insert_many(ns, vec![doc]).await.map(|_| ())
    }

    async fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<u64> {
        self.delay().await;
        let docs: Vec<Document> = docs.into_iter().map(with_id).collect();
        self.write(ns, |stored| {
            for (i, doc) in docs.iter().enumerate() {
                let id = doc.get("_id");
                let taken = stored.iter().chain(&docs[..i]).any(|d| d.get("_id") == id);
                if taken {
                    return Err(Error::operation(format!(
                        "E11000 duplicate key error collection: {} dup key: {{ _id: {} }}",
                        ns,
                        id.map(|v| v.to_string()).unwrap_or_default()
                    )));
                }
            }
            let count = docs.len() as u64;
            stored.extend(docs);
            Ok(count)
        })
    }

    async fn update(
        &self,
        ns: &Namespace,
        query: Document,
        update: UpdateSpec,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        self.delay().await;
        let update = match update {
            UpdateSpec::Document(doc) => doc,
            UpdateSpec::Pipeline(_) => {
                return Err(Error::operation("pipeline updates are not supported by the memory backend"))
            }
        };
        if options.multi && !is_operator_document(&update) {
            return Err(Error::operation("multi update requires update operators"));
        }

        self.write(ns, |stored| {
            let mut outcome = UpdateOutcome::default();
            for doc in stored.iter_mut() {
                if !matches(doc, &query)? {
                    continue;
                }
                outcome.matched += 1;
                if apply_update(doc, &update)? {
                    outcome.modified += 1;
                }
                if !options.multi {
                    break;
                }
            }

            if outcome.matched == 0 && options.upsert {
                let mut doc = seed_from_filter(&query);
                apply_update(&mut doc, &update)?;
                stored.push(with_id(doc));
                outcome.upserted = 1;
            }
            Ok(outcome)
        })
    }

    async fn remove(&self, ns: &Namespace, query: Document, just_one: bool) -> Result<u64> {
        self.delay().await;
        self.write(ns, |stored| {
            let mut kept = Vec::with_capacity(stored.len());
            let mut removed = 0u64;
            for doc in stored.iter() {
                if (!just_one || removed == 0) && matches(doc, &query)? {
                    removed += 1;
                } else {
                    kept.push(doc.clone());
                }
            }
            *stored = kept;
            Ok(removed)
        })
    }

    async fn count(&self, ns: &Namespace, filter: Document, options: CountOptions) -> Result<u64> {
        self.delay().await;
        let matched = self.query(ns, &filter, &FindOptions::default())?.len() as u64;
        let after_skip = matched.saturating_sub(options.skip.unwrap_or(0));
        Ok(match options.limit {
            Some(limit) if limit > 0 => after_skip.min(limit),
            _ => after_skip,
        })
    }

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.delay().await;
        let mut docs = self.read(ns, <[Document]>::to_vec);
        for stage in &pipeline {
            docs = run_stage(docs, stage)?;
        }
        Ok(docs)
    }

    async fn shutdown(&self) -> Result<()> {
        if self.fail_shutdown.swap(false, AtomicOrdering::SeqCst) {
            return Err(Error::operation("memory backend shutdown failed"));
        }
        Ok(())
    }
}

fn filter_names(names: Vec<String>, filter: Option<&Document>) -> Result<Vec<String>> {
    let Some(filter) = filter else { return Ok(names) };
    let mut out = Vec::new();
    for name in names {
        if matches(&doc! { "name": name.as_str() }, filter)? {
            out.push(name);
        }
    }
    Ok(out)
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut out = doc! { "_id": ObjectId::new() };
    out.extend(doc);
    out
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().map_or(false, |k| k.starts_with('$'))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => Some((x.time, x.increment).cmp(&(y.time, y.increment))),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Resolves a dotted path such as `user.tags.0`.
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Equality with array semantics: a field holding an array matches a scalar
/// target when any element does. A missing field matches `null`.
fn field_equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

fn ordered(value: Option<&Bson>, target: &Bson, accept: fn(Ordering) -> bool) -> bool {
    value.and_then(|v| compare(v, target)).map_or(false, accept)
}

/// Returns whether `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" | "$or" => {
                let clauses = condition
                    .as_array()
                    .ok_or_else(|| Error::operation(format!("{} must be an array", key)))?;
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let clause = clause
                        .as_document()
                        .ok_or_else(|| Error::operation(format!("{} entries must be documents", key)))?;
                    results.push(matches(doc, clause)?);
                }
                if key == "$and" {
                    results.iter().all(|r| *r)
                } else {
                    results.iter().any(|r| *r)
                }
            }
            op if op.starts_with('$') => {
                return Err(Error::operation(format!("unknown top level operator: {}", op)));
            }
            path => matches_condition(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let ops = match condition {
        Bson::Document(ops) if is_operator_document(ops) => ops,
        target => return Ok(field_equals(value, target)),
    };

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => field_equals(value, arg),
            "$ne" => !field_equals(value, arg),
            "$gt" => ordered(value, arg, Ordering::is_gt),
            "$gte" => ordered(value, arg, Ordering::is_ge),
            "$lt" => ordered(value, arg, Ordering::is_lt),
            "$lte" => ordered(value, arg, Ordering::is_le),
            "$in" | "$nin" => {
                let candidates = arg
                    .as_array()
                    .ok_or_else(|| Error::operation(format!("{} needs an array", op)))?;
                let found = candidates.iter().any(|c| field_equals(value, c));
                if op == "$in" {
                    found
                } else {
                    !found
                }
            }
            "$exists" => value.is_some() == truthy(arg),
            other => return Err(Error::operation(format!("unknown operator: {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn add_numbers(current: &Bson, delta: &Bson) -> Result<Bson> {
    let sum = match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(s) => Bson::Int32(s),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let (a, b) = (as_i64(current), as_i64(delta));
            let sum = a.zip(b).and_then(|(a, b)| a.checked_add(b)).ok_or_else(|| {
                Error::operation(format!("$inc overflows a 64-bit integer: {} + {}", current, delta))
            })?;
            Bson::Int64(sum)
        }
        _ => match (as_f64(current), as_f64(delta)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(Error::operation("cannot apply $inc to a non-numeric value")),
        },
    };
    Ok(sum)
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Applies an update document; returns whether the document changed.
///
/// Nothing is written unless the whole update applies.
fn apply_update(doc: &mut Document, update: &Document) -> Result<bool> {
    if !is_operator_document(update) {
        let mut replacement = Document::new();
        if let Some(id) = doc.get("_id") {
            replacement.insert("_id", id.clone());
        }
        for (key, value) in update {
            if key != "_id" {
                replacement.insert(key.clone(), value.clone());
            }
        }
        let changed = replacement != *doc;
        *doc = replacement;
        return Ok(changed);
    }

    let mut modifiers = Vec::with_capacity(update.len());
    for (op, fields) in update {
        if !matches!(op.as_str(), "$set" | "$unset" | "$inc") {
            return Err(Error::operation(format!("unknown modifier: {}", op)));
        }
        let fields = fields
            .as_document()
            .ok_or_else(|| Error::operation(format!("modifier {} expects a document", op)))?;
        modifiers.push((op.as_str(), fields));
    }

    let mut next = doc.clone();
    for (op, fields) in modifiers {
        for (path, value) in fields {
            match op {
                "$set" => set_path(&mut next, path, value.clone()),
                "$unset" => unset_path(&mut next, path),
                _ => {
                    let sum = match lookup(&next, path) {
                        Some(current) => add_numbers(current, value)?,
                        None => value.clone(),
                    };
                    set_path(&mut next, path, sum);
                }
            }
        }
    }

    let changed = next != *doc;
    *doc = next;
    Ok(changed)
}

/// Equality fields of a filter, used as the base of an upserted document.
fn seed_from_filter(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }
        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                if let Some(eq) = ops.get("$eq") {
                    set_path(&mut seed, key, eq.clone());
                }
            }
            value => set_path(&mut seed, key, value.clone()),
        }
    }
    seed
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (path, direction) in sort {
            let ord = match (lookup(a, path), lookup(b, path)) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ord = if as_f64(direction).map_or(false, |d| d < 0.0) { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn project(doc: &Document, projection: &Document) -> Document {
    let inclusive = projection.iter().any(|(k, v)| k != "_id" && truthy(v));
    let keep_id = projection.get("_id").map_or(true, truthy);

    if inclusive {
        let mut out = Document::new();
        if keep_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (key, flag) in projection {
            if key == "_id" || !truthy(flag) {
                continue;
            }
            if let Some(value) = lookup(doc, key) {
                set_path(&mut out, key, value.clone());
            }
        }
        out
    } else {
        let mut out = doc.clone();
        for (key, flag) in projection {
            if !truthy(flag) {
                unset_path(&mut out, key);
            }
        }
        out
    }
}

fn run_stage(docs: Vec<Document>, stage: &Document) -> Result<Vec<Document>> {
    let (name, arg) = match stage.iter().next() {
        Some(entry) if stage.len() == 1 => entry,
        _ => return Err(Error::operation("a pipeline stage must have exactly one field")),
    };

    let as_doc = || {
        arg.as_document()
            .ok_or_else(|| Error::operation(format!("{} expects a document", name)))
    };
    let as_count = || {
        as_f64(arg)
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize)
            .ok_or_else(|| Error::operation(format!("{} expects a non-negative number", name)))
    };

    match name.as_str() {
        "$match" => {
            let filter = as_doc()?;
            let mut out = Vec::new();
            for doc in docs {
                if matches(&doc, filter)? {
                    out.push(doc);
                }
            }
            Ok(out)
        }
        "$sort" => {
            let mut docs = docs;
            sort_documents(&mut docs, as_doc()?);
            Ok(docs)
        }
        "$skip" => Ok(docs.into_iter().skip(as_count()?).collect()),
        "$limit" => Ok(docs.into_iter().take(as_count()?).collect()),
        "$project" => {
            let projection = as_doc()?;
            Ok(docs.iter().map(|d| project(d, projection)).collect())
        }
        "$count" => {
            let field = arg
                .as_str()
                .ok_or_else(|| Error::operation("$count expects a field name"))?;
            let mut counted = Document::new();
            counted.insert(field, docs.len() as i64);
            Ok(vec![counted])
        }
        other => Err(Error::operation(format!("unsupported aggregation stage: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("test", "people")
    }

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .insert_many(
                &ns(),
                vec![
                    doc! { "name": "ann", "age": 31, "tags": ["admin", "ops"] },
                    doc! { "name": "bob", "age": 25.0, "team": { "name": "core" } },
                    doc! { "name": "cid", "age": 40i64 },
                ],
            )
            .await
            .unwrap();
        backend
    }

    #[test]
    fn test_filter_semantics() {
        let doc = doc! { "a": 1, "b": { "c": "x" }, "tags": ["p", "q"], "n": Bson::Null };
        assert!(matches(&doc, &doc! { "a": 1.0 }).unwrap());
        assert!(matches(&doc, &doc! { "b.c": "x" }).unwrap());
        assert!(matches(&doc, &doc! { "tags": "q" }).unwrap());
        assert!(matches(&doc, &doc! { "missing": Bson::Null }).unwrap());
        assert!(matches(&doc, &doc! { "a": { "$gte": 1, "$lt": 2 } }).unwrap());
        assert!(matches(&doc, &doc! { "a": { "$in": [5, 1] } }).unwrap());
        assert!(matches(&doc, &doc! { "z": { "$exists": false } }).unwrap());
        assert!(matches(&doc, &doc! { "$or": [{ "a": 2 }, { "b.c": "x" }] }).unwrap());
        assert!(!matches(&doc, &doc! { "a": { "$ne": 1 } }).unwrap());
        assert!(!matches(&doc, &doc! { "tags": { "$nin": ["p"] } }).unwrap());
        assert!(matches(&doc, &doc! { "a": { "$regex": "x" } }).is_err());
        assert!(matches(&doc, &doc! { "$where": "true" }).is_err());
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_rejects_duplicates() {
        let backend = seeded().await;
        let docs = backend.documents(&ns());
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| matches!(d.get("_id"), Some(Bson::ObjectId(_)))));
        assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));

        let id = docs[0].get("_id").cloned().unwrap();
        let err = backend.insert_one(&ns(), doc! { "_id": id }).await.unwrap_err();
        assert!(err.to_string().contains("E11000"));
    }

    #[tokio::test]
    async fn test_find_with_options() {
        let backend = seeded().await;
        let options = FindOptions {
            projection: Some(doc! { "name": 1, "_id": 0 }),
            sort: Some(doc! { "age": -1 }),
            skip: Some(1),
            limit: Some(1),
        };
        let docs = backend.find(&ns(), Document::new(), options).await.unwrap();
        assert_eq!(docs, vec![doc! { "name": "ann" }]);
    }

    #[tokio::test]
    async fn test_update_and_upsert() {
        let backend = seeded().await;
        let outcome = backend
            .update(
                &ns(),
                doc! { "age": { "$gt": 20 } },
                UpdateSpec::Document(doc! { "$inc": { "age": 1 }, "$set": { "seen": true } }),
                UpdateOptions { multi: true, upsert: false },
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 3, modified: 3, upserted: 0 });

        let ann = backend.find_one(&ns(), doc! { "name": "ann" }, FindOneOptions::default()).await.unwrap();
        assert_eq!(ann.unwrap().get("age"), Some(&Bson::Int32(32)));

        let outcome = backend
            .update(
                &ns(),
                doc! { "name": "dee" },
                UpdateSpec::Document(doc! { "$set": { "age": 22 } }),
                UpdateOptions { multi: false, upsert: true },
            )
            .await
            .unwrap();
        assert_eq!(outcome.upserted, 1);
        let dee = backend.find_one(&ns(), doc! { "name": "dee" }, FindOneOptions::default()).await.unwrap();
        assert_eq!(dee.unwrap().get("age"), Some(&Bson::Int32(22)));
    }

    #[test]
    fn test_inc_keeps_large_integers_exact() {
        let big = (1i64 << 53) | 1;
        let mut doc = doc! { "n": big, "small": 1 };
        assert!(apply_update(&mut doc, &doc! { "$inc": { "n": 1, "small": big } }).unwrap());
        assert_eq!(doc.get("n"), Some(&Bson::Int64(big + 1)));
        assert_eq!(doc.get("small"), Some(&Bson::Int64(big + 1)));

        let mut doc = doc! { "n": i64::MAX };
        let err = apply_update(&mut doc, &doc! { "$inc": { "n": 1 } }).unwrap_err();
        assert!(err.is_operation_failure());
        assert_eq!(doc.get("n"), Some(&Bson::Int64(i64::MAX)));

        let mut doc = doc! { "n": i32::MAX };
        apply_update(&mut doc, &doc! { "$inc": { "n": 1 } }).unwrap();
        assert_eq!(doc.get("n"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let original = doc! { "a": 1, "b": "x" };

        let mut doc = original.clone();
        let err = apply_update(&mut doc, &doc! { "$set": { "a": 2 }, "$bogus": { "b": 1 } }).unwrap_err();
        assert_eq!(err.to_string(), "unknown modifier: $bogus");
        assert_eq!(doc, original);

        let mut doc = original.clone();
        assert!(apply_update(&mut doc, &doc! { "$set": { "a": 2 }, "$inc": { "b": 1 } }).is_err());
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn test_replacement_keeps_id() {
        let backend = seeded().await;
        let before = backend.find_one(&ns(), doc! { "name": "bob" }, FindOneOptions::default()).await.unwrap();
        backend
            .update(
                &ns(),
                doc! { "name": "bob" },
                UpdateSpec::Document(doc! { "name": "rob" }),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        let after = backend.find_one(&ns(), doc! { "name": "rob" }, FindOneOptions::default()).await.unwrap();
        assert_eq!(before.unwrap().get("_id"), after.as_ref().unwrap().get("_id"));
        assert!(after.unwrap().get("age").is_none());
    }

    #[tokio::test]
    async fn test_remove_and_count() {
        let backend = seeded().await;
        let count = backend.count(&ns(), Document::new(), CountOptions { skip: Some(1), limit: Some(5) }).await;
        assert_eq!(count.unwrap(), 2);

        let removed = backend.remove(&ns(), Document::new(), true).await.unwrap();
        assert_eq!(removed, 1);
        let removed = backend.remove(&ns(), Document::new(), false).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.count(&ns(), Document::new(), CountOptions::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aggregate_pipeline() {
        let backend = seeded().await;
        let docs = backend
            .aggregate(
                &ns(),
                vec![
                    doc! { "$match": { "age": { "$gte": 30 } } },
                    doc! { "$sort": { "name": 1 } },
                    doc! { "$project": { "name": 1, "_id": 0 } },
                ],
            )
            .await
            .unwrap();
        assert_eq!(docs, vec![doc! { "name": "ann" }, doc! { "name": "cid" }]);

        let counted = backend.aggregate(&ns(), vec![doc! { "$count": "total" }]).await.unwrap();
        assert_eq!(counted, vec![doc! { "total": 3i64 }]);

        assert!(backend.aggregate(&ns(), vec![doc! { "$group": {} }]).await.is_err());
    }

    #[tokio::test]
    async fn test_names_and_connector() {
        let connector = MemoryConnector::new();
        assert!(connector.connect("mongodb://localhost").await.is_err());

        let backend = connector.connect("memory://one").await.unwrap();
        backend.insert_one(&Namespace::new("app", "users"), doc! { "a": 1 }).await.unwrap();
        backend.insert_one(&Namespace::new("app", "logs"), doc! { "a": 1 }).await.unwrap();

        let again = connector.connect("memory://one").await.unwrap();
        assert_eq!(again.list_database_names(None).await.unwrap(), vec!["app".to_string()]);
        assert_eq!(
            again.list_collection_names("app", Some(doc! { "name": "users" })).await.unwrap(),
            vec!["users".to_string()]
        );

        let other = connector.connect("memory://two").await.unwrap();
        assert!(other.list_database_names(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_shutdown() {
        let backend = MemoryBackend::new();
        backend.fail_next_shutdown();
        assert!(backend.shutdown().await.is_err());
        assert!(backend.shutdown().await.is_ok());
    }
}
