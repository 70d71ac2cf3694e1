//! MongoDB backend over the official async driver.

use super::{
    Backend, Connector, CountOptions, FindOneOptions, FindOptions, Namespace, UpdateOptions, UpdateOutcome,
    UpdateSpec,
};
use crate::{Error, Result};
use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::options::{self as driver, ClientOptions, UpdateModifications};
use mongodb::{Client, Collection};
use std::sync::Arc;

/// Connects to MongoDB deployments from `mongodb://` or `mongodb+srv://` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn Backend>> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // The driver connects lazily; ping so a bad URI fails here.
        if let Err(e) = client.database("admin").run_command(doc! { "ping": 1 }, None).await {
            client.shutdown().await;
            return Err(e.into());
        }

        Ok(Arc::new(MongoBackend { client }))
    }
}

/// A connected MongoDB client.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
}

impl MongoBackend {
    /// Wraps an already configured driver client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client.database(&ns.database).collection::<Document>(&ns.collection)
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().map_or(false, |k| k.starts_with('$'))
}

#[async_trait]
impl Backend for MongoBackend {
    async fn list_database_names(&self, filter: Option<Document>) -> Result<Vec<String>> {
        Ok(self.client.list_database_names(filter, None).await?)
    }

    async fn list_collection_names(&self, database: &str, filter: Option<Document>) -> Result<Vec<String>> {
        Ok(self.client.database(database).list_collection_names(filter).await?)
    }

    async fn find(&self, ns: &Namespace, filter: Document, options: FindOptions) -> Result<Vec<Document>> {
        let mut opts = driver::FindOptions::default();
        opts.projection = options.projection;
        opts.sort = options.sort;
        opts.skip = options.skip;
        opts.limit = options.limit;

        let cursor = self.collection(ns).find(filter, opts).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        log::debug!("find on {} returned {} documents", ns, docs.len());
        Ok(docs)
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOneOptions,
    ) -> Result<Option<Document>> {
        let mut opts = driver::FindOneOptions::default();
        opts.projection = options.projection;
        opts.sort = options.sort;
        opts.skip = options.skip;

        Ok(self.collection(ns).find_one(filter, opts).await?)
    }

    async fn insert_one(&self, ns: &Namespace, doc: Document) -> Result<()> {
        self.collection(ns).insert_one(doc, None).await?;
        Ok(())
    }

    async fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<u64> {
        let res = self.collection(ns).insert_many(docs, None).await?;
        Ok(res.inserted_ids.len() as u64)
    }

    async fn update(
        &self,
        ns: &Namespace,
        query: Document,
        update: UpdateSpec,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        let coll = self.collection(ns);

        let res = match update {
            UpdateSpec::Document(doc) if !is_operator_document(&doc) => {
                if options.multi {
                    return Err(Error::operation("multi update requires update operators"));
                }
                let mut opts = driver::ReplaceOptions::default();
                opts.upsert = Some(options.upsert);
                coll.replace_one(query, doc, opts).await?
            }
            spec => {
                let modifications = match spec {
                    UpdateSpec::Document(doc) => UpdateModifications::Document(doc),
                    UpdateSpec::Pipeline(stages) => UpdateModifications::Pipeline(stages),
                };
                let mut opts = driver::UpdateOptions::default();
                opts.upsert = Some(options.upsert);
                if options.multi {
                    coll.update_many(query, modifications, opts).await?
                } else {
                    coll.update_one(query, modifications, opts).await?
                }
            }
        };

        Ok(UpdateOutcome {
            matched: res.matched_count,
            modified: res.modified_count,
            upserted: u64::from(res.upserted_id.is_some()),
        })
    }

    async fn remove(&self, ns: &Namespace, query: Document, just_one: bool) -> Result<u64> {
        let coll = self.collection(ns);
        let res = if just_one {
            coll.delete_one(query, None).await?
        } else {
            coll.delete_many(query, None).await?
        };
        Ok(res.deleted_count)
    }

    async fn count(&self, ns: &Namespace, filter: Document, options: CountOptions) -> Result<u64> {
        let mut opts = driver::CountOptions::default();
        opts.skip = options.skip;
        opts.limit = options.limit;
        Ok(self.collection(ns).count_documents(filter, opts).await?)
    }

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self.collection(ns).aggregate(pipeline, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn shutdown(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
