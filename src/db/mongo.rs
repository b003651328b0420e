//! MongoDB client and typed collections
//!
//! The results database holds pass facts, health records and scenario
//! documents. Ground truth lives in a separate per-principal database on the
//! same cluster, reached through [`MongoClient::database`].

use std::time::Duration;

use bson::{doc, Bson, Document};
use mongodb::{
    options::{ClientOptions, IndexOptions, ReplaceOptions},
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::types::ValidatorError;

/// Server selection and connect bound; an unreachable cluster fails startup fast
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Schemas that declare their own indexes
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping the results database
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, ValidatorError> {
        info!(db = %db_name, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| ValidatorError::Config(format!("Invalid MongoDB URI: {}", e)))?;
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.app_name = Some("lab-validator".to_string());

        let client = Client::with_options(options)
            .map_err(|e| ValidatorError::Database(format!("Failed to build MongoDB client: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ValidatorError::Database(format!("MongoDB ping failed: {}", e)))?;

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Typed collection in the results database, with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, ValidatorError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        let collection = self.client.database(&self.db_name).collection::<T>(name);
        MongoCollection::with_indexes(collection).await
    }

    /// Another database on the same cluster
    pub fn database(&self, name: &str) -> Database {
        self.client.database(name)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Collection of schema documents
#[derive(Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    async fn with_indexes(inner: Collection<T>) -> Result<Self, ValidatorError> {
        let indexes: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        if !indexes.is_empty() {
            inner.create_indexes(indexes).await.map_err(|e| {
                ValidatorError::Database(format!(
                    "Failed to create indexes on {}: {}",
                    inner.name(),
                    e
                ))
            })?;
            debug!(collection = %inner.name(), "Indexes applied");
        }

        Ok(Self { inner })
    }

    pub async fn insert_one(&self, item: T) -> Result<(), ValidatorError> {
        self.inner.insert_one(item).await?;
        Ok(())
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, ValidatorError> {
        Ok(self.inner.find_one(filter).await?)
    }

    /// Whether any document matches
    pub async fn exists(&self, filter: Document) -> Result<bool, ValidatorError> {
        let count = self.inner.count_documents(filter).limit(1).await?;
        Ok(count > 0)
    }

    /// Distinct string values of `field`; other value types are skipped
    pub async fn distinct_strings(
        &self,
        field: &str,
        filter: Document,
    ) -> Result<Vec<String>, ValidatorError> {
        let values = self.inner.distinct(field, filter).await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Replace the matching document, inserting it when absent
    pub async fn upsert_replace(&self, filter: Document, item: T) -> Result<(), ValidatorError> {
        self.inner
            .replace_one(filter, item)
            .with_options(ReplaceOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    /// Apply `update` to the first match; `false` when nothing matched
    pub async fn update_one(&self, filter: Document, update: Document) -> Result<bool, ValidatorError> {
        let result = self.inner.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }
}
