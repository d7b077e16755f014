//! Cached read API over a [`DeliveryClient`].
//!
//! Every read builds a [`CacheKey`] from the operation and its parameters and
//! goes through [`CacheStore::get_or_populate`]. On a miss the delivery client
//! is called, the response digested, and the entry linked with what it was
//! built from.

use std::iter;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::cache::{
    CacheError, CacheKey, CacheStore, Dependency, Digest, Operation, Populated, ResponseDigest,
};

use super::client::{DeliveryClient, decode};
use super::models::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, TypeListingResponse,
};
use super::query::{QueryParam, key_params};

/// Read-through cache in front of a delivery client.
#[derive(Clone)]
pub struct CachedDeliveryClient {
    client: Arc<dyn DeliveryClient>,
    store: CacheStore,
    ttl: Duration,
}

impl CachedDeliveryClient {
    pub fn new(client: Arc<dyn DeliveryClient>, store: CacheStore, ttl: Duration) -> Self {
        Self { client, store, ttl }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_item(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> Result<Arc<ItemResponse>, CacheError> {
        let key = CacheKey::build(Operation::GetItem, item_segments(codename, params));
        let (client, codename, params) = self.request(codename, params);
        let log_key = key.clone();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let response = client.fetch_item(&codename, &params).await?;
                let digest = response.digest();
                Ok(item_lookup(response, &digest, &codename, &log_key))
            })
            .await
    }

    pub async fn get_item_json(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> Result<Arc<Value>, CacheError> {
        let key = CacheKey::build(Operation::GetItemJson, item_segments(codename, params));
        let (client, codename, params) = self.request(codename, params);
        let log_key = key.clone();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let payload = client.fetch_item_json(&codename, &params).await?;
                let digest = payload.digest();
                Ok(item_lookup(payload, &digest, &codename, &log_key))
            })
            .await
    }

    /// One item decoded into a caller-defined shape.
    pub async fn get_item_as<T>(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> Result<Arc<T>, CacheError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let key = CacheKey::typed::<T, _, _>(Operation::GetItem, item_segments(codename, params));
        let (client, codename, params) = self.request(codename, params);
        let log_key = key.clone();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let payload = client.fetch_item_json(&codename, &params).await?;
                let digest = payload.digest();
                let value: T = decode(payload)?;
                Ok(item_lookup(value, &digest, &codename, &log_key))
            })
            .await
    }

    pub async fn get_items(
        &self,
        params: &[QueryParam],
    ) -> Result<Arc<ItemListingResponse>, CacheError> {
        let key = CacheKey::build(Operation::GetItems, key_params(params));
        let params = params.to_vec();
        let client = Arc::clone(&self.client);
        let log_key = key.clone();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let response = client.fetch_items(&params).await?;
                let digest = response.digest();
                Ok(listing(response, &digest, &params, &log_key))
            })
            .await
    }

    pub async fn get_items_json(&self, params: &[QueryParam]) -> Result<Arc<Value>, CacheError> {
        let key = CacheKey::build(Operation::GetItemsJson, key_params(params));
        let params = params.to_vec();
        let client = Arc::clone(&self.client);
        let log_key = key.clone();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let payload = client.fetch_items_json(&params).await?;
                let digest = payload.digest();
                Ok(listing(payload, &digest, &params, &log_key))
            })
            .await
    }

    /// A listing decoded into a caller-defined shape.
    pub async fn get_items_as<T>(&self, params: &[QueryParam]) -> Result<Arc<T>, CacheError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let key = CacheKey::typed::<T, _, _>(Operation::GetItems, key_params(params));
        let params = params.to_vec();
        let client = Arc::clone(&self.client);
        let log_key = key.clone();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let payload = client.fetch_items_json(&params).await?;
                let digest = payload.digest();
                let value: T = decode(payload)?;
                Ok(listing(value, &digest, &params, &log_key))
            })
            .await
    }

    pub async fn get_type(&self, codename: &str) -> Result<Arc<ContentType>, CacheError> {
        let key = CacheKey::build(Operation::GetType, [codename]);
        let (client, codename, _) = self.request(codename, &[]);
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let response = client.fetch_type(&codename).await?;
                let digest = response.digest();
                Ok(schema(response, &digest, &codename))
            })
            .await
    }

    pub async fn get_type_json(&self, codename: &str) -> Result<Arc<Value>, CacheError> {
        let key = CacheKey::build(Operation::GetTypeJson, [codename]);
        let (client, codename, _) = self.request(codename, &[]);
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let payload = client.fetch_type_json(&codename).await?;
                let digest = payload.digest();
                Ok(schema(payload, &digest, &codename))
            })
            .await
    }

    pub async fn get_types(
        &self,
        params: &[QueryParam],
    ) -> Result<Arc<TypeListingResponse>, CacheError> {
        let key = CacheKey::build(Operation::GetTypes, key_params(params));
        let params = params.to_vec();
        let client = Arc::clone(&self.client);
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let response = client.fetch_types(&params).await?;
                let digest = response.digest();
                Ok(Populated::from_digest(response, &digest))
            })
            .await
    }

    pub async fn get_types_json(&self, params: &[QueryParam]) -> Result<Arc<Value>, CacheError> {
        let key = CacheKey::build(Operation::GetTypesJson, key_params(params));
        let params = params.to_vec();
        let client = Arc::clone(&self.client);
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let payload = client.fetch_types_json(&params).await?;
                let digest = payload.digest();
                Ok(Populated::from_digest(payload, &digest))
            })
            .await
    }

    pub async fn get_element(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<Arc<ContentElement>, CacheError> {
        let key = CacheKey::build(Operation::GetElement, [type_codename, element_codename]);
        let (client, type_codename, _) = self.request(type_codename, &[]);
        let element_codename = element_codename.to_owned();
        self.store
            .get_or_populate(key, self.ttl, move || async move {
                let element = client
                    .fetch_element(&type_codename, &element_codename)
                    .await?;
                let digest = element.digest();
                Ok(schema(element, &digest, &type_codename))
            })
            .await
    }

    fn request(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> (Arc<dyn DeliveryClient>, String, Vec<QueryParam>) {
        (
            Arc::clone(&self.client),
            codename.to_owned(),
            params.to_vec(),
        )
    }
}

fn item_segments(codename: &str, params: &[QueryParam]) -> Vec<String> {
    iter::once(codename.to_owned())
        .chain(key_params(params))
        .collect()
}

/// A single-item lookup always depends on the requested item, even when the
/// response could not be digested.
fn item_lookup<V>(value: V, digest: &ResponseDigest, codename: &str, key: &CacheKey) -> Populated<V> {
    if digest.primary.is_empty() {
        warn!(
            cache_key = %key,
            codename,
            "Item response carried no item metadata, linked by codename only"
        );
    }
    Populated::from_digest(value, digest).with_dependency(Dependency::item(codename))
}

/// A listing depends on every item it returned and on a type listing link for
/// each content type it filtered by, so newly published items of those types
/// purge it without touching single item lookups of the same type.
fn listing<V>(value: V, digest: &ResponseDigest, params: &[QueryParam], key: &CacheKey) -> Populated<V> {
    let filtered_types = requested_types(params);
    if digest.is_empty() && filtered_types.is_empty() {
        warn!(
            cache_key = %key,
            "Listing response carried no dependency metadata, entry expires by TTL only"
        );
    }
    filtered_types.into_iter().fold(
        Populated::from_digest(value, digest),
        |populated, content_type| populated.with_dependency(Dependency::type_listing(content_type)),
    )
}

/// Type and element lookups depend on the type they describe.
fn schema<V>(value: V, digest: &ResponseDigest, type_codename: &str) -> Populated<V> {
    Populated::from_digest(value, digest).with_dependency(Dependency::content_type(type_codename))
}

fn requested_types(params: &[QueryParam]) -> Vec<String> {
    params
        .iter()
        .flat_map(|param| match param {
            QueryParam::Equals { element, value } if element == "system.type" => {
                vec![value.clone()]
            }
            QueryParam::In { element, values } if element == "system.type" => values.clone(),
            _ => Vec::new(),
        })
        .collect()
}
