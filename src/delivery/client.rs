use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::DeliveryError;
use super::models::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, TypeListingResponse,
};
use super::query::QueryParam;

/// Access to the CMS delivery API.
///
/// Implementors provide the raw JSON fetches; the typed fetches decode them.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn fetch_item_json(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> Result<Value, DeliveryError>;

    async fn fetch_items_json(&self, params: &[QueryParam]) -> Result<Value, DeliveryError>;

    async fn fetch_type_json(&self, codename: &str) -> Result<Value, DeliveryError>;

    async fn fetch_types_json(&self, params: &[QueryParam]) -> Result<Value, DeliveryError>;

    async fn fetch_element_json(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<Value, DeliveryError>;

    async fn fetch_item(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> Result<ItemResponse, DeliveryError> {
        decode(self.fetch_item_json(codename, params).await?)
    }

    async fn fetch_items(&self, params: &[QueryParam]) -> Result<ItemListingResponse, DeliveryError> {
        decode(self.fetch_items_json(params).await?)
    }

    async fn fetch_type(&self, codename: &str) -> Result<ContentType, DeliveryError> {
        decode(self.fetch_type_json(codename).await?)
    }

    async fn fetch_types(&self, params: &[QueryParam]) -> Result<TypeListingResponse, DeliveryError> {
        decode(self.fetch_types_json(params).await?)
    }

    async fn fetch_element(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<ContentElement, DeliveryError> {
        decode(
            self.fetch_element_json(type_codename, element_codename)
                .await?,
        )
    }
}

/// Decode a delivery JSON payload into a typed response.
pub fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, DeliveryError> {
    Ok(serde_json::from_value(payload)?)
}
