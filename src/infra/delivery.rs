//! HTTP delivery client backed by `reqwest`.

use async_trait::async_trait;
use axum::http::HeaderValue;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::DeliverySettings;
use crate::delivery::{DeliveryClient, DeliveryError, QueryParam};

use super::error::InfraError;

/// Talks to the public delivery endpoint, or to the preview endpoint when a
/// preview API key is configured.
#[derive(Clone, Debug)]
pub struct HttpDeliveryClient {
    client: Client,
    base: Url,
    project_id: String,
    preview_key: Option<String>,
}

impl HttpDeliveryClient {
    pub fn new(settings: &DeliverySettings) -> Result<Self, InfraError> {
        let base = Url::parse(settings.endpoint()).map_err(|err| {
            InfraError::configuration(format!("invalid delivery base url: {err}"))
        })?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build delivery http client: {err}"))
            })?;

        Ok(Self {
            client,
            base,
            project_id: settings.project_id.clone(),
            preview_key: settings.preview_api_key.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("delivery-cache/", env!("CARGO_PKG_VERSION"))
    }

    /// `{base}/{project_id}/{segments…}?{params…}`
    pub fn url(&self, segments: &[&str], params: &[QueryParam]) -> Result<Url, DeliveryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| DeliveryError::transport("delivery base url cannot carry a path"))?
            .pop_if_empty()
            .push(&self.project_id)
            .extend(segments);

        url.set_query(None);
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for param in params {
                let (name, value) = param.pair();
                query.append_pair(&name, &value);
            }
        }
        Ok(url)
    }

    async fn get(&self, segments: &[&str], params: &[QueryParam]) -> Result<Value, DeliveryError> {
        let url = self.url(segments, params)?;
        debug!(%url, "Delivery request");

        let mut request = self.client.get(url);
        if let Some(key) = &self.preview_key {
            let header = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|err| DeliveryError::transport(err.to_string()))?;
            request = request.header(axum::http::header::AUTHORIZATION, header);
        }

        let response = request
            .send()
            .await
            .map_err(|err| DeliveryError::transport(err.to_string()))?;
        Self::handle(response, segments).await
    }

    async fn handle(response: Response, segments: &[&str]) -> Result<Value, DeliveryError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| DeliveryError::transport(err.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Err(DeliveryError::not_found(segments.join("/")));
        }
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(DeliveryError::status(status.as_u16(), body));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn fetch_item_json(
        &self,
        codename: &str,
        params: &[QueryParam],
    ) -> Result<Value, DeliveryError> {
        self.get(&["items", codename], params).await
    }

    async fn fetch_items_json(&self, params: &[QueryParam]) -> Result<Value, DeliveryError> {
        self.get(&["items"], params).await
    }

    async fn fetch_type_json(&self, codename: &str) -> Result<Value, DeliveryError> {
        self.get(&["types", codename], &[]).await
    }

    async fn fetch_types_json(&self, params: &[QueryParam]) -> Result<Value, DeliveryError> {
        self.get(&["types"], params).await
    }

    async fn fetch_element_json(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<Value, DeliveryError> {
        self.get(&["types", type_codename, "elements", element_codename], &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings(preview_api_key: Option<&str>) -> DeliverySettings {
        DeliverySettings {
            project_id: "975bf280-fd91-488c-994c-2f04416e5ee3".to_string(),
            preview_api_key: preview_api_key.map(str::to_string),
            base_url: None,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn builds_public_item_url() {
        let client = HttpDeliveryClient::new(&settings(None)).expect("client");
        let url = client
            .url(
                &["items", "home"],
                &[QueryParam::depth(1), QueryParam::language("en-US")],
            )
            .expect("url");

        assert_eq!(
            url.as_str(),
            "https://deliver.kontent.ai/975bf280-fd91-488c-994c-2f04416e5ee3/items/home?depth=1&language=en-US"
        );
    }

    #[test]
    fn preview_key_switches_endpoint() {
        let client = HttpDeliveryClient::new(&settings(Some("secret"))).expect("client");
        let url = client
            .url(
                &["items"],
                &[QueryParam::within("system.type", ["article", "cafe"])],
            )
            .expect("url");

        assert!(url.as_str().starts_with("https://preview-deliver.kontent.ai/"));
        assert_eq!(url.query(), Some("system.type%5Bin%5D=article%2Ccafe"));
    }
}
