#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use delivery_cache::cache::{
    CacheConfig, CacheStore, DependencyIndex, InvalidationEngine, NotificationQueue,
};
use delivery_cache::delivery::{CachedDeliveryClient, DeliveryClient, DeliveryError, QueryParam};
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;

/// Delivery client serving canned JSON by request path.
///
/// Every call is counted before it waits on the gate, so tests can observe a
/// fetch that has started but not finished.
#[derive(Default)]
pub struct FakeDeliveryClient {
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeDeliveryClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, body: Value) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(path.to_string(), body);
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }

    /// Hold every subsequent fetch until [`FakeDeliveryClient::open`].
    pub fn close(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().expect("gate lock") = Some(Arc::clone(&gate));
        gate
    }

    pub fn open(&self) {
        if let Some(gate) = self.gate.lock().expect("gate lock").take() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    pub async fn wait_for_calls(&self, path: &str, count: usize) {
        while self.calls(path) < count {
            tokio::task::yield_now().await;
        }
    }

    async fn serve(&self, path: String) -> Result<Value, DeliveryError> {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(path.clone())
            .or_default() += 1;

        let gate = self.gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate open");
        }

        self.responses
            .lock()
            .expect("responses lock")
            .get(&path)
            .cloned()
            .ok_or_else(|| DeliveryError::not_found(path))
    }
}

#[async_trait]
impl DeliveryClient for FakeDeliveryClient {
    async fn fetch_item_json(
        &self,
        codename: &str,
        _params: &[QueryParam],
    ) -> Result<Value, DeliveryError> {
        self.serve(format!("items/{codename}")).await
    }

    async fn fetch_items_json(&self, _params: &[QueryParam]) -> Result<Value, DeliveryError> {
        self.serve("items".to_string()).await
    }

    async fn fetch_type_json(&self, codename: &str) -> Result<Value, DeliveryError> {
        self.serve(format!("types/{codename}")).await
    }

    async fn fetch_types_json(&self, _params: &[QueryParam]) -> Result<Value, DeliveryError> {
        self.serve("types".to_string()).await
    }

    async fn fetch_element_json(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<Value, DeliveryError> {
        self.serve(format!("types/{type_codename}/elements/{element_codename}"))
            .await
    }
}

/// Facade, engine and fake client wired over one store.
pub struct Harness {
    pub client: Arc<FakeDeliveryClient>,
    pub delivery: CachedDeliveryClient,
    pub engine: Arc<InvalidationEngine>,
}

impl Harness {
    pub fn new(config: CacheConfig) -> Self {
        let client = FakeDeliveryClient::new();
        let store = CacheStore::new(Arc::new(DependencyIndex::default()), config.fetch_timeout());
        let queue = Arc::new(NotificationQueue::with_limit(config.queue_bound()));
        let engine = Arc::new(InvalidationEngine::new(config.clone(), store.clone(), queue));
        let delivery = CachedDeliveryClient::new(
            Arc::clone(&client) as Arc<dyn DeliveryClient>,
            store,
            config.default_ttl(),
        );
        Self {
            client,
            delivery,
            engine,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(CacheConfig {
            default_ttl_seconds: ttl.as_secs(),
            ..CacheConfig::default()
        })
    }
}

pub fn content_item(codename: &str, content_type: &str) -> Value {
    json!({
        "system": {
            "id": format!("00000000-0000-0000-0000-{:0>12}", codename.len()),
            "name": codename,
            "codename": codename,
            "language": "en-US",
            "type": content_type,
            "sitemap_locations": [],
            "last_modified": "2024-03-01T12:00:00Z"
        },
        "elements": {
            "title": { "type": "text", "name": "Title", "value": codename }
        }
    })
}

fn modular(linked: &[(&str, &str)]) -> Value {
    let map: Map<String, Value> = linked
        .iter()
        .map(|(codename, content_type)| (codename.to_string(), content_item(codename, content_type)))
        .collect();
    Value::Object(map)
}

pub fn item_response(codename: &str, content_type: &str, linked: &[(&str, &str)]) -> Value {
    json!({
        "item": content_item(codename, content_type),
        "modular_content": modular(linked)
    })
}

pub fn listing_response(items: &[(&str, &str)], linked: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|(codename, content_type)| content_item(codename, content_type))
        .collect();
    json!({
        "pagination": { "skip": 0, "limit": 0, "count": items.len(), "next_page": "" },
        "items": items,
        "modular_content": modular(linked)
    })
}

pub fn content_type(codename: &str) -> Value {
    json!({
        "system": {
            "id": "b2c14f2c-6467-460b-a70b-bca17972a33a",
            "name": codename,
            "codename": codename,
            "last_modified": "2024-03-01T12:00:00Z"
        },
        "elements": {
            "personas": {
                "type": "taxonomy",
                "name": "Personas",
                "taxonomy_group": "personas"
            }
        }
    })
}
