//! Typed delivery API responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::cache::{Digest, ResponseDigest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSystem {
    pub id: String,
    pub name: String,
    pub codename: String,
    #[serde(default)]
    pub language: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub sitemap_locations: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementOption {
    pub name: String,
    pub codename: String,
}

/// An element of an item, or an element definition of a content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codename: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy_group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ElementOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub system: ItemSystem,
    #[serde(default)]
    pub elements: BTreeMap<String, ContentElement>,
}

impl ContentItem {
    pub fn codename(&self) -> &str {
        &self.system.codename
    }

    /// Text value of an element, if it has one.
    pub fn text(&self, element: &str) -> Option<&str> {
        self.elements.get(element).and_then(|e| e.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: u64,
    pub limit: u64,
    pub count: u64,
    #[serde(default)]
    pub next_page: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: ContentItem,
    #[serde(default)]
    pub modular_content: BTreeMap<String, ContentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemListingResponse {
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub modular_content: BTreeMap<String, ContentItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSystem {
    pub id: String,
    pub name: String,
    pub codename: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    pub system: TypeSystem,
    #[serde(default)]
    pub elements: BTreeMap<String, ContentElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeListingResponse {
    pub types: Vec<ContentType>,
    pub pagination: Pagination,
}

fn digest_elements<'a>(
    digest: &mut ResponseDigest,
    elements: impl IntoIterator<Item = &'a ContentElement>,
) {
    for element in elements {
        if let Some(group) = &element.taxonomy_group {
            digest.record_taxonomy(group);
        }
    }
}

fn digest_item(digest: &mut ResponseDigest, item: &ContentItem, primary: bool) {
    digest.record_item(
        &item.system.codename,
        Some(item.system.content_type.as_str()),
        primary,
    );
    digest_elements(digest, item.elements.values());
}

impl Digest for ItemResponse {
    fn digest(&self) -> ResponseDigest {
        let mut digest = ResponseDigest::default();
        digest_item(&mut digest, &self.item, true);
        for linked in self.modular_content.values() {
            digest_item(&mut digest, linked, false);
        }
        digest
    }
}

impl Digest for ItemListingResponse {
    fn digest(&self) -> ResponseDigest {
        let mut digest = ResponseDigest::default();
        for item in &self.items {
            digest_item(&mut digest, item, true);
        }
        for linked in self.modular_content.values() {
            digest_item(&mut digest, linked, false);
        }
        digest
    }
}

impl Digest for ContentType {
    fn digest(&self) -> ResponseDigest {
        let mut digest = ResponseDigest::default();
        digest.record_content_type(&self.system.codename);
        digest_elements(&mut digest, self.elements.values());
        digest
    }
}

impl Digest for TypeListingResponse {
    fn digest(&self) -> ResponseDigest {
        let mut digest = ResponseDigest::default();
        for content_type in &self.types {
            digest.record_content_type(&content_type.system.codename);
            digest_elements(&mut digest, content_type.elements.values());
        }
        digest
    }
}

impl Digest for ContentElement {
    fn digest(&self) -> ResponseDigest {
        let mut digest = ResponseDigest::default();
        digest_elements(&mut digest, [self]);
        digest
    }
}
