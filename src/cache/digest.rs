//! Dependency extraction from fetched responses.
//!
//! Each response shape implements [`Digest`]; the store links the cache key
//! with whatever the digest reports. Raw JSON responses are digested by
//! reading the delivery API's `system` and `modular_content` fields.

use std::collections::BTreeSet;

use serde_json::Value;

use super::keys::{Dependency, ItemIdentifier};

/// What a response is about and what it embeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDigest {
    /// Items the response is the subject of.
    pub primary: BTreeSet<ItemIdentifier>,
    /// Linked items embedded in the response, one level deep.
    pub referenced: BTreeSet<ItemIdentifier>,
    /// Content types of the items above, or the type a schema response describes.
    pub content_types: BTreeSet<String>,
    /// Taxonomy groups used by elements in the response.
    pub taxonomy_groups: BTreeSet<String>,
    /// At least one item came without type metadata.
    pub untyped: bool,
}

impl ResponseDigest {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
            && self.referenced.is_empty()
            && self.content_types.is_empty()
            && self.taxonomy_groups.is_empty()
    }

    /// Record one item, either as the subject or as linked content.
    pub fn record_item(&mut self, codename: &str, content_type: Option<&str>, primary: bool) {
        let identifier = ItemIdentifier::new(codename);
        if primary {
            self.primary.insert(identifier);
        } else {
            self.referenced.insert(identifier);
        }
        match content_type {
            Some(content_type) if !content_type.is_empty() => {
                self.content_types.insert(content_type.to_owned());
            }
            _ => self.untyped = true,
        }
    }

    pub fn record_taxonomy(&mut self, group: &str) {
        if !group.is_empty() {
            self.taxonomy_groups.insert(group.to_owned());
        }
    }

    pub fn record_content_type(&mut self, codename: &str) {
        if !codename.is_empty() {
            self.content_types.insert(codename.to_owned());
        }
    }

    /// Every dependency the response was built from.
    pub fn dependencies(&self) -> BTreeSet<Dependency> {
        let items = self
            .primary
            .iter()
            .chain(&self.referenced)
            .cloned()
            .map(Dependency::Item);
        let types = self
            .content_types
            .iter()
            .cloned()
            .map(Dependency::ContentType);
        let taxonomies = self
            .taxonomy_groups
            .iter()
            .cloned()
            .map(Dependency::Taxonomy);
        items.chain(types).chain(taxonomies).collect()
    }
}

/// Extracts a [`ResponseDigest`] from a response shape.
pub trait Digest {
    fn digest(&self) -> ResponseDigest;
}

impl Digest for Value {
    fn digest(&self) -> ResponseDigest {
        let mut digest = ResponseDigest::default();

        if let Some(item) = self.get("item") {
            digest_item(&mut digest, item, true);
        }
        if let Some(items) = self.get("items").and_then(Value::as_array) {
            for item in items {
                digest_item(&mut digest, item, true);
            }
        }
        if let Some(linked) = self.get("modular_content").and_then(Value::as_object) {
            for item in linked.values() {
                digest_item(&mut digest, item, false);
            }
        }

        if let Some(types) = self.get("types").and_then(Value::as_array) {
            for content_type in types {
                digest_type(&mut digest, content_type);
            }
        } else if self.get("item").is_none() && self.get("system").is_some() {
            digest_type(&mut digest, self);
        }

        if let Some(group) = self.get("taxonomy_group").and_then(Value::as_str) {
            digest.record_taxonomy(group);
        }

        digest
    }
}

fn digest_item(digest: &mut ResponseDigest, item: &Value, primary: bool) {
    let system = item.get("system");
    let Some(codename) = system
        .and_then(|system| system.get("codename"))
        .and_then(Value::as_str)
    else {
        return;
    };
    let content_type = system
        .and_then(|system| system.get("type"))
        .and_then(Value::as_str);
    digest.record_item(codename, content_type, primary);
    digest_elements(digest, item);
}

fn digest_type(digest: &mut ResponseDigest, content_type: &Value) {
    if let Some(codename) = content_type
        .get("system")
        .and_then(|system| system.get("codename"))
        .and_then(Value::as_str)
    {
        digest.record_content_type(codename);
    }
    digest_elements(digest, content_type);
}

fn digest_elements(digest: &mut ResponseDigest, owner: &Value) {
    let Some(elements) = owner.get("elements").and_then(Value::as_object) else {
        return;
    };
    for element in elements.values() {
        if let Some(group) = element.get("taxonomy_group").and_then(Value::as_str) {
            digest.record_taxonomy(group);
        }
    }
}
