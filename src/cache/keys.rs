//! Cache key derivation.
//!
//! Defines `CacheKey` for cached responses and `Dependency` for the content a
//! cached response was built from.

use std::any::type_name;
use std::fmt;

/// Separator between key segments. Query parameter values never contain it.
pub const SEPARATOR: char = '|';

/// Read operations of the delivery API that go through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetItem,
    GetItemJson,
    GetItems,
    GetItemsJson,
    GetType,
    GetTypeJson,
    GetTypes,
    GetTypesJson,
    GetElement,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::GetItem => "get_item",
            Operation::GetItemJson => "get_item_json",
            Operation::GetItems => "get_items",
            Operation::GetItemsJson => "get_items_json",
            Operation::GetType => "get_type",
            Operation::GetTypeJson => "get_type_json",
            Operation::GetTypes => "get_types",
            Operation::GetTypesJson => "get_types_json",
            Operation::GetElement => "get_element",
        }
    }

    /// Single-item lookups carry the item codename as their first parameter.
    pub const fn is_item_lookup(self) -> bool {
        matches!(self, Operation::GetItem | Operation::GetItemJson)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one cached response: `operation|param|param…`.
///
/// Parameter order is part of the identity. Typed reads render the operation
/// segment as `operation-<type>` so they never share an entry with the raw
/// read of the same parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn build<I, S>(operation: Operation, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_segments(operation.as_str(), params)
    }

    pub fn typed<T: ?Sized, I, S>(operation: Operation, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let head = format!("{}-{}", operation.as_str(), type_name::<T>());
        Self::from_segments(&head, params)
    }

    fn from_segments<I, S>(head: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::from(head);
        for param in params {
            key.push(SEPARATOR);
            key.push_str(param.as_ref());
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operation segment without the typed suffix.
    pub fn operation(&self) -> &str {
        let head = self.0.split(SEPARATOR).next().unwrap_or_default();
        head.split_once('-').map_or(head, |(operation, _)| operation)
    }

    /// Whether this key caches a single-item lookup of `codename`.
    pub fn is_item_lookup_for(&self, codename: &str) -> bool {
        let is_lookup = [Operation::GetItem, Operation::GetItemJson]
            .iter()
            .any(|op| op.as_str() == self.operation());
        is_lookup && self.0.split(SEPARATOR).nth(1) == Some(codename)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Codename of one content item, unique within a project and language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemIdentifier(String);

impl ItemIdentifier {
    pub fn new(codename: impl Into<String>) -> Self {
        Self(codename.into())
    }

    pub fn codename(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content_item{SEPARATOR}{}", self.0)
    }
}

impl From<&str> for ItemIdentifier {
    fn from(codename: &str) -> Self {
        Self::new(codename)
    }
}

impl From<String> for ItemIdentifier {
    fn from(codename: String) -> Self {
        Self(codename)
    }
}

/// Something a cached response was built from.
///
/// When it changes, every cache entry linked to it must be purged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// A content item, either the subject of the response or embedded in it.
    Item(ItemIdentifier),
    /// A content type: items of this type appear in the response, or the
    /// response describes the type itself.
    ContentType(String),
    /// A taxonomy group used by an item in the response.
    Taxonomy(String),
    /// A listing filtered by this content type. Publishing any item of the
    /// type can change the listing.
    TypeListing(String),
}

impl Dependency {
    pub fn item(codename: impl Into<String>) -> Self {
        Self::Item(ItemIdentifier::new(codename))
    }

    pub fn content_type(codename: impl Into<String>) -> Self {
        Self::ContentType(codename.into())
    }

    pub fn taxonomy(codename: impl Into<String>) -> Self {
        Self::Taxonomy(codename.into())
    }

    pub fn type_listing(codename: impl Into<String>) -> Self {
        Self::TypeListing(codename.into())
    }

    /// Content types and taxonomy groups group many items under one codename.
    pub fn is_group(&self) -> bool {
        matches!(self, Dependency::ContentType(_) | Dependency::Taxonomy(_))
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Item(id) => write!(f, "{id}"),
            Dependency::ContentType(codename) => write!(f, "content_type{SEPARATOR}{codename}"),
            Dependency::Taxonomy(codename) => write!(f, "taxonomy{SEPARATOR}{codename}"),
            Dependency::TypeListing(codename) => {
                write!(f, "type_listing{SEPARATOR}{codename}")
            }
        }
    }
}
