//! Read-through cache for a headless CMS delivery API.
//!
//! Responses are cached per request and linked to the content items,
//! content types and taxonomy groups they were built from. Content change
//! webhooks purge exactly the responses that depended on the changed
//! content.

pub mod application;
pub mod cache;
pub mod config;
pub mod delivery;
pub mod infra;
