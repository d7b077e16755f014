//! Delivery API boundary.
//!
//! The [`DeliveryClient`] trait is what the cache calls on a miss;
//! [`CachedDeliveryClient`] is the cached read API the rest of the service
//! uses.

mod client;
mod error;
mod facade;
pub mod models;
mod query;

pub use client::{DeliveryClient, decode};
pub use error::DeliveryError;
pub use facade::CachedDeliveryClient;
pub use query::{QueryParam, SortOrder, key_params};
