pub mod error;
pub mod sitemap;
