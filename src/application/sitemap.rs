//! Sitemap generation from published content items.
//!
//! Items are read through the cached delivery client, so a webhook that
//! touches any listed item or content type refreshes the sitemap too.

use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use crate::cache::CacheError;
use crate::config::SitemapSettings;
use crate::delivery::models::ContentItem;
use crate::delivery::{CachedDeliveryClient, QueryParam};

/// Service for generating sitemap.xml.
#[derive(Clone)]
pub struct SitemapService {
    delivery: CachedDeliveryClient,
    content_types: Vec<String>,
    base_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("failed to list items: {0}")]
    Items(#[from] CacheError),
}

impl SitemapService {
    pub fn new(delivery: CachedDeliveryClient, settings: &SitemapSettings) -> Self {
        Self {
            delivery,
            content_types: settings.content_types.clone(),
            base_url: settings.base_url.clone(),
        }
    }

    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    /// Generate sitemap.xml content.
    pub async fn sitemap_xml(&self) -> Result<String, SitemapError> {
        let params = [
            QueryParam::depth(0),
            QueryParam::within("system.type", self.content_types.iter()),
        ];
        let listing = self.delivery.get_items(&params).await?;

        let base = self.base_url.as_deref().unwrap_or("");
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );
        for item in &listing.items {
            xml.push_str(&sitemap_entry(base, item));
        }
        xml.push_str("</urlset>\n");
        Ok(xml)
    }
}

/// `/{first sitemap location}/{codename as slug}`
pub fn item_path(item: &ContentItem) -> String {
    let slug = item.codename().replace('_', "-");
    let slug = slug.trim_end_matches('-');
    match item.system.sitemap_locations.first() {
        Some(location) => format!("/{location}/{slug}"),
        None => format!("/{slug}"),
    }
}

fn sitemap_entry(base: &str, item: &ContentItem) -> String {
    let loc = format!("{base}{}", item_path(item));
    match item.system.last_modified.format(&Rfc3339) {
        Ok(lastmod) => format!("  <url><loc>{loc}</loc><lastmod>{lastmod}</lastmod></url>\n"),
        Err(_) => format!("  <url><loc>{loc}</loc></url>\n"),
    }
}
