//! Ports to the remote content and geocoding services.
//!
//! Both traits return boxed futures so they stay dyn-compatible and can be
//! shared as `Arc<dyn _>` across tasks. "Not found" is always `Ok(None)` or
//! an empty list; `Err` means the call itself failed.

use std::future::Future;
use std::pin::Pin;

use foundation::LatLon;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::GeoQuery;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Decode(String),
}

/// One geosearch result before detail enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoHit {
    pub title: String,
    #[serde(flatten)]
    pub position: LatLon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDetail {
    pub full_text: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub display_name: String,
    #[serde(flatten)]
    pub position: LatLon,
}

/// Geo-indexed content service.
pub trait GeoSource: Send + Sync {
    /// Items near `query.center`, in the service's order.
    fn geosearch(&self, query: GeoQuery) -> BoxFuture<'_, Result<Vec<GeoHit>, SourceError>>;

    fn page_detail<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, Result<Option<PageDetail>, SourceError>>;

    /// Coordinates attached to a page, used to resolve navigation references.
    fn title_coordinates<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>>;
}

/// Free-text geocoding service.
pub trait Geocoder: Send + Sync {
    fn suggest<'a>(
        &'a self,
        text: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PlaceSuggestion>, SourceError>>;

    /// Best single match for `name`.
    fn locate<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>>;
}
