//! Nominatim search adapter.

use foundation::LatLon;
use serde::Deserialize;
use streaming::{BoxFuture, Geocoder, PlaceSuggestion, SourceError};
use tracing::debug;
use url::Url;

use crate::http::get_json;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Nominatim sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct Place {
    display_name: String,
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    endpoint: Url,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(endpoint: Url, client: reqwest::Client) -> Self {
        Self { endpoint, client }
    }

    pub fn search_url(&self, text: &str, limit: usize) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("q", text)
            .append_pair("limit", &limit.to_string());
        url
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<PlaceSuggestion>, SourceError> {
        let places: Vec<Place> = get_json(&self.client, self.search_url(text, limit)).await?;
        Ok(suggestions(places))
    }
}

fn suggestions(places: Vec<Place>) -> Vec<PlaceSuggestion> {
    places
        .into_iter()
        .filter_map(|place| {
            let position = match (place.lat.parse(), place.lon.parse()) {
                (Ok(lat), Ok(lon)) => LatLon::new(lat, lon),
                _ => {
                    debug!(name = %place.display_name, "skipping place with bad coordinates");
                    return None;
                }
            };
            Some(PlaceSuggestion {
                display_name: place.display_name,
                position,
            })
        })
        .collect()
}

impl Geocoder for NominatimGeocoder {
    fn suggest<'a>(
        &'a self,
        text: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PlaceSuggestion>, SourceError>> {
        Box::pin(self.search(text, limit))
    }

    fn locate<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>> {
        Box::pin(async move {
            let found = self.search(name, 1).await?;
            Ok(found.into_iter().next().map(|p| p.position))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{suggestions, NominatimGeocoder, Place, DEFAULT_ENDPOINT};
    use crate::http::decode;
    use foundation::LatLon;
    use pretty_assertions::assert_eq;
    use url::Url;

    #[test]
    fn search_url_matches_the_public_api() {
        let geocoder = NominatimGeocoder::new(
            Url::parse(DEFAULT_ENDPOINT).expect("endpoint"),
            reqwest::Client::new(),
        );
        let url = geocoder.search_url("Dhaka City", 5);
        assert_eq!(
            url.as_str(),
            "https://nominatim.openstreetmap.org/search?format=json&q=Dhaka+City&limit=5"
        );
    }

    #[test]
    fn parses_string_coordinates_and_skips_bad_rows() {
        let body = br#"[
            {"place_id":1,"display_name":"Dhaka, Dhaka Division, Bangladesh","lat":"23.7643863","lon":"90.3890144"},
            {"place_id":2,"display_name":"Broken","lat":"north","lon":"90"}
        ]"#;
        let places: Vec<Place> = decode(body).expect("json");
        let found = suggestions(places);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].position, LatLon::new(23.7643863, 90.3890144));
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let places: Vec<Place> = decode(b"[]").expect("json");
        assert!(suggestions(places).is_empty());
    }
}
