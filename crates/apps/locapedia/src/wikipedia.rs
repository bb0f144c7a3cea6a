//! MediaWiki action API adapter for geosearch, page extracts and page
//! coordinates.

use std::collections::BTreeMap;

use foundation::LatLon;
use scene::NO_DESCRIPTION;
use serde::Deserialize;
use streaming::{BoxFuture, GeoHit, GeoQuery, GeoSource, PageDetail, SourceError};
use url::Url;

use crate::http::get_json;

pub const DEFAULT_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const GEOSEARCH_LIMIT: &str = "100";

#[derive(Debug, Deserialize)]
struct Response<Q> {
    query: Option<Q>,
}

#[derive(Debug, Deserialize)]
struct GeosearchQuery {
    geosearch: Vec<GeosearchItem>,
}

#[derive(Debug, Deserialize)]
struct GeosearchItem {
    title: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    extract: Option<String>,
    original: Option<PageImage>,
    #[serde(default)]
    coordinates: Vec<Coordinate>,
    missing: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PageImage {
    source: String,
}

#[derive(Debug, Deserialize)]
struct Coordinate {
    lat: f64,
    lon: f64,
}

pub struct WikipediaSource {
    endpoint: Url,
    client: reqwest::Client,
}

impl WikipediaSource {
    pub fn new(endpoint: Url, client: reqwest::Client) -> Self {
        Self { endpoint, client }
    }

    fn url(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .extend_pairs(params.iter().copied())
            .append_pair("origin", "*");
        url
    }

    pub fn geosearch_url(&self, query: GeoQuery) -> Url {
        let radius = query.radius_m.to_string();
        let coord = format!("{}|{}", query.center.lat, query.center.lon);
        self.url(&[
            ("list", "geosearch"),
            ("gslimit", GEOSEARCH_LIMIT),
            ("gsradius", &radius),
            ("gscoord", &coord),
        ])
    }

    pub fn detail_url(&self, title: &str) -> Url {
        self.url(&[
            ("titles", title),
            ("prop", "extracts|pageimages"),
            ("exintro", "1"),
            ("piprop", "original"),
        ])
    }

    pub fn coordinates_url(&self, title: &str) -> Url {
        self.url(&[("titles", title), ("prop", "coordinates"), ("cllimit", "1")])
    }
}

fn first_page(response: Response<PagesQuery>) -> Option<Page> {
    let page = response.query?.pages.into_values().next()?;
    page.missing.is_none().then_some(page)
}

fn geosearch_hits(response: Response<GeosearchQuery>) -> Result<Vec<GeoHit>, SourceError> {
    let query = response
        .query
        .ok_or_else(|| SourceError::Decode("invalid response structure".into()))?;
    Ok(query
        .geosearch
        .into_iter()
        .map(|item| GeoHit {
            title: item.title,
            position: LatLon::new(item.lat, item.lon),
        })
        .collect())
}

fn page_detail(response: Response<PagesQuery>) -> Option<PageDetail> {
    let page = first_page(response)?;
    Some(PageDetail {
        full_text: page
            .extract
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        image_url: page.original.map(|image| image.source),
    })
}

fn page_coordinates(response: Response<PagesQuery>) -> Option<LatLon> {
    let page = first_page(response)?;
    page.coordinates
        .first()
        .map(|c| LatLon::new(c.lat, c.lon))
}

impl GeoSource for WikipediaSource {
    fn geosearch(&self, query: GeoQuery) -> BoxFuture<'_, Result<Vec<GeoHit>, SourceError>> {
        let url = self.geosearch_url(query);
        Box::pin(async move { geosearch_hits(get_json(&self.client, url).await?) })
    }

    fn page_detail<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, Result<Option<PageDetail>, SourceError>> {
        let url = self.detail_url(title);
        Box::pin(async move { Ok(page_detail(get_json(&self.client, url).await?)) })
    }

    fn title_coordinates<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>> {
        let url = self.coordinates_url(title);
        Box::pin(async move { Ok(page_coordinates(get_json(&self.client, url).await?)) })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        geosearch_hits, page_coordinates, page_detail, Response, WikipediaSource, DEFAULT_ENDPOINT,
    };
    use crate::http::decode;
    use foundation::LatLon;
    use pretty_assertions::assert_eq;
    use scene::NO_DESCRIPTION;
    use streaming::{GeoQuery, SourceError};
    use url::Url;

    fn source() -> WikipediaSource {
        WikipediaSource::new(
            Url::parse(DEFAULT_ENDPOINT).expect("endpoint"),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn geosearch_url_carries_clamped_radius_and_coord() {
        let url = source().geosearch_url(GeoQuery::new(LatLon::new(23.8041, 90.4152), 50_000.0));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("list".into(), "geosearch".into())));
        assert!(pairs.contains(&("gsradius".into(), "10000".into())));
        assert!(pairs.contains(&("gscoord".into(), "23.8041|90.4152".into())));
        assert!(pairs.contains(&("gslimit".into(), "100".into())));
    }

    #[test]
    fn detail_url_encodes_title() {
        let url = source().detail_url("Lalbagh Fort & Gardens");
        let titles = url
            .query_pairs()
            .find(|(k, _)| k == "titles")
            .map(|(_, v)| v.into_owned());
        assert_eq!(titles.as_deref(), Some("Lalbagh Fort & Gardens"));
    }

    #[test]
    fn parses_geosearch_items() {
        let body = br#"{"batchcomplete":"","query":{"geosearch":[
            {"pageid":1,"ns":0,"title":"Lalbagh Fort","lat":23.7188,"lon":90.3883,"dist":12.3,"primary":""},
            {"pageid":2,"ns":0,"title":"Star Mosque","lat":23.7147,"lon":90.4015,"dist":40.1,"primary":""}
        ]}}"#;
        let hits = geosearch_hits(decode(body).expect("json")).expect("hits");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].title, "Star Mosque");
        assert_eq!(hits[1].position, LatLon::new(23.7147, 90.4015));
    }

    #[test]
    fn geosearch_without_query_is_a_decode_error() {
        let response: Response<_> = decode(br#"{"error":{"code":"badcoord"}}"#).expect("json");
        assert!(matches!(geosearch_hits(response), Err(SourceError::Decode(_))));
    }

    #[test]
    fn parses_page_detail_with_image() {
        let body = br#"{"query":{"pages":{"123":{"pageid":123,"title":"Lalbagh Fort",
            "extract":"<p><b>Lalbagh Fort</b> is a Mughal fort.</p>",
            "original":{"source":"https://upload.test/lalbagh.jpg","width":800,"height":600}}}}}"#;
        let detail = page_detail(decode(body).expect("json")).expect("detail");
        assert_eq!(detail.image_url.as_deref(), Some("https://upload.test/lalbagh.jpg"));
        assert!(detail.full_text.contains("Mughal fort"));
    }

    #[test]
    fn page_without_extract_uses_fallback_text() {
        let body = br#"{"query":{"pages":{"9":{"pageid":9,"title":"Bare"}}}}"#;
        let detail = page_detail(decode(body).expect("json")).expect("detail");
        assert_eq!(detail.full_text, NO_DESCRIPTION);
        assert_eq!(detail.image_url, None);
    }

    #[test]
    fn coordinates_present_and_missing() {
        let found = br#"{"query":{"pages":{"5":{"pageid":5,"title":"Star Mosque",
            "coordinates":[{"lat":23.7147,"lon":90.4015,"primary":"","globe":"earth"}]}}}}"#;
        assert_eq!(
            page_coordinates(decode(found).expect("json")),
            Some(LatLon::new(23.7147, 90.4015))
        );

        let missing = br#"{"query":{"pages":{"-1":{"ns":0,"title":"Atlantis","missing":""}}}}"#;
        assert_eq!(page_coordinates(decode(missing).expect("json")), None);
    }
}
