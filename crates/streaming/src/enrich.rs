use futures_util::future::join_all;
use scene::Point;
use tracing::{debug, warn};

use crate::request::GeoQuery;
use crate::source::{GeoSource, SourceError};

/// Runs one geosearch and enriches every hit with its page detail.
///
/// Detail calls run concurrently and fail independently: a failed or empty
/// detail yields a point with the fallback description and no image. Only a
/// failed geosearch fails the whole fetch.
pub async fn fetch_points(source: &dyn GeoSource, query: GeoQuery) -> Result<Vec<Point>, SourceError> {
    let hits = source.geosearch(query).await?;
    debug!(
        hits = hits.len(),
        radius_m = query.radius_m,
        center = %query.center,
        "geosearch returned"
    );

    let details = join_all(hits.iter().map(|hit| source.page_detail(&hit.title))).await;

    let points = hits
        .into_iter()
        .zip(details)
        .map(|(hit, detail)| match detail {
            Ok(Some(detail)) => Point::new(hit.title, hit.position, detail.full_text, detail.image_url),
            Ok(None) => Point::without_detail(hit.title, hit.position),
            Err(err) => {
                warn!(title = %hit.title, error = %err, "page detail failed");
                Point::without_detail(hit.title, hit.position)
            }
        })
        .collect();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::fetch_points;
    use crate::request::GeoQuery;
    use crate::source::{BoxFuture, GeoHit, GeoSource, PageDetail, SourceError};
    use foundation::LatLon;
    use pretty_assertions::assert_eq;
    use scene::NO_DESCRIPTION;

    struct TwoHits {
        geosearch_fails: bool,
    }

    impl GeoSource for TwoHits {
        fn geosearch(&self, _query: GeoQuery) -> BoxFuture<'_, Result<Vec<GeoHit>, SourceError>> {
            let fails = self.geosearch_fails;
            Box::pin(async move {
                if fails {
                    return Err(SourceError::Timeout);
                }
                Ok(vec![
                    GeoHit {
                        title: "Curzon Hall".into(),
                        position: LatLon::new(23.7268, 90.4006),
                    },
                    GeoHit {
                        title: "Baldha Garden".into(),
                        position: LatLon::new(23.7166, 90.4187),
                    },
                ])
            })
        }

        fn page_detail<'a>(
            &'a self,
            title: &'a str,
        ) -> BoxFuture<'a, Result<Option<PageDetail>, SourceError>> {
            Box::pin(async move {
                if title == "Baldha Garden" {
                    return Err(SourceError::Transport("connection reset".into()));
                }
                Ok(Some(PageDetail {
                    full_text: "<p>Curzon Hall is a British Raj-era building.</p>".into(),
                    image_url: Some("https://img.test/curzon.jpg".into()),
                }))
            })
        }

        fn title_coordinates<'a>(
            &'a self,
            _title: &'a str,
        ) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn query() -> GeoQuery {
        GeoQuery::new(LatLon::new(23.8041, 90.4152), 1000.0)
    }

    #[tokio::test]
    async fn every_hit_is_enriched_and_detail_failures_fall_back() {
        let points = fetch_points(&TwoHits { geosearch_fails: false }, query())
            .await
            .expect("fetch");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].short_text, "Curzon Hall is a British Raj-era building.");
        assert_eq!(points[0].image_url.as_deref(), Some("https://img.test/curzon.jpg"));
        assert_eq!(points[1].title, "Baldha Garden");
        assert_eq!(points[1].full_text, NO_DESCRIPTION);
        assert_eq!(points[1].image_url, None);
    }

    #[tokio::test]
    async fn geosearch_failure_fails_the_fetch() {
        let err = fetch_points(&TwoHits { geosearch_fails: true }, query())
            .await
            .expect_err("geosearch fails");
        assert_eq!(err, SourceError::Timeout);
    }
}
