//! Review scraping for places we already know the id of.

use std::collections::HashMap;

use leadscout_shared::{LeadScoutError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::poller::{Clock, JobPoller};
use crate::SearchProvider;

/// Actor that scrapes reviews for a list of place ids.
pub const REVIEWS_ACTOR: &str = "compass~google-maps-reviews-scraper";

const MAX_REVIEWS_LIMIT: u32 = 1000;

/// Which places to fetch reviews for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    place_ids: Vec<String>,
    max_reviews: u32,
    language: String,
}

impl ReviewRequest {
    /// At least one non-blank place id; `max_reviews` in `1..=1000`.
    pub fn new(place_ids: Vec<String>, max_reviews: u32) -> Result<Self> {
        if place_ids.is_empty() {
            return Err(LeadScoutError::validation(
                "at least one place id must be provided",
            ));
        }
        if place_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(LeadScoutError::validation("place ids cannot be blank"));
        }
        if !(1..=MAX_REVIEWS_LIMIT).contains(&max_reviews) {
            return Err(LeadScoutError::validation(format!(
                "max reviews must be between 1 and {MAX_REVIEWS_LIMIT}, got {max_reviews}"
            )));
        }

        Ok(Self {
            place_ids: place_ids.into_iter().map(|id| id.trim().to_string()).collect(),
            max_reviews,
            language: "en".to_string(),
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn place_ids(&self) -> &[String] {
        &self.place_ids
    }

    fn actor_input(&self) -> serde_json::Value {
        serde_json::json!({
            "placeIds": self.place_ids,
            "maxReviews": self.max_reviews,
            "language": self.language,
        })
    }
}

/// A single review as returned by the reviews actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub place_id: String,
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default, alias = "reviewText")]
    pub text: Option<String>,
    #[serde(default, alias = "stars")]
    pub rating: Option<f64>,
    #[serde(default, rename = "name")]
    pub author_name: Option<String>,
    #[serde(default, rename = "reviewUrl")]
    pub url: Option<String>,
    #[serde(default, rename = "publishedAtDate")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub review_image_urls: Vec<String>,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub response_date: Option<String>,
}

impl Review {
    fn has_valid_rating(&self) -> bool {
        self.rating.is_none_or(|r| (1.0..=5.0).contains(&r))
    }
}

/// Reviews for one place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceReviews {
    pub place_id: String,
    pub reviews: Vec<Review>,
}

/// Reviews grouped by place, in the order the places were requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewsByPlace {
    pub places: Vec<PlaceReviews>,
    pub total_reviews: usize,
    pub total_places: usize,
    /// Items that could not be decoded or had an out-of-range rating.
    pub skipped: usize,
}

/// Group reviews under the requested place ids. Reviews for other places are dropped.
fn group_reviews(place_ids: &[String], reviews: Vec<Review>, skipped: usize) -> ReviewsByPlace {
    let mut by_place: HashMap<&str, Vec<Review>> =
        place_ids.iter().map(|id| (id.as_str(), Vec::new())).collect();
    let mut skipped = skipped;

    for review in reviews {
        if !review.has_valid_rating() {
            skipped += 1;
            continue;
        }
        match by_place.get_mut(review.place_id.as_str()) {
            Some(bucket) => bucket.push(review),
            None => warn!(place_id = %review.place_id, "review for unrequested place"),
        }
    }

    let mut places = Vec::with_capacity(place_ids.len());
    for id in place_ids {
        if let Some(reviews) = by_place.remove(id.as_str()) {
            places.push(PlaceReviews {
                place_id: id.clone(),
                reviews,
            });
        }
    }

    ReviewsByPlace {
        total_reviews: places.iter().map(|p| p.reviews.len()).sum(),
        total_places: places.len(),
        places,
        skipped,
    }
}

/// Run the reviews actor for `request` and group what comes back.
#[instrument(skip_all, fields(places = request.place_ids.len()))]
pub async fn fetch_reviews<P: SearchProvider, C: Clock>(
    poller: &JobPoller<P, C>,
    request: &ReviewRequest,
) -> Result<ReviewsByPlace> {
    let mut job = poller.start(REVIEWS_ACTOR, &request.actor_input()).await?;
    let dataset_id = poller.await_completion(&mut job).await?;
    let fetched = poller.fetch_dataset::<Review>(&dataset_id).await?;

    let grouped = group_reviews(&request.place_ids, fetched.items, fetched.skipped);
    info!(
        total_reviews = grouped.total_reviews,
        total_places = grouped.total_places,
        skipped = grouped.skipped,
        "fetched reviews"
    );
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::tests::{ScriptedProvider, snapshot};
    use crate::poller::{ManualClock, PollPolicy};

    fn review(place: &str, text: &str) -> Review {
        serde_json::from_value(serde_json::json!({ "placeId": place, "text": text })).unwrap()
    }

    #[test]
    fn request_validation() {
        assert!(ReviewRequest::new(vec![], 10).is_err());
        assert!(ReviewRequest::new(vec!["  ".into()], 10).is_err());
        assert!(ReviewRequest::new(vec!["abc".into()], 0).is_err());
        assert!(ReviewRequest::new(vec!["abc".into()], 1001).is_err());

        let request = ReviewRequest::new(vec![" abc ".into()], 50).unwrap();
        assert_eq!(request.place_ids(), ["abc"]);
        let input = request.actor_input();
        assert_eq!(input["placeIds"][0], "abc");
        assert_eq!(input["maxReviews"], 50);
        assert_eq!(input["language"], "en");
    }

    #[test]
    fn review_accepts_alternate_field_names() {
        let review: Review = serde_json::from_value(serde_json::json!({
            "placeId": "p1",
            "reviewText": "Great service",
            "stars": 5,
            "name": "Sam",
            "reviewUrl": "https://maps.example/r/1",
            "publishedAtDate": "2024-03-01T10:00:00Z",
            "likesCount": 2,
            "reviewImageUrls": ["https://img.example/1.jpg"]
        }))
        .unwrap();
        assert_eq!(review.text.as_deref(), Some("Great service"));
        assert_eq!(review.rating, Some(5.0));
        assert_eq!(review.author_name.as_deref(), Some("Sam"));
        assert_eq!(review.review_image_urls.len(), 1);
    }

    #[test]
    fn grouping_keeps_request_order_and_drops_unknown_places() {
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let reviews = vec![
            review("a", "one"),
            review("zzz", "stray"),
            review("b", "two"),
            review("a", "three"),
        ];

        let grouped = group_reviews(&ids, reviews, 0);
        let order: Vec<_> = grouped.places.iter().map(|p| p.place_id.as_str()).collect();
        assert_eq!(order, ["b", "a", "c"]);
        assert_eq!(grouped.places[1].reviews.len(), 2);
        assert!(grouped.places[2].reviews.is_empty());
        assert_eq!(grouped.total_reviews, 3);
        assert_eq!(grouped.total_places, 3);
    }

    #[test]
    fn out_of_range_rating_is_skipped() {
        let mut bad = review("a", "odd");
        bad.rating = Some(9.0);
        let grouped = group_reviews(&["a".to_string()], vec![bad, review("a", "ok")], 1);
        assert_eq!(grouped.total_reviews, 1);
        assert_eq!(grouped.skipped, 2);
    }

    #[tokio::test]
    async fn fetch_reviews_runs_reviews_actor() {
        let provider = ScriptedProvider::new(
            vec![snapshot("RUNNING", None), snapshot("SUCCEEDED", Some("ds-r"))],
            vec![
                serde_json::json!({ "placeId": "p1", "text": "Prompt and tidy", "stars": 5 }),
                serde_json::json!({ "placeId": "p1", "text": "Fair price", "stars": 4 }),
                serde_json::json!({ "text": "no place id" }),
            ],
        );
        let poller = JobPoller::new(provider, ManualClock::new(), PollPolicy::default());
        let request = ReviewRequest::new(vec!["p1".into()], 20).unwrap();

        let grouped = fetch_reviews(&poller, &request).await.unwrap();
        assert_eq!(grouped.total_reviews, 2);
        assert_eq!(grouped.skipped, 1);
        assert_eq!(grouped.places[0].reviews[1].text.as_deref(), Some("Fair price"));

        let starts = poller.provider().starts.lock().unwrap();
        assert_eq!(starts[0].0, REVIEWS_ACTOR);
        assert_eq!(starts[0].1["maxReviews"], 20);
    }
}
