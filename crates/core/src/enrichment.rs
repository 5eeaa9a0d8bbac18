use crate::error::EnrichmentError;
use crate::models::VideoResult;
use crate::traits::VideoSearch;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_YOUTUBE_API: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_MAX_VIDEOS: usize = 5;

const SEARCH_SUFFIX: &str = " tutorial education";

/// Educational video lookup against the YouTube Data API.
pub struct YouTubeSearcher {
    api_key: String,
    base_url: String,
    client: Client,
}

impl YouTubeSearcher {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EnrichmentError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_YOUTUBE_API.to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Same as [`VideoSearch::search`] but reports upstream failures.
    pub async fn try_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<VideoResult>, EnrichmentError> {
        let search_query = format!("{query}{SEARCH_SUFFIX}");
        let max_results = max_results.to_string();
        let url = Url::parse_with_params(
            &format!("{}/search", self.base_url),
            [
                ("key", self.api_key.as_str()),
                ("q", search_query.as_str()),
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("relevanceLanguage", "en"),
                ("videoDuration", "medium"),
                ("videoDefinition", "high"),
                ("order", "relevance"),
            ],
        )?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let details = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::BackendResponse { status, details });
        }

        let parsed: SearchResponse = response.json().await?;
        let videos: Vec<VideoResult> = parsed
            .items
            .into_iter()
            .filter_map(SearchItem::into_video)
            .collect();
        debug!(query, videos = videos.len(), "video search complete");
        Ok(videos)
    }
}

#[async_trait]
impl VideoSearch for YouTubeSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Vec<VideoResult> {
        match self.try_search(query, max_results).await {
            Ok(videos) => videos,
            Err(error) => {
                warn!(query, error = %error, "video search failed, continuing without videos");
                Vec::new()
            }
        }
    }
}

/// Used when no video search credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnrichment;

#[async_trait]
impl VideoSearch for NoEnrichment {
    async fn search(&self, _query: &str, _max_results: usize) -> Vec<VideoResult> {
        Vec::new()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchItem {
    fn into_video(self) -> Option<VideoResult> {
        let id = self.id.video_id?;
        Some(VideoResult {
            url: format!("https://www.youtube.com/watch?v={id}"),
            id,
            title: self.snippet.title,
            channel: self.snippet.channel_title,
            description: self.snippet.description,
            thumbnail_url: self
                .snippet
                .thumbnails
                .default
                .map(|thumbnail| thumbnail.url)
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_maps_snippets_to_videos() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "what is a derivative tutorial education"))
            .and(query_param("maxResults", "3"))
            .and(query_param("type", "video"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": { "kind": "youtube#video", "videoId": "abc123" },
                        "snippet": {
                            "title": "Derivatives explained",
                            "channelTitle": "Math Channel",
                            "description": "An intro to derivatives",
                            "thumbnails": { "default": { "url": "https://i.ytimg.com/vi/abc123/default.jpg" } }
                        }
                    },
                    {
                        "id": { "kind": "youtube#channel", "channelId": "UC1" },
                        "snippet": { "title": "Not a video" }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let searcher = YouTubeSearcher::new("yt-key").unwrap().with_base_url(server.uri());
        let videos = searcher.search("what is a derivative", 3).await;

        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "abc123");
        assert_eq!(videos[0].channel, "Math Channel");
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(videos[0].thumbnail_url, "https://i.ytimg.com/vi/abc123/default.jpg");
    }

    #[tokio::test]
    async fn upstream_failure_yields_no_videos() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let searcher = YouTubeSearcher::new("yt-key").unwrap().with_base_url(server.uri());
        assert!(matches!(
            searcher.try_search("entropy", 5).await,
            Err(EnrichmentError::BackendResponse { status: 403, .. })
        ));
        assert!(searcher.search("entropy", 5).await.is_empty());
    }

    #[tokio::test]
    async fn no_enrichment_is_always_empty() {
        assert!(NoEnrichment.search("anything", 5).await.is_empty());
    }
}
