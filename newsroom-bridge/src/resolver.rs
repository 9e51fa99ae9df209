//! Clip resolution and playback seams
//!
//! The scheduler does not know how clips are made or shown. A
//! [`ClipResolver`] turns a job into a playable URL (generating it on the
//! backend when needed) and a [`ClipPlayer`] plays it until it ends.

use crate::error::{BridgeError, BridgeResult};
use crate::video_cache::{now_millis, CachedVideo, VideoCache};
use crate::video_queue::VideoJob;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A clip ready to play
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClip {
    pub url: String,
    pub anchor: String,
    pub text: String,
}

impl ResolvedClip {
    pub fn for_job(job: &VideoJob, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anchor: job.anchor.clone(),
            text: job.text.clone(),
        }
    }
}

/// Turns a job into playable media
#[async_trait]
pub trait ClipResolver: Send + Sync + 'static {
    async fn resolve(&self, job: &VideoJob) -> BridgeResult<ResolvedClip>;
}

/// Plays a clip; returns when playback reaches its natural end
#[async_trait]
pub trait ClipPlayer: Send + Sync + 'static {
    async fn play(&self, clip: &ResolvedClip) -> BridgeResult<()>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    anchor: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    article_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(alias = "video_url")]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Resolver that asks the backend to generate clips over HTTP
///
/// Consults the clip cache first when the job names an article, and records
/// freshly generated clips there.
pub struct HttpClipResolver {
    client: reqwest::Client,
    endpoint: String,
    cache: Option<Arc<Mutex<VideoCache>>>,
}

impl HttpClipResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BridgeError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<Mutex<VideoCache>>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn cached(&self, article_id: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let cache = cache.lock();
        cache
            .get(article_id, now_millis())
            .map(|entry| entry.url.clone())
    }

    fn remember(&self, article_id: &str, job: &VideoJob, url: &str) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let now = now_millis();
        let entry = CachedVideo {
            url: url.to_string(),
            prompt: job.text.clone(),
            generated: now,
        };
        if let Err(e) = cache.lock().put(article_id, entry, now) {
            warn!("Could not cache clip for article {}: {}", article_id, e);
        }
    }
}

#[async_trait]
impl ClipResolver for HttpClipResolver {
    async fn resolve(&self, job: &VideoJob) -> BridgeResult<ResolvedClip> {
        if let Some(url) = &job.resolved_url {
            return Ok(ResolvedClip::for_job(job, url.clone()));
        }

        if let Some(article_id) = job.article_id.as_deref() {
            if let Some(url) = self.cached(article_id) {
                debug!("Clip cache hit for article {}", article_id);
                return Ok(ResolvedClip::for_job(job, url));
            }
        }

        info!("Requesting clip for {} ({} chars)", job.anchor, job.text.len());
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest {
                anchor: &job.anchor,
                text: &job.text,
                article_id: job.article_id.as_deref(),
            })
            .send()
            .await
            .map_err(|e| BridgeError::ResolutionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::ResolutionFailed(format!(
                "generator returned {}: {}",
                status, body
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::ResolutionFailed(format!("bad generator reply: {}", e)))?;

        let url = match (reply.url, reply.error) {
            (Some(url), _) => url,
            (None, Some(error)) => return Err(BridgeError::ResolutionFailed(error)),
            (None, None) => {
                return Err(BridgeError::ResolutionFailed(
                    "generator reply has no url".to_string(),
                ))
            }
        };

        if let Some(article_id) = job.article_id.as_deref() {
            self.remember(article_id, job, &url);
        }
        Ok(ResolvedClip::for_job(job, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Priority;
    use crate::video_cache::{MemoryStore, DEFAULT_MAX_AGE};

    #[tokio::test]
    async fn test_prefilled_url_skips_generation() {
        let resolver =
            HttpClipResolver::new("http://127.0.0.1:9/unused", Duration::from_secs(1)).unwrap();
        let mut job = VideoJob::new("ray", "hello", Priority::Normal);
        job.resolved_url = Some("https://cdn/ready.mp4".into());

        let clip = resolver.resolve(&job).await.unwrap();
        assert_eq!(clip.url, "https://cdn/ready.mp4");
        assert_eq!(clip.anchor, "ray");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_generation() {
        let now = now_millis();
        let cache = Arc::new(Mutex::new(VideoCache::open(
            Box::new(MemoryStore::default()),
            DEFAULT_MAX_AGE,
            now,
        )));
        cache
            .lock()
            .put(
                "a7",
                CachedVideo {
                    url: "https://cdn/a7.mp4".into(),
                    prompt: "p".into(),
                    generated: now,
                },
                now,
            )
            .unwrap();

        let resolver = HttpClipResolver::new("http://127.0.0.1:9/unused", Duration::from_secs(1))
            .unwrap()
            .with_cache(cache);
        let mut job = VideoJob::new("ray", "hello", Priority::High);
        job.article_id = Some("a7".into());

        assert_eq!(resolver.resolve(&job).await.unwrap().url, "https://cdn/a7.mp4");
    }
}
