//! Enrichment chain against local HTTP responders
//!
//! Each responder is a bare `TcpListener` answering every request with one
//! canned status and body, optionally after a delay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moodmix_common::config::EnrichmentConfig;
use moodmix_engine::enrich::{EnrichmentSource, LookupQuery, MetadataEnricher};
use moodmix_engine::TrackRecord;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const PLACEHOLDER: &str = "https://example.com/default_artwork.png";

#[derive(Clone)]
struct Canned {
    status: u16,
    content_type: &'static str,
    body: String,
    delay: Duration,
}

impl Canned {
    fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn html(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/html",
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Start a responder; returns its base URL and a request counter
async fn spawn_responder(canned: Canned) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let canned = canned.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                tokio::time::sleep(canned.delay).await;

                let reason = match canned.status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    canned.status,
                    reason,
                    canned.content_type,
                    canned.body.len(),
                    canned.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/search", addr), requests)
}

fn config(provider_url: &str, video_url: &str) -> EnrichmentConfig {
    EnrichmentConfig {
        provider_base_url: provider_url.to_string(),
        video_base_url: video_url.to_string(),
        provider_timeout_ms: 300,
        video_timeout_ms: 300,
        provider_rate_limit_ms: 0,
        placeholder_artwork: PLACEHOLDER.to_string(),
        ..Default::default()
    }
}

const PROVIDER_HIT: &str = r#"{"resultCount":1,"results":[{"artworkUrl100":"https://is1.mzstatic.com/image/abc/100x100bb.jpg","previewUrl":"https://audio.example/preview.m4a"}]}"#;
const PROVIDER_EMPTY: &str = r#"{"resultCount":0,"results":[]}"#;
const VIDEO_PAGE: &str = r#"<html><script>var ytInitialData = {"videoRenderer":{"videoId":"dQw4w9WgXcQ"}};</script></html>"#;

#[tokio::test]
async fn test_provider_hit() {
    let (provider, _) = spawn_responder(Canned::json(200, PROVIDER_HIT)).await;
    let (video, video_requests) = spawn_responder(Canned::html(200, VIDEO_PAGE)).await;
    let enricher = MetadataEnricher::from_config(&config(&provider, &video)).unwrap();

    let result = enricher
        .resolve_query(&LookupQuery::new("Hello", "Adele"))
        .await;
    assert_eq!(result.source, EnrichmentSource::Provider);
    assert_eq!(result.artwork, "https://is1.mzstatic.com/image/abc/300x300bb.jpg");
    assert_eq!(result.preview.as_deref(), Some("https://audio.example/preview.m4a"));
    assert!(result.fallback_video.is_none());
    assert_eq!(video_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_provider_falls_back_to_video_and_caches() {
    let (provider, provider_requests) = spawn_responder(Canned::json(200, PROVIDER_EMPTY)).await;
    let (video, _) = spawn_responder(Canned::html(200, VIDEO_PAGE)).await;
    let enricher = MetadataEnricher::from_config(&config(&provider, &video)).unwrap();
    let query = LookupQuery::new("Obscure Song", "Someone");

    let result = enricher.resolve_query(&query).await;
    assert_eq!(result.source, EnrichmentSource::VideoFallback);
    assert_eq!(
        result.fallback_video.as_deref(),
        Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
    );
    assert_eq!(
        result.artwork,
        "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
    );
    assert!(result.preview.is_none());

    let again = enricher.resolve_query(&query).await;
    assert_eq!(again, result);
    assert_eq!(provider_requests.load(Ordering::SeqCst), 1);
    assert_eq!(enricher.cached_entries().await, 1);
}

#[tokio::test]
async fn test_server_error_proceeds_without_caching() {
    let (provider, provider_requests) = spawn_responder(Canned::json(500, "{}")).await;
    let (video, _) = spawn_responder(Canned::html(200, VIDEO_PAGE)).await;
    let enricher = MetadataEnricher::from_config(&config(&provider, &video)).unwrap();
    let query = LookupQuery::new("Song", "Artist");

    let result = enricher.resolve_query(&query).await;
    assert_eq!(result.source, EnrichmentSource::VideoFallback);

    enricher.resolve_query(&query).await;
    assert_eq!(provider_requests.load(Ordering::SeqCst), 2);
    assert_eq!(enricher.cached_entries().await, 0);
}

#[tokio::test]
async fn test_timeout_and_not_found_yield_defaults() {
    let (provider, _) =
        spawn_responder(Canned::json(200, PROVIDER_HIT).delayed(Duration::from_secs(3))).await;
    let (video, _) = spawn_responder(Canned::html(404, "not found")).await;
    let enricher = MetadataEnricher::from_config(&config(&provider, &video)).unwrap();

    let started = std::time::Instant::now();
    let result = enricher
        .resolve_query(&LookupQuery::new("Song", "Artist"))
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(result.source, EnrichmentSource::None);
    assert_eq!(result.artwork, PLACEHOLDER);
    assert!(result.preview.is_none());
    assert!(result.fallback_video.is_none());
}

#[tokio::test]
async fn test_unparseable_provider_body() {
    let (provider, _) = spawn_responder(Canned::json(200, "<html>maintenance</html>")).await;
    let (video, _) = spawn_responder(Canned::html(200, "<html>no results</html>")).await;
    let enricher = MetadataEnricher::from_config(&config(&provider, &video)).unwrap();

    let result = enricher
        .resolve_query(&LookupQuery::new("Song", "Artist"))
        .await;
    assert_eq!(result.source, EnrichmentSource::None);
    assert_eq!(result.artwork, PLACEHOLDER);
}

#[tokio::test]
async fn test_disabled_config_makes_no_requests() {
    let (provider, provider_requests) = spawn_responder(Canned::json(200, PROVIDER_HIT)).await;
    let mut disabled = config(&provider, &provider);
    disabled.enabled = false;
    let enricher = MetadataEnricher::from_config(&disabled).unwrap();

    let result = enricher
        .resolve_query(&LookupQuery::new("Hello", "Adele"))
        .await;
    assert_eq!(result.source, EnrichmentSource::None);
    assert_eq!(provider_requests.load(Ordering::SeqCst), 0);
}

fn track(index: usize) -> TrackRecord {
    TrackRecord {
        index,
        name: format!("Song {}", index),
        artists: vec![format!("Artist {}", index)],
        album: String::new(),
        release_year: None,
        duration_ms: None,
        features: vec![0.5],
    }
}

#[tokio::test]
async fn test_rate_limited_batch_reaches_provider() {
    let (provider, provider_requests) = spawn_responder(Canned::json(200, PROVIDER_HIT)).await;
    let (video, video_requests) = spawn_responder(Canned::html(200, VIDEO_PAGE)).await;
    let mut spaced = config(&provider, &video);
    spaced.provider_rate_limit_ms = 100;
    let enricher = MetadataEnricher::from_config(&spaced).unwrap();

    // Queueing for the provider takes well past the 300 ms lookup timeout
    let tracks: Vec<TrackRecord> = (0..8).map(track).collect();
    let refs: Vec<&TrackRecord> = tracks.iter().collect();
    let started = std::time::Instant::now();
    let results = enricher.resolve_many(&refs).await;
    assert!(started.elapsed() >= Duration::from_millis(700));

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.source == EnrichmentSource::Provider));
    assert_eq!(provider_requests.load(Ordering::SeqCst), 8);
    assert_eq!(video_requests.load(Ordering::SeqCst), 0);
    assert_eq!(enricher.cached_entries().await, 8);
}
