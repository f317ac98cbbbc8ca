//! Downloader tests against a mocked HTTP bridge.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_playback::cache::{md5_file, TrackCache};
use core_playback::download::{sweep_temp_dir, CacheTarget, DownloadRequest, Downloader};
use core_playback::PlaybackError;
use mockall::mock;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
    }
}

struct Fixture {
    root: TempDir,
    cache: Arc<TrackCache>,
}

impl Fixture {
    async fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let cache = Arc::new(TrackCache::new(
            root.path().join("cache/music"),
            root.path().join("cache/music-list"),
            1024 * 1024 * 1024,
        ));
        cache.init().await.unwrap();
        Self { root, cache }
    }

    fn downloader(&self, http: MockHttpClient) -> Downloader {
        Downloader::new(Arc::new(http), self.cache.clone())
    }

    fn request(&self, prebuffer: Option<u64>, md5: Option<String>) -> DownloadRequest {
        DownloadRequest {
            url: "http://m/1.mp3".to_string(),
            dest: self.root.path().join("tmp/1"),
            prebuffer_bytes: prebuffer,
            cache: Some(CacheTarget {
                key: "1".to_string(),
                file_name: "Song-1".to_string(),
                md5,
            }),
        }
    }

    async fn wait_until_cached(&self, key: &str) -> bool {
        for _ in 0..200 {
            if self.cache.contains(key).await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

fn serving(body: Vec<u8>) -> MockHttpClient {
    let mut http = MockHttpClient::new();
    http.expect_download_stream()
        .withf(|url| url == "http://m/1.mp3")
        .returning(move |_| Ok(Box::new(std::io::Cursor::new(body.clone()))));
    http
}

#[tokio::test]
async fn test_fetch_completes_and_caches_on_matching_digest() {
    let fx = Fixture::new().await;
    let body = vec![5u8; 300 * 1024];
    let expected = {
        let digest_src = fx.root.path().join("digest_src");
        std::fs::write(&digest_src, &body).unwrap();
        md5_file(&digest_src).await.unwrap()
    };

    let downloader = fx.downloader(serving(body));
    let path = downloader
        .fetch(fx.request(Some(256 * 1024), Some(expected)), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(path, fx.root.path().join("tmp/1"));
    assert!(fx.wait_until_cached("1").await);
    let cached = fx.cache.get("1").await.unwrap();
    assert_eq!(cached, fx.root.path().join("cache/music/Song-1"));
    assert_eq!(std::fs::metadata(cached).unwrap().len(), 300 * 1024);
}

#[tokio::test]
async fn test_digest_mismatch_is_not_cached() {
    let fx = Fixture::new().await;
    let downloader = fx.downloader(serving(vec![1u8; 1000]));

    let handle = downloader.spawn(fx.request(None, Some("ffff".to_string())));
    assert_eq!(handle.await.unwrap().unwrap(), 1000);

    assert!(!fx.cache.contains("1").await);
    assert!(fx.root.path().join("tmp/1").exists());
}

#[tokio::test]
async fn test_gate_opens_before_stream_ends() {
    let fx = Fixture::new().await;
    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    writer.write_all(&[9u8; 4096]).await.unwrap();

    let mut http = MockHttpClient::new();
    http.expect_download_stream()
        .return_once(move |_| Ok(Box::new(reader)));

    let downloader = fx.downloader(http);
    let path = downloader
        .fetch(fx.request(Some(1024), None), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(std::fs::metadata(&path).unwrap().len() >= 1024);
    assert!(!fx.cache.contains("1").await);
    drop(writer);
}

#[tokio::test]
async fn test_prebuffer_timeout_abandons_download() {
    let fx = Fixture::new().await;
    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    writer.write_all(&[9u8; 100]).await.unwrap();

    let mut http = MockHttpClient::new();
    http.expect_download_stream()
        .return_once(move |_| Ok(Box::new(reader)));

    let downloader = fx.downloader(http);
    let err = downloader
        .fetch(fx.request(Some(1024), None), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(matches!(err, PlaybackError::PrebufferTimeout(_)));
    assert!(err.is_transient());
    assert!(!fx.root.path().join("tmp/1").exists());
    drop(writer);
}

#[tokio::test]
async fn test_stream_error_fails_fetch() {
    let fx = Fixture::new().await;
    let mut http = MockHttpClient::new();
    http.expect_download_stream()
        .returning(|_| Err(BridgeError::OperationFailed("403".to_string())));

    let err = fx
        .downloader(http)
        .fetch(fx.request(Some(1024), None), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::Provider(_)));
}

#[tokio::test]
async fn test_sweep_removes_only_old_unkept_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["5", "6", "7-next"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let max_age = Duration::from_secs(8 * 60);

    let removed = sweep_temp_dir(dir.path(), max_age, &[], SystemTime::now())
        .await
        .unwrap();
    assert_eq!(removed, 0);

    let later = SystemTime::now() + Duration::from_secs(9 * 60);
    let removed = sweep_temp_dir(dir.path(), max_age, &["5".to_string()], later)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(dir.path().join("5").exists());
    assert!(!dir.path().join("6").exists());
}

#[tokio::test]
async fn test_sweep_missing_directory_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let removed = sweep_temp_dir(
        &dir.path().join("absent"),
        Duration::from_secs(1),
        &[],
        SystemTime::now(),
    )
    .await
    .unwrap();
    assert_eq!(removed, 0);
}
