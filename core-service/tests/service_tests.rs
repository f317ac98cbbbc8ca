//! End-to-end tests of the service lifecycle and control dispatch.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::music::LyricData;
use bridge_traits::playback::PlaybackDevice;
use bytes::Bytes;
use core_playback::device::DeviceCommand;
use core_playback::{PlaybackError, PlayerState, TrackDescriptor};
use core_runtime::config::SessionConfig;
use core_runtime::events::{
    CacheEvent, CacheKind, CoreEvent, PlaybackEvent, QueueEvent, QueueItemId,
};
use core_service::{ControlMessage, ControlReply, CoreDependencies, CoreError, CoreService};
use mockall::mock;
use provider_netease::Cookie;
use serde_json::json;
use tempfile::TempDir;

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    loaded: Vec<PathBuf>,
    empty: bool,
    volume: u8,
}

#[derive(Debug)]
struct FakeDevice(Mutex<DeviceState>);

impl FakeDevice {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(DeviceState {
            empty: true,
            ..DeviceState::default()
        })))
    }
}

#[async_trait]
impl PlaybackDevice for FakeDevice {
    async fn is_empty(&self) -> bool {
        self.0.lock().unwrap().empty
    }

    async fn load(&self, path: &Path) -> BridgeResult<bool> {
        let mut state = self.0.lock().unwrap();
        state.loaded.push(path.to_path_buf());
        state.empty = false;
        Ok(true)
    }

    async fn play(&self) -> BridgeResult<bool> {
        Ok(!self.0.lock().unwrap().empty)
    }

    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.0.lock().unwrap().empty = true;
        Ok(())
    }

    async fn position(&self) -> f64 {
        0.0
    }

    async fn set_volume(&self, level: u8) -> BridgeResult<()> {
        self.0.lock().unwrap().volume = level;
        Ok(())
    }
}

fn json_response(body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: Vec::new(),
        body: Bytes::from(body.to_string()),
    }
}

/// Answers the radio endpoint with two tracks and everything else with an
/// empty success envelope.
fn remote() -> Arc<MockHttpClient> {
    let mut http = MockHttpClient::new();
    http.expect_execute().returning(|request| {
        if request.url.contains("radio/get") {
            Ok(json_response(json!({
                "code": 200,
                "data": [
                    { "id": 101, "name": "First", "duration": 200000 },
                    { "id": 102, "name": "Second", "duration": 180000 }
                ]
            })))
        } else {
            Ok(json_response(json!({ "code": 200, "data": [] })))
        }
    });
    http.expect_download_stream()
        .returning(|_| Err(BridgeError::OperationFailed("offline".into())));
    Arc::new(http)
}

fn config(root: &Path) -> SessionConfig {
    SessionConfig::builder()
        .settings_dir(root.join("settings"))
        .build()
        .unwrap()
}

async fn start(root: &TempDir) -> (CoreService, Arc<FakeDevice>) {
    let device = FakeDevice::new();
    let deps = CoreDependencies::new(remote(), device.clone());
    let service = CoreService::init(config(root.path()), deps, None)
        .await
        .unwrap();
    (service, device)
}

async fn wait_for<F>(
    events: &mut tokio::sync::broadcast::Receiver<CoreEvent>,
    mut predicate: F,
) -> CoreEvent
where
    F: FnMut(&CoreEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_init_creates_directories() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;

    for dir in service.config().required_dirs() {
        assert!(dir.is_dir(), "{} missing", dir.display());
    }
    service.shutdown().await.unwrap();
    assert!(service.config().music_index_path().is_file());
}

#[tokio::test]
async fn test_unwritable_settings_dir_aborts_startup() {
    let root = tempfile::tempdir().unwrap();
    let blocker = root.path().join("settings");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let deps = CoreDependencies::new(remote(), FakeDevice::new());
    let result = CoreService::init(config(root.path()), deps, None).await;
    assert!(matches!(result, Err(CoreError::Startup { .. })));
}

#[tokio::test]
async fn test_init_message_applies_settings() {
    let root = tempfile::tempdir().unwrap();
    let (service, device) = start(&root).await;

    let reply = service
        .handle(ControlMessage::Init {
            quality: 320_000,
            cache_size: 1000,
            volume: Some(40),
        })
        .await
        .unwrap();
    assert_eq!(reply, ControlReply::Ack);
    assert_eq!(service.track_cache().stats().await.budget_bytes, 1000);

    match service.handle(ControlMessage::Status).await.unwrap() {
        ControlReply::Status { snapshot } => assert_eq!(snapshot.volume, 40),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(device.0.lock().unwrap().volume, 40);
}

#[tokio::test]
async fn test_init_message_rejects_unknown_quality() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;

    let result = service
        .handle(ControlMessage::Init {
            quality: 123,
            cache_size: 1000,
            volume: None,
        })
        .await;
    assert!(matches!(result, Err(CoreError::Config(_))));
}

#[tokio::test]
async fn test_delete_cache_drops_response_entry() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    service.api().cache().set("user_playlist1", json!([1, 2]), None);

    service
        .handle(ControlMessage::DeleteCache {
            key: "user_playlist1".into(),
        })
        .await
        .unwrap();
    assert!(service.api().cache().get("user_playlist1").is_none());
}

#[tokio::test]
async fn test_clear_lyric_cache_emits() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    let mut events = service.events().subscribe();
    service
        .lyric_cache()
        .put("7", &LyricData::default())
        .await
        .unwrap();

    service.handle(ControlMessage::ClearLyricCache).await.unwrap();
    assert!(service.lyric_cache().get("7").await.is_none());
    wait_for(&mut events, |e| {
        matches!(
            e,
            CoreEvent::Cache(CacheEvent::Cleared {
                kind: CacheKind::Lyric
            })
        )
    })
    .await;
}

#[tokio::test]
async fn test_load_local_then_status() {
    let root = tempfile::tempdir().unwrap();
    let (service, device) = start(&root).await;
    let mut events = service.events().subscribe();
    let file = root.path().join("song.mp3");
    std::fs::write(&file, b"audio").unwrap();

    service
        .handle(ControlMessage::Load {
            descriptor: TrackDescriptor::local(&file),
        })
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Playback(PlaybackEvent::Loaded { local: true, .. }))
    })
    .await;

    assert_eq!(device.0.lock().unwrap().loaded, vec![file]);
    match service.handle(ControlMessage::Status).await.unwrap() {
        ControlReply::Status { snapshot } => assert_eq!(snapshot.state, PlayerState::Playing),
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_fm_next_loads_feed_head() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    let mut events = service.events().subscribe();

    let reply = service.handle(ControlMessage::FmNext).await.unwrap();
    let ControlReply::FmTrack { track: Some(track) } = &reply else {
        panic!("unexpected reply {:?}", reply);
    };
    assert_eq!(track.id, 101);
    wait_for(&mut events, |e| {
        matches!(
            e,
            CoreEvent::Playback(PlaybackEvent::Loading { track_id: 101, .. })
        )
    })
    .await;

    let reply = service.handle(ControlMessage::FmNext).await.unwrap();
    assert!(matches!(
        reply,
        ControlReply::FmTrack { track: Some(ref t) } if t.id == 102
    ));
}

#[tokio::test]
async fn test_restore_session_and_logout() {
    let root = tempfile::tempdir().unwrap();
    let mut cookie = Cookie::new();
    cookie.insert("MUSIC_U".into(), "secret".into());

    let deps = CoreDependencies::new(remote(), FakeDevice::new());
    let service = CoreService::init(config(root.path()), deps, Some(cookie))
        .await
        .unwrap();
    assert!(service.api().cookies().is_logged_in());

    service.handle(ControlMessage::Logout).await.unwrap();
    assert!(!service.api().cookies().is_logged_in());
    assert!(service.api().cookies().snapshot().is_empty());
}

#[tokio::test]
async fn test_relayed_device_receives_commands() {
    let root = tempfile::tempdir().unwrap();
    let (deps, _device, mut commands) = CoreDependencies::relayed(remote());
    let service = CoreService::init(config(root.path()), deps, None)
        .await
        .unwrap();
    let file = root.path().join("song.flac");
    std::fs::write(&file, b"audio").unwrap();

    service
        .handle(ControlMessage::Load {
            descriptor: TrackDescriptor::local(&file),
        })
        .await
        .unwrap();

    let command = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match commands.recv().await {
                Some(DeviceCommand::Load { path }) => return path,
                Some(_) => continue,
                None => panic!("relay closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(command, file);
}

#[tokio::test]
async fn test_commands_after_shutdown_fail() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    service.shutdown().await.unwrap();

    let result = service.handle(ControlMessage::Play).await;
    assert!(matches!(
        result,
        Err(CoreError::Playback(PlaybackError::PlayerClosed))
    ));
}

#[tokio::test]
async fn test_queue_edits_reach_every_window() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    let mut first = service.events().subscribe();
    let mut second = service.events().subscribe();

    service
        .handle(ControlMessage::QueueAdd {
            items: vec![json!({ "id": 1 }), json!({ "id": 2 })],
            index: Some(0),
        })
        .await
        .unwrap();
    service
        .handle(ControlMessage::QueueDelete {
            id: QueueItemId::Str("1".into()),
        })
        .await
        .unwrap();

    for events in [&mut first, &mut second] {
        let added = wait_for(events, |e| matches!(e, CoreEvent::Queue(QueueEvent::Added { .. }))).await;
        assert_eq!(
            added,
            CoreEvent::Queue(QueueEvent::Added {
                items: vec![json!({ "id": 1 }), json!({ "id": 2 })],
                index: Some(0),
            })
        );
        let deleted =
            wait_for(events, |e| matches!(e, CoreEvent::Queue(QueueEvent::Deleted { .. }))).await;
        assert_eq!(
            deleted,
            CoreEvent::Queue(QueueEvent::Deleted {
                id: QueueItemId::Str("1".into())
            })
        );
    }
}

#[tokio::test]
async fn test_queue_shift_and_clear_are_relayed() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    let mut events = service.events().subscribe();

    service
        .handle(ControlMessage::QueueShift { index: -1 })
        .await
        .unwrap();
    service.handle(ControlMessage::QueueClear).await.unwrap();

    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Queue(QueueEvent::Shifted { index: -1 }))
    })
    .await;
    wait_for(&mut events, |e| matches!(e, CoreEvent::Queue(QueueEvent::Cleared))).await;
}

#[tokio::test]
async fn test_retained_queue_goes_to_next_connection_once() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;

    let reply = service.handle(ControlMessage::Connect).await.unwrap();
    assert_eq!(reply, ControlReply::Retained { items: Vec::new() });

    let items = vec![json!({ "id": 347230, "name": "Sunrise" })];
    let reply = service
        .handle(ControlMessage::Retain {
            items: items.clone(),
        })
        .await
        .unwrap();
    assert_eq!(reply, ControlReply::Ack);

    let reply = service.handle(ControlMessage::Connect).await.unwrap();
    assert_eq!(reply, ControlReply::Retained { items });
    let reply = service.handle(ControlMessage::Connect).await.unwrap();
    assert_eq!(reply, ControlReply::Retained { items: Vec::new() });
}

#[tokio::test]
async fn test_shutdown_empties_scratch_directory() {
    let root = tempfile::tempdir().unwrap();
    let (service, _) = start(&root).await;
    let tmp = service.config().tmp_dir();
    std::fs::create_dir_all(tmp.join("partial")).unwrap();
    std::fs::write(tmp.join("partial").join("347230.part"), b"half").unwrap();
    std::fs::write(tmp.join("stray"), b"x").unwrap();

    service.shutdown().await.unwrap();

    assert!(tmp.is_dir());
    assert_eq!(std::fs::read_dir(&tmp).unwrap().count(), 0);
    assert!(service.config().music_index_path().is_file());
}
