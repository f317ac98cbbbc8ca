//! Request pipeline and endpoint tests against a mocked HTTP bridge.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::music::MusicProvider;
use bytes::Bytes;
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use mockall::mock;
use provider_netease::{ApiSettings, Cookie, CookieStore, NeteaseApi, NeteaseError};

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
    }
}

fn ok_json(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Bytes::from(body.to_string()),
    }
}

fn body_text(request: &HttpRequest) -> String {
    request
        .body
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

fn api_with(http: MockHttpClient, settings: ApiSettings) -> NeteaseApi {
    NeteaseApi::new(Arc::new(http), settings, CookieStore::new())
}

#[tokio::test]
async fn test_song_url_uses_eapi_with_pc_cookie() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| {
            let cookie = req.header_value("Cookie").unwrap_or_default();
            req.url == "https://interface.music.163.com/eapi/song/enhance/player/url/v1"
                && cookie.contains("os=pc")
                && cookie.contains("MUSIC_A=")
                && cookie.contains("_ntes_nuid=")
                && cookie.contains("appver=8.7.01")
                && body_text(req).starts_with("params=")
                && req.header_value("Referer").is_none()
        })
        .times(1)
        .returning(|_| {
            Ok(ok_json(
                r#"{"code":200,"data":[{"url":"http://m/1.flac","md5":"ABC","type":"flac"}]}"#,
            ))
        });

    let api = api_with(http, ApiSettings::default());
    let url = api.song_url(1, 999_000).await.unwrap().unwrap();
    assert_eq!(url.url, "http://m/1.flac");
    assert_eq!(url.md5.as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_song_url_falls_back_on_free_trial() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| req.url.ends_with("/player/url/v1"))
        .times(1)
        .returning(|_| {
            Ok(ok_json(
                r#"{"code":200,"data":[{"url":"http://m/trial.mp3","freeTrialInfo":{"start":0,"end":30}}]}"#,
            ))
        });
    http.expect_execute()
        .withf(|req| req.url.ends_with("/song/enhance/download/url"))
        .times(1)
        .returning(|_| {
            Ok(ok_json(
                r#"{"code":200,"data":{"url":"http://m/full.mp3","md5":"d41d","type":"mp3"}}"#,
            ))
        });

    let api = api_with(http, ApiSettings::default());
    let url = api.song_url(7, 192_000).await.unwrap().unwrap();
    assert_eq!(url.url, "http://m/full.mp3");
}

#[tokio::test]
async fn test_song_url_none_when_both_endpoints_offer_nothing() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .times(2)
        .returning(|_| Ok(ok_json(r#"{"code":200,"data":[]}"#)));

    let api = api_with(http, ApiSettings::default());
    assert!(api.song_url(7, 128_000).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remote_rejection() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .returning(|_| Ok(ok_json(r#"{"code":301,"msg":"need login"}"#)));

    let api = api_with(http, ApiSettings::default());
    let err = api.personal_fm().await.unwrap_err();
    assert!(matches!(err, NeteaseError::Remote { status: 301 }));
    assert!(err.is_remote_rejection());
}

#[tokio::test]
async fn test_http_status_used_when_code_missing() {
    let mut http = MockHttpClient::new();
    http.expect_execute().returning(|_| {
        Ok(HttpResponse {
            status: 503,
            headers: Vec::new(),
            body: Bytes::from_static(b"{}"),
        })
    });

    let api = api_with(http, ApiSettings::default());
    let err = api.account().await.unwrap_err();
    assert!(matches!(err, NeteaseError::Remote { status: 503 }));
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .returning(|_| Err(BridgeError::Timeout(8000)));

    let api = api_with(http, ApiSettings::default());
    let err = api.lyric(1).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_lyric_plain_request() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| {
            let body = body_text(req);
            req.url == "http://music.163.com/api/song/lyric?_nmclfl=1"
                && req.header_value("Referer") == Some("music.163.com")
                && req.header_value("X-Real-IP") == Some("118.88.88.88")
                && req.header_value("Cookie") == Some("os=ios")
                && req.header_value("Content-Type")
                    == Some("application/x-www-form-urlencoded")
                && body.contains("id=42")
                && body.contains("tv=-1")
                && body.contains("kv=-1")
        })
        .times(1)
        .returning(|_| {
            Ok(ok_json(
                r#"{"code":200,"lrc":{"lyric":"[00:01.00]a\n[00:03.50]b"},"tlyric":{"lyric":""}}"#,
            ))
        });

    let settings = ApiSettings {
        https: false,
        foreign: true,
        ..ApiSettings::default()
    };
    let api = api_with(http, settings);
    let lyric = MusicProvider::lyric(&api, 42).await.unwrap();
    assert_eq!(lyric.original.len(), 2);
    assert_eq!(lyric.original[1].time, 3.5);
    assert!(lyric.translation.is_empty());
}

#[tokio::test]
async fn test_set_cookie_merged_and_broadcast() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();

    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| req.url == "https://music.163.com/weapi/w/nuser/account/get")
        .times(1)
        .returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: vec![
                    (
                        "set-cookie".to_string(),
                        "MUSIC_U=secret; Max-Age=1296000; Domain=.music.163.com; Path=/".to_string(),
                    ),
                    ("set-cookie".to_string(), "__csrf=tok; Path=/".to_string()),
                ],
                body: Bytes::from_static(
                    br#"{"code":200,"profile":{"userId":99,"nickname":"listener"}}"#,
                ),
            })
        });
    http.expect_execute()
        .withf(|req| {
            let cookie = req.header_value("Cookie").unwrap_or_default();
            req.url == "https://interface.music.163.com/eapi/song/enhance/player/url/v1"
                && cookie.contains("MUSIC_U=secret")
                && !cookie.contains("MUSIC_A=")
        })
        .times(1)
        .returning(|_| Ok(ok_json(r#"{"code":200,"data":[{"url":"http://m/x.mp3"}]}"#)));

    let api = NeteaseApi::new(
        Arc::new(http),
        ApiSettings::default(),
        CookieStore::new().with_event_bus(bus),
    );
    let profile = api.account().await.unwrap().unwrap();
    assert_eq!(profile.user_id, 99);
    assert!(api.cookies().is_logged_in());
    assert_eq!(api.cookies().snapshot()["__csrf"], "tok");

    match events.recv().await.unwrap() {
        CoreEvent::Session(SessionEvent::CookieChanged { cookie }) => {
            assert_eq!(cookie["MUSIC_U"], "secret");
            assert!(!cookie.contains_key("Path"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert!(api.song_url(3, 320_000).await.unwrap().is_some());
}

#[tokio::test]
async fn test_user_playlists_cached_when_non_empty() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| req.url == "https://music.163.com/weapi/user/playlist")
        .times(1)
        .returning(|_| {
            Ok(ok_json(
                r#"{"code":200,"playlist":[{"id":1,"name":"Liked","trackCount":10,"playCount":5,"creator":{"userId":99}}]}"#,
            ))
        });

    let api = api_with(http, ApiSettings::default());
    let first = api.user_playlists(99).await.unwrap();
    let second = api.user_playlists(99).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].track_count, 10);
    assert!(api.cache().get("user_playlist99").is_some());
}

#[tokio::test]
async fn test_empty_user_playlists_not_cached() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .times(2)
        .returning(|_| Ok(ok_json(r#"{"code":200,"playlist":[]}"#)));

    let api = api_with(http, ApiSettings::default());
    assert!(api.user_playlists(5).await.unwrap().is_empty());
    assert!(api.user_playlists(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_personal_fm_and_scrobble() {
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| req.url == "https://music.163.com/weapi/v1/radio/get")
        .times(1)
        .returning(|_| {
            Ok(ok_json(
                r#"{"code":200,"data":[{"id":10,"name":"A","duration":180000,"artists":[{"name":"X"}],"album":{"name":"Y"}},{"id":11,"name":"B","duration":90000}]}"#,
            ))
        });
    http.expect_execute()
        .withf(|req| {
            let body = body_text(req);
            req.url == "https://music.163.com/weapi/feedback/weblog"
                && body.contains("params=")
                && body.contains("encSecKey=")
        })
        .times(1)
        .returning(|_| Ok(ok_json(r#"{"code":200,"data":"success"}"#)));

    let api = api_with(http, ApiSettings::default());
    let tracks = MusicProvider::personal_fm(&api).await.unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].artists, vec!["X"]);
    assert_eq!(tracks[1].duration_ms, 90000);

    MusicProvider::scrobble(&api, 10, 0, 120).await.unwrap();
}

#[tokio::test]
async fn test_logout_clears_session() {
    let bus = EventBus::new(16);
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .withf(|req| req.url == "https://music.163.com/weapi/logout")
        .times(1)
        .returning(|_| Ok(ok_json(r#"{"code":200}"#)));

    let store = CookieStore::new().with_event_bus(bus.clone());
    let mut restored = Cookie::new();
    restored.insert("MUSIC_U".to_string(), "u".to_string());
    store.replace(restored);

    let mut events = bus.subscribe();
    let api = NeteaseApi::new(Arc::new(http), ApiSettings::default(), store);
    api.logout().await.unwrap();

    assert!(api.cookies().snapshot().is_empty());
    let mut saw_logout = false;
    while let Ok(event) = events.try_recv() {
        if event == CoreEvent::Session(SessionEvent::LoggedOut) {
            saw_logout = true;
        }
    }
    assert!(saw_logout);
}
