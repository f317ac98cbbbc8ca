//! Request pipeline shared by the three API modes.
//!
//! Every call is an HTTP POST with a form-encoded body and the platform user
//! agent. The response envelope's `code` (or the HTTP status when the code is
//! missing) decides success. `Set-Cookie` headers are merged into the jar on
//! every response, successful or not.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::SessionConfig;
use rand::Rng;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::cookie::{self, Cookie, CookieStore};
use crate::crypto;
use crate::error::{NeteaseError, Result};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Envelope codes treated as success.
const SUCCESS_CODES: [i64; 3] = [200, 800, 803];

const DOMESTIC_IP: &str = "118.88.88.88";

#[cfg(target_os = "windows")]
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/99.0.4844.84 Safari/537.36";
#[cfg(target_os = "macos")]
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_3) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.3 Safari/605.1.15";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/99.0.4844.84 Safari/537.36";

fn api_segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w*api").expect("valid api segment regex"))
}

/// Connection settings taken from [`SessionConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub https: bool,
    pub foreign: bool,
    pub anonymous_token: String,
}

impl ApiSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            https: config.https,
            foreign: config.foreign,
            anonymous_token: config.anonymous_token.clone(),
        }
    }

    pub fn protocol(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            https: true,
            foreign: false,
            anonymous_token: core_runtime::config::DEFAULT_ANONYMOUS_TOKEN.to_string(),
        }
    }
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("https", &self.https)
            .field("foreign", &self.foreign)
            .field("anonymous_token", &"[REDACTED]")
            .finish()
    }
}

/// Transport for the encrypted remote API.
///
/// Paths are given without protocol, e.g. `music.163.com/weapi/v1/radio/get`.
/// `overlay` cookies (such as `os=pc`) are layered over the jar for a single
/// request and never stored.
pub struct NeteaseClient {
    http: Arc<dyn HttpClient>,
    settings: ApiSettings,
    cookies: CookieStore,
}

impl NeteaseClient {
    pub fn new(http: Arc<dyn HttpClient>, settings: ApiSettings, cookies: CookieStore) -> Self {
        Self {
            http,
            settings,
            cookies,
        }
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Mode W: double AES-CBC plus RSA-wrapped secret.
    #[instrument(skip(self, data, overlay), fields(path = %path))]
    pub async fn weapi_request<T: DeserializeOwned>(
        &self,
        path: &str,
        mut data: Map<String, Value>,
        overlay: Option<&Cookie>,
    ) -> Result<T> {
        let cookie_header = cookie::to_cookie_header(&self.effective_cookie(overlay));
        data.insert(
            "csrf_token".to_string(),
            Value::String(cookie::csrf_token(&cookie_header)),
        );
        let text = serde_json::to_string(&data)?;
        let form = crypto::weapi(&text)?;
        let url = self.full_url(&rewrite_api_segment(path, "weapi"));
        self.post(url, path, cookie_header, form.into_pairs()).await
    }

    /// Mode E: AES-ECB over the digest-framed body, with a device header block.
    #[instrument(skip(self, data, overlay), fields(path = %path))]
    pub async fn eapi_request<T: DeserializeOwned>(
        &self,
        path: &str,
        encrypt_path: &str,
        mut data: Map<String, Value>,
        overlay: Option<&Cookie>,
    ) -> Result<T> {
        let header = self.eapi_header(overlay);
        let cookie_header = cookie::to_cookie_header(&header);
        let header_value = header
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>();
        data.insert("header".to_string(), Value::Object(header_value));
        let text = serde_json::to_string(&data)?;
        let params = crypto::eapi(encrypt_path, &text)?;
        let url = self.full_url(&rewrite_api_segment(path, "eapi"));
        self.post(url, path, cookie_header, vec![("params".to_string(), params)])
            .await
    }

    /// Mode Plain: form-encoded parameters, no encryption.
    #[instrument(skip(self, data, overlay), fields(path = %path))]
    pub async fn api_request<T: DeserializeOwned>(
        &self,
        path: &str,
        data: Map<String, Value>,
        overlay: Option<&Cookie>,
    ) -> Result<T> {
        let cookie_header = cookie::to_cookie_header(&self.effective_cookie(overlay));
        let pairs = data
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();
        let url = self.full_url(path);
        self.post(url, path, cookie_header, pairs).await
    }

    fn effective_cookie(&self, overlay: Option<&Cookie>) -> Cookie {
        let mut jar = self.cookies.snapshot();
        if let Some(overlay) = overlay {
            jar.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        jar
    }

    /// Device header block; doubles as the request cookie.
    fn eapi_header(&self, overlay: Option<&Cookie>) -> Cookie {
        let mut cookie = self.effective_cookie(overlay);
        if !cookie.contains_key("MUSIC_U") {
            cookie.insert("MUSIC_A".to_string(), self.settings.anonymous_token.clone());
            cookie.insert("_ntes_nuid".to_string(), crypto::random_nuid());
        }

        let now = now_millis();
        let mut header: Cookie = BTreeMap::new();
        header.insert("appver".into(), "8.7.01".into());
        header.insert("versioncode".into(), "140".into());
        header.insert("buildver".into(), now.chars().take(10).collect());
        header.insert("resolution".into(), "1920x1080".into());
        header.insert("__csrf".into(), String::new());
        header.insert("os".into(), "android".into());
        header.insert(
            "requestId".into(),
            format!("{}_{:04}", now, rand::thread_rng().gen_range(0..1000)),
        );
        header.extend(cookie);
        header
    }

    fn full_url(&self, path: &str) -> String {
        format!("{}://{}", self.settings.protocol(), path)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        path: &str,
        cookie_header: String,
        form: Vec<(String, String)>,
    ) -> Result<T> {
        let mut request = HttpRequest::new(HttpMethod::Post, url)
            .header("Cookie", cookie_header)
            .header("User-Agent", USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .form(&form)?;
        if self.settings.foreign {
            request = request.header("X-Real-IP", DOMESTIC_IP);
        }
        if path.starts_with("music.163.com/") {
            request = request.header("Referer", "music.163.com");
        }

        let response = self.http.execute(request).await?;
        self.handle_response(response)
    }

    fn handle_response<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T> {
        let fragment = cookie::parse_set_cookie(response.header_values("set-cookie"));
        self.cookies.merge(fragment);

        let body: Value = serde_json::from_slice(&response.body).map_err(|e| {
            warn!(status = response.status, "Response body is not JSON");
            NeteaseError::Parse(e.to_string())
        })?;
        let status = envelope_status(&body, response.status);
        if !SUCCESS_CODES.contains(&status) {
            debug!(status, "Remote rejected request");
            return Err(NeteaseError::Remote { status });
        }
        Ok(serde_json::from_value(body)?)
    }
}

impl std::fmt::Debug for NeteaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeteaseClient")
            .field("settings", &self.settings)
            .field("cookies", &self.cookies)
            .finish()
    }
}

/// `code` from the envelope; the HTTP status when it is absent or zero.
fn envelope_status(body: &Value, http_status: u16) -> i64 {
    match body.get("code").and_then(Value::as_i64) {
        Some(code) if code != 0 => code,
        _ => i64::from(http_status),
    }
}

/// Replace the first `\w*api` segment with `mode`.
pub fn rewrite_api_segment(path: &str, mode: &str) -> String {
    api_segment_regex().replace(path, mode).into_owned()
}

fn now_millis() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

/// Build a JSON object from `key => value` pairs.
#[macro_export]
macro_rules! params {
    () => { ::serde_json::Map::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::serde_json::Map::new();
        $( map.insert(($key).to_string(), ::serde_json::json!($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rewrite_api_segment() {
        assert_eq!(
            rewrite_api_segment("music.163.com/api/song/lyric", "weapi"),
            "music.163.com/weapi/song/lyric"
        );
        assert_eq!(
            rewrite_api_segment("interface.music.163.com/eapi/song/enhance/download/url", "eapi"),
            "interface.music.163.com/eapi/song/enhance/download/url"
        );
    }

    #[test]
    fn test_envelope_status() {
        assert_eq!(envelope_status(&json!({"code": 803}), 200), 803);
        assert_eq!(envelope_status(&json!({"code": 0}), 200), 200);
        assert_eq!(envelope_status(&json!({"data": []}), 502), 502);
    }

    #[test]
    fn test_params_macro() {
        let map = params! { "id" => 5, "level" => "standard" };
        assert_eq!(map["id"], json!(5));
        assert_eq!(map["level"], json!("standard"));
        assert!(params! {}.is_empty());
    }

    #[test]
    fn test_settings_debug_redacts_token() {
        let settings = ApiSettings::default();
        let debug = format!("{:?}", settings);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&settings.anonymous_token));
        assert_eq!(settings.protocol(), "https");
    }
}
