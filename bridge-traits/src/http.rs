//! HTTP Client Abstraction
//!
//! Provides async request execution and streaming downloads. The remote music
//! API is form-encoded and answers with several `Set-Cookie` headers, so
//! headers are kept as an ordered list rather than a map.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::platform::{DynAsyncRead, PlatformSendSync};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Set a header, replacing any previous value with the same
    /// case-insensitive name.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.headers.push((key, value.into()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        Ok(self.header("Content-Type", "application/json"))
    }

    /// Encode `body` as `application/x-www-form-urlencoded`.
    pub fn form<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(body).map_err(|e| {
            BridgeError::OperationFailed(format!("Form serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(encoded));
        Ok(self.header("Content-Type", "application/x-www-form-urlencoded"))
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// First header value matching `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated header such as `Set-Cookie`.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Async HTTP client trait
///
/// `execute` performs exactly one attempt. Failed calls are not retried;
/// callers fall back to defaults instead.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod};
///
/// async fn fetch_lyric(client: &dyn HttpClient) -> Result<String> {
///     let request = HttpRequest::new(HttpMethod::Post, "https://music.163.com/api/song/lyric")
///         .form(&[("id", "1")])?;
///     client.execute(request).await?.text()
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait HttpClient: PlatformSendSync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns error if the connection fails or the request times out. Non-2xx
    /// statuses are returned as a normal response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Download a resource as a stream of bytes
    async fn download_stream(&self, url: String) -> Result<Box<DynAsyncRead>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Post, "https://example.com")
            .header("User-Agent", "test")
            .header("user-agent", "replaced")
            .timeout(Duration::from_secs(8));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header_value("User-Agent"), Some("replaced"));
        assert_eq!(request.timeout, Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_form_body() {
        let request = HttpRequest::new(HttpMethod::Post, "https://example.com")
            .form(&[("params", "a b"), ("encSecKey", "ff")])
            .unwrap();

        assert_eq!(
            request.header_value("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            request.body.as_deref(),
            Some(&b"params=a+b&encSecKey=ff"[..])
        );
    }

    #[test]
    fn test_repeated_response_headers() {
        let response = HttpResponse {
            status: 200,
            headers: vec![
                ("Set-Cookie".into(), "a=1; Path=/".into()),
                ("Content-Type".into(), "application/json".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            body: Bytes::from("{}"),
        };

        assert!(response.is_success());
        assert!(!response.is_server_error());
        let cookies: Vec<_> = response.header_values("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1; Path=/", "b=2"]);
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    struct Unavailable {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for Unavailable {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(HttpResponse {
                status: 503,
                headers: Vec::new(),
                body: Bytes::new(),
            })
        }

        async fn download_stream(&self, _url: String) -> Result<Box<DynAsyncRead>> {
            Err(BridgeError::OperationFailed("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_server_error_is_returned_after_one_attempt() {
        let client = Unavailable {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let request = HttpRequest::new(HttpMethod::Get, "https://music.163.com/api/radio/get");

        let response = client.execute(request).await.unwrap();
        assert!(response.is_server_error());
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
