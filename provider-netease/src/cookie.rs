//! Session cookie jar.
//!
//! The jar is a flat `name -> value` map. The request pipeline is its only
//! writer; everyone else reads snapshots. Every mutation is broadcast as
//! [`SessionEvent::CookieChanged`] so the host can persist the session.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use regex::Regex;
use tokio::sync::watch;
use tracing::debug;

/// A parsed cookie jar.
pub type Cookie = BTreeMap<String, String>;

/// `Set-Cookie` attributes that are not cookies themselves.
const ATTRIBUTES: [&str; 7] = [
    "path", "expires", "max-age", "httponly", "secure", "samesite", "domain",
];

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*Domain=[^(;|$)]+;*").expect("valid domain regex"))
}

fn csrf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_csrf=([^(;|$)]+)").expect("valid csrf regex"))
}

/// Parse raw `Set-Cookie` header values into a jar fragment.
///
/// `Domain=` is stripped, the remaining text is split on `;` and each pair
/// on its first `=`. Attribute names such as `Path` or `Max-Age` are skipped.
pub fn parse_set_cookie<'a, I>(values: I) -> Cookie
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cookie = Cookie::new();
    for value in values {
        let stripped = domain_regex().replace(value, "");
        for part in stripped.split(';') {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || ATTRIBUTES.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            cookie.insert(name.to_string(), value.trim().to_string());
        }
    }
    cookie
}

/// Serialise a jar as a `Cookie` header: url-encoded `k=v` joined by `"; "`.
pub fn to_cookie_header(cookie: &Cookie) -> String {
    cookie
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extract the CSRF token from a serialised cookie header.
pub fn csrf_token(header: &str) -> String {
    csrf_regex()
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Single-writer cookie jar backed by a `watch` channel.
#[derive(Clone)]
pub struct CookieStore {
    sender: watch::Sender<Cookie>,
    event_bus: Option<EventBus>,
}

impl CookieStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Cookie::new());
        Self {
            sender,
            event_bus: None,
        }
    }

    /// Broadcast every mutation on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Current jar.
    pub fn snapshot(&self) -> Cookie {
        self.sender.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.sender.borrow().contains_key("MUSIC_U")
    }

    /// Merge a fragment into the jar. Empty fragments are ignored.
    pub fn merge(&self, fragment: Cookie) {
        if fragment.is_empty() {
            return;
        }
        debug!(names = ?fragment.keys().collect::<Vec<_>>(), "Merging cookies");
        self.sender.send_modify(|jar| jar.extend(fragment));
        self.broadcast_changed();
    }

    /// Replace the whole jar (session restore).
    pub fn replace(&self, cookie: Cookie) {
        self.sender.send_replace(cookie);
        self.broadcast_changed();
    }

    /// Drop every cookie (logout).
    pub fn clear(&self) {
        self.sender.send_replace(Cookie::new());
        self.broadcast_changed();
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Session(SessionEvent::LoggedOut));
        }
    }

    /// Receiver observing jar changes.
    pub fn subscribe(&self) -> watch::Receiver<Cookie> {
        self.sender.subscribe()
    }

    fn broadcast_changed(&self) {
        if let Some(bus) = &self.event_bus {
            let cookie = self.snapshot();
            let _ = bus.emit(CoreEvent::Session(SessionEvent::CookieChanged { cookie }));
        }
    }
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("names", &self.sender.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie_strips_attributes() {
        let cookie = parse_set_cookie([
            "MUSIC_U=abc; Max-Age=1296000; Expires=Tue, 01 Jan 2030 00:00:00 GMT; Path=/; Domain=.music.163.com; HTTPOnly",
            "__csrf=tok123; Max-Age=1296010; Path=/",
        ]);
        assert_eq!(cookie.len(), 2);
        assert_eq!(cookie["MUSIC_U"], "abc");
        assert_eq!(cookie["__csrf"], "tok123");
    }

    #[test]
    fn test_cookie_header_encodes_values() {
        let mut cookie = Cookie::new();
        cookie.insert("os".into(), "pc".into());
        cookie.insert("name".into(), "a b".into());
        assert_eq!(to_cookie_header(&cookie), "name=a%20b; os=pc");
    }

    #[test]
    fn test_csrf_token() {
        assert_eq!(csrf_token("MUSIC_U=x; __csrf=abc; os=pc"), "abc");
        assert_eq!(csrf_token("os=pc"), "");
    }

    #[tokio::test]
    async fn test_store_broadcasts_mutations() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let store = CookieStore::new().with_event_bus(bus);

        store.merge(parse_set_cookie(["MUSIC_U=u1; Path=/"]));
        assert!(store.is_logged_in());
        match rx.recv().await.unwrap() {
            CoreEvent::Session(SessionEvent::CookieChanged { cookie }) => {
                assert_eq!(cookie["MUSIC_U"], "u1");
            }
            other => panic!("unexpected event {:?}", other),
        }

        store.merge(Cookie::new());
        assert!(rx.try_recv().is_err());

        store.clear();
        assert!(store.snapshot().is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::CookieChanged { .. })
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::LoggedOut)
        );
    }

    #[test]
    fn test_replace_and_subscribe() {
        let store = CookieStore::new();
        let rx = store.subscribe();
        let mut jar = Cookie::new();
        jar.insert("MUSIC_U".into(), "restored".into());
        store.replace(jar);
        assert_eq!(rx.borrow()["MUSIC_U"], "restored");
    }
}
