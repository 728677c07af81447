//! URL query decoding for the HTTP control surface.
//!
//! The ESP32 HTTP server hands handlers a raw URI, so the `/fan` and
//! `/config` parameters are decoded here. On desktop, axum's `Query` and
//! `Form` extractors deserialize into the same types (with the `serde`
//! feature).
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::query::FanQuery;
//!
//! let q = FanQuery::from_uri("/fan?state=on&speed=40");
//! assert_eq!(q.state.as_deref(), Some("on"));
//! assert_eq!(q.speed.as_deref(), Some("40"));
//! assert!(q.default_on.is_none());
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::config::ConfigFields;

/// Parameters accepted by `GET /fan`.
///
/// Every field is optional free text; `FanApp::handle_query` interprets them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct FanQuery {
    /// `on` or `off`.
    pub state: Option<String>,
    /// Percent, parsed leniently.
    pub speed: Option<String>,
    /// Bool-like power-on flag.
    pub default_on: Option<String>,
}

impl FanQuery {
    /// Decode from a query string without the leading `?`.
    pub fn from_query_str(query: &str) -> Self {
        let mut q = Self::default();
        for (key, value) in pairs(query) {
            match key.as_str() {
                "state" => q.state = Some(value),
                "speed" => q.speed = Some(value),
                "default_on" => q.default_on = Some(value),
                _ => {}
            }
        }
        q
    }

    /// Decode from a full request URI such as `/fan?speed=40`.
    pub fn from_uri(uri: &str) -> Self {
        Self::from_query_str(query_part(uri))
    }

    /// True when no recognised parameter was given.
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.speed.is_none() && self.default_on.is_none()
    }
}

impl ConfigFields {
    /// Decode a form body or query string. Unknown keys are ignored and
    /// missing ones stay empty.
    pub fn from_query_str(query: &str) -> Self {
        let mut f = Self::default();
        f.overlay_query_str(query);
        f
    }

    /// Overwrite only the fields present in `query`.
    ///
    /// Start from [`Config::to_fields`](crate::config::Config::to_fields) to
    /// change single settings without resetting the rest.
    pub fn overlay_query_str(&mut self, query: &str) {
        let f = self;
        for (key, value) in pairs(query) {
            let slot = match key.as_str() {
                "mqtt_enabled" => &mut f.mqtt_enabled,
                "mqtt_host" => &mut f.mqtt_host,
                "mqtt_port" => &mut f.mqtt_port,
                "mqtt_user" => &mut f.mqtt_user,
                "mqtt_pass" => &mut f.mqtt_pass,
                "command_topic" => &mut f.command_topic,
                "state_topic" => &mut f.state_topic,
                "status_topic" => &mut f.status_topic,
                "fan_default_speed" => &mut f.fan_default_speed,
                "fan_default_on" => &mut f.fan_default_on,
                _ => continue,
            };
            *slot = value;
        }
    }
}

/// Everything after the first `?`, or empty.
pub fn query_part(uri: &str) -> &str {
    uri.split_once('?').map_or("", |(_, q)| q)
}

/// Split on `&` and `=`, percent-decoding both sides.
pub fn pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (url_decode(k), url_decode(v))
        })
        .collect()
}

/// `application/x-www-form-urlencoded` decoding.
///
/// `+` becomes a space and `%XX` a byte. Malformed escapes are kept
/// literally, and invalid UTF-8 is replaced.
///
/// ```
/// use rs_fanctl::query::url_decode;
///
/// assert_eq!(url_decode("home%2Ffan+cmd"), "home/fan cmd");
/// assert_eq!(url_decode("100%"), "100%");
/// ```
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
