//! Server URL derivation.
//!
//! A server may be configured as `https://`, `http://`, `wss://` or `ws://`.
//! HTTP calls and the signaling socket each need their own scheme, so both
//! are derived from whichever form was given. Anything else passes through
//! untouched.

use crate::host::HostLocation;

fn swap_scheme(url: &str, pairs: &[(&str, &str)]) -> String {
    for (from, to) in pairs {
        if let Some(rest) = url.strip_prefix(from) {
            return format!("{to}{rest}");
        }
    }
    url.to_string()
}

fn trimmed(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// HTTP(S) base URL, or `None` when neither a server URL nor a host
/// location is available.
pub fn http_base_url(server_url: Option<&str>, location: Option<&HostLocation>) -> Option<String> {
    match server_url.filter(|u| !u.is_empty()) {
        Some(url) => Some(swap_scheme(
            trimmed(url),
            &[("wss://", "https://"), ("ws://", "http://")],
        )),
        None => location.map(HostLocation::http_origin),
    }
}

/// WS(S) base URL, or `None` when neither a server URL nor a host location
/// is available.
pub fn ws_base_url(server_url: Option<&str>, location: Option<&HostLocation>) -> Option<String> {
    match server_url.filter(|u| !u.is_empty()) {
        Some(url) => Some(swap_scheme(
            trimmed(url),
            &[("https://", "wss://"), ("http://", "ws://")],
        )),
        None => location.map(HostLocation::ws_origin),
    }
}

/// `{ws_base}/ws/{room}[?apiKey=..][&password=..]`
pub fn socket_url(
    ws_base: &str,
    room_id: &str,
    api_key: Option<&str>,
    password: Option<&str>,
) -> String {
    let mut url = format!("{ws_base}/ws/{}", urlencoding::encode(room_id));
    let params: Vec<String> = [("apiKey", api_key), ("password", password)]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{name}={}", urlencoding::encode(v))))
        .collect();
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

/// `{http_base}/api/room[?password=..]`
pub fn room_creation_url(http_base: &str, password: Option<&str>) -> String {
    match password {
        Some(pw) => format!("{http_base}/api/room?password={}", urlencoding::encode(pw)),
        None => format!("{http_base}/api/room"),
    }
}
