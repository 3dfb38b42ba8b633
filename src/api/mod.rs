//! HTTP handlers. Each one extracts, delegates to a service and serializes;
//! errors render through `DropError`'s `IntoResponse`.

pub mod access;
pub mod account;
pub mod drops;
pub mod payments;

use axum::http::HeaderMap;

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
