//! HTTP access to the remote catalogue service.

mod fetcher;
mod transport;

use std::collections::BTreeMap;
use std::fmt;

pub use fetcher::{
    AttemptFailure, FetchError, FetchErrorKind, PayloadError, ResilientFetcher, RetryPolicy,
};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};

/// Per-request state carried alongside an outgoing request.
///
/// Holds the session cookies loaded by the session manager. Requests built
/// through [`RequestContext::apply`] carry them as a `Cookie` header.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    cookies: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_cookies(&mut self, tokens: &BTreeMap<String, String>) {
        self.cookies.clone_from(tokens);
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn has_cookies(&self) -> bool {
        !self.cookies.is_empty()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn apply(&self, request: HttpRequest) -> HttpRequest {
        match self.cookie_header() {
            Some(header) => request.header("Cookie", header),
            None => request,
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RequestContext")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}
