//! Request classification.

use http::Method;
use multiapp_net::Request;
use tracing::trace;
use url::Url;

/// What kind of request the worker is looking at, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not a GET; left to the network untouched.
    Passthrough,
    /// Full document load.
    Navigation,
    /// Page with the sub-application segment in its path, on any origin.
    SubApplication,
    /// Any other same-origin request.
    SameOrigin,
    /// Request to another origin.
    CrossOrigin,
}

/// How a class of request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Passthrough,
    NetworkFirstWithFallback,
    CacheFirst,
    StaleWhileRevalidate,
    NetworkFirst,
}

impl RequestClass {
    pub fn strategy(self) -> Strategy {
        match self {
            RequestClass::Passthrough => Strategy::Passthrough,
            RequestClass::Navigation => Strategy::NetworkFirstWithFallback,
            RequestClass::SubApplication => Strategy::CacheFirst,
            RequestClass::SameOrigin => Strategy::StaleWhileRevalidate,
            RequestClass::CrossOrigin => Strategy::NetworkFirst,
        }
    }
}

/// Classifies requests against the worker's scope.
#[derive(Debug, Clone)]
pub struct Router {
    scope: Url,
    app_prefix: String,
}

impl Router {
    pub fn new(scope: Url, app_prefix: impl Into<String>) -> Self {
        Self {
            scope,
            app_prefix: app_prefix.into(),
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.scope.origin()
    }

    /// Whether the path carries the sub-application segment anywhere, so a
    /// scope deployed under a subpath (`/site/Apps/...`) still matches.
    pub fn is_sub_application(&self, url: &Url) -> bool {
        url.path().contains(self.app_prefix.as_str())
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        let class = if request.method != Method::GET {
            RequestClass::Passthrough
        } else if request.is_navigation() {
            RequestClass::Navigation
        } else if self.is_sub_application(&request.url) {
            RequestClass::SubApplication
        } else if self.is_same_origin(&request.url) {
            RequestClass::SameOrigin
        } else {
            RequestClass::CrossOrigin
        };
        trace!(url = %request.url, class = ?class, "Request classified");
        class
    }
}
