//! Version comparison between a cached entry and a fresh network response.

use multiapp_net::Response;

use crate::CacheEntry;

/// The validator headers that identify one version of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self::new(entry.header("etag"), entry.header("last-modified"))
    }

    pub fn from_response(response: &Response) -> Self {
        Self::new(response.header("etag"), response.header("last-modified"))
    }

    fn new(etag: Option<&str>, last_modified: Option<&str>) -> Self {
        let non_empty = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            etag: non_empty(etag),
            last_modified: non_empty(last_modified),
        }
    }

    /// Whether both sides name the same version.
    ///
    /// ETags win when both sides have one; Last-Modified is consulted only
    /// otherwise. Without a comparable pair the answer is `false`.
    pub fn same_version(&self, other: &Validators) -> bool {
        if let (Some(a), Some(b)) = (&self.etag, &other.etag) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.last_modified, &other.last_modified) {
            return a == b;
        }
        false
    }
}

/// Compare a cached entry against a fresh response.
pub fn same_version(cached: &CacheEntry, fresh: &Response) -> bool {
    Validators::from_entry(cached).same_version(&Validators::from_response(fresh))
}
