//! Remote URL parsing and the organization domain check.

use std::env;

/// Hosting domain used when `DEVPACK_ORG_DOMAIN` is unset.
pub const DEFAULT_ORG_DOMAIN: &str = "git.devpack.dev";

/// Extract the host from a git remote URL.
///
/// Understands `scheme://[user@]host[:port]/path` for the ssh, git, http
/// and https schemes, and the scp-like `[user@]host:path` form.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let url = url.trim();
    let host = if let Some((scheme, rest)) = url.split_once("://") {
        if !matches!(scheme, "ssh" | "git" | "http" | "https" | "git+ssh") {
            return None;
        }
        let authority = rest.split('/').next()?;
        let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        strip_port(host_port)?
    } else {
        // scp-like: the colon must come before any slash.
        let authority = match url.find(']') {
            Some(end) if url.starts_with('[') || url.contains("@[") => {
                url[end + 1..].starts_with(':').then(|| &url[..=end])?
            }
            _ => url.split_once(':')?.0,
        };
        if authority.contains('/') {
            return None;
        }
        let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        // A single letter is a Windows drive, not a host.
        if host.len() == 1 {
            return None;
        }
        strip_port(host)?
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Drop a `:port` suffix; a bracketed IPv6 literal loses its brackets.
fn strip_port(host_port: &str) -> Option<&str> {
    match host_port.strip_prefix('[') {
        Some(literal) => literal.split_once(']').map(|(host, _)| host),
        None => host_port.split(':').next(),
    }
}

/// Decides whether a remote belongs to the organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgMatcher {
    domain: String,
}

impl Default for OrgMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ORG_DOMAIN)
    }
}

impl OrgMatcher {
    /// Match remotes hosted on `domain` or any of its subdomains.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().trim_end_matches('.').to_ascii_lowercase(),
        }
    }

    /// Read the domain from `DEVPACK_ORG_DOMAIN`, falling back to
    /// [`DEFAULT_ORG_DOMAIN`].
    #[must_use]
    pub fn from_env() -> Self {
        env::var("DEVPACK_ORG_DOMAIN")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map_or_else(Self::default, Self::new)
    }

    /// The organization's hosting domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether `url` points at the organization's hosting domain.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| {
            host == self.domain
                || host
                    .strip_suffix(&self.domain)
                    .is_some_and(|sub| sub.ends_with('.'))
        })
    }
}
