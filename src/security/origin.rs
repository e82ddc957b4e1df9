use std::{net::IpAddr, sync::Arc};

use url::{Host, Url};

/// Which browser origins may call the gateway.
#[derive(Debug, Clone)]
pub enum OriginPolicy {
    LoopbackOnly,
    AllowList(Arc<[String]>),
}

impl OriginPolicy {
    /// An empty list means loopback origins only.
    #[must_use]
    pub fn from_origins(origins: &[String]) -> Self {
        if origins.is_empty() {
            Self::LoopbackOnly
        } else {
            Self::AllowList(origins.iter().cloned().collect())
        }
    }

    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::LoopbackOnly => is_loopback_origin(origin),
            Self::AllowList(origins) => {
                let origin = origin.trim_end_matches('/');
                origins.iter().any(|allowed| allowed == origin)
            }
        }
    }
}

#[must_use]
pub fn is_loopback_origin(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}
