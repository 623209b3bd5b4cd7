use actix_web::dev::ServiceRequest;
use actix_web::http::header::{HeaderName, X_FORWARDED_FOR};
use once_cell::sync::Lazy;
use std::net::{IpAddr, Ipv6Addr};

pub static X_REAL_IP: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("x-real-ip"));

fn header_str<'r>(req: &'r ServiceRequest, name: &HeaderName) -> Option<&'r str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Resolve the client address of a request.
///
/// # Security
///
/// With `trust_proxy_headers` the first `X-Forwarded-For` entry wins, then `X-Real-IP`. These
/// headers are set by the client unless a proxy you control overwrites them, so only trust them
/// when deployed behind such a proxy.
pub(crate) fn client_address(req: &ServiceRequest, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = header_str(req, &X_FORWARDED_FOR)
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_owned();
        }
        if let Some(ip) = header_str(req, &X_REAL_IP).map(str::trim).filter(|ip| !ip.is_empty()) {
            return ip.to_owned();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

/// The API token of a request, empty if absent or not valid text.
pub(crate) fn client_token<'r>(req: &'r ServiceRequest, header: &HeaderName) -> &'r str {
    header_str(req, header).unwrap_or_default()
}

// Groups IPv6 addresses together, see:
// https://adam-p.ca/blog/2022/02/ipv6-rate-limiting/
// https://support.cloudflare.com/hc/en-us/articles/115001635128-Configuring-Cloudflare-Rate-Limiting
pub(crate) fn ip_key(ip_str: &str) -> String {
    let Ok(ip) = ip_str.parse::<IpAddr>() else {
        return ip_str.to_owned();
    };
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.to_string();
            }
            let segments = v6.segments();
            let subnet = Ipv6Addr::new(
                segments[0],
                segments[1],
                segments[2],
                segments[3],
                0,
                0,
                0,
                0,
            );
            format!("{subnet}/64")
        }
    }
}
