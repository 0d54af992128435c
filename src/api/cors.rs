use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware,
};

/// Extra origins allowed besides loopback ones, normalized without a
/// trailing slash. The origin of the public base URL is always included.
#[derive(Debug, Clone, Default)]
pub(crate) struct CorsPolicy {
    extra_origins: Arc<Vec<String>>,
}

impl CorsPolicy {
    pub(crate) fn new(extra_origins: &[String], public_base_url: &str) -> Self {
        let mut extra_origins: Vec<String> = extra_origins
            .iter()
            .map(|o| o.trim().trim_end_matches('/').to_ascii_lowercase())
            .filter(|o| !o.is_empty())
            .collect();
        if let Some(own) = origin_of(public_base_url)
            && !extra_origins.contains(&own)
        {
            extra_origins.push(own);
        }
        Self {
            extra_origins: Arc::new(extra_origins),
        }
    }

    pub(crate) fn is_allowed(&self, origin: &HeaderValue) -> bool {
        if is_loopback_origin(origin) {
            return true;
        }
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        self.extra_origins.iter().any(|o| *o == origin)
    }
}

pub(crate) async fn cors_mw(
    State(policy): State<CorsPolicy>,
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Result<axum::response::Response, StatusCode> {
    let origin = req.headers().get(header::ORIGIN).cloned();

    if let Some(origin) = origin {
        if !policy.is_allowed(&origin) {
            tracing::debug!(origin = ?origin, "rejected cross-origin request");
            return Err(StatusCode::FORBIDDEN);
        }

        if req.method() == Method::OPTIONS {
            let mut resp = axum::response::Response::new(axum::body::Body::empty());
            *resp.status_mut() = StatusCode::NO_CONTENT;
            apply_cors_headers(resp.headers_mut(), &origin);
            return Ok(resp);
        }

        let mut resp = next.run(req).await;
        apply_cors_headers(resp.headers_mut(), &origin);
        return Ok(resp);
    }

    Ok(next.run(req).await)
}

pub(crate) fn apply_cors_headers(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Range, Content-Length, Accept-Ranges"),
    );
}

/// `scheme://authority` of a URL, lowercased; `None` for relative URLs.
fn origin_of(url: &str) -> Option<String> {
    let uri = url.trim().parse::<axum::http::Uri>().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{scheme}://{authority}").to_ascii_lowercase())
}

pub(crate) fn is_loopback_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };

    let Ok(uri) = origin.parse::<axum::http::Uri>() else {
        return false;
    };

    let Some(host) = uri.host() else {
        return false;
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    host.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
