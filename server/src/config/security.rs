use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

const NOSNIFF: &str = "nosniff";
const DENY: &str = "DENY";
const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";
const CSP_API_VALUE: &str = "default-src 'none'; frame-ancestors 'none'";
const REFERRER_POLICY_VALUE: &str = "strict-origin-when-cross-origin";
const PERMISSIONS_POLICY_VALUE: &str = "geolocation=(), microphone=(), camera=()";

/// Adds the API's security headers to every response. HSTS only makes sense
/// behind HTTPS, so it is limited to production.
pub fn with_security_headers<S>(router: Router<S>, include_hsts: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = router
        .layer(header_layer(header::X_CONTENT_TYPE_OPTIONS, NOSNIFF))
        .layer(header_layer(header::X_FRAME_OPTIONS, DENY))
        .layer(header_layer(header::CONTENT_SECURITY_POLICY, CSP_API_VALUE))
        .layer(header_layer(header::REFERRER_POLICY, REFERRER_POLICY_VALUE))
        .layer(header_layer(
            HeaderName::from_static("permissions-policy"),
            PERMISSIONS_POLICY_VALUE,
        ));

    if include_hsts {
        tracing::info!("Security: HSTS header enabled (production mode)");
        router = router.layer(header_layer(header::STRICT_TRANSPORT_SECURITY, HSTS_VALUE));
    }

    router
}

fn header_layer(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}
