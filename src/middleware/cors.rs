use axum::http::{header, HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::api::identity::OWNER_HEADER;

pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static(OWNER_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(60 * 60)) // 1 hour
}
