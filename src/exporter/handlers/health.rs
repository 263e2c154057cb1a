use crate::exporter::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Liveness only: the process answers. Collector state is reported by
/// `/readyz`.
#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
}

impl Health {
    fn current() -> Self {
        Self {
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// GET gets the JSON body, OPTIONS only the headers
fn create_response_body(method: &Method, health: &Health) -> Body {
    if method == Method::GET {
        Json(health).into_response().into_body()
    } else {
        Body::empty()
    }
}

// X-App: name:version:short-hash
fn create_app_headers(health: &Health) -> HeaderMap {
    let short_hash = health.commit.get(..7).unwrap_or("");

    let header_value = format!("{}:{}:{}", health.name, health.version, short_hash);

    match header_value.parse::<HeaderValue>() {
        Ok(x_app_header_value) => {
            debug!("X-App header: {:?}", x_app_header_value);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        }
        Err(err) => {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        }
    }
}

pub async fn health(method: Method) -> impl IntoResponse {
    let health = Health::current();
    let body = create_response_body(&method, &health);
    let headers = create_app_headers(&health);

    (StatusCode::OK, headers, body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_app_header() {
        let health = Health {
            commit: "0123456789abcdef".to_string(),
            name: "cloud_exporter".to_string(),
            version: "1.2.3".to_string(),
        };

        let headers = create_app_headers(&health);
        assert_eq!(
            headers.get("X-App").unwrap(),
            "cloud_exporter:1.2.3:0123456"
        );

        let short = Health {
            commit: ":-(".to_string(),
            ..health
        };
        assert_eq!(
            create_app_headers(&short).get("X-App").unwrap(),
            "cloud_exporter:1.2.3:"
        );
    }

    #[tokio::test]
    async fn test_options_has_empty_body() {
        let response = health(Method::OPTIONS).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
