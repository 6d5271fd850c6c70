use crate::error::{AppError, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Postgres unique-violation code as reported by PostgREST.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

/// Error body returned by PostgREST and GoTrue.
#[derive(Debug, Default, Deserialize)]
struct RemoteErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("anilog/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request and turn any non-success status into an [`AppError`].
    #[instrument(skip(self, request))]
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(%status, url = %response.url(), "response received");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(%status, "HTTP request failed");
        Err(classify_failure(status, &body))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Parse(e.to_string()))
    }

    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send_json(self.client.get(url)).await
    }
}

fn classify_failure(status: StatusCode, body: &str) -> AppError {
    let parsed: RemoteErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.as_ref().map(|c| match c {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    if status == StatusCode::CONFLICT || code.as_deref() == Some(UNIQUE_VIOLATION) {
        return AppError::Duplicate;
    }

    match status {
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => AppError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::AccessDenied,
        _ => AppError::Remote {
            status: status.as_u16(),
            message: parsed
                .message
                .or(parsed.msg)
                .or(parsed.error_description)
                .unwrap_or_else(|| body.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_a_duplicate() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert!(matches!(classify_failure(StatusCode::CONFLICT, body), AppError::Duplicate));
        assert!(matches!(classify_failure(StatusCode::BAD_REQUEST, body), AppError::Duplicate));
    }

    #[test]
    fn missing_rows_and_auth_failures_map_to_their_variants() {
        assert!(matches!(classify_failure(StatusCode::NOT_ACCEPTABLE, ""), AppError::NotFound));
        assert!(matches!(classify_failure(StatusCode::NOT_FOUND, ""), AppError::NotFound));
        assert!(matches!(classify_failure(StatusCode::UNAUTHORIZED, "{}"), AppError::AccessDenied));
        assert!(matches!(classify_failure(StatusCode::FORBIDDEN, "{}"), AppError::AccessDenied));
    }

    #[test]
    fn other_failures_keep_the_remote_message() {
        let err = classify_failure(StatusCode::BAD_REQUEST, r#"{"code":400,"msg":"Invalid login credentials"}"#);
        match err {
            AppError::Remote { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = classify_failure(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("upstream down"));
    }
}
