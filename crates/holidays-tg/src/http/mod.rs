mod basic_ext;

use crate::prelude::*;
use async_trait::async_trait;
use task_local_extensions::Extensions;

pub(crate) mod prelude {
    pub(crate) use super::basic_ext::RequestBuilderBasicExt;
}

pub(crate) type Client = reqwest_middleware::ClientWithMiddleware;

/// There is deliberately no retry middleware here. Every request is sent
/// exactly once, and its failure is reported to the caller.
pub(crate) fn create_client() -> Client {
    reqwest_middleware::ClientBuilder::new(teloxide::net::client_from_env())
        .with(ObservingMiddleware)
        .build()
}

struct ObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for ObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let span = info_span!(
            "request",
            version = ?request.version(),
            method = %request.method(),
            url = %request.url(),
        );

        async {
            let method = request.method().to_string();
            let host = request.url().host_str().unwrap_or("{unknown}").to_owned();

            let (result, duration) = next.run(request, extensions).with_duration().await;

            let status = match &result {
                Ok(response) => response.status().to_string(),
                Err(_) => "{fatal}".to_owned(),
            };

            metrics::histogram!(
                "http_request_duration_seconds",
                duration.as_secs_f64(),
                "method" => method,
                "host" => host,
                "status" => status,
            );

            let duration = tracing_duration(duration);

            let response = match &result {
                Ok(response) => response,
                Err(err) => {
                    error!(duration, err = tracing_err(err), "Network request failed");
                    return result;
                }
            };

            let status = response.status();

            if status.is_client_error() || status.is_server_error() {
                warn!(duration, %status, "Network request failed (error status)");
            } else {
                info!(duration, %status, "Network request succeeded");
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Errors at the layer of the HTTP API
#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest_middleware::Error },

    #[error("Failed to read HTTP response")]
    ReadPayload { source: reqwest::Error },

    #[error("HTTP request has failed (HTTP status code: {status}):\n{body}")]
    BadResponseStatusCode {
        status: reqwest::StatusCode,
        body: String,
    },
}
