use super::HttpClientError;
use crate::error::{err, err_ctx};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use easy_ext::ext;
use reqwest::Response;
use reqwest_middleware::RequestBuilder;

#[ext(RequestBuilderBasicExt)]
#[async_trait]
pub(crate) impl RequestBuilder {
    /// Better version of [`RequestBuilder::send`] that returns an error
    /// if the error response status code is returned.
    async fn try_send(self) -> Result<Response> {
        let response = self
            .send()
            .await
            .map_err(err_ctx!(HttpClientError::Request))?;

        let status = response.status();

        if !status.is_client_error() && !status.is_server_error() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|err| {
            format!(
                "Could not collect the error response body text: {}",
                err.display_chain()
            )
        });

        Err(err!(HttpClientError::BadResponseStatusCode { status, body }))
    }

    /// Sends the request and reads the whole response body as text,
    /// decoding it according to the response charset.
    async fn read_text(self) -> Result<String> {
        self.try_send()
            .await?
            .text()
            .await
            .map_err(err_ctx!(HttpClientError::ReadPayload))
    }
}
