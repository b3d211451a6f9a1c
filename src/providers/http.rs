use serde::de::DeserializeOwned;
use tokio::time;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::retry::{is_transient_error, is_transient_status, RetryPolicy};

/// GET `url` and decode the body into `T`.
///
/// Transport failures, 429 and 5xx are retried per `retry`. A body that
/// does not match `T` is a schema error and is never retried.
pub async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    provider: &'static str,
    url: &str,
    retry: &RetryPolicy,
) -> Result<T, ProviderError> {
    let mut attempt = 0u32;

    loop {
        debug!("{}: GET {}", provider, url);

        let error = match http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let body = response.text().await.map_err(|e| ProviderError::Http {
                    provider,
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
                return serde_json::from_str(&body).map_err(|e| ProviderError::Schema {
                    provider,
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Ok(response) => {
                let status = response.status();
                if !is_transient_status(status) {
                    return Err(ProviderError::Status {
                        provider,
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                ProviderError::Status {
                    provider,
                    url: url.to_string(),
                    status: status.as_u16(),
                }
            }
            Err(e) => {
                let transient = is_transient_error(&e);
                let error = ProviderError::Http {
                    provider,
                    url: url.to_string(),
                    message: e.to_string(),
                };
                if !transient {
                    return Err(error);
                }
                error
            }
        };

        if attempt >= retry.retries {
            return Err(error);
        }

        attempt += 1;
        let delay = retry.delay_for(attempt);
        warn!(
            "⚠️ {} (retry {}/{} in {:?})",
            error, attempt, retry.retries, delay
        );
        time::sleep(delay).await;
    }
}
