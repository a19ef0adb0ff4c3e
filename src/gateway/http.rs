use crate::gateway::types::{GatewayErrorBody, QUERY_STILL_PROCESSING_CODE};
use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Credentials attached to an outbound gateway request.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    Basic { username: &'a str, password: &'a str },
    Bearer(&'a str),
}

/// Thin reqwest wrapper with a fixed timeout and bounded exponential backoff
/// for transient failures (network errors, 429, 5xx). Client errors are
/// returned immediately with the gateway's own code and message preserved.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Gateway {
                code: None,
                message: format!("failed to initialize HTTP client: {}", e),
                retryable: false,
            })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, auth: Auth<'_>) -> PaymentResult<T> {
        self.request_json(reqwest::Method::GET, url, auth, None::<&()>)
            .await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        auth: Auth<'_>,
        body: &B,
    ) -> PaymentResult<T> {
        self.request_json(reqwest::Method::POST, url, auth, Some(body))
            .await
    }

    async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        url: &str,
        auth: Auth<'_>,
        body: Option<&B>,
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(self.timeout)
                .header("Content-Type", "application/json");

            request = match auth {
                Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
                Auth::Bearer(token) => request.bearer_auth(token),
            };
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = request.send().await.map_err(|e| PaymentError::Gateway {
                code: None,
                message: format!("gateway request failed: {}", e),
                retryable: true,
            });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::Gateway {
                                code: None,
                                message: format!("invalid gateway JSON response: {}", e),
                                retryable: false,
                            }
                        });
                    }

                    let error = gateway_error_from_body(status.as_u16(), &text);
                    if attempt < self.max_retries && should_retry(status.as_u16(), &error) {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "transient gateway error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(error);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::Gateway {
            code: None,
            message: "gateway request failed".to_string(),
            retryable: true,
        }))
    }
}

/// Preserve the provider's error code/message when the body is the standard
/// gateway error shape, falling back to the raw HTTP status otherwise.
fn gateway_error_from_body(status: u16, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<GatewayErrorBody>(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.error_code.clone())
        .unwrap_or_else(|| status.to_string());
    let message = parsed
        .and_then(|b| b.error_message)
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

    // "Transaction is being processed" arrives as a 5xx but is an expected
    // steady state, not a transient fault.
    let retryable = status >= 500 && code != QUERY_STILL_PROCESSING_CODE;
    PaymentError::Gateway {
        code: Some(code),
        message,
        retryable,
    }
}

/// The still-processing answer on the query endpoint is a 500 with its own
/// error code; retrying it wastes the whole backoff budget on a request that
/// will keep answering the same thing.
fn should_retry(status: u16, error: &PaymentError) -> bool {
    if status != 429 && status < 500 {
        return false;
    }
    !matches!(
        error,
        PaymentError::Gateway { code: Some(code), .. } if code == QUERY_STILL_PROCESSING_CODE
    )
}
