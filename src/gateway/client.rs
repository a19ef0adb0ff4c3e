use crate::config::DarajaConfig;
use crate::gateway::http::{Auth, GatewayHttpClient};
use crate::gateway::phone::normalize_phone;
use crate::gateway::types::{
    OAuthTokenResponse, PaymentIntent, StkPushPayload, StkPushResponse, StkQueryOutcome,
    StkQueryPayload, StkQueryResponse, QUERY_STILL_PROCESSING_CODE,
};
use crate::payments::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bigdecimal::ToPrimitive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Refresh the token this long before its stated expiry.
const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Abstraction over the STK push gateway so the reconciliation engine and
/// API handlers can be exercised against a test double.
#[async_trait]
pub trait StkGateway: Send + Sync {
    async fn initiate(&self, intent: &PaymentIntent) -> PaymentResult<StkPushResponse>;
    async fn query_status(&self, checkout_request_id: &str) -> PaymentResult<StkQueryOutcome>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_SAFETY_MARGIN < self.expires_at
    }
}

/// Holds the bearer token between credential exchanges.
///
/// The lock is never held across the exchange itself; two callers racing a
/// stale token both exchange and the later write wins, which the gateway
/// tolerates.
struct TokenCache {
    inner: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    async fn invalidate(&self) {
        *self.inner.write().await = None;
    }

    async fn is_empty(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Return the cached token while fresh, otherwise run `exchange` (which
    /// yields the token and its lifetime in seconds) and cache the result.
    async fn get_or_exchange<F, Fut>(&self, exchange: F) -> PaymentResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = PaymentResult<(String, u64)>>,
    {
        {
            let cached = self.inner.read().await;
            if let Some(token) = cached.as_ref() {
                if token.is_fresh(Instant::now()) {
                    return Ok(token.token.clone());
                }
            }
        }

        let (token, lifetime_secs) = exchange().await?;
        let mut cached = self.inner.write().await;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime_secs),
        });
        Ok(token)
    }
}

/// Client for the Daraja STK push API.
///
/// The OAuth token is cached until shortly before expiry. Concurrent
/// refreshes are tolerated: both fetch, the later write wins, and no lock is
/// held across the network call. Reconfiguration swaps the config `Arc` and
/// drops the cached token so the next call authenticates with the new
/// credentials.
pub struct DarajaClient {
    config: RwLock<Arc<DarajaConfig>>,
    token: TokenCache,
    http: GatewayHttpClient,
}

impl DarajaClient {
    pub fn new(config: DarajaConfig) -> PaymentResult<Self> {
        let http = GatewayHttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            token: TokenCache::new(),
            http,
        })
    }

    /// Swap in a new gateway configuration and invalidate the cached token.
    pub async fn replace_config(&self, new_config: DarajaConfig) {
        let mut config = self.config.write().await;
        *config = Arc::new(new_config);
        drop(config);

        self.token.invalidate().await;
        info!("gateway configuration replaced, token cache cleared");
    }

    pub async fn current_config(&self) -> Arc<DarajaConfig> {
        self.config.read().await.clone()
    }

    async fn access_token(&self, config: &DarajaConfig) -> PaymentResult<String> {
        self.token
            .get_or_exchange(|| async {
                let url = format!(
                    "{}/oauth/v1/generate?grant_type=client_credentials",
                    config.base_url()
                );
                let response: OAuthTokenResponse = self
                    .http
                    .get_json(
                        &url,
                        Auth::Basic {
                            username: &config.consumer_key,
                            password: &config.consumer_secret,
                        },
                    )
                    .await
                    .map_err(|e| PaymentError::Auth {
                        message: e.to_string(),
                    })?;

                let lifetime = response.expires_in.trim().parse::<u64>().map_err(|_| {
                    PaymentError::Auth {
                        message: format!("invalid token lifetime: {}", response.expires_in),
                    }
                })?;
                debug!(lifetime_secs = lifetime, "gateway token refreshed");
                Ok((response.access_token, lifetime))
            })
            .await
    }

    fn ensure_configured(config: &DarajaConfig) -> PaymentResult<()> {
        let missing = config.validate();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PaymentError::Validation {
                message: format!("M-Pesa gateway is not configured: missing {}", missing.join(", ")),
                field: None,
            })
        }
    }

    fn validate_intent(intent: &PaymentIntent) -> PaymentResult<(u64, String)> {
        let amount = intent
            .amount
            .round(0)
            .to_u64()
            .filter(|a| *a > 0)
            .ok_or_else(|| PaymentError::Validation {
                message: "amount must be a positive whole number of shillings".to_string(),
                field: Some("amount".to_string()),
            })?;

        let phone = normalize_phone(&intent.phone_number);
        if phone.len() != 12 || !phone.starts_with("254") {
            return Err(PaymentError::Validation {
                message: format!("invalid phone number: {}", intent.phone_number),
                field: Some("phoneNumber".to_string()),
            });
        }

        Ok((amount, phone))
    }
}

/// Gateway timestamp in local server time.
pub fn gateway_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// STK password: base64 of shortcode, passkey and timestamp concatenated.
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

#[async_trait]
impl StkGateway for DarajaClient {
    async fn initiate(&self, intent: &PaymentIntent) -> PaymentResult<StkPushResponse> {
        let config = self.current_config().await;
        Self::ensure_configured(&config)?;
        let (amount, phone) = Self::validate_intent(intent)?;

        let token = self.access_token(&config).await?;
        let timestamp = gateway_timestamp();

        // Till payments use the buy-goods flow with the till as the payee;
        // paybill payments charge against the shortcode itself.
        let (transaction_type, party_b) = match &config.till_number {
            Some(till) => ("CustomerBuyGoodsOnline", till.clone()),
            None => (
                "CustomerPayBillOnline",
                config
                    .paybill_number
                    .clone()
                    .unwrap_or_else(|| config.business_short_code.clone()),
            ),
        };

        let payload = StkPushPayload {
            business_short_code: config.business_short_code.clone(),
            password: stk_password(&config.business_short_code, &config.passkey, &timestamp),
            timestamp,
            transaction_type: transaction_type.to_string(),
            amount,
            party_a: phone.clone(),
            party_b,
            phone_number: phone,
            callback_url: config.callback_url.clone(),
            account_reference: intent.account_reference.clone(),
            transaction_desc: intent.transaction_desc.clone(),
        };

        let url = format!("{}/mpesa/stkpush/v1/processrequest", config.base_url());
        let response: StkPushResponse = self
            .http
            .post_json(&url, Auth::Bearer(&token), &payload)
            .await?;

        if response.response_code != "0" {
            warn!(
                response_code = %response.response_code,
                invoice_id = %intent.invoice_id,
                "gateway rejected push request"
            );
            return Err(PaymentError::Gateway {
                code: Some(response.response_code.clone()),
                message: response.response_description.clone(),
                retryable: false,
            });
        }

        info!(
            checkout_request_id = %response.checkout_request_id,
            invoice_id = %intent.invoice_id,
            amount,
            "push request accepted"
        );
        Ok(response)
    }

    async fn query_status(&self, checkout_request_id: &str) -> PaymentResult<StkQueryOutcome> {
        let config = self.current_config().await;
        Self::ensure_configured(&config)?;
        let token = self.access_token(&config).await?;

        let timestamp = gateway_timestamp();
        let payload = StkQueryPayload {
            business_short_code: config.business_short_code.clone(),
            password: stk_password(&config.business_short_code, &config.passkey, &timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let url = format!("{}/mpesa/stkpushquery/v1/query", config.base_url());
        let response: PaymentResult<StkQueryResponse> =
            self.http.post_json(&url, Auth::Bearer(&token), &payload).await;

        let response = match response {
            Ok(resp) => resp,
            // The gateway reports an unsettled request as an error code on
            // this endpoint; treat it as still pending, not a failure.
            Err(PaymentError::Gateway { code: Some(code), .. })
                if code == QUERY_STILL_PROCESSING_CODE =>
            {
                return Ok(StkQueryOutcome::StillPending);
            }
            Err(e) => return Err(e),
        };

        match response.result_code() {
            Some(0) => Ok(StkQueryOutcome::Completed),
            Some(code) => Ok(StkQueryOutcome::Failed {
                code,
                description: response
                    .result_desc
                    .unwrap_or_else(|| "payment failed".to_string()),
            }),
            None => Ok(StkQueryOutcome::StillPending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DarajaEnvironment;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn config() -> DarajaConfig {
        DarajaConfig {
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            business_short_code: "174379".to_string(),
            till_number: None,
            paybill_number: Some("174379".to_string()),
            passkey: "passkey".to_string(),
            environment: DarajaEnvironment::Sandbox,
            callback_url: "https://clinic.example/payments/callback".to_string(),
            account_reference: "CLINIC".to_string(),
            transaction_desc: "Medical Services Payment".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    fn intent(amount: &str, phone: &str) -> PaymentIntent {
        PaymentIntent {
            amount: BigDecimal::from_str(amount).expect("valid decimal"),
            phone_number: phone.to_string(),
            account_reference: "INV-001".to_string(),
            transaction_desc: "Medical Services Payment".to_string(),
            invoice_id: "INV-001".to_string(),
            patient_id: "PAT-001".to_string(),
        }
    }

    #[test]
    fn password_is_base64_of_concatenation() {
        let password = stk_password("174379", "passkey", "20260829101500");
        let decoded = BASE64.decode(password).expect("valid base64");
        assert_eq!(decoded, b"174379passkey20260829101500");
    }

    #[test]
    fn timestamp_is_fourteen_digits() {
        let ts = gateway_timestamp();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn token_freshness_respects_safety_margin() {
        let now = Instant::now();
        let fresh = CachedToken {
            token: "t".to_string(),
            expires_at: now + Duration::from_secs(3599),
        };
        assert!(fresh.is_fresh(now));

        let nearly_expired = CachedToken {
            token: "t".to_string(),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!nearly_expired.is_fresh(now));
    }

    #[test]
    fn intent_validation_rounds_and_normalizes() {
        let (amount, phone) =
            DarajaClient::validate_intent(&intent("499.75", "0712345678")).expect("valid");
        assert_eq!(amount, 500);
        assert_eq!(phone, "254712345678");
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = DarajaClient::validate_intent(&intent("0", "0712345678")).unwrap_err();
        assert!(matches!(err, PaymentError::Validation { .. }));
    }

    #[test]
    fn short_phone_is_rejected() {
        let err = DarajaClient::validate_intent(&intent("100", "12345")).unwrap_err();
        match err {
            PaymentError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("phoneNumber"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unconfigured_gateway_fails_before_any_network_call() {
        let mut incomplete = config();
        incomplete.consumer_key = String::new();
        incomplete.callback_url = String::new();
        let client = DarajaClient::new(incomplete).expect("client builds");

        let err = client.initiate(&intent("100", "0712345678")).await.unwrap_err();
        match err {
            PaymentError::Validation { message, .. } => {
                assert!(message.contains("consumerKey"));
                assert!(message.contains("callbackUrl"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn replace_config_swaps_credentials() {
        let client = DarajaClient::new(config()).expect("client builds");
        let mut updated = config();
        updated.environment = DarajaEnvironment::Production;
        client.replace_config(updated).await;

        let current = client.current_config().await;
        assert_eq!(current.environment, DarajaEnvironment::Production);
        assert!(client.token.is_empty().await);
    }

    fn exchange_ok(token: &str, lifetime: u64) -> crate::payments::error::PaymentResult<(String, u64)> {
        Ok((token.to_string(), lifetime))
    }

    #[tokio::test]
    async fn token_is_exchanged_once_within_its_lifetime() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = TokenCache::new();
        let exchanges = AtomicUsize::new(0);
        for _ in 0..3 {
            let token = cache
                .get_or_exchange(|| async {
                    exchanges.fetch_add(1, Ordering::SeqCst);
                    exchange_ok("token-a", 3599)
                })
                .await
                .expect("exchange succeeds");
            assert_eq!(token, "token-a");
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_inside_the_safety_margin_is_exchanged_again() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = TokenCache::new();
        let exchanges = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_exchange(|| async {
                    exchanges.fetch_add(1, Ordering::SeqCst);
                    // Lifetime shorter than the safety margin: stale at once.
                    exchange_ok("token-a", 30)
                })
                .await
                .expect("exchange succeeds");
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_exchange_is_not_cached() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = TokenCache::new();
        let failed = cache
            .get_or_exchange(|| async {
                Err(PaymentError::Auth {
                    message: "invalid credentials".to_string(),
                })
            })
            .await;
        assert!(failed.is_err());

        let exchanges = AtomicUsize::new(0);
        let token = cache
            .get_or_exchange(|| async {
                exchanges.fetch_add(1, Ordering::SeqCst);
                exchange_ok("token-b", 3599)
            })
            .await
            .expect("next call exchanges again");
        assert_eq!(token, "token-b");
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }
}
