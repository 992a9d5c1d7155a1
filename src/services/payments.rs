use crate::{config::PesapalConfig, entities::order, errors::ServiceError};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument};

/// Adapter for the Pesapal v3 hosted-payment API.
///
/// Checkout is two sequential calls: a short-lived bearer token, then the
/// order submission that yields the buyer's redirect URL. The token is
/// fetched fresh for every checkout — checkout is not high-frequency
/// per-order, and a stale cached token is one more failure mode we do not
/// need. The adapter never mutates order state; only the asynchronous IPN
/// handler does.
#[derive(Clone)]
pub struct PesapalGateway {
    http: reqwest::Client,
    cfg: PesapalConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitOrderResponse {
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterIpnResponse {
    ipn_id: Option<String>,
}

impl PesapalGateway {
    pub fn new(cfg: PesapalConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.timeout_secs)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.api_url.trim_end_matches('/'), path)
    }

    /// Credentials are validated at call time, not at startup, so the
    /// distinct configuration signal reaches the operator on the exact
    /// checkout that needed them.
    fn credentials(&self) -> Result<(&str, &str), ServiceError> {
        let key = self
            .cfg
            .consumer_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::Configuration("Pesapal consumer_key is not set".to_string())
            })?;
        let secret = self
            .cfg
            .consumer_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::Configuration("Pesapal consumer_secret is not set".to_string())
            })?;
        Ok((key, secret))
    }

    async fn request_token(&self) -> Result<String, ServiceError> {
        let (key, secret) = self.credentials()?;
        let url = self.endpoint("api/Auth/RequestToken");

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout())
            .json(&json!({
                "consumer_key": key,
                "consumer_secret": secret,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Gateway(format!("token response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(ServiceError::Gateway(format!(
                "token request returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| ServiceError::Gateway(format!("non-JSON token response: {body}")))?;
        parsed
            .token
            .ok_or_else(|| ServiceError::Gateway(format!("token missing from response: {body}")))
    }

    /// Submit the order to the gateway and return the hosted-payment
    /// redirect URL for the buyer.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn initiate_payment(
        &self,
        order: &order::Model,
        email: &str,
        phone: Option<&str>,
    ) -> Result<String, ServiceError> {
        let token = self.request_token().await?;
        let url = self.endpoint("api/Transactions/SubmitOrderRequest");

        let amount = order
            .total
            .to_f64()
            .ok_or_else(|| ServiceError::Internal("order total not representable".to_string()))?;
        let address = order.shipping_address.as_ref();
        let first_name = address
            .and_then(|a| a.get("first_name"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let last_name = address
            .and_then(|a| a.get("last_name"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let payload = json!({
            "id": order.id,
            "currency": self.cfg.currency,
            "amount": amount,
            "description": format!("Order #{}", order.id),
            "callback_url": self.cfg.callback_url,
            "notification_id": order.id,
            "billing_address": {
                "email_address": email,
                "phone_number": phone,
                "first_name": first_name,
                "last_name": last_name,
            },
        });

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout())
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(format!("order submission failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Gateway(format!("order response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(ServiceError::Gateway(format!(
                "order submission returned {status}: {body}"
            )));
        }

        let parsed: SubmitOrderResponse = serde_json::from_str(&body)
            .map_err(|_| ServiceError::Gateway(format!("non-JSON order response: {body}")))?;
        let redirect_url = parsed.redirect_url.ok_or_else(|| {
            ServiceError::Gateway(format!("redirect_url missing from response: {body}"))
        })?;

        info!("payment initiated at gateway");
        Ok(redirect_url)
    }

    /// One-time operator setup: register the IPN callback URL with the
    /// provider and return the issued IPN id.
    #[instrument(skip(self))]
    pub async fn register_ipn(&self) -> Result<String, ServiceError> {
        let token = self.request_token().await?;
        let url = self.endpoint("api/URLSetup/RegisterIPN");

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout())
            .bearer_auth(token)
            .json(&json!({
                "url": self.cfg.callback_url,
                "ipn_notification_type": "POST",
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(format!("IPN registration failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Gateway(format!("IPN response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(ServiceError::Gateway(format!(
                "IPN registration returned {status}: {body}"
            )));
        }

        let parsed: RegisterIpnResponse = serde_json::from_str(&body)
            .map_err(|_| ServiceError::Gateway(format!("non-JSON IPN response: {body}")))?;
        parsed
            .ipn_id
            .ok_or_else(|| ServiceError::Gateway(format!("ipn_id missing from response: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PesapalConfig;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn missing_credentials_is_a_configuration_error() {
        let gateway = PesapalGateway::new(PesapalConfig::default());
        let err = gateway.request_token().await.unwrap_err();
        assert_matches!(err, ServiceError::Configuration(_));
    }

    #[tokio::test]
    async fn blank_credentials_are_treated_as_missing() {
        let gateway = PesapalGateway::new(PesapalConfig {
            consumer_key: Some("  ".into()),
            consumer_secret: Some("secret".into()),
            ..PesapalConfig::default()
        });
        let err = gateway.request_token().await.unwrap_err();
        assert_matches!(err, ServiceError::Configuration(_));
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let gateway = PesapalGateway::new(PesapalConfig {
            api_url: "https://pay.pesapal.com/v3/".into(),
            ..PesapalConfig::default()
        });
        assert_eq!(
            gateway.endpoint("api/Auth/RequestToken"),
            "https://pay.pesapal.com/v3/api/Auth/RequestToken"
        );
    }
}
