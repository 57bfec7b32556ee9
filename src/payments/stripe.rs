use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentProvider};
use crate::{config::StripeConfig, error::AppError, error::AppResult};

/// Hosted checkout sessions over the Stripe REST API.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form_params(request))
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|env| env.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(AppError::Payment(message));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("invalid response: {e}")))?;

        let url = session
            .url
            .ok_or_else(|| AppError::Payment("session has no redirect url".into()))?;

        tracing::debug!(session_id = %session.id, "stripe checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

/// Flattens a session request into Stripe's bracketed form encoding.
pub fn form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    if let Some(email) = &request.customer_email {
        params.push(("customer_email".into(), email.clone()));
    }

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        params.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][description]"),
            item.description.clone(),
        ));
        if let Some(image) = &item.image {
            params.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
    }

    for (key, value) in &request.metadata {
        params.push((format!("metadata[{key}]"), value.clone()));
    }

    params
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::payments::CheckoutLineItem;

    fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn line_items_are_flattened_with_indices() {
        let mut metadata = BTreeMap::new();
        metadata.insert("order_id".to_string(), "o-1".to_string());
        metadata.insert("user_id".to_string(), "u-1".to_string());
        let request = CheckoutSessionRequest {
            line_items: vec![
                CheckoutLineItem {
                    name: "Air Runner".into(),
                    description: "Black • Size 10".into(),
                    image: Some("https://shop.test/shoes/a.jpg".into()),
                    unit_amount: 5000,
                    quantity: 1,
                },
                CheckoutLineItem {
                    name: "Court Classic".into(),
                    description: "White • Size 9".into(),
                    image: None,
                    unit_amount: 3000,
                    quantity: 2,
                },
            ],
            currency: "usd".into(),
            success_url: "https://shop.test/orders/success?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_url: "https://shop.test/orders/cancel".into(),
            customer_email: None,
            metadata,
        };

        let params = form_params(&request);
        assert_eq!(lookup(&params, "mode"), Some("payment"));
        assert_eq!(lookup(&params, "line_items[0][price_data][unit_amount]"), Some("5000"));
        assert_eq!(lookup(&params, "line_items[1][quantity]"), Some("2"));
        assert_eq!(
            lookup(&params, "line_items[1][price_data][product_data][description]"),
            Some("White • Size 9")
        );
        assert_eq!(
            lookup(&params, "line_items[0][price_data][product_data][images][0]"),
            Some("https://shop.test/shoes/a.jpg")
        );
        assert!(lookup(&params, "line_items[1][price_data][product_data][images][0]").is_none());
        assert_eq!(lookup(&params, "metadata[order_id]"), Some("o-1"));
        assert!(lookup(&params, "customer_email").is_none());
        assert_eq!(request.total(), 11000);
    }
}
