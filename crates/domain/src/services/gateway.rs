use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATUS_SUCCEEDED: &str = "succeeded";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment provider unreachable: {0}")]
    Transport(String),
    #[error("payment provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("payment provider response could not be decoded: {0}")]
    Decode(String),
}

impl GatewayError {
    /// The provider reported the referenced object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::Api { status: 404, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == STATUS_SUCCEEDED
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub amount: i64,
    pub currency: String,
    pub customer: Option<String>,
    pub payment_method_types: Vec<String>,
    pub description: Option<String>,
    pub receipt_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// `card` everywhere, plus PromptPay for Thai baht.
pub fn payment_method_types_for(currency: &str) -> Vec<String> {
    let mut methods = vec!["card".to_string()];
    if currency.eq_ignore_ascii_case("thb") {
        methods.push("promptpay".to_string());
    }
    methods
}

/// Payment provider operations consumed by signup, the upload gate and the
/// per-upload payment flow.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, GatewayError>;
    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, GatewayError>;
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promptpay_only_offered_for_thb() {
        assert_eq!(payment_method_types_for("thb"), vec!["card", "promptpay"]);
        assert_eq!(payment_method_types_for("THB"), vec!["card", "promptpay"]);
        assert_eq!(payment_method_types_for("usd"), vec!["card"]);
    }

    #[test]
    fn payment_intent_decodes_provider_shape() {
        let intent: PaymentIntent = serde_json::from_str(
            r#"{"id":"pi_1","object":"payment_intent","status":"succeeded","amount":19900,
                "currency":"thb","customer":null,"metadata":{"tenant_id":"abc"}}"#,
        )
        .unwrap();
        assert!(intent.is_succeeded());
        assert_eq!(intent.metadata_value("tenant_id"), Some("abc"));
        assert_eq!(intent.customer, None);
    }
}
