//! Minimal Stripe REST client. Requests are form encoded with bracketed keys
//! (`metadata[tenant_id]`, `payment_method_types[]`) as the API expects.

use std::collections::BTreeMap;

use async_trait::async_trait;
use metrics::counter;
use picshare_domain::services::gateway::{
    Customer, GatewayError, NewCustomer, NewPaymentIntent, PaymentGateway, PaymentIntent,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(api_base: &str, secret_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| {
                counter!("stripe_requests_total", "operation" => operation, "result" => "transport").increment(1);
                GatewayError::Transport(err.to_string())
            })?;
        let parsed = decode(response).await;
        let result = if parsed.is_ok() { "ok" } else { "error" };
        counter!("stripe_requests_total", "operation" => operation, "result" => result).increment(1);
        parsed
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| GatewayError::Transport(err.to_string()))?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or(body);
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_str(&body).map_err(|err| GatewayError::Decode(err.to_string()))
}

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &BTreeMap<String, String>) {
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
}

pub(crate) fn customer_form(customer: &NewCustomer) -> Vec<(String, String)> {
    let mut form = vec![("email".to_string(), customer.email.clone())];
    if let Some(name) = &customer.name {
        form.push(("name".to_string(), name.clone()));
    }
    if let Some(phone) = &customer.phone {
        form.push(("phone".to_string(), phone.clone()));
    }
    push_metadata(&mut form, &customer.metadata);
    form
}

pub(crate) fn payment_intent_form(intent: &NewPaymentIntent) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), intent.amount.to_string()),
        ("currency".to_string(), intent.currency.to_ascii_lowercase()),
    ];
    if let Some(customer) = &intent.customer {
        form.push(("customer".to_string(), customer.clone()));
    }
    for method in &intent.payment_method_types {
        form.push(("payment_method_types[]".to_string(), method.clone()));
    }
    if let Some(description) = &intent.description {
        form.push(("description".to_string(), description.clone()));
    }
    if let Some(email) = &intent.receipt_email {
        form.push(("receipt_email".to_string(), email.clone()));
    }
    push_metadata(&mut form, &intent.metadata);
    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, GatewayError> {
        let form = customer_form(&customer);
        let request = self.client.post(self.url("customers")).form(&form);
        let created: Customer = self.send("create_customer", request).await?;
        debug!(customer = %created.id, "stripe customer created");
        Ok(created)
    }

    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        let form = payment_intent_form(&intent);
        let request = self.client.post(self.url("payment_intents")).form(&form);
        let created: PaymentIntent = self.send("create_payment_intent", request).await?;
        debug!(intent = %created.id, amount = created.amount, "stripe payment intent created");
        Ok(created)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        let request = self.client.get(self.url(&format!("payment_intents/{id}")));
        self.send("retrieve_payment_intent", request).await
    }
}
