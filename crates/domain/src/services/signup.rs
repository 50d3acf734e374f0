//! Tenant provisioning: the free trial path and the paid path gated on a
//! succeeded payment intent.
//!
//! Provisioning runs as a saga. Each created row is recorded, and a failure
//! at any later step deletes them again in reverse order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::{
    validate_slug, BillingStatus, NewAdmin, NewBillingRecord, NewSubscription, NewTenant,
    SlugError, Subscription, SubscriptionPlan, SubscriptionStatus, Tenant, TRIAL_PLAN_KEY,
};
use crate::services::credentials::{hash_password, CredentialError, GeneratedCredentials};
use crate::services::gateway::{
    payment_method_types_for, GatewayError, NewCustomer, NewPaymentIntent, PaymentGateway,
};
use crate::services::notify::{send_best_effort, Mailer, ReceiptEmail, WelcomeEmail};
use crate::storage::{
    AdminStore, BillingStore, PlanStore, StorageError, SubscriptionStore, TenantStore,
};

const USERNAME_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("Missing required fields")]
    MissingFields,
    #[error("Invalid slug: {0}")]
    InvalidSlug(#[from] SlugError),
    #[error("Slug already taken")]
    SlugTaken,
    #[error("Tenant already created")]
    AlreadyProvisioned,
    #[error("Invalid plan")]
    PlanNotFound,
    #[error("plan catalog is missing `{0}`")]
    CatalogMissing(String),
    #[error("This plan does not require payment")]
    PlanNotPayable,
    #[error("Payment not completed")]
    PaymentNotCompleted,
    #[error("Payment does not match this signup")]
    PaymentMismatch,
    #[error("could not allocate a unique admin username")]
    UsernameExhausted,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub plan_key: Option<String>,
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub shop_slug: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub owner_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSignupRequest {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub shop_slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Contact {
    shop_name: String,
    shop_slug: String,
    owner_email: String,
    owner_phone: String,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SignupRequest {
    fn contact(&self) -> Result<Contact, SignupError> {
        Ok(Contact {
            shop_name: present(&self.shop_name).ok_or(SignupError::MissingFields)?,
            shop_slug: present(&self.shop_slug).ok_or(SignupError::MissingFields)?,
            owner_email: present(&self.owner_email).ok_or(SignupError::MissingFields)?,
            owner_phone: present(&self.owner_phone).ok_or(SignupError::MissingFields)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupPayment {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub customer_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub tenant: Tenant,
    pub subscription: Subscription,
    pub plan: SubscriptionPlan,
    pub credentials: GeneratedCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlugAvailability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Format rules first, then uniqueness.
pub async fn check_slug_availability<S>(
    store: &S,
    slug: &str,
) -> Result<SlugAvailability, StorageError>
where
    S: TenantStore + ?Sized,
{
    if let Err(err) = validate_slug(slug) {
        return Ok(SlugAvailability {
            available: false,
            reason: Some(err.reason()),
        });
    }
    Ok(SlugAvailability {
        available: !store.slug_exists(slug).await?,
        reason: None,
    })
}

/// Everything the saga needs to create one tenant.
struct Provisioning {
    contact: Contact,
    plan: SubscriptionPlan,
    period_start: DateTime<Utc>,
    stripe_customer_id: Option<String>,
    stripe_payment_intent_id: Option<String>,
    billing: Option<(i64, String)>,
}

#[derive(Debug, Clone, Copy)]
enum Created {
    Tenant(Uuid),
    Subscription(Uuid),
    Admin(Uuid),
    Billing(Uuid),
}

pub struct SignupService<'a, S: ?Sized> {
    store: &'a S,
    gateway: &'a dyn PaymentGateway,
    mailer: &'a dyn Mailer,
    base_url: &'a str,
}

impl<'a, S> SignupService<'a, S>
where
    S: TenantStore + PlanStore + SubscriptionStore + AdminStore + BillingStore + ?Sized,
{
    pub fn new(
        store: &'a S,
        gateway: &'a dyn PaymentGateway,
        mailer: &'a dyn Mailer,
        base_url: &'a str,
    ) -> Self {
        Self {
            store,
            gateway,
            mailer,
            base_url,
        }
    }

    pub async fn create_trial(
        &self,
        request: &SignupRequest,
        now: DateTime<Utc>,
    ) -> Result<SignupOutcome, SignupError> {
        let result = self.create_trial_inner(request, now).await;
        record_outcome("trial", &result);
        result
    }

    async fn create_trial_inner(
        &self,
        request: &SignupRequest,
        now: DateTime<Utc>,
    ) -> Result<SignupOutcome, SignupError> {
        let contact = request.contact()?;
        validate_slug(&contact.shop_slug)?;
        if self.store.slug_exists(&contact.shop_slug).await? {
            return Err(SignupError::SlugTaken);
        }
        let plan = self
            .store
            .find_plan_by_key(TRIAL_PLAN_KEY)
            .await?
            .ok_or_else(|| SignupError::CatalogMissing(TRIAL_PLAN_KEY.to_string()))?;

        let outcome = self
            .provision(Provisioning {
                contact,
                plan,
                period_start: now,
                stripe_customer_id: None,
                stripe_payment_intent_id: None,
                billing: None,
            })
            .await?;
        self.send_welcome(&outcome).await;
        Ok(outcome)
    }

    /// Starts the paid path. The plan is checked before the remaining
    /// fields so free plans are turned away with a specific message.
    pub async fn create_payment_intent(
        &self,
        request: &SignupRequest,
    ) -> Result<SignupPayment, SignupError> {
        let result = self.create_payment_intent_inner(request).await;
        let label = match &result {
            Ok(_) => "ok",
            Err(err) => error_label(err),
        };
        counter!("signup_requests_total", "path" => "create_payment", "result" => label)
            .increment(1);
        result
    }

    async fn create_payment_intent_inner(
        &self,
        request: &SignupRequest,
    ) -> Result<SignupPayment, SignupError> {
        let plan_key = present(&request.plan_key).ok_or(SignupError::MissingFields)?;
        let plan = self
            .store
            .find_plan_by_key(&plan_key)
            .await?
            .filter(|plan| plan.is_active)
            .ok_or(SignupError::PlanNotFound)?;
        if !plan.requires_payment() {
            return Err(SignupError::PlanNotPayable);
        }

        let contact = request.contact()?;
        validate_slug(&contact.shop_slug)?;
        if self.store.slug_exists(&contact.shop_slug).await? {
            return Err(SignupError::SlugTaken);
        }

        let customer = self
            .gateway
            .create_customer(NewCustomer {
                email: contact.owner_email.clone(),
                name: Some(contact.shop_name.clone()),
                phone: Some(contact.owner_phone.clone()),
                metadata: BTreeMap::from([
                    ("plan_key".to_string(), plan.key.clone()),
                    ("shop_slug".to_string(), contact.shop_slug.clone()),
                ]),
            })
            .await?;

        let metadata = BTreeMap::from([
            ("plan_key".to_string(), plan.key.clone()),
            ("plan_name".to_string(), plan.name.clone()),
            ("shop_name".to_string(), contact.shop_name.clone()),
            ("shop_slug".to_string(), contact.shop_slug.clone()),
            ("owner_email".to_string(), contact.owner_email.clone()),
            ("owner_phone".to_string(), contact.owner_phone.clone()),
        ]);
        let intent = self
            .gateway
            .create_payment_intent(NewPaymentIntent {
                amount: plan.price,
                currency: plan.currency.clone(),
                customer: Some(customer.id.clone()),
                payment_method_types: payment_method_types_for(&plan.currency),
                description: Some(format!("{} - {}", plan.name, contact.shop_name)),
                receipt_email: Some(contact.owner_email.clone()),
                metadata,
            })
            .await?;

        info!(plan = %plan.key, slug = %contact.shop_slug, intent = %intent.id, "signup payment intent created");
        Ok(SignupPayment {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            customer_id: customer.id,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    pub async fn complete(
        &self,
        request: &CompleteSignupRequest,
        now: DateTime<Utc>,
    ) -> Result<SignupOutcome, SignupError> {
        let result = self.complete_inner(request, now).await;
        record_outcome("complete", &result);
        result
    }

    async fn complete_inner(
        &self,
        request: &CompleteSignupRequest,
        now: DateTime<Utc>,
    ) -> Result<SignupOutcome, SignupError> {
        let intent_id = present(&request.payment_intent_id).ok_or(SignupError::MissingFields)?;
        let shop_slug = present(&request.shop_slug).ok_or(SignupError::MissingFields)?;

        let intent = self.gateway.retrieve_payment_intent(&intent_id).await?;
        if !intent.is_succeeded() {
            return Err(SignupError::PaymentNotCompleted);
        }
        if intent.metadata_value("shop_slug") != Some(shop_slug.as_str()) {
            return Err(SignupError::PaymentMismatch);
        }

        validate_slug(&shop_slug)?;
        if self.store.slug_exists(&shop_slug).await? {
            return Err(SignupError::AlreadyProvisioned);
        }

        let plan_key = intent
            .metadata_value("plan_key")
            .ok_or(SignupError::PaymentMismatch)?;
        let plan = self
            .store
            .find_plan_by_key(plan_key)
            .await?
            .ok_or(SignupError::PlanNotFound)?;

        let metadata = |key: &str| intent.metadata_value(key).unwrap_or_default().to_string();
        let contact = Contact {
            shop_name: Some(metadata("shop_name"))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| shop_slug.clone()),
            shop_slug,
            owner_email: metadata("owner_email"),
            owner_phone: metadata("owner_phone"),
        };

        let outcome = self
            .provision(Provisioning {
                contact,
                plan,
                period_start: now,
                stripe_customer_id: intent.customer.clone(),
                stripe_payment_intent_id: Some(intent.id.clone()),
                billing: Some((intent.amount, intent.currency.clone())),
            })
            .await?;

        self.send_welcome(&outcome).await;
        if let Some(email) = outcome.tenant.owner_email.as_deref() {
            let receipt = ReceiptEmail {
                to: email,
                shop_name: &outcome.tenant.name,
                plan_name: &outcome.plan.name,
                amount: intent.amount,
                currency: &intent.currency,
                payment_reference: &intent.id,
                paid_at: now,
            }
            .render();
            send_best_effort(self.mailer, "receipt", receipt).await;
        }
        Ok(outcome)
    }

    async fn provision(&self, provisioning: Provisioning) -> Result<SignupOutcome, SignupError> {
        let mut created = Vec::with_capacity(4);
        match self.provision_steps(provisioning, &mut created).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(error = %err, steps = created.len(), "signup provisioning failed; compensating");
                self.compensate(created).await;
                Err(err)
            }
        }
    }

    async fn provision_steps(
        &self,
        provisioning: Provisioning,
        created: &mut Vec<Created>,
    ) -> Result<SignupOutcome, SignupError> {
        let Provisioning {
            contact,
            plan,
            period_start,
            stripe_customer_id,
            stripe_payment_intent_id,
            billing,
        } = provisioning;

        let credentials = self.allocate_credentials(&contact.shop_name).await?;
        let password_hash = hash_password(&credentials.password)?;

        let mut new_tenant = NewTenant::new(contact.shop_slug.clone(), contact.shop_name.clone());
        new_tenant.owner_email = Some(contact.owner_email.clone()).filter(|v| !v.is_empty());
        new_tenant.owner_phone = Some(contact.owner_phone.clone()).filter(|v| !v.is_empty());
        let tenant = match self.store.insert_tenant(new_tenant).await {
            Ok(tenant) => tenant,
            Err(err) if err.is_conflict() => return Err(SignupError::SlugTaken),
            Err(err) => return Err(err.into()),
        };
        created.push(Created::Tenant(tenant.id));

        let subscription = self
            .store
            .insert_subscription(NewSubscription {
                tenant_id: tenant.id,
                plan_id: plan.id,
                status: SubscriptionStatus::Active,
                current_period_start: period_start,
                current_period_end: plan.period_end(period_start),
                admin_username: Some(credentials.username.clone()),
                admin_password_hash: Some(password_hash.clone()),
                credentials_sent: false,
                stripe_customer_id,
                stripe_payment_intent_id: stripe_payment_intent_id.clone(),
            })
            .await?;
        created.push(Created::Subscription(subscription.id));

        let mut admin = NewAdmin::tenant_admin(tenant.id, credentials.username.clone(), password_hash);
        admin.email = tenant.owner_email.clone();
        let admin = self.store.insert_admin(admin).await?;
        created.push(Created::Admin(admin.id));

        if let Some((amount, currency)) = billing {
            let record = self
                .store
                .append_billing_record(NewBillingRecord {
                    tenant_id: tenant.id,
                    subscription_id: Some(subscription.id),
                    amount,
                    currency,
                    status: BillingStatus::Paid,
                    description: Some(format!("{} - {}", plan.name, tenant.name)),
                    stripe_payment_intent_id,
                    paid_at: period_start,
                })
                .await?;
            created.push(Created::Billing(record.id));
        }

        info!(tenant = %tenant.slug, plan = %plan.key, admin = %credentials.username, "tenant provisioned");
        Ok(SignupOutcome {
            tenant,
            subscription,
            plan,
            credentials,
        })
    }

    async fn allocate_credentials(
        &self,
        shop_name: &str,
    ) -> Result<GeneratedCredentials, SignupError> {
        for _ in 0..USERNAME_ATTEMPTS {
            let candidate = GeneratedCredentials::generate(shop_name)?;
            if !self.store.username_exists(&candidate.username).await? {
                return Ok(candidate);
            }
        }
        Err(SignupError::UsernameExhausted)
    }

    async fn compensate(&self, created: Vec<Created>) {
        for step in created.into_iter().rev() {
            let result = match step {
                Created::Billing(id) => self.store.delete_billing_record(id).await,
                Created::Admin(id) => self.store.delete_admin(id).await,
                Created::Subscription(id) => self.store.delete_subscription(id).await,
                Created::Tenant(id) => self.store.delete_tenant(id).await,
            };
            if let Err(err) = result {
                error!(?step, error = %err, "signup compensation failed; manual cleanup required");
                counter!("signup_compensation_failures_total").increment(1);
            }
        }
    }

    async fn send_welcome(&self, outcome: &SignupOutcome) {
        let Some(email) = outcome.tenant.owner_email.as_deref() else {
            return;
        };
        let message = WelcomeEmail {
            to: email,
            shop_name: &outcome.tenant.name,
            shop_slug: &outcome.tenant.slug,
            username: &outcome.credentials.username,
            password: &outcome.credentials.password,
            plan_name: &outcome.plan.name,
            period_end: outcome.subscription.current_period_end,
            base_url: self.base_url,
        }
        .render();
        if send_best_effort(self.mailer, "welcome", message).await {
            if let Err(err) = self
                .store
                .mark_credentials_sent(outcome.subscription.id)
                .await
            {
                warn!(subscription = %outcome.subscription.id, error = %err, "failed to flag credentials as sent");
            }
        }
    }
}

fn error_label(err: &SignupError) -> &'static str {
    match err {
        SignupError::MissingFields | SignupError::InvalidSlug(_) => "invalid",
        SignupError::SlugTaken | SignupError::AlreadyProvisioned => "conflict",
        SignupError::PlanNotFound | SignupError::PlanNotPayable => "invalid_plan",
        SignupError::PaymentNotCompleted | SignupError::PaymentMismatch => "payment",
        _ => "error",
    }
}

fn record_outcome(path: &'static str, result: &Result<SignupOutcome, SignupError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(err) => error_label(err),
    };
    counter!("signup_requests_total", "path" => path, "result" => label).increment(1);
}
