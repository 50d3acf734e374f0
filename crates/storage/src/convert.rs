//! Mapping between database enums and their domain counterparts.

use picshare_domain::model::{
    BillingInterval, BillingStatus, BillingType, ModerationStatus, PaymentStatus,
    SubscriptionStatus,
};

use crate::entity::billing_history::BillingStatusDb;
use crate::entity::images::ModerationStatusDb;
use crate::entity::payments::PaymentStatusDb;
use crate::entity::subscription_plans::{BillingIntervalDb, BillingTypeDb};
use crate::entity::subscriptions::SubscriptionStatusDb;

macro_rules! enum_bridge {
    ($db:ident <=> $domain:ident { $($variant:ident),+ $(,)? }) => {
        impl From<$db> for $domain {
            fn from(value: $db) -> Self {
                match value {
                    $($db::$variant => $domain::$variant,)+
                }
            }
        }

        impl From<$domain> for $db {
            fn from(value: $domain) -> Self {
                match value {
                    $($domain::$variant => $db::$variant,)+
                }
            }
        }
    };
}

enum_bridge!(BillingTypeDb <=> BillingType { OneTime, Subscription });
enum_bridge!(BillingIntervalDb <=> BillingInterval { Month, Year });
enum_bridge!(SubscriptionStatusDb <=> SubscriptionStatus {
    Active,
    Expired,
    PaymentFailed,
    Canceled,
    Refunded,
});
enum_bridge!(ModerationStatusDb <=> ModerationStatus { Pending, Approved, Rejected });
enum_bridge!(PaymentStatusDb <=> PaymentStatus { Pending, Succeeded, Failed });
enum_bridge!(BillingStatusDb <=> BillingStatus { Paid, Failed, Refunded });
