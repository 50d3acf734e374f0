pub mod tenants {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "tenants")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub slug: String,
        pub name: String,
        pub description: Option<String>,
        pub owner_email: Option<String>,
        pub owner_phone: Option<String>,
        pub is_active: bool,
        pub is_public: bool,
        pub payment_enabled: bool,
        pub price_amount: i64,
        pub price_currency: String,
        pub display_duration: i32,
        pub image_expiry_hours: i32,
        pub max_images_per_user: Option<i32>,
        pub theme_settings: Json,
        pub display_settings: Json,
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod subscription_plans {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "subscription_plans")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub plan_key: String,
        pub name: String,
        pub description: Option<String>,
        pub price: i64,
        pub currency: String,
        pub billing_type: BillingTypeDb,
        pub billing_interval: Option<BillingIntervalDb>,
        pub duration_days: Option<i32>,
        pub features: Json,
        pub is_active: bool,
        pub sort_order: i32,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum BillingTypeDb {
        #[sea_orm(string_value = "one_time")]
        OneTime,
        #[sea_orm(string_value = "subscription")]
        Subscription,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(8))")]
    pub enum BillingIntervalDb {
        #[sea_orm(string_value = "month")]
        Month,
        #[sea_orm(string_value = "year")]
        Year,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod subscriptions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "subscriptions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub plan_id: Uuid,
        pub status: SubscriptionStatusDb,
        pub current_period_start: DateTimeUtc,
        pub current_period_end: DateTimeUtc,
        pub admin_username: Option<String>,
        pub admin_password_hash: Option<String>,
        pub credentials_sent: bool,
        pub stripe_customer_id: Option<String>,
        pub stripe_payment_intent_id: Option<String>,
        pub stripe_subscription_id: Option<String>,
        pub expiry_warning_sent: bool,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum SubscriptionStatusDb {
        #[sea_orm(string_value = "active")]
        Active,
        #[sea_orm(string_value = "expired")]
        Expired,
        #[sea_orm(string_value = "payment_failed")]
        PaymentFailed,
        #[sea_orm(string_value = "canceled")]
        Canceled,
        #[sea_orm(string_value = "refunded")]
        Refunded,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod admins {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "admins")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub username: String,
        pub password_hash: String,
        pub email: Option<String>,
        pub tenant_id: Option<Uuid>,
        pub is_super_admin: bool,
        pub role: String,
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod images {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "images")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub payment_id: Option<Uuid>,
        pub original_filename: Option<String>,
        pub file_path: String,
        pub thumbnail_path: String,
        pub file_url: String,
        pub thumbnail_url: String,
        pub file_size: i64,
        pub width: i32,
        pub height: i32,
        pub mime_type: String,
        pub status: ModerationStatusDb,
        pub approved_by: Option<Uuid>,
        pub approved_at: Option<DateTimeUtc>,
        pub rejection_reason: Option<String>,
        pub expires_at: Option<DateTimeUtc>,
        pub session_id: Option<String>,
        pub caption: Option<String>,
        pub like_count: i32,
        pub comment_count: i32,
        pub uploaded_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum ModerationStatusDb {
        #[sea_orm(string_value = "pending")]
        Pending,
        #[sea_orm(string_value = "approved")]
        Approved,
        #[sea_orm(string_value = "rejected")]
        Rejected,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod payments {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "payments")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        #[sea_orm(unique)]
        pub stripe_payment_intent_id: String,
        pub amount: i64,
        pub currency: String,
        pub status: PaymentStatusDb,
        pub session_id: Option<String>,
        pub metadata: Json,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum PaymentStatusDb {
        #[sea_orm(string_value = "pending")]
        Pending,
        #[sea_orm(string_value = "succeeded")]
        Succeeded,
        #[sea_orm(string_value = "failed")]
        Failed,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod likes {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "likes")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub image_id: Uuid,
        pub session_id: String,
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod comments {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "comments")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub image_id: Uuid,
        pub tenant_id: Uuid,
        pub session_id: String,
        pub content: String,
        pub is_hidden: bool,
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod billing_history {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "billing_history")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub subscription_id: Option<Uuid>,
        pub amount: i64,
        pub currency: String,
        pub status: BillingStatusDb,
        pub description: Option<String>,
        pub stripe_payment_intent_id: Option<String>,
        pub paid_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
    pub enum BillingStatusDb {
        #[sea_orm(string_value = "paid")]
        Paid,
        #[sea_orm(string_value = "failed")]
        Failed,
        #[sea_orm(string_value = "refunded")]
        Refunded,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
