//! Subscription Models
//!
//! Subscriber records owned by the billing side and the summary attached to
//! session responses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub title: Option<String>,
    pub billing_period: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub id: Uuid,
    pub account_id: Uuid,
    pub status: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Subscription summary; the default value serializes as `{}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriberSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSummary>,
}

impl From<Subscriber> for SubscriberSummary {
    fn from(subscriber: Subscriber) -> Self {
        let product = subscriber.product.unwrap_or(Product {
            title: None,
            billing_period: None,
            price: None,
        });

        Self {
            id: Some(subscriber.id),
            status: Some(subscriber.status),
            expiry_date: subscriber.expiry_date,
            product: Some(ProductSummary {
                title: product.title,
                billing_period: product.billing_period,
                price: product.price,
            }),
        }
    }
}
