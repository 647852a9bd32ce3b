use crate::clients::api::ApiClient;
use crate::clients::traits::{NotificationSink, PropertyDirectory};
use crate::error::{BookingError, Result};
use crate::models::{Notification, NotificationKind, PropertyInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

/// Property document as served by `GET /properties/{id}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyDocument {
    #[serde(rename = "_id")]
    id: String,
    owner_id: String,
    /// Served as a JSON number; whole currency units are expected
    price: f64,
}

/// Accept a JSON number only when it is a whole amount that fits an `i64`
fn whole_units(price: f64) -> Option<i64> {
    let in_range = price >= i64::MIN as f64 && price < i64::MAX as f64;
    (price.is_finite() && price.fract() == 0.0 && in_range).then_some(price as i64)
}

/// Property lookup backed by the marketplace API
pub struct ApiPropertyDirectory {
    api: ApiClient,
}

impl ApiPropertyDirectory {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PropertyDirectory for ApiPropertyDirectory {
    async fn lookup(&self, property_id: &str) -> Result<PropertyInfo> {
        let doc: PropertyDocument = self.api.get_json(&["properties", property_id]).await?;

        let rate = whole_units(doc.price).ok_or_else(|| {
            BookingError::Validation(format!("property {} has price {}", doc.id, doc.price))
        })?;
        Ok(PropertyInfo {
            id: doc.id,
            owner_id: doc.owner_id,
            rate,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationDocument {
    #[serde(rename = "_id")]
    id: String,
    user_id: String,
    message: String,
    #[serde(default)]
    seen: bool,
    #[serde(rename = "type")]
    kind: NotificationKind,
    created_at: DateTime<Utc>,
}

impl From<NotificationDocument> for Notification {
    fn from(doc: NotificationDocument) -> Self {
        Notification {
            id: doc.id,
            recipient_id: doc.user_id,
            message: doc.message,
            kind: doc.kind,
            seen: doc.seen,
            created_at: doc.created_at,
        }
    }
}

/// Notification storage backed by the marketplace API
pub struct ApiNotificationSink {
    api: ApiClient,
}

impl ApiNotificationSink {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl NotificationSink for ApiNotificationSink {
    async fn push(
        &self,
        recipient_id: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let body = json!({
            "userId": recipient_id,
            "message": message,
            "type": kind,
        });
        let doc: NotificationDocument = self.api.post_json(&["notifications"], &body).await?;
        Ok(doc.into())
    }

    async fn list(&self, recipient_id: &str) -> Result<Vec<Notification>> {
        let docs: Vec<NotificationDocument> = self
            .api
            .get_json_query(&["notifications"], &[("userId", recipient_id)])
            .await?;
        Ok(docs.into_iter().map(Notification::from).collect())
    }

    async fn mark_seen(&self, notification_id: &str) -> Result<()> {
        self.api.put(&["notifications", notification_id, "seen"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_must_be_whole_units() {
        assert_eq!(whole_units(450.0), Some(450));
        assert_eq!(whole_units(450.5), None);
        assert_eq!(whole_units(f64::NAN), None);
        assert_eq!(whole_units(1e20), None);
    }
}
