//! Trait and types for talking to the device tracking backend.

use anyhow::Result;
use boia_dashboard::metrics::MetricsSource;
use boia_dashboard::output::Period;
use serde::{Deserialize, Deserializer, Serialize};

/// A tracked device ("boia").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Device {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: String,
}

/// The logged-in user. Anything else the backend sends (e.g. `password`) is dropped.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

/// Abstraction over the backend's device and stats endpoints, scoped to one user.
#[async_trait::async_trait]
pub trait DeviceApi: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>>;

    async fn create_device(&self, name: &str) -> Result<()>;

    async fn update_device(&self, id: &str, name: &str) -> Result<()>;

    async fn delete_device(&self, id: &str) -> Result<()>;

    /// Stats of one device, optionally restricted to `period`.
    /// A device without data yields [`MetricsSource::empty`].
    async fn device_metrics(&self, device_id: &str, period: Option<&Period>)
    -> Result<MetricsSource>;
}

/// Ids come back as JSON numbers from some endpoints and strings from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_numeric_ids() {
        let device: Device =
            serde_json::from_str(r#"{"id": 12, "name": "Boia Norte", "user_id": 3}"#).unwrap();

        assert_eq!(device.id, "12");
        assert_eq!(device.user_id, "3");
    }

    #[test]
    fn test_device_string_ids() {
        let device: Device = serde_json::from_str(r#"{"id": "a1", "name": "Boia Sul"}"#).unwrap();

        assert_eq!(device.id, "a1");
        assert_eq!(device.user_id, "");
    }

    #[test]
    fn test_user_drops_password() {
        let user: User = serde_json::from_str(
            r#"{"id": 5, "name": "Ana", "mail": "ana@example.com", "password": "hash"}"#,
        )
        .unwrap();

        assert_eq!(user.id, "5");
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
    }
}
