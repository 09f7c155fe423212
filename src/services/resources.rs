use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;

use crate::error::ApiError;
use crate::http_client::ApiClient;

/// Per-feature CRUD collections exposed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Cycles,
    ActivityLogs,
    FoodLogs,
    Water,
    Sleeps,
    Weights,
    Steps,
    Activities,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Cycles,
        Resource::ActivityLogs,
        Resource::FoodLogs,
        Resource::Water,
        Resource::Sleeps,
        Resource::Weights,
        Resource::Steps,
        Resource::Activities,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Resource::Cycles => "/cycles",
            Resource::ActivityLogs => "/activity-logs",
            Resource::FoodLogs => "/food-logs",
            Resource::Water => "/water",
            Resource::Sleeps => "/sleeps",
            Resource::Weights => "/weights",
            Resource::Steps => "/steps",
            Resource::Activities => "/activities",
        }
    }
}

/// CRUD client for one resource collection
pub struct ResourceClient {
    api: Arc<ApiClient>,
    resource: Resource,
}

impl ResourceClient {
    pub fn new(api: Arc<ApiClient>, resource: Resource) -> Self {
        Self { api, resource }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// `GET /<resource>?<query>`
    pub async fn list(&self, query: &[(&str, &str)]) -> Result<Vec<Value>, ApiError> {
        let mut path = self.resource.path().to_string();
        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            path.push('?');
            path.push_str(&encoded);
        }

        let response = self.api.get(path).await?;
        extract_list(response.status, response.data)
    }

    /// Like [`list`](Self::list), but maps the backend's "no records yet"
    /// failure to an empty list.
    ///
    /// Some endpoints answer HTTP 400 or 500 with a message containing
    /// `marker` instead of returning `[]` when nothing has been logged. This
    /// is opt-in; `list` reports those failures as errors.
    pub async fn list_or_empty(
        &self,
        query: &[(&str, &str)],
        marker: &str,
    ) -> Result<Vec<Value>, ApiError> {
        match self.list(query).await {
            Err(ref e) if is_missing_records(e, marker) => {
                tracing::debug!(
                    resource = self.resource.path(),
                    "Backend reported no records, using empty list"
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn get(&self, id: impl Display) -> Result<Value, ApiError> {
        let response = self.api.get(self.item_path(id)).await?;
        Ok(response.data)
    }

    pub async fn create(&self, data: Value) -> Result<Value, ApiError> {
        let response = self.api.post(self.resource.path(), data).await?;
        Ok(response.data)
    }

    /// Partial update
    pub async fn update(&self, id: impl Display, changes: Value) -> Result<Value, ApiError> {
        let response = self.api.patch(self.item_path(id), changes).await?;
        Ok(response.data)
    }

    /// Full replacement
    pub async fn replace(&self, id: impl Display, data: Value) -> Result<Value, ApiError> {
        let response = self.api.put(self.item_path(id), data).await?;
        Ok(response.data)
    }

    pub async fn delete(&self, id: impl Display) -> Result<(), ApiError> {
        self.api.delete(self.item_path(id)).await?;
        Ok(())
    }

    fn item_path(&self, id: impl Display) -> String {
        format!("{}/{}", self.resource.path(), id)
    }
}

/// Accept a bare array or an array wrapped in `data` / `items`
fn extract_list(status: u16, data: Value) -> Result<Vec<Value>, ApiError> {
    match data {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("items")) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ApiError::Parse {
                status,
                message: "expected a JSON array".to_string(),
            }),
        },
        _ => Err(ApiError::Parse {
            status,
            message: "expected a JSON array".to_string(),
        }),
    }
}

fn is_missing_records(error: &ApiError, marker: &str) -> bool {
    matches!(error, ApiError::Http { status: 400 | 500, message, .. } if message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn http(status: u16, message: &str) -> ApiError {
        ApiError::Http {
            status,
            message: message.to_string(),
            code: None,
            details: None,
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(Resource::FoodLogs.path(), "/food-logs");
        assert_eq!(Resource::ActivityLogs.path(), "/activity-logs");
        assert_eq!(Resource::Water.path(), "/water");
        assert_eq!(Resource::ALL.len(), 8);
    }

    #[test]
    fn test_extract_list_shapes() {
        assert_eq!(extract_list(200, json!([1, 2])).unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(extract_list(200, json!({"data": [1]})).unwrap(), vec![json!(1)]);
        assert_eq!(extract_list(200, json!({"items": []})).unwrap(), Vec::<Value>::new());
        assert!(matches!(
            extract_list(200, json!({})),
            Err(ApiError::Parse { status: 200, .. })
        ));
    }

    #[test]
    fn test_missing_records_detection() {
        let marker = "No cycles found";
        assert!(is_missing_records(&http(400, "No cycles found for user 5"), marker));
        assert!(is_missing_records(&http(500, "Error: No cycles found"), marker));
        assert!(!is_missing_records(&http(404, "No cycles found"), marker));
        assert!(!is_missing_records(&http(500, "database unavailable"), marker));
        assert!(!is_missing_records(
            &ApiError::Network {
                message: "No cycles found".to_string()
            },
            marker
        ));
    }
}
