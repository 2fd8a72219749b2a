use std::time::Duration;

use async_trait::async_trait;
use engine_logging::{engine_info, engine_warn};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher setup failed: {0}")]
    Setup(String),
    #[error("could not encode work item: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("dispatch request failed: {0}")]
    Network(String),
    #[error("dispatch rejected with status {0}")]
    Rejected(u16),
}

/// One unit of downstream processing for a newly persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub place_id: String,
    pub source_location: String,
    pub job_name: String,
}

impl WorkItem {
    /// Job names are `process-place-{key}-{unix seconds}`.
    pub fn new(place_id: impl Into<String>, source_location: impl Into<String>) -> Self {
        Self::at(place_id, source_location, chrono::Utc::now().timestamp())
    }

    pub fn at(
        place_id: impl Into<String>,
        source_location: impl Into<String>,
        unix_seconds: i64,
    ) -> Self {
        let place_id = place_id.into();
        Self {
            job_name: format!("process-place-{place_id}-{unix_seconds}"),
            place_id,
            source_location: source_location.into(),
        }
    }
}

#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    async fn dispatch(&self, item: &WorkItem) -> Result<(), DispatchError>;
}

/// Posts each work item as JSON to a fixed endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DispatchError::Setup(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl WorkDispatcher for HttpDispatcher {
    async fn dispatch(&self, item: &WorkItem) -> Result<(), DispatchError> {
        let body = serde_json::to_vec(item)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await
            .map_err(|err| DispatchError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub submitted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Dispatch one work item per key. A failing key is recorded and the rest
/// still go out.
pub async fn emit_work_items(
    dispatcher: &dyn WorkDispatcher,
    keys: &[String],
    source_location: &str,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for key in keys {
        let item = WorkItem::new(key.clone(), source_location);
        match dispatcher.dispatch(&item).await {
            Ok(()) => {
                engine_info!("dispatched {} for {}", item.job_name, key);
                report.submitted.push(key.clone());
            }
            Err(err) => {
                engine_warn!("dispatch for {} failed: {}", key, err);
                report.failed.push((key.clone(), err.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_wire_shape() {
        let item = WorkItem::at("1234", "store/공덕역 식당.json", 1_700_000_000);
        assert_eq!(item.job_name, "process-place-1234-1700000000");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["placeId"], "1234");
        assert_eq!(json["sourceLocation"], "store/공덕역 식당.json");
        assert_eq!(json["jobName"], "process-place-1234-1700000000");
    }
}
