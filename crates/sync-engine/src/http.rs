//! REST transport over the network client
//!
//! | operation | request                       |
//! |-----------|-------------------------------|
//! | create    | `POST /{type}` with payload    |
//! | update    | `PUT /{type}/{id}` with payload |
//! | delete    | `DELETE /{type}/{id}`          |
//! | pull      | `GET /sync/{type}?since=..`    |

use crate::error::{EngineResult, SyncError};
use crate::transport::{PullResponse, SyncTransport};
use async_trait::async_trait;
use fieldsync_core::{EntityType, OperationKind, PendingOperation, RemoteChange, Timestamp};
use fieldsync_network::{join_url, Client, NetworkError};
use log::debug;

impl From<NetworkError> for SyncError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Status { status, body } => SyncError::Rejected { status, body },
            other => SyncError::Transport(other.to_string()),
        }
    }
}

/// [`SyncTransport`] talking to the REST API under `base_url`
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn push(&self, operation: &PendingOperation) -> EngineResult<()> {
        let tag = operation.entity_type.as_str();
        let id = operation.entity_id.as_str();

        let status = match operation.operation {
            OperationKind::Create => {
                let url = join_url(&self.base_url, &[tag])?;
                self.client.post_json(&url, &operation.payload).await?
            }
            OperationKind::Update => {
                let url = join_url(&self.base_url, &[tag, id])?;
                self.client.put_json(&url, &operation.payload).await?
            }
            OperationKind::Delete => {
                let url = join_url(&self.base_url, &[tag, id])?;
                self.client.delete(&url).await?
            }
        };

        debug!(
            "Pushed {} of {}/{}: HTTP {}",
            operation.operation, tag, id, status
        );
        Ok(())
    }

    async fn pull(
        &self,
        entity_type: EntityType,
        since: Option<Timestamp>,
    ) -> EngineResult<Vec<RemoteChange>> {
        let url = join_url(&self.base_url, &["sync", entity_type.as_str()])?;
        let query: Vec<(&str, String)> = since
            .map(|checkpoint| vec![("since", checkpoint.to_rfc3339())])
            .unwrap_or_default();

        let response: PullResponse = self.client.get_json(&url, &query).await?;
        debug!(
            "Pulled {} changes of {}",
            response.changes.len(),
            entity_type
        );
        Ok(response.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_become_rejections() {
        let err: SyncError = NetworkError::Status {
            status: 422,
            body: "missing name".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Rejected { status: 422, .. }));

        let err: SyncError = NetworkError::NetworkUnavailable.into();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_transport_error() {
        let transport = HttpTransport::new(Client::new().unwrap(), "not a url");
        let result = transport.pull(EntityType::Trial, None).await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }
}
