//! Workspace provisioning client - trait and implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use common::UserId;

use crate::error::MatchingError;

/// A provisioned shared workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaboration {
    pub id: String,
    pub interviewer_id: UserId,
    pub interviewee_id: UserId,
    #[serde(default)]
    pub initial_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

impl Collaboration {
    /// Client-facing path of the workspace
    pub fn collaboration_url(&self) -> String {
        format!("/room/{}", self.id)
    }
}

/// Provisioning failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisioningError {
    /// Upstream answered with a non-success status
    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Upstream could not be reached or answered garbage
    #[error("Provisioning service unavailable: {0}")]
    Unavailable(String),
}

impl ProvisioningError {
    /// HTTP-style status describing the failure
    pub fn status(&self) -> u16 {
        match self {
            ProvisioningError::Upstream { status, .. } => *status,
            ProvisioningError::Unavailable(_) => 503,
        }
    }
}

impl From<ProvisioningError> for MatchingError {
    fn from(err: ProvisioningError) -> Self {
        MatchingError::ProvisioningFailed {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// Client trait for the workspace provisioning service - protocol agnostic
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    /// Create a shared workspace for two users
    async fn create_collaboration(
        &self,
        interviewer: &UserId,
        interviewee: &UserId,
    ) -> Result<Collaboration, ProvisioningError>;
}

// ==================== Mock Implementation ====================

/// Mock provisioner for tests and local runs
pub struct MockProvisioner {
    failure: Option<(u16, String)>,
    calls: AtomicUsize,
}

impl MockProvisioner {
    /// Create a mock that always succeeds
    pub fn new() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Configure every call to fail with an upstream status
    pub fn with_failure(mut self, status: u16, message: impl Into<String>) -> Self {
        self.failure = Some((status, message.into()));
        self
    }

    /// Number of provisioning calls made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkspaceProvisioner for MockProvisioner {
    async fn create_collaboration(
        &self,
        interviewer: &UserId,
        interviewee: &UserId,
    ) -> Result<Collaboration, ProvisioningError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((status, message)) = &self.failure {
            return Err(ProvisioningError::Upstream {
                status: *status,
                message: message.clone(),
            });
        }

        Ok(Collaboration {
            id: format!("collab{}", n),
            interviewer_id: interviewer.clone(),
            interviewee_id: interviewee.clone(),
            initial_code: None,
            created_at: Utc::now(),
            status: "active".to_string(),
        })
    }
}

// ==================== HTTP Implementation ====================

#[cfg(feature = "client")]
pub mod http {
    use async_trait::async_trait;
    use reqwest::Client;
    use std::time::Duration;
    use tracing::debug;

    use common::UserId;

    use super::{Collaboration, ProvisioningError, WorkspaceProvisioner};

    /// HTTP-based provisioning client
    pub struct HttpProvisioner {
        client: Client,
        base_url: String,
    }

    impl HttpProvisioner {
        /// Create a client for `base_url` with a request timeout
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProvisioningError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ProvisioningError::Unavailable(e.to_string()))?;

            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        }
    }

    #[async_trait]
    impl WorkspaceProvisioner for HttpProvisioner {
        async fn create_collaboration(
            &self,
            interviewer: &UserId,
            interviewee: &UserId,
        ) -> Result<Collaboration, ProvisioningError> {
            let url = format!("{}/collaborations", self.base_url);
            debug!(%url, "Requesting collaboration");

            let response = self
                .client
                .post(&url)
                .json(&serde_json::json!({
                    "interviewer_id": interviewer,
                    "interviewee_id": interviewee,
                }))
                .send()
                .await
                .map_err(|e| ProvisioningError::Unavailable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ProvisioningError::Upstream {
                    status: status.as_u16(),
                    message,
                });
            }

            response
                .json::<Collaboration>()
                .await
                .map_err(|e| ProvisioningError::Unavailable(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_mock_success() {
        let provisioner = MockProvisioner::new();
        let collab = provisioner
            .create_collaboration(&"user1".into(), &"user2".into())
            .await
            .unwrap();

        assert_eq!(collab.id, "collab1");
        assert_eq!(collab.collaboration_url(), "/room/collab1");
        assert_eq!(collab.interviewer_id, UserId::from("user1"));
        assert_eq!(provisioner.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_carries_status() {
        let provisioner = MockProvisioner::new().with_failure(500, "Failed to create collaboration");
        let err = provisioner
            .create_collaboration(&"user1".into(), &"user2".into())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 500);

        assert_matches!(
            MatchingError::from(err),
            MatchingError::ProvisioningFailed { status: 500, .. }
        );
    }

    #[test]
    fn test_collaboration_deserializes_upstream_shape() {
        let json = r#"{
            "id": "collab123",
            "interviewer_id": "user1",
            "interviewee_id": "user2",
            "initial_code": "",
            "created_at": "2024-01-01T00:00:00Z",
            "status": "active"
        }"#;
        let collab: Collaboration = serde_json::from_str(json).unwrap();
        assert_eq!(collab.collaboration_url(), "/room/collab123");
    }
}
