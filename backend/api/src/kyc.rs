//! Identity verification through the external KYC service.
//!
//! The service is untrusted: transport failures, timeouts and unreadable
//! replies all collapse into one generic upstream error. Uploaded images
//! are staged as [`TempUpload`](crate::uploads::TempUpload)s and removed on
//! every exit path.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use crowdfund_protocol::IdType;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{ApiError, Result};

/// Outcome reported by the verification service.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Verified {
        name: Option<String>,
        id_number: Option<String>,
        face_match_score: Option<f64>,
    },
    NotVerified {
        status: String,
        message: String,
    },
}

/// Images and claims submitted for one verification.
#[derive(Debug, Clone)]
pub struct VerificationRequest<'a> {
    pub id_card: &'a Path,
    pub face_image: &'a Path,
    pub id_type: IdType,
    pub claimed_id_number: Option<&'a str>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, request: VerificationRequest<'_>) -> Result<VerificationResult>;
}

pub fn verification_failed() -> ApiError {
    ApiError::Upstream("Identity verification failed".to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceReply {
    status: String,
    name: Option<String>,
    id_number: Option<String>,
    face_match_score: Option<f64>,
    message: Option<String>,
}

impl From<ServiceReply> for VerificationResult {
    fn from(reply: ServiceReply) -> Self {
        match reply.status.to_ascii_uppercase().as_str() {
            "READY" | "COMPLETED" => VerificationResult::Verified {
                name: reply.name,
                id_number: reply.id_number,
                face_match_score: reply.face_match_score,
            },
            _ => VerificationResult::NotVerified {
                message: reply
                    .message
                    .unwrap_or_else(|| format!("Verification returned status {}", reply.status)),
                status: reply.status,
            },
        }
    }
}

/// HTTP client for the verification service.
pub struct HttpVerifier {
    client: Client,
    base_url: String,
}

impl HttpVerifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn file_part(path: &Path) -> Result<multipart::Part> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            warn!(path = %path.display(), "Staged KYC image unreadable: {e}");
            verification_failed()
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(multipart::Part::bytes(bytes).file_name(name))
    }
}

#[async_trait]
impl IdentityVerifier for HttpVerifier {
    async fn verify(&self, request: VerificationRequest<'_>) -> Result<VerificationResult> {
        let mut form = multipart::Form::new()
            .part("id_card", Self::file_part(request.id_card).await?)
            .part("face_image", Self::file_part(request.face_image).await?)
            .text("id_type", request.id_type.as_str());
        if let Some(number) = request.claimed_id_number {
            form = form.text("id_number", number.to_string());
        }

        let url = format!("{}/verify", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("KYC service unreachable: {e}");
                verification_failed()
            })?;

        let status = response.status();
        let reply = response.json::<ServiceReply>().await.map_err(|e| {
            warn!(%status, "KYC service reply unreadable: {e}");
            verification_failed()
        })?;
        debug!(%status, reply_status = %reply.status, "KYC service replied");
        Ok(reply.into())
    }
}

/// Log a verification outcome without identity data.
pub fn log_outcome(user_id: &str, result: &VerificationResult) {
    match result {
        VerificationResult::Verified { .. } => info!(user_id, "KYC verified"),
        VerificationResult::NotVerified { status, .. } => {
            info!(user_id, status = %status, "KYC not verified")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: &str, message: Option<&str>) -> ServiceReply {
        ServiceReply {
            status: status.into(),
            name: Some("Asha Rao".into()),
            id_number: Some("1234-5678-9012".into()),
            face_match_score: Some(0.91),
            message: message.map(Into::into),
        }
    }

    #[test]
    fn ready_and_completed_verify() {
        for status in ["READY", "completed"] {
            assert!(matches!(
                VerificationResult::from(reply(status, None)),
                VerificationResult::Verified { .. }
            ));
        }
    }

    #[test]
    fn other_status_surfaces_message() {
        match VerificationResult::from(reply("FACE_MISMATCH", Some("Face does not match"))) {
            VerificationResult::NotVerified { status, message } => {
                assert_eq!(status, "FACE_MISMATCH");
                assert_eq!(message, "Face does not match");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_generic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let id_card = dir.path().join("id.jpg");
        let face = dir.path().join("face.jpg");
        std::fs::write(&id_card, b"a").unwrap();
        std::fs::write(&face, b"b").unwrap();

        let verifier = HttpVerifier::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = verifier
            .verify(VerificationRequest {
                id_card: &id_card,
                face_image: &face,
                id_type: IdType::Aadhar,
                claimed_id_number: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Identity verification failed");
    }

    #[tokio::test]
    async fn missing_staged_image_is_generic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = HttpVerifier::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = verifier
            .verify(VerificationRequest {
                id_card: &dir.path().join("gone.jpg"),
                face_image: &dir.path().join("gone-too.jpg"),
                id_type: IdType::Pan,
                claimed_id_number: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
        assert_eq!(err.to_string(), "Identity verification failed");
    }
}
