#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use crowdfund_api::api::{self, ApiState};
use crowdfund_api::config::Config;
use crowdfund_api::db::{self, admins, campaigns, users, users::KycDetails, users::NewUser};
use crowdfund_api::errors::Result;
use crowdfund_api::kyc::{
    verification_failed, IdentityVerifier, VerificationRequest, VerificationResult,
};
use crowdfund_api::notify::{Email, Mailer};
use crowdfund_api::session;
use crowdfund_protocol::{
    AdminRole, Campaign, CampaignStatus, Category, IdType, UserRole, VoteTally,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Keeps every mail so tests can read OTPs back.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Refuses every verification.
pub struct RefusingVerifier;

#[async_trait]
impl IdentityVerifier for RefusingVerifier {
    async fn verify(&self, _request: VerificationRequest<'_>) -> Result<VerificationResult> {
        Ok(VerificationResult::NotVerified {
            status: "failed".to_string(),
            message: "Face does not match the ID card".to_string(),
        })
    }
}

/// Stands in for an unreachable or misbehaving verification service.
pub struct UnavailableVerifier;

#[async_trait]
impl IdentityVerifier for UnavailableVerifier {
    async fn verify(&self, _request: VerificationRequest<'_>) -> Result<VerificationResult> {
        Err(verification_failed())
    }
}

/// One part of a hand-built multipart body.
pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

const BOUNDARY: &str = "crowdfund-test-boundary";

fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
            FormPart::File {
                field,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Build a JSON (or empty) request.
pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Run one request through `router`; returns the status and the parsed JSON body.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub struct TestApp {
    pub state: Arc<ApiState>,
    pub mailer: Arc<CapturingMailer>,
    pub router: Router,
    _dir: TempDir,
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        database_url: format!("sqlite:{}", dir.join("crowdfund.db").display()),
        api_port: 0,
        jwt_secret: "integration-secret".to_string(),
        user_token_ttl: StdDuration::from_secs(3600),
        admin_token_ttl: StdDuration::from_secs(3600),
        kyc_service_url: "http://127.0.0.1:9".to_string(),
        kyc_timeout: StdDuration::from_secs(1),
        upload_dir: dir.join("uploads"),
        kyc_staging_dir: dir.join("kyc-staging"),
        smtp: None,
        app_env: "development".to_string(),
        super_admin: None,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Arc::new(RefusingVerifier)).await
    }

    pub async fn spawn_with(verifier: Arc<dyn IdentityVerifier>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pool = db::init_pool(&config.database_url).await.unwrap();
        let mailer = Arc::new(CapturingMailer::default());
        let state = Arc::new(ApiState::new(
            pool,
            config,
            mailer.clone(),
            verifier,
        ));
        state.uploads.ensure_dirs().await.unwrap();
        let router = api::router(state.clone());
        Self {
            state,
            mailer,
            router,
            _dir: dir,
        }
    }

    /// Send one request; returns the status and the parsed JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        send(self.router.clone(), request(method, uri, token, body)).await
    }

    pub async fn call_multipart(
        &self,
        uri: &str,
        token: &str,
        parts: &[FormPart<'_>],
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        send(self.router.clone(), request).await
    }

    /// A platform user with a confirmed email but no KYC, and a bearer token for them.
    pub async fn user(&self, name: &str) -> (String, String) {
        let id = Uuid::new_v4().to_string();
        let email = format!("{}@example.com", name.to_lowercase());
        let hash = session::hash_password("secret123").unwrap();
        let now = Utc::now();
        users::insert_user(
            &self.state.pool,
            &NewUser {
                id: &id,
                name,
                email: &email,
                password_hash: &hash,
                role: UserRole::User,
                otp_code: None,
                otp_expires_at: None,
                is_email_verified: true,
                now,
            },
        )
        .await
        .unwrap();
        let record = users::find_by_id(&self.state.pool, &id)
            .await
            .unwrap()
            .unwrap();
        let token = self.state.sessions.issue_user(&record, now).unwrap();
        (id, token)
    }

    /// Like [`TestApp::user`], with identity verification already passed.
    pub async fn kyc_user(&self, name: &str) -> (String, String) {
        let (id, token) = self.user(name).await;
        let details = KycDetails {
            name: Some(name.to_string()),
            id_number: Some(format!("ID-{id}")),
            id_type: Some(IdType::Aadhar),
            verified_at: Some(Utc::now()),
            face_match_score: Some(0.93),
        };
        users::set_kyc_verified(&self.state.pool, &id, &details, Utc::now())
            .await
            .unwrap();
        (id, token)
    }

    pub async fn admin(&self, email: &str, role: AdminRole) -> String {
        let id = Uuid::new_v4().to_string();
        let hash = session::hash_password("admin-pass").unwrap();
        let now = Utc::now();
        admins::insert(&self.state.pool, &id, "Moderator", email, &hash, role, now)
            .await
            .unwrap();
        let record = admins::find_by_id(&self.state.pool, &id)
            .await
            .unwrap()
            .unwrap();
        self.state.sessions.issue_admin(&record, now).unwrap()
    }

    /// An active campaign owned by `creator_id`.
    pub async fn active_campaign(&self, creator_id: &str, target: Decimal) -> String {
        self.campaign_in(creator_id, target, CampaignStatus::Active)
            .await
    }

    pub async fn campaign_in(
        &self,
        creator_id: &str,
        target: Decimal,
        status: CampaignStatus,
    ) -> String {
        let now = Utc::now();
        let end_date = now + Duration::days(30);
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            creator_id: creator_id.to_string(),
            title: "Rebuild the village school".to_string(),
            description: "Roof repairs and new desks for forty pupils.".to_string(),
            category: Category::Education,
            target_amount: target,
            current_amount: Decimal::ZERO,
            start_date: now,
            end_date,
            images: Vec::new(),
            videos: Vec::new(),
            is_organization: false,
            organization_name: None,
            organization_details: None,
            is_voting_enabled: true,
            voting_end_date: Some(end_date),
            proof_documents: Vec::new(),
            votes: Vec::new(),
            vote_results: VoteTally::default(),
            status,
            funds_released: false,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        campaigns::insert(&self.state.pool, &campaign).await.unwrap();
        campaign.id
    }

    pub async fn campaign_status(&self, id: &str) -> CampaignStatus {
        campaigns::find(&self.state.pool, id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    /// Files currently in the KYC staging directory.
    pub fn staged_kyc_files(&self) -> usize {
        std::fs::read_dir(&self.state.config.kyc_staging_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn last_mail_to(&self, to: &str) -> Option<Email> {
        self.mailer
            .sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
    }
}
