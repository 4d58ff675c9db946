//! Application configuration loaded from environment variables.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::errors::{ApiError, Result};

/// Outbound SMTP relay; mail is only logged when absent.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `From` mailbox, e.g. `Crowdfunding <no-reply@example.com>`
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (e.g. sqlite:./crowdfund.db)
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// HMAC key for bearer tokens
    pub jwt_secret: String,
    /// Lifetime of a platform-user token
    pub user_token_ttl: Duration,
    /// Lifetime of an admin token
    pub admin_token_ttl: Duration,
    /// Base URL of the external identity verification service
    pub kyc_service_url: String,
    /// Upper bound on a single verification call
    pub kyc_timeout: Duration,
    /// Root of the shared upload area
    pub upload_dir: PathBuf,
    /// Unserved directory holding identity images during verification
    pub kyc_staging_dir: PathBuf,
    pub smtp: Option<SmtpConfig>,
    /// `development` exposes internal error detail in responses
    pub app_env: String,
    /// Super admin seeded at start-up when no admin exists yet
    pub super_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let super_admin = match (env_var("SUPER_ADMIN_EMAIL"), env_var("SUPER_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some((email, password)),
            _ => None,
        };

        let smtp = match env_var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .map_err(|_| ApiError::Config("Invalid SMTP_PORT".to_string()))?,
                username: env_var("SMTP_USERNAME")?,
                password: env_var("SMTP_PASSWORD")?,
                from: env_var("MAIL_FROM")?,
            }),
            Err(_) => None,
        };

        let upload_dir =
            PathBuf::from(env_var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()));
        let kyc_staging_dir = env_var("KYC_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("crowdfund-kyc"));
        if is_within(&kyc_staging_dir, &upload_dir) {
            return Err(ApiError::Config(
                "KYC_STAGING_DIR must not be inside UPLOAD_DIR".to_string(),
            ));
        }

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./crowdfund.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            jwt_secret: env_var("JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    ApiError::Config("JWT_SECRET environment variable is required".to_string())
                })?,
            user_token_ttl: Duration::from_secs(
                env_var("USER_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()
                    .map_err(|_| ApiError::Config("Invalid USER_TOKEN_TTL_SECS".to_string()))?,
            ),
            admin_token_ttl: Duration::from_secs(
                env_var("ADMIN_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .map_err(|_| ApiError::Config("Invalid ADMIN_TOKEN_TTL_SECS".to_string()))?,
            ),
            kyc_service_url: env_var("KYC_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            kyc_timeout: Duration::from_secs(
                env_var("KYC_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| ApiError::Config("Invalid KYC_TIMEOUT_SECS".to_string()))?,
            ),
            upload_dir,
            kyc_staging_dir,
            smtp,
            app_env: env_var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
            super_admin,
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}

/// Component-wise containment, ignoring `.` segments.
fn is_within(path: &Path, root: &Path) -> bool {
    let plain = |p: &Path| -> PathBuf {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    plain(path).starts_with(plain(root))
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_inside_upload_root_is_detected() {
        let root = Path::new("./uploads");
        assert!(is_within(Path::new("uploads/kyc"), root));
        assert!(is_within(Path::new("./uploads/kyc"), root));
        assert!(!is_within(Path::new("./uploads-private/kyc"), root));
        assert!(!is_within(Path::new("/tmp/crowdfund-kyc"), root));
    }
}
