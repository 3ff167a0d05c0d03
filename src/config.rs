use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Where user accounts live
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AuthBackend {
    /// Argon2 hashes in a local JSON file
    Local,
    /// Remote Convex deployment
    Convex,
}

/// Server settings, from the command line or the environment
#[derive(Clone, Debug, Parser)]
#[command(name = "gridtodash", about = "Upload spreadsheets, explore their figures and download PDF reports")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "GRIDTODASH_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Name shown in page footers and report filenames
    #[arg(long, env = "GRIDTODASH_APP_NAME", default_value = "GridToDash")]
    pub app_name: String,

    /// Title printed at the top of every report page
    #[arg(long, env = "GRIDTODASH_REPORT_TITLE", default_value = "GridToDash Professional Report")]
    pub report_title: String,

    #[arg(long, env = "GRIDTODASH_AUTH", value_enum, default_value = "local")]
    pub auth_backend: AuthBackend,

    /// Accounts file of the local backend
    #[arg(long, env = "GRIDTODASH_USERS_FILE", default_value = "database/users.json")]
    pub users_file: PathBuf,

    /// Deployment URL of the convex backend
    #[arg(long, env = "CONVEX_URL")]
    pub convex_url: Option<String>,

    /// SMTP relay for recovery codes; codes are only logged as issued when unset
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 465)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Sender address of recovery mails
    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: Option<String>,

    /// Directory served under /static
    #[arg(long, env = "GRIDTODASH_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Session lifetime in hours
    #[arg(long, env = "GRIDTODASH_SESSION_HOURS", default_value_t = 24)]
    pub session_hours: u64,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "GRIDTODASH_UPLOAD_LIMIT_MB", default_value_t = 200)]
    pub upload_limit_mb: usize,
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_hours * 60 * 60)
    }

    pub fn upload_limit_bytes(&self) -> usize {
        self.upload_limit_mb * 1024 * 1024
    }

    /// SMTP settings, when a relay host is configured.
    pub fn smtp(&self) -> Option<SmtpSettings> {
        let host = self.smtp_host.clone()?;
        Some(SmtpSettings {
            from: self
                .smtp_from
                .clone()
                .or_else(|| self.smtp_user.clone())
                .unwrap_or_else(|| format!("{} <noreply@{}>", self.app_name, host)),
            host,
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::parse_from(["gridtodash"]);
        assert_eq!(config.bind.to_string(), "127.0.0.1:3000");
        assert_eq!(config.app_name, "GridToDash");
        assert_eq!(config.auth_backend, AuthBackend::Local);
        assert_eq!(config.session_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.upload_limit_bytes(), 200 * 1024 * 1024);
    }

    #[test]
    fn smtp_needs_host() {
        let config = ServerConfig::parse_from(["gridtodash", "--smtp-user", "bot@example.com"]);
        assert!(config.smtp().is_none());

        let config = ServerConfig::parse_from([
            "gridtodash",
            "--smtp-host",
            "smtp.example.com",
            "--smtp-user",
            "bot@example.com",
            "--auth-backend",
            "convex",
        ]);
        let smtp = config.smtp().unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.from, "bot@example.com");
        assert_eq!(config.auth_backend, AuthBackend::Convex);
    }
}
