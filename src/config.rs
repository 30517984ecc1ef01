use std::env;

/// Runtime configuration for the application
///
/// Every value has a default suitable for local development, so the server
/// starts with no environment at all. A `.env` file is honored when present
/// (loaded by `main` before this is read).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// External base URL used when building email confirmation links
    pub base_url: String,

    /// Path of the backing dataset file (created on first run if absent)
    pub data_path: String,

    /// Directory where chart artifacts are written and served from
    pub plot_dir: String,

    /// Directory holding the users file
    pub database_dir: String,

    /// Row count for the synthetic dataset generated when `data_path` is missing
    pub sample_size: usize,

    /// SMTP settings; `None` disables outgoing mail
    pub smtp: Option<SmtpConfig>,
}

/// SMTP connection settings for the confirmation mailer
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl AppConfig {
    /// Build the configuration from environment variables
    ///
    /// Recognized variables: `BIND_ADDR`, `BASE_URL`, `DATA_PATH`, `PLOT_DIR`,
    /// `DATABASE_DIR`, `SAMPLE_SIZE`, `MAIL_SERVER`, `MAIL_PORT`,
    /// `MAIL_USERNAME`, `MAIL_PASSWORD`, `MAIL_FROM`. Mail is enabled only
    /// when both `MAIL_USERNAME` and `MAIL_PASSWORD` are set.
    ///
    /// # Returns
    /// * `Result<AppConfig, String>` - The configuration or a validation error
    pub fn from_env() -> Result<Self, String> {
        let bind_addr = get_or("BIND_ADDR", "127.0.0.1:3000");
        let base_url = get_or("BASE_URL", &format!("http://{}", bind_addr));

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err("BASE_URL must start with http:// or https://".to_string());
        }

        let sample_size = match get_or("SAMPLE_SIZE", "1000").parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return Err("SAMPLE_SIZE must be a positive integer".to_string()),
        };

        let smtp = match (env::var("MAIL_USERNAME"), env::var("MAIL_PASSWORD")) {
            (Ok(username), Ok(password)) => {
                let port = match get_or("MAIL_PORT", "587").parse::<u16>() {
                    Ok(p) => p,
                    Err(_) => return Err("MAIL_PORT must be a port number".to_string()),
                };
                Some(SmtpConfig {
                    server: get_or("MAIL_SERVER", "smtp.gmail.com"),
                    port,
                    from: get_or("MAIL_FROM", &username),
                    username,
                    password,
                })
            }
            _ => None,
        };

        Ok(AppConfig {
            bind_addr,
            base_url: base_url.trim_end_matches('/').to_string(),
            data_path: get_or("DATA_PATH", "data/fiver_clean.csv"),
            plot_dir: get_or("PLOT_DIR", "static"),
            database_dir: get_or("DATABASE_DIR", "database"),
            sample_size,
            smtp,
        })
    }
}

fn get_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
