use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub hunt: HuntConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // seconds
    pub refresh_token_expires_in: i64, // seconds
}

/// HTTP mail API settings. An empty `api_key` disables delivery.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MailConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntConfig {
    /// Prize text used when a drawing run does not supply one
    #[serde(default = "default_prize")]
    pub default_prize: String,
    /// Interval of the cached-progress reconciliation task, 0 disables it
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Upper bound accepted for each weighting factor on a drawing
    #[serde(default = "default_max_weighting_factor")]
    pub max_weighting_factor: f64,
}

/// Bootstrap administrator, upserted at startup. Left empty, no admin is
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
}

impl AdminConfig {
    pub fn is_configured(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            name: default_admin_name(),
        }
    }
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

fn default_prize() -> String {
    "Scavenger Hunt Prize".to_string()
}

fn default_reconcile_interval() -> u64 {
    600
}

fn default_max_weighting_factor() -> f64 {
    100.0
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            default_prize: default_prize(),
            reconcile_interval_secs: default_reconcile_interval(),
            max_weighting_factor: default_max_weighting_factor(),
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env()?,
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(config_str)
            .map_err(|e| format!("Failed to parse config file: {e}").into())
    }

    /// Builds a config purely from environment variables and defaults.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // 数据库 URL 在无配置文件时必须提供
        let database_url = get_env("DATABASE_URL")
            .ok_or("DATABASE_URL is not set and no config.toml was found")?;

        Ok(Config {
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("SERVER_PORT", 8080u16),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET")
                    .unwrap_or_else(|| "change-me-in-production".to_string()),
                access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                refresh_token_expires_in: get_env_parse("JWT_REFRESH_EXPIRES_IN", 2_592_000i64),
            },
            mail: MailConfig {
                api_url: get_env("MAIL_API_URL").unwrap_or_default(),
                api_key: get_env("MAIL_API_KEY").unwrap_or_default(),
                from_address: get_env("MAIL_FROM_ADDRESS").unwrap_or_default(),
                from_name: get_env("MAIL_FROM_NAME"),
            },
            hunt: HuntConfig {
                default_prize: get_env("HUNT_DEFAULT_PRIZE").unwrap_or_else(default_prize),
                reconcile_interval_secs: get_env_parse(
                    "HUNT_RECONCILE_INTERVAL_SECS",
                    default_reconcile_interval(),
                ),
                max_weighting_factor: get_env_parse(
                    "HUNT_MAX_WEIGHTING_FACTOR",
                    default_max_weighting_factor(),
                ),
            },
            admin: AdminConfig {
                email: get_env("ADMIN_EMAIL").unwrap_or_default(),
                password: get_env("ADMIN_PASSWORD").unwrap_or_default(),
                name: get_env("ADMIN_NAME").unwrap_or_else(default_admin_name),
            },
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(p) = get_env("SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(mc) = get_env("DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = mc;
        }
        if let Some(v) = get_env("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Some(n) = get_env("JWT_ACCESS_EXPIRES_IN").and_then(|v| v.parse().ok()) {
            self.jwt.access_token_expires_in = n;
        }
        if let Some(n) = get_env("JWT_REFRESH_EXPIRES_IN").and_then(|v| v.parse().ok()) {
            self.jwt.refresh_token_expires_in = n;
        }
        if let Some(v) = get_env("MAIL_API_URL") {
            self.mail.api_url = v;
        }
        if let Some(v) = get_env("MAIL_API_KEY") {
            self.mail.api_key = v;
        }
        if let Some(v) = get_env("MAIL_FROM_ADDRESS") {
            self.mail.from_address = v;
        }
        if let Some(v) = get_env("MAIL_FROM_NAME") {
            self.mail.from_name = Some(v);
        }
        if let Some(v) = get_env("HUNT_DEFAULT_PRIZE") {
            self.hunt.default_prize = v;
        }
        if let Some(n) = get_env("HUNT_RECONCILE_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.hunt.reconcile_interval_secs = n;
        }
        if let Some(n) = get_env("HUNT_MAX_WEIGHTING_FACTOR").and_then(|v| v.parse().ok()) {
            self.hunt.max_weighting_factor = n;
        }
        if let Some(v) = get_env("ADMIN_EMAIL") {
            self.admin.email = v;
        }
        if let Some(v) = get_env("ADMIN_PASSWORD") {
            self.admin.password = v;
        }
        if let Some(v) = get_env("ADMIN_NAME") {
            self.admin.name = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml_uses_section_defaults() {
        let toml_str = r#"
[server]
host = "127.0.0.1"
port = 3000

[database]
url = "postgres://localhost/hunt"
max_connections = 5

[jwt]
secret = "s3cret"
access_token_expires_in = 60
refresh_token_expires_in = 120
"#;
        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.mail.api_key.is_empty());
        assert_eq!(config.hunt.default_prize, "Scavenger Hunt Prize");
        assert_eq!(config.hunt.reconcile_interval_secs, 600);
        assert!(!config.admin.is_configured());
        assert_eq!(config.admin.name, "Administrator");
    }

    #[test]
    fn test_parse_admin_section() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8080

[database]
url = "postgres://localhost/hunt"
max_connections = 10

[jwt]
secret = "s3cret"
access_token_expires_in = 60
refresh_token_expires_in = 120

[admin]
email = "ops@school.example"
password = "Sup3rSecret"
"#;
        let config = Config::parse(toml_str).unwrap();
        assert!(config.admin.is_configured());
        assert_eq!(config.admin.email, "ops@school.example");
        assert_eq!(config.admin.name, "Administrator");
    }

    #[test]
    fn test_parse_hunt_section() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8080

[database]
url = "postgres://localhost/hunt"
max_connections = 10

[jwt]
secret = "s3cret"
access_token_expires_in = 60
refresh_token_expires_in = 120

[hunt]
default_prize = "Pizza party"
reconcile_interval_secs = 0
"#;
        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.hunt.default_prize, "Pizza party");
        assert_eq!(config.hunt.reconcile_interval_secs, 0);
        assert_eq!(config.hunt.max_weighting_factor, 100.0);
    }

    #[test]
    fn test_parse_rejects_missing_sections() {
        assert!(Config::parse("[server]\nhost = \"x\"\nport = 1\n").is_err());
    }

    #[test]
    fn test_from_env_fallback() {
        // edition 2024: set_var 需要 unsafe
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://env-host/hunt");
            std::env::set_var("ADMIN_EMAIL", "root@school.example");
            std::env::set_var("ADMIN_PASSWORD", "Adm1nPassw0rd");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.database.url, "postgres://env-host/hunt");
        assert!(config.database.max_connections > 0);
        assert!(config.hunt.max_weighting_factor > 0.0);
        assert!(config.admin.is_configured());
        assert_eq!(config.admin.email, "root@school.example");
        assert_eq!(config.admin.name, "Administrator");
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("ADMIN_EMAIL");
            std::env::remove_var("ADMIN_PASSWORD");
        }
    }
}
