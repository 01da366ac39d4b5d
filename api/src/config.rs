use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    Dev,
    Prod,
}

impl Env {
    pub fn as_str(self) -> &'static str {
        match self {
            Env::Dev => "dev",
            Env::Prod => "prod",
        }
    }
}

/// Configuration for the online recommendation service.
pub struct ServerConfig {
    pub env: Env,
    pub database_url: String,
    pub listen_port: u16,
    pub openai: OpenAiConfig,
}

/// Base configuration shared by every batch job.
pub struct JobConfig {
    pub env: Env,
    pub database_url: String,
}

/// Configuration for the catalog crawl jobs (ranking, items, genres, tags).
pub struct CatalogConfig {
    pub job: JobConfig,
    pub rakuten_app_id: String,
    pub rakuten_affiliate_id: Option<String>,
    pub aws_region: String,
    pub s3_bucket_raw: String,
}

/// Embedding provider settings, shared by the build job and the service.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => match e {
            std::env::VarError::NotPresent => Ok(None),
            std::env::VarError::NotUnicode(_) => Err(format!(
                "Could not get the environment variable `{key}` due to unicode error"
            )),
        },
    }
}

fn required_var(key: &str) -> String {
    let val = var(key);
    match val {
        Ok(val) => match val {
            Some(val) => val,
            None => {
                tracing::error!("Environment variable `{key}` is required");
                std::process::exit(1)
            }
        },
        Err(e) => {
            tracing::error!(
                "Environment variable `{key}` is required, but could not retrieve: {e}"
            );
            std::process::exit(1)
        }
    }
}

fn float_var(key: &str, default: f64) -> f64 {
    match var(key) {
        Ok(Some(val)) => match val.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::error!("Environment variable `{key}` is not a valid float: `{val}`");
                std::process::exit(1)
            }
        },
        _ => default,
    }
}

fn int_var(key: &str, default: u32) -> u32 {
    match var(key) {
        Ok(Some(val)) => match val.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::error!("Environment variable `{key}` is not a valid integer: `{val}`");
                std::process::exit(1)
            }
        },
        _ => default,
    }
}

fn parse_env() -> Env {
    let env = required_var("ENV");
    match env.as_str() {
        "dev" => Env::Dev,
        "prod" => Env::Prod,
        other => {
            tracing::error!("ENV must be `dev` or `prod`, got `{other}`");
            std::process::exit(1)
        }
    }
}

impl ServerConfig {
    pub fn new_from_env() -> Self {
        let listen_port = match var("PORT") {
            Ok(Some(port)) => match port.parse() {
                Ok(parsed) => parsed,
                Err(_) => {
                    tracing::error!("PORT is not a valid port number: `{port}`");
                    std::process::exit(1)
                }
            },
            _ => 8000,
        };

        ServerConfig {
            env: parse_env(),
            database_url: required_var("DATABASE_URL"),
            listen_port,
            openai: OpenAiConfig::new_from_env(),
        }
    }
}

impl JobConfig {
    pub fn new_from_env() -> Self {
        JobConfig {
            env: parse_env(),
            database_url: required_var("DATABASE_URL"),
        }
    }
}

impl CatalogConfig {
    pub fn new_from_env() -> Self {
        let job = JobConfig::new_from_env();
        // The raw bucket is environment-suffixed so a dev run can never write
        // into the production archive.
        let bucket_key = match job.env {
            Env::Dev => "S3_BUCKET_RAW_DEV",
            Env::Prod => "S3_BUCKET_RAW_PROD",
        };
        CatalogConfig {
            rakuten_app_id: required_var("RAKUTEN_APP_ID"),
            rakuten_affiliate_id: var("RAKUTEN_AFFILIATE_ID").unwrap_or(None),
            aws_region: required_var("AWS_REGION"),
            s3_bucket_raw: required_var(bucket_key),
            job,
        }
    }
}

impl OpenAiConfig {
    pub fn new_from_env() -> Self {
        OpenAiConfig {
            api_key: required_var("OPENAI_API_KEY"),
            model: var("OPENAI_EMBEDDING_MODEL")
                .unwrap_or(None)
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            timeout: Duration::from_secs_f64(float_var("OPENAI_TIMEOUT_SEC", 30.0)),
            max_retries: int_var("OPENAI_MAX_RETRIES", 5),
            backoff_base: Duration::from_secs_f64(float_var("OPENAI_BACKOFF_BASE_SEC", 1.0)),
        }
    }
}
