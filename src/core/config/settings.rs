use super::parsing::{
    env_optional, env_or_default, parse_base_url, parse_bool, parse_environment,
    parse_positive_usize, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ConfigError, DatabaseSettings, InferenceSettings, QueueSettings, RuntimeSettings, ServerHost,
    ServerPort, ServerSettings, Settings, StatsSettings, TelemetrySettings,
};

pub(crate) const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("AI_SERVICE_HOST", "0.0.0.0");
        let port = env_or_default("AI_SERVICE_PORT", "5000");

        let environment =
            parse_environment(env_optional("GRADER_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("GRADER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "postgres");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "eduaion");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "10"))?;
        let run_migrations =
            env_optional("RUN_MIGRATIONS").map(|value| parse_bool(&value)).unwrap_or(true);

        let inference_base_url =
            parse_base_url("INFERENCE_BASE_URL", env_optional("INFERENCE_BASE_URL"))?
                .unwrap_or_default();
        let inference_api_key = env_or_default("INFERENCE_API_KEY", "");
        let model = env_or_default("AI_MODEL", DEFAULT_MODEL);
        let max_new_tokens =
            parse_u32("AI_MAX_NEW_TOKENS", env_or_default("AI_MAX_NEW_TOKENS", "2048"))?;
        let connect_timeout_seconds = parse_u64(
            "INFERENCE_CONNECT_TIMEOUT",
            env_or_default("INFERENCE_CONNECT_TIMEOUT", "30"),
        )?;

        let stats_service_url = parse_base_url("STATS_SERVICE_URL", env_optional("STATS_SERVICE_URL"))?;
        let request_timeout_seconds =
            parse_u64("STATS_REQUEST_TIMEOUT", env_or_default("STATS_REQUEST_TIMEOUT", "10"))?;
        let sweep_interval_seconds = parse_u64(
            "OUTBOX_SWEEP_INTERVAL_SECONDS",
            env_or_default("OUTBOX_SWEEP_INTERVAL_SECONDS", "60"),
        )?;
        let max_attempts =
            parse_u32("OUTBOX_MAX_ATTEMPTS", env_or_default("OUTBOX_MAX_ATTEMPTS", "5"))?;

        let workers = parse_positive_usize("GRADING_WORKERS", env_or_default("GRADING_WORKERS", "2"))?;
        let capacity = parse_positive_usize(
            "GRADING_QUEUE_CAPACITY",
            env_or_default("GRADING_QUEUE_CAPACITY", "64"),
        )?;

        let log_level = env_or_default("GRADER_LOG_LEVEL", "info");
        let json = env_optional("GRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
                run_migrations,
            },
            inference: InferenceSettings {
                base_url: inference_base_url,
                api_key: inference_api_key,
                model,
                max_new_tokens,
                connect_timeout_seconds,
            },
            stats: StatsSettings {
                service_url: stats_service_url,
                request_timeout_seconds,
                sweep_interval_seconds,
                max_attempts,
            },
            queue: QueueSettings { workers, capacity },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn inference(&self) -> &InferenceSettings {
        &self.inference
    }

    pub(crate) fn stats(&self) -> &StatsSettings {
        &self.stats
    }

    pub(crate) fn queue(&self) -> &QueueSettings {
        &self.queue
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.inference.max_new_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_MAX_NEW_TOKENS",
                value: self.inference.max_new_tokens.to_string(),
            });
        }

        if self.stats.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "STATS_REQUEST_TIMEOUT",
                value: self.stats.request_timeout_seconds.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("DATABASE_URL/POSTGRES_PASSWORD"));
        }

        if self.inference.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("INFERENCE_BASE_URL"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}
