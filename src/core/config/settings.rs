use super::parsing::{
    env_optional, env_or_default, is_supported_image_type, parse_bool, parse_cors_origins,
    parse_environment, parse_store_backend, parse_string_list, parse_u16, parse_u32, parse_u64,
    parse_utc_offset,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings,
    RedisSettings, RuntimeSettings, SchoolSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, StoreBackend, StoreSettings, TelemetrySettings, UploadSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("ACCOUNTABLE_HOST", "0.0.0.0");
        let port = env_or_default("ACCOUNTABLE_PORT", "8000");

        let environment = parse_environment(
            env_optional("ACCOUNTABLE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("ACCOUNTABLE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Accountable API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let backend = parse_store_backend(env_optional("STORE_BACKEND"))?;
        let transaction_attempts = parse_u32(
            "STORE_TRANSACTION_ATTEMPTS",
            env_or_default("STORE_TRANSACTION_ATTEMPTS", "5"),
        )?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "accountable");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "accountable");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o-mini");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "4000"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_image_types = parse_string_list(
            env_optional("ALLOWED_IMAGE_TYPES"),
            &["image/jpeg", "image/png", "image/webp"],
        );

        let utc_offset = parse_utc_offset("SCHOOL_UTC_OFFSET", env_optional("SCHOOL_UTC_OFFSET"))?;
        let rollover_interval_seconds = parse_u64(
            "ROLLOVER_INTERVAL_SECONDS",
            env_or_default("ROLLOVER_INTERVAL_SECONDS", "60"),
        )?;

        let purge_secret = env_or_default("ADMIN_PURGE_SECRET", "");
        let first_admin_email = env_or_default("FIRST_ADMIN_EMAIL", "admin@accountable.local");
        let first_admin_password = env_or_default("FIRST_ADMIN_PASSWORD", "");
        let first_admin_name = env_or_default("FIRST_ADMIN_NAME", "Administrator");

        let log_level = env_or_default("ACCOUNTABLE_LOG_LEVEL", "info");
        let json =
            env_optional("ACCOUNTABLE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            store: StoreSettings { backend, transaction_attempts },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_request_timeout,
            },
            uploads: UploadSettings { max_upload_size_mb, allowed_image_types },
            school: SchoolSettings { utc_offset, rollover_interval_seconds },
            admin: AdminSettings {
                purge_secret,
                first_admin_email,
                first_admin_password,
                first_admin_name,
            },
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

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn uploads(&self) -> &UploadSettings {
        &self.uploads
    }

    pub(crate) fn school(&self) -> &SchoolSettings {
        &self.school
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.uploads.allowed_image_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_TYPES",
                value: String::from("<empty>"),
            });
        }

        for mime in &self.uploads.allowed_image_types {
            if !is_supported_image_type(mime) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_TYPES",
                    value: mime.clone(),
                });
            }
        }

        if self.store.transaction_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "STORE_TRANSACTION_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.school.rollover_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ROLLOVER_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.store.backend == StoreBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "STORE_BACKEND",
                value: self.store.backend.as_str().to_string(),
            });
        }
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.admin.purge_secret.is_empty() {
            return Err(ConfigError::MissingSecret("ADMIN_PURGE_SECRET"));
        }
        if self.admin.first_admin_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_ADMIN_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn load_reads_store_backend_and_school_offset() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("SCHOOL_UTC_OFFSET", "+02:00");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.store().backend, StoreBackend::Memory);
        assert_eq!(settings.school().utc_offset.whole_hours(), 2);
        assert_eq!(settings.store().transaction_attempts, 5);

        std::env::remove_var("SCHOOL_UTC_OFFSET");
    }

    #[tokio::test]
    async fn strict_config_rejects_memory_backend() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("ACCOUNTABLE_STRICT_CONFIG", "1");

        let result = Settings::load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "STORE_BACKEND", .. })));

        std::env::set_var("ACCOUNTABLE_STRICT_CONFIG", "0");
    }

    #[tokio::test]
    async fn rejects_unsupported_image_type() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("ALLOWED_IMAGE_TYPES", "image/png,application/pdf");

        let result = Settings::load();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "ALLOWED_IMAGE_TYPES", .. })
        ));

        std::env::remove_var("ALLOWED_IMAGE_TYPES");
    }
}
