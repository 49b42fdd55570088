//! Configuration structs

mod engine_config;

pub use engine_config::{
    AppSettings, ConfigError, DatabaseConfig, EngineConfig, Environment, InviteConfig,
    MessagingConfig, ModerationConfig, RedisConfig, RuntimeConfig,
};
