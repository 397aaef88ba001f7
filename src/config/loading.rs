use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};

use super::models::Settings;

pub const ENV_PREFIX: &str = "WINPRINT";

pub fn load_config() -> Result<Settings, ConfigError> {
    // As Rust has no native support for .env files,
    // we use the dotenv_flow crate to import to actual ENV vars.
    // A missing .env file is fine.
    let _ = dotenv_flow::dotenv_flow();

    settings_from(Config::builder().add_source(environment()))
}

// `_` after the prefix splits keys into nested tables, so only underscore-free
// names like WINPRINT_LOGLEVEL reach the flat `Settings`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("_")
        .prefix_separator("_")
        .try_parsing(true)
}

/// Applies the defaults on top of `builder` and deserializes the result.
pub fn settings_from(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    builder
        .set_default("copies", 1)?
        .set_default("loglevel", "warn")?
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = settings_from(Config::builder()).unwrap();
        assert_eq!(settings.copies, 1);
        assert_eq!(settings.printer, None);
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn environment_keys_without_underscores() {
        let vars = [("WINPRINT_COPIES", "2"), ("WINPRINT_LOGLEVEL", "info"), ("WINPRINT_LOG_LEVEL", "trace")]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        let settings = settings_from(Config::builder().add_source(environment().source(Some(vars)))).unwrap();
        assert_eq!(settings.copies, 2);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn overrides_win() {
        let builder = Config::builder()
            .set_override("copies", 3)
            .unwrap()
            .set_override("printer", "Office")
            .unwrap()
            .set_override("loglevel", "debug")
            .unwrap();
        let settings = settings_from(builder).unwrap();
        assert_eq!(settings.copies, 3);
        assert_eq!(settings.printer.as_deref(), Some("Office"));
        assert_eq!(settings.log_level, "debug");
    }
}
