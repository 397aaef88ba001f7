use serde_derive::Deserialize;

// When changing anything here, make sure to add
// #[serde(alias = "ihavenounderscores")]
// where needed, so it can be read from the ENV vars.

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Copies printed when `-n` is not given.
    pub copies: i64,
    /// Printer name or index used when `-p` is not given.
    pub printer: Option<String>,
    /// Set through WINPRINT_LOGLEVEL; WINPRINT_LOG_LEVEL would be read as
    /// `log.level` and ignored.
    #[serde(alias = "loglevel")]
    pub log_level: String,
}
