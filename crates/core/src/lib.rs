pub mod config;
pub mod currency;

pub use config::{AppConfig, ConfigError, OcrSettings, ServerSettings};
pub use currency::{fixed_rate, round2, Conversion, Currency, CurrencyError};
