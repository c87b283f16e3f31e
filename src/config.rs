//! Connection and response grammar configuration.
//!
//! Configuration is normally loaded once at startup from a JSON file:
//!
//! ```json
//! {
//!     "ESP32_UART_CONFIG": {
//!         "DEFAULT_PORT": "/dev/ttyUSB0",
//!         "BAUD_RATE": 115200,
//!         "TIMEOUT": 2.0,
//!         "ESP32_BOOT_DELAY": 2.0,
//!         "LINE_TERMINATOR": "\n"
//!     },
//!     "ESP32_RESPONSE_PATTERNS": {
//!         "GPIO_OUTPUT": "RESPONSE: GPIO_OUTPUT (\\d+) (\\w+)",
//!         "ADC_INPUT": "RESPONSE: ADC_INPUT (\\d+) (\\d+) (\\w+)"
//!     }
//! }
//! ```
//!
//! Durations are in seconds. The response patterns are evaluated in the order
//! they appear in the file.

use crate::{error::ConfigError, response::Grammar};
use serde::{de::Error as _, Deserialize, Deserializer};
use std::{path::Path, time::Duration};

/// The name of the section holding the [`UartConfig`].
const UART_SECTION: &str = "ESP32_UART_CONFIG";
/// The name of the section holding the response patterns.
const PATTERNS_SECTION: &str = "ESP32_RESPONSE_PATTERNS";

/// Serial connection settings.
///
/// The framing is always 8 data bits, no parity and 1 stop bit, without
/// hardware flow control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UartConfig {
	/// The port used when none is given explicitly (e.g. `/dev/ttyUSB0` or `COM3`).
	pub default_port: String,
	/// The baud rate.
	pub baud_rate: u32,
	/// How long to wait for a complete response.
	#[serde(deserialize_with = "seconds")]
	pub timeout: Duration,
	/// How long to wait after opening the port for the device to finish booting.
	#[serde(rename = "ESP32_BOOT_DELAY", deserialize_with = "seconds")]
	pub boot_delay: Duration,
	/// The text that terminates every command and response line.
	#[serde(deserialize_with = "non_empty")]
	pub line_terminator: String,
}

impl UartConfig {
	/// The default baud rate of the ESP32 firmware: 115,200.
	pub const DEFAULT_BAUD_RATE: u32 = 115_200;

	/// Settings for `port` with the firmware defaults: 115,200 baud, a 2 second
	/// timeout, a 2 second boot delay and `\n` line terminators.
	pub fn new<P: Into<String>>(port: P) -> Self {
		UartConfig {
			default_port: port.into(),
			baud_rate: UartConfig::DEFAULT_BAUD_RATE,
			timeout: Duration::from_secs(2),
			boot_delay: Duration::from_secs(2),
			line_terminator: "\n".to_string(),
		}
	}
}

/// Deserialize a non-negative number of seconds.
fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
	let secs = f64::deserialize(deserializer)?;
	Duration::try_from_secs_f64(secs)
		.map_err(|_| D::Error::custom(format!("invalid duration: {secs} seconds")))
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	let s = String::deserialize(deserializer)?;
	if s.is_empty() {
		Err(D::Error::custom("the line terminator cannot be empty"))
	} else {
		Ok(s)
	}
}

/// The complete configuration of a [`Commander`](crate::Commander).
#[derive(Debug, Clone)]
pub struct Config {
	/// The serial connection settings.
	pub uart: UartConfig,
	/// The response grammar.
	pub grammar: Grammar,
}

/// The file layout, before validation.
#[derive(Deserialize)]
struct RawConfig {
	#[serde(rename = "ESP32_UART_CONFIG")]
	uart: Option<UartConfig>,
	#[serde(rename = "ESP32_RESPONSE_PATTERNS")]
	patterns: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Config {
	/// Create a configuration from its parts.
	pub fn new(uart: UartConfig, grammar: Grammar) -> Self {
		Config { uart, grammar }
	}

	/// Load the configuration from a JSON file.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		log::debug!("loading configuration from {}", path.display());
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Config::from_json_str(&text)
	}

	/// Parse the configuration from JSON text.
	pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
		let raw: RawConfig = serde_json::from_str(text)?;
		let (uart, patterns) = match (raw.uart, raw.patterns) {
			(Some(uart), Some(patterns)) => (uart, patterns),
			(uart, patterns) => {
				let mut missing = Vec::new();
				if uart.is_none() {
					missing.push(UART_SECTION);
				}
				if patterns.is_none() {
					missing.push(PATTERNS_SECTION);
				}
				return Err(ConfigError::MissingSections(missing));
			}
		};
		let patterns = patterns
			.into_iter()
			.map(|(name, pattern)| match pattern {
				serde_json::Value::String(pattern) => Ok((name, pattern)),
				_ => Err(ConfigError::PatternNotString(name)),
			})
			.collect::<Result<Vec<_>, _>>()?;
		let grammar = Grammar::from_patterns(patterns)?;
		Ok(Config { uart, grammar })
	}
}

impl std::str::FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Config::from_json_str(s)
	}
}
