//! Types for parsing and classifying ESP32 response messages.
//!
//! The firmware answers every command with a line of the form
//!
//! ```text
//! RESPONSE: <TYPE> <field>... <STATUS>
//! ```
//!
//! possibly surrounded by log output. The [`Grammar`] describes which
//! response types exist and how to extract their fields, and [`classify`]
//! turns a raw buffer into a [`ParsedResponse`].

mod classify;
pub mod grammar;
#[cfg(test)]
mod test;

pub use classify::classify;
pub use grammar::{Grammar, Rule};

use crate::error::{ClassifyError, ConfigError};

/// The prefix every candidate response line starts with.
pub const RESPONSE_PREFIX: &str = "RESPONSE: ";

/// The marker that signals a complete response frame is (probably) in the buffer.
pub const RESPONSE_MARKER: &str = "RESPONSE:";

/// The status token indicating the device executed the command successfully.
pub const STATUS_OK: &str = "OK";

/// Whether `buffer` holds a complete response frame.
///
/// A frame is complete once the buffer contains both the response marker and
/// the line terminator, in any order.
pub(crate) fn is_complete_frame(buffer: &str, terminator: &str) -> bool {
	buffer.contains(RESPONSE_MARKER) && buffer.contains(terminator)
}

/// The kinds of responses the firmware can send.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseKind {
	/// A digital output was set.
	GpioOutput,
	/// A digital input was read.
	GpioInput,
	/// A PWM output was configured.
	PwmOutput,
	/// A DAC output was set.
	DacOutput,
	/// An analog input was sampled.
	AdcInput,
	/// A signal generator was started.
	GenSignal,
	/// A closed control loop was configured.
	ClosedLoop,
}

impl ResponseKind {
	/// All response kinds, in the order of the default grammar.
	pub const ALL: [ResponseKind; 7] = [
		ResponseKind::GpioOutput,
		ResponseKind::GpioInput,
		ResponseKind::PwmOutput,
		ResponseKind::DacOutput,
		ResponseKind::AdcInput,
		ResponseKind::GenSignal,
		ResponseKind::ClosedLoop,
	];

	/// The name of the response type as it appears on the wire and in configuration.
	pub fn name(self) -> &'static str {
		match self {
			ResponseKind::GpioOutput => "GPIO_OUTPUT",
			ResponseKind::GpioInput => "GPIO_INPUT",
			ResponseKind::PwmOutput => "PWM_OUTPUT",
			ResponseKind::DacOutput => "DAC_OUTPUT",
			ResponseKind::AdcInput => "ADC_INPUT",
			ResponseKind::GenSignal => "GEN_SIGNAL",
			ResponseKind::ClosedLoop => "CLOSED_LOOP",
		}
	}

	/// The names of the fields a pattern for this kind must capture, in order.
	pub fn fields(self) -> &'static [&'static str] {
		match self {
			ResponseKind::GpioOutput | ResponseKind::PwmOutput | ResponseKind::DacOutput => {
				&["pin", "status"]
			}
			ResponseKind::GpioInput | ResponseKind::AdcInput => &["pin", "value", "status"],
			ResponseKind::GenSignal => &["signal_type", "value", "status"],
			ResponseKind::ClosedLoop => &["id", "status"],
		}
	}

	/// Build a response of this kind from the captured field text.
	///
	/// `groups` must hold one entry per [`field`](ResponseKind::fields).
	pub(crate) fn extract(self, groups: &[&str]) -> Result<ParsedResponse, ClassifyError> {
		debug_assert_eq!(groups.len(), self.fields().len());
		let field = |index: usize| groups.get(index).copied().unwrap_or_default();
		let status = field(groups.len().saturating_sub(1)).to_string();
		Ok(match self {
			ResponseKind::GpioOutput => ParsedResponse::GpioOutput {
				pin: self.parse_field(0, field(0))?,
				status,
			},
			ResponseKind::GpioInput => ParsedResponse::GpioInput {
				pin: self.parse_field(0, field(0))?,
				value: self.parse_field(1, field(1))?,
				status,
			},
			ResponseKind::PwmOutput => ParsedResponse::PwmOutput {
				pin: self.parse_field(0, field(0))?,
				status,
			},
			ResponseKind::DacOutput => ParsedResponse::DacOutput {
				pin: self.parse_field(0, field(0))?,
				status,
			},
			ResponseKind::AdcInput => ParsedResponse::AdcInput {
				pin: self.parse_field(0, field(0))?,
				value: self.parse_field(1, field(1))?,
				status,
			},
			ResponseKind::GenSignal => ParsedResponse::GenSignal {
				signal_type: self.parse_field(0, field(0))?,
				value: self.parse_field(1, field(1))?,
				status,
			},
			ResponseKind::ClosedLoop => ParsedResponse::ClosedLoop {
				id: self.parse_field(0, field(0))?,
				status,
			},
		})
	}

	/// Parse the text captured for the field at `index`.
	fn parse_field<T: std::str::FromStr>(self, index: usize, text: &str) -> Result<T, ClassifyError> {
		text.trim().parse().map_err(|_| ClassifyError::InvalidField {
			kind: self,
			field: self.fields()[index],
			value: text.to_string(),
		})
	}
}

impl std::fmt::Display for ResponseKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

impl std::str::FromStr for ResponseKind {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ResponseKind::ALL
			.into_iter()
			.find(|kind| kind.name() == s)
			.ok_or_else(|| ConfigError::UnknownResponseType(s.to_string()))
	}
}

/// A classified response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
	/// `GPIO_OUTPUT <pin> <status>`
	GpioOutput {
		/// The pin that was set.
		pin: u32,
		/// The status token.
		status: String,
	},
	/// `GPIO_INPUT <pin> <value> <status>`
	GpioInput {
		/// The pin that was read.
		pin: u32,
		/// The level read from the pin.
		value: i64,
		/// The status token.
		status: String,
	},
	/// `PWM_OUTPUT <pin> <status>`
	PwmOutput {
		/// The PWM pin.
		pin: u32,
		/// The status token.
		status: String,
	},
	/// `DAC_OUTPUT <pin> <status>`
	DacOutput {
		/// The DAC pin.
		pin: u32,
		/// The status token.
		status: String,
	},
	/// `ADC_INPUT <pin> <value> <status>`
	AdcInput {
		/// The pin that was sampled.
		pin: u32,
		/// The raw ADC reading.
		value: i64,
		/// The status token.
		status: String,
	},
	/// `GEN_SIGNAL <signal_type> <value> <status>`
	GenSignal {
		/// The kind of signal being generated.
		signal_type: u32,
		/// The signal parameter (e.g. frequency).
		value: f64,
		/// The status token.
		status: String,
	},
	/// `CLOSED_LOOP <id> <status>`
	ClosedLoop {
		/// The control loop ID.
		id: u32,
		/// The status token.
		status: String,
	},
}

impl ParsedResponse {
	/// The kind of response.
	pub fn kind(&self) -> ResponseKind {
		match self {
			ParsedResponse::GpioOutput { .. } => ResponseKind::GpioOutput,
			ParsedResponse::GpioInput { .. } => ResponseKind::GpioInput,
			ParsedResponse::PwmOutput { .. } => ResponseKind::PwmOutput,
			ParsedResponse::DacOutput { .. } => ResponseKind::DacOutput,
			ParsedResponse::AdcInput { .. } => ResponseKind::AdcInput,
			ParsedResponse::GenSignal { .. } => ResponseKind::GenSignal,
			ParsedResponse::ClosedLoop { .. } => ResponseKind::ClosedLoop,
		}
	}

	/// The status token.
	pub fn status(&self) -> &str {
		match self {
			ParsedResponse::GpioOutput { status, .. }
			| ParsedResponse::GpioInput { status, .. }
			| ParsedResponse::PwmOutput { status, .. }
			| ParsedResponse::DacOutput { status, .. }
			| ParsedResponse::AdcInput { status, .. }
			| ParsedResponse::GenSignal { status, .. }
			| ParsedResponse::ClosedLoop { status, .. } => status,
		}
	}

	/// Whether the status is exactly `OK`.
	pub fn is_ok(&self) -> bool {
		self.status() == STATUS_OK
	}
}

impl std::fmt::Display for ParsedResponse {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.kind())?;
		match self {
			ParsedResponse::GpioOutput { pin, .. }
			| ParsedResponse::PwmOutput { pin, .. }
			| ParsedResponse::DacOutput { pin, .. } => write!(f, " pin={pin}")?,
			ParsedResponse::GpioInput { pin, value, .. }
			| ParsedResponse::AdcInput { pin, value, .. } => write!(f, " pin={pin} value={value}")?,
			ParsedResponse::GenSignal {
				signal_type, value, ..
			} => write!(f, " signal_type={signal_type} value={value}")?,
			ParsedResponse::ClosedLoop { id, .. } => write!(f, " id={id}")?,
		}
		write!(f, " status={}", self.status())
	}
}
