//! The ordered set of rules used to recognize response lines.

use super::{ParsedResponse, ResponseKind};
use crate::error::{ClassifyError, ConfigError};
use regex::Regex;

/// The patterns used by [`Grammar::default`], in evaluation order.
const DEFAULT_PATTERNS: [(ResponseKind, &str); 7] = [
	(ResponseKind::GpioOutput, r"RESPONSE: GPIO_OUTPUT (\d+) (\w+)$"),
	(ResponseKind::GpioInput, r"RESPONSE: GPIO_INPUT (\d+) (\d+) (\w+)$"),
	(ResponseKind::PwmOutput, r"RESPONSE: PWM_OUTPUT (\d+) (\w+)$"),
	(ResponseKind::DacOutput, r"RESPONSE: DAC_OUTPUT (\d+) (\w+)$"),
	(ResponseKind::AdcInput, r"RESPONSE: ADC_INPUT (\d+) (\d+) (\w+)$"),
	(
		ResponseKind::GenSignal,
		r"RESPONSE: GEN_SIGNAL (\d+) ([-+]?\d+(?:\.\d+)?) (\w+)$",
	),
	(ResponseKind::ClosedLoop, r"RESPONSE: CLOSED_LOOP (\d+) (\w+)$"),
];

/// A single response type and the pattern that recognizes it.
#[derive(Debug, Clone)]
pub struct Rule {
	/// The response type this rule produces.
	kind: ResponseKind,
	/// The pattern as written in the configuration.
	source: String,
	/// The compiled pattern, anchored at the start of the line.
	regex: Regex,
}

impl Rule {
	/// Compile a rule.
	///
	/// The pattern only has to match at the start of a line, and it must have
	/// exactly one capture group per [field](ResponseKind::fields) of `kind`.
	pub fn new(kind: ResponseKind, pattern: &str) -> Result<Self, ConfigError> {
		let regex = Regex::new(&format!("^(?:{pattern})"))
			.map_err(|source| ConfigError::InvalidPattern { kind, source })?;
		let expected = kind.fields().len();
		let actual = regex.captures_len() - 1;
		if actual != expected {
			return Err(ConfigError::CaptureCount {
				kind,
				expected,
				actual,
			});
		}
		Ok(Rule {
			kind,
			source: pattern.to_string(),
			regex,
		})
	}

	/// The response type this rule produces.
	pub fn kind(&self) -> ResponseKind {
		self.kind
	}

	/// The pattern as it was written.
	pub fn pattern(&self) -> &str {
		&self.source
	}

	/// Try to match `line`.
	///
	/// Returns `None` if the pattern does not match. Otherwise the captured
	/// fields are converted to their types, which may fail.
	pub fn apply(&self, line: &str) -> Option<Result<ParsedResponse, ClassifyError>> {
		let captures = self.regex.captures(line)?;
		let groups: Vec<&str> = captures
			.iter()
			.skip(1)
			.map(|group| group.map_or("", |m| m.as_str()))
			.collect();
		log::debug!("matched response type {} with groups {groups:?}", self.kind);
		Some(self.kind.extract(&groups))
	}
}

/// An ordered mapping from response type to the rule that recognizes it.
///
/// Rules are tried in the order they were added. The grammar cannot be
/// changed once it has been handed to a [`Commander`](crate::Commander).
#[derive(Debug, Clone)]
pub struct Grammar {
	rules: Vec<Rule>,
}

impl Grammar {
	/// Create an empty grammar, which matches nothing.
	pub fn empty() -> Self {
		Grammar { rules: Vec::new() }
	}

	/// Build a grammar from `(type name, pattern)` pairs, preserving their order.
	///
	/// ## Example
	///
	/// ```
	/// # use serial_commander::Grammar;
	/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
	/// let grammar = Grammar::from_patterns([
	///     ("GPIO_OUTPUT", r"RESPONSE: GPIO_OUTPUT (\d+) (\w+)"),
	///     ("ADC_INPUT", r"RESPONSE: ADC_INPUT (\d+) (\d+) (\w+)"),
	/// ])?;
	/// assert_eq!(grammar.len(), 2);
	/// # Ok(())
	/// # }
	/// ```
	pub fn from_patterns<I, N, P>(patterns: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (N, P)>,
		N: AsRef<str>,
		P: AsRef<str>,
	{
		let mut grammar = Grammar::empty();
		for (name, pattern) in patterns {
			let kind = name.as_ref().parse()?;
			grammar.push(Rule::new(kind, pattern.as_ref())?);
		}
		Ok(grammar)
	}

	/// Append a rule. It is evaluated after every rule already in the grammar.
	pub fn push(&mut self, rule: Rule) {
		self.rules.push(rule);
	}

	/// Get the first rule for the given response type, if any.
	pub fn rule(&self, kind: ResponseKind) -> Option<&Rule> {
		self.rules.iter().find(|rule| rule.kind == kind)
	}

	/// Iterate over the rules in evaluation order.
	pub fn rules(&self) -> impl Iterator<Item = &Rule> {
		self.rules.iter()
	}

	/// The number of rules.
	pub fn len(&self) -> usize {
		self.rules.len()
	}

	/// Whether the grammar has no rules.
	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	/// Match `line` against each rule in order. The first rule that matches decides the outcome.
	pub fn match_line(&self, line: &str) -> Option<Result<ParsedResponse, ClassifyError>> {
		self.rules.iter().find_map(|rule| rule.apply(line))
	}
}

impl Default for Grammar {
	/// The response patterns of the stock ESP32 firmware.
	fn default() -> Self {
		let mut grammar = Grammar::empty();
		for (kind, pattern) in DEFAULT_PATTERNS {
			match Rule::new(kind, pattern) {
				Ok(rule) => grammar.push(rule),
				Err(e) => unreachable!("built-in pattern for {kind} is invalid: {e}"),
			}
		}
		grammar
	}
}
