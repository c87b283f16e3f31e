//! Sending commands and waiting for their responses.

#[cfg(test)]
mod test;

use crate::{
	backend::{Connector, SerialConnector},
	clock::{Clock, SystemClock},
	config::Config,
	error::{TransactionError, TransportError},
	response::{classify, Grammar, ParsedResponse},
	session::Session,
};
use std::time::Duration;

/// How failed transactions are retried.
///
/// A transaction is retried when the device sends nothing back, when the
/// response cannot be classified, or when the device reports a status other
/// than `OK`. Transport faults are never retried.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
	/// The number of attempts after the first.
	pub max_retries: u32,
	/// The pause before each retry.
	pub delay: Duration,
}

impl RetryPolicy {
	/// A policy that never retries.
	pub const NONE: RetryPolicy = RetryPolicy {
		max_retries: 0,
		delay: Duration::ZERO,
	};

	/// Create a policy with `max_retries` retries, each preceded by `delay`.
	pub const fn new(max_retries: u32, delay: Duration) -> Self {
		RetryPolicy { max_retries, delay }
	}

	/// The most times a command is sent, counting the first attempt.
	pub const fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}
}

impl Default for RetryPolicy {
	/// Three retries, half a second apart.
	fn default() -> Self {
		RetryPolicy::new(3, Duration::from_millis(500))
	}
}

/// Types that want to see the raw response to a command.
///
/// Any `FnMut(&str)` closure is an observer.
pub trait ResponseObserver {
	/// Called once for every line of a non-empty response, before it is classified.
	fn log_response(&mut self, line: &str);
}

impl<F: FnMut(&str)> ResponseObserver for F {
	fn log_response(&mut self, line: &str) {
		(self)(line);
	}
}

/// Sends commands to the device and classifies the responses.
///
/// The commander owns the [`Session`] and opens it on demand, so
/// [`open`](Commander::open) only needs to be called to pick a port other
/// than the configured default or to find connection problems early. The
/// connection is closed when the commander is dropped.
///
/// ```rust,no_run
/// # use serial_commander::{Commander, Config};
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut commander = Commander::new(Config::from_file("esp32_config.json")?);
/// if commander.send_command("GPIO_OUTPUT 4 1") {
///     println!("done: {}", commander.last_response().unwrap_or_default());
/// }
///
/// let response = commander.try_send_command("ADC_INPUT 2")?;
/// println!("{response}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Commander<C: Connector = SerialConnector, K = SystemClock> {
	/// The connection to the device.
	session: Session<C, K>,
	/// Used to classify responses.
	grammar: Grammar,
	/// How failed transactions are retried.
	retry: RetryPolicy,
	/// The last non-empty response.
	last_response: Option<String>,
}

impl Commander {
	/// Create a commander for the serial port in `config`.
	///
	/// The port is not opened until it is needed.
	pub fn new(config: Config) -> Self {
		Commander::with_parts(config, SerialConnector, SystemClock)
	}
}

impl<C: Connector, K: Clock> Commander<C, K> {
	/// Create a commander using a custom connector and clock.
	pub fn with_parts(config: Config, connector: C, clock: K) -> Self {
		Commander {
			session: Session::with_parts(config.uart, connector, clock),
			grammar: config.grammar,
			retry: RetryPolicy::default(),
			last_response: None,
		}
	}

	/// Use `policy` to retry failed transactions.
	#[must_use]
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry = policy;
		self
	}

	/// Set the policy used to retry failed transactions.
	pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
		self.retry = policy;
	}

	/// The policy used to retry failed transactions.
	pub fn retry_policy(&self) -> RetryPolicy {
		self.retry
	}

	/// The grammar used to classify responses.
	pub fn grammar(&self) -> &Grammar {
		&self.grammar
	}

	/// The underlying session.
	pub fn session(&self) -> &Session<C, K> {
		&self.session
	}

	/// The raw text of the last non-empty response, if any.
	///
	/// It is replaced by every non-empty response, whether or not it could be
	/// classified.
	pub fn last_response(&self) -> Option<&str> {
		self.last_response.as_deref()
	}

	/// Open the connection, if it is not already open.
	///
	/// If `port` is `None`, the configured default port is used.
	pub fn open(&mut self, port: Option<&str>) -> Result<(), TransportError> {
		self.session.open(port)
	}

	/// Close the connection, if it is open.
	pub fn close(&mut self) {
		self.session.close();
	}

	/// Send `command` and return whether the device acknowledged it with an `OK` status.
	///
	/// All failures are logged. Use [`try_send_command`](Commander::try_send_command)
	/// to get the parsed response or the reason for the failure.
	pub fn send_command(&mut self, command: &str) -> bool {
		self.try_send_command(command).is_ok()
	}

	/// Same as [`send_command`](Commander::send_command), except that every
	/// line of every non-empty response is first passed to `observer`.
	pub fn send_command_observed<O>(&mut self, command: &str, observer: &mut O) -> bool
	where
		O: ResponseObserver + ?Sized,
	{
		self.try_send_command_observed(command, observer).is_ok()
	}

	/// Send `command` and return the device's response.
	///
	/// The command is retried according to the [`RetryPolicy`]. The response
	/// is only returned if its status is `OK`.
	pub fn try_send_command(&mut self, command: &str) -> Result<ParsedResponse, TransactionError> {
		self.try_send_command_observed(command, &mut |_: &str| {})
	}

	/// Same as [`try_send_command`](Commander::try_send_command), except that
	/// every line of every non-empty response is first passed to `observer`.
	pub fn try_send_command_observed<O>(
		&mut self,
		command: &str,
		observer: &mut O,
	) -> Result<ParsedResponse, TransactionError>
	where
		O: ResponseObserver + ?Sized,
	{
		let max_retries = self.retry.max_retries;
		let mut retries = 0;
		loop {
			if retries > 0 {
				log::debug!("retry attempt {retries}/{max_retries} for command: {command}");
			} else {
				log::debug!("sending command: [{command}]");
			}

			let err = match self.attempt(command, observer) {
				Ok(response) => return Ok(response),
				Err(err @ TransactionError::Transport(_)) => {
					self.recover(&err);
					return Err(err);
				}
				Err(err) => err,
			};

			if retries < max_retries {
				retries += 1;
				log::warn!("command failed ({err}), attempting retry {retries}/{max_retries}");
				self.session.clock().sleep(self.retry.delay);
			} else {
				log::error!("command failed after {max_retries} retries: {err}");
				return Err(TransactionError::ExhaustedRetries {
					attempts: self.retry.max_attempts(),
					last: Box::new(err),
				});
			}
		}
	}

	/// Make a single attempt at `command`.
	fn attempt<O>(&mut self, command: &str, observer: &mut O) -> Result<ParsedResponse, TransactionError>
	where
		O: ResponseObserver + ?Sized,
	{
		self.session.open(None)?;
		self.session.clear_input()?;
		self.session.write_line(command)?;
		let response = self.session.read_with_timeout()?;

		if response.is_empty() {
			log::warn!("no response received for command: {command}");
			return Err(TransactionError::EmptyResponse);
		}
		for line in response.split('\n') {
			observer.log_response(line);
		}
		let parsed = classify(&response, &self.grammar);
		self.last_response = Some(response);

		let parsed = parsed?;
		log::debug!("parsed response: {parsed}");
		if parsed.is_ok() {
			Ok(parsed)
		} else {
			log::warn!("response status is not OK: {}", parsed.status());
			Err(TransactionError::NonOkStatus(parsed))
		}
	}

	/// Reset the connection after a transport fault.
	fn recover(&mut self, err: &TransactionError) {
		log::error!("serial communication error: {err}");
		self.session.close();
		if let Err(e) = self.session.open(None) {
			log::error!("failed to reopen serial connection: {e}");
		}
	}
}
