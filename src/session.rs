//! The physical connection to the device.


use crate::{
	backend::{Backend, ClearBuffer, Connector, SerialConnector, UNKNOWN_BACKEND_NAME},
	clock::{Clock, SystemClock},
	config::UartConfig,
	error::TransportError,
	response::is_complete_frame,
};
use std::{
	io::{self, Write as _},
	time::Duration,
};

/// How often the input is checked while waiting for a response.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait after writing a line, so the device can start processing it.
pub const WRITE_SETTLE: Duration = Duration::from_millis(100);

/// How long to wait between reads while draining boot output.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// A serial connection to the device, with line framing and read timeouts.
///
/// A session is either open or closed. It opens lazily and holds at most one
/// physical handle at a time. The handle is closed when the session is
/// dropped.
///
/// A session is not internally synchronized. If it must be shared between
/// threads, wrap it (or the [`Commander`](crate::Commander) that owns it) in a
/// [`Mutex`](std::sync::Mutex).
pub struct Session<C: Connector = SerialConnector, K = SystemClock> {
	/// Opens the underlying backend.
	connector: C,
	/// The open backend, if any.
	backend: Option<C::Backend>,
	/// The serial settings.
	config: UartConfig,
	/// Used for all waits.
	clock: K,
}

impl<C: Connector, K> std::fmt::Debug for Session<C, K> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("name", &self.backend.as_ref().and_then(Backend::name))
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl Session {
	/// Create a closed session for a serial port.
	pub fn new(config: UartConfig) -> Self {
		Session::with_parts(config, SerialConnector, SystemClock)
	}
}

impl<C: Connector, K: Clock> Session<C, K> {
	/// Create a closed session using a custom connector and clock.
	pub fn with_parts(config: UartConfig, connector: C, clock: K) -> Self {
		Session {
			connector,
			backend: None,
			config,
			clock,
		}
	}

	/// The serial settings.
	pub fn config(&self) -> &UartConfig {
		&self.config
	}

	/// The clock used for all waits.
	pub fn clock(&self) -> &K {
		&self.clock
	}

	/// The connector used to open the port.
	pub fn connector(&self) -> &C {
		&self.connector
	}

	/// Whether the session has an open connection.
	pub fn is_open(&self) -> bool {
		self.backend.is_some()
	}

	/// Get the open backend, or an error if the session is closed.
	fn backend(&mut self) -> Result<&mut C::Backend, TransportError> {
		self.backend.as_mut().ok_or(TransportError::NotOpen)
	}

	fn name(&self) -> String {
		self.backend
			.as_ref()
			.and_then(Backend::name)
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string())
	}

	/// Open the connection, if it is not already open.
	///
	/// If `port` is `None`, the configured default port is used. Once the port
	/// is open, DTR and RTS are driven low (so boards that wire them to the
	/// reset pin are not reset), the boot delay is waited out, and everything
	/// the device sent while booting is discarded.
	pub fn open(&mut self, port: Option<&str>) -> Result<(), TransportError> {
		if self.is_open() {
			log::debug!("{} is already open", self.name());
			return Ok(());
		}
		let port = port.unwrap_or(&self.config.default_port).to_string();
		log::debug!("opening {port} at {} baud", self.config.baud_rate);
		let mut backend = self.connector.connect(&port, &self.config)?;

		backend.write_data_terminal_ready(false)?;
		backend.write_request_to_send(false)?;

		self.clock.sleep(self.config.boot_delay);

		backend.clear(ClearBuffer::All)?;
		loop {
			let discarded = read_available(&mut backend)?;
			if discarded.is_empty() {
				break;
			}
			log::debug!(
				"{port} discarding {} bytes of boot output: {}",
				discarded.len(),
				String::from_utf8_lossy(&discarded).trim_end()
			);
			self.clock.sleep(DRAIN_INTERVAL);
		}

		self.backend = Some(backend);
		Ok(())
	}

	/// Close the connection, if it is open.
	///
	/// This never fails.
	pub fn close(&mut self) {
		if self.is_open() {
			let name = self.name();
			self.backend = None;
			log::debug!("{name} closed");
		}
	}

	/// Discard any input that has been received but not read.
	pub fn clear_input(&mut self) -> Result<(), TransportError> {
		self.backend()?.clear(ClearBuffer::Input)?;
		Ok(())
	}

	/// Write `text` followed by the line terminator.
	///
	/// After the data is flushed, the session waits briefly to give the device
	/// time to start processing it.
	pub fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
		let name = self.name();
		let line = format!("{text}{}", self.config.line_terminator);
		log::debug!("{name} TX:   {}", line.trim_end());
		let backend = self.backend()?;
		backend.write_all(line.as_bytes())?;
		backend.flush()?;
		self.clock.sleep(WRITE_SETTLE);
		Ok(())
	}

	/// Read until a complete response frame has been received or the timeout elapses.
	///
	/// A frame is complete once the text contains `RESPONSE:` and the line
	/// terminator. Whatever was accumulated is returned, which is empty if
	/// nothing useful arrived in time.
	///
	/// Invalid UTF-8 is treated as line noise: everything accumulated up to and
	/// including the invalid bytes is discarded, along with any unread input,
	/// and decoding continues with the rest of the data that was read. A
	/// multi-byte character split across two reads is not considered invalid.
	pub fn read_with_timeout(&mut self) -> Result<String, TransportError> {
		let name = self.name();
		let timeout = self.config.timeout;
		let start = self.clock.now();
		let mut response = String::new();
		// Bytes of an incomplete UTF-8 sequence at the end of the last read.
		let mut pending = Vec::new();

		while self.clock.now().duration_since(start) < timeout {
			let backend = self.backend.as_mut().ok_or(TransportError::NotOpen)?;
			if backend.bytes_to_read()? > 0 {
				pending.extend(read_available(backend)?);
				if let Some(e) = accumulate(&mut pending, &mut response) {
					log::warn!("{name} received invalid UTF-8 data ({e}), clearing buffer");
					backend.clear(ClearBuffer::Input)?;
				}
				if is_complete_frame(&response, &self.config.line_terminator) {
					break;
				}
			}
			self.clock.sleep(POLL_INTERVAL);
		}

		if !pending.is_empty() {
			log::warn!(
				"{name} discarding {} bytes of an incomplete UTF-8 sequence",
				pending.len()
			);
		}
		if !response.is_empty() {
			log::debug!("{name} RECV: {}", response.trim_end());
		}
		Ok(response)
	}
}

impl<C: Connector, K> Drop for Session<C, K> {
	fn drop(&mut self) {
		if self.backend.take().is_some() {
			log::debug!("session dropped, serial port closed");
		}
	}
}

/// Read everything the backend has received so far.
fn read_available<B: Backend + ?Sized>(backend: &mut B) -> Result<Vec<u8>, TransportError> {
	let available = usize::try_from(backend.bytes_to_read()?).unwrap_or(usize::MAX);
	if available == 0 {
		return Ok(Vec::new());
	}
	let mut buf = vec![0; available];
	let n = match backend.read(&mut buf) {
		Ok(n) => n,
		Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => 0,
		Err(e) => return Err(e.into()),
	};
	buf.truncate(n);
	Ok(buf)
}

/// Decode `pending` onto the end of `response`.
///
/// Each invalid sequence restarts the response: the text before it and the
/// sequence itself are dropped, and decoding resumes right after it. Returns
/// the last decoding error, if there was one.
fn accumulate(pending: &mut Vec<u8>, response: &mut String) -> Option<std::str::Utf8Error> {
	let mut last_error = None;
	loop {
		match decode(pending) {
			Ok(text) => {
				response.push_str(&text);
				return last_error;
			}
			Err(e) => {
				let skip = e.valid_up_to() + e.error_len().unwrap_or(1);
				pending.drain(..skip.min(pending.len()));
				response.clear();
				last_error = Some(e);
			}
		}
	}
}

/// Take the longest valid UTF-8 prefix of `bytes`.
///
/// An incomplete sequence at the very end is left in `bytes` for the next
/// read to complete. Any other invalid sequence is an error.
fn decode(bytes: &mut Vec<u8>) -> Result<String, std::str::Utf8Error> {
	let valid = match std::str::from_utf8(bytes.as_slice()) {
		Ok(_) => bytes.len(),
		Err(e) if e.error_len().is_none() => e.valid_up_to(),
		Err(e) => return Err(e),
	};
	let rest = bytes.split_off(valid);
	let text = String::from_utf8(std::mem::replace(bytes, rest))
		.map_err(|e| e.utf8_error())?;
	Ok(text)
}
