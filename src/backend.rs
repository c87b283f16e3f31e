//! Types that can exchange (read/write) bytes with a connected device.
//!
//! The [`Backend`] trait represents all such types, and a [`Connector`] knows
//! how to open one.

use std::io;
use std::time::Duration;

use crate::{config::UartConfig, error::TransportError};
use serialport as sp;

pub use sp::ClearBuffer;
#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected device.
pub trait Backend: io::Read + io::Write {
	/// The number of bytes received but not yet read.
	fn bytes_to_read(&self) -> io::Result<u32>;

	/// Discard the contents of the input buffer, output buffer, or both.
	fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()>;

	/// Set the level of the Data Terminal Ready line.
	fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()>;

	/// Set the level of the Request To Send line.
	fn write_request_to_send(&mut self, level: bool) -> io::Result<()>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
	fn bytes_to_read(&self) -> io::Result<u32> {
		(**self).bytes_to_read()
	}
	fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
		(**self).clear(buffer)
	}
	fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()> {
		(**self).write_data_terminal_ready(level)
	}
	fn write_request_to_send(&mut self, level: bool) -> io::Result<()> {
		(**self).write_request_to_send(level)
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

impl<B: Backend + ?Sized> Backend for &mut B {
	fn bytes_to_read(&self) -> io::Result<u32> {
		(**self).bytes_to_read()
	}
	fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
		(**self).clear(buffer)
	}
	fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()> {
		(**self).write_data_terminal_ready(level)
	}
	fn write_request_to_send(&mut self, level: bool) -> io::Result<()> {
		(**self).write_request_to_send(level)
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

/// Types that can open a [`Backend`] for a port.
pub trait Connector {
	/// The type of backend produced.
	type Backend: Backend;

	/// Open the port named `port` with the given configuration.
	fn connect(&mut self, port: &str, config: &UartConfig) -> Result<Self::Backend, TransportError>;
}

/// A platform agnostic serial port backend.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Only one of them is ever
// used on a given platform, so wrap whichever one it is in a new type rather
// than using dynamic dispatch or adding a type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl Serial {
	/// Open the serial port at `path`.
	///
	/// The port is configured for 8 data bits, no parity, 1 stop bit and no
	/// flow control, and DTR is not asserted while opening.
	pub fn open(path: &str, config: &UartConfig) -> Result<Self, TransportError> {
		sp::new(path, config.baud_rate)
			.data_bits(sp::DataBits::Eight)
			.parity(sp::Parity::None)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			.dtr_on_open(false)
			.timeout(config.timeout.max(Duration::from_millis(1)))
			.open_native()
			.map(Serial)
			.map_err(Into::into)
	}
}

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn bytes_to_read(&self) -> io::Result<u32> {
		Ok(self.0.bytes_to_read()?)
	}
	fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
		Ok(self.0.clear(buffer)?)
	}
	fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()> {
		Ok(self.0.write_data_terminal_ready(level)?)
	}
	fn write_request_to_send(&mut self, level: bool) -> io::Result<()> {
		Ok(self.0.write_request_to_send(level)?)
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
}

/// Opens [`Serial`] ports.
#[derive(Debug, Default, Copy, Clone)]
pub struct SerialConnector;

impl Connector for SerialConnector {
	type Backend = Serial;

	fn connect(&mut self, port: &str, config: &UartConfig) -> Result<Serial, TransportError> {
		Serial::open(port, config)
	}
}

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "mock")))]
pub use mock::Mock;

#[cfg(any(test, feature = "mock"))]
mod mock {
	use super::{Backend, ClearBuffer, Connector};
	use crate::{config::UartConfig, error::TransportError};
	use std::{
		collections::VecDeque,
		io,
		sync::{Arc, Mutex, PoisonError},
	};

	#[derive(Debug, Default)]
	struct State {
		/// Data that has been received and can be read.
		arrived: Vec<u8>,
		/// Chunks still on their way. One arrives each time the host checks
		/// for data while nothing else is waiting to be read.
		in_flight: VecDeque<Vec<u8>>,
		/// Replies to put in flight after each flush.
		replies: VecDeque<Vec<Vec<u8>>>,
		/// Bytes written since the last flush.
		outbound: Vec<u8>,
		/// Everything flushed so far, one entry per flush.
		written: Vec<String>,
		dtr: Option<bool>,
		rts: Option<bool>,
		ports: Vec<String>,
		opens: usize,
		open_handles: usize,
		connect_error: Option<io::Error>,
		read_error: Option<io::Error>,
		write_error: Option<io::Error>,
		flush_error: Option<io::Error>,
	}

	impl State {
		/// Let the next in-flight chunk arrive if nothing is waiting to be read.
		fn deliver(&mut self) {
			if self.arrived.is_empty() {
				if let Some(chunk) = self.in_flight.pop_front() {
					self.arrived = chunk;
				}
			}
		}
	}

	/// A mock backend for use in testing.
	///
	/// It has the following features:
	///   * Everything flushed to it is recorded.
	///   * It can be filled with data for reading, either immediately or as
	///     scripted replies that are sent after each flush. Replies arrive one
	///     chunk at a time, modelling a slow serial line.
	///   * Specific errors can be inserted for calls to `connect`, `read`,
	///     `write` and `flush`.
	///   * It is its own [`Connector`], counting how many times it was opened
	///     and how many opened handles are still alive.
	///
	/// Clones share the same state, so a test can keep a clone to script and
	/// inspect the mock after handing it to a session.
	#[derive(Debug)]
	pub struct Mock {
		state: Arc<Mutex<State>>,
		/// Whether this instance was produced by `connect` (an open handle).
		handle: bool,
	}

	impl Mock {
		/// Create a new Mock backend.
		pub fn new() -> Self {
			Mock {
				state: Arc::default(),
				handle: false,
			}
		}

		fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
			f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
		}

		/// Append data that has already been received and is ready to be read.
		pub fn append_data<T: AsRef<[u8]>>(&self, bytes: T) {
			self.with(|state| state.arrived.extend_from_slice(bytes.as_ref()));
		}

		/// Append a chunk that will arrive later, after everything already in flight.
		pub fn append_late_data<T: AsRef<[u8]>>(&self, bytes: T) {
			let bytes = bytes.as_ref().to_vec();
			if !bytes.is_empty() {
				self.with(|state| state.in_flight.push_back(bytes));
			}
		}

		/// Queue the reply to the next command that does not yet have one.
		///
		/// The chunks are sent once the command has been flushed. An empty
		/// reply makes the device stay silent.
		pub fn push_reply<I, T>(&self, chunks: I)
		where
			I: IntoIterator<Item = T>,
			T: AsRef<[u8]>,
		{
			let chunks = chunks
				.into_iter()
				.map(|chunk| chunk.as_ref().to_vec())
				.filter(|chunk| !chunk.is_empty())
				.collect();
			self.with(|state| state.replies.push_back(chunks));
		}

		/// Everything flushed to the mock, one entry per flush.
		pub fn written(&self) -> Vec<String> {
			self.with(|state| state.written.clone())
		}

		/// The number of times the mock was opened via [`Connector::connect`].
		pub fn opens(&self) -> usize {
			self.with(|state| state.opens)
		}

		/// The number of opened handles that have not been dropped yet.
		pub fn open_handles(&self) -> usize {
			self.with(|state| state.open_handles)
		}

		/// The port names passed to [`Connector::connect`], in order.
		pub fn ports(&self) -> Vec<String> {
			self.with(|state| state.ports.clone())
		}

		/// The last level written to the DTR line, if any.
		pub fn dtr(&self) -> Option<bool> {
			self.with(|state| state.dtr)
		}

		/// The last level written to the RTS line, if any.
		pub fn rts(&self) -> Option<bool> {
			self.with(|state| state.rts)
		}

		/// Whether all received and in-flight data has been consumed.
		pub fn is_empty(&self) -> bool {
			self.with(|state| state.arrived.is_empty() && state.in_flight.is_empty())
		}

		/// Set the error for the next `connect`, if any.
		pub fn connect_error(&self, err: Option<io::Error>) {
			self.with(|state| state.connect_error = err);
		}

		/// Set the error for the next `read`, if any.
		pub fn read_error(&self, err: Option<io::Error>) {
			self.with(|state| state.read_error = err);
		}

		/// Set the error for the next `write`, if any.
		pub fn write_error(&self, err: Option<io::Error>) {
			self.with(|state| state.write_error = err);
		}

		/// Set the error for the next `flush`, if any.
		pub fn flush_error(&self, err: Option<io::Error>) {
			self.with(|state| state.flush_error = err);
		}
	}

	impl Default for Mock {
		fn default() -> Self {
			Self::new()
		}
	}

	impl Clone for Mock {
		fn clone(&self) -> Self {
			Mock {
				state: Arc::clone(&self.state),
				handle: false,
			}
		}
	}

	impl Drop for Mock {
		fn drop(&mut self) {
			if self.handle {
				self.with(|state| state.open_handles = state.open_handles.saturating_sub(1));
			}
		}
	}

	impl Connector for Mock {
		type Backend = Mock;

		fn connect(&mut self, port: &str, _config: &UartConfig) -> Result<Mock, TransportError> {
			self.with(|state| {
				if let Some(err) = state.connect_error.take() {
					return Err(TransportError::Io(err));
				}
				state.opens += 1;
				state.open_handles += 1;
				state.ports.push(port.to_string());
				Ok(())
			})?;
			Ok(Mock {
				state: Arc::clone(&self.state),
				handle: true,
			})
		}
	}

	impl Backend for Mock {
		fn bytes_to_read(&self) -> io::Result<u32> {
			self.with(|state| {
				state.deliver();
				Ok(u32::try_from(state.arrived.len()).unwrap_or(u32::MAX))
			})
		}

		fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
			self.with(|state| match buffer {
				ClearBuffer::Input => state.arrived.clear(),
				ClearBuffer::Output => state.outbound.clear(),
				ClearBuffer::All => {
					state.arrived.clear();
					state.outbound.clear();
				}
			});
			Ok(())
		}

		fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()> {
			self.with(|state| state.dtr = Some(level));
			Ok(())
		}

		fn write_request_to_send(&mut self, level: bool) -> io::Result<()> {
			self.with(|state| state.rts = Some(level));
			Ok(())
		}

		fn name(&self) -> Option<String> {
			Some(format!("<mock 0x{:x}>", Arc::as_ptr(&self.state) as usize))
		}
	}

	impl io::Read for Mock {
		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			self.with(|state| {
				if let Some(err) = state.read_error.take() {
					return Err(err);
				}
				state.deliver();
				if state.arrived.is_empty() {
					// A real port would wait and then time out. The data is in
					// memory, so time out immediately instead.
					return Err(io::Error::new(
						io::ErrorKind::TimedOut,
						"Simulated timeout error",
					));
				}
				let n = buf.len().min(state.arrived.len());
				buf[..n].copy_from_slice(&state.arrived[..n]);
				state.arrived.drain(..n);
				Ok(n)
			})
		}
	}

	impl io::Write for Mock {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.with(|state| {
				if let Some(err) = state.write_error.take() {
					Err(err)
				} else {
					state.outbound.extend_from_slice(buf);
					Ok(buf.len())
				}
			})
		}

		fn flush(&mut self) -> io::Result<()> {
			self.with(|state| {
				if let Some(err) = state.flush_error.take() {
					return Err(err);
				}
				let data = std::mem::take(&mut state.outbound);
				state.written.push(String::from_utf8_lossy(&data).into_owned());
				if let Some(reply) = state.replies.pop_front() {
					state.in_flight.extend(reply);
				}
				Ok(())
			})
		}
	}
}
