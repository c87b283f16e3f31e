//! A library for driving ESP32 peripheral firmware over a serial port.
//!
//! The firmware speaks a simple line-based protocol: the host sends a command
//! such as `GPIO_OUTPUT 4 1` and the device eventually answers with a line
//! like `RESPONSE: GPIO_OUTPUT 4 OK`, possibly mixed in with its own log
//! output. A [`Commander`] sends commands, waits for the response, retries on
//! failure and classifies the answer into a [`ParsedResponse`] using a
//! configurable [`Grammar`].
//!
//! ```rust,no_run
//! use serial_commander::{Commander, Config, ParsedResponse};
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let mut commander = Commander::new(Config::from_file("esp32_config.json")?);
//! commander.open(Some("/dev/ttyUSB0"))?;
//!
//! if let ParsedResponse::AdcInput { pin, value, .. } = commander.try_send_command("ADC_INPUT 2")? {
//!     println!("pin {pin} reads {value}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The lower layers are public too: a [`Session`] handles the physical
//! connection and response framing, and [`classify`] turns raw response text
//! into a [`ParsedResponse`] without any I/O.
//!
//! ## Testing
//!
//! Enabling the `mock` feature exposes [`backend::Mock`] and
//! [`clock::MockClock`], which can stand in for a serial port and the system
//! clock in tests of code built on this crate.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(all(doc, feature = "doc_cfg"), feature(doc_cfg))]

pub mod backend;
pub mod clock;
mod commander;
pub mod config;
pub mod error;
mod ports;
pub mod response;
pub mod session;

pub use commander::{Commander, ResponseObserver, RetryPolicy};
pub use config::{Config, UartConfig};
pub use ports::list_ports;
pub use response::{classify, Grammar, ParsedResponse, ResponseKind, Rule};
pub use session::Session;
