use anyhow::Context as _;
use argh::FromArgs;
use serial_commander::{Commander, Config, RetryPolicy};
use std::{path::PathBuf, process::ExitCode};

/// Send a text command to an ESP32 over a serial port and wait for its response.
#[derive(Debug, FromArgs)]
struct App {
	/// the command to send (e.g. "GPIO_OUTPUT 4 1")
	#[argh(positional)]
	message: Option<String>,
	/// serial port (default: DEFAULT_PORT from the configuration)
	#[argh(option, short = 'p')]
	port: Option<String>,
	/// baud rate (default: BAUD_RATE from the configuration)
	#[argh(option, short = 'b')]
	baudrate: Option<u32>,
	/// the configuration file
	#[argh(
		option,
		short = 'c',
		default = "PathBuf::from(\"esp32_config.json\")"
	)]
	config: PathBuf,
	/// how many times to retry a failed command (default: 0)
	#[argh(option, default = "0")]
	retries: u32,
	/// list the available serial ports and exit
	#[argh(switch)]
	list_ports: bool,
	/// enable verbose logging
	#[argh(switch, short = 'v')]
	verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
	let app: App = argh::from_env();

	env_logger::Builder::new()
		.filter_level(if app.verbose {
			log::LevelFilter::Debug
		} else {
			log::LevelFilter::Info
		})
		.parse_default_env()
		.format_timestamp_millis()
		.init();

	if app.list_ports {
		for port in serial_commander::list_ports()? {
			println!("{port}");
		}
		return Ok(ExitCode::SUCCESS);
	}

	let Some(message) = app.message.as_deref() else {
		anyhow::bail!("no command given (pass a command to send, or --list-ports)");
	};

	let mut config = Config::from_file(&app.config)
		.with_context(|| format!("cannot load {}", app.config.display()))?;
	if let Some(port) = app.port {
		config.uart.default_port = port;
	}
	if let Some(baud_rate) = app.baudrate {
		config.uart.baud_rate = baud_rate;
	}
	let port = config.uart.default_port.clone();

	let mut commander = Commander::new(config).with_retry_policy(RetryPolicy {
		max_retries: app.retries,
		..RetryPolicy::default()
	});

	let last_response = |commander: &Commander| {
		commander
			.last_response()
			.unwrap_or_default()
			.trim_end()
			.to_string()
	};
	if commander.send_command(message) {
		log::info!("SUCCESS: command sent to {port}: [{message}]");
		log::info!("RESPONSE: [{}]", last_response(&commander));
		Ok(ExitCode::SUCCESS)
	} else {
		log::error!("ERROR: command failed to send to {port}: '{message}'");
		log::error!("RESPONSE: [{}]", last_response(&commander));
		Ok(ExitCode::FAILURE)
	}
}
