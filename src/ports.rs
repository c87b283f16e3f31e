//! Discovering serial ports.

use crate::error::TransportError;

/// List the names of the serial ports available on this system.
///
/// USB CDC ports (`ttyACM*`) come first, then USB-serial adapters
/// (`ttyUSB*`), each in numeric order, followed by everything else by name.
pub fn list_ports() -> Result<Vec<String>, TransportError> {
	let mut ports: Vec<String> = serialport::available_ports()?
		.into_iter()
		.map(|info| info.port_name)
		.collect();
	ports.sort_by_cached_key(|name| sort_key(name));
	ports.dedup();
	log::info!("available serial ports: {ports:?}");
	Ok(ports)
}

fn sort_key(name: &str) -> (u8, usize, String) {
	let basename = name.rsplit('/').next().unwrap_or(name);
	for (rank, prefix) in [(0, "ttyACM"), (1, "ttyUSB")] {
		if let Some(rest) = basename.strip_prefix(prefix) {
			return (rank, rest.parse().unwrap_or(usize::MAX), basename.to_string());
		}
	}
	(2, 0, basename.to_string())
}
