use super::*;
use crate::{
	backend::Mock,
	clock::MockClock,
	config::UartConfig,
	error::ClassifyError,
	response::ResponseKind,
};
use std::io;

const RETRY_DELAY: Duration = Duration::from_millis(777);

fn commander(mock: &Mock, clock: &MockClock, max_retries: u32) -> Commander<Mock, MockClock> {
	let mut uart = UartConfig::new("/dev/ttyMOCK");
	uart.timeout = Duration::from_secs(1);
	uart.boot_delay = Duration::ZERO;
	Commander::with_parts(Config::new(uart, Grammar::default()), mock.clone(), clock.clone())
		.with_retry_policy(RetryPolicy::new(max_retries, RETRY_DELAY))
}

fn broken_pipe() -> io::Error {
	io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")
}

#[test]
fn default_retry_policy() {
	assert_eq!(
		RetryPolicy::default(),
		RetryPolicy::new(3, Duration::from_millis(500))
	);
	let commander = Commander::with_parts(
		Config::new(UartConfig::new("COM3"), Grammar::default()),
		Mock::new(),
		MockClock::new(),
	);
	assert_eq!(commander.retry_policy(), RetryPolicy::default());
}

#[test]
fn max_attempts_saturates() {
	assert_eq!(RetryPolicy::NONE.max_attempts(), 1);
	assert_eq!(RetryPolicy::default().max_attempts(), 4);
	assert_eq!(
		RetryPolicy::new(u32::MAX, RETRY_DELAY).max_attempts(),
		u32::MAX
	);
}

#[test]
fn ok_on_first_attempt() {
	let _ = simple_logger::init_with_level(log::Level::Debug);
	let mock = Mock::new();
	let clock = MockClock::new();
	let mut commander = commander(&mock, &clock, 0);
	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 OK\n"]);

	assert!(commander.send_command("GPIO_OUTPUT 4 1"));
	assert_eq!(mock.written(), ["GPIO_OUTPUT 4 1\n"]);
	assert_eq!(clock.count_sleeps(RETRY_DELAY), 0);
	assert_eq!(
		commander.last_response(),
		Some("RESPONSE: GPIO_OUTPUT 4 OK\n")
	);
}

#[test]
fn opens_lazily() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	assert_eq!(mock.opens(), 0);
	assert!(!commander.session().is_open());

	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 OK\n"]);
	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 OK\n"]);
	assert!(commander.send_command("GPIO_OUTPUT 4 1"));
	assert!(commander.send_command("GPIO_OUTPUT 4 0"));
	assert_eq!(mock.opens(), 1);
	assert_eq!(mock.ports(), ["/dev/ttyMOCK"]);
}

#[test]
fn explicit_port() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	commander.open(Some("/dev/ttyUSB7")).unwrap();
	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 OK\n"]);
	assert!(commander.send_command("GPIO_OUTPUT 4 1"));
	assert_eq!(mock.ports(), ["/dev/ttyUSB7"]);
}

#[test]
fn typed_response() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	mock.push_reply(["I (5) adc: sampling\n", "RESPONSE: ADC_INPUT 2 512 OK\n"]);

	let response = commander.try_send_command("ADC_INPUT 2").unwrap();
	assert_eq!(
		response,
		ParsedResponse::AdcInput {
			pin: 2,
			value: 512,
			status: "OK".to_string(),
		}
	);
	assert_eq!(response.kind(), ResponseKind::AdcInput);
}

#[test]
fn empty_response_exhausts_retries() {
	let mock = Mock::new();
	let clock = MockClock::new();
	let mut commander = commander(&mock, &clock, 2);

	let err = commander.try_send_command("GPIO_INPUT 3").unwrap_err();
	assert!(
		matches!(
			err,
			TransactionError::ExhaustedRetries { attempts: 3, ref last }
				if matches!(**last, TransactionError::EmptyResponse)
		),
		"{err:?}"
	);
	assert_eq!(mock.written(), ["GPIO_INPUT 3\n"; 3]);
	assert_eq!(clock.count_sleeps(RETRY_DELAY), 2);
	assert_eq!(mock.opens(), 1);
	assert_eq!(commander.last_response(), None);
}

#[test]
fn retry_delay_separates_attempts() {
	let mock = Mock::new();
	let clock = MockClock::new();
	let mut commander = commander(&mock, &clock, 1);
	assert!(!commander.send_command("GPIO_INPUT 3"));

	// The retry pause comes after the first read times out and before the
	// second write.
	let sleeps = clock.sleeps();
	let retry = sleeps.iter().position(|&d| d == RETRY_DELAY).unwrap();
	assert_eq!(sleeps[retry - 1], crate::session::POLL_INTERVAL);
	assert_eq!(sleeps[retry + 1], crate::session::WRITE_SETTLE);
}

#[test]
fn no_retry_when_disabled() {
	let mock = Mock::new();
	let clock = MockClock::new();
	let mut commander = commander(&mock, &clock, 0);

	let err = commander.try_send_command("GPIO_INPUT 3").unwrap_err();
	assert!(
		matches!(err, TransactionError::ExhaustedRetries { attempts: 1, .. }),
		"{err:?}"
	);
	assert_eq!(mock.written().len(), 1);
	assert_eq!(clock.count_sleeps(RETRY_DELAY), 0);
}

#[test]
fn invalid_encoding_then_valid_frame() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	mock.push_reply([&b"\xff\xfe\xfd garbage"[..], b"RESPONSE: GPIO_OUTPUT 4 OK\n"]);
	assert!(commander.send_command("GPIO_OUTPUT 4 1"));
}

#[test]
fn invalid_encoding_in_the_same_chunk_as_the_frame() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	mock.push_reply([b"\xff\xfeRESPONSE: GPIO_OUTPUT 4 OK\n"]);

	let response = commander.try_send_command("GPIO_OUTPUT 4 1").unwrap();
	assert_eq!(
		response,
		ParsedResponse::GpioOutput {
			pin: 4,
			status: "OK".to_string(),
		}
	);
}

#[test]
fn non_ok_status_is_retried() {
	let mock = Mock::new();
	let clock = MockClock::new();
	let mut commander = commander(&mock, &clock, 1);
	mock.push_reply(["RESPONSE: PWM_OUTPUT 5 BUSY\n"]);
	mock.push_reply(["RESPONSE: PWM_OUTPUT 5 OK\n"]);

	assert!(commander.send_command("PWM_OUTPUT 5 128"));
	assert_eq!(mock.written().len(), 2);
	assert_eq!(clock.count_sleeps(RETRY_DELAY), 1);
}

#[test]
fn non_ok_status_fails() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	mock.push_reply(["RESPONSE: DAC_OUTPUT 25 ERROR\n"]);

	let response = match commander.try_send_command("DAC_OUTPUT 25 200") {
		Err(TransactionError::ExhaustedRetries { last, .. }) => match *last {
			TransactionError::NonOkStatus(response) => response,
			other => panic!("unexpected error: {other:?}"),
		},
		other => panic!("unexpected result: {other:?}"),
	};
	assert_eq!(response.kind(), ResponseKind::DacOutput);
	assert_eq!(response.status(), "ERROR");
	assert_eq!(
		commander.last_response(),
		Some("RESPONSE: DAC_OUTPUT 25 ERROR\n")
	);
}

#[test]
fn unclassified_responses_fail() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 1);
	mock.push_reply(["RESPONSE: SERVO 1 OK\n"]);
	// Never forms a frame, so it is returned when the read times out.
	mock.push_reply(["ready\n"]);

	let err = commander.try_send_command("SERVO 1").unwrap_err();
	assert!(
		matches!(
			err,
			TransactionError::ExhaustedRetries { attempts: 2, ref last }
				if matches!(**last, TransactionError::Classify(ClassifyError::NoValidLines))
		),
		"{err:?}"
	);
	assert_eq!(commander.last_response(), Some("ready\n"));
}

#[test]
fn transport_fault_reopens_without_retry() {
	let mock = Mock::new();
	let clock = MockClock::new();
	let mut commander = commander(&mock, &clock, 3);
	commander.open(None).unwrap();
	mock.write_error(Some(broken_pipe()));

	let err = commander.try_send_command("GPIO_OUTPUT 4 1").unwrap_err();
	assert!(
		matches!(
			err,
			TransactionError::Transport(TransportError::Io(ref e)) if e.kind() == io::ErrorKind::BrokenPipe
		),
		"{err:?}"
	);
	assert!(err.is_transport());
	assert!(mock.written().is_empty());
	assert_eq!(clock.count_sleeps(RETRY_DELAY), 0);
	assert_eq!(mock.opens(), 2);
	assert_eq!(mock.open_handles(), 1);
	assert!(commander.session().is_open());
}

#[test]
fn failed_reopen_is_recovered_later() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	commander.open(None).unwrap();
	mock.flush_error(Some(broken_pipe()));
	mock.connect_error(Some(io::Error::new(io::ErrorKind::NotFound, "gone")));

	assert!(!commander.send_command("GPIO_OUTPUT 4 1"));
	assert!(!commander.session().is_open());
	assert_eq!(mock.open_handles(), 0);

	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 OK\n"]);
	assert!(commander.send_command("GPIO_OUTPUT 4 1"));
	assert_eq!(mock.opens(), 2);
}

#[test]
fn last_response_is_replaced() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 OK\n"]);
	mock.push_reply(["RESPONSE: GPIO_INPUT 5 1 OK\n"]);

	assert!(commander.send_command("GPIO_OUTPUT 4 1"));
	assert!(commander.send_command("GPIO_INPUT 5"));
	assert_eq!(
		commander.last_response(),
		Some("RESPONSE: GPIO_INPUT 5 1 OK\n")
	);

	// An empty response leaves it alone.
	assert!(!commander.send_command("GPIO_INPUT 5"));
	assert_eq!(
		commander.last_response(),
		Some("RESPONSE: GPIO_INPUT 5 1 OK\n")
	);
}

#[test]
fn stale_input_is_discarded() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	commander.open(None).unwrap();
	mock.append_data("RESPONSE: GPIO_OUTPUT 4 OK\n");
	mock.push_reply(["RESPONSE: GPIO_OUTPUT 4 ERROR\n"]);

	assert!(!commander.send_command("GPIO_OUTPUT 4 1"));
	assert_eq!(
		commander.last_response(),
		Some("RESPONSE: GPIO_OUTPUT 4 ERROR\n")
	);
}

#[test]
fn closure_observer_sees_every_line() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	mock.push_reply(["I (7) gpio: set\nRESPONSE: GPIO_OUTPUT 4 OK\n"]);

	let mut lines = Vec::new();
	assert!(commander.send_command_observed("GPIO_OUTPUT 4 1", &mut |line: &str| {
		lines.push(line.to_string());
	}));
	assert_eq!(lines, ["I (7) gpio: set", "RESPONSE: GPIO_OUTPUT 4 OK", ""]);
}

#[test]
fn observer_sees_every_attempt() {
	#[derive(Default)]
	struct Transcript(Vec<String>);

	impl ResponseObserver for Transcript {
		fn log_response(&mut self, line: &str) {
			if !line.is_empty() {
				self.0.push(line.to_string());
			}
		}
	}

	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 2);
	mock.push_reply(["RESPONSE: CLOSED_LOOP 1 PENDING\n"]);
	mock.push_reply([""]);
	mock.push_reply(["RESPONSE: CLOSED_LOOP 1 OK\n"]);

	let mut transcript = Transcript::default();
	let response = commander
		.try_send_command_observed("CLOSED_LOOP 1", &mut transcript)
		.unwrap();
	assert_eq!(response.kind(), ResponseKind::ClosedLoop);
	assert_eq!(
		transcript.0,
		["RESPONSE: CLOSED_LOOP 1 PENDING", "RESPONSE: CLOSED_LOOP 1 OK"]
	);
}

#[test]
fn drop_closes_the_port() {
	let mock = Mock::new();
	let mut commander = commander(&mock, &MockClock::new(), 0);
	commander.open(None).unwrap();
	assert_eq!(mock.open_handles(), 1);
	drop(commander);
	assert_eq!(mock.open_handles(), 0);
}
