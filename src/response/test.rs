use super::*;
use crate::error::{ClassifyError, ConfigError};

fn ok(kind: &str, fields: &str) -> String {
	format!("RESPONSE: {kind} {fields} OK")
}

#[test]
#[allow(clippy::approx_constant)]
fn every_default_rule_yields_its_type() {
	let grammar = Grammar::default();
	let cases = [
		(
			ok("GPIO_OUTPUT", "4"),
			ParsedResponse::GpioOutput {
				pin: 4,
				status: "OK".into(),
			},
		),
		(
			ok("GPIO_INPUT", "5 1"),
			ParsedResponse::GpioInput {
				pin: 5,
				value: 1,
				status: "OK".into(),
			},
		),
		(
			ok("PWM_OUTPUT", "18"),
			ParsedResponse::PwmOutput {
				pin: 18,
				status: "OK".into(),
			},
		),
		(
			ok("DAC_OUTPUT", "25"),
			ParsedResponse::DacOutput {
				pin: 25,
				status: "OK".into(),
			},
		),
		(
			ok("ADC_INPUT", "2 512"),
			ParsedResponse::AdcInput {
				pin: 2,
				value: 512,
				status: "OK".into(),
			},
		),
		(
			ok("GEN_SIGNAL", "1 3.14"),
			ParsedResponse::GenSignal {
				signal_type: 1,
				value: 3.14,
				status: "OK".into(),
			},
		),
		(
			ok("CLOSED_LOOP", "7"),
			ParsedResponse::ClosedLoop {
				id: 7,
				status: "OK".into(),
			},
		),
	];
	for (line, expected) in cases {
		let actual = classify(&line, &grammar).unwrap();
		assert_eq!(actual, expected, "{line}");
		assert!(actual.is_ok());
	}
}

#[test]
fn noise_is_ignored() {
	let raw = "I (312) gpio: config done\r\n> \r\n  RESPONSE: ADC_INPUT 2 512 OK  \r\n";
	let response = classify(raw, &Grammar::default()).unwrap();
	assert_eq!(response.kind(), ResponseKind::AdcInput);
	assert_eq!(response.to_string(), "ADC_INPUT pin=2 value=512 status=OK");
}

#[test]
fn non_ok_status_is_still_classified() {
	let response = classify("RESPONSE: DAC_OUTPUT 26 ERROR\n", &Grammar::default()).unwrap();
	assert_eq!(response.status(), "ERROR");
	assert!(!response.is_ok());
}

#[test]
fn no_valid_lines() {
	let grammar = Grammar::default();
	assert_eq!(classify("", &grammar), Err(ClassifyError::NoValidLines));
	assert_eq!(
		classify("hello\nworld\n", &grammar),
		Err(ClassifyError::NoValidLines)
	);
	// Case-sensitive, and the prefix needs its trailing space.
	assert_eq!(
		classify("response: GPIO_OUTPUT 4 OK\nRESPONSE:GPIO_OUTPUT 4 OK\n", &grammar),
		Err(ClassifyError::NoValidLines)
	);
}

#[test]
fn no_match() {
	assert_eq!(
		classify("RESPONSE: FLUX_CAPACITOR 88 OK\n", &Grammar::default()),
		Err(ClassifyError::NoMatch)
	);
	assert_eq!(
		classify("RESPONSE: GPIO_OUTPUT 4 OK\n", &Grammar::empty()),
		Err(ClassifyError::NoMatch)
	);
}

#[test]
fn first_matching_line_wins() {
	let raw = "RESPONSE: UNKNOWN\nRESPONSE: GPIO_OUTPUT 4 FAIL\nRESPONSE: GPIO_OUTPUT 5 OK\n";
	let response = classify(raw, &Grammar::default()).unwrap();
	assert_eq!(
		response,
		ParsedResponse::GpioOutput {
			pin: 4,
			status: "FAIL".into()
		}
	);
}

#[test]
fn earlier_rule_wins() {
	let overlapping = r"RESPONSE: \w+ (\d+) (\w+)";
	let grammar =
		Grammar::from_patterns([("PWM_OUTPUT", overlapping), ("GPIO_OUTPUT", overlapping)]).unwrap();
	let response = classify("RESPONSE: GPIO_OUTPUT 4 OK", &grammar).unwrap();
	assert_eq!(response.kind(), ResponseKind::PwmOutput);

	let grammar =
		Grammar::from_patterns([("GPIO_OUTPUT", overlapping), ("PWM_OUTPUT", overlapping)]).unwrap();
	let response = classify("RESPONSE: GPIO_OUTPUT 4 OK", &grammar).unwrap();
	assert_eq!(response.kind(), ResponseKind::GpioOutput);
}

#[test]
fn uncoercible_field_is_a_classification_failure() {
	let grammar = Grammar::from_patterns([("GPIO_OUTPUT", r"RESPONSE: GPIO_OUTPUT (\S+) (\w+)")])
		.unwrap();
	assert_eq!(
		classify("RESPONSE: GPIO_OUTPUT four OK", &grammar),
		Err(ClassifyError::InvalidField {
			kind: ResponseKind::GpioOutput,
			field: "pin",
			value: "four".into(),
		})
	);
	// A later line can still succeed.
	let response = classify(
		"RESPONSE: GPIO_OUTPUT four OK\nRESPONSE: GPIO_OUTPUT 4 OK",
		&grammar,
	)
	.unwrap();
	assert_eq!(response.status(), "OK");
}

#[test]
fn patterns_match_at_line_start_only() {
	let grammar = Grammar::from_patterns([("CLOSED_LOOP", r"CLOSED_LOOP (\d+) (\w+)")]).unwrap();
	assert_eq!(
		classify("RESPONSE: CLOSED_LOOP 1 OK", &grammar),
		Err(ClassifyError::NoMatch)
	);
}

#[test]
fn grammar_rejects_bad_patterns() {
	assert!(matches!(
		Grammar::from_patterns([("GPIO_WHATEVER", "x")]),
		Err(ConfigError::UnknownResponseType(name)) if name == "GPIO_WHATEVER"
	));
	assert!(matches!(
		Grammar::from_patterns([("ADC_INPUT", r"RESPONSE: ADC_INPUT (\d+) (\w+)")]),
		Err(ConfigError::CaptureCount {
			kind: ResponseKind::AdcInput,
			expected: 3,
			actual: 2
		})
	));
	assert!(matches!(
		Grammar::from_patterns([("ADC_INPUT", r"RESPONSE: (")]),
		Err(ConfigError::InvalidPattern { .. })
	));
}

#[test]
fn grammar_lookup_by_kind() {
	let grammar = Grammar::default();
	assert_eq!(grammar.len(), ResponseKind::ALL.len());
	let kinds: Vec<_> = grammar.rules().map(Rule::kind).collect();
	assert_eq!(kinds, ResponseKind::ALL);
	let rule = grammar.rule(ResponseKind::GenSignal).unwrap();
	assert!(rule.pattern().contains("GEN_SIGNAL"));
	assert!(Grammar::empty().rule(ResponseKind::GenSignal).is_none());
}

#[test]
fn response_kind_names_round_trip() {
	for kind in ResponseKind::ALL {
		assert_eq!(kind.name().parse::<ResponseKind>().unwrap(), kind);
	}
}

#[test]
fn frame_completion() {
	assert!(is_complete_frame("RESPONSE: GPIO_OUTPUT 4 OK\n", "\n"));
	assert!(!is_complete_frame("RESPONSE: GPIO_OUTPUT 4 OK", "\n"));
	assert!(!is_complete_frame("booting...\n", "\n"));
	// Known edge case: the terminator may come before the marker, so a frame
	// is considered complete while the response line is still arriving.
	assert!(is_complete_frame("booting...\nRESPONSE: GPIO_OUT", "\n"));
}
