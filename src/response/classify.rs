use super::{Grammar, ParsedResponse, RESPONSE_PREFIX};
use crate::error::ClassifyError;

/// Classify the raw text captured from one read.
///
/// The text may contain log output from the firmware interleaved with the
/// response. Only trimmed lines starting with [`RESPONSE_PREFIX`] are
/// considered, in the order they were received, and for each line the rules of
/// `grammar` are tried in order. The first match wins and nothing after it is
/// evaluated.
///
/// If a line matches a rule but a field cannot be converted to its type, the
/// remaining lines are still tried. If none of them match, the field error is
/// reported instead of [`ClassifyError::NoMatch`].
///
/// ## Example
///
/// ```
/// # use serial_commander::{classify, Grammar, ParsedResponse};
/// let grammar = Grammar::default();
/// let response = classify("boot: ready\nRESPONSE: GPIO_OUTPUT 4 OK\n", &grammar).unwrap();
/// assert_eq!(
///     response,
///     ParsedResponse::GpioOutput { pin: 4, status: "OK".to_string() },
/// );
/// ```
pub fn classify(raw: &str, grammar: &Grammar) -> Result<ParsedResponse, ClassifyError> {
	let candidates: Vec<&str> = raw
		.split('\n')
		.map(str::trim)
		.filter(|line| {
			let keep = line.starts_with(RESPONSE_PREFIX);
			if !keep {
				log::debug!("ignoring line: {line}");
			}
			keep
		})
		.collect();

	if candidates.is_empty() {
		log::warn!("no valid response lines found in the input");
		return Err(ClassifyError::NoValidLines);
	}

	let mut field_error = None;
	for line in candidates {
		log::debug!("parsing response: {line}");
		match grammar.match_line(line) {
			Some(Ok(response)) => return Ok(response),
			Some(Err(e)) => {
				log::warn!("cannot parse '{line}': {e}");
				field_error.get_or_insert(e);
			}
			None => {}
		}
	}

	let err = field_error.unwrap_or(ClassifyError::NoMatch);
	log::error!("no valid response matched: {err}");
	Err(err)
}
