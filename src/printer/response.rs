use std::fmt::Display;

/// The marker token the printer puts in front of the zero-padded quantity.
pub const QUANTITY_MARKER: &str = "MQTY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    MissingMarker,
    MissingDigits,
    OutOfRange(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;

        match self {
            MissingMarker => write!(
                f,
                "The response does not contain the marker {:?}.",
                QUANTITY_MARKER
            ),
            MissingDigits => write!(
                f,
                "The marker {:?} is not followed by a decimal quantity.",
                QUANTITY_MARKER
            ),
            OutOfRange(digits) => write!(f, "The quantity {} is out of range.", digits),
        }
    }
}

impl std::error::Error for Error {}

/// ASCII whitespace plus vertical tab and the separator controls.
fn is_response_whitespace(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '\x0b' | '\x1c'..='\x1f')
}

/// Reduce a raw response chunk to its printable ASCII part.
/// NUL bytes and everything with the high bit set are dropped.
pub fn filter_printable(data: &[u8]) -> String {
    let text: String = data
        .iter()
        .filter(|&&b| b != 0x00 && b < 0x80)
        .map(|&b| char::from(b))
        .collect();

    text.trim_matches(is_response_whitespace).to_owned()
}

/// Extract the remaining media quantity from a combined response.
/// Expected shape: anything, `MQTY`, one or more ASCII digits (zero-padded), anything.
pub fn parse_quantity(response: &str) -> Result<u32, Error> {
    let idx = response.find(QUANTITY_MARKER).ok_or(Error::MissingMarker)?;
    let tail = &response[idx + QUANTITY_MARKER.len()..];

    let digits_len = tail
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(tail.len());

    if digits_len == 0 {
        return Err(Error::MissingDigits);
    }

    let digits = tail[..digits_len].trim_start_matches('0');

    if digits.is_empty() {
        return Ok(0);
    }

    digits
        .parse()
        .map_err(|_| Error::OutOfRange(digits.to_owned()))
}
