//! Register codec: turns raw Modbus register responses into typed readings.

use thiserror::Error;

use crate::protocol::Response;

/// Reasons a register response cannot be turned into a reading.
///
/// None of these are fatal: the hub logs them and treats the register as
/// "no update" for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("device answered with exception {0}")]
    ErrorResponse(u8),

    #[error("empty register response")]
    Empty,

    #[error("expected a register response, got {0}")]
    UnexpectedResponse(&'static str),

    #[error("scale divisor must be non-zero")]
    ZeroDivisor,
}

/// Reinterprets a 16-bit wire word as two's-complement.
pub const fn to_signed(raw: u16) -> i16 {
    raw as i16
}

/// Decodes the first register of `response` as a signed 16-bit value
/// divided by `divisor`.
///
/// # Examples
///
/// ```
/// use recomd::{codec::decode_signed_register, protocol::Response};
///
/// let reading = decode_signed_register(&Response::Registers(vec![215]), 10).unwrap();
/// assert_eq!(reading, 21.5);
///
/// let below_zero = decode_signed_register(&Response::Registers(vec![0xFFCE]), 10).unwrap();
/// assert_eq!(below_zero, -5.0);
/// ```
pub fn decode_signed_register(response: &Response, divisor: u16) -> Result<f64, DecodeError> {
    let raw = match response {
        Response::Registers(words) => words.first().copied().ok_or(DecodeError::Empty)?,
        Response::Exception(code) => return Err(DecodeError::ErrorResponse(*code)),
        other => return Err(DecodeError::UnexpectedResponse(other.kind())),
    };

    if divisor == 0 {
        return Err(DecodeError::ZeroDivisor);
    }

    Ok(f64::from(to_signed(raw)) / f64::from(divisor))
}

/// Extracts the first coil of a coil response.
pub fn decode_coil(response: &Response) -> Result<bool, DecodeError> {
    match response {
        Response::Coils(bits) => bits.first().copied().ok_or(DecodeError::Empty),
        Response::Exception(code) => Err(DecodeError::ErrorResponse(*code)),
        other => Err(DecodeError::UnexpectedResponse(other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn registers(words: &[u16]) -> Response {
        Response::Registers(words.to_vec())
    }

    #[test]
    fn positive_values_are_scaled() {
        assert_eq!(decode_signed_register(&registers(&[215]), 10), Ok(21.5));
        assert_eq!(decode_signed_register(&registers(&[1450]), 1), Ok(1450.0));
        assert_eq!(decode_signed_register(&registers(&[3312]), 1000), Ok(3.312));
    }

    #[test]
    fn high_bit_wraps_to_negative() {
        assert_eq!(decode_signed_register(&registers(&[0x8000]), 1), Ok(-32768.0));
        assert_eq!(decode_signed_register(&registers(&[0xFFFF]), 1), Ok(-1.0));
        assert_eq!(decode_signed_register(&registers(&[0xFFCE]), 10), Ok(-5.0));
    }

    #[test]
    fn only_first_register_is_used() {
        assert_eq!(decode_signed_register(&registers(&[7, 9, 11]), 1), Ok(7.0));
    }

    #[test]
    fn zero_divisor_is_rejected() {
        assert_eq!(
            decode_signed_register(&registers(&[100]), 0),
            Err(DecodeError::ZeroDivisor)
        );
    }

    #[test]
    fn empty_and_error_responses_are_unknown() {
        assert_eq!(
            decode_signed_register(&registers(&[]), 10),
            Err(DecodeError::Empty)
        );
        assert_eq!(
            decode_signed_register(&Response::Exception(0x02), 10),
            Err(DecodeError::ErrorResponse(0x02))
        );
        assert_eq!(
            decode_signed_register(&Response::Written, 10),
            Err(DecodeError::UnexpectedResponse("write acknowledgement"))
        );
    }

    #[test]
    fn coil_decoding() {
        assert_eq!(decode_coil(&Response::Coils(vec![true, false])), Ok(true));
        assert_eq!(decode_coil(&Response::Coils(vec![])), Err(DecodeError::Empty));
        assert!(decode_coil(&registers(&[1])).is_err());
    }

    proptest! {
        #[test]
        fn decode_matches_twos_complement(raw in 0u16..=u16::MAX, divisor in 1u16..=u16::MAX) {
            let expected = if raw >= 0x8000 {
                (f64::from(raw) - 65536.0) / f64::from(divisor)
            } else {
                f64::from(raw) / f64::from(divisor)
            };
            prop_assert_eq!(decode_signed_register(&registers(&[raw]), divisor), Ok(expected));
        }

        #[test]
        fn zero_divisor_never_divides(raw in 0u16..=u16::MAX) {
            prop_assert_eq!(
                decode_signed_register(&registers(&[raw]), 0),
                Err(DecodeError::ZeroDivisor)
            );
        }
    }
}
