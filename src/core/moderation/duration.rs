// Timeout duration strings: `<integer><unit>` with unit in {s, m, h, d}.

use super::moderation_service::ModerationError;
use std::time::Duration;

/// Platform ceiling for a member timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(28 * 86_400);

/// Parse a duration like `10s`, `5m`, `1h` or `2d`.
///
/// Anything else, including zero, is a validation error. Never defaults.
pub fn parse_duration(input: &str) -> Result<Duration, ModerationError> {
    let input = input.trim();
    let invalid = || ModerationError::Validation(format!("Invalid duration `{}`. Use e.g. 10s, 5m, 1h, 1d.", input));

    let unit = input.chars().last().ok_or_else(invalid)?;
    let number = &input[..input.len() - unit.len_utf8()];

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let multiplier: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };

    let value: u64 = number.parse().map_err(|_| invalid())?;
    let seconds = value.checked_mul(multiplier).ok_or_else(invalid)?;

    if seconds == 0 {
        return Err(ModerationError::Validation(
            "Duration must be greater than zero.".to_string(),
        ));
    }

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_garbage() {
        for input in ["abc", "", "m", "10", "10x", "-5m", "1.5h", "10 m", "９m"] {
            assert!(
                matches!(parse_duration(input), Err(ModerationError::Validation(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_positive() {
        assert!(matches!(parse_duration("0s"), Err(ModerationError::Validation(_))));
        assert!(matches!(parse_duration("000d"), Err(ModerationError::Validation(_))));
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_duration("99999999999999999999d").is_err());
        assert!(parse_duration("999999999999999999d").is_err());
    }
}
