//! Phone number normalization.
//!
//! Member phone numbers arrive in whatever format the sender's provider or
//! the data-entry volunteer used: `+15551234567`, `(555) 123-4567`,
//! `555.123.4567`, and so on. Every lookup in this service goes through the
//! canonical forms produced here.

/// Canonical representations of one raw phone string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneForms {
    /// `XXX-XXX-XXXX` when exactly 10 local digits remain, otherwise the
    /// unchanged digit string.
    pub formatted: String,
    /// All digits, country code preserved.
    pub digits: String,
    /// Digits with a single leading `1` country code stripped, if present.
    pub local_digits: String,
}

/// Strip everything except ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Best-effort normalization. Never fails: malformed input degenerates to
/// the digits-only string in all three forms.
pub fn normalize(raw: &str) -> PhoneForms {
    let digits = digits_only(raw);

    let local_digits = if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits.clone()
    };

    let formatted = if local_digits.len() == 10 {
        format!(
            "{}-{}-{}",
            &local_digits[..3],
            &local_digits[3..6],
            &local_digits[6..]
        )
    } else {
        digits.clone()
    };

    PhoneForms {
        formatted,
        digits,
        local_digits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digits_formatted() {
        let forms = normalize("5551234567");
        assert_eq!(forms.formatted, "555-123-4567");
        assert_eq!(forms.digits, "5551234567");
        assert_eq!(forms.local_digits, "5551234567");
    }

    #[test]
    fn test_eleven_digits_with_country_code() {
        let forms = normalize("+15551234567");
        assert_eq!(forms.formatted, "555-123-4567");
        assert_eq!(forms.digits, "15551234567");
        assert_eq!(forms.local_digits, "5551234567");
    }

    #[test]
    fn test_punctuation_stripped() {
        let forms = normalize("(555) 123-4567");
        assert_eq!(forms.formatted, "555-123-4567");
        assert_eq!(forms.digits, "5551234567");
    }

    #[test]
    fn test_short_number_passes_through() {
        let forms = normalize("911");
        assert_eq!(forms.formatted, "911");
        assert_eq!(forms.digits, "911");
        assert_eq!(forms.local_digits, "911");
    }

    #[test]
    fn test_eleven_digits_without_leading_one_keeps_country_code() {
        // 11 digits not starting with 1: no country code stripped, no format
        let forms = normalize("25551234567");
        assert_eq!(forms.formatted, "25551234567");
        assert_eq!(forms.local_digits, "25551234567");
    }

    #[test]
    fn test_garbage_degenerates_to_digits() {
        let forms = normalize("call me!");
        assert_eq!(forms.formatted, "");
        assert_eq!(forms.digits, "");
        assert_eq!(forms.local_digits, "");
    }
}
