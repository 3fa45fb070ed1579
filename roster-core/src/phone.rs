//! Phone normalization.
//!
//! Every phone value that takes part in matching, whether it comes from the
//! database or from the sheet, goes through [`normalize`] so both sides
//! compare in one key space. Distinct raw strings may collapse to the same
//! key; that is what lets `+38 (050) 123-45-67` find the row typed as
//! `0501234567`.

/// Country calling code every canonical key starts with.
pub const COUNTRY_CODE: &str = "380";

/// Local trunk prefix digit that stands in for the country code.
pub const TRUNK_PREFIX: char = '0';

/// Digit count of a national number without trunk prefix or country code.
pub const NATIONAL_LENGTH: usize = 10;

/// Canonicalize a raw phone string.
///
/// 1. Strip everything that is not an ASCII digit.
/// 2. Already starts with [`COUNTRY_CODE`] → unchanged.
/// 3. Starts with [`TRUNK_PREFIX`] → the trunk digit is replaced by the country code.
/// 4. Exactly [`NATIONAL_LENGTH`] digits → country code prepended.
/// 5. Anything else passes through as bare digits.
///
/// Total and pure: empty or digit-free input yields an empty string.
pub fn normalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.starts_with(COUNTRY_CODE) {
        return digits;
    }
    if let Some(national) = digits.strip_prefix(TRUNK_PREFIX) {
        return format!("{COUNTRY_CODE}{national}");
    }
    if digits.len() == NATIONAL_LENGTH {
        return format!("{COUNTRY_CODE}{digits}");
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trunk_prefix_is_replaced() {
        assert_eq!(normalize("0501234567"), "380501234567");
    }

    #[test]
    fn formatting_noise_is_stripped() {
        assert_eq!(normalize("+38 (050) 123-45-67"), "380501234567");
    }

    #[test]
    fn empty_and_garbage_yield_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("n/a"), "");
    }

    #[test]
    fn short_foreign_numbers_pass_through() {
        assert_eq!(normalize("+1 555 0100"), "15550100");
    }
}
