/// Normalize a user-entered phone number into the gateway's international
/// format (`254XXXXXXXXX`).
///
/// Total over all inputs: unrecognized formats are passed through unchanged
/// for downstream validation rather than rejected here.
pub fn normalize_phone(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix('0') {
        return format!("254{}", rest);
    }
    if (digits.starts_with('7') || digits.starts_with('1')) && digits.len() == 9 {
        return format!("254{}", digits);
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_zero_prefix_is_rewritten() {
        assert_eq!(normalize_phone("0712345678"), "254712345678");
        assert_eq!(normalize_phone("0110345678"), "254110345678");
    }

    #[test]
    fn bare_subscriber_number_gets_country_code() {
        assert_eq!(normalize_phone("712345678"), "254712345678");
        assert_eq!(normalize_phone("110345678"), "254110345678");
    }

    #[test]
    fn already_international_is_unchanged() {
        assert_eq!(normalize_phone("254712345678"), "254712345678");
        assert_eq!(normalize_phone("+254712345678"), "254712345678");
    }

    #[test]
    fn separators_are_stripped() {
        assert_eq!(normalize_phone("0712-345-678"), "254712345678");
        assert_eq!(normalize_phone("0712 345 678"), "254712345678");
        assert_eq!(normalize_phone("(254) 712 345678"), "254712345678");
    }

    #[test]
    fn unrecognized_formats_pass_through() {
        assert_eq!(normalize_phone("44771234"), "44771234");
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("no digits"), "");
    }
}
