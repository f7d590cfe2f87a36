use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number has {digits} digits, expected 10 to 15")]
    InvalidLength { digits: usize },
}

/// Normalizes a phone number the way the voice gateway expects it: every
/// non-digit character is stripped, a single leading `+` survives, and the
/// digit count must land in 10..=15.
pub fn normalize_phone(raw: &str) -> Result<String, PhoneError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Empty);
    }

    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if !(10..=15).contains(&digits.len()) {
        return Err(PhoneError::InvalidLength { digits: digits.len() });
    }

    Ok(if has_plus { format!("+{digits}") } else { digits })
}
