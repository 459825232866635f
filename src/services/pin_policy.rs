use chrono::NaiveDate;

/// The eight canonical ascending/descending 6-digit runs a PIN may not be.
const SEQUENTIAL_PINS: [&str; 8] = [
    "012345", "123456", "234567", "345678", "456789", "987654", "876543", "765432",
];

/// A single PIN policy violation with its user-facing message. At most one
/// is ever reported per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinViolation {
    Required,
    Mismatch,
    RepeatedDigits,
    SequentialDigits,
    MatchesBirthDate,
}

impl PinViolation {
    pub fn message(&self) -> &'static str {
        match self {
            PinViolation::Required => "PIN wajib diisi",
            PinViolation::Mismatch => "PIN dan konfirmasi PIN tidak sama",
            PinViolation::RepeatedDigits => "PIN tidak boleh menggunakan angka berulang",
            PinViolation::SequentialDigits => "PIN tidak boleh menggunakan angka berurutan",
            PinViolation::MatchesBirthDate => "PIN tidak boleh sama dengan tanggal lahir",
        }
    }
}

/// Validates a new PIN against the policy rule set.
///
/// Rules run in a fixed order and the FIRST match wins; `111111` reports
/// repeated digits, never sequential, even though later rules might also
/// hold. The previous-PIN rule is enforced upstream and surfaces as a
/// backend response code, not here.
pub fn validate_pin(
    pin: &str,
    confirm_pin: &str,
    birth_date: Option<&str>,
) -> Result<(), PinViolation> {
    // 1. Both present.
    if pin.is_empty() || confirm_pin.is_empty() {
        return Err(PinViolation::Required);
    }

    // 2. Confirmation matches.
    if pin != confirm_pin {
        return Err(PinViolation::Mismatch);
    }

    // 3. Not all-identical digits.
    let mut chars = pin.chars();
    if let Some(first) = chars.next() {
        if chars.all(|c| c == first) {
            return Err(PinViolation::RepeatedDigits);
        }
    }

    // 4. Not a canonical run.
    if SEQUENTIAL_PINS.contains(&pin) {
        return Err(PinViolation::SequentialDigits);
    }

    // 5. Not the member's birth date, in either short rendering.
    if let Some(date) = birth_date.and_then(parse_birth_date) {
        let ddmmyy = date.format("%d%m%y").to_string();
        let yymmdd = date.format("%y%m%d").to_string();
        if pin == ddmmyy || pin == yymmdd {
            return Err(PinViolation::MatchesBirthDate);
        }
    }

    Ok(())
}

/// Parses a birth date in the formats seen on the wire and in backend
/// records.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    for format in ["%Y-%m-%d", "%d-%m-%Y", "%d%m%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), format) {
            return Some(date);
        }
    }
    None
}
