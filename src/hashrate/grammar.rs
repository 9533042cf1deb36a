/// A number lifted out of an upstream string, plus whatever trailed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub suffix: String,
}

/// Parse `[sign] digits ['.' digits] [exponent] [suffix]` from an upstream field.
///
/// Thousands separators are dropped before scanning. When the string does not
/// start with a number, the first embedded number is used instead, so values
/// like `"~ 1.5 TH/s"` still yield something. Returns `None` only when no
/// digit can be found at all.
pub fn parse_quantity(input: &str) -> Option<Quantity> {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();

    let (start, len) = match scan_number(&cleaned) {
        Some(len) => (0, len),
        None => cleaned
            .char_indices()
            .find_map(|(idx, _)| scan_number(&cleaned[idx..]).map(|len| (idx, len)))?,
    };

    let end = start + len;
    let value: f64 = cleaned[start..end].parse().ok()?;
    Some(Quantity {
        value,
        suffix: cleaned[end..].trim().to_string(),
    })
}

/// Plain numeric coercion used for difficulty and supply. Units are ignored.
pub fn parse_number(input: &str) -> Option<f64> {
    parse_quantity(input).map(|q| q.value)
}

/// The whole trimmed input as one number, nothing before or after it.
///
/// Primitive explorer endpoints answer with a bare number; anything else
/// (an error page, `"Error 404: method not found"`) is not a reading.
pub fn parse_exact(input: &str) -> Option<f64> {
    let s = input.trim();
    match scan_number(s) {
        Some(len) if len == s.len() => s.parse().ok(),
        _ => None,
    }
}

/// Length of the numeric prefix of `s`, if it has one.
fn scan_number(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < b.len() && b[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }

    // exponent only counts when digits follow it ("5EH/s" is a unit, not 5e..)
    if i < b.len() && matches!(b[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < b.len() && matches!(b[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    Some(i)
}
