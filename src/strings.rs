//! Small string formatting helpers.

/// Rounds to cents and formats with thousands separators: `1234.567` → `"1,234.57"`.
pub fn format_price_to_currency(price: f64) -> String {
    format_float_with_commas((price * 100.0).round() / 100.0)
}

/// Formats with two decimals and thousands separators: `1234567.8` → `"1,234,567.80"`.
pub fn format_float_with_commas(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    // "-0.00" reads oddly; drop the sign when everything rounded to zero.
    let sign = if whole.chars().all(|c| c == '0') && fraction.chars().all(|c| c == '0') {
        ""
    } else {
        sign
    };

    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}

/// Reverses by Unicode scalar value.
pub fn reverse(value: &str) -> String {
    value.chars().rev().collect()
}

/// Truncates to at most `max_len` characters, ending in `...` when there is
/// room for it (`max_len > 3`).
pub fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_owned();
    }
    if max_len <= 3 {
        return value.chars().take(max_len).collect();
    }
    let mut truncated: String = value.chars().take(max_len - 3).collect();
    truncated.push_str("...");
    truncated
}

/// `true` for empty or whitespace-only strings.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
