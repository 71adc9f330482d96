//! Money helpers
//!
//! Amounts are stored and computed as integer paisa (1 NPR = 100 paisa).
//! Gateways that speak decimal rupees get strings from [`format_rupees`] and
//! their responses go back through [`parse_rupees`].

/// Render paisa as a rupee string without trailing zeros: `150050` → `"1500.5"`
pub fn format_rupees(paisa: i64) -> String {
    let sign = if paisa < 0 { "-" } else { "" };
    let abs = paisa.unsigned_abs();
    let whole = abs / 100;
    let frac = abs % 100;

    if frac == 0 {
        format!("{}{}", sign, whole)
    } else if frac % 10 == 0 {
        format!("{}{}.{}", sign, whole, frac / 10)
    } else {
        format!("{}{}.{:02}", sign, whole, frac)
    }
}

/// Parse a rupee amount into paisa. Thousands separators are accepted
/// (`"1,000.0"`); more than two significant decimals is rejected.
pub fn parse_rupees(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }

    let (whole, frac) = match cleaned.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (cleaned.as_str(), ""),
    };

    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    // Extra decimals must be zeros ("100.000" is fine, "100.005" is not)
    let (cents, rest) = frac.split_at(frac.len().min(2));
    if rest.chars().any(|c| c != '0') {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = match cents.len() {
        0 => 0,
        1 => cents.parse::<i64>().ok()? * 10,
        _ => cents.parse().ok()?,
    };

    whole.checked_mul(100)?.checked_add(cents)
}
