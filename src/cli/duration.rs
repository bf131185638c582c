//! `--timeout` values: `90`, `45s`, `30m`, `2h`, `1h30m`.

use std::time::Duration;

/// Parse a duration made of `<n>h`, `<n>m`, `<n>s` parts in that order.
/// A bare number is seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return positive(secs, input);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut last_rank = 0;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let (rank, unit) = match c {
            'h' => (1, 3600),
            'm' => (2, 60),
            's' => (3, 1),
            other => return Err(format!("invalid unit `{other}` in `{input}` (use h, m or s)")),
        };
        if digits.is_empty() {
            return Err(format!("unit `{c}` without a number in `{input}`"));
        }
        if rank <= last_rank {
            return Err(format!("units out of order in `{input}` (write e.g. 1h30m)"));
        }
        last_rank = rank;
        let n: u64 = digits
            .parse()
            .map_err(|e| format!("invalid number in `{input}`: {e}"))?;
        digits.clear();
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration `{input}` is too large"))?;
    }
    if !digits.is_empty() {
        return Err(format!("trailing number without unit in `{input}`"));
    }
    positive(total, input)
}

fn positive(secs: u64, input: &str) -> Result<Duration, String> {
    if secs == 0 {
        return Err(format!("duration `{input}` must be positive"));
    }
    Ok(Duration::from_secs(secs))
}
