/// Parses a number with an optional `k`/`m`/`g` factor suffix and an optional
/// trailing `b`, e.g. `64k`, `1.5M`, `2gb`.
pub fn read_float_and_factor_from_str(value: &str) -> Option<(f64, usize)> {
    let mut value = value.trim();

    if value.is_empty() {
        return None;
    }

    if value.len() > 1 && (value.ends_with('b') || value.ends_with('B')) {
        value = &value[..value.len() - 1];
    }

    let (number, factor) = match value.as_bytes()[value.len() - 1] {
        b'g' | b'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        b'm' | b'M' => (&value[..value.len() - 1], 1024 * 1024),
        b'k' | b'K' => (&value[..value.len() - 1], 1024),
        _ => (value, 1),
    };

    number.parse::<f64>().ok().map(|x| (x, factor))
}

pub fn read_uint_from_str(value: &str) -> Option<usize> {
    let (value, factor) = read_float_and_factor_from_str(value)?;

    if value < 0.0 {
        return None;
    }

    Some((value * factor as f64) as usize)
}

pub fn read_bool_from_str(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
