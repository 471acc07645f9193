use regex::Regex;
use splines::{Interpolation, Key, Spline};
use std::sync::OnceLock;

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Optional sign on either side of `$`, thousands separators, optional decimals.
    PATTERN.get_or_init(|| {
        Regex::new(r"-?\s*\$?\s*-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\s*\$?\s*-?\d+(?:\.\d+)?")
            .expect("amount pattern is valid")
    })
}

fn parse_amount_token(token: &str) -> Option<f64> {
    let negative = token.contains('-');
    let digits: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// First currency-like number in `text`, e.g. `"$1,250.50 per acre"` -> 1250.5.
pub fn parse_amount(text: &str) -> Option<f64> {
    amount_pattern()
        .find(text)
        .and_then(|m| parse_amount_token(m.as_str()))
}

/// Every currency-like number in `text`, in order of appearance.
pub fn extract_amounts(text: &str) -> Vec<f64> {
    amount_pattern()
        .find_iter(text)
        .filter_map(|m| parse_amount_token(m.as_str()))
        .collect()
}

/// `steps` evenly spaced values from `start` to `end`, both inclusive.
pub fn linear_series(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => return Vec::new(),
        1 => return vec![end],
        _ => {}
    }

    let last = (steps - 1) as f64;
    let spline = Spline::from_vec(vec![
        Key::new(0.0, start, Interpolation::Linear),
        Key::new(last, end, Interpolation::Linear),
    ]);

    let (low, high) = if start <= end { (start, end) } else { (end, start) };
    let mut series: Vec<f64> = (0..steps)
        .map(|i| {
            spline
                .clamped_sample(i as f64)
                .unwrap_or(end)
                .clamp(low, high)
        })
        .collect();
    // Pin the endpoints so floating error never pushes them off target.
    series[0] = start;
    series[steps - 1] = end;
    if start <= end {
        // Rounding inside the lerp must not introduce a dip.
        for i in 1..steps {
            series[i] = series[i].max(series[i - 1]);
        }
    }
    series
}

/// Cuts model output down to the outermost JSON object or array.
pub fn clean_json_output(raw: &str) -> String {
    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    if let Some(start) = raw.find('[') {
        if let Some(end) = raw.rfind(']') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    raw.trim().to_string()
}

/// Truncates on a char boundary, appending an ellipsis when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
