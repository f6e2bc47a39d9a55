pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    } else {
        let hours = ms / 3_600_000;
        let mins = (ms % 3_600_000) / 60_000;
        format!("{}h {}m", hours, mins)
    }
}

/// Ratio rendered as a percentage; `n/a` when undefined.
pub fn format_percent(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

/// EPSS probabilities span several orders of magnitude, so small values keep
/// more digits.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        None => "-".to_string(),
        Some(s) if s == 0.0 => "0".to_string(),
        Some(s) if s.abs() < 0.001 => format!("{:.6}", s),
        Some(s) => format!("{:.4}", s),
    }
}
