use std::sync::OnceLock;

use regex::Regex;

fn duration_re() -> Option<&'static Regex> {
    static DURATION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    DURATION_RE
        .get_or_init(|| {
            Regex::new(
                r"(?ix)^
                (?:(?P<hours>\d+(?:\.\d+)?)\s*(?:h|hr|hrs|hour|hours))?
                \s*
                (?:(?P<minutes>\d+(?:\.\d+)?)\s*(?:m|min|mins|minute|minutes))?
                $",
            )
            .map_err(|err| tracing::error!(error = %err, "estimate regex failed to compile"))
            .ok()
        })
        .as_ref()
}

/// Reads a free-text estimate such as `2h`, `30m`, `1h30m`, `1.5h`,
/// `2 hours` or a bare `90` (minutes). Anything else yields `None`.
pub fn parse_minutes(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(bare) = text.parse::<f64>() {
        return to_minutes(bare);
    }

    let caps = duration_re()?.captures(text)?;
    let hours = caps.name("hours").map(|m| m.as_str().parse::<f64>());
    let minutes = caps.name("minutes").map(|m| m.as_str().parse::<f64>());
    if hours.is_none() && minutes.is_none() {
        return None;
    }

    let hours = hours.transpose().ok()?.unwrap_or(0.0);
    let minutes = minutes.transpose().ok()?.unwrap_or(0.0);
    to_minutes(hours * 60.0 + minutes)
}

fn to_minutes(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return None;
    }
    Some(value.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::parse_minutes;

    #[test]
    fn reads_common_shapes() {
        assert_eq!(parse_minutes("2h"), Some(120));
        assert_eq!(parse_minutes("30m"), Some(30));
        assert_eq!(parse_minutes("1h30m"), Some(90));
        assert_eq!(parse_minutes("1h 15min"), Some(75));
        assert_eq!(parse_minutes("1.5h"), Some(90));
        assert_eq!(parse_minutes("2 hours"), Some(120));
        assert_eq!(parse_minutes("45 min"), Some(45));
        assert_eq!(parse_minutes("90"), Some(90));
        assert_eq!(parse_minutes(" 3H "), Some(180));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(parse_minutes(""), None);
        assert_eq!(parse_minutes("a while"), None);
        assert_eq!(parse_minutes("2d"), None);
        assert_eq!(parse_minutes("-5"), None);
        assert_eq!(parse_minutes("m"), None);
    }
}
