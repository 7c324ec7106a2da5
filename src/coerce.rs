//! Tolerant conversions between free-text result cells and numbers.
//!
//! Upstream feeds use blank and placeholder cells freely, so parsing never
//! fails: anything unparseable becomes zero.

pub fn parse_vote_count(text: &str) -> i64 {
    text.trim().parse::<i64>().unwrap_or(0)
}

pub fn parse_percentage(text: &str) -> f64 {
    let trimmed = text.trim();
    let value = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => 0.0,
    }
}

/// Zero means "not reported" upstream and renders as `NA`.
pub fn format_vote_count(votes: i64) -> String {
    if votes == 0 {
        return "NA".to_string();
    }
    votes.to_string()
}

pub fn format_percentage(percentage: f64) -> String {
    if percentage == 0.0 {
        return "0%".to_string();
    }
    format!("{percentage:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_counts() {
        assert_eq!(parse_vote_count("1000"), 1000);
        assert_eq!(parse_vote_count("  42 \t"), 42);
        assert_eq!(parse_vote_count("-7"), -7);
        assert_eq!(parse_vote_count(""), 0);
        assert_eq!(parse_vote_count("NA"), 0);
        assert_eq!(parse_vote_count("1,200"), 0);
        assert_eq!(parse_vote_count("12.5"), 0);
        assert_eq!(parse_vote_count("99999999999999999999999"), 0);
    }

    #[test]
    fn percentages() {
        assert_eq!(parse_percentage("55%"), 55.0);
        assert_eq!(parse_percentage(" 42.25 % "), 42.25);
        assert_eq!(parse_percentage("12.5"), 12.5);
        assert_eq!(parse_percentage("NA"), 0.0);
        assert_eq!(parse_percentage("%"), 0.0);
        assert_eq!(parse_percentage(""), 0.0);
        assert_eq!(parse_percentage("NaN"), 0.0);
        assert_eq!(parse_percentage("inf"), 0.0);
    }

    #[test]
    fn display_formatting() {
        assert_eq!(format_vote_count(0), "NA");
        assert_eq!(format_vote_count(1500), "1500");
        assert_eq!(format_percentage(0.0), "0%");
        assert_eq!(format_percentage(42.3), "42.3%");
        let rendered = format_percentage(42.25);
        assert!(rendered == "42.2%" || rendered == "42.3%", "{rendered}");
        assert_eq!(format_percentage(55.0), "55.0%");
    }

    #[test]
    fn arbitrary_text_never_panics() {
        let samples = ["\u{feff}12", "🗳️", "--1", "1e9999", "%%%", "\0", " - "];
        for sample in samples {
            let _ = parse_vote_count(sample);
            let _ = parse_percentage(sample);
        }
    }
}
