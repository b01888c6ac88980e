//! Percentages printed by tools on their output.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static PERCENT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+\.\d+)%").ok());

/// Every decimal percentage (`12.34%`) in `text`, in order of appearance.
///
/// Integer percentages (`50%`) are ignored.
pub fn parse_percentages(text: &str) -> Vec<f64> {
    let Some(re) = PERCENT_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0))
        .collect()
}

/// Last decimal percentage in `text`, if any.
pub fn last_percentage(text: &str) -> Option<f64> {
    parse_percentages(text).pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percentages() {
        assert_eq!(parse_percentages("0.00%"), vec![0.0]);
        assert_eq!(parse_percentages("12.50% 99.99%"), vec![12.5, 99.99]);
        assert!(parse_percentages("50% done").is_empty());
        assert!(parse_percentages("no progress here").is_empty());
    }

    #[test]
    fn test_values_clamped() {
        assert_eq!(parse_percentages("150.00%"), vec![100.0]);
    }

    #[test]
    fn test_last_percentage() {
        assert_eq!(last_percentage("1.00%\r2.50%\r3.75%"), Some(3.75));
        assert_eq!(last_percentage("[0 NVIDIA] queue C"), None);
    }
}
