//! Frame rate probing.

/// Frame rate used whenever the probe gives nothing usable.
pub const DEFAULT_FRAME_RATE: &str = "30";

/// Turns ffprobe's `num/den` output into the rate passed to the muxer.
///
/// Malformed text, a zero denominator, or a non-positive or non-finite
/// result all give [`DEFAULT_FRAME_RATE`]. Otherwise the rate is formatted
/// with two decimals, so `30000/1001` becomes `29.97`.
pub fn parse_frame_rate(output: &str) -> String {
    let Some(line) = output.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return DEFAULT_FRAME_RATE.to_string();
    };
    let Some((num, den)) = line.split_once('/') else {
        return DEFAULT_FRAME_RATE.to_string();
    };

    let (Ok(num), Ok(den)) = (num.trim().parse::<f64>(), den.trim().parse::<f64>()) else {
        return DEFAULT_FRAME_RATE.to_string();
    };
    if den == 0.0 {
        return DEFAULT_FRAME_RATE.to_string();
    }

    let fps = num / den;
    if !fps.is_finite() || fps <= 0.0 {
        return DEFAULT_FRAME_RATE.to_string();
    }
    format!("{fps:.2}")
}
