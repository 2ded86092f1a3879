//! Size-reduction metrics reported for every processed image.

#[derive(Debug, Clone, PartialEq)]
pub struct SizeMetrics {
    pub original_size: u64,
    pub new_size: u64,
    /// Positive when bytes were saved.
    pub reduction_bytes: i64,
    pub reduction_label: String,
}

impl SizeMetrics {
    pub fn compute(original_size: u64, new_size: u64) -> Self {
        let reduction_bytes = original_size as i64 - new_size as i64;
        let percent_change = percent_change(original_size, new_size);

        // "smaller" drops a trailing ".0", "larger" keeps it
        let reduction_label = if percent_change < 0.0 {
            format!("{}% smaller", round_one_decimal(percent_change.abs()))
        } else if percent_change > 0.0 {
            format!("{}% larger", fixed_one_decimal(percent_change))
        } else {
            "Same size".to_string()
        };

        Self {
            original_size,
            new_size,
            reduction_bytes,
            reduction_label,
        }
    }
}

/// (new - original) / original * 100. Zero when there is no original.
pub fn percent_change(original_size: u64, new_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (new_size as f64 - original_size as f64) / original_size as f64 * 100.0
}

/// Format `value` with exactly one decimal. The exact binary value is
/// rounded, so 0.15 (stored just below) gives "0.1"; exact ties such as
/// 0.25 round away from zero.
pub fn fixed_one_decimal(value: f64) -> String {
    let magnitude = value.abs();
    let quarters = magnitude * 4.0;
    let tie = quarters.fract() == 0.0 && quarters % 2.0 == 1.0;
    let rounded = if tie { magnitude + 0.05 } else { magnitude };

    let digits = format!("{:.1}", rounded);
    if value < 0.0 && digits != "0.0" {
        format!("-{}", digits)
    } else {
        digits
    }
}

/// `value` rounded to one decimal the same way `fixed_one_decimal` does.
pub fn round_one_decimal(value: f64) -> f64 {
    fixed_one_decimal(value).parse().unwrap_or(value)
}
