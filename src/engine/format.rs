//! Literal rendering of ground-truth figures
//!
//! The prompt builder and the consistency verifier both go through these,
//! so a figure is always spelled the same way on both sides.

use rust_decimal::Decimal;

const PRESENTATION_DP: u32 = 2;

/// Round to presentation precision, folding negative zero into zero
pub fn round_presentation(value: Decimal) -> Decimal {
    let rounded = value.round_dp(PRESENTATION_DP);
    if rounded.is_zero() {
        Decimal::ZERO
    } else {
        rounded
    }
}

/// `5050` → `5050.0`, `250.5` → `250.5`, `12.345` → `12.34`
pub fn format_amount(value: Decimal) -> String {
    let normalized = round_presentation(value).normalize();
    if normalized.scale() == 0 {
        format!("{}.0", normalized)
    } else {
        normalized.to_string()
    }
}

/// Exactly two decimals and a trailing `%`
pub fn format_percent(value: Decimal) -> String {
    format!("{:.2}%", round_presentation(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(5050)), "5050.0");
        assert_eq!(format_amount(dec!(5050.00)), "5050.0");
        assert_eq!(format_amount(dec!(250.5)), "250.5");
        assert_eq!(format_amount(dec!(-250)), "-250.0");
        assert_eq!(format_amount(dec!(0)), "0.0");
        assert_eq!(format_amount(dec!(-0.001)), "0.0");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(dec!(13.648648)), "13.65%");
        assert_eq!(format_percent(dec!(15)), "15.00%");
        assert_eq!(format_percent(Decimal::ZERO), "0.00%");
        assert_eq!(format_percent(dec!(-6.25)), "-6.25%");
    }
}
