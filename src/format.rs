use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Explicit formatting configuration for presentation boundaries. Callers
/// pass one of these in; the core never consults a process-wide locale and
/// stores amounts locale-independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatConfig {
    pub currency_symbol: String,
    pub decimal_sep: char,
    pub thousands_sep: char,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "$".to_string(),
            decimal_sep: '.',
            thousands_sep: ',',
        }
    }
}

impl FormatConfig {
    /// Two-decimal currency rendering, e.g. `$1,234.50`.
    pub fn format_currency(&self, amount: Decimal) -> String {
        if amount.is_sign_negative() {
            format!("-{}{}", self.currency_symbol, self.format_number(-amount, 2))
        } else {
            format!("{}{}", self.currency_symbol, self.format_number(amount, 2))
        }
    }

    /// Ratio rendered as a percentage with two decimals, e.g. `12.50%`.
    pub fn format_ratio_pct(&self, ratio: Decimal) -> String {
        format!("{}%", self.format_number(ratio * Decimal::ONE_HUNDRED, 2))
    }

    fn format_number(&self, value: Decimal, places: u32) -> String {
        // Half-away-from-zero, the convention for displayed currency.
        let rounded =
            value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
        let negative = rounded.is_sign_negative() && !rounded.is_zero();
        let text = rounded.abs().to_string();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (text.as_str(), ""),
        };

        let mut grouped = String::new();
        for (idx, ch) in int_part.chars().enumerate() {
            if idx > 0 && (int_part.len() - idx) % 3 == 0 {
                grouped.push(self.thousands_sep);
            }
            grouped.push(ch);
        }

        let mut out = String::new();
        if negative {
            out.push('-');
        }
        out.push_str(&grouped);
        if places > 0 {
            out.push(self.decimal_sep);
            out.push_str(frac_part);
            for _ in frac_part.len() as u32..places {
                out.push('0');
            }
        }
        out
    }
}
