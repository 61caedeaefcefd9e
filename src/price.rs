//! Price normalization between localized currency strings and numbers.
//!
//! Catalog prices are stored exactly as entered ("R$ 1.234,56", period as
//! thousands separator, comma as decimal separator, optional currency
//! prefix). Parsing never fails loudly: malformed input resolves to 0.

use tracing::warn;

use crate::models::{CartLine, Pricing};

/// Parse a localized currency string into a number.
///
/// Strips the "R$" prefix and whitespace, drops thousands periods, and uses
/// the comma as decimal separator. Returns 0.0 on any parse failure.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Render a number as a pt-BR currency string: "R$ 1.234,56".
///
/// Rounds to the cent; round-trips through [`parse_amount`] are numerically
/// stable at that precision.
pub fn format_amount(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as i64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    if negative {
        format!("-R$ {grouped},{frac:02}")
    } else {
        format!("R$ {grouped},{frac:02}")
    }
}

/// Resolve the unit price of a cart line, plan-aware.
///
/// Plan-priced lines use the selected plan's price; single-priced lines use
/// the product price. An unresolvable price (missing plan selection, or a
/// plan absent from the mapping) resolves to 0.0 so the order can still
/// commit, but is surfaced with a warning rather than zeroed silently.
pub fn resolve_unit_price(line: &CartLine) -> f64 {
    match (&line.product.pricing, line.selected_plan.as_deref()) {
        (Pricing::Plans(plans), Some(plan)) => match plans.get(plan) {
            Some(price) => parse_amount(price),
            None => {
                warn!(
                    product = %line.product.name,
                    plan = %plan,
                    "price unavailable for selected plan; resolving to 0"
                );
                0.0
            }
        },
        (Pricing::Plans(_), None) => {
            warn!(
                product = %line.product.name,
                "plan-priced product has no selected plan; resolving to 0"
            );
            0.0
        }
        (Pricing::Single(price), _) => parse_amount(price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, TargetScreen};

    fn parque_line(selected_plan: Option<&str>) -> CartLine {
        CartLine {
            product: Product {
                id: 1,
                name: "Jazigo Família".into(),
                quantity: 3,
                description: "Jazigo com manutenção".into(),
                images: vec!["u1".into()],
                category: "Jazigos".into(),
                target_screen: TargetScreen::Parque,
                pricing: Pricing::plans(&[
                    ("Bronze", "R$ 50,00"),
                    ("Ouro", "R$ 80,00"),
                    ("Diamante", "R$ 120,00"),
                    ("Diamante Plus", "R$ 150,00"),
                ]),
            },
            selected_plan: selected_plan.map(String::from),
            quantity: 1,
        }
    }

    #[test]
    fn test_parse_simple_currency() {
        assert_eq!(parse_amount("R$ 100,00"), 100.0);
        assert_eq!(parse_amount("R$100,00"), 100.0);
        assert_eq!(parse_amount("  R$ 0,99 "), 0.99);
    }

    #[test]
    fn test_parse_thousands_grouping() {
        assert_eq!(parse_amount("R$ 1.234,56"), 1234.56);
        assert_eq!(parse_amount("R$ 12.345.678,90"), 12_345_678.90);
    }

    #[test]
    fn test_parse_malformed_is_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("Preço indisponível"), 0.0);
        assert_eq!(parse_amount("R$"), 0.0);
        assert_eq!(parse_amount("abc123def"), 0.0);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(100.0), "R$ 100,00");
        assert_eq!(format_amount(1234.56), "R$ 1.234,56");
        assert_eq!(format_amount(0.5), "R$ 0,50");
        assert_eq!(format_amount(12_345_678.9), "R$ 12.345.678,90");
    }

    #[test]
    fn test_round_trip_is_stable_to_the_cent() {
        for raw in ["R$ 100,00", "R$ 1.234,56", "R$ 0,01", "R$ 999.999,99"] {
            let parsed = parse_amount(raw);
            assert!(parsed >= 0.0);
            let reparsed = parse_amount(&format_amount(parsed));
            assert!((parsed - reparsed).abs() < 0.005, "{raw}: {parsed} vs {reparsed}");
        }
    }

    #[test]
    fn test_resolve_uses_selected_plan_price() {
        let line = parque_line(Some("Ouro"));
        assert_eq!(resolve_unit_price(&line), 80.0);
    }

    #[test]
    fn test_resolve_unknown_plan_is_zero() {
        let line = parque_line(Some("Platina"));
        assert_eq!(resolve_unit_price(&line), 0.0);
    }

    #[test]
    fn test_resolve_missing_plan_selection_is_zero() {
        let line = parque_line(None);
        assert_eq!(resolve_unit_price(&line), 0.0);
    }

    #[test]
    fn test_resolve_single_priced_product() {
        let mut line = parque_line(None);
        line.product.target_screen = TargetScreen::Funeraria;
        line.product.pricing = Pricing::Single("R$ 100,00".into());
        assert_eq!(resolve_unit_price(&line), 100.0);
    }
}
