fn with_commas(int_part: &str) -> String {
    let mut out = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.chars().rev().collect()
}

fn symbol(code: &str) -> Option<&'static str> {
    match code.to_ascii_uppercase().as_str() {
        "USD" | "CAD" | "AUD" | "NZD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

/// Format an amount in `code` with thousands separators: $1,234.56, or
/// `1,234.56 CHF` when the currency has no known symbol.
pub fn currency(val: f64, code: &str) -> String {
    let sign = if val < 0.0 { "-" } else { "" };
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let amount = format!("{}.{dec_part}", with_commas(int_part));
    match symbol(code) {
        Some(sym) => format!("{sign}{sym}{amount}"),
        None => format!("{sign}{amount} {}", code.to_ascii_uppercase()),
    }
}

/// Share of `part` in `whole` as `42.5%`.
pub fn percent(part: f64, whole: f64) -> String {
    if whole == 0.0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part / whole * 100.0)
}
