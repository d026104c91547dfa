/// Dollar amount with thousands separators: `$1,234.56`, `-$500.00`.
pub fn money(val: f64) -> String {
    let cents = (val.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if val < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Empty cell text for unset optional values.
pub fn opt(val: &Option<String>) -> &str {
    val.as_deref().unwrap_or("")
}
