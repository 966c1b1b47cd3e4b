//! Numeric display helpers shared by simple and table rendering.

const MILLION: f64 = 1_000_000.0;
const THOUSAND: f64 = 1_000.0;

/// Dollar amount with K/M suffixing above a thousand, else two decimals.
///
/// `1_500_000.0` → `"$1.5M"`, `2_500.0` → `"$2.5K"`, `45.0` → `"$45.00"`.
pub fn format_currency(amount: f64) -> String {
    if amount >= MILLION {
        format!("${:.1}M", amount / MILLION)
    } else if amount >= THOUSAND {
        format!("${:.1}K", amount / THOUSAND)
    } else {
        format!("${:.2}", amount)
    }
}

/// Count with K/M suffixing above a thousand, else a comma-grouped integer.
///
/// `1_500_000.0` → `"1.5M"`, `800.0` → `"800"`.
pub fn format_number(number: f64) -> String {
    if number >= MILLION {
        format!("{:.1}M", number / MILLION)
    } else if number >= THOUSAND {
        format!("{:.1}K", number / THOUSAND)
    } else {
        group_thousands(number.trunc() as i64)
    }
}

/// Inserts `,` between digit groups: `-12345` → `"-12,345"`.
fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// `total_revenue` → `"Total Revenue"`.
pub fn title_case(column: &str) -> String {
    column
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
