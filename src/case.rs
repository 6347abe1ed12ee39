//! Case conversion for derived URL segments: `OrderLine` -> `order_lines`.

/// Convert a single identifier from CamelCase to snake_case.
/// e.g. "OrderLine" -> "order_line", "HTTPLog" -> "http_log"
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev_lower || acronym_end {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Default path segment for an entity type name.
pub fn default_path_segment(type_name: &str) -> String {
    format!("{}s", to_snake_case(type_name))
}
