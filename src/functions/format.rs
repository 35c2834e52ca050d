pub const COUNTRY_CODE: &str = "972";
pub const CHAT_ID_SUFFIX: &str = "@c.us";
pub const NAME_FALLBACK: &str = "Customer";

/// Turns a free-form phone into a provider chat id (`972XXXXXXXXX@c.us`).
///
/// A leading trunk `0` is replaced by the country code; anything else that
/// does not already start with it gets the country code prepended. Input
/// already carrying an international `00972` prefix therefore ends up
/// double-prefixed, which existing rows rely on not changing.
pub fn to_chat_id(raw: Option<&str>) -> String {
    let digits: String = raw
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return String::new();
    }

    let international = match digits.strip_prefix('0') {
        Some(local) => format!("{COUNTRY_CODE}{local}"),
        None => digits,
    };
    let international = if international.starts_with(COUNTRY_CODE) {
        international
    } else {
        format!("{COUNTRY_CODE}{international}")
    };

    format!("{international}{CHAT_ID_SUFFIX}")
}

/// Fills `{name}` and `{phone}` placeholders in one left-to-right pass, so
/// substituted values are never re-expanded.
pub fn render_template(template: &str, name: Option<&str>, phone: Option<&str>) -> String {
    let name = name
        .filter(|n| !n.is_empty())
        .or(phone.filter(|p| !p.is_empty()))
        .unwrap_or(NAME_FALLBACK);
    let phone = phone.unwrap_or_default();

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{name}") {
            out.push_str(name);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{phone}") {
            out.push_str(phone);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
