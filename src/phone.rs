pub const DEFAULT_COUNTRY_CODE: &str = "62";

/// Digits only, with a local leading `0` rewritten to the country code.
/// `"0812-3456-7890"` and `"+62 812 3456 7890"` both become `"6281234567890"`.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.strip_prefix('0') {
        Some(rest) => format!("{country_code}{rest}"),
        None => digits,
    }
}

/// Substitutes `{guardian}`, `{student}` and `{halaqah}` in one pass over the
/// template. Substituted values are never rescanned; unknown `{...}` tokens
/// stay as written.
pub fn render_message(template: &str, guardian: &str, student: &str, halaqah: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            rest = tail;
            break;
        };
        match &tail[1..end] {
            "guardian" => out.push_str(guardian),
            "student" => out.push_str(student),
            "halaqah" => out.push_str(halaqah),
            _ => {
                out.push('{');
                rest = &tail[1..];
                continue;
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

pub fn whatsapp_link(normalized_phone: &str, message: &str) -> String {
    if message.is_empty() {
        return format!("https://wa.me/{normalized_phone}");
    }
    format!(
        "https://wa.me/{}?text={}",
        normalized_phone,
        urlencoding::encode(message)
    )
}
