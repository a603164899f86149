use wana_kana::IsJapaneseChar;

const TOKEN_LEAD: &str = "__JREADER_";
const DEFUSED_LEAD: &str = "&#95;_JREADER_";

/// Escapes dictionary or card text for HTML. Placeholder lookalikes come out defused.
pub fn escape_html(s: &str) -> String {
    let escaped = s
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;");
    defuse_placeholders(&escaped)
}

/// Encodes the first underscore of every `__JREADER_` so that only tokens the
/// renderer writes itself can be resolved or reported as unresolved.
pub fn defuse_placeholders(text: &str) -> String {
    if text.contains(TOKEN_LEAD) {
        text.replace(TOKEN_LEAD, DEFUSED_LEAD)
    } else {
        text.to_string()
    }
}

/// `fontWeight` -> `font-weight`, `WebkitTextStroke` -> `-webkit-text-stroke`
pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else if c == '_' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}

/// Attribute and tag names come from dictionary data; anything outside this set is dropped.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Wraps every Japanese character of already-escaped text in its own span so a
/// click-to-lookup handler can attach per character. Non-Japanese text passes through.
pub fn wrap_japanese_chars(escaped: &str, class: &str) -> String {
    let mut out = String::with_capacity(escaped.len() * 2);
    for c in escaped.chars() {
        if c.is_japanese() && !c.is_whitespace() {
            out.push_str("<span class=\"");
            out.push_str(class);
            out.push_str("\">");
            out.push(c);
            out.push_str("</span>");
        } else {
            out.push(c);
        }
    }
    out
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value < 0 {
        grouped.insert(0, '-');
    }
    grouped
}
