//! Small quick-xml helpers shared by the part readers

use quick_xml::events::BytesStart;

/// Attribute value by local name (so `r:id` matches `id`), unescaped.
pub fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Boolean toggle elements such as `<b/>` or `<b val="0"/>`.
pub fn toggle(e: &BytesStart<'_>) -> bool {
    match attr(e, b"val") {
        None => true,
        Some(v) => !matches!(v.as_str(), "0" | "false" | "none"),
    }
}

/// Strip characters that XML 1.0 cannot carry.
pub fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || ('\u{20}'..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
                || c >= '\u{10000}'
        })
        .collect()
}
