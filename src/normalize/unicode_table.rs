use std::collections::HashMap;
use std::sync::OnceLock;

use rust_embed::RustEmbed;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(RustEmbed)]
#[folder = "data/"]
#[include = "unicode_substitutions.json"]
struct EmbeddedData;

fn substitution_table() -> &'static HashMap<String, String> {
    static TABLE: OnceLock<HashMap<String, String>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let raw = EmbeddedData::get("unicode_substitutions.json")
            .expect("unicode_substitutions.json must be embedded");
        serde_json::from_slice(&raw.data).expect("unicode_substitutions.json must be valid JSON")
    })
}

/// Step 1 of normalization: apply the fixed character-substitution table
/// (micro-sign -> "micro", greek letters to names, trademark/registered
/// marks stripped, fractions expanded).
pub fn apply_substitutions(input: &str) -> String {
    let table = substitution_table();
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let mut buf = [0u8; 4];
        let key = ch.encode_utf8(&mut buf);
        if let Some(replacement) = table.get(key) {
            out.push_str(replacement);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Step 2: NFKD decompose, strip combining marks, lowercase. Uses a
/// quick-check fast path so already-normalized ASCII input (the common
/// case) avoids allocating a fresh string.
pub fn fold_unicode(input: &str) -> String {
    if input.is_ascii() {
        return input.to_ascii_lowercase();
    }
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}
