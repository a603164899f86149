use std::collections::HashMap;

use regex::Regex;

pub const IMAGE_TOKEN_PREFIX: &str = "__JREADER_IMG_";
pub const TOKEN_SUFFIX: &str = "__";
pub const AUDIO_TOKEN: &str = "__JREADER_AUDIO__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderScope {
    /// First definition only
    Main,
    /// Every definition, as the glossary list
    Full,
}

/// 31-based string hash over UTF-16 code units, wrapping at 32 bits, printed in base 36.
///
/// Both placeholder tokens and stored media filenames derive their dictionary fragment
/// from this function, so the two always agree on what "the same dictionary" is.
pub fn namespace_hash(namespace: &str) -> String {
    let hash = namespace
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Token standing in for the `index`-th image of `namespace`. The trailing `__`
/// keeps `_1__` from being a substring of `_10__`.
pub fn image_token(namespace: &str, index: usize) -> String {
    format!("{}{}_{}{}", IMAGE_TOKEN_PREFIX, namespace_hash(namespace), index, TOKEN_SUFFIX)
}

pub fn contains_placeholder(text: &str) -> bool {
    text.contains(IMAGE_TOKEN_PREFIX) || text.contains(AUDIO_TOKEN)
}

/// Every complete placeholder token in `text`, in order of appearance.
pub fn find_placeholders(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"__JREADER_(?:IMG_[0-9a-z]+_\d+|AUDIO)__") else {
        return Vec::new();
    };
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Per-render image counters, keyed by (namespace, scope).
///
/// Built fresh for every render call and dropped with it; never shared between
/// renders or cards.
#[derive(Debug)]
pub struct PlaceholderRegistry {
    scope: RenderScope,
    counters: HashMap<(String, RenderScope), usize>,
}

impl PlaceholderRegistry {
    pub fn new(scope: RenderScope) -> Self {
        Self { scope, counters: HashMap::new() }
    }

    /// Claims the next index for `namespace` and returns it with its token.
    pub fn next(&mut self, namespace: &str) -> (usize, String) {
        let counter = self.counters.entry((namespace.to_string(), self.scope)).or_insert(0);
        let index = *counter;
        *counter += 1;
        (index, image_token(namespace, index))
    }
}
