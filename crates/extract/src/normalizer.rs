use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.,!?;:'"]"#).expect("static punctuation pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

/// Formats node ids and types, and collapses spelling variants of the same
/// entity seen across chunks onto the first spelling.
#[derive(Debug, Default)]
pub struct EntityNormalizer {
    /// Maps lookup key -> canonical id
    aliases: HashMap<String, String>,
}

impl EntityNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title-case the id and resolve it against previously seen entities.
    pub fn normalize_id(&mut self, raw: &str) -> String {
        let formatted = title_case(&WHITESPACE.replace_all(raw.trim(), " "));
        let key = Self::lookup_key(&formatted);

        self.aliases
            .entry(key)
            .or_insert_with(|| formatted.clone())
            .clone()
    }

    fn lookup_key(name: &str) -> String {
        let lowered = name.to_lowercase();
        let stripped = PUNCTUATION.replace_all(&lowered, "");
        WHITESPACE.replace_all(stripped.trim(), " ").to_string()
    }
}

/// Upper-cases the first letter of every alphabetic run, lower-cases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// `"author"` -> `"Author"`
pub fn format_node_type(s: &str) -> String {
    let mut chars = s.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `"written by"` -> `"WRITTEN_BY"`
pub fn format_relationship_type(s: &str) -> String {
    WHITESPACE
        .replace_all(s.trim(), "_")
        .replace('-', "_")
        .to_uppercase()
}
