//! Translation lookup for NPC dialog and deferral messages.
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::constants::{DEFAULT_LANGUAGE, KEY_NPC_FINISH, KEY_NPC_FINISH_PREFIX};
use crate::npc::NpcId;

/// Resolves translation keys into display strings.
pub trait Localizer {
    /// Raw template for `key`, if one exists.
    fn lookup(&self, key: &str) -> Option<String>;

    /// Translated text, falling back to the key itself.
    fn translate(&self, key: &str) -> String {
        self.lookup(key).unwrap_or_else(|| key.to_string())
    }

    /// Translated text with `{n}` placeholders filled from `args`.
    ///
    /// A template that cannot be formatted is returned unformatted.
    fn translate_with(&self, key: &str, args: &[&str]) -> String {
        let raw = self.translate(key);
        format_template(&raw, args).unwrap_or_else(|| {
            log::warn!("Format error for key '{key}' with value '{raw}'");
            raw
        })
    }
}

/// Localizer that renders every key verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLocalizer;

impl Localizer for PassthroughLocalizer {
    fn lookup(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Fill `{0}`, `{1}`, ... placeholders; `{{` and `}}` escape braces.
///
/// Returns `None` for malformed templates or out-of-range indices.
#[must_use]
pub fn format_template(template: &str, args: &[&str]) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut digits = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        d if d.is_ascii_digit() => digits.push(d),
                        _ => return None,
                    }
                }
                let index: usize = digits.parse().ok()?;
                out.push_str(args.get(index)?);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Deferral text shown when `required` must be completed first.
#[must_use]
pub fn deferral_message(localizer: &dyn Localizer, required: NpcId) -> String {
    let specific = format!("{KEY_NPC_FINISH_PREFIX}{required}");
    if let Some(text) = localizer.lookup(&specific) {
        return text;
    }
    if localizer.lookup(KEY_NPC_FINISH).is_some() {
        return localizer.translate_with(KEY_NPC_FINISH, &[&required.to_string()]);
    }
    specific
}

#[derive(Debug, Deserialize)]
struct TranslationEntry {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct LanguageBlock {
    #[serde(default)]
    entries: Vec<TranslationEntry>,
}

/// Per-language translation tables with English fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationCatalog {
    languages: BTreeMap<String, BTreeMap<String, String>>,
    current: String,
}

impl TranslationCatalog {
    /// Parse a catalog of `{ "<Language>": { "entries": [{key, value}] } }`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the catalog shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let blocks: BTreeMap<String, LanguageBlock> = serde_json::from_str(json)?;
        let languages = blocks
            .into_iter()
            .map(|(language, block)| {
                let table = block
                    .entries
                    .into_iter()
                    .map(|entry| (entry.key, entry.value))
                    .collect();
                (language, table)
            })
            .collect();
        Ok(Self {
            languages,
            current: DEFAULT_LANGUAGE.to_string(),
        })
    }

    /// Catalog bundled with the crate.
    #[must_use]
    pub fn load_from_static() -> Self {
        Self::from_json(include_str!("../assets/translations.json")).unwrap_or_else(|err| {
            log::error!("Bundled translations are invalid: {err}");
            Self {
                languages: BTreeMap::new(),
                current: DEFAULT_LANGUAGE.to_string(),
            }
        })
    }

    /// Switch language; unknown languages are rejected and leave the selection unchanged.
    pub fn set_language(&mut self, language: &str) -> bool {
        if self.languages.contains_key(language) {
            self.current = language.to_string();
            true
        } else {
            log::warn!("Unknown language '{language}', keeping '{}'", self.current);
            false
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: &str) -> Self {
        self.set_language(language);
        self
    }

    #[must_use]
    pub fn current_language(&self) -> &str {
        &self.current
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }
}

impl Localizer for TranslationCatalog {
    fn lookup(&self, key: &str) -> Option<String> {
        self.languages
            .get(&self.current)
            .and_then(|table| table.get(key))
            .or_else(|| {
                self.languages
                    .get(DEFAULT_LANGUAGE)
                    .and_then(|table| table.get(key))
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_template_fills_and_escapes() {
        assert_eq!(
            format_template("Hi {0}, {{ok}}", &["Noa"]).as_deref(),
            Some("Hi Noa, {ok}")
        );
        assert_eq!(format_template("{1}{0}", &["a", "b"]).as_deref(), Some("ba"));
        assert!(format_template("{1}", &["a"]).is_none());
        assert!(format_template("{x}", &["a"]).is_none());
        assert!(format_template("oops }", &[]).is_none());
        assert!(format_template("open {0", &["a"]).is_none());
    }

    #[test]
    fn catalog_falls_back_to_english_then_key() {
        let catalog = TranslationCatalog::load_from_static().with_language("Hebrew");
        assert_eq!(catalog.current_language(), "Hebrew");
        assert_eq!(catalog.translate("correct_answer"), "נכון");
        assert_eq!(catalog.translate("npc1_intro"), "I guard the first puzzle.");
        assert_eq!(catalog.translate("missing_key"), "missing_key");
    }

    #[test]
    fn unknown_language_is_rejected() {
        let mut catalog = TranslationCatalog::load_from_static();
        assert!(!catalog.set_language("Klingon"));
        assert_eq!(catalog.current_language(), "English");
        assert!(catalog.languages().any(|lang| lang == "Hebrew"));
    }

    #[test]
    fn deferral_prefers_specific_then_generic_then_key() {
        let catalog = TranslationCatalog::load_from_static();
        assert_eq!(
            deferral_message(&catalog, NpcId(1)),
            "Come back later. First talk to the gardener."
        );
        assert_eq!(
            deferral_message(&catalog, NpcId(2)),
            "Come back later. First finish with friend number 2."
        );
        assert_eq!(
            deferral_message(&PassthroughLocalizer, NpcId(3)),
            "npc_finish_3"
        );
    }

    #[test]
    fn malformed_template_is_returned_raw() {
        let catalog = TranslationCatalog::from_json(
            r#"{"English": {"entries": [{"key": "broken", "value": "Hi {5}"}]}}"#,
        )
        .unwrap();
        assert_eq!(catalog.translate_with("broken", &["x"]), "Hi {5}");
    }
}
