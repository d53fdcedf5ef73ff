//! Text classification used to pick a model and language when the caller
//! did not name one.

use crate::model::ModelKey;

/// Language code passed for text containing CJK ideographs
pub const CHINESE: &str = "zh-cn";

/// Language code passed otherwise
pub const ENGLISH: &str = "en";

/// Whether `c` is in the CJK Unified Ideographs block (U+4E00..=U+9FFF)
#[must_use]
pub const fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}')
}

/// Whether `text` contains at least one CJK ideograph
#[must_use]
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_ideograph)
}

/// Model to use when the request does not name one
#[must_use]
pub fn infer_model(text: &str) -> ModelKey {
    if contains_cjk(text) {
        ModelKey::multilingual()
    } else {
        ModelKey::default_engine()
    }
}

/// Language to pass to a multilingual engine when the request does not name one
#[must_use]
pub fn infer_language(text: &str) -> &'static str {
    if contains_cjk(text) {
        CHINESE
    } else {
        ENGLISH
    }
}
