//! Full-text analysis for the Tantivy backend.
//!
//! Splits on whitespace and `,.-_\/` and lowercases, producing the same token
//! set as [`split_full_text`](crate::field::split_full_text) so that indexed
//! and locally evaluated full-text predicates agree.

use tantivy::tokenizer::{LowerCaser, RegexTokenizer, TextAnalyzer};

use crate::IndexError;

/// Name of the tokenizer registered with Tantivy.
pub const REVDEX_TOKENIZER: &str = "revdex_text";

/// Runs of characters that are not separators.
const TOKEN_PATTERN: &str = r"[^\s,.\-_\\/]+";

/// Builds the full-text analyzer.
pub fn build_analyzer() -> Result<TextAnalyzer, IndexError> {
    let tokenizer = RegexTokenizer::new(TOKEN_PATTERN).map_err(|e| IndexError::backend(&e))?;
    Ok(TextAnalyzer::builder(tokenizer).filter(LowerCaser).build())
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use tantivy::tokenizer::TokenStream;

    use super::*;
    use crate::field::split_full_text;

    fn tokenize(text: &str) -> BTreeSet<String> {
        let mut analyzer = build_analyzer().unwrap();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = BTreeSet::new();
        while stream.advance() {
            tokens.insert(stream.token().text.clone());
        }
        tokens
    }

    #[test]
    fn matches_local_splitter() {
        for text in [
            "Fix crash in parser",
            "fix-css layout",
            "src/main.rs,lib\\mod_a",
            "  MiXeD   case\ttabs ",
            "",
        ] {
            assert_eq!(tokenize(text), split_full_text(text), "{text:?}");
        }
    }
}
