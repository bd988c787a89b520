//! ## Tokenizer
//!
//! Splits instrument replies into fields.
//!

/// Characters stripped from both ends of every field
pub const STRIP_CHARS: &[char] = &[' ', '\r', '\n', '\t'];

fn is_delimiter(c: char) -> bool {
    matches!(c, ',' | ';' | '\n')
}

/// Remove leading and trailing characters found in `cut_set`.
pub fn trim<'a>(text: &'a str, cut_set: &[char]) -> &'a str {
    text.trim_matches(|c| cut_set.contains(&c))
}

/// ### Tokenize
///
/// Split `text` on `,`, `;` and newlines into at most `max_tokens` trimmed
/// fields. Once the last field is started the rest of the text goes into
/// it unsplit, delimiters included.
///
/// Callers check the length of the result against the field count they
/// expect.
///
pub fn tokenize(text: &str, max_tokens: usize) -> Vec<&str> {
    text.splitn(max_tokens, is_delimiter)
        .map(|token| trim(token, STRIP_CHARS))
        .collect()
}
