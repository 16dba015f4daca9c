use std::borrow::Cow;

/// Maximum token length to store in the index.
/// Longer runs are almost always encoded blobs or extraction noise.
const MAX_TOKEN_LENGTH: usize = 128;

/// A word found in page text, with its byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Split text into words: maximal runs of Unicode letters and digits.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            push_token(&mut tokens, text, s, i);
        }
    }

    if let Some(s) = start {
        push_token(&mut tokens, text, s, text.len());
    }

    tokens
}

fn push_token<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str, start: usize, end: usize) {
    if end - start <= MAX_TOKEN_LENGTH {
        tokens.push(Token {
            text: &text[start..end],
            start,
            end,
        });
    }
}

/// How words are normalised into terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    /// Terms are lowercased; the index always stores this form
    CaseInsensitive,
    /// Terms keep their original case
    CaseSensitive,
}

impl Analyzer {
    pub fn for_case(match_case: bool) -> Self {
        if match_case {
            Analyzer::CaseSensitive
        } else {
            Analyzer::CaseInsensitive
        }
    }

    /// Normalise a single word
    pub fn normalize<'a>(&self, word: &'a str) -> Cow<'a, str> {
        match self {
            Analyzer::CaseSensitive => Cow::Borrowed(word),
            Analyzer::CaseInsensitive => {
                if word.chars().any(|c| c.is_uppercase()) {
                    Cow::Owned(word.to_lowercase())
                } else {
                    Cow::Borrowed(word)
                }
            }
        }
    }

    /// Analyse text into terms, preserving order and duplicates
    pub fn terms<'a>(&self, text: &'a str) -> Vec<Cow<'a, str>> {
        tokenize(text)
            .into_iter()
            .map(|t| self.normalize(t.text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_words() {
        let tokens = tokenize("The quick-brown fox, 42 times!");
        let words: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(words, vec!["The", "quick", "brown", "fox", "42", "times"]);
        assert_eq!(tokens[1].start, 4);
        assert_eq!(tokens[1].end, 9);
    }

    #[test]
    fn test_tokenize_unicode() {
        let words: Vec<_> = tokenize("Größe café naïve")
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(words, vec!["Größe", "café", "naïve"]);
    }

    #[test]
    fn test_overlong_tokens_dropped() {
        let long = "a".repeat(MAX_TOKEN_LENGTH + 1);
        let text = format!("short {long} end");
        let words: Vec<_> = tokenize(&text).into_iter().map(|t| t.text).collect();
        assert_eq!(words, vec!["short", "end"]);
    }

    #[test]
    fn test_analyzer_case() {
        let ci = Analyzer::for_case(false);
        let cs = Analyzer::for_case(true);
        assert_eq!(ci.terms("Brown FOX"), vec!["brown", "fox"]);
        assert_eq!(cs.terms("Brown FOX"), vec!["Brown", "FOX"]);
    }
}
