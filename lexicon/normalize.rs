//! Text normalisation and tokenisation for social-media posts.
//!
//! Normalisation happens in a fixed order: case folding, link and mention removal,
//! HTML entities, contractions, ordinals, then stray symbols. Abbreviations are
//! expanded after tokenisation so punctuation glued to them does not block a match.

use ahash::AHashMap;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)\S+").expect("valid URL pattern"));
static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+").expect("valid mention pattern"));
static WITHOUT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bw/o\b").expect("valid w/o pattern"));
static WITH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bw/").expect("valid w/ pattern"));
static ORDINAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)(?:st|nd|rd|th)\b").expect("valid ordinal pattern")
});
static NON_WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]+").expect("valid punctuation pattern"));

static CONTRACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    // Whole-word irregulars must run before the generic suffix rules.
    let rules: [(&str, &str); 19] = [
        (r"\bwon't\b", "will not"),
        (r"\bcan't\b", "cannot"),
        (r"\bshan't\b", "shall not"),
        (r"\bain't\b", "is not"),
        (r"\blet's\b", "let us"),
        (r"\bit's\b", "it is"),
        (r"\bthat's\b", "that is"),
        (r"\bwhat's\b", "what is"),
        (r"\bthere's\b", "there is"),
        (r"\bhe's\b", "he is"),
        (r"\bshe's\b", "she is"),
        (r"n't\b", " not"),
        (r"'re\b", " are"),
        (r"'ll\b", " will"),
        (r"'ve\b", " have"),
        (r"'m\b", " am"),
        (r"'d\b", " would"),
        (r"'s\b", ""),
        (r"s'(\s|$)", "s$1"),
    ];
    rules
        .iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("valid contraction pattern"),
                *replacement,
            )
        })
        .collect()
});

static SYMBOLS: [(&str, &str); 11] = [
    ("&amp;", " and "),
    ("&lt;", " "),
    ("&gt;", " "),
    ("&quot;", " "),
    ("&#39;", "'"),
    ("&", " and "),
    ("%", " percent "),
    ("$", " dollar "),
    ("+", " plus "),
    ("=", " equals "),
    ("@", " at "),
];

static ABBREVIATIONS: LazyLock<AHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    AHashMap::from_iter([
        ("u", "you"),
        ("ur", "your"),
        ("r", "are"),
        ("y", "why"),
        ("b4", "before"),
        ("bc", "because"),
        ("cuz", "because"),
        ("pls", "please"),
        ("plz", "please"),
        ("thx", "thanks"),
        ("ty", "thank you"),
        ("govt", "government"),
        ("gov", "government"),
        ("ppl", "people"),
        ("idk", "i do not know"),
        ("imo", "in my opinion"),
        ("omg", "oh my god"),
        ("tbh", "to be honest"),
        ("btw", "by the way"),
        ("dr", "doctor"),
        ("hosp", "hospital"),
        ("wk", "week"),
        ("yr", "year"),
        ("tmrw", "tomorrow"),
        ("2day", "today"),
        ("2morrow", "tomorrow"),
        ("gr8", "great"),
    ])
});

const ORDINAL_WORDS: [&str; 10] = [
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth",
    "tenth",
];

/// Rewrites a raw post into lower-case prose with links, mentions, contractions,
/// ordinals and symbols resolved.
pub fn normalize_text(raw: &str) -> String {
    let mut text = raw.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    text = URL_REGEX.replace_all(&text, " ").into_owned();
    text = MENTION_REGEX.replace_all(&text, " ").into_owned();
    text = WITHOUT_REGEX.replace_all(&text, " without ").into_owned();
    text = WITH_REGEX.replace_all(&text, " with ").into_owned();
    for (pattern, replacement) in CONTRACTIONS.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text = ORDINAL_REGEX
        .replace_all(&text, |caps: &Captures| {
            let number = &caps[1];
            match number.parse::<usize>() {
                Ok(n @ 1..=10) => ORDINAL_WORDS[n - 1].to_string(),
                _ => number.to_string(),
            }
        })
        .into_owned();
    for (symbol, replacement) in SYMBOLS.iter() {
        if text.contains(symbol) {
            text = text.replace(symbol, replacement);
        }
    }
    text
}

/// Splits normalised text into word tokens. Punctuation separates words, purely numeric
/// tokens are dropped, and known abbreviations expand to one or more words.
pub fn tokenize(normalized: &str) -> Vec<String> {
    let cleaned = NON_WORD_REGEX.replace_all(normalized, " ");
    let mut tokens = Vec::new();
    for word in cleaned.split_whitespace() {
        if word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        match ABBREVIATIONS.get(word) {
            Some(expansion) => tokens.extend(expansion.split(' ').map(str::to_string)),
            None => tokens.push(word.to_string()),
        }
    }
    tokens
}

pub fn tokens(raw: &str) -> Vec<String> {
    tokenize(&normalize_text(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_mentions_are_removed() {
        let t = tokens("@nurse_jo see https://t.co/xyz and www.example.org now");
        assert_eq!(t, vec!["see", "and", "now"]);
    }

    #[test]
    fn contractions_expand() {
        assert_eq!(tokens("I can't go"), vec!["i", "cannot", "go"]);
        assert_eq!(tokens("We won't stop"), vec!["we", "will", "not", "stop"]);
        assert_eq!(tokens("they're tired"), vec!["they", "are", "tired"]);
        assert_eq!(tokens("it\u{2019}s fine"), vec!["it", "is", "fine"]);
        assert_eq!(tokens("didn't help"), vec!["did", "not", "help"]);
    }

    #[test]
    fn ordinals_are_spelled_out_or_dropped() {
        assert_eq!(tokens("our 2nd wave"), vec!["our", "second", "wave"]);
        assert_eq!(tokens("the 21st case"), vec!["the", "case"]);
    }

    #[test]
    fn symbols_and_abbreviations_expand() {
        assert_eq!(
            tokens("ppl & govt up 5% #lockdown"),
            vec!["people", "and", "government", "up", "percent", "lockdown"]
        );
        assert_eq!(tokens("u r gr8"), vec!["you", "are", "great"]);
        assert_eq!(tokens("home w/o masks"), vec!["home", "without", "masks"]);
    }

    #[test]
    fn punctuation_splits_words() {
        assert_eq!(tokens("sad...scared!!"), vec!["sad", "scared"]);
        assert!(tokens("!!! 123 ???").is_empty());
    }
}
