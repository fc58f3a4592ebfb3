//! Text normalization pipeline.
//!
//! Converts arbitrary Unicode text into the canonical token stream that every
//! other component works on. Applied, in order:
//!
//! 1. Unicode canonical composition (NFC)
//! 2. lowercasing
//! 3. removal of emoji / pictographic code points
//! 4. smart and mojibake-corrupted quotation marks → ASCII `'` and `"`
//! 5. every maximal digit run → its cardinal-word spelling (hyphens in the
//!    spelling become spaces)
//! 6. every character that is not a word character, whitespace, apostrophe,
//!    or quote → a single space
//! 7. whitespace runs collapsed to one space, ends stripped
//!
//! The result is deterministic and idempotent: no control characters, no
//! digits, no two consecutive spaces.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

// ─────────────────────────────────────────────────────────────────────────────
// Number → words
// ─────────────────────────────────────────────────────────────────────────────

const ONES: &[&str] = &[
    "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen",
    "seventeen", "eighteen", "nineteen",
];
const TENS: &[&str] = &["", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];
const SCALE: &[&str] = &["", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion"];

fn three_digits_to_words(n: u64) -> String {
    if n == 0 {
        return String::new();
    }
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let remainder = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if remainder < 20 {
        if remainder > 0 {
            parts.push(ONES[remainder as usize].to_string());
        }
    } else {
        let tens_word = TENS[(remainder / 10) as usize];
        let ones_word = ONES[(remainder % 10) as usize];
        if ones_word.is_empty() {
            parts.push(tens_word.to_string());
        } else {
            parts.push(format!("{}-{}", tens_word, ones_word));
        }
    }
    parts.join(" ")
}

/// Convert a non-negative integer to English cardinal words.
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return "zero".to_string();
    }
    let mut parts = Vec::new();
    let mut remaining = n;
    for scale in SCALE {
        let group = remaining % 1000;
        if group > 0 {
            let group_words = three_digits_to_words(group);
            if scale.is_empty() {
                parts.push(group_words);
            } else {
                parts.push(format!("{} {}", group_words, scale));
            }
        }
        remaining /= 1000;
        if remaining == 0 {
            break;
        }
    }
    parts.reverse();
    parts.join(" ")
}

/// Spell a digit string one digit at a time ("07" → "zero seven").
///
/// Fallback for runs too long to fit an integer, and for non-ASCII decimal
/// digits that `\d` matches but `str::parse` rejects.
fn digits_to_words(s: &str) -> String {
    s.chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| ONES.get(d as usize).copied().unwrap_or(""))
        .map(|w| if w.is_empty() { "zero" } else { w })
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes (lazily initialised once)
// ─────────────────────────────────────────────────────────────────────────────

/// Emoji, dingbat, enclosed-symbol and pictographic ranges.
static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "[\u{1F600}-\u{1F64F}\u{1F300}-\u{1F5FF}\u{1F680}-\u{1F6FF}\
         \u{1F1E0}-\u{1F1FF}\u{2702}-\u{27B0}\u{24C2}-\u{1F251}]+",
    )
    .unwrap()
});

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Anything that is not a word character, whitespace, apostrophe or quote.
static RE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new("[^\\w\\s'\"`]").unwrap());

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Map smart (and commonly mojibake-corrupted) quotation marks to ASCII.
fn ascii_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            other => other,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize `input` into the canonical token stream.
pub fn normalize(input: &str) -> String {
    let text: String = input.nfc().collect();
    let text = text.to_lowercase();
    let text = RE_EMOJI.replace_all(&text, "");
    let text = ascii_quotes(&text);
    let text = RE_DIGITS.replace_all(&text, |caps: &Captures| {
        let run = &caps[0];
        let words = match run.parse::<u64>() {
            Ok(n) => number_to_words(n),
            Err(_) => digits_to_words(run),
        };
        words.replace('-', " ")
    });
    let text = RE_PUNCT.replace_all(&text, " ");
    RE_SPACES.replace_all(text.trim(), " ").into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
