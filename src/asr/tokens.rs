//! Token vocabulary loader.
//!
//! The recognizer's `tokens.txt` maps one SentencePiece symbol per line to an
//! integer id: `<symbol> <id>`. Ids index the joiner's output logits; id 0 is
//! the blank symbol. Word boundaries are carried by the `▁` prefix on
//! word-initial pieces.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// SentencePiece word-boundary marker.
pub const WORD_BOUNDARY: char = '\u{2581}';

/// Load `tokens.txt` into an id-indexed symbol table.
pub fn load_tokens(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Cannot read token file: {}", path.display()))?;

    let mut entries: Vec<(usize, String)> = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        // The symbol itself may be any non-whitespace sequence (including
        // `▁`-prefixed pieces); the id is always the last field.
        let Some((symbol, id)) = line.rsplit_once(char::is_whitespace) else {
            bail!("Malformed token line {}: {:?}", line_no + 1, line);
        };
        let id: usize = id
            .parse()
            .with_context(|| format!("Bad token id on line {}: {:?}", line_no + 1, line))?;
        entries.push((id, symbol.to_string()));
    }

    if entries.is_empty() {
        bail!("Token file is empty: {}", path.display());
    }

    let max_id = entries.iter().map(|(id, _)| *id).max().unwrap_or(0);
    let mut table = vec![String::new(); max_id + 1];
    for (id, symbol) in entries {
        table[id] = symbol;
    }
    Ok(table)
}

/// Append a decoded piece to `text`, translating the `▁` marker into a space.
pub fn append_piece(text: &mut String, piece: &str) {
    for ch in piece.chars() {
        if ch == WORD_BOUNDARY {
            text.push(' ');
        } else {
            text.push(ch);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
