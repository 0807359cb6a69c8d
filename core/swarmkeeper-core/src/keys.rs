//! Key sequence parsing for `tmux send-keys`.
//!
//! A sequence like `y\n` or `C-c` is split into literal text and named keys,
//! scanning left to right. At each position the first rule that applies wins:
//!
//! 1. `\n` (escape or real newline) → `Enter`, `\t` (escape or real tab) → `Tab`
//! 2. Named keys `Enter`, `Tab`, `Space`
//! 3. Chords `C-<letter>` or `Ctrl-<letter>` → tmux `C-<letter>`
//! 4. Anything else is literal text

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    /// Sent with `send-keys -l` so tmux does not interpret it.
    Literal(String),
    /// A tmux key name such as `Enter` or `C-c`.
    Key(String),
}

const ESCAPES: &[(&str, &str)] = &[("\\n", "Enter"), ("\n", "Enter"), ("\\t", "Tab"), ("\t", "Tab")];
const NAMED_KEYS: &[&str] = &["Enter", "Tab", "Space"];
const CHORD_PREFIXES: &[&str] = &["Ctrl-", "C-"];

pub fn parse_key_sequence(input: &str) -> Vec<KeyToken> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(ch) = rest.chars().next() {
        if let Some((key, consumed)) = match_special(rest) {
            if !literal.is_empty() {
                tokens.push(KeyToken::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(KeyToken::Key(key));
            rest = &rest[consumed..];
            continue;
        }
        literal.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    if !literal.is_empty() {
        tokens.push(KeyToken::Literal(literal));
    }
    tokens
}

fn match_special(rest: &str) -> Option<(String, usize)> {
    if let Some((escape, key)) = ESCAPES.iter().find(|(escape, _)| rest.starts_with(escape)) {
        return Some((key.to_string(), escape.len()));
    }

    if let Some(name) = NAMED_KEYS.iter().find(|name| rest.starts_with(*name)) {
        return Some((name.to_string(), name.len()));
    }

    for prefix in CHORD_PREFIXES {
        if let Some(after) = rest.strip_prefix(prefix) {
            if let Some(letter) = after.chars().next().filter(char::is_ascii_alphabetic) {
                let key = format!("C-{}", letter.to_ascii_lowercase());
                return Some((key, prefix.len() + 1));
            }
        }
    }

    None
}
