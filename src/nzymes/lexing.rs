//! Tokenizer for cleaned sequence text
//!
//!     Cleaning leaves no blanks outside of quoted strings, so every character of a sequence
//!     belongs to some token. Quoted strings are lexed whole by a callback, because their only
//!     delimiter is also their closing character and a backslash may escape it.

use logos::{Lexer, Logos};
use std::ops::Range;

/// Tokens of the enzyme language
#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Token {
    #[token("|")]
    Pipe,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("/")]
    Slash,
    #[token("@")]
    At,
    #[token("@@")]
    AtAt,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[regex(r"[0-9]+", |lex| lex.slice().to_string(), priority = 3)]
    Number(String),

    // Slugs, keywords and most of a bare field
    #[regex(r"[\w+~-]+", |lex| lex.slice().to_string())]
    Word(String),

    /// `=...=` including both delimiters
    #[token("=", quoted)]
    Quoted,

    #[regex(r"[\]}]")]
    Close,

    #[regex(r"[^|.:/@()=\]}\w+~-]")]
    Other,

    /// An opening `=` that is never closed
    Invalid,
}

/// Extend a quoted string up to its closing delimiter, skipping escaped characters.
fn quoted(lex: &mut Lexer<Token>) -> bool {
    let mut escaped = false;
    for (offset, ch) in lex.remainder().char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' => {
                lex.bump(offset + ch.len_utf8());
                return true;
            }
            _ => {}
        }
    }
    false
}

impl Token {
    /// True for tokens that can be part of a bare (unquoted) field name.
    pub fn is_field_part(&self) -> bool {
        !matches!(
            self,
            Token::Pipe | Token::Dot | Token::Quoted | Token::Close | Token::Invalid
        )
    }
}

/// Tokenize cleaned sequence text, keeping the byte range of every token.
///
/// Lexing errors come out as [`Token::Invalid`] so the parser can reject them in place.
pub fn tokenize(source: &str) -> Vec<(Token, Range<usize>)> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let token = result.unwrap_or(Token::Invalid);
        tokens.push((token, lexer.span()));
    }

    tokens
}
