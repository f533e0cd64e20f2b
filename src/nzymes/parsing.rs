//! Sequence parser
//!
//!     Builds a [Sequence] from the tokens of a cleaned sequence. The parser accepts the same
//!     language as the `sequence` rule of the [grammar](super::grammar):
//!
//!         sequence     := enzyme ("|" enzyme)* EOF
//!         enzyme       := (execution | transclusion | literal) &("|" | EOF)
//!         execution    := keyword count | post owner "." call_field
//!         keyword      := "array" | "assoc" | "defer"
//!         count        := "(" number? ")"
//!         transclusion := post owner ("." | ":") field
//!         post         := number | "@@" slug | "@" slug | ε
//!         owner        := "/" "author" | ε
//!         field        := quoted | field_part+
//!         call_field   := quoted count | field_part+ count
//!         literal      := number | quoted
//!
//!     Alternatives are tried in the order execution, transclusion, literal, and each one only
//!     counts when it is followed by a pipe or the end of the text. A bare field whose tokens
//!     end in `(n)` is therefore a call (`.code(2)`), while `(n)` anywhere else in a bare field
//!     is just part of the name.

use chumsky::{prelude::*, Stream};
use std::ops::Range;
use std::sync::Arc;

use super::ast::{
    Enzyme, Execution, Literal, Lookup, Owner, PostRef, Reference, Sequence, Step, Transclusion,
};
use super::lexing::{tokenize, Token};
use super::value::unquote;

/// Type alias for token with location
type TokenSpan = (Token, Range<usize>);

/// Type alias for parser error
type ParserError = Simple<TokenSpan>;

/// A parse failure, located in the cleaned text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {}..{}", span.start, span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
}

impl From<ParserError> for ParseError {
    fn from(error: ParserError) -> Self {
        let message = match error.found() {
            Some((token, _)) => format!("unexpected {:?}", token),
            None => "unexpected end of sequence".to_string(),
        };
        ParseError {
            message,
            span: error.span(),
        }
    }
}

/// Parse the cleaned text of an injection.
pub fn parse_sequence(cleaned: &str) -> Result<Sequence, Vec<ParseError>> {
    let source = Arc::new(cleaned.to_string());
    let tokens = tokenize(cleaned);
    let end = cleaned.len();
    let stream = Stream::from_iter(
        end..end,
        tokens
            .into_iter()
            .map(|(token, span)| ((token, span.clone()), span)),
    );

    let steps = sequence(source)
        .parse(stream)
        .map_err(|errors| errors.into_iter().map(ParseError::from).collect::<Vec<_>>())?;

    Ok(Sequence {
        steps: steps
            .into_iter()
            .map(|(enzyme, span)| Step {
                enzyme,
                source: cleaned.get(span).unwrap_or_default().to_string(),
            })
            .collect(),
    })
}

/// Helper: match a specific token, keeping its location
fn token(t: Token) -> impl Parser<TokenSpan, Range<usize>, Error = ParserError> + Clone {
    filter(move |(tok, _): &TokenSpan| tok == &t).map(|(_, span)| span)
}

fn number() -> impl Parser<TokenSpan, String, Error = ParserError> + Clone {
    filter_map(|span, (token, range): TokenSpan| match token {
        Token::Number(digits) => Ok(digits),
        token => Err(Simple::expected_input_found(
            span,
            Vec::new(),
            Some((token, range)),
        )),
    })
}

fn word(
    expected: &'static [&'static str],
) -> impl Parser<TokenSpan, String, Error = ParserError> + Clone {
    filter_map(move |span, (token, range): TokenSpan| match token {
        Token::Word(word) if expected.contains(&word.as_str()) => Ok(word),
        token => Err(Simple::expected_input_found(
            span,
            Vec::new(),
            Some((token, range)),
        )),
    })
}

/// Digits to a count; the grammar has no upper bound, so counts saturate.
fn count_of(digits: &str) -> usize {
    digits.parse().unwrap_or(usize::MAX)
}

/// Source text covered by a run of tokens.
fn text_of(source: &str, tokens: &[TokenSpan]) -> String {
    match (tokens.first(), tokens.last()) {
        (Some((_, first)), Some((_, last))) => source[first.start..last.end].to_string(),
        _ => String::new(),
    }
}

/// Split a trailing `(n)` off a bare field, if there is one and something precedes it.
fn split_call(source: &str, tokens: &[TokenSpan]) -> Option<(String, usize)> {
    let start = tokens.first()?.1.start;
    let (open, arguments) = match tokens {
        [_, .., (Token::LParen, open), (Token::Number(digits), _), (Token::RParen, _)] => {
            (open.start, count_of(digits))
        }
        [_, .., (Token::LParen, open), (Token::RParen, _)] => (open.start, 0),
        _ => return None,
    };
    Some((source[start..open].to_string(), arguments))
}

fn sequence(
    source: Arc<String>,
) -> impl Parser<TokenSpan, Vec<(Enzyme, Range<usize>)>, Error = ParserError> {
    let terminator = token(Token::Pipe).ignored().or(end()).rewind();

    let count = token(Token::LParen)
        .ignore_then(number().or_not())
        .then_ignore(token(Token::RParen))
        .map(|digits| digits.as_deref().map(count_of).unwrap_or(0));

    let slug = filter_map(|span, (token, range): TokenSpan| match token {
        Token::Word(slug) | Token::Number(slug) => Ok(slug),
        token => Err(Simple::expected_input_found(
            span,
            Vec::new(),
            Some((token, range)),
        )),
    });

    let post = choice((
        number().map(|digits| PostRef::Id(digits.parse().unwrap_or(u64::MAX))),
        token(Token::AtAt)
            .ignore_then(slug.clone())
            .map(PostRef::SlugWithFallback),
        token(Token::At).ignore_then(slug).map(PostRef::Slug),
    ))
    .or_not()
    .map(|post| post.unwrap_or(PostRef::Current));

    let owner = token(Token::Slash)
        .ignore_then(word(&["author"]))
        .to(Owner::Author)
        .or_not()
        .map(|owner| owner.unwrap_or(Owner::Content));

    let address = post.then(owner);

    let quoted = {
        let source = source.clone();
        token(Token::Quoted).map(move |span| unquote(&source[span]))
    };

    let bare = filter(|(token, _): &TokenSpan| token.is_field_part())
        .repeated()
        .at_least(1);

    let field = {
        let source = source.clone();
        choice((
            quoted.clone(),
            bare.clone().map(move |tokens| text_of(&source, &tokens)),
        ))
    };

    let call_field = {
        let source = source.clone();
        choice((
            quoted.clone().then(count.clone()),
            bare.try_map(move |tokens, span| {
                split_call(&source, &tokens)
                    .ok_or_else(|| Simple::custom(span, "expected an argument count"))
            }),
        ))
    };

    let keyword_call = word(&["array", "assoc", "defer"])
        .then(count.clone())
        .map(|(keyword, n)| match keyword.as_str() {
            "array" => Execution::Array(n),
            "assoc" => Execution::Assoc(n),
            _ => Execution::Defer(i32::try_from(n).unwrap_or(i32::MAX)),
        });

    let field_call = address
        .clone()
        .then_ignore(token(Token::Dot))
        .then(call_field)
        .map(|((post, owner), (field, arguments))| Execution::Call {
            reference: Reference { post, owner, field },
            arguments,
        });

    let execution =
        choice((keyword_call, field_call)).map(|execution| Enzyme::Execution { execution });

    let lookup = choice((
        token(Token::Dot).to(Lookup::Field),
        token(Token::Colon).to(Lookup::Attribute),
    ));

    let transclusion = address
        .then(lookup)
        .then(field)
        .map(|(((post, owner), lookup), field)| {
            Enzyme::Transclusion(Transclusion {
                lookup,
                reference: Reference { post, owner, field },
            })
        });

    let literal = choice((
        number().map(|digits| Literal::Integer(digits.parse().unwrap_or(i64::MAX))),
        quoted.map(Literal::Text),
    ))
    .map(|literal| Enzyme::Literal { literal });

    let enzyme = choice((
        execution.then_ignore(terminator.clone()),
        transclusion.then_ignore(terminator.clone()),
        literal.then_ignore(terminator),
    ))
    .map_with_span(|enzyme, span| (enzyme, span));

    enzyme
        .separated_by(token(Token::Pipe))
        .at_least(1)
        .then_ignore(end())
}
