use crate::error::{CompilerError, Result, Span};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until},
    character::complete::{
        alpha1, alphanumeric1, anychar, char, digit0, digit1, hex_digit1, multispace1, not_line_ending, one_of,
        satisfy,
    },
    combinator::{map, not, opt, recognize, value, verify},
    multi::many0,
    sequence::{pair, preceded, terminated, tuple},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Struct,
    Uniform,
    Layout,

    // Identifiers and literals
    Identifier(String),
    IntLiteral(u64),
    /// Any other numeric literal; only its text is kept.
    Number(String),

    // Delimiters
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Semicolon,
    Comma,

    /// Operator or other punctuation outside the declaration grammar.
    Symbol(char),

    // Skipped
    Comment,
    Directive(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

fn parse_line_comment(input: &str) -> IResult<&str, Token> {
    value(Token::Comment, preceded(tag("//"), not_line_ending))(input)
}

fn parse_block_comment(input: &str) -> IResult<&str, Token> {
    value(Token::Comment, tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn parse_directive(input: &str) -> IResult<&str, Token> {
    map(preceded(char('#'), not_line_ending), |s: &str| {
        Token::Directive(s.trim().to_string())
    })(input)
}

fn identifier_char(input: &str) -> IResult<&str, char> {
    satisfy(|c| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn parse_keyword(input: &str) -> IResult<&str, Token> {
    // Keywords must end at a word boundary: `structure` is an identifier.
    let keyword = |kw: &'static str, token: Token| {
        map(terminated(tag(kw), not(identifier_char)), move |_| token.clone())
    };

    alt((
        keyword("struct", Token::Struct),
        keyword("uniform", Token::Uniform),
        keyword("layout", Token::Layout),
    ))(input)
}

fn parse_identifier(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| Token::Identifier(s.to_string()),
    )(input)
}

fn parse_hex_literal(input: &str) -> IResult<&str, Token> {
    map(
        terminated(preceded(tag_no_case("0x"), hex_digit1), opt(one_of("uU"))),
        |digits: &str| match u64::from_str_radix(digits, 16) {
            Ok(n) => Token::IntLiteral(n),
            Err(_) => Token::Number(format!("0x{}", digits)),
        },
    )(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn parse_float_literal(input: &str) -> IResult<&str, Token> {
    map(
        recognize(tuple((
            alt((
                recognize(tuple((digit1, char('.'), digit0))),
                recognize(pair(char('.'), digit1)),
                // 1e5 has no dot but is still a float
                recognize(pair(digit1, exponent)),
            )),
            opt(exponent),
            opt(alt((tag_no_case("lf"), tag_no_case("f")))),
        ))),
        |s: &str| Token::Number(s.to_string()),
    )(input)
}

fn parse_int_literal(input: &str) -> IResult<&str, Token> {
    map(terminated(digit1, opt(one_of("uU"))), |s: &str| match s.parse() {
        Ok(n) => Token::IntLiteral(n),
        Err(_) => Token::Number(s.to_string()),
    })(input)
}

fn parse_delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LeftBrace, char('{')),
        value(Token::RightBrace, char('}')),
        value(Token::LeftBracket, char('[')),
        value(Token::RightBracket, char(']')),
        value(Token::LeftParen, char('(')),
        value(Token::RightParen, char(')')),
        value(Token::Semicolon, char(';')),
        value(Token::Comma, char(',')),
    ))(input)
}

fn parse_symbol(input: &str) -> IResult<&str, Token> {
    map(verify(anychar, |c: &char| c.is_ascii_punctuation()), Token::Symbol)(input)
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((
        parse_line_comment,
        parse_block_comment,
        parse_directive,
        parse_keyword,
        parse_identifier,
        parse_hex_literal,
        parse_float_literal,
        parse_int_literal,
        parse_delimiter,
        parse_symbol,
    ))(input)
}

/// Move `span` past `consumed`.
fn advance_span(span: &mut Span, consumed: &str) {
    for c in consumed.chars() {
        if c == '\n' {
            span.line += 1;
            span.column = 1;
        } else {
            span.column += 1;
        }
    }
}

/// Split shader source into tokens, dropping comments and preprocessor lines.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>> {
    let mut remaining = input;
    let mut tokens = Vec::new();
    let mut span = Span::new(1, 1);

    while !remaining.is_empty() {
        // Skip leading whitespace
        if let Ok((rest, skipped)) = multispace1::<&str, nom::error::Error<&str>>(remaining) {
            advance_span(&mut span, skipped);
            remaining = rest;
            continue;
        }

        match parse_token(remaining) {
            Ok((rest, token)) => {
                let start = span;
                advance_span(&mut span, &remaining[..remaining.len() - rest.len()]);
                remaining = rest;

                if !matches!(token, Token::Comment | Token::Directive(_)) {
                    tokens.push(SpannedToken { token, span: start });
                }
            }
            Err(_) => {
                let found = remaining.chars().next().unwrap_or_default();
                return Err(CompilerError::ParseError(
                    format!("unexpected character {:?}", found),
                    Some(span),
                ));
            }
        }
    }

    Ok(tokens)
}
