use crate::error::Error;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset into the metadata text
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == kw
    }
}

const MULTI_PUNCT: &[&str] = &[":=", "..."];
const SINGLE_PUNCT: &[u8] = b"{}[]();:=,<>.+-*";

/// Splits metadata text into tokens. Comments are dropped, string literals are kept
/// whole (quotes included) so neither can affect brace nesting.
pub(crate) fn tokenize(src: &str) -> Result<Vec<Token<'_>>, Error> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if src[i..].starts_with("/*") {
            let end = src[i + 2..]
                .find("*/")
                .ok_or_else(|| lex_error(src, i, "unterminated comment"))?;
            i += 2 + end + 2;
        } else if src[i..].starts_with("//") {
            i = src[i..].find('\n').map(|n| i + n + 1).unwrap_or(bytes.len());
        } else if c == b'"' {
            let start = i;
            i += 1;
            loop {
                match bytes.get(i) {
                    Some(b'\\') => i += 2,
                    Some(b'"') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                    None => return Err(lex_error(src, start, "unterminated string literal")),
                }
            }
            tokens.push(Token {
                kind: TokenKind::Str,
                text: &src[start..i],
                offset: start,
            });
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: &src[start..i],
                offset: start,
            });
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: &src[start..i],
                offset: start,
            });
        } else if let Some(p) = MULTI_PUNCT.iter().find(|p| src[i..].starts_with(**p)) {
            tokens.push(Token {
                kind: TokenKind::Punct,
                text: &src[i..i + p.len()],
                offset: i,
            });
            i += p.len();
        } else if SINGLE_PUNCT.contains(&c) {
            tokens.push(Token {
                kind: TokenKind::Punct,
                text: &src[i..i + 1],
                offset: i,
            });
            i += 1;
        } else {
            return Err(lex_error(src, i, "unexpected character"));
        }
    }
    Ok(tokens)
}

fn lex_error(src: &str, offset: usize, message: &str) -> Error {
    let line_start = src[..offset].rfind('\n').map(|n| n + 1).unwrap_or(0);
    let line_end = src[offset..]
        .find('\n')
        .map(|n| offset + n)
        .unwrap_or(src.len());
    Error::MetadataSyntax {
        message: format!("{message} at byte {offset}"),
        span: src[line_start..line_end].trim().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn punctuation_and_literals() {
        assert_eq!(
            texts("typealias integer { size = 0x1F; } := uint5_t;"),
            vec![
                "typealias",
                "integer",
                "{",
                "size",
                "=",
                "0x1F",
                ";",
                "}",
                ":=",
                "uint5_t",
                ";"
            ]
        );
        assert_eq!(
            texts("compact = 0...30, \"quoted { label\" = 31"),
            vec![
                "compact",
                "=",
                "0",
                "...",
                "30",
                ",",
                "\"quoted { label\"",
                "=",
                "31"
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            texts("/* CTF 1.8 { */ clock { // freq { \n freq = 1; };"),
            vec!["clock", "{", "freq", "=", "1", ";", "}", ";"]
        );
    }

    #[test]
    fn offsets_point_into_source() {
        let src = "env {\n  hostname = \"box\";\n};";
        let tokens = tokenize(src).unwrap();
        let host = tokens.iter().find(|t| t.kind == TokenKind::Str).unwrap();
        assert_eq!(&src[host.offset..host.end()], "\"box\"");
    }

    #[test]
    fn lexical_errors() {
        assert!(matches!(
            tokenize("clock { /* never closed"),
            Err(Error::MetadataSyntax { message, .. }) if message.contains("unterminated comment")
        ));
        assert!(tokenize("name = \"never closed;").is_err());
        assert!(tokenize("size = 8 @").is_err());
    }
}
