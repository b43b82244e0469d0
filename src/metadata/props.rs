use crate::error::Error;

/// The `key = value;` entries of a metadata block, e.g. `integer { size = 32; align = 8; }`.
///
/// Values are kept as raw text; string values keep their quotes until read with
/// [`Properties::get_string`].
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Properties {
    entries: Vec<(String, String)>,
    span: String,
}

impl Properties {
    pub(crate) fn new<S: Into<String>>(span: S) -> Self {
        Properties {
            entries: Vec::new(),
            span: span.into(),
        }
    }

    pub(crate) fn push(&mut self, key: String, value: String) {
        self.entries.push((key, value));
    }

    /// Raw text of the last entry for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i128>, Error> {
        self.get(key)
            .map(|v| {
                parse_int_literal(v)
                    .ok_or_else(|| self.error(format!("property '{key}' = '{v}' is not an integer")))
            })
            .transpose()
    }

    pub fn require_int(&self, key: &str) -> Result<i128, Error> {
        self.get_int(key)?
            .ok_or_else(|| self.error(format!("missing required property '{key}'")))
    }

    /// Like [`Properties::get_int`], also checking the value fits in `T`
    pub fn get_int_as<T: TryFrom<i128>>(&self, key: &str) -> Result<Option<T>, Error> {
        self.get_int(key)?
            .map(|v| {
                T::try_from(v)
                    .map_err(|_| self.error(format!("property '{key}' = {v} is out of range")))
            })
            .transpose()
    }

    /// Accepts `0`/`1`/`true`/`false`
    pub fn get_boolean(&self, key: &str) -> Result<Option<bool>, Error> {
        self.get(key)
            .map(|v| match strip_quotes(v).to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(true),
                "0" | "false" | "no" => Ok(false),
                _ => Err(self.error(format!("property '{key}' = '{v}' is not a boolean"))),
            })
            .transpose()
    }

    /// Value with its surrounding quotes stripped
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| unescape(strip_quotes(v)))
    }

    pub(crate) fn error<S: Into<String>>(&self, message: S) -> Error {
        Error::MetadataSyntax {
            message: message.into(),
            span: self.span.clone(),
        }
    }
}

pub(crate) fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn unescape(s: &str) -> String {
    if !s.contains('\\') {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parses a C-style integer literal: decimal, `0x` hex, `0b` binary or leading-zero octal,
/// with an optional sign and `u`/`l` suffixes.
pub(crate) fn parse_int_literal(s: &str) -> Option<i128> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s.strip_prefix('+').unwrap_or(s).trim_start()),
    };
    let s = s.trim_end_matches(['u', 'U', 'l', 'L']);
    if s.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        i128::from_str_radix(bin, 2).ok()?
    } else if s.len() > 1 && s.starts_with('0') {
        i128::from_str_radix(&s[1..], 8).ok()?
    } else {
        s.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn props(entries: &[(&str, &str)]) -> Properties {
        let mut p = Properties::new("integer { ... }");
        for (k, v) in entries {
            p.push(k.to_string(), v.to_string());
        }
        p
    }

    #[test]
    fn int_literals() {
        assert_eq!(parse_int_literal("32"), Some(32));
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("010"), Some(8));
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("-5"), Some(-5));
        assert_eq!(parse_int_literal("- 5"), Some(-5));
        assert_eq!(parse_int_literal("1000000000ULL"), Some(1_000_000_000));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("le"), None);
        assert_eq!(parse_int_literal(""), None);
    }

    #[test]
    fn typed_accessors() {
        let p = props(&[
            ("size", "32"),
            ("signed", "true"),
            ("align", "8"),
            ("signed_num", "0"),
            ("name", "\"monotonic\""),
            ("size", "64"),
        ]);
        assert_eq!(p.require_int("size").unwrap(), 64);
        assert_eq!(p.get_int_as::<u32>("align").unwrap(), Some(8));
        assert_eq!(p.get_boolean("signed").unwrap(), Some(true));
        assert_eq!(p.get_boolean("signed_num").unwrap(), Some(false));
        assert_eq!(p.get_string("name").as_deref(), Some("monotonic"));
        assert_eq!(p.get_int("missing").unwrap(), None);
    }

    #[test]
    fn malformed_values_are_errors() {
        let p = props(&[("size", "big"), ("signed", "maybe"), ("align", "-8")]);
        assert!(matches!(
            p.get_int("size"),
            Err(Error::MetadataSyntax { message, span }) if message.contains("size") && span == "integer { ... }"
        ));
        assert!(p.get_boolean("signed").is_err());
        assert!(p.get_int_as::<u32>("align").is_err());
        assert!(p.require_int("missing").is_err());
    }
}
