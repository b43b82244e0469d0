//! Recursive descent parser for the CTF metadata language.
//!
//! The output is a flat list of [`Declaration`]s whose types still hold named references;
//! [`crate::metadata::Metadata::link`] resolves them.

use crate::error::Error;
use crate::metadata::lexer::{tokenize, Token, TokenKind};
use crate::metadata::props::{parse_int_literal, strip_quotes, Properties};
use crate::metadata::ty::{
    ArrayLength, ArrayType, ByteOrder, Encoding, EnumMapping, EnumType, Field, FloatType,
    IntegerType, MetadataType, StringType, StructType, VariantType,
};
use crate::metadata::{Clock, EnvValue, Environment};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest declaration excerpt carried by a syntax error
const MAX_SPAN_LEN: usize = 256;

#[derive(Clone, PartialEq, Debug)]
pub enum Declaration {
    Trace(TraceDecl),
    Clock(Clock),
    Environment(Environment),
    TypeAlias { name: String, ty: MetadataType },
    Struct { name: String, ty: Arc<StructType> },
    Stream(StreamDecl),
    Event(EventDecl),
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct TraceDecl {
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub uuid: Option<Uuid>,
    pub byte_order: Option<ByteOrder>,
    pub packet_header: Option<MetadataType>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct StreamDecl {
    pub id: u64,
    pub event_header: Option<MetadataType>,
    pub packet_context: Option<MetadataType>,
    pub event_context: Option<MetadataType>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct EventDecl {
    pub id: u64,
    pub name: String,
    pub stream_id: u64,
    pub log_level: Option<i64>,
    pub model_emf_uri: Option<String>,
    pub context: Option<MetadataType>,
    pub fields: Option<MetadataType>,
}

/// The entries of a `trace`/`stream`/`event`/`clock`/`env` block
struct Block {
    props: Properties,
    types: Vec<(String, MetadataType)>,
}

impl Block {
    fn take_type(&mut self, key: &str) -> Option<MetadataType> {
        let idx = self.types.iter().position(|(k, _)| k == key)?;
        Some(self.types.remove(idx).1)
    }
}

/// Parses a whole metadata document into its declarations, in document order.
///
/// Named types defined inline (e.g. `struct foo { ... } bar;` inside another struct) are
/// emitted as their own declaration right before the one containing them.
pub fn parse_metadata(text: &str) -> Result<Vec<Declaration>, Error> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        src: text,
        tokens,
        pos: 0,
        decl_start: 0,
        hoisted: Vec::new(),
    };
    let mut decls = Vec::new();
    while let Some(tok) = parser.peek() {
        parser.decl_start = tok.offset;
        let decl = parser.declaration()?;
        decls.append(&mut parser.hoisted);
        decls.extend(decl);
    }
    debug!(declarations = decls.len(), "Parsed CTF metadata");
    Ok(decls)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    decl_start: usize,
    hoisted: Vec<Declaration>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + n).copied()
    }

    fn next(&mut self) -> Result<Token<'a>, Error> {
        let tok = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of metadata"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn at_punct(&self, p: &str) -> bool {
        self.peek().map(|t| t.is_punct(p)).unwrap_or(false)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek().map(|t| t.is_keyword(kw)).unwrap_or(false)
    }

    fn at_ident(&self) -> bool {
        self.peek().map(|t| t.is_ident()).unwrap_or(false)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), Error> {
        let tok = self.next()?;
        if tok.is_punct(p) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{p}', found '{}'", tok.text)))
        }
    }

    fn expect_ident(&mut self) -> Result<&'a str, Error> {
        let tok = self.next()?;
        if tok.is_ident() {
            Ok(tok.text)
        } else {
            Err(self.error(format!("expected an identifier, found '{}'", tok.text)))
        }
    }

    /// `ident(.ident)*`
    fn path(&mut self) -> Result<String, Error> {
        let mut path = self.expect_ident()?.to_owned();
        while self.at_punct(".") && self.peek_at(1).map(|t| t.is_ident()).unwrap_or(false) {
            self.pos += 1;
            path.push('.');
            path.push_str(self.expect_ident()?);
        }
        Ok(path)
    }

    fn signed_int(&mut self) -> Result<i128, Error> {
        let negative = self.eat_punct("-");
        let tok = self.next()?;
        let v = match tok.kind {
            TokenKind::Number => parse_int_literal(tok.text),
            _ => None,
        }
        .ok_or_else(|| self.error(format!("expected an integer, found '{}'", tok.text)))?;
        Ok(if negative { -v } else { v })
    }

    fn error<S: Into<String>>(&self, message: S) -> Error {
        let end = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.end())
            .unwrap_or(self.src.len())
            .max(self.decl_start);
        let mut span_end = end.min(self.decl_start + MAX_SPAN_LEN);
        while !self.src.is_char_boundary(span_end) {
            span_end -= 1;
        }
        Error::MetadataSyntax {
            message: message.into(),
            span: self.src[self.decl_start..span_end].trim().to_owned(),
        }
    }

    fn span_from(&self, start: usize) -> &'a str {
        let end = self.tokens[..self.pos]
            .last()
            .map(|t| t.end())
            .unwrap_or(start)
            .max(start);
        &self.src[start..end]
    }

    fn declaration(&mut self) -> Result<Option<Declaration>, Error> {
        let tok = self.next()?;
        if !tok.is_ident() {
            return Err(self.error(format!("expected a declaration, found '{}'", tok.text)));
        }
        let decl = match tok.text {
            "typealias" => {
                let ty = self.type_spec(false)?;
                self.expect_punct(":=")?;
                let name = self.type_name()?;
                self.expect_punct(";")?;
                Some(Declaration::TypeAlias { name, ty })
            }
            "typedef" => {
                let ty = self.type_spec(true)?;
                let mut aliases = self.declarators(&ty)?;
                self.expect_punct(";")?;
                let last = aliases.pop().map(|f| Declaration::TypeAlias {
                    name: f.name,
                    ty: f.ty,
                });
                self.hoisted.extend(
                    aliases
                        .into_iter()
                        .map(|f| Declaration::TypeAlias { name: f.name, ty: f.ty }),
                );
                last
            }
            "trace" => {
                let block = self.block()?;
                Some(Declaration::Trace(self.trace_decl(block)?))
            }
            "env" => {
                let block = self.block()?;
                Some(Declaration::Environment(env_decl(block)))
            }
            "clock" => {
                let block = self.block()?;
                Some(Declaration::Clock(self.clock_decl(block)?))
            }
            "stream" => {
                let block = self.block()?;
                Some(Declaration::Stream(self.stream_decl(block)?))
            }
            "event" => {
                let block = self.block()?;
                Some(Declaration::Event(self.event_decl(block)?))
            }
            "callsite" => {
                let _ = self.block()?;
                debug!("Ignoring callsite declaration");
                None
            }
            "struct" | "enum" | "variant" => {
                // Named type definitions register themselves while being parsed
                self.pos -= 1;
                let _ = self.type_spec(false)?;
                self.expect_punct(";")?;
                None
            }
            other => return Err(self.error(format!("unknown directive '{other}'"))),
        };
        Ok(decl)
    }

    /// `{ (key = value; | key := type;)* };`
    fn block(&mut self) -> Result<Block, Error> {
        let start = self.peek().map(|t| t.offset).unwrap_or(self.src.len());
        self.expect_punct("{")?;
        let mut props = Properties::default();
        let mut types = Vec::new();
        while !self.eat_punct("}") {
            let key = self.path()?;
            if self.eat_punct(":=") {
                let ty = self.type_spec(false)?;
                types.push((key, ty));
            } else if self.eat_punct("=") {
                props.push(key, self.value_text()?);
            } else {
                let found = self.peek().map(|t| t.text).unwrap_or("end of metadata");
                return Err(self.error(format!(
                    "expected '=' or ':=' after '{key}', found '{found}'"
                )));
            }
            self.expect_punct(";")?;
        }
        self.eat_punct(";");
        let mut props_with_span = Properties::new(self.span_from(start));
        for (k, v) in props.entries() {
            props_with_span.push(k.to_owned(), v.to_owned());
        }
        Ok(Block {
            props: props_with_span,
            types,
        })
    }

    /// Raw text up to the next `;`
    fn value_text(&mut self) -> Result<String, Error> {
        let first = self.next()?;
        let mut end = first.end();
        if first.is_punct(";") || first.is_punct("}") {
            return Err(self.error("missing property value"));
        }
        while let Some(tok) = self.peek() {
            if tok.is_punct(";") || tok.is_punct("}") {
                break;
            }
            end = tok.end();
            self.pos += 1;
        }
        Ok(self.src[first.offset..end].trim().to_owned())
    }

    /// `{ key = value; ... }` for integer/floating_point/string bodies
    fn properties(&mut self) -> Result<Properties, Error> {
        let start = self.peek().map(|t| t.offset).unwrap_or(self.src.len());
        self.expect_punct("{")?;
        let mut entries = Vec::new();
        while !self.eat_punct("}") {
            let key = self.path()?;
            self.expect_punct("=")?;
            let value = self.value_text()?;
            entries.push((key, value));
            if !self.eat_punct(";") && !self.at_punct("}") {
                return Err(self.error("expected ';' after property"));
            }
        }
        let mut props = Properties::new(self.span_from(start));
        for (k, v) in entries {
            props.push(k, v);
        }
        Ok(props)
    }

    /// Multi-word type name such as `unsigned long`
    fn type_name(&mut self) -> Result<String, Error> {
        let mut words = vec![self.expect_ident()?];
        while self.at_ident() {
            words.push(self.expect_ident()?);
        }
        Ok(words.join(" "))
    }

    /// Parses a type specifier. When `declarator_follows` is set, the last identifier of a
    /// bare type name belongs to the declarator (`unsigned long _x;`).
    fn type_spec(&mut self, declarator_follows: bool) -> Result<MetadataType, Error> {
        let tok = self
            .peek()
            .ok_or_else(|| self.error("expected a type, found end of metadata"))?;
        if !tok.is_ident() {
            return Err(self.error(format!("expected a type, found '{}'", tok.text)));
        }
        match tok.text {
            "integer" => {
                self.pos += 1;
                let props = self.properties()?;
                Ok(MetadataType::Integer(integer_from_props(&props)?))
            }
            "floating_point" => {
                self.pos += 1;
                let props = self.properties()?;
                Ok(MetadataType::Float(float_from_props(&props)?))
            }
            "string" => {
                self.pos += 1;
                let encoding = if self.at_punct("{") {
                    let props = self.properties()?;
                    match props.get_string("encoding") {
                        Some(e) => match Encoding::parse(&e) {
                            Some(Encoding::None) | None => {
                                return Err(props.error(format!("invalid string encoding '{e}'")))
                            }
                            Some(e) => e,
                        },
                        None => Encoding::Utf8,
                    }
                } else {
                    Encoding::Utf8
                };
                Ok(MetadataType::String(StringType { encoding }))
            }
            "struct" => self.struct_spec(),
            "enum" => self.enum_spec(),
            "variant" => self.variant_spec(),
            _ => {
                let mut words = vec![self.expect_ident()?];
                loop {
                    let more = match (self.peek(), self.peek_at(1)) {
                        (Some(a), Some(b)) if a.is_ident() && declarator_follows => b.is_ident(),
                        (Some(a), _) if !declarator_follows => a.is_ident(),
                        _ => false,
                    };
                    if !more {
                        break;
                    }
                    words.push(self.expect_ident()?);
                }
                Ok(MetadataType::UnresolvedRef(words.join(" ")))
            }
        }
    }

    /// Name of an inline named type, if present
    fn optional_type_tag(&mut self) -> Option<&'a str> {
        match self.peek() {
            Some(t) if t.is_ident() && t.text != "align" => {
                self.pos += 1;
                Some(t.text)
            }
            _ => None,
        }
    }

    fn struct_spec(&mut self) -> Result<MetadataType, Error> {
        self.pos += 1;
        let name = if self.at_punct("{") {
            None
        } else {
            self.optional_type_tag()
        };
        if !self.at_punct("{") {
            let name = name.ok_or_else(|| self.error("anonymous struct without a body"))?;
            return Ok(MetadataType::UnresolvedRef(format!("struct {name}")));
        }
        let fields = self.field_list()?;
        let mut align = 1;
        if self.at_keyword("align") && self.peek_at(1).map(|t| t.is_punct("(")).unwrap_or(false) {
            self.pos += 2;
            let a = self.signed_int()?;
            self.expect_punct(")")?;
            align = alignment(a).ok_or_else(|| self.error(format!("invalid alignment {a}")))?;
        }
        let ty = Arc::new(StructType::new(fields, align));
        if let Some(name) = name {
            self.hoisted.push(Declaration::Struct {
                name: format!("struct {name}"),
                ty: ty.clone(),
            });
        }
        Ok(MetadataType::Struct(ty))
    }

    fn enum_spec(&mut self) -> Result<MetadataType, Error> {
        self.pos += 1;
        let name = if self.at_punct(":") || self.at_punct("{") {
            None
        } else {
            self.optional_type_tag()
        };
        let base = if self.eat_punct(":") {
            Some(self.type_spec(false)?)
        } else {
            None
        };
        if !self.at_punct("{") {
            let name = name.ok_or_else(|| self.error("anonymous enum without a body"))?;
            return Ok(MetadataType::UnresolvedRef(format!("enum {name}")));
        }
        self.expect_punct("{")?;
        let mut mappings = Vec::new();
        let mut next_value: i128 = 0;
        while !self.eat_punct("}") {
            let tok = self.next()?;
            let label = match tok.kind {
                TokenKind::Ident => tok.text,
                TokenKind::Str => strip_quotes(tok.text),
                _ => return Err(self.error(format!("invalid enumeration label '{}'", tok.text))),
            };
            let (begin, end) = if self.eat_punct("=") {
                let begin = self.signed_int()?;
                let end = if self.eat_punct("...") {
                    self.signed_int()?
                } else {
                    begin
                };
                (begin, end)
            } else {
                (next_value, next_value)
            };
            if end < begin {
                return Err(self.error(format!(
                    "enumeration range {begin} ... {end} for '{label}' is reversed"
                )));
            }
            next_value = end + 1;
            mappings.push(EnumMapping {
                label: label.into(),
                begin,
                end,
            });
            if !self.eat_punct(",") && !self.at_punct("}") {
                return Err(self.error("expected ',' between enumeration entries"));
            }
        }
        let ty = MetadataType::Enum(EnumType {
            base: Box::new(base.unwrap_or_else(|| MetadataType::UnresolvedRef("int".to_owned()))),
            mappings,
        });
        if let Some(name) = name {
            self.hoisted.push(Declaration::TypeAlias {
                name: format!("enum {name}"),
                ty: ty.clone(),
            });
        }
        Ok(ty)
    }

    fn variant_spec(&mut self) -> Result<MetadataType, Error> {
        self.pos += 1;
        let name = if self.at_punct("<") || self.at_punct("{") {
            None
        } else {
            self.optional_type_tag()
        };
        let tag = if self.eat_punct("<") {
            let tag = self.path()?;
            self.expect_punct(">")?;
            Some(tag)
        } else {
            None
        };
        if !self.at_punct("{") {
            let name = name.ok_or_else(|| self.error("anonymous variant without a body"))?;
            if tag.is_some() {
                return Err(Error::UnsupportedFeature(format!(
                    "re-tagging the named variant '{name}'"
                )));
            }
            return Ok(MetadataType::UnresolvedRef(format!("variant {name}")));
        }
        let options = self.field_list()?;
        let ty = MetadataType::Variant(Arc::new(VariantType::new(tag, options)));
        if let Some(name) = name {
            self.hoisted.push(Declaration::TypeAlias {
                name: format!("variant {name}"),
                ty: ty.clone(),
            });
        }
        Ok(ty)
    }

    /// `{ type declarator; ... }`
    fn field_list(&mut self) -> Result<Vec<Field>, Error> {
        self.expect_punct("{")?;
        let mut fields = Vec::new();
        while !self.eat_punct("}") {
            if self.at_keyword("typealias") || self.at_keyword("typedef") {
                if let Some(decl) = self.declaration()? {
                    self.hoisted.push(decl);
                }
                continue;
            }
            let ty = self.type_spec(true)?;
            if self.eat_punct(";") {
                // A bare named type definition inside a struct body
                continue;
            }
            fields.extend(self.declarators(&ty)?);
            self.expect_punct(";")?;
        }
        Ok(fields)
    }

    /// `name[len][len], other, ...`
    fn declarators(&mut self, ty: &MetadataType) -> Result<Vec<Field>, Error> {
        let mut fields = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let mut lengths = Vec::new();
            while self.eat_punct("[") {
                let tok = self
                    .peek()
                    .ok_or_else(|| self.error("unterminated array length"))?;
                let length = match tok.kind {
                    TokenKind::Number => {
                        self.pos += 1;
                        let len = parse_int_literal(tok.text)
                            .and_then(|v| u64::try_from(v).ok())
                            .ok_or_else(|| {
                                self.error(format!("invalid array length '{}'", tok.text))
                            })?;
                        ArrayLength::Fixed(len)
                    }
                    TokenKind::Ident => ArrayLength::Field(self.path()?),
                    _ => {
                        return Err(self.error(format!("invalid array length '{}'", tok.text)))
                    }
                };
                self.expect_punct("]")?;
                lengths.push(length);
            }
            let ty = lengths
                .into_iter()
                .rev()
                .fold(ty.clone(), |element, length| {
                    MetadataType::Array(ArrayType {
                        element: Box::new(element),
                        length,
                    })
                });
            fields.push(Field::new(name, ty));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(fields)
    }

    fn trace_decl(&self, mut block: Block) -> Result<TraceDecl, Error> {
        let props = &block.props;
        let uuid = props
            .get_string("uuid")
            .map(|u| {
                Uuid::parse_str(&u).map_err(|e| props.error(format!("invalid trace UUID: {e}")))
            })
            .transpose()?;
        let byte_order = props
            .get_string("byte_order")
            .map(|b| match ByteOrder::parse(&b) {
                Ok(Some(bo)) => Ok(bo),
                _ => Err(props.error(format!("invalid trace byte order '{b}'"))),
            })
            .transpose()?;
        let decl = TraceDecl {
            major: props.get_int_as("major")?,
            minor: props.get_int_as("minor")?,
            uuid,
            byte_order,
            packet_header: block.take_type("packet.header"),
        };
        for (key, _) in block.types.iter() {
            warn!("Ignoring unknown trace type entry '{key}'");
        }
        Ok(decl)
    }

    fn clock_decl(&self, block: Block) -> Result<Clock, Error> {
        let props = &block.props;
        let uuid = props
            .get_string("uuid")
            .map(|u| {
                Uuid::parse_str(&u).map_err(|e| props.error(format!("invalid clock UUID: {e}")))
            })
            .transpose()?;
        let name = props
            .get_string("name")
            .ok_or_else(|| props.error("clock without a name"))?;
        let freq = props.get_int_as::<u64>("freq")?.unwrap_or(1_000_000_000);
        if freq == 0 {
            return Err(props.error("clock frequency must not be zero"));
        }
        Ok(Clock {
            name,
            uuid,
            description: props.get_string("description"),
            frequency: freq,
            offset: props.get_int_as("offset")?.unwrap_or(0),
            offset_seconds: props.get_int_as("offset_s")?.unwrap_or(0),
            precision: props.get_int_as("precision")?.unwrap_or(0),
            absolute: props.get_boolean("absolute")?.unwrap_or(false),
        })
    }

    fn stream_decl(&self, mut block: Block) -> Result<StreamDecl, Error> {
        let decl = StreamDecl {
            id: block.props.get_int_as("id")?.unwrap_or(0),
            event_header: block.take_type("event.header"),
            packet_context: block.take_type("packet.context"),
            event_context: block.take_type("event.context"),
        };
        for (key, _) in block.types.iter() {
            warn!("Ignoring unknown stream type entry '{key}'");
        }
        Ok(decl)
    }

    fn event_decl(&self, mut block: Block) -> Result<EventDecl, Error> {
        let props = &block.props;
        let decl = EventDecl {
            id: props.get_int_as("id")?.unwrap_or(0),
            name: props
                .get_string("name")
                .ok_or_else(|| props.error("event without a name"))?,
            stream_id: props.get_int_as("stream_id")?.unwrap_or(0),
            log_level: props.get_int_as("loglevel")?,
            model_emf_uri: props.get_string("model.emf.uri"),
            context: None,
            fields: None,
        };
        Ok(EventDecl {
            context: block.take_type("context"),
            fields: block.take_type("fields"),
            ..decl
        })
    }
}

fn env_decl(block: Block) -> Environment {
    let entries = block
        .props
        .entries()
        .map(|(k, v)| {
            let value = match parse_int_literal(v).and_then(|i| i64::try_from(i).ok()) {
                Some(i) if !v.starts_with('"') => EnvValue::Integer(i),
                _ => EnvValue::String(block.props.get_string(k).unwrap_or_default()),
            };
            (k.to_owned(), value)
        })
        .collect();
    Environment::new(entries)
}

fn alignment(a: i128) -> Option<u32> {
    u32::try_from(a).ok().filter(|a| a.is_power_of_two())
}

fn integer_from_props(props: &Properties) -> Result<IntegerType, Error> {
    let size = props.require_int("size")?;
    if size > 64 {
        return Err(Error::UnsupportedFeature(format!(
            "integers wider than 64 bits (size = {size})"
        )));
    }
    let size = u32::try_from(size)
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| props.error(format!("invalid integer size {size}")))?;
    let align = match props.get_int("align")? {
        Some(a) => alignment(a).ok_or_else(|| props.error(format!("invalid alignment {a}")))?,
        None if size % 8 == 0 => 8,
        None => 1,
    };
    let byte_order = match props.get_string("byte_order") {
        Some(b) => ByteOrder::parse(&b)
            .map_err(|_| props.error(format!("invalid byte order '{b}'")))?,
        None => None,
    };
    let encoding = match props.get_string("encoding") {
        Some(e) => {
            Encoding::parse(&e).ok_or_else(|| props.error(format!("invalid encoding '{e}'")))?
        }
        None => Encoding::None,
    };
    let base = match props.get_string("base") {
        Some(b) => match b.as_str() {
            "decimal" | "dec" | "d" | "i" | "u" => 10,
            "hexadecimal" | "hex" | "x" | "X" | "p" => 16,
            "octal" | "oct" | "o" => 8,
            "binary" | "b" => 2,
            other => parse_int_literal(other)
                .and_then(|b| u32::try_from(b).ok())
                .filter(|b| matches!(b, 2 | 8 | 10 | 16))
                .ok_or_else(|| props.error(format!("invalid integer base '{other}'")))?,
        },
        None => 10,
    };
    Ok(IntegerType {
        size,
        align,
        signed: props.get_boolean("signed")?.unwrap_or(false),
        byte_order,
        encoding,
        base,
        map: props.get("map").map(|m| m.to_owned()),
    })
}

fn float_from_props(props: &Properties) -> Result<FloatType, Error> {
    let exp_dig = props
        .get_int_as::<u32>("exp_dig")?
        .ok_or_else(|| props.error("missing required property 'exp_dig'"))?;
    let mant_dig = props
        .get_int_as::<u32>("mant_dig")?
        .ok_or_else(|| props.error("missing required property 'mant_dig'"))?;
    if exp_dig + mant_dig > 64 {
        return Err(Error::UnsupportedFeature(format!(
            "floating point values wider than 64 bits ({exp_dig} + {mant_dig})"
        )));
    }
    let align = match props.get_int("align")? {
        Some(a) => alignment(a).ok_or_else(|| props.error(format!("invalid alignment {a}")))?,
        None => 8,
    };
    let byte_order = match props.get_string("byte_order") {
        Some(b) => ByteOrder::parse(&b)
            .map_err(|_| props.error(format!("invalid byte order '{b}'")))?,
        None => None,
    };
    Ok(FloatType {
        exp_dig,
        mant_dig,
        align,
        byte_order,
    })
}
