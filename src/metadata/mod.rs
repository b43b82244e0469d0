//! CTF metadata: parsing the textual schema and linking it into an immutable [`Metadata`].

use crate::error::Error;
use crate::types::LogLevel;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub use packetized::read_metadata_text;
pub use parser::{parse_metadata, Declaration, EventDecl, StreamDecl, TraceDecl};
pub use props::Properties;
pub use ty::{
    ArrayLength, ArrayType, ByteOrder, Encoding, EnumMapping, EnumType, Field, FloatType,
    IntegerType, MetadataType, StringType, StructType, VariantType,
};

pub(crate) mod lexer;
pub mod packetized;
pub(crate) mod parser;
pub(crate) mod props;
pub mod ty;

/// Guards against absurd ids turning into huge tables
const MAX_STREAM_ID: u64 = u16::MAX as u64;
const MAX_EVENT_ID: u64 = 1 << 20;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Clock {
    pub name: String,
    pub uuid: Option<Uuid>,
    pub description: Option<String>,
    /// Hz
    pub frequency: u64,
    /// Offset from the origin, in cycles
    pub offset: i64,
    /// Offset from the origin, in seconds
    pub offset_seconds: i64,
    pub precision: u64,
    /// Whether the origin is the Unix epoch
    pub absolute: bool,
}

impl Clock {
    /// Converts a clock value into nanoseconds from the clock's origin
    pub fn cycles_to_ns(&self, cycles: u64) -> i128 {
        let freq = i128::from(self.frequency.max(1));
        let to_ns = |c: i128| {
            if freq == 1_000_000_000 {
                c
            } else {
                c * 1_000_000_000 / freq
            }
        };
        to_ns(i128::from(cycles) + i128::from(self.offset))
            + i128::from(self.offset_seconds) * 1_000_000_000
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum EnvValue {
    Integer(i64),
    String(String),
}

impl std::fmt::Display for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvValue::Integer(i) => write!(f, "{i}"),
            EnvValue::String(s) => f.write_str(s),
        }
    }
}

/// The `env` block, entries kept in declaration order
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Environment {
    entries: Vec<(String, EnvValue)>,
}

impl Environment {
    pub fn new(entries: Vec<(String, EnvValue)>) -> Self {
        Environment { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            EnvValue::String(s) => Some(s),
            EnvValue::Integer(_) => None,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get_str("hostname")
    }

    pub fn domain(&self) -> Option<&str> {
        self.get_str("domain")
    }

    pub fn tracer_name(&self) -> Option<&str> {
        self.get_str("tracer_name")
    }

    /// `major.minor[.patchlevel]`
    pub fn tracer_version(&self) -> Option<String> {
        let major = self.get("tracer_major")?;
        let minor = self.get("tracer_minor")?;
        Some(match self.get("tracer_patchlevel") {
            Some(patch) => format!("{major}.{minor}.{patch}"),
            None => format!("{major}.{minor}"),
        })
    }

    /// Folds another `env` block into this one
    fn merge(&mut self, other: Environment) {
        self.entries.extend(other.entries);
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct TraceInfo {
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub uuid: Option<Uuid>,
    pub byte_order: ByteOrder,
    pub packet_header: Option<Arc<StructType>>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct EventClass {
    pub id: u64,
    pub name: String,
    pub stream_id: u64,
    pub log_level: Option<LogLevel>,
    pub model_emf_uri: Option<String>,
    /// Event-specific context
    pub context: Option<Arc<StructType>>,
    pub fields: Option<Arc<StructType>>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Stream {
    pub id: u64,
    pub event_header: Option<Arc<StructType>>,
    pub packet_context: Option<Arc<StructType>>,
    pub event_context: Option<Arc<StructType>>,
    events: Vec<Option<Arc<EventClass>>>,
}

impl Stream {
    fn new(id: u64) -> Self {
        Stream {
            id,
            event_header: None,
            packet_context: None,
            event_context: None,
            events: Vec::new(),
        }
    }

    pub fn event(&self, id: u64) -> Option<&Arc<EventClass>> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.events.get(id))
            .and_then(|e| e.as_ref())
    }

    pub fn events(&self) -> impl Iterator<Item = &Arc<EventClass>> {
        self.events.iter().flatten()
    }

    /// Name of the clock the event header timestamps map to, if any
    pub fn clock_name(&self) -> Option<&str> {
        fn find(ty: &MetadataType) -> Option<&str> {
            match ty {
                MetadataType::Integer(i) => i.clock_name(),
                MetadataType::Struct(s) => s.fields().iter().find_map(|f| find(&f.ty)),
                MetadataType::Variant(v) => v.options.iter().find_map(|f| find(&f.ty)),
                _ => None,
            }
        }
        let header = self.event_header.as_ref()?;
        header.fields().iter().find_map(|f| find(&f.ty))
    }
}

/// A linked trace schema, immutable once built and shared by every channel decoder.
#[derive(Clone, PartialEq, Debug)]
pub struct Metadata {
    pub trace: TraceInfo,
    pub environment: Environment,
    pub clocks: BTreeMap<String, Clock>,
    streams: Vec<Option<Stream>>,
}

impl Metadata {
    /// Reads a metadata stream, plain text or packetized
    pub fn from_reader<R: Read>(r: R) -> Result<Self, Error> {
        let text = read_metadata_text(r)?;
        Self::from_text(&text)
    }

    pub fn from_text(text: &str) -> Result<Self, Error> {
        Self::link(parse_metadata(text)?)
    }

    /// Resolves every named type reference and attaches events to their streams.
    ///
    /// Events are attached only after every declaration has been seen since the text may
    /// declare an event before its stream.
    pub fn link(decls: Vec<Declaration>) -> Result<Self, Error> {
        let mut trace_decl: Option<TraceDecl> = None;
        let mut environment = Environment::default();
        let mut clocks = BTreeMap::new();
        let mut aliases: HashMap<String, MetadataType> = HashMap::new();
        let mut stream_decls = Vec::new();
        let mut event_decls = Vec::new();

        for decl in decls.into_iter() {
            match decl {
                Declaration::Trace(t) => {
                    if trace_decl.is_some() {
                        warn!("Metadata declares more than one trace block, using the last one");
                    }
                    trace_decl = Some(t);
                }
                Declaration::Clock(c) => {
                    clocks.insert(c.name.clone(), c);
                }
                Declaration::Environment(e) => environment.merge(e),
                Declaration::TypeAlias { name, ty } => {
                    if aliases.insert(name.clone(), ty).is_some() {
                        debug!("Type '{name}' redeclared, using the last declaration");
                    }
                }
                Declaration::Struct { name, ty } => {
                    if aliases
                        .insert(name.clone(), MetadataType::Struct(ty))
                        .is_some()
                    {
                        debug!("Type '{name}' redeclared, using the last declaration");
                    }
                }
                Declaration::Stream(s) => stream_decls.push(s),
                Declaration::Event(e) => event_decls.push(e),
            }
        }

        let trace_decl = trace_decl.unwrap_or_default();
        let byte_order = trace_decl.byte_order.unwrap_or_else(|| {
            debug!("Trace doesn't declare a byte order, assuming little-endian");
            ByteOrder::LittleEndian
        });
        let mut resolver = ty::Resolver::new(&aliases, byte_order);

        let trace = TraceInfo {
            major: trace_decl.major,
            minor: trace_decl.minor,
            uuid: trace_decl.uuid,
            byte_order,
            packet_header: trace_decl
                .packet_header
                .as_ref()
                .map(|t| resolver.resolve_struct("trace packet.header", t))
                .transpose()?,
        };

        let mut streams: Vec<Option<Stream>> = Vec::new();
        if stream_decls.is_empty() && !event_decls.is_empty() {
            debug!("Metadata has no stream block, using an implicit stream 0");
            stream_decls.push(StreamDecl::default());
        }
        for s in stream_decls.into_iter() {
            if s.id > MAX_STREAM_ID {
                return Err(Error::InvalidType(format!("stream ID {} is too large", s.id)));
            }
            let mut stream = Stream::new(s.id);
            stream.event_header = s
                .event_header
                .as_ref()
                .map(|t| resolver.resolve_struct("stream event.header", t))
                .transpose()?;
            stream.packet_context = s
                .packet_context
                .as_ref()
                .map(|t| resolver.resolve_struct("stream packet.context", t))
                .transpose()?;
            stream.event_context = s
                .event_context
                .as_ref()
                .map(|t| resolver.resolve_struct("stream event.context", t))
                .transpose()?;
            let idx = s.id as usize;
            if streams.len() <= idx {
                streams.resize_with(idx + 1, || None);
            }
            if streams[idx].is_some() {
                return Err(Error::InvalidType(format!(
                    "stream ID {} is declared more than once",
                    s.id
                )));
            }
            streams[idx] = Some(stream);
        }

        for e in event_decls.into_iter() {
            if e.id > MAX_EVENT_ID {
                return Err(Error::InvalidType(format!(
                    "event '{}' ID {} is too large",
                    e.name, e.id
                )));
            }
            let class = EventClass {
                id: e.id,
                stream_id: e.stream_id,
                log_level: e.log_level.map(LogLevel::from),
                model_emf_uri: e.model_emf_uri.clone(),
                context: e
                    .context
                    .as_ref()
                    .map(|t| resolver.resolve_struct("event context", t))
                    .transpose()?,
                fields: e
                    .fields
                    .as_ref()
                    .map(|t| resolver.resolve_struct("event fields", t))
                    .transpose()?,
                name: e.name,
            };
            let stream = usize::try_from(class.stream_id)
                .ok()
                .and_then(|idx| streams.get_mut(idx))
                .and_then(|s| s.as_mut())
                .ok_or_else(|| {
                    Error::InvalidType(format!(
                        "event '{}' references undeclared stream ID {}",
                        class.name, class.stream_id
                    ))
                })?;
            let idx = class.id as usize;
            if stream.events.len() <= idx {
                stream.events.resize_with(idx + 1, || None);
            }
            if let Some(existing) = &stream.events[idx] {
                return Err(Error::InvalidType(format!(
                    "event ID {} of stream {} is declared twice ('{}' and '{}')",
                    class.id, class.stream_id, existing.name, class.name
                )));
            }
            stream.events[idx] = Some(Arc::new(class));
        }

        debug!(
            streams = streams.iter().flatten().count(),
            clocks = clocks.len(),
            "Linked CTF metadata"
        );
        Ok(Metadata {
            trace,
            environment,
            clocks,
            streams,
        })
    }

    pub fn stream(&self, id: u64) -> Option<&Stream> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.streams.get(id))
            .and_then(|s| s.as_ref())
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().flatten()
    }

    /// The clock a stream's timestamps are expressed in.
    ///
    /// Falls back to the only clock when the header doesn't name one.
    pub fn stream_clock(&self, stream: &Stream) -> Option<&Clock> {
        match stream.clock_name() {
            Some(name) => self.clocks.get(name),
            None if self.clocks.len() == 1 => self.clocks.values().next(),
            None => None,
        }
    }
}
