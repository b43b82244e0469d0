use crate::attrs::{AttrVal, EventAttrKey};
use crate::channel::PacketContext;
use crate::decode::{StructValue, Value};
use crate::error::Error;
use crate::metadata::EventClass;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// One decoded event record
#[derive(Clone, PartialEq, Debug)]
pub struct Event {
    pub class: Arc<EventClass>,
    pub stream_id: u64,
    /// Reconstructed clock value, in cycles
    pub timestamp: u64,
    /// `timestamp` converted with the stream's clock, in nanoseconds from the clock origin
    pub timestamp_ns: Option<i128>,
    pub header: Option<StructValue>,
    /// The stream's event context, common to every event of the stream
    pub stream_context: Option<StructValue>,
    /// The event class' own context
    pub context: Option<StructValue>,
    pub fields: Option<StructValue>,
    pub packet: Arc<PacketContext>,
    pub process_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub process_name: Option<Arc<str>>,
}

impl Event {
    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn id(&self) -> u64 {
        self.class.id
    }

    /// A payload field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get(name))
    }

    /// A payload field by declaration index
    pub fn field_at(&self, index: usize) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get_index(index))
    }

    /// Flattens the event into dotted attribute keys
    pub fn attr_kvs(&self) -> Result<Vec<(EventAttrKey, AttrVal)>, Error> {
        let mut attrs = vec![(EventAttrKey::Name, AttrVal::from(self.name()))];

        if let Some(ns) = self.timestamp_ns {
            if ns < 0 {
                warn!(
                    "Dropping event ID {} timestamp because it's negative, consider adjusting the clock offset",
                    self.class.id
                );
            } else {
                attrs.push((EventAttrKey::Timestamp, AttrVal::Timestamp(ns)));
            }
        }
        attrs.push((EventAttrKey::ClockSnapshot, self.timestamp.into()));
        attrs.push((EventAttrKey::StreamId, self.stream_id.into()));
        attrs.push((EventAttrKey::Id, self.class.id.into()));
        if let Some(ll) = self.class.log_level {
            attrs.push((EventAttrKey::LogLevel, ll.to_string().into()));
        }
        if let Some(uri) = &self.class.model_emf_uri {
            attrs.push((EventAttrKey::EmfUri, uri.as_str().into()));
        }
        if let Some(pid) = self.process_id {
            attrs.push((EventAttrKey::ProcessId, pid.into()));
        }
        if let Some(tid) = self.thread_id {
            attrs.push((EventAttrKey::ThreadId, tid.into()));
        }
        if let Some(name) = &self.process_name {
            attrs.push((EventAttrKey::ProcessName, AttrVal::from(&**name)));
        }

        const EMPTY_PREFIX: &str = "";
        let sections: [(&Option<StructValue>, fn(String) -> EventAttrKey); 4] = [
            (&self.stream_context, EventAttrKey::CommonContext),
            (&self.context, EventAttrKey::SpecificContext),
            (&self.packet.raw, EventAttrKey::PacketContext),
            (&self.fields, EventAttrKey::Field),
        ];
        for (s, key) in sections.into_iter() {
            if let Some(s) = s {
                let gen = FieldToAttrKeysGen::new(EMPTY_PREFIX)?;
                attrs.extend(gen.generate(s).into_iter().map(|(k, v)| (key(k), v)));
            }
        }

        Ok(attrs)
    }
}

/// Rebuilds full timestamps out of the truncated values found in compact event headers.
///
/// Timestamps are assumed non-decreasing within a channel. When the low bits of a new value
/// are not greater than the low bits of the previous timestamp the counter is assumed to
/// have wrapped exactly once.
///
/// The running timestamp starts at zero and is never seeded from a packet's
/// `timestamp_begin`, so a channel that opens with a truncated timestamp gets zero high bits
/// until a full-width timestamp is seen.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct TimestampReconstructor {
    last: u64,
}

impl TimestampReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    /// Merges the `width` low bits in `value` into the running timestamp
    pub fn update(&mut self, value: u64, width: u32) -> u64 {
        if width >= 64 {
            self.last = value;
            return value;
        }
        let overflow = 1_u64 << width;
        let mask = overflow - 1;
        let low = value & mask;
        let mut ts = (self.last & !mask) | low;
        if low <= self.last & mask {
            ts = ts.wrapping_add(overflow);
        }
        self.last = ts;
        ts
    }
}

/// Context field names probed, in order, for process and thread information
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ContextFieldNames {
    pub process_id: Vec<String>,
    pub thread_id: Vec<String>,
    pub process_name: Vec<String>,
}

impl Default for ContextFieldNames {
    fn default() -> Self {
        let names = |n: &[&str]| n.iter().map(|s| s.to_string()).collect();
        ContextFieldNames {
            process_id: names(&["_vpid", "_pid", "pid"]),
            thread_id: names(&["_vtid", "_tid", "tid"]),
            process_name: names(&["_procname", "procname"]),
        }
    }
}

/// Pulls process and thread information out of event contexts.
///
/// Process names arrive as fixed-size character arrays that rarely change between
/// consecutive events, so each distinct byte sequence is decoded once.
#[derive(Debug, Default)]
pub struct ProcessInfoExtractor {
    names: ContextFieldNames,
    last_raw: Vec<u8>,
    last_name: Option<Arc<str>>,
    cache: HashMap<Vec<u8>, Arc<str>>,
}

impl ProcessInfoExtractor {
    pub fn new(names: ContextFieldNames) -> Self {
        ProcessInfoExtractor {
            names,
            ..Default::default()
        }
    }

    /// Returns `(process_id, thread_id, process_name)`
    pub fn extract(
        &mut self,
        contexts: &[Option<&StructValue>],
    ) -> (Option<i64>, Option<i64>, Option<Arc<str>>) {
        let pid = find_field(contexts, &self.names.process_id).and_then(Value::as_i64);
        let tid = find_field(contexts, &self.names.thread_id).and_then(Value::as_i64);
        let name = match find_field(contexts, &self.names.process_name) {
            Some(Value::RawArray(a)) => a.as_bytes().map(|raw| self.process_name(raw)),
            Some(Value::String(s)) => Some(self.process_name(s.as_bytes())),
            _ => None,
        };
        (pid, tid, name)
    }

    fn process_name(&mut self, raw: &[u8]) -> Arc<str> {
        if let Some(last) = &self.last_name {
            if self.last_raw == raw {
                return last.clone();
            }
        }
        let name = match self.cache.get(raw) {
            Some(n) => n.clone(),
            None => {
                let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
                let n: Arc<str> = String::from_utf8_lossy(&raw[..end]).into();
                self.cache.insert(raw.to_vec(), n.clone());
                n
            }
        };
        self.last_raw.clear();
        self.last_raw.extend_from_slice(raw);
        self.last_name = Some(name.clone());
        name
    }
}

/// The first of `names` found in any of `contexts`
fn find_field<'c>(contexts: &[Option<&'c StructValue>], names: &[String]) -> Option<&'c Value> {
    names
        .iter()
        .find_map(|n| contexts.iter().flatten().find_map(|c| c.get(n)))
}

#[derive(Debug)]
struct FieldToAttrKeysGen {
    // A stack of attr key components built from the field names.
    // A stack so we can push/pop as we encounter nested structures
    // mixed inbetween parent container fields.
    // Invariant: len is always >= 1 for the root structure's key_prefix
    // Invariant: none of the entries should contain a '.' character,
    //   CTF field names are C identifiers
    attr_key_stack: Vec<String>,

    attrs: Vec<(String, AttrVal)>,
}

impl FieldToAttrKeysGen {
    /// Invariant: key_prefix must not end in a '.', this util will handle that based
    /// on compound or singular types
    fn new(key_prefix: &str) -> Result<Self, Error> {
        if key_prefix.starts_with('.') || key_prefix.ends_with('.') {
            Err(Error::InvalidAttrKeyPrefix)
        } else {
            Ok(Self {
                attr_key_stack: vec![key_prefix.to_string()],
                attrs: Default::default(),
            })
        }
    }

    /// Destructure the contents of `root` into its representative set of attr keys and values.
    /// The root structure itself doesn't contribute a key component.
    fn generate(mut self, root: &StructValue) -> Vec<(String, AttrVal)> {
        self.generate_struct(root);
        self.attrs
    }

    fn generate_struct(&mut self, s: &StructValue) {
        for (field, fv) in s.iter() {
            self.generate_inner(&field.name, &fv.value);
        }
    }

    fn generate_inner(&mut self, name: &str, value: &Value) {
        match value {
            Value::Struct(s) => {
                self.attr_key_stack.push(name.to_owned());
                self.generate_struct(s);
                self.attr_key_stack.pop();
            }
            // Variants are transparent, the selected option takes the variant's name
            Value::Variant { value, .. } => self.generate_inner(name, value),
            Value::Enum { value, label } => {
                let k = self.attr_key_for_field_name(name);
                if let Some(v) = scalar_to_val(value) {
                    self.attrs.push((k.clone(), v));
                }
                self.attrs
                    .push((format!("{k}.label"), label.to_string().into()));
            }
            Value::RawArray(a) => {
                if let Some(text) = a.text() {
                    let k = self.attr_key_for_field_name(name);
                    self.attrs.push((k, text.into()));
                } else if let Some(bytes) = a.as_bytes() {
                    let k = self.attr_key_for_field_name(name);
                    self.attrs.push((k, hex::encode(bytes).into()));
                } else {
                    self.attr_key_stack.push(name.to_owned());
                    for (idx, elem) in a.iter().enumerate() {
                        match elem {
                            Ok(v) => self.generate_inner(&idx.to_string(), &v),
                            Err(e) => warn!(error = %e, "Failed to decode array element"),
                        }
                    }
                    self.attr_key_stack.pop();
                }
            }
            Value::Array(elems) => {
                self.attr_key_stack.push(name.to_owned());
                for (idx, v) in elems.iter().enumerate() {
                    self.generate_inner(&idx.to_string(), v);
                }
                self.attr_key_stack.pop();
            }
            scalar => {
                if let Some(v) = scalar_to_val(scalar) {
                    let k = self.attr_key_for_field_name(name);
                    self.attrs.push((k, v));
                }
            }
        }
    }

    /// Get the fully qualified attr key for the given field name.
    fn attr_key_for_field_name(&self, field_name: &str) -> String {
        self.attr_key_stack
            .iter()
            .map(String::as_str)
            .filter(|k| !k.is_empty())
            .chain(std::iter::once(field_name))
            .collect::<Vec<&str>>()
            .join(".")
    }
}

fn scalar_to_val(v: &Value) -> Option<AttrVal> {
    Some(match v {
        Value::U8(v) => i64::from(*v).into(),
        Value::U16(v) => i64::from(*v).into(),
        Value::U32(v) => i64::from(*v).into(),
        Value::U64(v) => (*v).into(),
        Value::I8(v) => i64::from(*v).into(),
        Value::I16(v) => i64::from(*v).into(),
        Value::I32(v) => i64::from(*v).into(),
        Value::I64(v) => (*v).into(),
        Value::UnsupportedFloat { raw } => format!("float:{raw:#x}").into(),
        Value::String(s) => s.clone().into(),
        _ => return None,
    })
}
