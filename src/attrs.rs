use derive_more::{Display, From};

// N.B. maybe we'll expand on this to separate out the various CTF producers
// (lttng-ust/lttng-modules/barectf/etc), the env block usually says which one it is.
pub(crate) const CHANNEL_INGEST_SOURCE_VAL: &str = "ctf-reader";

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum ChannelAttrKey {
    #[display(fmt = "channel.name")]
    Name,
    #[display(fmt = "channel.description")]
    Description,
    #[display(fmt = "channel.time_domain")]
    TimeDomain,
    #[display(fmt = "channel.clock_style")]
    ClockStyle,
    #[display(fmt = "channel.ingest_source")]
    IngestSource,

    #[display(fmt = "channel.internal.ctf.trace.uuid")]
    TraceUuid,
    #[display(fmt = "channel.internal.ctf.trace.version")]
    TraceVersion,
    #[display(fmt = "channel.internal.ctf.trace.byte_order")]
    TraceByteOrder,
    #[display(fmt = "channel.internal.ctf.trace.stream_count")]
    TraceStreamCount,
    #[display(fmt = "channel.internal.ctf.trace.hostname")]
    TraceHostname,
    #[display(fmt = "channel.internal.ctf.trace.domain")]
    TraceDomain,
    #[display(fmt = "channel.internal.ctf.trace.tracer")]
    TraceTracer,
    #[display(fmt = "channel.internal.ctf.trace.env.{_0}")]
    TraceEnv(String),

    #[display(fmt = "channel.internal.ctf.stream.id")]
    StreamId,
    #[display(fmt = "channel.internal.ctf.stream.event_count")]
    StreamEventCount,
    #[display(fmt = "channel.internal.ctf.stream.clock.frequency")]
    StreamClockFreq,
    #[display(fmt = "channel.internal.ctf.stream.clock.offset_seconds")]
    StreamClockOffsetSeconds,
    #[display(fmt = "channel.internal.ctf.stream.clock.offset_cycles")]
    StreamClockOffsetCycles,
    #[display(fmt = "channel.internal.ctf.stream.clock.precision")]
    StreamClockPrecision,
    #[display(fmt = "channel.internal.ctf.stream.clock.unix_epoch_origin")]
    StreamClockUnixEpoch,
    #[display(fmt = "channel.internal.ctf.stream.clock.name")]
    StreamClockName,
    #[display(fmt = "channel.internal.ctf.stream.clock.description")]
    StreamClockDesc,
    #[display(fmt = "channel.internal.ctf.stream.clock.uuid")]
    StreamClockUuid,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum EventAttrKey {
    #[display(fmt = "event.name")]
    Name,
    #[display(fmt = "event.timestamp")]
    Timestamp,

    #[display(fmt = "event.internal.ctf.stream_id")]
    StreamId,
    #[display(fmt = "event.internal.ctf.id")]
    Id,
    #[display(fmt = "event.internal.ctf.log_level")]
    LogLevel,
    #[display(fmt = "event.internal.ctf.emf_uri")]
    EmfUri,
    #[display(fmt = "event.internal.ctf.clock_snapshot")]
    ClockSnapshot,
    #[display(fmt = "event.internal.ctf.process_id")]
    ProcessId,
    #[display(fmt = "event.internal.ctf.thread_id")]
    ThreadId,
    #[display(fmt = "event.internal.ctf.process_name")]
    ProcessName,

    #[display(fmt = "event.internal.ctf.common_context.{_0}")]
    CommonContext(String),
    #[display(fmt = "event.internal.ctf.specific_context.{_0}")]
    SpecificContext(String),
    #[display(fmt = "event.internal.ctf.packet_context.{_0}")]
    PacketContext(String),

    #[display(fmt = "event.{_0}")]
    Field(String),
}

/// An attribute value
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, From)]
pub enum AttrVal {
    #[display(fmt = "{_0}")]
    Integer(i64),
    #[display(fmt = "{_0}")]
    BigInt(i128),
    #[display(fmt = "{_0:?}")]
    String(String),
    #[display(fmt = "{_0}")]
    Bool(bool),
    /// Nanoseconds
    #[from(ignore)]
    #[display(fmt = "{_0}ns")]
    Timestamp(i128),
}

impl From<&str> for AttrVal {
    fn from(s: &str) -> Self {
        AttrVal::String(s.to_owned())
    }
}

impl From<u64> for AttrVal {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => AttrVal::Integer(v),
            Err(_) => AttrVal::BigInt(v.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_display() {
        assert_eq!(EventAttrKey::Name.to_string(), "event.name");
        assert_eq!(
            EventAttrKey::CommonContext("_vpid".to_owned()).to_string(),
            "event.internal.ctf.common_context._vpid"
        );
        assert_eq!(
            ChannelAttrKey::TraceEnv("hostname".to_owned()).to_string(),
            "channel.internal.ctf.trace.env.hostname"
        );
    }

    #[test]
    fn value_conversions() {
        assert_eq!(AttrVal::from(5_u64), AttrVal::Integer(5));
        assert_eq!(AttrVal::from(u64::MAX), AttrVal::BigInt(u64::MAX.into()));
        assert_eq!(AttrVal::from("a").to_string(), "\"a\"");
        assert_eq!(AttrVal::Timestamp(12).to_string(), "12ns");
    }
}
