//! Packet framing and per-channel event iteration.

use crate::decode::{BitCursor, StructValue, Value};
use crate::error::Error;
use crate::event::{ContextFieldNames, Event, ProcessInfoExtractor, TimestampReconstructor};
use crate::metadata::{Metadata, MetadataType};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub const CTF_PACKET_MAGIC: u32 = 0xC1FC_1FC1;

/// Byte counts derived from a packet context's sizes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PacketLayout {
    /// Content bytes following the packet header and context
    pub content_bytes: u64,
    /// Padding bytes between the end of the content and the next packet
    pub padding_bytes: u64,
}

impl PacketLayout {
    /// `header_bits` covers the packet header and context, sizes are in bits
    pub fn new(
        offset: u64,
        header_bits: u64,
        content_bits: u64,
        packet_bits: u64,
    ) -> Result<Self, Error> {
        let header_bytes = header_bits.div_ceil(8);
        let content_total = content_bits.div_ceil(8);
        let packet_total = packet_bits / 8;
        if content_total < header_bytes || packet_total < content_total {
            return Err(Error::InvalidPacketSize {
                offset,
                header_bits,
                content_bits,
                packet_bits,
            });
        }
        Ok(PacketLayout {
            content_bytes: content_total - header_bytes,
            padding_bytes: packet_total - content_total,
        })
    }
}

/// The well-known packet context fields, plus the whole decoded structure
#[derive(Clone, PartialEq, Debug, Default)]
pub struct PacketContext {
    pub stream_id: u64,
    pub stream_instance_id: Option<u64>,
    pub timestamp_begin: Option<u64>,
    pub timestamp_end: Option<u64>,
    /// Bits
    pub content_size: Option<u64>,
    /// Bits
    pub packet_size: Option<u64>,
    pub sequence_number: Option<u64>,
    pub events_discarded: Option<u64>,
    pub cpu_id: Option<u64>,
    pub raw: Option<StructValue>,
}

impl PacketContext {
    fn new(stream_id: u64, header: Option<&StructValue>, raw: Option<StructValue>) -> Self {
        let get = |name: &str| raw.as_ref().and_then(|c| c.get(name)).and_then(Value::as_u64);
        PacketContext {
            stream_id,
            stream_instance_id: header
                .and_then(|h| h.get("stream_instance_id"))
                .and_then(Value::as_u64),
            timestamp_begin: get("timestamp_begin"),
            timestamp_end: get("timestamp_end"),
            content_size: get("content_size"),
            packet_size: get("packet_size"),
            sequence_number: get("packet_seq_num"),
            events_discarded: get("events_discarded"),
            cpu_id: get("cpu_id"),
            raw,
        }
    }
}

#[derive(Debug)]
struct PacketState {
    context: Arc<PacketContext>,
    /// End of the event content, packet-relative. `None` runs to the end of the channel.
    content_end_bits: Option<u64>,
    padding_bytes: u64,
}

/// Decodes the events of one channel, in order.
///
/// Ends cleanly when the source runs out at a packet or event boundary. A source that ends
/// partway through a packet is logged and also ends the iteration. Any other error is
/// yielded once and ends the iteration.
#[derive(Debug)]
pub struct ChannelReader<R> {
    name: String,
    metadata: Arc<Metadata>,
    cursor: BitCursor<R>,
    packet: Option<PacketState>,
    timestamps: TimestampReconstructor,
    process_info: ProcessInfoExtractor,
    /// Source bytes read when the current unit (packet header or event) started
    unit_start: u64,
    packets: u64,
    events_discarded: u64,
    finished: bool,
}

impl<R: Read> ChannelReader<R> {
    pub fn new(name: impl Into<String>, metadata: Arc<Metadata>, source: R) -> Self {
        Self::with_context_fields(name, metadata, source, ContextFieldNames::default())
    }

    pub fn with_context_fields(
        name: impl Into<String>,
        metadata: Arc<Metadata>,
        source: R,
        context_fields: ContextFieldNames,
    ) -> Self {
        ChannelReader {
            name: name.into(),
            metadata,
            cursor: BitCursor::new(source),
            packet: None,
            timestamps: TimestampReconstructor::new(),
            process_info: ProcessInfoExtractor::new(context_fields),
            unit_start: 0,
            packets: 0,
            events_discarded: 0,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    /// Packets started so far
    pub fn packets(&self) -> u64 {
        self.packets
    }

    fn next_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            if self.packet.is_none() {
                if self.cursor.is_eof() {
                    return Ok(None);
                }
                let p = self.read_packet_header()?;
                self.packet = Some(p);
            }
            let next = self.packet.as_ref().and_then(|p| {
                let has_more = match p.content_end_bits {
                    Some(end) => self.cursor.position_bits() < end,
                    None => !self.cursor.is_eof(),
                };
                has_more.then(|| p.context.clone())
            });
            match next {
                Some(context) => return self.read_event(context).map(Some),
                None => self.finish_packet()?,
            }
        }
    }

    fn read_packet_header(&mut self) -> Result<PacketState, Error> {
        self.cursor.start_packet();
        self.unit_start = self.cursor.packet_bytes_read();
        let offset = self.cursor.channel_offset();
        let metadata = self.metadata.clone();

        let header = metadata
            .trace
            .packet_header
            .as_ref()
            .map(|h| self.cursor.read_struct(h))
            .transpose()?;
        if let Some(h) = header.as_ref() {
            if let Some(magic) = h.get("magic").and_then(Value::as_u64) {
                if magic != u64::from(CTF_PACKET_MAGIC) {
                    return Err(Error::InvalidMagic {
                        found: magic,
                        offset,
                    });
                }
            }
            if let (Some(expected), Some(Value::RawArray(raw))) = (metadata.trace.uuid, h.get("uuid"))
            {
                if let Some(bytes) = raw.as_bytes() {
                    let found = Uuid::from_slice(bytes)?;
                    if found != expected {
                        warn!(
                            channel = %self.name,
                            offset,
                            %found,
                            %expected,
                            "Packet UUID doesn't match the trace UUID"
                        );
                    }
                }
            }
        }
        let stream_id = header
            .as_ref()
            .and_then(|h| h.get("stream_id"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let stream = metadata
            .stream(stream_id)
            .ok_or(Error::UnknownStream(stream_id))?;

        let raw_context = stream
            .packet_context
            .as_ref()
            .map(|c| self.cursor.read_struct(c))
            .transpose()?;
        let context = PacketContext::new(stream_id, header.as_ref(), raw_context);
        let header_bits = self.cursor.position_bits();

        let (content_end_bits, padding_bytes) = match (context.content_size, context.packet_size)
        {
            (Some(content), packet) => {
                let packet = packet.unwrap_or(content);
                let layout = PacketLayout::new(offset, header_bits, content, packet)?;
                // The header is pulled exactly, whatever is left of the content is still in
                // the source
                self.cursor
                    .set_remaining_in_content(Some(layout.content_bytes));
                (Some(content), layout.padding_bytes)
            }
            (None, Some(packet)) => {
                let layout = PacketLayout::new(offset, header_bits, packet, packet)?;
                self.cursor
                    .set_remaining_in_content(Some(layout.content_bytes));
                (Some(packet), 0)
            }
            (None, None) => (None, 0),
        };

        if let Some(discarded) = context.events_discarded {
            if discarded > self.events_discarded {
                warn!(
                    channel = %self.name,
                    count = discarded - self.events_discarded,
                    "Tracer discarded events"
                );
                self.events_discarded = discarded;
            }
        }

        self.packets += 1;
        debug!(
            channel = %self.name,
            offset,
            stream_id,
            content_bits = ?content_end_bits,
            padding_bytes,
            "Packet start"
        );
        Ok(PacketState {
            context: Arc::new(context),
            content_end_bits,
            padding_bytes,
        })
    }

    /// Skips what's left of the packet content and its padding
    fn finish_packet(&mut self) -> Result<(), Error> {
        let Some(packet) = self.packet.take() else {
            return Ok(());
        };
        let remaining = self.cursor.remaining_in_content().unwrap_or(0);
        let skip = remaining + packet.padding_bytes;
        let skipped = self.cursor.skip_source_bytes(skip)?;
        if skipped < skip {
            // Padding is allowed to be cut short at the very end of a channel
            debug!(
                channel = %self.name,
                expected = skip,
                skipped,
                "Channel ends inside packet padding"
            );
        }
        trace!(channel = %self.name, skipped, "Packet end");
        Ok(())
    }

    fn read_event(&mut self, packet: Arc<PacketContext>) -> Result<Event, Error> {
        self.cursor.compact();
        self.unit_start = self.cursor.packet_bytes_read();
        let metadata = self.metadata.clone();
        let stream_id = packet.stream_id;
        let stream = metadata
            .stream(stream_id)
            .ok_or(Error::UnknownStream(stream_id))?;

        let header = stream
            .event_header
            .as_ref()
            .map(|h| self.cursor.read_struct(h))
            .transpose()?;
        let (id, raw_ts) = header
            .as_ref()
            .map(interpret_header)
            .unwrap_or((None, None));
        let id = id.unwrap_or(0);
        let class = stream
            .event(id)
            .ok_or(Error::UnknownEvent { stream_id, id })?
            .clone();

        let stream_context = stream
            .event_context
            .as_ref()
            .map(|c| self.cursor.read_struct(c))
            .transpose()?;
        let context = class
            .context
            .as_ref()
            .map(|c| self.cursor.read_struct(c))
            .transpose()?;
        let fields = class
            .fields
            .as_ref()
            .map(|f| self.cursor.read_struct(f))
            .transpose()?;

        let timestamp = match raw_ts {
            Some((value, width)) => self.timestamps.update(value, width),
            None => self.timestamps.last(),
        };
        let timestamp_ns = metadata
            .stream_clock(stream)
            .map(|c| c.cycles_to_ns(timestamp));
        let (process_id, thread_id, process_name) = self
            .process_info
            .extract(&[stream_context.as_ref(), context.as_ref()]);

        Ok(Event {
            class,
            stream_id,
            timestamp,
            timestamp_ns,
            header,
            stream_context,
            context,
            fields,
            packet,
            process_id,
            thread_id,
            process_name,
        })
    }
}

impl<R: Read> Iterator for ChannelReader<R> {
    type Item = Result<Event, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                debug!(channel = %self.name, packets = self.packets, "End of channel");
                None
            }
            Err(Error::Truncated { offset }) => {
                self.finished = true;
                if self.cursor.packet_bytes_read() > self.unit_start {
                    warn!(channel = %self.name, "Trace channel truncated at offset {offset}");
                } else {
                    debug!(channel = %self.name, packets = self.packets, "End of channel");
                }
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Finds the event id and timestamp in a decoded event header.
///
/// Fields named `id` and `timestamp` are looked up at the top level, then inside the
/// selected option of any variant, later finds overriding earlier ones. This is how the
/// extended header's id replaces the compact sentinel. The timestamp comes with its
/// declared width.
fn interpret_header(header: &StructValue) -> (Option<u64>, Option<(u64, u32)>) {
    fn visit(s: &StructValue, id: &mut Option<u64>, ts: &mut Option<(u64, u32)>) {
        for (field, fv) in s.iter() {
            match (field.name.as_str(), &fv.value) {
                (_, Value::Variant { value, .. }) => {
                    if let Some(inner) = value.as_struct() {
                        visit(inner, id, ts);
                    }
                }
                ("id", v) => *id = v.as_u64(),
                ("timestamp", v) => {
                    if let (Some(value), Some(width)) = (v.as_u64(), integer_width(&field.ty)) {
                        *ts = Some((value, width));
                    }
                }
                _ => (),
            }
        }
    }
    let mut id = None;
    let mut ts = None;
    visit(header, &mut id, &mut ts);
    (id, ts)
}

/// Width in bits of an integer, or of an enumeration's integer
fn integer_width(ty: &MetadataType) -> Option<u32> {
    match ty {
        MetadataType::Integer(i) => Some(i.size),
        MetadataType::Enum(e) => e.integer().map(|i| i.size),
        _ => None,
    }
}
