//! # Overview
//!
//! A decoder for Common Trace Format (CTF 1.8) traces.
//!
//! Conceptually CTF data is organized as followed:
//! * Trace, described by a textual (possibly packetized) `metadata` stream
//!   - One or more channels (files), each a sequence of packets of a single stream class
//!     * Series of events
//!
//! [`metadata::Metadata`] is parsed once per trace and shared by every
//! [`channel::ChannelReader`], which yields [`event::Event`]s in channel order.
//!
//! # Attrs Mappings
//!
//! Trace Attrs
//! * channel.internal.ctf.trace.uuid
//! * channel.internal.ctf.trace.version
//! * channel.internal.ctf.trace.byte_order
//! * channel.internal.ctf.trace.stream_count
//! * channel.internal.ctf.trace.hostname
//! * channel.internal.ctf.trace.domain
//! * channel.internal.ctf.trace.tracer
//! * channel.internal.ctf.trace.env.`<fields>`
//!
//! Stream Attrs
//! * channel.internal.ctf.stream.id
//! * channel.internal.ctf.stream.event_count
//! * channel.name
//! * channel.description
//! * channel.internal.ctf.stream.clock.frequency
//! * channel.internal.ctf.stream.clock.offset_seconds
//! * channel.internal.ctf.stream.clock.offset_cycles
//! * channel.internal.ctf.stream.clock.precision
//! * channel.internal.ctf.stream.clock.unix_epoch_origin
//!   - channel.clock_style
//! * channel.internal.ctf.stream.clock.name
//! * channel.internal.ctf.stream.clock.description
//! * channel.internal.ctf.stream.clock.uuid
//!   - channel.time_domain
//! * channel.ingest_source
//!
//! Event Attrs
//! * event.internal.ctf.stream_id
//! * event.internal.ctf.id
//! * event.name
//! * event.internal.ctf.log_level
//! * event.internal.ctf.emf_uri
//! * event.internal.ctf.clock_snapshot
//!   - event.timestamp
//! * event.internal.ctf.process_id
//! * event.internal.ctf.thread_id
//! * event.internal.ctf.process_name
//! * event.internal.ctf.common_context.<possibly.nested.fields>
//! * event.internal.ctf.specific_context.<possibly.nested.fields>
//! * event.internal.ctf.packet_context.<possibly.nested.fields>
//! * event.<possibly.nested.fields>
//!
//! # Mapping Conventions
//!
//! ## Enumerations
//!
//! Enumerations are given an Attr for the integer value and one for the label it maps to.
//!
//! Example: `my_enum` has value 5 mapped to "RUNNING"
//! * event.my_enum = 5
//! * event.my_enum.label = "RUNNING"
//!
//! ## Variants
//!
//! Variants are transparent, the selected option is flattened under the variant's field name.
//!
//! ## Arrays and sequences
//!
//! Arrays of text-encoded bytes become a single string Attr, other byte arrays a hex string.
//! Any other array gets one Attr per element, keyed by index.
//!
//! Example: `ips` is a sequence of two `uint32_t`
//! * event.ips.0 = 10
//! * event.ips.1 = 11
#![deny(clippy::all)]

pub mod attrs;
pub mod channel;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod keys;
pub mod metadata;
pub mod opts;
pub mod prelude;
pub mod properties;
pub mod source;
pub mod tracing;
pub mod types;
