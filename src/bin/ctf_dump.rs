#![deny(warnings, clippy::all)]

use clap::Parser;
use ctf_reader::keys::AttrKeyInterner;
use ctf_reader::source::channel_display_name;
use ctf_reader::{prelude::*, tracing::try_init_tracing_subscriber};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const RECORD_CHANNEL_CAPACITY: usize = 1024;

/// Decode CTF traces and print their events
#[derive(Parser, Debug, Clone)]
#[clap(version)]
pub struct Opts {
    #[clap(flatten)]
    pub rd_opts: ReaderOpts,

    #[clap(flatten)]
    pub dec_opts: DecodeOpts,

    /// Only decode the channels with the given file name. Repeatable
    #[clap(long, name = "channel", help_heading = "IMPORT CONFIGURATION")]
    pub channel: Vec<String>,

    /// Stop each channel after this many events
    #[clap(long, name = "max-events", help_heading = "IMPORT CONFIGURATION")]
    pub max_events: Option<MaxEvents>,

    /// Add offset-ns nanoseconds to the offset of every clock
    #[clap(long, name = "offset-ns", help_heading = "IMPORT CONFIGURATION")]
    pub clock_offset_ns: Option<i64>,

    /// Add offset-s seconds to the offset of every clock
    #[clap(long, name = "offset-s", help_heading = "IMPORT CONFIGURATION")]
    pub clock_offset_s: Option<i64>,

    /// Rename a channel attribute key as it is being printed. Specify as 'original_key,new_key'
    #[clap(long, name = "original.channel.attr,new.channel.attr", help_heading = "IMPORT CONFIGURATION", value_parser = parse_attr_key_rename)]
    pub rename_channel_attr: Vec<AttrKeyRename>,

    /// Rename an event attribute key as it is being printed. Specify as 'original_key,new_key'
    #[clap(long, name = "original.event.attr,new.event.attr", help_heading = "IMPORT CONFIGURATION", value_parser = parse_attr_key_rename)]
    pub rename_event_attr: Vec<AttrKeyRename>,

    /// Only print per-channel event and packet counts
    #[clap(long, help_heading = "OUTPUT")]
    pub summary: bool,

    /// Path to trace directories or zip archives
    #[clap(name = "input", help_heading = "IMPORT CONFIGURATION")]
    pub inputs: Vec<PathBuf>,
}

fn parse_attr_key_rename(
    s: &str,
) -> Result<AttrKeyRename, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let pos = s
        .find(',')
        .ok_or_else(|| format!("invalid original,new: no `,` found in `{s}`"))?;
    let original = s[..pos].parse()?;
    let new = s[pos + 1..].parse()?;
    Ok(AttrKeyRename { original, new })
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ctf(#[from] ctf_reader::error::Error),

    #[error("At least one CTF containing input path is required.")]
    MissingInputs,
}

/// Decoder task output, consumed in arrival order
enum Record {
    Channel {
        name: Arc<str>,
        stream_id: u64,
        props: Arc<CtfProperties>,
    },
    Event {
        channel: Arc<str>,
        event: Box<Event>,
    },
    Done {
        entry: String,
        events: u64,
        packets: u64,
        result: Result<(), ctf_reader::error::Error>,
    },
}

#[tokio::main]
async fn main() {
    match do_main().await {
        Ok(()) => (),
        Err(e) => {
            eprintln!("{e}");
            let mut cause = e.source();
            while let Some(err) = cause {
                eprintln!("Caused by: {err}");
                cause = err.source();
            }
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

async fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    try_init_tracing_subscriber()?;

    let intr = Interruptor::new();
    let interruptor = intr.clone();
    ctrlc::set_handler(move || {
        if intr.is_set() {
            // 128 (fatal error signal "n") + 2 (control-c is fatal error signal 2)
            std::process::exit(130);
        } else {
            intr.set();
        }
    })?;

    let mut cfg = CtfConfig::load_merge_with_opts(opts.rd_opts, opts.dec_opts)?;
    if !opts.channel.is_empty() {
        cfg.import.channels = opts.channel;
    }
    if let Some(max) = opts.max_events {
        cfg.import.max_events = max.into();
    }
    if let Some(ns) = opts.clock_offset_ns {
        cfg.import.clock_offset_ns = ns.into();
    }
    if let Some(s) = opts.clock_offset_s {
        cfg.import.clock_offset_s = s.into();
    }
    if !opts.inputs.is_empty() {
        cfg.import.inputs = opts.inputs;
    }

    let mut rename_channel_attrs = opts.rename_channel_attr.clone();
    rename_channel_attrs.extend(cfg.rename_channel_attrs.clone());

    let mut rename_event_attrs = opts.rename_event_attr.clone();
    rename_event_attrs.extend(cfg.rename_event_attrs.clone());

    if cfg.import.inputs.is_empty() {
        return Err(Error::MissingInputs.into());
    }

    let mut printer = Printer::new(
        AttrKeyInterner::new(&rename_channel_attrs, &rename_event_attrs),
        opts.summary,
    );

    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let mut tasks = Vec::new();
    for input in cfg.import.inputs.iter() {
        let source = open_source(input).map_err(Error::from)?;
        let traces = discover(source.as_ref()).map_err(Error::from)?;
        for trace in traces.into_iter() {
            let metadata = Arc::new(trace.load_metadata(source.as_ref()).map_err(Error::from)?);
            let props = Arc::new(CtfProperties::new(&metadata));
            if props.streams.is_empty() {
                warn!(
                    "Trace '{}' in '{}' doesn't declare any streams",
                    trace.dir,
                    input.display()
                );
            }
            printer.print_trace(input, &trace.dir);

            for entry in trace.channels.iter() {
                if !cfg.import.includes_channel(channel_display_name(entry)) {
                    debug!(channel = %entry, "Skipping channel");
                    continue;
                }
                let job = ChannelJob {
                    source: source.clone(),
                    trace: trace.clone(),
                    metadata: metadata.clone(),
                    props: props.clone(),
                    entry: entry.clone(),
                    context_fields: cfg.context_field_names(),
                    max_events: cfg.import.max_events,
                    clock_offset: cfg.import.clock_offset(),
                    intr: interruptor.clone(),
                    tx: tx.clone(),
                };
                tasks.push(tokio::task::spawn_blocking(move || job.run()));
            }
        }
    }
    drop(tx);

    printer.consume(rx).await;

    for t in tasks.into_iter() {
        t.await?;
    }

    Ok(())
}

struct ChannelJob {
    source: Arc<dyn EntrySource>,
    trace: TraceEntries,
    metadata: Arc<Metadata>,
    props: Arc<CtfProperties>,
    entry: String,
    context_fields: ContextFieldNames,
    max_events: Option<MaxEvents>,
    clock_offset: i128,
    intr: Interruptor,
    tx: mpsc::Sender<Record>,
}

impl ChannelJob {
    fn run(self) {
        let mut events = 0;
        let mut packets = 0;
        let result = self.decode(&mut events, &mut packets);
        let _ = self.tx.blocking_send(Record::Done {
            entry: self.entry.clone(),
            events,
            packets,
            result,
        });
    }

    fn decode(&self, events: &mut u64, packets: &mut u64) -> Result<(), ctf_reader::error::Error> {
        let mut reader = self.trace.open_channel(
            self.source.as_ref(),
            self.metadata.clone(),
            &self.entry,
            self.context_fields.clone(),
        )?;
        let channel: Arc<str> = reader.name().into();

        let mut result = Ok(());
        for maybe_event in reader.by_ref() {
            if self.intr.is_set() {
                break;
            }
            if let Some(max) = self.max_events {
                if *events >= max.0 {
                    break;
                }
            }
            let mut event = match maybe_event {
                Ok(ev) => ev,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            event.timestamp_ns = event.timestamp_ns.map(|ns| ns + self.clock_offset);

            if *events == 0 {
                let record = Record::Channel {
                    name: channel.clone(),
                    stream_id: event.stream_id,
                    props: self.props.clone(),
                };
                if self.tx.blocking_send(record).is_err() {
                    break;
                }
            }
            *events += 1;

            let record = Record::Event {
                channel: channel.clone(),
                event: Box::new(event),
            };
            if self.tx.blocking_send(record).is_err() {
                break;
            }
        }
        *packets = reader.packets();
        result
    }
}

struct Printer {
    keys: AttrKeyInterner,
    summary: bool,
}

impl Printer {
    fn new(keys: AttrKeyInterner, summary: bool) -> Self {
        Printer { keys, summary }
    }

    async fn consume(&mut self, mut rx: mpsc::Receiver<Record>) {
        while let Some(record) = rx.recv().await {
            match record {
                Record::Channel {
                    name,
                    stream_id,
                    props,
                } => {
                    if self.summary {
                        continue;
                    }
                    println!("channel {name}");
                    match props.channel_attr_kvs(stream_id, &name) {
                        Some(attr_kvs) => {
                            for (k, v) in attr_kvs.into_iter() {
                                println!("  {}={v}", self.keys.channel_key(k));
                            }
                        }
                        None => warn!(channel = %name, stream_id, "Channel stream not declared"),
                    }
                }
                Record::Event { channel, event } => {
                    if !self.summary {
                        self.print_event(&channel, &event);
                    }
                }
                Record::Done {
                    entry,
                    events,
                    packets,
                    result,
                } => {
                    match result {
                        Err(e) if e.is_decode_invariant() => {
                            error!(channel = %entry, events, "Malformed event data: {e}")
                        }
                        Err(e) => error!(channel = %entry, events, "Channel decoding failed: {e}"),
                        Ok(()) => (),
                    }
                    if self.summary {
                        println!("{entry}: {events} events, {packets} packets");
                    }
                }
            }
        }
    }

    /// Trace attributes are printed with each of its channels
    fn print_trace(&self, input: &Path, dir: &str) {
        if !self.summary {
            println!("trace {}:{dir}", input.display());
        }
    }

    fn print_event(&mut self, channel: &str, event: &Event) {
        let ts = match event.timestamp_ns {
            Some(ns) => ns.to_string(),
            None => format!("{} cycles", event.timestamp),
        };
        let attr_kvs = match event.attr_kvs() {
            Ok(kvs) => kvs,
            Err(e) => {
                warn!(channel, event = event.name(), "Failed to flatten event: {e}");
                return;
            }
        };
        let mut line = format!("[{ts}] {channel} {}", event.name());
        for (k, v) in attr_kvs.into_iter() {
            if matches!(k, EventAttrKey::Name | EventAttrKey::Timestamp) {
                continue;
            }
            line.push(' ');
            line.push_str(&self.keys.event_key(k));
            line.push('=');
            line.push_str(&v.to_string());
        }
        println!("{line}");
    }
}
