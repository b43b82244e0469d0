use ctf_reader::attrs::{AttrVal, EventAttrKey};
use ctf_reader::channel::CTF_PACKET_MAGIC;
use ctf_reader::prelude::*;
use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const METADATA: &str = r#"/* CTF 1.8 */

typealias integer { size = 8; align = 8; signed = false; } := uint8_t;
typealias integer { size = 16; align = 8; signed = false; } := uint16_t;
typealias integer { size = 32; align = 8; signed = false; } := uint32_t;
typealias integer { size = 32; align = 8; signed = true; } := int32_t;

trace {
    major = 1;
    minor = 8;
    byte_order = le;
    packet.header := struct {
        uint32_t magic;
        uint32_t stream_id;
    };
};

env {
    hostname = "e2e";
    tracer_name = "hand-rolled";
};

clock {
    name = "mono";
    freq = 1000000;
    offset_s = 10;
};

typealias integer {
    size = 64; align = 8; signed = false;
    map = clock.mono.value;
} := mono_t;

stream {
    id = 0;
    event.header := struct {
        uint16_t id;
        mono_t timestamp;
    };
    packet.context := struct {
        uint32_t content_size;
        uint32_t packet_size;
    };
};

event {
    name = "sched_switch";
    id = 0;
    stream_id = 0;
    fields := struct {
        string prev_comm;
        int32_t prev_tid;
        enum : uint8_t { RUNNING = 0, SLEEPING = 1 } prev_state;
    };
};

event {
    name = "counter";
    id = 1;
    stream_id = 0;
    fields := struct {
        uint8_t len;
        uint16_t vals[len];
    };
};
"#;

/// Every field is byte aligned, so events are packed back to back
#[derive(Default)]
struct Packet {
    events: Vec<u8>,
}

impl Packet {
    fn header(&mut self, id: u16, ts: u64) {
        self.events.extend_from_slice(&id.to_le_bytes());
        self.events.extend_from_slice(&ts.to_le_bytes());
    }

    fn sched_switch(mut self, ts: u64, comm: &str, tid: i32, state: u8) -> Self {
        self.header(0, ts);
        self.events.extend_from_slice(comm.as_bytes());
        self.events.push(0);
        self.events.extend_from_slice(&tid.to_le_bytes());
        self.events.push(state);
        self
    }

    fn counter(mut self, ts: u64, vals: &[u16]) -> Self {
        self.header(1, ts);
        self.events.push(vals.len() as u8);
        for v in vals {
            self.events.extend_from_slice(&v.to_le_bytes());
        }
        self
    }

    fn build(&self, padding: usize) -> Vec<u8> {
        let content = 16 + self.events.len();
        let mut p = Vec::new();
        p.extend_from_slice(&CTF_PACKET_MAGIC.to_le_bytes());
        p.extend_from_slice(&0_u32.to_le_bytes());
        p.extend_from_slice(&((content * 8) as u32).to_le_bytes());
        p.extend_from_slice(&(((content + padding) * 8) as u32).to_le_bytes());
        p.extend_from_slice(&self.events);
        p.extend(std::iter::repeat(0).take(padding));
        p
    }
}

fn channel0_0() -> Vec<u8> {
    let mut bytes = Packet::default()
        .sched_switch(1, "bash", -5, 1)
        .counter(2, &[10, 11])
        .build(7);
    bytes.extend(Packet::default().sched_switch(3, "sh", 42, 0).build(0));
    bytes
}

fn channel0_1() -> Vec<u8> {
    let mut bytes = Packet::default().counter(5, &[]).build(0);
    let next = Packet::default().counter(6, &[1]).build(0);
    bytes.extend_from_slice(&next[..next.len() - 1]);
    bytes
}

fn write_trace(root: &Path) {
    let dir = root.join("trace");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("metadata"), METADATA).unwrap();
    fs::write(dir.join("channel0_0"), channel0_0()).unwrap();
    fs::write(dir.join("channel0_1"), channel0_1()).unwrap();
}

fn write_zip(path: &Path) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, contents) in [
        ("trace/metadata", METADATA.as_bytes().to_vec()),
        ("trace/channel0_0", channel0_0()),
        ("trace/channel0_1", channel0_1()),
    ] {
        zip.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&contents).unwrap();
    }
    zip.finish().unwrap();
}

fn event_attrs(e: &Event) -> Vec<(String, AttrVal)> {
    e.attr_kvs()
        .unwrap()
        .into_iter()
        .filter(|(k, _)| matches!(k, EventAttrKey::Field(_)))
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn check_source(source: &dyn EntrySource) {
    let traces = discover(source).unwrap();
    assert_eq!(traces.len(), 1);
    let trace = &traces[0];
    assert_eq!(trace.dir, "trace");
    assert_eq!(
        trace.channels,
        vec!["trace/channel0_0".to_owned(), "trace/channel0_1".to_owned()]
    );

    let metadata = Arc::new(trace.load_metadata(source).unwrap());
    assert_eq!(metadata.environment.hostname(), Some("e2e"));
    let props = CtfProperties::new(&metadata);
    assert_eq!(props.streams.len(), 1);

    let mut reader = trace
        .open_channel(
            source,
            metadata.clone(),
            &trace.channels[0],
            ContextFieldNames::default(),
        )
        .unwrap();
    assert_eq!(reader.name(), "channel0_0");
    let events: Vec<Event> = reader.by_ref().map(|e| e.unwrap()).collect();
    assert_eq!(reader.packets(), 2);

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["sched_switch", "counter", "sched_switch"]);
    let timestamps: Vec<Option<i128>> = events.iter().map(|e| e.timestamp_ns).collect();
    assert_eq!(
        timestamps,
        vec![
            Some(10_000_001_000),
            Some(10_000_002_000),
            Some(10_000_003_000)
        ]
    );

    assert_eq!(
        event_attrs(&events[0]),
        vec![
            ("event.prev_comm".to_owned(), AttrVal::from("bash")),
            ("event.prev_tid".to_owned(), AttrVal::Integer(-5)),
            ("event.prev_state".to_owned(), AttrVal::Integer(1)),
            ("event.prev_state.label".to_owned(), AttrVal::from("SLEEPING")),
        ]
    );
    assert_eq!(
        event_attrs(&events[1]),
        vec![
            ("event.len".to_owned(), AttrVal::Integer(2)),
            ("event.vals.0".to_owned(), AttrVal::Integer(10)),
            ("event.vals.1".to_owned(), AttrVal::Integer(11)),
        ]
    );
    assert_eq!(
        events[2].field("prev_comm").and_then(Value::as_str),
        Some("sh")
    );
    assert_eq!(events[2].packet.packet_size, Some(8 * (16 + 10 + 3 + 4 + 1)));

    // The second packet of this channel is cut short, its events are dropped
    let events: Vec<Event> = trace
        .open_channel(
            source,
            metadata,
            &trace.channels[1],
            ContextFieldNames::default(),
        )
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("len").and_then(Value::as_u64), Some(0));
}

#[test]
fn decode_directory_trace() {
    let dir = tempfile::tempdir().unwrap();
    write_trace(dir.path());
    let source = open_source(dir.path()).unwrap();
    check_source(source.as_ref());
}

#[test]
fn decode_zip_trace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.zip");
    write_zip(&path);
    let source = open_source(&path).unwrap();
    check_source(source.as_ref());
}
