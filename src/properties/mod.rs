use crate::attrs::{AttrVal, ChannelAttrKey};
use crate::metadata::Metadata;
use std::collections::BTreeMap;

pub use stream::CtfStreamProperties;
pub use trace::CtfTraceProperties;

pub(crate) mod stream;
pub(crate) mod trace;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CtfProperties {
    pub trace: CtfTraceProperties,
    pub streams: BTreeMap<u64, CtfStreamProperties>,
}

impl CtfProperties {
    pub fn new(m: &Metadata) -> Self {
        let trace = CtfTraceProperties::new(m);
        let streams = m
            .streams()
            .map(|s| (s.id, CtfStreamProperties::new(s, m.stream_clock(s))))
            .collect();
        Self { trace, streams }
    }

    /// Attributes of a channel carrying `stream_id`, trace-level attributes included
    pub fn channel_attr_kvs(
        &self,
        stream_id: u64,
        channel: &str,
    ) -> Option<Vec<(ChannelAttrKey, AttrVal)>> {
        let stream = self.streams.get(&stream_id)?;
        let mut attr_kvs = stream.clone().with_channel(channel).attr_kvs();
        attr_kvs.extend(self.trace.attr_kvs());
        Some(attr_kvs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::LTTNG_METADATA;
    use pretty_assertions::assert_eq;

    #[test]
    fn channel_attrs_include_trace_attrs() {
        let m = Metadata::from_text(LTTNG_METADATA).unwrap();
        let props = CtfProperties::new(&m);
        assert_eq!(props.streams.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert!(props.channel_attr_kvs(1, "channel0_0").is_none());

        let attr_kvs = props.channel_attr_kvs(0, "channel0_0").unwrap();
        let keys: Vec<String> = attr_kvs.iter().map(|(k, _)| k.to_string()).collect();
        assert!(keys.contains(&"channel.name".to_owned()));
        assert!(keys.contains(&"channel.internal.ctf.trace.hostname".to_owned()));
        assert_eq!(
            attr_kvs
                .iter()
                .find(|(k, _)| *k == ChannelAttrKey::Name)
                .map(|(_, v)| v.clone()),
            Some(AttrVal::from("channel0_0"))
        );
    }
}
