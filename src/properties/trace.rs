use crate::attrs::{AttrVal, ChannelAttrKey};
use crate::metadata::{EnvValue, Metadata};
use std::collections::BTreeMap;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CtfTraceProperties {
    attrs: BTreeMap<ChannelAttrKey, AttrVal>,
}

impl CtfTraceProperties {
    pub fn new(m: &Metadata) -> Self {
        let mut attrs = BTreeMap::default();

        if let Some(uuid) = m.trace.uuid {
            attrs.insert(ChannelAttrKey::TraceUuid, uuid.to_string().into());
        }
        if let (Some(major), Some(minor)) = (m.trace.major, m.trace.minor) {
            attrs.insert(ChannelAttrKey::TraceVersion, format!("{major}.{minor}").into());
        }
        attrs.insert(
            ChannelAttrKey::TraceByteOrder,
            m.trace.byte_order.to_string().into(),
        );
        attrs.insert(
            ChannelAttrKey::TraceStreamCount,
            AttrVal::from(m.streams().count() as u64),
        );

        let env = &m.environment;
        if let Some(h) = env.hostname() {
            attrs.insert(ChannelAttrKey::TraceHostname, h.into());
        }
        if let Some(d) = env.domain() {
            attrs.insert(ChannelAttrKey::TraceDomain, d.into());
        }
        if let Some(name) = env.tracer_name() {
            let tracer = match env.tracer_version() {
                Some(v) => format!("{name} {v}"),
                None => name.to_owned(),
            };
            attrs.insert(ChannelAttrKey::TraceTracer, tracer.into());
        }
        for (k, v) in env.entries() {
            attrs.insert(
                ChannelAttrKey::TraceEnv(k.to_owned()),
                match v {
                    EnvValue::Integer(int) => AttrVal::Integer(*int),
                    EnvValue::String(s) => AttrVal::String(s.clone()),
                },
            );
        }

        Self { attrs }
    }

    pub fn attr_kvs(&self) -> Vec<(ChannelAttrKey, AttrVal)> {
        self.attrs.clone().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::LTTNG_METADATA;
    use pretty_assertions::assert_eq;

    #[test]
    fn lttng_trace_attrs() {
        let m = Metadata::from_text(LTTNG_METADATA).unwrap();
        let props = CtfTraceProperties::new(&m);
        let attrs: BTreeMap<String, AttrVal> = props
            .attr_kvs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(
            attrs.get("channel.internal.ctf.trace.version"),
            Some(&AttrVal::from("1.8"))
        );
        assert_eq!(
            attrs.get("channel.internal.ctf.trace.byte_order"),
            Some(&AttrVal::from("le"))
        );
        assert_eq!(
            attrs.get("channel.internal.ctf.trace.stream_count"),
            Some(&AttrVal::Integer(1))
        );
        assert_eq!(
            attrs.get("channel.internal.ctf.trace.uuid"),
            m.trace
                .uuid
                .map(|u| AttrVal::from(u.to_string()))
                .as_ref()
        );
        assert_eq!(
            attrs.get("channel.internal.ctf.trace.hostname"),
            Some(&AttrVal::from("testhost"))
        );
        assert_eq!(
            attrs.get("channel.internal.ctf.trace.tracer"),
            Some(&AttrVal::from("lttng-ust 2.13"))
        );
        for (k, _) in m.environment.entries() {
            assert!(attrs.contains_key(&format!("channel.internal.ctf.trace.env.{k}")));
        }
    }
}
