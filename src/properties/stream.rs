use crate::attrs::{AttrVal, ChannelAttrKey, CHANNEL_INGEST_SOURCE_VAL};
use crate::metadata::{Clock, Stream};
use std::collections::BTreeMap;
use std::path::Path;

const CLOCK_STYLE_RELATIVE: &str = "relative";
const CLOCK_STYLE_UTC: &str = "utc";

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CtfStreamProperties {
    stream_id: u64,
    attrs: BTreeMap<ChannelAttrKey, AttrVal>,
}

impl CtfStreamProperties {
    pub fn new(s: &Stream, clock: Option<&Clock>) -> Self {
        let mut attrs = BTreeMap::default();

        attrs.insert(ChannelAttrKey::StreamId, AttrVal::from(s.id));
        attrs.insert(
            ChannelAttrKey::StreamEventCount,
            AttrVal::from(s.events().count() as u64),
        );
        attrs.insert(
            ChannelAttrKey::IngestSource,
            CHANNEL_INGEST_SOURCE_VAL.into(),
        );

        if let Some(c) = clock {
            attrs.insert(ChannelAttrKey::StreamClockFreq, AttrVal::from(c.frequency));
            attrs.insert(
                ChannelAttrKey::StreamClockOffsetSeconds,
                AttrVal::Integer(c.offset_seconds),
            );
            attrs.insert(
                ChannelAttrKey::StreamClockOffsetCycles,
                AttrVal::Integer(c.offset),
            );
            attrs.insert(
                ChannelAttrKey::StreamClockPrecision,
                AttrVal::from(c.precision),
            );
            attrs.insert(ChannelAttrKey::StreamClockUnixEpoch, c.absolute.into());
            attrs.insert(ChannelAttrKey::StreamClockName, c.name.as_str().into());
            if let Some(cd) = &c.description {
                attrs.insert(ChannelAttrKey::StreamClockDesc, cd.as_str().into());
            }
            if let Some(cid) = &c.uuid {
                attrs.insert(ChannelAttrKey::StreamClockUuid, cid.to_string().into());
                attrs.insert(ChannelAttrKey::TimeDomain, cid.to_string().into());
            }
            attrs.insert(
                ChannelAttrKey::ClockStyle,
                if c.absolute {
                    CLOCK_STYLE_UTC
                } else {
                    CLOCK_STYLE_RELATIVE
                }
                .into(),
            );
        }

        let mut props = Self {
            stream_id: s.id,
            attrs,
        };
        props.set_name(None);
        props
    }

    /// Names the channel after the file carrying it.
    ///
    /// Channel entries are paths within a trace source, which makes for long and unwieldy
    /// names, so the file name component is used when there is one. Without a channel the
    /// name falls back to `stream{stream_id}`, the LTTng naming convention.
    pub fn with_channel(mut self, channel: &str) -> Self {
        self.set_name(Some(channel));
        self
    }

    fn set_name(&mut self, channel: Option<&str>) {
        let name = channel
            .map(|c| {
                Path::new(c)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| c.to_owned())
            })
            .unwrap_or_else(|| format!("stream{}", self.stream_id));
        self.attrs.insert(
            ChannelAttrKey::Description,
            format!("CTF stream '{name}'").into(),
        );
        self.attrs.insert(ChannelAttrKey::Name, name.into());
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn attr_kvs(&self) -> Vec<(ChannelAttrKey, AttrVal)> {
        self.attrs.clone().into_iter().collect()
    }
}
