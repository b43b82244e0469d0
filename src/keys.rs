use crate::attrs::{ChannelAttrKey, EventAttrKey};
use crate::config::AttrKeyRename;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Renders attribute keys once, applying the configured renames
#[derive(Debug, Default)]
pub struct AttrKeyInterner {
    channel_renames: HashMap<String, String>,
    event_renames: HashMap<String, String>,
    channel_keys: BTreeMap<ChannelAttrKey, Arc<str>>,
    event_keys: BTreeMap<EventAttrKey, Arc<str>>,
}

impl AttrKeyInterner {
    /// When a key is renamed more than once the first rename wins
    pub fn new(channel_renames: &[AttrKeyRename], event_renames: &[AttrKeyRename]) -> Self {
        let to_map = |renames: &[AttrKeyRename]| {
            let mut m = HashMap::new();
            for r in renames.iter() {
                m.entry(r.original.clone()).or_insert_with(|| r.new.clone());
            }
            m
        };
        Self {
            channel_renames: to_map(channel_renames),
            event_renames: to_map(event_renames),
            ..Default::default()
        }
    }

    pub fn channel_key(&mut self, key: ChannelAttrKey) -> Arc<str> {
        if let Some(k) = self.channel_keys.get(&key) {
            k.clone()
        } else {
            let k = intern(&self.channel_renames, key.to_string());
            self.channel_keys.insert(key, k.clone());
            k
        }
    }

    pub fn event_key(&mut self, key: EventAttrKey) -> Arc<str> {
        if let Some(k) = self.event_keys.get(&key) {
            k.clone()
        } else {
            let k = intern(&self.event_renames, key.to_string());
            self.event_keys.insert(key, k.clone());
            k
        }
    }
}

fn intern(renames: &HashMap<String, String>, key: String) -> Arc<str> {
    match renames.get(&key) {
        Some(new) => new.as_str().into(),
        None => key.into(),
    }
}
