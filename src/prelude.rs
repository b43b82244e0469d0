pub use crate::attrs::{AttrVal, ChannelAttrKey, EventAttrKey};
pub use crate::channel::{ChannelReader, PacketContext};
pub use crate::config::{AttrKeyRename, CtfConfig, DecodeConfig, ImportConfig};
pub use crate::decode::{StructValue, Value};
pub use crate::event::{ContextFieldNames, Event};
pub use crate::metadata::{Clock, Metadata};
pub use crate::opts::{DecodeOpts, ReaderOpts};
pub use crate::properties::{CtfProperties, CtfStreamProperties, CtfTraceProperties};
pub use crate::source::{discover, open_source, EntrySource, TraceEntries};
pub use crate::types::{Interruptor, MaxEvents};
