use derive_more::{Display, From, Into};
use serde::Deserialize;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;

#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct Interruptor(Arc<AtomicBool>);

impl Interruptor {
    pub fn new() -> Self {
        Interruptor(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(SeqCst)
    }
}

impl Default for Interruptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Event log levels, as declared by the `loglevel` event attribute (LTTng numbering)
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum LogLevel {
    #[display(fmt = "EMERG")]
    Emergency,
    #[display(fmt = "ALERT")]
    Alert,
    #[display(fmt = "CRIT")]
    Critical,
    #[display(fmt = "ERR")]
    Error,
    #[display(fmt = "WARNING")]
    Warning,
    #[display(fmt = "NOTICE")]
    Notice,
    #[display(fmt = "INFO")]
    Info,
    #[display(fmt = "DEBUG_SYSTEM")]
    DebugSystem,
    #[display(fmt = "DEBUG_PROGRAM")]
    DebugProgram,
    #[display(fmt = "DEBUG_PROCESS")]
    DebugProcess,
    #[display(fmt = "DEBUG_MODULE")]
    DebugModule,
    #[display(fmt = "DEBUG_UNIT")]
    DebugUnit,
    #[display(fmt = "DEBUG_FUNCTION")]
    DebugFunction,
    #[display(fmt = "DEBUG_LINE")]
    DebugLine,
    #[display(fmt = "DEBUG")]
    Debug,
    #[display(fmt = "{_0}")]
    Other(i64),
}

impl From<i64> for LogLevel {
    fn from(level: i64) -> Self {
        use LogLevel::*;
        match level {
            0 => Emergency,
            1 => Alert,
            2 => Critical,
            3 => Error,
            4 => Warning,
            5 => Notice,
            6 => Info,
            7 => DebugSystem,
            8 => DebugProgram,
            9 => DebugProcess,
            10 => DebugModule,
            11 => DebugUnit,
            12 => DebugFunction,
            13 => DebugLine,
            14 => Debug,
            other => Other(other),
        }
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, From, Into, Display,
)]
#[repr(transparent)]
pub struct MaxEvents(pub u64);

impl FromStr for MaxEvents {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MaxEvents(s.trim().parse::<u64>()?))
    }
}
