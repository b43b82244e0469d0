use clap::Parser;
use std::path::PathBuf;

/// Options common to every tool built on the reader
#[derive(Parser, Debug, Clone, Default)]
pub struct ReaderOpts {
    /// Use configuration from file
    #[clap(long = "config", name = "config file", help_heading = "CONFIGURATION")]
    pub config_file: Option<PathBuf>,
}

/// Decoder tuning
#[derive(Parser, Debug, Clone, Default)]
pub struct DecodeOpts {
    /// Context field names probed for the process ID, in order. Repeatable
    #[clap(long, name = "pid-field", help_heading = "DECODE CONFIGURATION")]
    pub process_id_field: Vec<String>,

    /// Context field names probed for the thread ID, in order. Repeatable
    #[clap(long, name = "tid-field", help_heading = "DECODE CONFIGURATION")]
    pub thread_id_field: Vec<String>,

    /// Context field names probed for the process name, in order. Repeatable
    #[clap(long, name = "procname-field", help_heading = "DECODE CONFIGURATION")]
    pub process_name_field: Vec<String>,
}
