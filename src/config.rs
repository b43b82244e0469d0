use crate::event::ContextFieldNames;
use crate::opts::{DecodeOpts, ReaderOpts};
use crate::types::MaxEvents;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "CTF_READER_CONFIG";

const CONFIG_DIR_NAME: &str = "ctf-reader";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CtfConfig {
    pub decode: DecodeConfig,

    pub import: ImportConfig,

    /// Rename a channel attribute key as it is being emitted
    pub rename_channel_attrs: Vec<AttrKeyRename>,

    /// Rename an event attribute key as it is being emitted
    pub rename_event_attrs: Vec<AttrKeyRename>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AttrKeyRename {
    /// The attr key to rename
    pub original: String,

    /// The new attr key name to use
    pub new: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DecodeConfig {
    /// Context fields probed for the process ID, first match wins
    pub process_id_fields: Vec<String>,

    /// Context fields probed for the thread ID, first match wins
    pub thread_id_fields: Vec<String>,

    /// Context fields probed for the process name, first match wins
    pub process_name_fields: Vec<String>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        let names = ContextFieldNames::default();
        DecodeConfig {
            process_id_fields: names.process_id,
            thread_id_fields: names.thread_id,
            process_name_fields: names.process_name,
        }
    }
}

impl From<&DecodeConfig> for ContextFieldNames {
    fn from(c: &DecodeConfig) -> Self {
        ContextFieldNames {
            process_id: c.process_id_fields.clone(),
            thread_id: c.thread_id_fields.clone(),
            process_name: c.process_name_fields.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ImportConfig {
    /// Trace directories or zip archives
    pub inputs: Vec<PathBuf>,

    /// Only decode channels with these names, all channels when empty
    pub channels: Vec<String>,

    /// Added to every clock's offset, in seconds
    pub clock_offset_s: Option<i64>,

    /// Added to every clock's offset, in nanoseconds
    pub clock_offset_ns: Option<i64>,

    /// Stop each channel after this many events
    pub max_events: Option<MaxEvents>,
}

impl ImportConfig {
    /// The user clock offset, in nanoseconds
    pub fn clock_offset(&self) -> i128 {
        i128::from(self.clock_offset_s.unwrap_or(0)) * 1_000_000_000
            + i128::from(self.clock_offset_ns.unwrap_or(0))
    }

    pub fn includes_channel(&self, name: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == name)
    }
}

impl CtfConfig {
    pub fn try_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load_merge_with_opts(
        rd_opts: ReaderOpts,
        dec_opts: DecodeOpts,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut cfg = if let Some(cfg_path) = &rd_opts.config_file {
            Self::try_from_file(cfg_path)?
        } else if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
            Self::try_from_file(Path::new(&env_path))?
        } else if let Some(default_path) = Self::default_path().filter(|p| p.exists()) {
            Self::try_from_file(&default_path)?
        } else {
            CtfConfig::default()
        };

        if !dec_opts.process_id_field.is_empty() {
            cfg.decode.process_id_fields = dec_opts.process_id_field;
        }
        if !dec_opts.thread_id_field.is_empty() {
            cfg.decode.thread_id_fields = dec_opts.thread_id_field;
        }
        if !dec_opts.process_name_field.is_empty() {
            cfg.decode.process_name_fields = dec_opts.process_name_field;
        }

        Ok(cfg)
    }

    pub fn context_field_names(&self) -> ContextFieldNames {
        ContextFieldNames::from(&self.decode)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{env, fs::File, io::Write};

    const IMPORT_CONFIG: &str = r#"rename-event-attrs = [
    { original = "event.msg", new = "event.message" },
]

[decode]
process-id-fields = ['pid']

[import]
inputs = ['path/traces-a', 'path/traces-b.zip']
channels = ['channel0_0']
clock-offset-s = 2
clock-offset-ns = -1
max-events = 10
"#;

    #[test]
    fn import_cfg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_config.toml");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(IMPORT_CONFIG.as_bytes()).unwrap();
            f.flush().unwrap();
        }

        let cfg = CtfConfig::load_merge_with_opts(
            ReaderOpts {
                config_file: Some(path.to_path_buf()),
            },
            Default::default(),
        )
        .unwrap();

        env::set_var(CONFIG_ENV_VAR, &path);
        let env_cfg =
            CtfConfig::load_merge_with_opts(Default::default(), Default::default()).unwrap();
        env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(cfg, env_cfg);

        assert_eq!(
            cfg,
            CtfConfig {
                decode: DecodeConfig {
                    process_id_fields: vec!["pid".to_owned()],
                    ..Default::default()
                },
                import: ImportConfig {
                    inputs: vec![
                        PathBuf::from("path/traces-a"),
                        PathBuf::from("path/traces-b.zip")
                    ],
                    channels: vec!["channel0_0".to_owned()],
                    clock_offset_s: Some(2),
                    clock_offset_ns: Some(-1),
                    max_events: Some(MaxEvents(10)),
                },
                rename_channel_attrs: Default::default(),
                rename_event_attrs: vec![AttrKeyRename {
                    original: "event.msg".to_owned(),
                    new: "event.message".to_owned(),
                }],
            }
        );
        assert_eq!(cfg.import.clock_offset(), 1_999_999_999);
        assert!(cfg.import.includes_channel("channel0_0"));
        assert!(!cfg.import.includes_channel("channel0_1"));
    }

    #[test]
    fn cli_overrides_decode_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_config.toml");
        std::fs::write(&path, IMPORT_CONFIG).unwrap();

        let cfg = CtfConfig::load_merge_with_opts(
            ReaderOpts {
                config_file: Some(path),
            },
            DecodeOpts {
                thread_id_field: vec!["lwp".to_owned()],
                ..Default::default()
            },
        )
        .unwrap();
        let names = cfg.context_field_names();
        assert_eq!(names.process_id, vec!["pid".to_owned()]);
        assert_eq!(names.thread_id, vec!["lwp".to_owned()]);
        assert_eq!(names.process_name, ContextFieldNames::default().process_name);
    }

    #[test]
    fn empty_cfg_is_default() {
        let cfg: CtfConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, CtfConfig::default());
        assert_eq!(cfg.context_field_names(), ContextFieldNames::default());
        assert!(cfg.import.includes_channel("anything"));
    }

    #[test]
    fn malformed_cfg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[import]\nmax-events = 'lots'\n").unwrap();
        assert!(CtfConfig::try_from_file(&path).is_err());
    }
}
