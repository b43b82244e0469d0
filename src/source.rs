//! Trace inputs: directory trees or zip archives holding one or more CTF traces.

use crate::channel::ChannelReader;
use crate::error::Error;
use crate::event::ContextFieldNames;
use crate::metadata::Metadata;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

const METADATA_ENTRY: &str = "metadata";

/// A container of named byte streams
pub trait EntrySource: Send + Sync {
    /// Every regular file, as `/`-separated paths relative to the source root
    fn entries(&self) -> Result<Vec<String>, Error>;

    fn open(&self, entry: &str) -> Result<Box<dyn Read + Send>, Error>;

    fn display_name(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirSource { root: root.into() }
    }
}

impl EntrySource for DirSource {
    fn entries(&self) -> Result<Vec<String>, Error> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(rel);
        }
        Ok(entries)
    }

    fn open(&self, entry: &str) -> Result<Box<dyn Read + Send>, Error> {
        let path = entry
            .split('/')
            .fold(self.root.clone(), |p, component| p.join(component));
        Ok(Box::new(File::open(path)?))
    }

    fn display_name(&self) -> String {
        self.root.display().to_string()
    }
}

/// Entries are read fully into memory when opened
#[derive(Clone, Debug)]
pub struct ZipSource {
    path: PathBuf,
}

impl ZipSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ZipSource { path: path.into() }
    }

    fn archive(&self) -> Result<ZipArchive<File>, Error> {
        Ok(ZipArchive::new(File::open(&self.path)?)?)
    }
}

impl EntrySource for ZipSource {
    fn entries(&self) -> Result<Vec<String>, Error> {
        let mut archive = self.archive()?;
        let mut entries = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let f = archive.by_index(idx)?;
            if f.is_file() {
                entries.push(f.name().trim_start_matches("./").to_owned());
            }
        }
        Ok(entries)
    }

    fn open(&self, entry: &str) -> Result<Box<dyn Read + Send>, Error> {
        let mut archive = self.archive()?;
        let mut f = archive.by_name(entry)?;
        let mut buf = Vec::with_capacity(f.size() as usize);
        f.read_to_end(&mut buf)?;
        Ok(Box::new(Cursor::new(buf)))
    }

    fn display_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Opens a trace input, a `.zip` archive or a directory
pub fn open_source(path: &Path) -> Result<Arc<dyn EntrySource>, Error> {
    let is_zip = path.is_file()
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
    if is_zip {
        Ok(Arc::new(ZipSource::new(path)))
    } else if path.is_dir() {
        Ok(Arc::new(DirSource::new(path)))
    } else {
        Err(Error::MissingMetadata(path.display().to_string()))
    }
}

/// One trace found in a source: its metadata entry and its channels
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TraceEntries {
    /// Directory of the trace within the source, empty for the root
    pub dir: String,
    pub metadata: String,
    pub channels: Vec<String>,
}

impl TraceEntries {
    pub fn load_metadata(&self, source: &dyn EntrySource) -> Result<Metadata, Error> {
        Metadata::from_reader(source.open(&self.metadata)?)
    }

    pub fn open_channel(
        &self,
        source: &dyn EntrySource,
        metadata: Arc<Metadata>,
        channel: &str,
        context_fields: ContextFieldNames,
    ) -> Result<ChannelReader<Box<dyn Read + Send>>, Error> {
        Ok(ChannelReader::with_context_fields(
            channel_display_name(channel),
            metadata,
            source.open(channel)?,
            context_fields,
        ))
    }
}

/// The file name of a channel entry
pub fn channel_display_name(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

/// Every directory holding a `metadata` entry is a trace, its other regular entries are the
/// channels. Hidden entries are skipped.
pub fn discover(source: &dyn EntrySource) -> Result<Vec<TraceEntries>, Error> {
    let mut dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in source.entries()? {
        let (dir, name) = match entry.rsplit_once('/') {
            Some((dir, name)) => (dir.to_owned(), name.to_owned()),
            None => (String::new(), entry.clone()),
        };
        if name.starts_with('.') {
            continue;
        }
        dirs.entry(dir).or_default().push(name);
    }

    let mut traces = Vec::new();
    for (dir, mut names) in dirs.into_iter() {
        if !names.iter().any(|n| n == METADATA_ENTRY) {
            continue;
        }
        names.sort();
        let path = |name: &str| {
            if dir.is_empty() {
                name.to_owned()
            } else {
                format!("{dir}/{name}")
            }
        };
        let channels = names
            .iter()
            .filter(|n| *n != METADATA_ENTRY)
            .map(|n| path(n))
            .collect::<Vec<_>>();
        debug!(
            source = %source.display_name(),
            dir = %dir,
            channels = channels.len(),
            "Found trace"
        );
        traces.push(TraceEntries {
            metadata: path(METADATA_ENTRY),
            channels,
            dir,
        });
    }
    if traces.is_empty() {
        return Err(Error::MissingMetadata(source.display_name()));
    }
    Ok(traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, contents).unwrap();
    }

    #[test]
    fn discovers_directory_traces() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ust/uid/1000/64-bit/metadata", b"/* CTF 1.8 */");
        write(dir.path(), "ust/uid/1000/64-bit/channel0_0", b"");
        write(dir.path(), "ust/uid/1000/64-bit/channel0_1", b"");
        write(dir.path(), "ust/uid/1000/64-bit/.hidden", b"");
        write(dir.path(), "ust/uid/1000/64-bit/index/channel0_0.idx", b"");
        write(dir.path(), "notes.txt", b"");

        let source = open_source(dir.path()).unwrap();
        let traces = discover(source.as_ref()).unwrap();
        assert_eq!(
            traces,
            vec![TraceEntries {
                dir: "ust/uid/1000/64-bit".to_owned(),
                metadata: "ust/uid/1000/64-bit/metadata".to_owned(),
                channels: vec![
                    "ust/uid/1000/64-bit/channel0_0".to_owned(),
                    "ust/uid/1000/64-bit/channel0_1".to_owned(),
                ],
            }]
        );
        let mut text = String::new();
        source
            .open(&traces[0].metadata)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "/* CTF 1.8 */");
        assert_eq!(channel_display_name(&traces[0].channels[1]), "channel0_1");
    }

    #[test]
    fn discovers_zip_traces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
            zip.start_file("metadata", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"trace {};").unwrap();
            zip.start_file("stream_0", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(&[1, 2, 3]).unwrap();
            zip.finish().unwrap();
        }
        let source = open_source(&path).unwrap();
        let traces = discover(source.as_ref()).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].dir, "");
        assert_eq!(traces[0].channels, vec!["stream_0".to_owned()]);
        let mut bytes = Vec::new();
        source
            .open("stream_0")
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "channel0_0", b"");
        let source = open_source(dir.path()).unwrap();
        assert!(matches!(
            discover(source.as_ref()),
            Err(Error::MissingMetadata(_))
        ));
        assert!(matches!(
            open_source(&dir.path().join("nope")),
            Err(Error::MissingMetadata(_))
        ));
    }
}
