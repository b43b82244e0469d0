use crate::error::Error;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use std::io::{self, Read};
use tracing::{debug, warn};

pub const METADATA_PACKET_MAGIC: u32 = 0x75D1_1D57;

/// magic, uuid, checksum, content_size, packet_size, compression_scheme,
/// encryption_scheme, checksum_scheme, major, minor
const METADATA_PACKET_HEADER_LEN: usize = 4 + 16 + 4 + 4 + 4 + 1 + 1 + 1 + 1 + 1;

/// Reads a whole metadata stream and returns its text.
///
/// The stream is either plain text or a sequence of metadata packets, detected from the
/// first four bytes.
pub fn read_metadata_text<R: Read>(mut r: R) -> Result<String, Error> {
    let mut raw = Vec::new();
    r.read_to_end(&mut raw)?;
    if raw.len() >= 4 {
        let le = LittleEndian::read_u32(&raw[..4]);
        let be = BigEndian::read_u32(&raw[..4]);
        if le == METADATA_PACKET_MAGIC {
            return unpacketize::<LittleEndian>(&raw);
        } else if be == METADATA_PACKET_MAGIC {
            return unpacketize::<BigEndian>(&raw);
        }
    }
    debug!(len = raw.len(), "Reading plain text metadata");
    String::from_utf8(raw).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("metadata is not valid UTF-8: {e}"),
        )
        .into()
    })
}

fn unpacketize<B: byteorder::ByteOrder>(raw: &[u8]) -> Result<String, Error> {
    let mut text = Vec::with_capacity(raw.len());
    let mut offset = 0;
    let mut packets = 0_usize;
    while offset < raw.len() {
        let header = match raw.get(offset..offset + METADATA_PACKET_HEADER_LEN) {
            Some(h) => h,
            None => {
                warn!(offset, "Metadata stream truncated inside a packet header");
                break;
            }
        };
        let magic = B::read_u32(&header[0..4]);
        if magic != METADATA_PACKET_MAGIC {
            return Err(Error::InvalidMagic {
                found: magic.into(),
                offset: offset as u64,
            });
        }
        let content_bits = u64::from(B::read_u32(&header[24..28]));
        let packet_bits = u64::from(B::read_u32(&header[28..32]));
        let (compression, encryption, checksum) = (header[32], header[33], header[34]);
        if compression != 0 || encryption != 0 {
            return Err(Error::UnsupportedFeature(format!(
                "compressed or encrypted metadata packets (compression {compression}, encryption {encryption})"
            )));
        }
        if checksum != 0 {
            debug!(checksum, "Ignoring metadata packet checksum");
        }
        let header_len = METADATA_PACKET_HEADER_LEN as u64;
        if content_bits / 8 < header_len || packet_bits < content_bits {
            return Err(Error::InvalidPacketSize {
                offset: offset as u64,
                header_bits: header_len * 8,
                content_bits,
                packet_bits,
            });
        }
        let content_start = offset + METADATA_PACKET_HEADER_LEN;
        let content_end = offset + (content_bits / 8) as usize;
        let packet_end = offset + (packet_bits / 8) as usize;
        match raw.get(content_start..content_end) {
            Some(content) => text.extend_from_slice(content),
            None => {
                warn!(offset, "Metadata stream truncated inside packet content");
                text.extend_from_slice(&raw[content_start.min(raw.len())..]);
                break;
            }
        }
        packets += 1;
        offset = packet_end;
    }
    debug!(packets, len = text.len(), "Read packetized metadata");
    // Some tracers pad the text with NULs
    while text.last() == Some(&0) {
        text.pop();
    }
    String::from_utf8(text).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("metadata is not valid UTF-8: {e}"),
        )
        .into()
    })
}
