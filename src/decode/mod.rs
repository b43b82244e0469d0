//! Bit-granular decoding of CTF binary data driven by a resolved schema.

use crate::error::Error;
use crate::metadata::ByteOrder;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use std::io::{self, Read};

pub use value::{FieldValue, RawArray, StructValue, Value};

mod reader;
mod value;

/// Upper bound on how much a single event may buffer
const MAX_BUFFERED_BYTES: usize = 256 * 1024 * 1024;

/// A forward-only bit cursor over a byte source.
///
/// Bytes are pulled from the source only as reads need them, never more, so the source
/// position always matches what has been decoded (rounded up to the byte). Alignment is
/// computed against the packet-relative bit position.
#[derive(Debug)]
pub struct BitCursor<R> {
    source: R,
    buf: Vec<u8>,
    /// Valid bytes in `buf`
    buffered: usize,
    /// Read position within `buf`, in bits
    bit_offset: u64,
    /// Packet-relative bit position of `buf[0]`
    base_bits: u64,
    /// Total bytes pulled from the source
    source_pos: u64,
    /// Source position where the current packet starts
    packet_start: u64,
    /// Bytes of the current packet's content not yet pulled from the source
    remaining_in_content: Option<u64>,
    eof: bool,
}

impl<R: Read> BitCursor<R> {
    pub fn new(source: R) -> Self {
        Self::with_origin(source, 0)
    }

    /// A cursor whose first byte sits at packet-relative bit position `origin_bits`
    pub fn with_origin(source: R, origin_bits: u64) -> Self {
        BitCursor {
            source,
            buf: Vec::new(),
            buffered: 0,
            bit_offset: 0,
            base_bits: origin_bits,
            source_pos: 0,
            packet_start: 0,
            remaining_in_content: None,
            eof: false,
        }
    }

    /// Packet-relative position in bits
    pub fn position_bits(&self) -> u64 {
        self.base_bits + self.bit_offset
    }

    /// Byte offset within the whole source of the current read position
    pub fn channel_offset(&self) -> u64 {
        self.source_pos - self.buffered as u64 + self.bit_offset / 8
    }

    /// Bytes of the current packet pulled from the source so far
    pub fn packet_bytes_read(&self) -> u64 {
        self.source_pos - self.packet_start
    }

    pub fn remaining_in_content(&self) -> Option<u64> {
        self.remaining_in_content
    }

    /// Limits how many more bytes of the current packet may be pulled
    pub fn set_remaining_in_content(&mut self, remaining: Option<u64>) {
        self.remaining_in_content = remaining;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Starts a packet at the current source position, dropping any buffered bits.
    pub fn start_packet(&mut self) {
        self.buffered = 0;
        self.bit_offset = 0;
        self.base_bits = 0;
        self.packet_start = self.source_pos;
        self.remaining_in_content = None;
    }

    /// Discards `n` bytes straight from the source, returning how many were available
    pub fn skip_source_bytes(&mut self, n: u64) -> Result<u64, Error> {
        if n == 0 {
            return Ok(0);
        }
        let skipped = io::copy(&mut (&mut self.source).take(n), &mut io::sink())?;
        self.source_pos += skipped;
        if skipped < n {
            self.eof = true;
        }
        Ok(skipped)
    }

    /// Drops the fully consumed bytes at the front of the buffer
    pub fn compact(&mut self) {
        let consumed = (self.bit_offset / 8) as usize;
        if consumed == 0 {
            return;
        }
        self.buf.copy_within(consumed..self.buffered, 0);
        self.buffered -= consumed;
        self.bit_offset -= consumed as u64 * 8;
        self.base_bits += consumed as u64 * 8;
    }

    /// Makes sure the next `bits` bits are buffered
    pub fn ensure(&mut self, bits: u64) -> Result<(), Error> {
        let needed = (self.bit_offset + bits).div_ceil(8);
        let needed = usize::try_from(needed)
            .ok()
            .filter(|n| *n <= MAX_BUFFERED_BYTES)
            .ok_or(Error::ContentOverrun {
                offset: self.channel_offset(),
            })?;
        if needed > self.buffered {
            self.fill(needed - self.buffered)?;
        }
        Ok(())
    }

    /// Pulls exactly `n` more bytes from the source
    fn fill(&mut self, n: usize) -> Result<(), Error> {
        if let Some(remaining) = self.remaining_in_content {
            if n as u64 > remaining {
                return Err(Error::ContentOverrun {
                    offset: self.channel_offset(),
                });
            }
        }
        let needed = self.buffered + n;
        if self.buf.len() < needed {
            self.buf.resize(needed.next_multiple_of(8), 0);
        }
        let mut got = 0;
        while got < n {
            match self.source.read(&mut self.buf[self.buffered + got..needed]) {
                Ok(0) => break,
                Ok(k) => got += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.source_pos += got as u64;
        if got < n {
            // The partial bytes are dropped
            self.eof = true;
            return Err(Error::Truncated {
                offset: self.source_pos,
            });
        }
        self.buffered = needed;
        if let Some(remaining) = self.remaining_in_content.as_mut() {
            *remaining -= n as u64;
        }
        Ok(())
    }

    /// Rounds the position up to a multiple of `align` bits
    pub fn align_to(&mut self, align: u32) -> Result<(), Error> {
        let align = u64::from(align.max(1));
        let pos = self.position_bits();
        let pad = (align - pos % align) % align;
        self.skip_bits(pad)
    }

    pub fn skip_bits(&mut self, bits: u64) -> Result<(), Error> {
        if bits > 0 {
            self.ensure(bits)?;
            self.bit_offset += bits;
        }
        Ok(())
    }

    /// Reads an unsigned value of `size` bits (1..=64)
    pub fn read_bits(&mut self, size: u32, byte_order: ByteOrder) -> Result<u64, Error> {
        self.ensure(u64::from(size))?;
        let v = if self.bit_offset % 8 == 0 && matches!(size, 8 | 16 | 32 | 64) {
            let b = &self.buf[(self.bit_offset / 8) as usize..self.buffered];
            match (size, byte_order) {
                (8, _) => u64::from(b[0]),
                (16, ByteOrder::LittleEndian) => u64::from(LittleEndian::read_u16(b)),
                (16, ByteOrder::BigEndian) => u64::from(BigEndian::read_u16(b)),
                (32, ByteOrder::LittleEndian) => u64::from(LittleEndian::read_u32(b)),
                (32, ByteOrder::BigEndian) => u64::from(BigEndian::read_u32(b)),
                (_, ByteOrder::LittleEndian) => LittleEndian::read_u64(b),
                (_, ByteOrder::BigEndian) => BigEndian::read_u64(b),
            }
        } else {
            extract_bits(&self.buf[..self.buffered], self.bit_offset, size, byte_order)
        };
        self.bit_offset += u64::from(size);
        Ok(v)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_bits(8, ByteOrder::LittleEndian)? as u8)
    }

    /// Copies out the next `bits` bits as whole bytes.
    ///
    /// Returns the bytes and the bit offset of the first bit within the first byte.
    pub fn take_bits(&mut self, bits: u64) -> Result<(Vec<u8>, u8), Error> {
        self.ensure(bits)?;
        let start = (self.bit_offset / 8) as usize;
        let end = (self.bit_offset + bits).div_ceil(8) as usize;
        let start_bit = (self.bit_offset % 8) as u8;
        let bytes = self.buf[start..end].to_vec();
        self.bit_offset += bits;
        Ok((bytes, start_bit))
    }
}

/// Assembles `size` bits starting at `bit_offset` one bit at a time.
///
/// Little-endian fields start at the least significant bit of a byte, big-endian fields at
/// the most significant one.
pub(crate) fn extract_bits(buf: &[u8], bit_offset: u64, size: u32, byte_order: ByteOrder) -> u64 {
    let mut v = 0_u64;
    for i in 0..u64::from(size) {
        let pos = bit_offset + i;
        let byte = buf[(pos / 8) as usize];
        match byte_order {
            ByteOrder::LittleEndian => {
                let bit = (byte >> (pos % 8)) & 1;
                v |= u64::from(bit) << i;
            }
            ByteOrder::BigEndian => {
                let bit = (byte >> (7 - pos % 8)) & 1;
                v = (v << 1) | u64::from(bit);
            }
        }
    }
    v
}

/// Sign-extends the low `size` bits of `raw`
pub(crate) fn sign_extend(raw: u64, size: u32) -> i64 {
    if size < 64 && (raw >> (size - 1)) & 1 == 1 {
        (raw | (u64::MAX << size)) as i64
    } else {
        raw as i64
    }
}
