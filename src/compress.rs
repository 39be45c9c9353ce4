//! C1: the block-wise compressed stream underlying the RAP container
//! (spec §4.1), grounded on `original_source/rtemstoolkit/rld-compression.cpp`.
//!
//! Each block is independently compressed and independently decompressible
//! -- no LZ77 window state crosses a block boundary -- which is what lets
//! the RAP reader stream the container without ever seeking backwards. The
//! original calls out to `fastlz`; this crate uses `miniz_oxide`'s raw
//! (headerless) DEFLATE in the same restartable-per-block way, which is the
//! LZ77-family codec the rest of this retrieval pack (`backtrace-rs`)
//! already depends on.

use crate::error::{Error, Result};
use crate::image::Image;
use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::inflate::decompress_to_vec;

/// Maximum uncompressed block size (spec §8 testable property 1 requires
/// buffer sizes up to and including 65536). The *compressed* payload still
/// has to fit the 16-bit length prefix, which `output` checks separately.
pub const MAX_BLOCK_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// A framed, restartable compressor/decompressor over an `Image`.
pub struct Compressor {
    image: Image,
    size: usize,
    direction: Direction,
    compress: bool,
    buffer: Vec<u8>,
    total: u64,
    total_compressed: u64,
}

impl Compressor {
    /// `size` is the uncompressed block size; must fit in 16 bits.
    pub fn new(image: Image, size: usize, direction: Direction, compress: bool) -> Result<Self> {
        if size > MAX_BLOCK_SIZE {
            return Err(Error::ModeViolation {
                what: "block size too big, 16 bits only".into(),
                location: "compression",
            });
        }
        Ok(Compressor {
            image,
            size,
            direction,
            compress,
            buffer: Vec::with_capacity(size),
            total: 0,
            total_compressed: 0,
        })
    }

    pub fn transferred(&self) -> u64 {
        self.total
    }

    pub fn compressed(&self) -> u64 {
        self.total_compressed
    }

    fn require_write(&self) -> Result<()> {
        if self.direction != Direction::Write {
            return Err(Error::ModeViolation {
                what: "write on a read-only compressor".into(),
                location: "compression",
            });
        }
        Ok(())
    }

    fn require_read(&self) -> Result<()> {
        if self.direction != Direction::Read {
            return Err(Error::ModeViolation {
                what: "read on a write-only compressor".into(),
                location: "compression",
            });
        }
        Ok(())
    }

    /// Append bytes, emitting a block each time the buffer fills.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        self.require_write()?;
        while !data.is_empty() {
            let room = self.size - self.buffer.len();
            let appending = room.min(data.len());
            self.buffer.extend_from_slice(&data[..appending]);
            data = &data[appending..];
            self.total += appending as u64;
            self.output(false)?;
        }
        Ok(())
    }

    /// Stream `length` bytes from `source` starting at `offset` through the
    /// same buffering/emission path as `write`.
    pub fn write_from(&mut self, source: &Image, offset: u64, mut length: usize) -> Result<()> {
        self.require_write()?;
        source.seek(offset)?;
        let mut chunk = vec![0u8; self.size];
        while length > 0 {
            let room = self.size - self.buffer.len();
            let appending = room.min(length);
            source.read_exact(&mut chunk[..appending])?;
            self.buffer.extend_from_slice(&chunk[..appending]);
            length -= appending;
            self.total += appending as u64;
            self.output(false)?;
        }
        Ok(())
    }

    /// Pull decompressed bytes into `buf`, returning the number of bytes
    /// actually filled (0 on input exhaustion).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.require_read()?;
        let mut filled = 0;
        while filled < buf.len() {
            self.input()?;
            if self.buffer.is_empty() {
                break;
            }
            let appending = (buf.len() - filled).min(self.buffer.len());
            buf[filled..filled + appending].copy_from_slice(&self.buffer[..appending]);
            self.buffer.drain(..appending);
            filled += appending;
            self.total += appending as u64;
        }
        Ok(filled)
    }

    /// Force emission of a partial block.
    pub fn flush(&mut self) -> Result<()> {
        self.require_write()?;
        self.output(true)
    }

    fn output(&mut self, forced: bool) -> Result<()> {
        if (forced && !self.buffer.is_empty()) || self.buffer.len() >= self.size {
            if self.compress {
                let payload = compress_to_vec(&self.buffer, 6);
                if payload.len() > 0xffff {
                    return Err(Error::ModeViolation {
                        what: "compressed block exceeds 16-bit length".into(),
                        location: "compression",
                    });
                }
                let header = (payload.len() as u16).to_be_bytes();
                self.image.write(&header)?;
                self.image.write(&payload)?;
                self.total_compressed += 2 + payload.len() as u64;
            } else {
                self.image.write(&self.buffer)?;
                self.total_compressed += self.buffer.len() as u64;
            }
            self.buffer.clear();
        }
        Ok(())
    }

    fn input(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            if self.compress {
                let mut header = [0u8; 2];
                let n = self.image.read(&mut header)?;
                if n == 0 {
                    return Ok(());
                }
                if n != 2 {
                    return Err(Error::BadCompressionBlock {
                        what: "truncated block header".into(),
                        location: "compression",
                    });
                }
                let block_size = u16::from_be_bytes(header) as usize;
                if block_size == 0 {
                    return Err(Error::BadCompressionBlock {
                        what: "block size is invalid (0)".into(),
                        location: "compression",
                    });
                }
                self.total_compressed += 2 + block_size as u64;

                let mut compressed = vec![0u8; block_size];
                self.image.read_exact(&mut compressed)?;
                self.buffer = decompress_to_vec(&compressed).map_err(|e| {
                    Error::BadCompressionBlock {
                        what: format!("corrupt deflate block: {e:?}"),
                        location: "compression",
                    }
                })?;
            } else {
                let mut chunk = vec![0u8; self.size];
                let n = self.image.read(&mut chunk)?;
                chunk.truncate(n);
                self.buffer = chunk;
            }
        }
        Ok(())
    }
}

/// Big-endian fixed-width writers, replacing the original's stream
/// insertion operators (spec §9).
pub trait WriteBigEndian<T> {
    fn write_be(&mut self, value: T) -> Result<()>;
}

macro_rules! impl_write_be {
    ($t:ty) => {
        impl WriteBigEndian<$t> for Compressor {
            fn write_be(&mut self, value: $t) -> Result<()> {
                self.write(&value.to_be_bytes())
            }
        }
    };
}

impl_write_be!(u8);
impl_write_be!(u16);
impl_write_be!(u32);
impl_write_be!(u64);

impl WriteBigEndian<&str> for Compressor {
    fn write_be(&mut self, value: &str) -> Result<()> {
        self.write(value.as_bytes())
    }
}
