//! Wraps a [`Cache`] backend, compressing stored blobs and transparently
//! decompressing them on read, per §4.8.

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::storage::Cache;

/// Compression algorithm applied to stored blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// No compression; the blob is stored as-is (still tagged).
    None,
    /// DEFLATE via gzip framing.
    Gzip,
    /// Brotli.
    Brotli,
    /// Snappy (the `snap` frame format).
    Snappy,
}

impl Algorithm {
    fn tag(self) -> u8 {
        match self {
            Algorithm::None => 0,
            Algorithm::Gzip => 1,
            Algorithm::Brotli => 2,
            Algorithm::Snappy => 3,
        }
    }

    fn from_tag(tag: u8) -> Option<Algorithm> {
        match tag {
            0 => Some(Algorithm::None),
            1 => Some(Algorithm::Gzip),
            2 => Some(Algorithm::Brotli),
            3 => Some(Algorithm::Snappy),
            _ => None,
        }
    }
}

/// Blobs at or below this size are stored uncompressed (still tagged) —
/// compression overhead outweighs the saving for tiny bodies.
const MIN_COMPRESS_LEN: usize = 128;

/// A [`Cache`] adapter that compresses values on write and decompresses on
/// read. Different entries may use different algorithms (e.g. after a
/// config change); the read path dispatches on the stored tag, never on
/// `self.algorithm`.
pub struct CompressingCache<C> {
    inner: C,
    algorithm: Algorithm,
}

impl<C: Cache> CompressingCache<C> {
    /// Wraps `inner`, compressing new writes with `algorithm`.
    pub fn new(inner: C, algorithm: Algorithm) -> Self {
        Self { inner, algorithm }
    }
}

#[async_trait]
impl<C: Cache> Cache for CompressingCache<C> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(tagged) = self.inner.get(key).await? else {
            return Ok(None);
        };
        if tagged.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let (tag, payload) = tagged.split_first().ok_or_else(|| {
            CacheError::Malformed(format!("empty compressed blob for key {key}"))
        })?;
        let algorithm = Algorithm::from_tag(*tag).ok_or_else(|| {
            CacheError::Malformed(format!("unknown compression tag {tag} for key {key}"))
        })?;
        decompress(algorithm, payload).map(Some)
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let algorithm = if bytes.len() < MIN_COMPRESS_LEN {
            Algorithm::None
        } else {
            self.algorithm
        };
        let mut tagged = Vec::with_capacity(bytes.len() + 1);
        tagged.push(algorithm.tag());
        tagged.extend(compress(algorithm, &bytes)?);
        self.inner.set(key, tagged).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

fn compress(algorithm: Algorithm, bytes: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::None => Ok(bytes.to_vec()),
        Algorithm::Gzip => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(bytes).map_err(io_err)?;
            encoder.finish().map_err(io_err)
        }
        Algorithm::Brotli => {
            let mut out = Vec::new();
            let mut input = bytes;
            brotli::BrotliCompress(
                &mut input,
                &mut out,
                &brotli::enc::BrotliEncoderParams::default(),
            )
            .map_err(io_err)?;
            Ok(out)
        }
        Algorithm::Snappy => {
            let mut encoder = snap::raw::Encoder::new();
            encoder.compress_vec(bytes).map_err(|e| {
                CacheError::Malformed(format!("snappy compression failed: {e}"))
            })
        }
    }
}

fn decompress(algorithm: Algorithm, bytes: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::None => Ok(bytes.to_vec()),
        Algorithm::Gzip => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(io_err)?;
            Ok(out)
        }
        Algorithm::Brotli => {
            let mut out = Vec::new();
            let mut input = bytes;
            brotli::BrotliDecompress(&mut input, &mut out).map_err(io_err)?;
            Ok(out)
        }
        Algorithm::Snappy => {
            let mut decoder = snap::raw::Decoder::new();
            decoder.decompress_vec(bytes).map_err(|e| {
                CacheError::Malformed(format!("snappy decompression failed: {e}"))
            })
        }
    }
}

fn io_err(source: std::io::Error) -> CacheError {
    CacheError::Malformed(format!("compression I/O error: {source}"))
}
