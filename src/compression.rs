//! File compression for backup artifacts
//!
//! The lifecycle only needs three things from a codec: compress one file
//! into another, reverse it, and name the extension it appends.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::model::{CompressionConfig, CompressionFormat, CompressionLevel};
use crate::error::{HegemonError, HegemonResult};

/// A file-to-file compression codec
pub trait Compressor {
    /// Compress `src` into a new file at `dst`
    ///
    /// On failure `dst` must not be left behind.
    fn compress_file(&self, src: &Path, dst: &Path) -> HegemonResult<()>;

    /// Decompress `src` into a new file at `dst`
    fn decompress_file(&self, src: &Path, dst: &Path) -> HegemonResult<()>;

    /// Extension appended to compressed files, including the dot
    fn file_extension(&self) -> &str;
}

/// Gzip codec backed by flate2
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    pub fn new(level: CompressionLevel) -> Self {
        let level = match level {
            CompressionLevel::Low => Compression::new(1),
            CompressionLevel::Medium => Compression::new(6),
            CompressionLevel::High => Compression::new(9),
        };
        Self { level }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(CompressionLevel::Medium)
    }
}

impl Compressor for GzipCompressor {
    fn compress_file(&self, src: &Path, dst: &Path) -> HegemonResult<()> {
        let result = (|| -> io::Result<()> {
            let mut reader = BufReader::new(File::open(src)?);
            let writer = BufWriter::new(File::create(dst)?);
            let mut encoder = GzEncoder::new(writer, self.level);
            io::copy(&mut reader, &mut encoder)?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();

        result.map_err(|e| {
            let _ = fs::remove_file(dst);
            HegemonError::Compression(format!(
                "Failed to compress {} to {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })
    }

    fn decompress_file(&self, src: &Path, dst: &Path) -> HegemonResult<()> {
        let result = (|| -> io::Result<()> {
            let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
            let mut writer = BufWriter::new(File::create(dst)?);
            io::copy(&mut decoder, &mut writer)?;
            writer.flush()?;
            Ok(())
        })();

        result.map_err(|e| {
            let _ = fs::remove_file(dst);
            HegemonError::Compression(format!(
                "Failed to decompress {} to {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })
    }

    fn file_extension(&self) -> &str {
        ".gz"
    }
}

/// Build the compressor configured for backups, or `None` when disabled
pub fn compressor_for(config: &CompressionConfig) -> HegemonResult<Option<Box<dyn Compressor>>> {
    if !config.enabled {
        return Ok(None);
    }

    let level = config.level_kind().ok_or_else(|| {
        HegemonError::Compression(format!("Invalid compression level: {}", config.level))
    })?;

    match config.format_kind() {
        Some(CompressionFormat::Gzip) => Ok(Some(Box::new(GzipCompressor::new(level)))),
        Some(CompressionFormat::Bzip2) | Some(CompressionFormat::Xz) => Err(
            HegemonError::Compression(format!(
                "Unsupported compression format: {}",
                config.format
            )),
        ),
        None => Err(HegemonError::Compression(format!(
            "Invalid compression format: {}",
            config.format
        ))),
    }
}

/// Decode a whole gzip stream, returning the uncompressed size
pub fn verify_gzip(path: &Path) -> HegemonResult<u64> {
    let file = File::open(path)
        .map_err(|e| HegemonError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink()).map_err(|e| {
        HegemonError::Compression(format!("Corrupt gzip stream in {}: {}", path.display(), e))
    })
}
