//! Byte-stream wrappers for compressed text files.

use crate::error::Result;
use flate2::Compression as GzLevel;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const ZSTD_LEVEL: i32 = 3;

/// Compression applied to a text stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Chooses by extension: `.gz` is gzip, `.zst` is Zstandard, anything else
    /// is plain text.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Self::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("zst") => Self::Zstd,
            _ => Self::None,
        }
    }

    /// Wraps `inner` in the matching decoder.
    pub fn reader<R: io::Read + Send + 'static>(self, inner: R) -> Result<Box<dyn BufRead + Send>> {
        Ok(match self {
            Self::None => Box::new(BufReader::new(inner)),
            Self::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(inner))),
            Self::Zstd => Box::new(BufReader::new(zstd::Decoder::new(inner)?)),
        })
    }

    /// Wraps `inner` in the matching encoder.
    pub fn writer<W: Write>(self, inner: W) -> Result<Encoder<W>> {
        Ok(match self {
            Self::None => Encoder::Plain(inner),
            Self::Gzip => Encoder::Gzip(GzEncoder::new(inner, GzLevel::default())),
            Self::Zstd => Encoder::Zstd(zstd::Encoder::new(inner, ZSTD_LEVEL)?),
        })
    }
}

/// Opens `path` for reading, decompressing as `compression` says or, when
/// `None` is given, as the extension suggests.
pub(crate) fn open(path: &Path, compression: Option<Compression>) -> Result<Box<dyn BufRead + Send>> {
    let compression = compression.unwrap_or_else(|| Compression::from_path(path));
    debug!("opening {} as {:?}", path.display(), compression);
    compression.reader(File::open(path)?)
}

pub(crate) fn create(path: &Path, compression: Option<Compression>) -> Result<Encoder<BufWriter<File>>> {
    let compression = compression.unwrap_or_else(|| Compression::from_path(path));
    debug!("creating {} as {:?}", path.display(), compression);
    compression.writer(BufWriter::new(File::create(path)?))
}

/// Write half of [`Compression`]. Call [`finish`](Self::finish) to flush the
/// compressed trailer; dropping without finishing may truncate the stream.
pub enum Encoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    pub fn finish(self) -> Result<W> {
        let mut inner = match self {
            Self::Plain(w) => w,
            Self::Gzip(e) => e.finish()?,
            Self::Zstd(e) => e.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(e) => e.write(buf),
            Self::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(e) => e.flush(),
            Self::Zstd(e) => e.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn roundtrip(compression: Compression) -> String {
        let mut encoder = compression.writer(Vec::new()).unwrap();
        encoder.write_all(b"ITEM: TIMESTEP\n42\n").unwrap();
        let bytes = encoder.finish().unwrap();
        let mut text = String::new();
        compression
            .reader(Cursor::new(bytes))
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn picks_compression_from_extension() {
        assert_eq!(Compression::from_path("traj.lammpstrj"), Compression::None);
        assert_eq!(Compression::from_path("traj.gz"), Compression::Gzip);
        assert_eq!(Compression::from_path("traj.ZST"), Compression::Zstd);
    }

    #[test]
    fn every_codec_roundtrips() {
        for c in [Compression::None, Compression::Gzip, Compression::Zstd] {
            assert_eq!(roundtrip(c), "ITEM: TIMESTEP\n42\n");
        }
    }
}
