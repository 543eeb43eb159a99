//! Sidecar cache for fingerprint sequences.
//!
//! A video's fingerprints are stored next to it, at the video's path with the
//! extension replaced by [`SIDECAR_EXTENSION`]. An existing sidecar is
//! authoritative: it is never overwritten and never checked against the
//! video's current contents. Each record does carry a [`SourceStamp`] so
//! callers can notice that a video changed after its sidecar was written.
//!
//! # Format (version 1)
//!
//! All integers are little-endian.
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0  | 4  | magic `VHSQ` |
//! | 4  | 2  | format version |
//! | 6  | 2  | flags (bit 0: source stamp present) |
//! | 8  | 8  | source length in bytes |
//! | 16 | 8  | source modification time, seconds since the Unix epoch |
//! | 24 | …  | gzip stream: `u32` count, then `count` × `u64` fingerprints |
//!
//! # Example
//!
//! ```no_run
//! use vhash::{FingerprintSequence, FingerprintStore, SourceStamp, VhashError};
//!
//! let store = FingerprintStore::new();
//! let sequence = FingerprintSequence::from_bits([0xffff_0000_ffff_0000, 0x0f0f_0f0f_0f0f_0f0f])?;
//! let stamp = SourceStamp::of("movie.mp4").ok();
//! store.save("movie.mp4", &sequence, stamp)?;
//!
//! let record = store.load("movie.mp4")?.expect("just written");
//! assert_eq!(record.fingerprints, sequence);
//! # Ok::<(), VhashError>(())
//! ```

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use tempfile::NamedTempFile;

use crate::{
    configuration::GenerateOptions,
    error::VhashError,
    fingerprint::{Fingerprint, FingerprintSequence},
    generator::{self, FrameSource},
};

/// Extension that replaces the video's own to form the sidecar path.
pub const SIDECAR_EXTENSION: &str = "vhs";

const MAGIC: [u8; 4] = *b"VHSQ";
const FORMAT_VERSION: u16 = 1;
const FLAG_SOURCE_STAMP: u16 = 1;
const HEADER_LEN: usize = 24;

/// Derive the sidecar path of a video.
///
/// ```
/// use std::path::Path;
///
/// assert_eq!(vhash::sidecar_path("clips/a.mp4"), Path::new("clips/a.vhs"));
/// ```
pub fn sidecar_path<P: AsRef<Path>>(video: P) -> PathBuf {
    video.as_ref().with_extension(SIDECAR_EXTENSION)
}

/// Whether `path` names a sidecar rather than a video.
pub fn is_sidecar<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .is_some_and(|extension| extension == SIDECAR_EXTENSION)
}

/// Size and modification time of a video when its fingerprints were taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceStamp {
    /// File length in bytes.
    pub length: u64,
    /// Modification time in whole seconds since the Unix epoch.
    pub modified_seconds: u64,
}

impl SourceStamp {
    /// Read the stamp of a file from the filesystem.
    pub fn of<P: AsRef<Path>>(path: P) -> Result<Self, VhashError> {
        let metadata = fs::metadata(path)?;
        let modified_seconds = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Ok(Self {
            length: metadata.len(),
            modified_seconds,
        })
    }
}

/// A fingerprint sequence read back from a sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarRecord {
    /// The cached sequence.
    pub fingerprints: FingerprintSequence,
    /// Stamp of the video at generation time, if one was recorded.
    pub source_stamp: Option<SourceStamp>,
}

impl SidecarRecord {
    /// Whether `video` no longer matches the recorded stamp.
    ///
    /// Returns `None` when the record carries no stamp or the video cannot be
    /// inspected (e.g. only the sidecar was copied somewhere).
    pub fn is_stale_for<P: AsRef<Path>>(&self, video: P) -> Option<bool> {
        let recorded = self.source_stamp?;
        let current = SourceStamp::of(video).ok()?;
        Some(recorded != current)
    }
}

/// Result of [`FingerprintStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new sidecar was published at this path.
    Written(PathBuf),
    /// A sidecar already existed and was left untouched.
    AlreadyCached(PathBuf),
}

/// Where the sequence returned by [`FingerprintStore::load_or_generate`]
/// came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Read from a sidecar.
    Hit,
    /// Read from a sidecar whose recorded stamp no longer matches the video.
    /// The cached sequence is still used.
    StaleHit,
    /// Generated and written to a new sidecar.
    Stored,
    /// Generated, but a sidecar appeared concurrently and was kept.
    Generated,
}

/// Reads and writes sidecar files.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintStore {
    compression: Compression,
}

impl Default for FingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintStore {
    /// A store using the default gzip level.
    pub fn new() -> Self {
        Self {
            compression: Compression::default(),
        }
    }

    /// Set the gzip level used for new sidecars (0–9).
    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Persist the sequence of `video` unless a sidecar already exists.
    ///
    /// The record is written to a temporary file in the destination directory
    /// and then linked into place without replacing anything, so the
    /// canonical path only ever holds a complete sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`VhashError::Io`] if the temporary file cannot be written or
    /// published.
    pub fn save<P: AsRef<Path>>(
        &self,
        video: P,
        sequence: &FingerprintSequence,
        source_stamp: Option<SourceStamp>,
    ) -> Result<SaveOutcome, VhashError> {
        let path = sidecar_path(video);
        if path.exists() {
            log::debug!("Sidecar {} already exists, not rewriting", path.display());
            return Ok(SaveOutcome::AlreadyCached(path));
        }

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temporary = NamedTempFile::new_in(&directory)?;
        {
            let mut writer = BufWriter::new(temporary.as_file_mut());
            self.write_record(&mut writer, sequence, source_stamp)?;
            writer.flush()?;
        }
        temporary.as_file().sync_all()?;

        match temporary.persist_noclobber(&path) {
            Ok(_) => {
                log::debug!(
                    "Wrote {} fingerprint(s) to {}",
                    sequence.len(),
                    path.display()
                );
                Ok(SaveOutcome::Written(path))
            }
            Err(error) if error.error.kind() == ErrorKind::AlreadyExists => {
                Ok(SaveOutcome::AlreadyCached(path))
            }
            Err(error) => Err(VhashError::Io(error.error)),
        }
    }

    /// Load the sidecar of `path`, which may name either the video or the
    /// sidecar itself.
    ///
    /// Returns `Ok(None)` when no sidecar exists (a cache miss).
    ///
    /// # Errors
    ///
    /// Returns [`VhashError::CacheCorrupt`] if the sidecar exists but cannot
    /// be read or is not a valid version-1 record.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Option<SidecarRecord>, VhashError> {
        let path = path.as_ref();
        let sidecar = if is_sidecar(path) {
            path.to_path_buf()
        } else {
            sidecar_path(path)
        };

        let file = match File::open(&sidecar) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(VhashError::CacheCorrupt {
                    path: sidecar,
                    reason: format!("cannot open: {error}"),
                });
            }
        };

        read_record(BufReader::new(file), &sidecar).map(Some)
    }

    /// Return the cached sequence of `video`, generating and persisting it on
    /// a cache miss.
    ///
    /// `open_source` is only called on a miss.
    pub fn load_or_generate<P, S, F>(
        &self,
        video: P,
        options: &GenerateOptions,
        open_source: F,
    ) -> Result<(FingerprintSequence, CacheStatus), VhashError>
    where
        P: AsRef<Path>,
        S: FrameSource,
        F: FnOnce(&Path, &GenerateOptions) -> Result<S, VhashError>,
    {
        let video = video.as_ref();

        if let Some(record) = self.load(video)? {
            let status = if record.is_stale_for(video) == Some(true) {
                log::warn!(
                    "{} changed after its fingerprints were cached; using the cached sequence",
                    video.display()
                );
                CacheStatus::StaleHit
            } else {
                CacheStatus::Hit
            };
            log::debug!("Using cached fingerprints for {}", video.display());
            return Ok((record.fingerprints, status));
        }

        let mut source = open_source(video, options)?;
        let sequence = generator::generate(&mut source, options)?;

        let stamp = SourceStamp::of(video).ok();
        let status = match self.save(video, &sequence, stamp)? {
            SaveOutcome::Written(_) => CacheStatus::Stored,
            SaveOutcome::AlreadyCached(_) => CacheStatus::Generated,
        };
        Ok((sequence, status))
    }

    fn write_record<W: Write>(
        &self,
        writer: &mut W,
        sequence: &FingerprintSequence,
        source_stamp: Option<SourceStamp>,
    ) -> Result<(), VhashError> {
        let count = u32::try_from(sequence.len()).map_err(|_| {
            VhashError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "sequence too long for a version-1 sidecar",
            ))
        })?;

        let flags = if source_stamp.is_some() {
            FLAG_SOURCE_STAMP
        } else {
            0
        };
        let stamp = source_stamp.unwrap_or(SourceStamp {
            length: 0,
            modified_seconds: 0,
        });

        writer.write_all(&MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&flags.to_le_bytes())?;
        writer.write_all(&stamp.length.to_le_bytes())?;
        writer.write_all(&stamp.modified_seconds.to_le_bytes())?;

        let mut encoder = GzEncoder::new(writer, self.compression);
        encoder.write_all(&count.to_le_bytes())?;
        for fingerprint in sequence {
            encoder.write_all(&fingerprint.bits().to_le_bytes())?;
        }
        encoder.finish()?;
        Ok(())
    }
}

fn read_record<R: Read>(mut reader: R, path: &Path) -> Result<SidecarRecord, VhashError> {
    let corrupt = |reason: String| VhashError::CacheCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|error| corrupt(format!("truncated header: {error}")))?;

    if header[0..4] != MAGIC {
        return Err(corrupt("not a vhash sidecar (bad magic)".to_string()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let flags = u16::from_le_bytes([header[6], header[7]]);
    let source_stamp = (flags & FLAG_SOURCE_STAMP != 0).then(|| SourceStamp {
        length: le_u64(&header[8..16]),
        modified_seconds: le_u64(&header[16..24]),
    });

    let mut decoder = GzDecoder::new(reader);
    let mut word = [0u8; 8];

    decoder
        .read_exact(&mut word[..4])
        .map_err(|error| corrupt(format!("unreadable body: {error}")))?;
    let count = u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as usize;
    if count == 0 {
        return Err(corrupt("sidecar holds an empty sequence".to_string()));
    }

    let mut fingerprints = Vec::with_capacity(count.min(1 << 16));
    for index in 0..count {
        decoder.read_exact(&mut word).map_err(|error| {
            corrupt(format!("fingerprint {index} of {count} unreadable: {error}"))
        })?;
        fingerprints.push(Fingerprint::new(u64::from_le_bytes(word)));
    }

    let mut trailing = [0u8; 1];
    match decoder.read(&mut trailing) {
        Ok(0) => {}
        Ok(_) => return Err(corrupt("trailing data after fingerprints".to_string())),
        Err(error) => return Err(corrupt(format!("unreadable body: {error}"))),
    }

    let fingerprints =
        FingerprintSequence::new(fingerprints).map_err(|error| corrupt(error.to_string()))?;

    Ok(SidecarRecord {
        fingerprints,
        source_stamp,
    })
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}
