//! Sidecar cache tests.

use std::{
    cell::Cell,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use image::{DynamicImage, GrayImage};
use tempfile::TempDir;

use vhash::{
    CacheStatus, FingerprintSequence, FingerprintStore, FrameSource, GenerateOptions,
    SaveOutcome, SourceStamp, VhashError,
};

fn sequence(values: &[u64]) -> FingerprintSequence {
    FingerprintSequence::from_bits(values.iter().copied()).unwrap()
}

/// A fake video file in a fresh directory.
fn video_in(directory: &TempDir, name: &str) -> PathBuf {
    let path = directory.path().join(name);
    fs::write(&path, b"not really a video").unwrap();
    path
}

/// Hand-built sidecar bytes: header followed by a gzip body.
fn raw_sidecar(version: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"VHSQ");
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 16]);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    bytes.extend_from_slice(&encoder.finish().unwrap());
    bytes
}

fn body(count: u32, values: &[u64]) -> Vec<u8> {
    let mut bytes = count.to_le_bytes().to_vec();
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Frame source yielding uniform 8×8 frames.
struct StaticSource {
    frames: u32,
}

impl FrameSource for StaticSource {
    fn frames_per_second(&self) -> Option<f64> {
        Some(1.0)
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>, VhashError> {
        if self.frames == 0 {
            return Ok(None);
        }
        self.frames -= 1;
        Ok(Some(DynamicImage::ImageLuma8(GrayImage::new(8, 8))))
    }
}

// ── Paths ──────────────────────────────────────────────────────────

#[test]
fn sidecar_path_replaces_extension() {
    assert_eq!(vhash::sidecar_path("a/b/movie.mp4"), Path::new("a/b/movie.vhs"));
    assert_eq!(vhash::sidecar_path("clip"), Path::new("clip.vhs"));
    assert!(vhash::is_sidecar("a/movie.vhs"));
    assert!(!vhash::is_sidecar("a/movie.mp4"));
}

// ── Save / load ────────────────────────────────────────────────────

#[test]
fn save_then_load_returns_same_sequence() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();
    let original = sequence(&[0xdead_beef, 0, u64::MAX, 42]);

    let outcome = store.save(&video, &original, None).unwrap();
    assert_eq!(outcome, SaveOutcome::Written(vhash::sidecar_path(&video)));

    let record = store.load(&video).unwrap().unwrap();
    assert_eq!(record.fingerprints, original);
    assert_eq!(record.source_stamp, None);
}

#[test]
fn load_accepts_sidecar_path() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mkv");
    let store = FingerprintStore::new().with_compression_level(9);
    store.save(&video, &sequence(&[1, 2, 3]), None).unwrap();

    let record = store.load(vhash::sidecar_path(&video)).unwrap().unwrap();
    assert_eq!(record.fingerprints, sequence(&[1, 2, 3]));
}

#[test]
fn header_layout() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let stamp = SourceStamp {
        length: 0x0102,
        modified_seconds: 0x0a0b,
    };
    FingerprintStore::new()
        .save(&video, &sequence(&[7]), Some(stamp))
        .unwrap();

    let bytes = fs::read(vhash::sidecar_path(&video)).unwrap();
    assert_eq!(&bytes[0..4], b"VHSQ");
    assert_eq!(&bytes[4..6], &[1, 0]);
    assert_eq!(&bytes[6..8], &[1, 0]);
    assert_eq!(&bytes[8..10], &[0x02, 0x01]);
    assert_eq!(&bytes[16..18], &[0x0b, 0x0a]);
    // gzip magic
    assert_eq!(&bytes[24..26], &[0x1f, 0x8b]);
}

#[test]
fn existing_sidecar_is_never_overwritten() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();

    store.save(&video, &sequence(&[1, 2]), None).unwrap();
    let outcome = store.save(&video, &sequence(&[3, 4, 5]), None).unwrap();
    assert_eq!(outcome, SaveOutcome::AlreadyCached(vhash::sidecar_path(&video)));

    let record = store.load(&video).unwrap().unwrap();
    assert_eq!(record.fingerprints, sequence(&[1, 2]));
}

#[test]
fn save_leaves_no_temporary_files() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    FingerprintStore::new()
        .save(&video, &sequence(&[1]), None)
        .unwrap();

    let mut names: Vec<String> = fs::read_dir(directory.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["movie.mp4", "movie.vhs"]);
}

#[test]
fn missing_sidecar_is_a_miss() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    assert!(FingerprintStore::new().load(&video).unwrap().is_none());
}

// ── Corruption ─────────────────────────────────────────────────────

fn load_raw(bytes: &[u8]) -> Result<Option<vhash::SidecarRecord>, VhashError> {
    let directory = tempfile::tempdir().unwrap();
    let sidecar = directory.path().join("movie.vhs");
    fs::write(&sidecar, bytes).unwrap();
    FingerprintStore::new().load(&sidecar)
}

#[test]
fn garbage_is_corrupt() {
    let result = load_raw(b"this is not a sidecar at all, just some text");
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[test]
fn truncated_header_is_corrupt() {
    let result = load_raw(b"VHSQ\x01\x00");
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[test]
fn unknown_version_is_corrupt() {
    let result = load_raw(&raw_sidecar(2, &body(1, &[5])));
    match result {
        Err(VhashError::CacheCorrupt { reason, .. }) => assert!(reason.contains("version")),
        other => panic!("expected CacheCorrupt, got {other:?}"),
    }
}

#[test]
fn hand_built_sidecar_loads() {
    let record = load_raw(&raw_sidecar(1, &body(2, &[5, 6]))).unwrap().unwrap();
    assert_eq!(record.fingerprints, sequence(&[5, 6]));
}

#[test]
fn short_body_is_corrupt() {
    let result = load_raw(&raw_sidecar(1, &body(3, &[5, 6])));
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[test]
fn empty_body_is_corrupt() {
    let result = load_raw(&raw_sidecar(1, &body(0, &[])));
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[test]
fn trailing_data_is_corrupt() {
    let result = load_raw(&raw_sidecar(1, &body(1, &[5, 6])));
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[test]
fn directory_in_place_of_sidecar_is_corrupt() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    fs::create_dir(vhash::sidecar_path(&video)).unwrap();

    let result = FingerprintStore::new().load(&video);
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[cfg(unix)]
#[test]
fn unreadable_sidecar_is_corrupt() {
    use std::os::unix::fs::PermissionsExt;

    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();
    store.save(&video, &sequence(&[1, 2]), None).unwrap();

    let sidecar = vhash::sidecar_path(&video);
    fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o000)).unwrap();
    // Privileged users read through the mode bits.
    if fs::File::open(&sidecar).is_ok() {
        return;
    }

    match store.load(&video) {
        Err(VhashError::CacheCorrupt { path, reason }) => {
            assert_eq!(path, sidecar);
            assert!(reason.contains("cannot open"), "reason: {reason}");
        }
        other => panic!("expected CacheCorrupt, got {other:?}"),
    }
    fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o644)).unwrap();
}

// ── Source stamps ──────────────────────────────────────────────────

#[test]
fn stamp_detects_modified_video() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();
    let stamp = SourceStamp::of(&video).unwrap();
    store.save(&video, &sequence(&[1]), Some(stamp)).unwrap();

    let record = store.load(&video).unwrap().unwrap();
    assert_eq!(record.source_stamp, Some(stamp));
    assert_eq!(record.is_stale_for(&video), Some(false));

    let mut file = OpenOptions::new().append(true).open(&video).unwrap();
    file.write_all(b" with more bytes").unwrap();
    drop(file);
    assert_eq!(record.is_stale_for(&video), Some(true));
}

#[test]
fn stamp_unknown_without_record_or_video() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();
    store.save(&video, &sequence(&[1]), None).unwrap();

    let record = store.load(&video).unwrap().unwrap();
    assert_eq!(record.is_stale_for(&video), None);

    let stamped = vhash::SidecarRecord {
        source_stamp: Some(SourceStamp {
            length: 1,
            modified_seconds: 1,
        }),
        ..record
    };
    assert_eq!(stamped.is_stale_for(directory.path().join("gone.mp4")), None);
}

// ── load_or_generate ───────────────────────────────────────────────

#[test]
fn load_or_generate_stores_then_hits() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();
    let options = GenerateOptions::new();
    let opened = Cell::new(0);

    let open = |_: &Path, _: &GenerateOptions| {
        opened.set(opened.get() + 1);
        Ok(StaticSource { frames: 3 })
    };

    let (first, status) = store.load_or_generate(&video, &options, open).unwrap();
    assert_eq!(status, CacheStatus::Stored);
    assert_eq!(first.len(), 3);

    let (second, status) = store.load_or_generate(&video, &options, open).unwrap();
    assert_eq!(status, CacheStatus::Hit);
    assert_eq!(second, first);
    assert_eq!(opened.get(), 1);

    let record = store.load(&video).unwrap().unwrap();
    assert_eq!(record.source_stamp, Some(SourceStamp::of(&video).unwrap()));
}

#[test]
fn load_or_generate_keeps_stale_sidecar() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    let store = FingerprintStore::new();
    let options = GenerateOptions::new();

    let (first, _) = store
        .load_or_generate(&video, &options, |_, _| Ok(StaticSource { frames: 2 }))
        .unwrap();

    fs::write(&video, b"a different and longer video payload").unwrap();

    let (second, status) = store
        .load_or_generate(&video, &options, |_, _| -> Result<StaticSource, VhashError> {
            panic!("cached sequence should be used")
        })
        .unwrap();
    assert_eq!(status, CacheStatus::StaleHit);
    assert_eq!(second, first);
}

#[test]
fn load_or_generate_reports_corrupt_sidecar() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");
    fs::write(vhash::sidecar_path(&video), b"junk").unwrap();

    let result = FingerprintStore::new().load_or_generate(
        &video,
        &GenerateOptions::new(),
        |_, _| Ok(StaticSource { frames: 1 }),
    );
    assert!(matches!(result, Err(VhashError::CacheCorrupt { .. })));
}

#[test]
fn load_or_generate_propagates_open_errors() {
    let directory = tempfile::tempdir().unwrap();
    let video = video_in(&directory, "movie.mp4");

    let result = FingerprintStore::new().load_or_generate(
        &video,
        &GenerateOptions::new(),
        |path, _| -> Result<StaticSource, VhashError> {
            Err(VhashError::VideoOpen {
                path: path.to_path_buf(),
                reason: "no video stream found".to_string(),
            })
        },
    );
    assert!(matches!(result, Err(VhashError::VideoOpen { .. })));
    assert!(!vhash::sidecar_path(&video).exists());
}
