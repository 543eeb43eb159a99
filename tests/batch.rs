//! Batch generation and all-pairs comparison tests.

use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use vhash::{
    BatchOptions, CacheStatus, CancellationToken, Fingerprint, FingerprintSequence,
    FingerprintStore, GenerateOptions, MatchConfig, OperationType, PairOutcome,
    ProgressCallback, ProgressInfo, SequenceAligner, VhashError,
};

fn sequence(values: &[u64]) -> FingerprintSequence {
    FingerprintSequence::from_bits(values.iter().copied()).unwrap()
}

fn sequences() -> Vec<FingerprintSequence> {
    vec![
        sequence(&[0x3f, 0x3f << 6, 0x3f << 12, 0x3f << 18]),
        sequence(&[0x3f, 0x3f << 6, 0x3f << 12, 0x3f << 18]),
        sequence(&[u64::MAX, u64::MAX]),
    ]
}

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressInfo>>);

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.0.lock().unwrap().push(info.clone());
    }
}

// ── Pair enumeration ───────────────────────────────────────────────

#[test]
fn pair_indices_are_lexicographic() {
    assert!(vhash::pair_indices(0).is_empty());
    assert!(vhash::pair_indices(1).is_empty());
    assert_eq!(
        vhash::pair_indices(4),
        vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
    );
}

// ── compare_all ────────────────────────────────────────────────────

#[test]
fn compare_all_returns_every_pair_in_order() {
    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let comparisons = vhash::compare_all(&sequences(), &aligner, &BatchOptions::new());

    let pairs: Vec<(usize, usize)> = comparisons
        .iter()
        .map(|comparison| (comparison.first, comparison.second))
        .collect();
    assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);

    let ratios: Vec<f64> = comparisons
        .iter()
        .map(|comparison| match &comparison.outcome {
            PairOutcome::Compared(result) => result.ratio,
            PairOutcome::Skipped => panic!("no budget was set"),
        })
        .collect();
    assert_eq!(ratios, vec![1.0, 0.0, 0.0]);
}

#[test]
fn compare_all_matches_pairwise_alignment() {
    let aligner = SequenceAligner::new(MatchConfig::default().with_tolerance(12)).unwrap();
    let inputs = sequences();
    let comparisons = vhash::compare_all(&inputs, &aligner, &BatchOptions::new());

    for comparison in comparisons {
        let expected = aligner.align(&inputs[comparison.first], &inputs[comparison.second]);
        assert_eq!(comparison.outcome, PairOutcome::Compared(expected));
    }
}

#[test]
fn compare_all_accepts_plain_slices() {
    let inputs: Vec<Vec<Fingerprint>> = vec![
        vec![Fingerprint::new(1)],
        vec![Fingerprint::new(1)],
    ];
    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let comparisons = vhash::compare_all(&inputs, &aligner, &BatchOptions::new());
    assert_eq!(comparisons.len(), 1);
}

#[test]
fn compare_all_with_fewer_than_two_sequences_is_empty() {
    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let single = vec![sequence(&[1])];
    assert!(vhash::compare_all(&single, &aligner, &BatchOptions::new()).is_empty());
}

#[test]
fn expired_deadline_skips_every_pair() {
    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let options = BatchOptions::new().with_deadline(Duration::ZERO);
    let comparisons = vhash::compare_all(&sequences(), &aligner, &options);

    assert_eq!(comparisons.len(), 3);
    assert!(
        comparisons
            .iter()
            .all(|comparison| comparison.outcome == PairOutcome::Skipped)
    );
}

#[test]
fn generous_deadline_compares_every_pair() {
    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let options = BatchOptions::new().with_deadline(Duration::from_secs(3600));
    let comparisons = vhash::compare_all(&sequences(), &aligner, &options);
    assert!(
        comparisons
            .iter()
            .all(|comparison| matches!(comparison.outcome, PairOutcome::Compared(_)))
    );
}

#[test]
fn cancelled_sweep_skips_every_pair() {
    let token = CancellationToken::new();
    token.cancel();

    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let options = BatchOptions::new().with_cancellation(token);
    let comparisons = vhash::compare_all(&sequences(), &aligner, &options);
    assert!(
        comparisons
            .iter()
            .all(|comparison| comparison.outcome == PairOutcome::Skipped)
    );
}

#[test]
fn compare_all_reports_progress() {
    let recorder = Arc::new(Recorder::default());
    let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
    let options = BatchOptions::new().with_progress(recorder.clone());
    vhash::compare_all(&sequences(), &aligner, &options);

    let reports = recorder.0.lock().unwrap();
    let last = reports.last().unwrap();
    assert_eq!(last.operation, OperationType::PairwiseComparison);
    assert_eq!(last.current, 3);
    assert_eq!(last.total, Some(3));
    assert_eq!(last.percentage, Some(100.0));
}

// ── Sidecar discovery ──────────────────────────────────────────────

#[test]
fn collect_sidecars_lists_top_level_sidecars_sorted() {
    let directory = tempfile::tempdir().unwrap();
    let root = directory.path();
    fs::write(root.join("b.vhs"), b"").unwrap();
    fs::write(root.join("a.vhs"), b"").unwrap();
    fs::write(root.join("a.mp4"), b"").unwrap();
    fs::create_dir(root.join("nested")).unwrap();
    fs::write(root.join("nested").join("c.vhs"), b"").unwrap();

    let sidecars = vhash::collect_sidecars(root).unwrap();
    assert_eq!(sidecars, vec![root.join("a.vhs"), root.join("b.vhs")]);
}

#[test]
fn collect_sidecars_of_missing_directory_fails() {
    let directory = tempfile::tempdir().unwrap();
    assert!(vhash::collect_sidecars(directory.path().join("absent")).is_err());
}

// ── Resolving and generating ───────────────────────────────────────

#[test]
fn resolve_sequence_reads_sidecars_and_cached_videos() {
    let directory = tempfile::tempdir().unwrap();
    let video = directory.path().join("movie.mp4");
    let store = FingerprintStore::new();
    let options = GenerateOptions::new();
    store.save(&video, &sequence(&[9, 8, 7]), None).unwrap();

    let from_sidecar =
        vhash::resolve_sequence(vhash::sidecar_path(&video), &store, &options).unwrap();
    let from_video = vhash::resolve_sequence(&video, &store, &options).unwrap();
    assert_eq!(from_sidecar, sequence(&[9, 8, 7]));
    assert_eq!(from_video, from_sidecar);
}

#[test]
fn resolve_missing_sidecar_is_not_found() {
    let directory = tempfile::tempdir().unwrap();
    let result = vhash::resolve_sequence(
        directory.path().join("missing.vhs"),
        &FingerprintStore::new(),
        &GenerateOptions::new(),
    );
    match result {
        Err(VhashError::Io(error)) => assert_eq!(error.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn generate_all_uses_cached_sidecars() {
    let directory = tempfile::tempdir().unwrap();
    let store = FingerprintStore::new();
    let videos: Vec<PathBuf> = ["one.mp4", "two.mkv"]
        .iter()
        .map(|name| directory.path().join(name))
        .collect();
    store.save(&videos[0], &sequence(&[1]), None).unwrap();
    store.save(&videos[1], &sequence(&[2, 3]), None).unwrap();

    let results = vhash::generate_all(&videos, &store, &GenerateOptions::new());
    assert_eq!(results.len(), 2);

    let (first, status) = results[0].as_ref().unwrap();
    assert_eq!(first, &sequence(&[1]));
    assert_eq!(*status, CacheStatus::Hit);

    let (second, _) = results[1].as_ref().unwrap();
    assert_eq!(second, &sequence(&[2, 3]));
}

#[test]
fn generate_all_isolates_failures() {
    let directory = tempfile::tempdir().unwrap();
    let store = FingerprintStore::new();
    let cached = directory.path().join("cached.mp4");
    let corrupt = directory.path().join("corrupt.mp4");
    store.save(&cached, &sequence(&[1]), None).unwrap();
    fs::write(vhash::sidecar_path(&corrupt), b"junk").unwrap();

    let results = vhash::generate_all(
        &[corrupt.clone(), cached.clone()],
        &store,
        &GenerateOptions::new(),
    );
    assert!(matches!(results[0], Err(VhashError::CacheCorrupt { .. })));
    assert!(results[1].is_ok());
}

#[test]
fn cancelled_generate_all_fails_every_item() {
    let directory = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let videos = vec![directory.path().join("a.mp4"), directory.path().join("b.mp4")];
    let options = GenerateOptions::new().with_cancellation(token);
    let results = vhash::generate_all(&videos, &FingerprintStore::new(), &options);
    assert!(
        results
            .iter()
            .all(|result| matches!(result, Err(VhashError::Cancelled)))
    );
}
