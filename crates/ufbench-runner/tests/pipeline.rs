use std::fs;
use std::path::{Path, PathBuf};
use ufbench_runner::testing::{build_tree, index_row, matrix_archive, FakeFetcher, FakeRunner};
use ufbench_runner::{
    run_harness, Endpoints, HarnessConfig, HarnessError, RetentionFlags, SelectionCriteria,
    TestMode,
};

const INDEX_URL: &str = "https://collection.test/matrices/UFstats.csv";
const ARCHIVE_BASE: &str = "https://collection.test/MM/";

struct Fixture {
    _root: tempfile::TempDir,
    config: HarnessConfig,
}

impl Fixture {
    fn new(selection: SelectionCriteria, mode: TestMode, retention: RetentionFlags) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let layout = build_tree(root.path());
        let config = HarnessConfig {
            matrix_dir: root.path().join("Matrix"),
            build_dir: layout.build_dir,
            selection,
            mode,
            retention,
            endpoints: Endpoints {
                index_url: INDEX_URL.to_string(),
                archive_base_url: ARCHIVE_BASE.to_string(),
            },
            ..HarnessConfig::default()
        };
        Self {
            _root: root,
            config,
        }
    }

    fn matrix_dir(&self) -> &Path {
        &self.config.matrix_dir
    }
}

fn range(min: u32, max: u32, ids: &[u32]) -> SelectionCriteria {
    SelectionCriteria::new(min, max, ids.iter().copied()).expect("valid criteria")
}

fn index(rows: &[String]) -> Vec<u8> {
    let mut text = String::from("3\n31-Oct-2023 18:12:37\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text.into_bytes()
}

fn archive_url(group: &str, name: &str) -> String {
    format!("{}{}/{}.tar.gz", ARCHIVE_BASE, group, name)
}

fn program_names(runner: &FakeRunner) -> Vec<String> {
    runner
        .invocations()
        .iter()
        .map(|(p, _)| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[test]
fn scenario_a_only_the_admissible_middle_row_runs() {
    let fx = Fixture::new(range(1, 3, &[]), TestMode::All, RetentionFlags::default());
    let fetcher = FakeFetcher::new()
        .with(
            INDEX_URL,
            index(&[
                index_row("HB", "rect", 10, 12, "1", "1"),
                index_row("HB", "bcsstk01", 48, 48, "1", "1"),
                index_row("HB", "unsym", 30, 30, "1", "0"),
            ]),
        )
        .with(&archive_url("HB", "bcsstk01"), matrix_archive("bcsstk01"));
    let runner = FakeRunner::new();

    let outcome = run_harness(&fx.config, &fetcher, &runner).expect("run");

    assert_eq!(outcome.selected_count(), 1);
    assert_eq!(outcome.matrices[0].id, 2);
    assert_eq!(outcome.matrices[0].name, "bcsstk01");
    assert_eq!(
        fetcher.requests(),
        vec![INDEX_URL.to_string(), archive_url("HB", "bcsstk01")]
    );
    assert_eq!(
        program_names(&runner),
        vec![
            "mongoose_test_io",
            "mongoose_test_edgesep",
            "mongoose_test_memory",
            "mongoose_test_performance"
        ]
    );
    let mtx = fx.matrix_dir().join("bcsstk01").join("bcsstk01.mtx");
    let io_args = &runner.invocations()[0].1;
    assert_eq!(io_args, &vec![mtx.to_string_lossy().to_string(), "1".to_string()]);
}

#[test]
fn scenario_b_listed_id_failing_symmetry_selects_nothing() {
    let fx = Fixture::new(range(1, 10, &[5]), TestMode::All, RetentionFlags::default());
    let rows: Vec<String> = (1..=6)
        .map(|i| {
            let sym = if i == 5 { "0" } else { "1" };
            index_row("G", &format!("m{}", i), 8, 8, "1", sym)
        })
        .collect();
    let fetcher = FakeFetcher::new().with(INDEX_URL, index(&rows));
    let runner = FakeRunner::new();

    let outcome = run_harness(&fx.config, &fetcher, &runner).expect("run");

    assert_eq!(outcome.selected_count(), 0);
    assert_eq!(fetcher.requests(), vec![INDEX_URL.to_string()]);
    assert!(runner.invocations().is_empty());
}

#[test]
fn scenario_c_cached_archive_is_reused_and_kept() {
    let fx = Fixture::new(range(1, 1, &[]), TestMode::Memory, RetentionFlags::default());
    fs::create_dir_all(fx.matrix_dir()).expect("matrix dir");
    let archive = fx.matrix_dir().join("HB_bcsstk01.tar.gz");
    fs::write(&archive, matrix_archive("bcsstk01")).expect("seed archive");
    let fetcher = FakeFetcher::new().with(
        INDEX_URL,
        index(&[index_row("HB", "bcsstk01", 48, 48, "1", "1")]),
    );
    let runner = FakeRunner::new();

    let outcome = run_harness(&fx.config, &fetcher, &runner).expect("run");

    let m = &outcome.matrices[0];
    assert!(!m.downloaded);
    assert!(!m.deleted);
    assert_eq!(fetcher.requests(), vec![INDEX_URL.to_string()]);
    assert!(archive.is_file());
    assert!(fx.matrix_dir().join("bcsstk01").join("bcsstk01.mtx").is_file());
    assert_eq!(program_names(&runner), vec!["mongoose_test_memory"]);
}

#[test]
fn scenario_d_downloaded_archive_is_removed_afterwards() {
    let fx = Fixture::new(range(1, 1, &[]), TestMode::Io, RetentionFlags::default());
    let fetcher = FakeFetcher::new()
        .with(
            INDEX_URL,
            index(&[index_row("HB", "bcsstk01", 48, 48, "1", "1")]),
        )
        .with(&archive_url("HB", "bcsstk01"), matrix_archive("bcsstk01"));
    let runner = FakeRunner::new();

    let outcome = run_harness(&fx.config, &fetcher, &runner).expect("run");

    let m = &outcome.matrices[0];
    assert!(m.downloaded);
    assert!(m.deleted);
    assert!(!fx.matrix_dir().join("bcsstk01").exists());
    assert!(!fx.matrix_dir().join("HB_bcsstk01.tar.gz").exists());
}

#[test]
fn keep_retains_downloads_and_purge_removes_cached_ones() {
    let rows = index(&[index_row("HB", "bcsstk01", 48, 48, "1", "1")]);

    let keep = Fixture::new(
        range(1, 1, &[]),
        TestMode::Io,
        RetentionFlags {
            keep: true,
            purge: false,
        },
    );
    let fetcher = FakeFetcher::new()
        .with(INDEX_URL, rows.clone())
        .with(&archive_url("HB", "bcsstk01"), matrix_archive("bcsstk01"));
    let outcome = run_harness(&keep.config, &fetcher, &FakeRunner::new()).expect("run");
    assert!(outcome.matrices[0].downloaded && !outcome.matrices[0].deleted);
    assert!(keep.matrix_dir().join("HB_bcsstk01.tar.gz").is_file());

    let purge = Fixture::new(
        range(1, 1, &[]),
        TestMode::Io,
        RetentionFlags {
            keep: true,
            purge: true,
        },
    );
    fs::create_dir_all(purge.matrix_dir()).expect("matrix dir");
    fs::write(
        purge.matrix_dir().join("HB_bcsstk01.tar.gz"),
        matrix_archive("bcsstk01"),
    )
    .expect("seed archive");
    let fetcher = FakeFetcher::new().with(INDEX_URL, rows);
    let outcome = run_harness(&purge.config, &fetcher, &FakeRunner::new()).expect("run");
    assert!(!outcome.matrices[0].downloaded && outcome.matrices[0].deleted);
    assert!(!purge.matrix_dir().join("HB_bcsstk01.tar.gz").exists());
}

#[test]
fn failing_tests_do_not_stop_later_matrices() {
    let fx = Fixture::new(range(1, 2, &[]), TestMode::EdgeSeparator, RetentionFlags::default());
    let fetcher = FakeFetcher::new()
        .with(
            INDEX_URL,
            index(&[
                index_row("HB", "a", 4, 4, "1", "1"),
                index_row("HB", "b", 4, 4, "1", "1"),
            ]),
        )
        .with(&archive_url("HB", "a"), matrix_archive("a"))
        .with(&archive_url("HB", "b"), matrix_archive("b"));
    let runner = FakeRunner::new().exit_code("mongoose_test_edgesep", 139);

    let outcome = run_harness(&fx.config, &fetcher, &runner).expect("run");

    assert_eq!(outcome.selected_count(), 2);
    assert_eq!(outcome.failed_test_count(), 2);
    assert_eq!(runner.invocations().len(), 2);
}

#[test]
fn index_copy_is_removed_after_a_completed_run() {
    let fx = Fixture::new(range(1, 10, &[]), TestMode::All, RetentionFlags::default());
    let fetcher = FakeFetcher::new().with(INDEX_URL, index(&[]));

    run_harness(&fx.config, &fetcher, &FakeRunner::new()).expect("run");

    assert!(fx.matrix_dir().is_dir(), "matrix dir is created");
    assert!(!fx.matrix_dir().join("UFstats.csv").exists());
}

#[test]
fn archive_fetch_failure_aborts_the_run() {
    let fx = Fixture::new(range(1, 2, &[]), TestMode::Memory, RetentionFlags::default());
    let fetcher = FakeFetcher::new()
        .with(
            INDEX_URL,
            index(&[
                index_row("HB", "gone", 4, 4, "1", "1"),
                index_row("HB", "b", 4, 4, "1", "1"),
            ]),
        )
        .with(&archive_url("HB", "b"), matrix_archive("b"));
    let runner = FakeRunner::new();

    let err = run_harness(&fx.config, &fetcher, &runner).expect_err("must fail");

    assert!(matches!(err, HarnessError::Network { .. }));
    assert!(runner.invocations().is_empty());
    assert_eq!(fetcher.requests().len(), 2, "later matrices are not attempted");
    assert!(fx.matrix_dir().join("UFstats.csv").exists());
}

#[test]
fn cleanup_failure_is_recorded_and_the_run_continues() {
    let fx = Fixture::new(range(1, 2, &[]), TestMode::Memory, RetentionFlags::default());
    let fetcher = FakeFetcher::new()
        .with(
            INDEX_URL,
            index(&[
                index_row("HB", "a", 4, 4, "1", "1"),
                index_row("HB", "b", 4, 4, "1", "1"),
            ]),
        )
        .with(&archive_url("HB", "a"), nested_archive("a"))
        .with(&archive_url("HB", "b"), matrix_archive("b"));

    let outcome = run_harness(&fx.config, &fetcher, &FakeRunner::new()).expect("run");

    assert_eq!(outcome.selected_count(), 2);
    assert!(outcome.matrices[0].cleanup_error.is_some());
    assert!(!outcome.matrices[0].deleted);
    assert!(outcome.matrices[1].deleted);
}

fn nested_archive(name: &str) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let body = b"%%MatrixMarket matrix coordinate real symmetric\n";
    for path in [
        format!("{}/{}.mtx", name, name),
        format!("{}/aux/{}_coord.mtx", name, name),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, PathBuf::from(path), &body[..])
            .expect("append");
    }
    builder
        .into_inner()
        .and_then(|gz| gz.finish())
        .expect("finish")
}
