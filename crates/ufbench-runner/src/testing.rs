//! Test doubles for the fetch and command capabilities, plus fixture builders.

use crate::command::CommandRunner;
use crate::config::BuildLayout;
use crate::error::{HarnessError, Result};
use crate::fetch::{write_atomically, Fetcher};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Serves canned bodies by URL; any other URL fails like a 404.
#[derive(Default)]
pub struct FakeFetcher {
    responses: BTreeMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), body);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.requests.borrow_mut().push(url.to_string());
        let body = self
            .responses
            .get(url)
            .ok_or_else(|| HarnessError::network(url, "HTTP status client error (404 Not Found)"))?;
        write_atomically(dest, |f| f.write_all(body).map_err(|e| HarnessError::io(dest, e)))
    }
}

/// Records every invocation and answers with scripted results, keyed by the
/// program's file name. Unscripted programs exit 0 and print nothing.
#[derive(Default)]
pub struct FakeRunner {
    exit_codes: BTreeMap<String, i32>,
    spawn_failures: BTreeSet<String>,
    stdout: BTreeMap<String, String>,
    invocations: RefCell<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, program: &str, code: i32) -> Self {
        self.exit_codes.insert(program.to_string(), code);
        self
    }

    pub fn spawn_failure(mut self, program: &str) -> Self {
        self.spawn_failures.insert(program.to_string());
        self
    }

    pub fn stdout(mut self, program: &str, text: &str) -> Self {
        self.stdout.insert(program.to_string(), text.to_string());
        self
    }

    /// `run` calls in order; `capture` calls are not recorded.
    pub fn invocations(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.invocations.borrow().clone()
    }

    fn key(program: &Path) -> String {
        program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &Path, args: &[String]) -> io::Result<Option<i32>> {
        self.invocations
            .borrow_mut()
            .push((program.to_path_buf(), args.to_vec()));
        let key = Self::key(program);
        if self.spawn_failures.contains(&key) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", program.display()),
            ));
        }
        Ok(Some(self.exit_codes.get(&key).copied().unwrap_or(0)))
    }

    fn capture(&self, program: &Path, _args: &[String]) -> io::Result<String> {
        Ok(self
            .stdout
            .get(&Self::key(program))
            .cloned()
            .unwrap_or_default())
    }
}

/// A `.tar.gz` laid out like the collection's archives: `name/` holding
/// `name/name.mtx`.
///
/// Panics if the in-memory archive cannot be written.
pub fn matrix_archive(name: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    builder
        .append_data(&mut dir, format!("{}/", name), io::empty())
        .expect("append dir");

    let body = "%%MatrixMarket matrix coordinate real symmetric\n2 2 2\n1 1 1.0\n2 2 1.0\n";
    let mut file = tar::Header::new_gnu();
    file.set_size(body.len() as u64);
    file.set_mode(0o644);
    builder
        .append_data(
            &mut file,
            format!("{}/{}.mtx", name, name),
            body.as_bytes(),
        )
        .expect("append mtx");

    builder
        .into_inner()
        .and_then(|gz| gz.finish())
        .expect("finish archive")
}

/// One 12-field index row with the fields the pipeline reads filled in.
pub fn index_row(group: &str, name: &str, rows: u32, cols: u32, real: &str, sym: &str) -> String {
    format!(
        "{},{},{},{},{},{},0,0,0,0,{},0",
        group,
        name,
        rows,
        cols,
        rows * 3,
        real,
        sym
    )
}

/// Creates `<root>/_build` as a compiled build tree with `<root>/Source`
/// beside it.
///
/// Panics on filesystem errors.
pub fn build_tree(root: &Path) -> BuildLayout {
    let layout = BuildLayout::new(&root.join("_build"));
    fs::create_dir_all(layout.object_dir()).expect("object dir");
    fs::create_dir_all(root.join("Source")).expect("source dir");
    fs::create_dir_all(layout.tests_dir()).expect("tests dir");
    fs::write(layout.core_object(), b"").expect("core object");
    layout
}
