// Complete Failure Demonstration Runner
// Triggers eleven well-known failure conditions on purpose and reports each one
// as it is caught. Every failure is an explicit `Result`; nothing unwinds.

use colored::Colorize;
use std::any::{type_name, Any};
use std::cell::Cell;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::num::ParseIntError;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

// =============================================================================
// Milestone 1: A closed set of failure kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Io,
    FileNotFound,
    UnexpectedEof,
    Sql,
    ClassNotFound,
    Arithmetic,
    NullDereference,
    IndexOutOfBounds,
    InvalidCast,
    IllegalArgument,
    Interrupted,
    NumberFormat,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Io => "IoError",
            FailureKind::FileNotFound => "FileNotFound",
            FailureKind::UnexpectedEof => "UnexpectedEof",
            FailureKind::Sql => "SqlError",
            FailureKind::ClassNotFound => "ClassNotFound",
            FailureKind::Arithmetic => "ArithmeticError",
            FailureKind::NullDereference => "NullDereference",
            FailureKind::IndexOutOfBounds => "IndexOutOfBounds",
            FailureKind::InvalidCast => "InvalidCast",
            FailureKind::IllegalArgument => "IllegalArgument",
            FailureKind::Interrupted => "Interrupted",
            FailureKind::NumberFormat => "NumberFormatError",
        };
        f.write_str(name)
    }
}

/// Every way a scenario is allowed to fail.
/// The Display text is the message printed after "<Kind> caught: ".
#[derive(Error, Debug)]
pub enum Failure {
    #[error("{resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: io::Error,
    },

    #[error("{resource}: {source}")]
    FileNotFound {
        resource: String,
        #[source]
        source: io::Error,
    },

    #[error("{resource}: {source}")]
    UnexpectedEof {
        resource: String,
        #[source]
        source: io::Error,
    },

    #[error("{database}: {source}")]
    Sql {
        database: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{0}")]
    ClassNotFound(String),

    #[error("{0}")]
    Arithmetic(&'static str),

    #[error("cannot invoke \"{operation}\" because \"{binding}\" is absent")]
    NullDereference {
        operation: &'static str,
        binding: &'static str,
    },

    #[error("index out of bounds: the len is {len} but the index is {index}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("cannot cast {from} to {to}")]
    InvalidCast {
        from: &'static str,
        to: &'static str,
    },

    #[error("{0}")]
    IllegalArgument(String),

    #[error("{0}")]
    Interrupted(String),

    #[error("For input string: \"{input}\" ({source})")]
    NumberFormat {
        input: String,
        #[source]
        source: ParseIntError,
    },
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Io { .. } => FailureKind::Io,
            Failure::FileNotFound { .. } => FailureKind::FileNotFound,
            Failure::UnexpectedEof { .. } => FailureKind::UnexpectedEof,
            Failure::Sql { .. } => FailureKind::Sql,
            Failure::ClassNotFound(_) => FailureKind::ClassNotFound,
            Failure::Arithmetic(_) => FailureKind::Arithmetic,
            Failure::NullDereference { .. } => FailureKind::NullDereference,
            Failure::IndexOutOfBounds { .. } => FailureKind::IndexOutOfBounds,
            Failure::InvalidCast { .. } => FailureKind::InvalidCast,
            Failure::IllegalArgument(_) => FailureKind::IllegalArgument,
            Failure::Interrupted(_) => FailureKind::Interrupted,
            Failure::NumberFormat { .. } => FailureKind::NumberFormat,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Failure::Io {
            resource: path.display().to_string(),
            source,
        }
    }
}

// =============================================================================
// Milestone 2: Scenario inputs
// =============================================================================

/// Where the end-of-stream scenario gets its empty resource from.
#[derive(Debug, Clone, PartialEq)]
pub enum EmptyResource {
    /// Unnamed temporary file; gone as soon as its handle closes.
    Anonymous,
    Path(PathBuf),
}

impl EmptyResource {
    fn label(&self) -> String {
        match self {
            EmptyResource::Anonymous => "<anonymous temporary file>".to_string(),
            EmptyResource::Path(path) => path.display().to_string(),
        }
    }

    fn open(&self) -> io::Result<File> {
        match self {
            EmptyResource::Anonymous => tempfile::tempfile(),
            EmptyResource::Path(path) => File::open(path),
        }
    }
}

/// Inputs chosen so that every scenario fails.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub unreadable_file: PathBuf,
    pub missing_file: PathBuf,
    pub empty_resource: EmptyResource,
    pub database_path: PathBuf,
    pub driver_name: String,
    pub dividend: i32,
    pub divisor: i32,
    pub array_len: usize,
    pub index: usize,
    pub sleep_millis: i64,
    pub numeric_text: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            unreadable_file: PathBuf::from("nonexistentfile.txt"),
            missing_file: PathBuf::from("missingfile.txt"),
            empty_resource: EmptyResource::Anonymous,
            database_path: PathBuf::from("nonexistentDB.db"),
            driver_name: "com.nonexistent.Driver".to_string(),
            dividend: 10,
            divisor: 0,
            array_len: 5,
            index: 10,
            sleep_millis: -1000,
            numeric_text: "InvalidNumber".to_string(),
        }
    }
}

// =============================================================================
// Milestone 3: Guarded resources and helpers
// =============================================================================

thread_local! {
    static OPEN_HANDLES: Cell<usize> = const { Cell::new(0) };
}

/// Number of `ScopedHandle`s currently alive on this thread.
#[allow(dead_code)]
pub fn open_handles() -> usize {
    OPEN_HANDLES.with(|count| count.get())
}

/// Owns an open resource and releases it when the scope ends,
/// whichever way the scope is left.
pub struct ScopedHandle<R> {
    inner: R,
}

impl<R> ScopedHandle<R> {
    pub fn new(inner: R) -> Self {
        OPEN_HANDLES.with(|count| count.set(count.get() + 1));
        ScopedHandle { inner }
    }
}

impl<R> Deref for ScopedHandle<R> {
    type Target = R;
    fn deref(&self) -> &R {
        &self.inner
    }
}

impl<R> DerefMut for ScopedHandle<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R> Drop for ScopedHandle<R> {
    fn drop(&mut self) {
        OPEN_HANDLES.with(|count| count.set(count.get().saturating_sub(1)));
    }
}

/// Type names a driver lookup can resolve.
fn registered_drivers() -> [&'static str; 2] {
    [type_name::<Connection>(), type_name::<File>()]
}

pub fn resolve_driver(name: &str) -> Result<&'static str, Failure> {
    registered_drivers()
        .into_iter()
        .find(|driver| *driver == name)
        .ok_or_else(|| Failure::ClassNotFound(name.to_string()))
}

/// Moves `value` behind `dyn Any` and tries to take it back out as `U`.
pub fn coerce<T: Any, U: Any>(value: T) -> Result<U, Failure> {
    let boxed: Box<dyn Any> = Box::new(value);
    boxed
        .downcast::<U>()
        .map(|value| *value)
        .map_err(|_| Failure::InvalidCast {
            from: type_name::<T>(),
            to: type_name::<U>(),
        })
}

/// A sleep that another party can cut short.
pub struct InterruptibleSleep {
    wake: Sender<()>,
    signal: Receiver<()>,
}

impl InterruptibleSleep {
    pub fn new() -> Self {
        let (wake, signal) = mpsc::channel();
        InterruptibleSleep { wake, signal }
    }

    #[allow(dead_code)]
    pub fn interrupt(&self) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.wake.send(());
    }

    pub fn sleep(&self, millis: i64) -> Result<(), Failure> {
        let millis = u64::try_from(millis)
            .map_err(|_| Failure::IllegalArgument("timeout value is negative".to_string()))?;

        match self.signal.recv_timeout(Duration::from_millis(millis)) {
            Ok(()) => Err(Failure::Interrupted("sleep interrupted".to_string())),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(()),
        }
    }
}

impl Default for InterruptibleSleep {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Milestone 4: The scenarios
// =============================================================================

fn io_failure(config: &DemoConfig) -> Result<(), Failure> {
    let path = &config.unreadable_file;
    fs::read_to_string(path).map_err(|source| Failure::io(path, source))?;
    Ok(())
}

fn missing_file(config: &DemoConfig) -> Result<(), Failure> {
    let path = &config.missing_file;
    File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => Failure::FileNotFound {
            resource: path.display().to_string(),
            source,
        },
        _ => Failure::io(path, source),
    })?;
    Ok(())
}

fn end_of_stream(config: &DemoConfig) -> Result<(), Failure> {
    let resource = config.empty_resource.label();
    let file = config.empty_resource.open().map_err(|source| Failure::Io {
        resource: resource.clone(),
        source,
    })?;
    let mut handle = ScopedHandle::new(file);

    // Length prefix of a modified-UTF-8 string.
    let mut header = [0u8; 2];
    handle.read_exact(&mut header).map_err(|source| {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            Failure::UnexpectedEof {
                resource: resource.clone(),
                source,
            }
        } else {
            Failure::Io {
                resource: resource.clone(),
                source,
            }
        }
    })?;
    Ok(())
}

fn database_connection(config: &DemoConfig) -> Result<(), Failure> {
    let path = &config.database_path;
    // No SQLITE_OPEN_CREATE: a missing database stays missing.
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE).map_err(|source| {
        Failure::Sql {
            database: path.display().to_string(),
            source,
        }
    })?;
    Ok(())
}

fn class_lookup(config: &DemoConfig) -> Result<(), Failure> {
    resolve_driver(&config.driver_name)?;
    Ok(())
}

fn divide_by_zero(config: &DemoConfig) -> Result<(), Failure> {
    config
        .dividend
        .checked_div(config.divisor)
        .ok_or(Failure::Arithmetic("attempt to divide by zero"))?;
    Ok(())
}

fn null_dereference(_config: &DemoConfig) -> Result<(), Failure> {
    let text: Option<&str> = None;
    text.map(str::len).ok_or(Failure::NullDereference {
        operation: "len()",
        binding: "text",
    })?;
    Ok(())
}

fn index_out_of_bounds(config: &DemoConfig) -> Result<(), Failure> {
    let array = vec![0i32; config.array_len];
    array.get(config.index).ok_or(Failure::IndexOutOfBounds {
        index: config.index,
        len: array.len(),
    })?;
    Ok(())
}

fn invalid_cast(_config: &DemoConfig) -> Result<(), Failure> {
    coerce::<i32, String>(100)?;
    Ok(())
}

fn illegal_argument(config: &DemoConfig) -> Result<(), Failure> {
    InterruptibleSleep::new().sleep(config.sleep_millis)
}

fn number_format(config: &DemoConfig) -> Result<(), Failure> {
    let input = &config.numeric_text;
    input
        .parse::<i32>()
        .map_err(|source| Failure::NumberFormat {
            input: input.clone(),
            source,
        })?;
    Ok(())
}

// =============================================================================
// Milestone 5: Scenario registry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Failures a caller has to deal with explicitly.
    Checked,
    /// Failures caused by programming or data errors.
    Runtime,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Checked, Category::Runtime];

    pub fn banner(&self) -> &'static str {
        match self {
            Category::Checked => "Simulating checked failures:",
            Category::Runtime => "Simulating runtime failures:",
        }
    }
}

pub struct Scenario {
    pub name: &'static str,
    pub category: Category,
    /// Narrow kinds come before the general kind they specialise.
    pub expected: &'static [FailureKind],
    pub run: fn(&DemoConfig) -> Result<(), Failure>,
}

pub static SCENARIOS: [Scenario; 11] = [
    Scenario {
        name: "io_failure",
        category: Category::Checked,
        expected: &[FailureKind::Io],
        run: io_failure,
    },
    Scenario {
        name: "missing_file",
        category: Category::Checked,
        expected: &[FailureKind::FileNotFound, FailureKind::Io],
        run: missing_file,
    },
    Scenario {
        name: "end_of_stream",
        category: Category::Checked,
        expected: &[FailureKind::UnexpectedEof, FailureKind::Io],
        run: end_of_stream,
    },
    Scenario {
        name: "database_connection",
        category: Category::Checked,
        expected: &[FailureKind::Sql],
        run: database_connection,
    },
    Scenario {
        name: "class_lookup",
        category: Category::Checked,
        expected: &[FailureKind::ClassNotFound],
        run: class_lookup,
    },
    Scenario {
        name: "divide_by_zero",
        category: Category::Runtime,
        expected: &[FailureKind::Arithmetic],
        run: divide_by_zero,
    },
    Scenario {
        name: "null_dereference",
        category: Category::Runtime,
        expected: &[FailureKind::NullDereference],
        run: null_dereference,
    },
    Scenario {
        name: "index_out_of_bounds",
        category: Category::Runtime,
        expected: &[FailureKind::IndexOutOfBounds],
        run: index_out_of_bounds,
    },
    Scenario {
        name: "invalid_cast",
        category: Category::Runtime,
        expected: &[FailureKind::InvalidCast],
        run: invalid_cast,
    },
    Scenario {
        name: "illegal_argument",
        category: Category::Runtime,
        expected: &[FailureKind::IllegalArgument, FailureKind::Interrupted],
        run: illegal_argument,
    },
    Scenario {
        name: "number_format",
        category: Category::Runtime,
        expected: &[FailureKind::NumberFormat],
        run: number_format,
    },
];

// =============================================================================
// Milestone 6: Runner
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Caught(FailureKind),
    Unanticipated(FailureKind),
    Completed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub caught: usize,
    pub unanticipated: usize,
    pub completed: usize,
}

impl RunReport {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Caught(_) => self.caught += 1,
            Verdict::Unanticipated(_) => self.unanticipated += 1,
            Verdict::Completed => self.completed += 1,
        }
    }

    /// True when every scenario failed the way it was meant to.
    pub fn is_clean(&self) -> bool {
        self.unanticipated == 0 && self.completed == 0
    }
}

/// Runs one scenario and writes exactly one line describing its outcome.
pub fn run_scenario<W: Write>(
    scenario: &Scenario,
    config: &DemoConfig,
    out: &mut W,
) -> io::Result<Verdict> {
    match (scenario.run)(config) {
        Err(failure) if scenario.expected.contains(&failure.kind()) => {
            writeln!(out, "{} caught: {}", failure.kind(), failure)?;
            Ok(Verdict::Caught(failure.kind()))
        }
        Err(failure) => {
            writeln!(out, "{} unanticipated in {}: {}", failure.kind(), scenario.name, failure)?;
            eprintln!(
                "{} {} raised {}, expected one of {:?}",
                "[WARN]".yellow(),
                scenario.name,
                failure.kind(),
                scenario.expected
            );
            Ok(Verdict::Unanticipated(failure.kind()))
        }
        Ok(()) => {
            let expected = scenario
                .expected
                .first()
                .map(ToString::to_string)
                .unwrap_or_else(|| "failure".to_string());
            writeln!(out, "{} completed without the expected {}", scenario.name, expected)?;
            eprintln!(
                "{} {} did not fail; check that its inputs are still absent",
                "[WARN]".yellow(),
                scenario.name
            );
            Ok(Verdict::Completed)
        }
    }
}

/// Runs every registered scenario, grouped under its category banner.
pub fn run_all<W: Write>(config: &DemoConfig, out: &mut W) -> io::Result<RunReport> {
    let mut report = RunReport::default();

    for (i, category) in Category::ALL.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{}", category.banner())?;

        for scenario in SCENARIOS.iter().filter(|s| s.category == *category) {
            report.record(run_scenario(scenario, config, out)?);
        }
    }

    out.flush()?;
    Ok(report)
}

fn main() -> ExitCode {
    let config = DemoConfig::default();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match run_all(&config, &mut out) {
        Ok(report) if report.is_clean() => {
            eprintln!(
                "{}",
                format!("✓ {} failures caught", report.caught).green()
            );
            ExitCode::SUCCESS
        }
        Ok(report) => {
            eprintln!(
                "{}",
                format!(
                    "✗ {} caught, {} unanticipated, {} completed without failing",
                    report.caught, report.unanticipated, report.completed
                )
                .red()
            );
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{} could not write report: {}", "[ERROR]".red(), e);
            ExitCode::from(2)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
