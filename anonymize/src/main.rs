use clap::Parser;
use dcmanon_anonymizer::{
    anonymize_files, check_directories, copy_directory, list_files, AnonymizationContext,
    AnonymizationPolicy, Anonymizer, BatchError, BatchOptions, CancellationToken, PolicyError,
};
use dcmanon_buffer::{BufferManager, BufferManagerOptions};
use dcmanon_encoding::{ReadOptions, DEFAULT_BUFFER_THRESHOLD};
use indicatif::{ProgressBar, ProgressStyle};
use snafu::prelude::*;
use snafu::{Report, Whatever};
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, Level};

/// The batch finished, but some files could not be anonymized.
const EXIT_PARTIAL_FAILURE: i32 = 2;

/// DICOM directory anonymizer
///
/// Copies the input directory tree to a new output directory
/// and de-identifies every DICOM file of the copy.
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// the directory of DICOM files to anonymize
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// the directory to create with the anonymized files
    #[arg(short = 'o', long = "output")]
    output: PathBuf,
    /// a JSON document describing the anonymization policy
    /// [default: the basic profile]
    #[arg(short = 'p', long = "policy")]
    policy: Option<PathBuf>,
    /// pixel data larger than this many bytes
    /// is kept in the buffer store instead of in memory
    #[arg(long = "buffer-threshold", default_value_t = DEFAULT_BUFFER_THRESHOLD)]
    buffer_threshold: usize,
    /// the maximum number of pixel data bytes held in memory
    #[arg(long = "memory-cap")]
    memory_cap: Option<usize>,
    /// verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// do not show a progress bar
    #[arg(long = "no-progress")]
    no_progress: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    /// The policy file could not be opened.
    #[snafu(display("Could not open policy file {}", path.display()))]
    OpenPolicy {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The policy file is not a valid policy.
    #[snafu(display("Invalid policy file {}", path.display()))]
    ReadPolicy { path: PathBuf, source: PolicyError },
    /// The input or output directory is not usable.
    #[snafu(display("Cannot anonymize into the output directory"))]
    Directories { source: BatchError },
    /// The input tree could not be copied.
    #[snafu(display("Could not copy the input directory"))]
    Copy { source: BatchError },
    /// The buffer store could not be started.
    #[snafu(display("Could not start the buffer store"))]
    BufferStore { source: dcmanon_buffer::Error },
}

fn main() {
    let app = match App::try_parse() {
        Ok(app) => app,
        Err(e) => {
            let _ = e.print();
            // usage errors exit with 1, help and version with 0
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let code = run(app).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        1
    });
    std::process::exit(code);
}

fn run(app: App) -> Result<i32, Error> {
    let App {
        input,
        output,
        policy,
        buffer_threshold,
        memory_cap,
        verbose,
        no_progress,
    } = app;

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    let policy = match policy {
        Some(path) => {
            let file = File::open(&path).context(OpenPolicySnafu { path: &path })?;
            let policy = AnonymizationPolicy::from_json_reader(std::io::BufReader::new(file))
                .context(ReadPolicySnafu { path: &path })?;
            debug!("Loaded policy from {}", path.display());
            policy
        }
        None => AnonymizationPolicy::basic_profile(),
    };

    check_directories(&input, &output).context(DirectoriesSnafu)?;

    let mut buffer_options = BufferManagerOptions::new();
    if let Some(cap) = memory_cap {
        buffer_options = buffer_options.memory_cap(cap);
    }
    let manager = BufferManager::with_options(buffer_options).context(BufferStoreSnafu)?;
    let options = BatchOptions {
        read: ReadOptions::new()
            .buffer_threshold(buffer_threshold)
            .buffer_manager(manager),
        cancel: CancellationToken::new(),
    };

    let copied = copy_directory(&input, &output, &options.cancel).context(CopySnafu)?;
    debug!("Copied {} files to {}", copied, output.display());
    let files = list_files(&output).context(CopySnafu)?;

    let progress_bar = if no_progress {
        None
    } else {
        let progress_bar = ProgressBar::new(files.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {wide_msg}")
                .expect("Invalid progress bar template"),
        );
        progress_bar.enable_steady_tick(Duration::new(0, 480_000_000));
        Some(progress_bar)
    };

    let anonymizer = Anonymizer::new(policy);
    let mut ctx = AnonymizationContext::new();
    let report = anonymize_files(&files, &anonymizer, &mut ctx, &options, |path| {
        if let Some(pb) = progress_bar.as_ref() {
            pb.set_message(path.display().to_string());
            pb.inc(1);
        }
    });

    if let Some(pb) = progress_bar {
        pb.finish_with_message("done");
    }

    if report.failures.is_empty() {
        debug!(
            "Anonymized {} files, {} UIDs regenerated",
            report.anonymized.len(),
            ctx.uid_map().len()
        );
        return Ok(0);
    }

    info!(
        "Anonymized {} of {} files",
        report.anonymized.len(),
        report.processed()
    );
    error!("{} files could not be anonymized:", report.failures.len());
    for failure in &report.failures {
        error!("- {}", Report::from_error(failure));
    }
    Ok(EXIT_PARTIAL_FAILURE)
}
