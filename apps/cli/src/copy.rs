//! The copy workload: one thread per file, randomly sized blocks
//!
//! Each worker reads its whole input file into allocator blocks of random
//! sizes, then locks every block again to write the output file, then frees
//! them all. With enough files relative to the memory budget this drives
//! every pool deep into its swap levels.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use clap::Args;
use rand::Rng;
use swapmem::utils::format_bytes;
use swapmem::{ManagerConfig, MemoryBlock, MemoryManager};
use tracing::info;

#[derive(Args)]
pub struct CopyArgs {
    /// Directory holding the files to copy
    #[arg(long, default_value = "./input")]
    pub input: PathBuf,

    /// Directory receiving the copies (created if missing)
    #[arg(long, default_value = "./output")]
    pub output: PathBuf,

    /// Memory budget, e.g. `900000`, `64k`, `16m`, `1g`
    #[arg(long, default_value = "16m", value_parser = parse_size)]
    pub memory: usize,

    /// Directory for the allocator's swap level files
    #[arg(long, default_value = "./swap")]
    pub swap_dir: PathBuf,

    /// Suppress the once-per-second progress report
    #[arg(long)]
    pub quiet: bool,
}

/// Per-file byte counters shared with the progress reporter
#[derive(Default)]
struct Progress {
    size: AtomicU64,
    read: AtomicU64,
    written: AtomicU64,
}

pub fn run(args: &CopyArgs) -> anyhow::Result<()> {
    if !args.input.is_dir() {
        bail!("input directory {} does not exist", args.input.display());
    }
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let config = ManagerConfig::default().with_swap_dir(&args.swap_dir);
    MemoryManager::init_with_config(args.memory, config)?;
    let manager = MemoryManager::global()?;
    info!(budget = args.memory, "allocator initialized");

    let mut files: Vec<PathBuf> = std::fs::read_dir(&args.input)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.path())
        .collect();
    files.sort();
    if files.is_empty() {
        bail!("no files to copy in {}", args.input.display());
    }

    let jobs: Vec<(PathBuf, Arc<Progress>)> = files
        .into_iter()
        .map(|path| (path, Arc::new(Progress::default())))
        .collect();
    println!("Copying {} file(s), one thread per file...", jobs.len());

    let started = Instant::now();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let workers: Vec<_> = jobs
            .iter()
            .map(|(path, progress)| {
                let name = path.file_name().expect("listed files have names");
                let target = args.output.join(name);
                let progress = Arc::clone(progress);
                scope.spawn(move || copy_file(manager, path, &target, &progress))
            })
            .collect();

        let reporter = (!args.quiet).then(|| {
            let done = &done;
            let jobs = &jobs;
            scope.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_secs(1));
                    report(manager, jobs);
                }
            })
        });

        let mut failures = Vec::new();
        for ((path, _), worker) in jobs.iter().zip(workers) {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(format!("{}: {e:#}", path.display())),
                Err(_) => failures.push(format!("{}: worker panicked", path.display())),
            }
        }
        done.store(true, Ordering::Release);
        if let Some(reporter) = reporter {
            let _ = reporter.join();
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("copy failed:\n{}", failures.join("\n")))
        }
    })?;

    report(manager, &jobs);
    println!("\nCopying completed in {:.2?}", started.elapsed());
    Ok(())
}

/// Copy one file: read it into random-size blocks, write them back, free them
fn copy_file(
    manager: &MemoryManager,
    input: &Path,
    output: &Path,
    progress: &Progress,
) -> anyhow::Result<()> {
    let mut blocks = read_file_by_blocks(manager, input, progress)?;
    write_blocks_into_file(&mut blocks, output, progress)?;
    for block in blocks {
        block.free()?;
    }
    Ok(())
}

fn read_file_by_blocks(
    manager: &MemoryManager,
    input: &Path,
    progress: &Progress,
) -> anyhow::Result<Vec<MemoryBlock>> {
    let mut file =
        File::open(input).with_context(|| format!("opening {} for reading", input.display()))?;
    let filesize = file.metadata()?.len() as usize;
    progress.size.store(filesize as u64, Ordering::Relaxed);

    let mut rng = rand::rng();
    let mut blocks = Vec::new();
    let mut read = 0usize;
    while read < filesize {
        let size = rng
            .random_range(1..=manager.max_block_size())
            .min(filesize - read);
        let mut block = manager.get(size)?;
        block.access(|data| file.read_exact(data))??;
        read += size;
        progress.read.store(read as u64, Ordering::Relaxed);
        blocks.push(block);
    }
    Ok(blocks)
}

fn write_blocks_into_file(
    blocks: &mut [MemoryBlock],
    output: &Path,
    progress: &Progress,
) -> anyhow::Result<()> {
    let mut file = File::create(output)
        .with_context(|| format!("opening {} for writing", output.display()))?;
    for block in blocks {
        let mut written = 0u64;
        block.access(|data| {
            written = data.len() as u64;
            file.write_all(data)
        })??;
        progress.written.fetch_add(written, Ordering::Relaxed);
    }
    file.flush()?;
    Ok(())
}

fn report(manager: &MemoryManager, jobs: &[(PathBuf, Arc<Progress>)]) {
    println!("\nMemory pool statistics:");
    manager.print_statistics();
    println!("\nCopy progress:");
    for (path, progress) in jobs {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!(
            "  {name}: read {} / {}, written {}",
            format_bytes(progress.read.load(Ordering::Relaxed) as usize),
            format_bytes(progress.size.load(Ordering::Relaxed) as usize),
            format_bytes(progress.written.load(Ordering::Relaxed) as usize),
        );
    }
}

/// Parse a byte count with an optional `k`/`m`/`g` suffix
pub fn parse_size(input: &str) -> Result<usize, String> {
    let trimmed = input.trim().to_ascii_lowercase();
    let (digits, factor) = match trimmed.strip_suffix(['k', 'm', 'g']) {
        Some(digits) => {
            let factor = match trimmed.as_bytes()[trimmed.len() - 1] {
                b'k' => 1024,
                b'm' => 1024 * 1024,
                _ => 1024 * 1024 * 1024,
            };
            (digits, factor)
        }
        None => (trimmed.as_str(), 1),
    };
    let value: usize = digits
        .parse()
        .map_err(|_| format!("invalid size: {input}"))?;
    value
        .checked_mul(factor)
        .ok_or_else(|| format!("size overflows: {input}"))
}
