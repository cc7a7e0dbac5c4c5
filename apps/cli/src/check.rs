//! Byte-wise verification of the copy results

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Args;

#[derive(Args)]
pub struct CheckArgs {
    /// Directory holding the original files
    #[arg(long, default_value = "./input")]
    pub input: PathBuf,

    /// Directory holding the copies
    #[arg(long, default_value = "./output")]
    pub output: PathBuf,
}

pub fn run(args: &CheckArgs) -> anyhow::Result<()> {
    if !args.input.is_dir() {
        bail!("input directory {} does not exist", args.input.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(&args.input)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.path())
        .collect();
    files.sort();

    let mut mismatches = 0usize;
    for original in &files {
        let name = original.file_name().expect("listed files have names");
        let copy = args.output.join(name);
        let equal = copy.is_file() && files_equal(original, &copy)?;
        println!(
            "{} -> {}",
            name.to_string_lossy(),
            if equal { "ok" } else { "MISMATCH" }
        );
        if !equal {
            mismatches += 1;
        }
    }

    if mismatches > 0 {
        bail!("{mismatches} of {} file(s) differ", files.len());
    }
    println!("All {} file(s) match", files.len());
    Ok(())
}

/// Compare two files chunk by chunk (size first, cheap reject)
fn files_equal(a: &Path, b: &Path) -> anyhow::Result<bool> {
    let (meta_a, meta_b) = (a.metadata()?, b.metadata()?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a =
        BufReader::new(File::open(a).with_context(|| format!("opening {}", a.display()))?);
    let mut reader_b =
        BufReader::new(File::open(b).with_context(|| format!("opening {}", b.display()))?);

    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    loop {
        let n = reader_a.read(&mut buf_a)?;
        if n == 0 {
            return Ok(true);
        }
        reader_b.read_exact(&mut buf_b[..n])?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}
