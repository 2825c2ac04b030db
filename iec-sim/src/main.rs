//! Drive the iec-rs buffer pool against a host directory.
//!
//! Every command goes through the same pool a drive would use, so slot
//! exhaustion, status messages and end-of-data marking behave as on the bus.
//!
//! # Usage
//!
//! ```bash
//! # List a directory, only PRG files starting with G
//! iec-sim ls ./disk --pattern 'G*' --type PRG
//!
//! # Print a file
//! iec-sim cat ./disk README.SEQ
//!
//! # Copy a file through two channels with small slots
//! iec-sim --capacity 64 cp ./disk LOADER LOADER.BAK
//!
//! # Random allocate/release run, stats as JSON
//! iec-sim --slots 4 stress --seed 7 --ops 10000 --json
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use iec_rs::{
    BufferPool, DirChannel, DirEntry, EntryFilter, FileType, HostFs, MemDir, PoolError,
    PoolStats, ReadOutcome, SlotId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Channel used for directory listings.
const LISTING_CHANNEL: u8 = 0;
/// Channel used for loading.
const READ_CHANNEL: u8 = 2;
/// Channel used for saving.
const WRITE_CHANNEL: u8 = 3;

/// Drive the buffer pool against a host directory
#[derive(Parser, Debug)]
#[command(name = "iec-sim")]
#[command(about = "Stream directories and files through the IEC buffer pool", long_about = None)]
struct Args {
    /// Number of buffer slots
    #[arg(long, default_value_t = 4)]
    slots: usize,

    /// Capacity of each slot in bytes
    #[arg(long, default_value_t = 256)]
    capacity: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        /// Directory acting as the medium
        dir: PathBuf,

        /// Name pattern (`?` matches one character, `*` the rest)
        #[arg(short, long, default_value = "*")]
        pattern: String,

        /// Only list entries of this type (DEL, SEQ, PRG, USR, REL, DIR)
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,
    },
    /// Print the first file matching a pattern
    Cat {
        /// Directory acting as the medium
        dir: PathBuf,

        /// Name pattern
        pattern: String,
    },
    /// Copy a file within a directory
    Cp {
        /// Directory acting as the medium
        dir: PathBuf,

        /// Source name pattern
        src: String,

        /// Destination name, must not exist
        dst: String,
    },
    /// Run random allocate/release/find sequences and check pool invariants
    Stress {
        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Number of operations
        #[arg(long, default_value_t = 10000)]
        ops: u32,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Outcome of a stress run.
#[derive(Debug, Serialize)]
struct StressReport {
    seed: u64,
    ops: u32,
    rejected: u64,
    stats: PoolStats,
}

/// Decode a 32-byte listing line into printable text.
fn format_line(line: &[u8]) -> String {
    if line.len() < 4 {
        return String::new();
    }
    let blocks = u16::from_le_bytes([line[2], line[3]]);
    let text: String = line[4..]
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect();
    format!("{:<5}{}", blocks, text.trim_start())
}

/// Read the status channel through to its end.
fn status_message(pool: &mut BufferPool) -> Result<String, PoolError> {
    let status = pool.status_id();
    let mut buf = [0u8; 64];
    let len = pool.read(status, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf[..len])
        .trim_end_matches('\r')
        .to_string())
}

/// Report `err` on the status channel and turn the message into an error.
fn fail(pool: &mut BufferPool, err: PoolError) -> Box<dyn std::error::Error> {
    tracing::debug!(error = %err, "command failed");
    pool.report(&err);
    match status_message(pool) {
        Ok(message) => format!("{} ({})", message, err).into(),
        Err(_) => err.into(),
    }
}

fn parse_type(name: &str) -> Result<FileType, Box<dyn std::error::Error>> {
    FileType::parse(&name.to_ascii_uppercase())
        .ok_or_else(|| format!("unknown file type: {}", name).into())
}

/// Stream a channel into `out`. Returns the number of bytes copied.
fn stream(pool: &mut BufferPool, id: SlotId, out: &mut impl Write) -> Result<u64, PoolError> {
    let mut buf = [0u8; 256];
    let mut total = 0;
    loop {
        let len = pool.read(id, &mut buf)?;
        if len == 0 {
            return Ok(total);
        }
        out.write_all(&buf[..len])?;
        total += len as u64;
    }
}

/// Close a channel after a transfer, or drop it without flushing if the
/// transfer failed.
fn finish<T>(pool: &mut BufferPool, id: SlotId, result: Result<T, PoolError>) -> Result<T, PoolError> {
    match result {
        Ok(value) => {
            pool.close(id)?;
            Ok(value)
        }
        Err(e) => {
            pool.release(id)?;
            Err(e)
        }
    }
}

fn cmd_ls(
    pool: &mut BufferPool,
    host: &HostFs,
    pattern: &str,
    file_type: Option<FileType>,
) -> Result<Vec<String>, PoolError> {
    let mut filter = EntryFilter::new(pattern.as_bytes());
    if let Some(t) = file_type {
        filter = filter.with_type(t);
    }

    let id = pool.allocate(LISTING_CHANNEL, host.list(filter)?.into())?;
    let mut listing = Vec::new();
    let result = stream(pool, id, &mut listing);
    finish(pool, id, result)?;

    Ok(listing.chunks(iec_rs::dirent::LINE_SIZE).map(format_line).collect())
}

fn cmd_cat(pool: &mut BufferPool, host: &HostFs, pattern: &str) -> Result<Vec<u8>, PoolError> {
    let file = host.open_read(pool.shared_mut(), pattern.as_bytes())?;
    let id = pool.allocate(READ_CHANNEL, file.into())?;
    let mut data = Vec::new();
    let result = stream(pool, id, &mut data);
    finish(pool, id, result)?;
    Ok(data)
}

fn cmd_cp(pool: &mut BufferPool, host: &HostFs, src: &str, dst: &str) -> Result<u64, PoolError> {
    let file = host.open_read(pool.shared_mut(), src.as_bytes())?;
    let src = pool.allocate(READ_CHANNEL, file.into())?;
    let dst = match host.create(dst) {
        Ok(file) => pool.allocate(WRITE_CHANNEL, file.into()),
        Err(e) => Err(e.into()),
    };
    let dst = match dst {
        Ok(id) => id,
        Err(e) => {
            pool.release(src)?;
            return Err(e);
        }
    };

    let mut copied = 0;
    let result = loop {
        match pool.read_byte(src) {
            Ok(ReadOutcome::Byte { value, .. }) => {
                if let Err(e) = pool.write_byte(dst, value) {
                    break Err(e);
                }
                copied += 1;
            }
            Ok(ReadOutcome::EndOfData) => break Ok(copied),
            Err(e) => break Err(e),
        }
    };

    match result {
        Ok(copied) => {
            let closed = pool.close(src);
            pool.close(dst)?;
            closed?;
            Ok(copied)
        }
        Err(e) => {
            pool.release(src)?;
            pool.release(dst)?;
            Err(e)
        }
    }
}

/// Fail with `what` unless `ok` holds.
fn check(ok: bool, what: impl FnOnce() -> String) -> Result<(), Box<dyn std::error::Error>> {
    if ok {
        Ok(())
    } else {
        Err(what().into())
    }
}

fn cmd_stress(
    pool: &mut BufferPool,
    seed: u64,
    ops: u32,
) -> Result<StressReport, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut open: Vec<(u8, SlotId)> = Vec::new();
    let mut rejected = 0;
    let status_channel = pool.config().status_channel;

    for _ in 0..ops {
        if open.is_empty() || rng.gen_bool(0.55) {
            let channel = rng.gen_range(0..=14u8);
            if channel == status_channel {
                continue;
            }
            let entries = (0..rng.gen_range(0..4))
                .map(|i| DirEntry::new(format!("ENTRY{}", i), FileType::Prg, 1));
            let state = DirChannel::new(MemDir::new(entries), EntryFilter::all()).into();

            match pool.allocate(channel, state) {
                Ok(id) => open.push((channel, id)),
                Err(PoolError::NotAvailable) | Err(PoolError::ChannelInUse(_)) => rejected += 1,
                Err(e) => return Err(e.into()),
            }
        } else {
            let (channel, id) = open.swap_remove(rng.gen_range(0..open.len()));
            let found = pool.find(channel)?;
            check(found == id, || {
                format!("channel {} resolved to {:?}, expected {:?}", channel, found, id)
            })?;
            if rng.gen_bool(0.5) {
                // Drain part of the listing before closing.
                let _ = pool.read_byte(id)?;
                pool.close(id)?;
            } else {
                pool.release(id)?;
            }
        }

        let in_use = pool.slots().filter(|s| s.is_in_use()).count();
        let active = pool.active_count();
        check(active == open.len() && in_use == open.len(), || {
            format!(
                "{} channels open but pool counts {} active, {} in use",
                open.len(),
                active,
                in_use
            )
        })?;
    }

    let stats = pool.stats();
    pool.release_all(true)?;
    Ok(StressReport {
        seed,
        ops,
        rejected,
        stats,
    })
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut pool = BufferPool::builder()
        .slots(args.slots)
        .slot_capacity(args.capacity)
        .build()?;

    let mut stdout = io::stdout().lock();
    match args.command {
        Command::Ls {
            dir,
            pattern,
            file_type,
        } => {
            let file_type = file_type.as_deref().map(parse_type).transpose()?;
            let host = HostFs::new(dir);
            let lines = cmd_ls(&mut pool, &host, &pattern, file_type)
                .map_err(|e| fail(&mut pool, e))?;
            for line in &lines {
                writeln!(stdout, "{}", line)?;
            }
        }
        Command::Cat { dir, pattern } => {
            let host = HostFs::new(dir);
            let data = cmd_cat(&mut pool, &host, &pattern).map_err(|e| fail(&mut pool, e))?;
            stdout.write_all(&data)?;
        }
        Command::Cp { dir, src, dst } => {
            let host = HostFs::new(dir);
            let copied = cmd_cp(&mut pool, &host, &src, &dst).map_err(|e| fail(&mut pool, e))?;
            writeln!(stdout, "{} bytes copied", copied)?;
        }
        Command::Stress { seed, ops, json } => {
            let report = cmd_stress(&mut pool, seed, ops)?;
            if json {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                let stats = &report.stats;
                writeln!(stdout, "Seed: {}", report.seed)?;
                writeln!(stdout, "Operations: {}", report.ops)?;
                writeln!(stdout, "Rejected: {}", report.rejected)?;
                writeln!(stdout, "Allocations: {}", stats.allocations)?;
                writeln!(stdout, "Releases: {}", stats.releases)?;
                writeln!(stdout, "Refills: {}", stats.refills)?;
            }
        }
    }

    tracing::debug!(stats = ?pool.stats(), "done");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    run(args)
}
