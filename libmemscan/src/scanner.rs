//! The scan engine: drives regions -> blocks -> offsets -> predicates,
//! producing or narrowing a [`MatchArray`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::error::{Result, ScanError};
use crate::flags::{MatchFlag, MatchFlags};
use crate::io::{self, ProcessMemory};
use crate::predicate::{
    self, RegexCache, eval_bytes_at, eval_string_equal_at, eval_width_float, eval_width_int,
};
use crate::region::{Region, RegionLevel};
use crate::store::{MatchArray, OldValueAndMatchInfo, Swath};
use crate::value::{DataType, MatchKind, UserValue};

/// Default read-block size: a multiple of the host page size so a block
/// boundary lines up with how the kernel actually pages memory in.
fn default_block_size() -> usize {
    io::page_size() * 16
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub data_type: DataType,
    pub match_kind: MatchKind,
    pub reverse_endianness: bool,
    pub step: usize,
    pub block_size: usize,
    pub region_level: RegionLevel,
}

impl Default for ScanOptions {
    fn default() -> ScanOptions {
        ScanOptions {
            data_type: DataType::I32,
            match_kind: MatchKind::Any,
            reverse_endianness: false,
            step: 1,
            block_size: default_block_size(),
            region_level: RegionLevel::HeapStackExecutable,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub regions_visited: usize,
    pub bytes_scanned: usize,
    pub matches: usize,
}

/// A shared, checked-between-blocks-and-regions cooperative cancel flag.
/// There are no per-byte checkpoints; worst case cancel latency is one
/// block read plus one block's worth of predicate evaluation.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

fn evaluate(
    data_type: DataType,
    kind: MatchKind,
    old: Option<&[u8]>,
    current: &[u8],
    user: &UserValue,
    reverse_endianness: bool,
    regex_cache: &mut RegexCache,
) -> Result<predicate::EvalResult> {
    match data_type {
        DataType::String => match kind {
            MatchKind::Any => Ok(if current.is_empty() {
                predicate::EvalResult::none()
            } else {
                predicate::EvalResult {
                    matched_len: 1,
                    flags: MatchFlag::String.into(),
                }
            }),
            MatchKind::Regex => {
                let pattern = user.string.as_deref().unwrap_or("");
                regex_cache.eval_regex_at(pattern, current)
            }
            _ => Ok(eval_string_equal_at(current, user)),
        },
        DataType::ByteArray => Ok(eval_bytes_at(kind, current, user)),
        _ => Ok(predicate::eval_numeric_at(
            data_type,
            kind,
            old,
            current,
            user,
            reverse_endianness,
        )),
    }
}

/// Outcome of scanning one region: either bytes were read (possibly zero,
/// for a wholly unreadable region) or the region read itself hard-failed.
/// Per §7, a per-region I/O failure is absorbed — only propagated as a
/// command failure if *every* region fails.
enum RegionOutcome {
    Scanned(Swath, usize),
    ReadFailed(ScanError),
}

/// First-pass scan of one region: walks it block by block, building one
/// dense [`Swath`] spanning the whole region (the swath is emitted even
/// when empty, so region-count statistics stay stable across passes).
///
/// A read failure partway through the region (not a partial/short read,
/// which is always tolerated, but an actual I/O error) stops the walk at
/// that point and keeps whatever was scanned so far, matching a partial
/// read's own "process only what was returned" treatment; a failure on the
/// very first block is reported as [`RegionOutcome::ReadFailed`] so the
/// caller can distinguish "this region is wholly unreadable" from "this
/// region has zero matches".
fn first_pass_region(
    mem: &ProcessMemory,
    region: &Region,
    options: &ScanOptions,
    user: Option<&UserValue>,
    regex_cache: &mut RegexCache,
    cancel: &CancelToken,
) -> Result<RegionOutcome> {
    let user = user.cloned().unwrap_or_default();
    let mut swath = Swath::new(region.start, region.id);
    swath.data = vec![OldValueAndMatchInfo::empty(0); region.size];

    let mut buf = vec![0u8; options.block_size.max(1)];
    let mut bytes_scanned = 0usize;
    let mut offset = 0usize;

    while offset < region.size {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let want = options.block_size.min(region.size - offset);
        let bytes_read = match mem.read(region.start + offset, &mut buf[..want]) {
            Ok(n) => n,
            Err(e) if offset == 0 => return Ok(RegionOutcome::ReadFailed(e)),
            Err(_) => break,
        };
        bytes_scanned += bytes_read;

        for i in 0..bytes_read {
            swath.data[offset + i].old_byte = buf[i];
        }

        let mut i = 0;
        while i < bytes_read {
            let available = &buf[i..bytes_read];
            let result = evaluate(
                options.data_type,
                options.match_kind,
                None,
                available,
                &user,
                options.reverse_endianness,
                regex_cache,
            )?;
            if result.is_match() {
                swath.data[offset + i].match_info |= result.flags;
            }
            i += options.step.max(1);
        }

        offset += options.block_size.max(1);
    }

    Ok(RegionOutcome::Scanned(swath, bytes_scanned))
}

/// `regex_cache` is only consulted on the sequential path: the cache is
/// owned by the session and meant for single-threaded (REPL-thread) access
/// only (§5), so the parallel path gives each worker its own ephemeral
/// cache instead of sharing one behind a lock.
fn run_first_pass(
    mem: &ProcessMemory,
    regions: &[Region],
    options: &ScanOptions,
    user: Option<&UserValue>,
    cancel: &CancelToken,
    mode: ExecutionMode,
    regex_cache: &mut RegexCache,
) -> Result<(MatchArray, ScanStats)> {
    let outcomes: Vec<RegionOutcome> = match mode {
        ExecutionMode::Sequential => {
            let mut out = Vec::with_capacity(regions.len());
            for region in regions {
                if cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                out.push(first_pass_region(mem, region, options, user, regex_cache, cancel)?);
            }
            out
        }
        ExecutionMode::Parallel => regions
            .par_iter()
            .map(|region| {
                if cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                let mut cache = RegexCache::new();
                first_pass_region(mem, region, options, user, &mut cache, cancel)
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let region_count = outcomes.len();
    let mut array = MatchArray::new();
    let mut stats = ScanStats::default();
    let mut first_failure = None;
    let mut failures = 0usize;

    for outcome in outcomes {
        stats.regions_visited += 1;
        match outcome {
            RegionOutcome::Scanned(swath, bytes) => {
                stats.bytes_scanned += bytes;
                stats.matches += swath.count();
                array.push_swath(swath);
            }
            RegionOutcome::ReadFailed(e) => {
                failures += 1;
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
    }

    // A per-region read failure is absorbed; only a wholly-unreadable
    // target (every region failed) is a hard failure.
    if region_count > 0 && failures == region_count {
        return Err(first_failure.unwrap());
    }
    Ok((array, stats))
}

pub fn first_pass_sequential(
    mem: &ProcessMemory,
    regions: &[Region],
    options: &ScanOptions,
    user: Option<&UserValue>,
    cancel: &CancelToken,
    regex_cache: &mut RegexCache,
) -> Result<(MatchArray, ScanStats)> {
    run_first_pass(
        mem,
        regions,
        options,
        user,
        cancel,
        ExecutionMode::Sequential,
        regex_cache,
    )
}

pub fn first_pass_parallel(
    mem: &ProcessMemory,
    regions: &[Region],
    options: &ScanOptions,
    user: Option<&UserValue>,
    cancel: &CancelToken,
) -> Result<(MatchArray, ScanStats)> {
    let mut unused = RegexCache::new();
    run_first_pass(
        mem,
        regions,
        options,
        user,
        cancel,
        ExecutionMode::Parallel,
        &mut unused,
    )
}

/// Narrow one swath in place. A width bit only survives if it both belongs
/// to the current scan's data type family and its predicate still holds;
/// a width bit left over from a broader aggregate scan (e.g. a stray `B8`
/// after narrowing with a concrete `I32`) is dropped rather than guessed
/// at, since the new scan's data type no longer asks for it.
fn narrow_swath(
    mem: &ProcessMemory,
    swath: &Swath,
    options: &ScanOptions,
    user: &UserValue,
    regex_cache: &mut RegexCache,
) -> Result<Swath> {
    let mut buf = vec![0u8; swath.data.len()];
    let bytes_read = mem.read(swath.first_byte_in_child, &mut buf)?;

    let mut out = swath.clone();
    let contributors = predicate::contributors_for(options.data_type);

    for i in 0..swath.data.len() {
        if i >= bytes_read {
            out.data[i].match_info = MatchFlags::empty();
            continue;
        }
        // Refresh every read byte's baseline, not just surviving match
        // starts, so a later narrowing pass reconstructing a multi-byte old
        // value from `width` consecutive cells never reads a stale trailing
        // byte left over from before this pass.
        out.data[i].old_byte = buf[i];
        if swath.data[i].is_empty() {
            continue;
        }

        let prior = swath.data[i].match_info;
        let mut kept = MatchFlags::empty();

        match options.data_type {
            DataType::String => {
                if prior.contains(MatchFlag::String) {
                    let current = &buf[i..bytes_read];
                    let result = match options.match_kind {
                        MatchKind::Regex => {
                            let pattern = user.string.as_deref().unwrap_or("");
                            regex_cache.eval_regex_at(pattern, current)?
                        }
                        _ => eval_string_equal_at(current, user),
                    };
                    if result.is_match() {
                        kept |= MatchFlag::String;
                    }
                }
            }
            DataType::ByteArray => {
                if prior.contains(MatchFlag::ByteArray) {
                    let current = &buf[i..bytes_read];
                    let result = eval_bytes_at(options.match_kind, current, user);
                    if result.is_match() {
                        kept |= MatchFlag::ByteArray;
                    }
                }
            }
            _ => {
                for (flag, numeric) in &contributors {
                    if !prior.contains(*flag) {
                        continue;
                    }
                    let width = flag.width_bytes();
                    if i + width > bytes_read {
                        continue;
                    }
                    let old_bytes: Vec<u8> =
                        (0..width).map(|k| swath.data[i + k].old_byte).collect();
                    let current_bytes = &buf[i..i + width];
                    let succeeded = match numeric {
                        predicate::Numeric::Int => eval_width_int(
                            width,
                            options.match_kind,
                            Some(&old_bytes),
                            current_bytes,
                            user,
                            options.reverse_endianness,
                        ),
                        predicate::Numeric::Float => eval_width_float(
                            width,
                            options.match_kind,
                            Some(&old_bytes),
                            current_bytes,
                            user,
                            options.reverse_endianness,
                        ),
                    };
                    if succeeded {
                        kept |= *flag;
                    }
                }
            }
        }

        out.data[i].match_info = kept;
    }

    Ok(out)
}

fn run_narrow(
    mem: &ProcessMemory,
    array: &MatchArray,
    options: &ScanOptions,
    user: &UserValue,
    cancel: &CancelToken,
    mode: ExecutionMode,
    regex_cache: &mut RegexCache,
) -> Result<(MatchArray, ScanStats)> {
    let narrowed: Vec<Swath> = match mode {
        ExecutionMode::Sequential => {
            let mut out = Vec::with_capacity(array.swaths.len());
            for swath in &array.swaths {
                if cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                out.push(narrow_swath(mem, swath, options, user, regex_cache)?);
            }
            out
        }
        ExecutionMode::Parallel => array
            .swaths
            .par_iter()
            .map(|swath| {
                if cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                let mut cache = RegexCache::new();
                narrow_swath(mem, swath, options, user, &mut cache)
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let mut stats = ScanStats::default();
    let mut out_array = MatchArray::new();
    for swath in narrowed {
        stats.regions_visited += 1;
        stats.bytes_scanned += swath.data.len();
        stats.matches += swath.count();
        out_array.push_swath(swath);
    }
    out_array.drop_empty_swaths();
    Ok((out_array, stats))
}

pub fn narrow_sequential(
    mem: &ProcessMemory,
    array: &MatchArray,
    options: &ScanOptions,
    user: &UserValue,
    cancel: &CancelToken,
    regex_cache: &mut RegexCache,
) -> Result<(MatchArray, ScanStats)> {
    run_narrow(
        mem,
        array,
        options,
        user,
        cancel,
        ExecutionMode::Sequential,
        regex_cache,
    )
}

pub fn narrow_parallel(
    mem: &ProcessMemory,
    array: &MatchArray,
    options: &ScanOptions,
    user: &UserValue,
    cancel: &CancelToken,
) -> Result<(MatchArray, ScanStats)> {
    let mut unused = RegexCache::new();
    run_narrow(
        mem,
        array,
        options,
        user,
        cancel,
        ExecutionMode::Parallel,
        &mut unused,
    )
}

/// `matchKind` values that need a prior old-byte baseline to mean anything.
/// A first scan requesting one of these gets an implicit `Any` pass first.
pub fn needs_old_value(kind: MatchKind) -> bool {
    matches!(
        kind,
        MatchKind::Changed
            | MatchKind::NotChanged
            | MatchKind::Increased
            | MatchKind::Decreased
            | MatchKind::IncreasedBy
            | MatchKind::DecreasedBy
    )
}

/// Run a scan against the current [`MatchArray`] state: narrows if a
/// prior pass exists, otherwise runs a first pass. When the requested
/// match kind needs an old-value baseline but there is no prior pass,
/// an internal `Any` first pass seeds `old_byte` before narrowing with
/// the real match kind, so a single `scan()` call behaves identically
/// to an explicit `Any` scan followed by a narrowing scan.
#[allow(clippy::too_many_arguments)]
pub fn scan_or_narrow(
    mem: &ProcessMemory,
    regions: &[Region],
    previous: Option<&MatchArray>,
    options: &ScanOptions,
    user: Option<&UserValue>,
    cancel: &CancelToken,
    mode: ExecutionMode,
    regex_cache: &mut RegexCache,
) -> Result<(MatchArray, ScanStats)> {
    match previous {
        None if needs_old_value(options.match_kind) => {
            let seed_options = ScanOptions {
                match_kind: MatchKind::Any,
                ..options.clone()
            };
            let (seeded, _) = match mode {
                ExecutionMode::Sequential => {
                    first_pass_sequential(mem, regions, &seed_options, user, cancel, regex_cache)?
                }
                ExecutionMode::Parallel => {
                    first_pass_parallel(mem, regions, &seed_options, user, cancel)?
                }
            };
            let user = user.cloned().unwrap_or_default();
            match mode {
                ExecutionMode::Sequential => {
                    narrow_sequential(mem, &seeded, options, &user, cancel, regex_cache)
                }
                ExecutionMode::Parallel => narrow_parallel(mem, &seeded, options, &user, cancel),
            }
        }
        None => match mode {
            ExecutionMode::Sequential => {
                first_pass_sequential(mem, regions, options, user, cancel, regex_cache)
            }
            ExecutionMode::Parallel => first_pass_parallel(mem, regions, options, user, cancel),
        },
        Some(previous) => {
            let user = user.cloned().unwrap_or_default();
            match mode {
                ExecutionMode::Sequential => {
                    narrow_sequential(mem, previous, options, &user, cancel, regex_cache)
                }
                ExecutionMode::Parallel => narrow_parallel(mem, previous, options, &user, cancel),
            }
        }
    }
}
