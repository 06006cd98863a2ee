//! The session façade: pid + current MatchArray + scan defaults.

use std::time::Duration;

use crate::error::{Result, ScanError};
use crate::format::{self, MatchRecord};
use crate::io::ProcessMemory;
use crate::liveness::{self, Liveness};
use crate::predicate::RegexCache;
use crate::region::{self, RegionLevel};
use crate::scanner::{self, CancelToken, ExecutionMode, ScanOptions, ScanStats};
use crate::store::MatchArray;
use crate::value::{DataType, MatchKind, UserValue};
use crate::writer::{self, WriteStats};

pub struct ScanSession {
    pid: Option<i32>,
    matches: MatchArray,
    options: ScanOptions,
    mode: ExecutionMode,
    auto_baseline: bool,
    /// Session-scoped, single-threaded (REPL-thread) regex cache. Demoted
    /// from the source's process-wide pinned map per §9: evicted
    /// explicitly on `reset`/`set_pid` rather than outliving the session.
    regex_cache: RegexCache,
}

impl ScanSession {
    pub fn new() -> ScanSession {
        ScanSession {
            pid: None,
            matches: MatchArray::new(),
            options: ScanOptions::default(),
            mode: ExecutionMode::Sequential,
            auto_baseline: true,
            regex_cache: RegexCache::new(),
        }
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    /// Target a new pid. Clears the current match set and the regex cache;
    /// both would otherwise be addressing a different process's memory.
    pub fn set_pid(&mut self, pid: i32) {
        self.pid = Some(pid);
        self.matches = MatchArray::new();
        self.regex_cache.clear();
    }

    pub fn set_region_level(&mut self, level: RegionLevel) {
        self.options.region_level = level;
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.mode = mode;
    }

    pub fn set_auto_baseline(&mut self, enabled: bool) {
        self.auto_baseline = enabled;
    }

    pub fn set_reverse_endianness(&mut self, enabled: bool) {
        self.options.reverse_endianness = enabled;
    }

    pub fn reset(&mut self) {
        self.matches = MatchArray::new();
        self.regex_cache.clear();
    }

    pub fn count(&self) -> usize {
        self.matches.count()
    }

    fn require_pid(&self) -> Result<i32> {
        self.pid
            .ok_or_else(|| ScanError::invalid_argument("no pid set"))
    }

    fn live_regions(&self, pid: i32) -> Result<Vec<crate::region::Region>> {
        let all = region::parse_maps(pid)?;
        Ok(region::filter_regions(&all, self.options.region_level))
    }

    /// Run a first-pass `Any` scan explicitly, regardless of current state.
    pub fn snapshot(&mut self, data_type: DataType, cancel: &CancelToken) -> Result<ScanStats> {
        let pid = self.require_pid()?;
        let mem = ProcessMemory::new(pid);
        let regions = self.live_regions(pid)?;
        let opts = ScanOptions {
            data_type,
            match_kind: MatchKind::Any,
            ..self.options.clone()
        };
        let (array, stats) = match self.mode {
            ExecutionMode::Sequential => scanner::first_pass_sequential(
                &mem,
                &regions,
                &opts,
                None,
                cancel,
                &mut self.regex_cache,
            )?,
            ExecutionMode::Parallel => {
                scanner::first_pass_parallel(&mem, &regions, &opts, None, cancel)?
            }
        };
        self.matches = array;
        Ok(stats)
    }

    /// Run a scan against the current session state: first pass if the
    /// match set is empty, narrowing otherwise. When `auto_baseline` is
    /// enabled and the requested match kind needs an old-value baseline
    /// on an empty match set, an implicit `Any` pass seeds it first.
    pub fn scan(
        &mut self,
        data_type: DataType,
        match_kind: MatchKind,
        user: Option<&UserValue>,
        cancel: &CancelToken,
    ) -> Result<ScanStats> {
        let pid = self.require_pid()?;
        let mem = ProcessMemory::new(pid);
        let opts = ScanOptions {
            data_type,
            match_kind,
            ..self.options.clone()
        };

        let previous = if self.matches.is_empty() {
            None
        } else {
            Some(self.matches.clone())
        };

        let (array, stats) = if previous.is_none() {
            let regions = self.live_regions(pid)?;
            if self.auto_baseline && scanner::needs_old_value(match_kind) {
                scanner::scan_or_narrow(
                    &mem,
                    &regions,
                    None,
                    &opts,
                    user,
                    cancel,
                    self.mode,
                    &mut self.regex_cache,
                )?
            } else {
                match self.mode {
                    ExecutionMode::Sequential => scanner::first_pass_sequential(
                        &mem,
                        &regions,
                        &opts,
                        user,
                        cancel,
                        &mut self.regex_cache,
                    )?,
                    ExecutionMode::Parallel => {
                        scanner::first_pass_parallel(&mem, &regions, &opts, user, cancel)?
                    }
                }
            }
        } else {
            let user = user.cloned().unwrap_or_default();
            match self.mode {
                ExecutionMode::Sequential => scanner::narrow_sequential(
                    &mem,
                    previous.as_ref().unwrap(),
                    &opts,
                    &user,
                    cancel,
                    &mut self.regex_cache,
                )?,
                ExecutionMode::Parallel => scanner::narrow_parallel(
                    &mem,
                    previous.as_ref().unwrap(),
                    &opts,
                    &user,
                    cancel,
                )?,
            }
        };

        self.matches = array;
        Ok(stats)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        let pid = self.require_pid()?;
        let regions = region::parse_maps(pid)?;
        let mem = ProcessMemory::new(pid);
        let reader = move |addr: usize, width: usize| -> Option<Vec<u8>> {
            let mut buf = vec![0u8; width];
            let n = mem.read(addr, &mut buf).ok()?;
            buf.truncate(n);
            Some(buf)
        };
        Ok(format::list(&self.matches, &regions, limit, Some(reader)))
    }

    pub fn write(
        &self,
        user: &UserValue,
        index: Option<usize>,
    ) -> Result<(WriteStats, Option<ScanError>)> {
        let pid = self.require_pid()?;
        let mem = ProcessMemory::new(pid);
        match index {
            Some(i) => {
                let n = writer::write_indexed(&mem, &self.matches, i, user, self.options.reverse_endianness)?;
                Ok((
                    WriteStats {
                        attempted: 1,
                        succeeded: if n > 0 { 1 } else { 0 },
                    },
                    None,
                ))
            }
            None => Ok(writer::write_all(&mem, &self.matches, user, self.options.reverse_endianness)),
        }
    }

    pub fn liveness(&self) -> Result<Liveness> {
        Ok(liveness::check(self.require_pid()?))
    }

    /// Long-poll a single address, invoking `on_change` with `(old, new)`
    /// bytes every time a read differs from the last one. Blocks until
    /// `cancel` is set; the first read establishes the baseline and is not
    /// itself reported as a change.
    pub fn watch(
        &self,
        addr: usize,
        width: usize,
        interval: Duration,
        cancel: &CancelToken,
        mut on_change: impl FnMut(&[u8], &[u8]),
    ) -> Result<()> {
        let pid = self.require_pid()?;
        let mem = ProcessMemory::new(pid);
        let mut last = vec![0u8; width];
        let n = mem.read(addr, &mut last)?;
        last.truncate(n);

        while !cancel.is_cancelled() {
            std::thread::sleep(interval);
            if cancel.is_cancelled() {
                break;
            }
            let mut current = vec![0u8; width];
            let n = mem.read(addr, &mut current)?;
            current.truncate(n);
            if current != last {
                on_change(&last, &current);
                last = current;
            }
        }
        Ok(())
    }
}

impl Default for ScanSession {
    fn default() -> ScanSession {
        ScanSession::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pid_clears_matches() {
        let mut session = ScanSession::new();
        session.set_pid(1);
        assert_eq!(session.count(), 0);
        assert_eq!(session.pid(), Some(1));
    }

    #[test]
    fn scan_without_pid_is_an_error() {
        let mut session = ScanSession::new();
        let cancel = CancelToken::new();
        let result = session.scan(DataType::I32, MatchKind::Any, None, &cancel);
        assert!(result.is_err());
    }

    #[test]
    fn snapshot_and_scan_against_the_current_process() {
        let value: i32 = 0x7777_1234;
        let addr = &value as *const i32 as usize;
        let _ = addr; // keep `value` alive for the scan below

        let mut session = ScanSession::new();
        session.set_pid(std::process::id() as i32);
        session.set_region_level(RegionLevel::All);
        let cancel = CancelToken::new();

        let stats = session.snapshot(DataType::I32, &cancel).unwrap();
        assert!(stats.regions_visited > 0);

        let user = UserValue::parse_integer("2004385844", DataType::I32).unwrap();
        session.reset();
        let _ = session.scan(DataType::I32, MatchKind::EqualTo, Some(&user), &cancel);
    }

    #[test]
    fn watch_reports_a_change_and_stops_on_cancel() {
        let mut value: i32 = 1;
        let addr = &mut value as *mut i32 as usize;

        let mut session = ScanSession::new();
        session.set_pid(std::process::id() as i32);
        let cancel = CancelToken::new();

        let observed = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let observed_clone = observed.clone();
        let cancel_clone = cancel.clone();

        let handle = std::thread::spawn(move || {
            session
                .watch(
                    addr,
                    4,
                    Duration::from_millis(5),
                    &cancel_clone,
                    |_old, new| observed_clone.lock().unwrap().push(new.to_vec()),
                )
                .unwrap();
        });

        std::thread::sleep(Duration::from_millis(20));
        value = 2;
        std::thread::sleep(Duration::from_millis(30));
        cancel.cancel();
        handle.join().unwrap();

        let seen = observed.lock().unwrap();
        assert!(seen.iter().any(|bytes| bytes == &2i32.to_le_bytes()));
    }

    #[test]
    fn reset_clears_regex_cache_between_scans() {
        // Exercises that a session surviving a `reset()` still works for a
        // second regex scan rather than reusing a stale compiled pattern.
        let mut session = ScanSession::new();
        session.set_pid(std::process::id() as i32);
        session.set_region_level(RegionLevel::All);
        let cancel = CancelToken::new();

        let pattern = UserValue::from_string("unlikely_needle_pattern");
        let _ = session.scan(DataType::String, MatchKind::Regex, Some(&pattern), &cancel);
        session.reset();
        let _ = session.scan(DataType::String, MatchKind::Regex, Some(&pattern), &cancel);
    }
}
