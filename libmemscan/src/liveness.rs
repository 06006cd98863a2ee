//! Process-liveness classification via `/proc/<pid>/status`.

use std::fs::File;
use std::io::{BufRead, BufReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Running,
    Zombie,
    Dead,
    Error,
}

/// Classify `pid` by reading only the `State:` line of its status file.
/// A missing status file means the process is gone; any other I/O
/// failure (commonly a permission error on another user's process) is
/// reported as `Error` rather than guessed at.
pub fn check(pid: i32) -> Liveness {
    let path = format!("/proc/{pid}/status");
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Liveness::Dead,
        Err(_) => return Liveness::Error,
    };

    let reader = BufReader::new(file);
    for line in reader.lines() {
        let Ok(line) = line else {
            return Liveness::Error;
        };
        if let Some(state) = line.strip_prefix("State:") {
            return classify_state(state.trim());
        }
    }
    Liveness::Error
}

fn classify_state(state: &str) -> Liveness {
    match state.chars().next() {
        Some('Z') => Liveness::Zombie,
        Some(_) => Liveness::Running,
        None => Liveness::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_running() {
        let pid = std::process::id() as i32;
        assert_eq!(check(pid), Liveness::Running);
    }

    #[test]
    fn nonexistent_pid_is_dead() {
        assert_eq!(check(i32::MAX), Liveness::Dead);
    }

    #[test]
    fn state_line_parses_running_and_zombie() {
        assert_eq!(classify_state("R (running)"), Liveness::Running);
        assert_eq!(classify_state("S (sleeping)"), Liveness::Running);
        assert_eq!(classify_state("Z (zombie)"), Liveness::Zombie);
        assert_eq!(classify_state("T (stopped)"), Liveness::Running);
    }
}
