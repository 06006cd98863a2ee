//! Interactive REPL driving a [`libmemscan::ScanSession`].

use anyhow::{Result, anyhow, bail};
use libmemscan::format::MatchRecord;
use libmemscan::region::RegionLevel;
use libmemscan::scanner::{CancelToken, ExecutionMode};
use libmemscan::value::{DataType, MatchKind, UserValue};
use libmemscan::{ScanSession, liveness::Liveness};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::time::Duration;

pub struct Repl {
    session: ScanSession,
    color: bool,
    debug: bool,
    exit_on_error: bool,
    cancel: CancelToken,
}

impl Repl {
    pub fn new(color: bool, exit_on_error: bool) -> Repl {
        Repl {
            session: ScanSession::new(),
            color,
            debug: false,
            exit_on_error,
            cancel: CancelToken::new(),
        }
    }

    fn info(&self, msg: impl std::fmt::Display) {
        if self.color {
            println!("{} {}", "[info]".bright_cyan(), msg);
        } else {
            println!("[info] {msg}");
        }
    }

    fn done(&self, msg: impl std::fmt::Display) {
        if self.color {
            println!("{} {}", "[done]".bright_green(), msg);
        } else {
            println!("[done] {msg}");
        }
    }

    fn error(&self, msg: impl std::fmt::Display) {
        if self.color {
            eprintln!("{} {}", "[error]".bright_red(), msg);
        } else {
            eprintln!("[error] {msg}");
        }
    }

    /// Run one command line. Returns `Ok(false)` when the REPL should exit.
    pub fn handle_line(&mut self, line: &str) -> Result<bool> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = parts.first() else {
            return Ok(true);
        };
        let args = &parts[1..];

        match cmd {
            "pid" => self.cmd_pid(args)?,
            "reset" => {
                self.session.reset();
                self.done("match set cleared");
            }
            "count" => self.done(format!("{} matches", self.session.count())),
            "snapshot" => self.cmd_snapshot(args)?,
            "scan" => self.cmd_scan(args)?,
            "list" => self.cmd_list(args)?,
            "write" => self.cmd_write(args)?,
            "watch" => self.cmd_watch(args)?,
            "set" => self.cmd_set(args)?,
            "help" => self.cmd_help(args),
            "quit" | "exit" | "q" => return Ok(false),
            other => bail!("unknown command '{other}', try 'help'"),
        }
        Ok(true)
    }

    pub fn run(&mut self, initial: Option<&str>) -> Result<i32> {
        if let Some(init) = initial {
            if let Err(e) = self.handle_line(init) {
                self.error(&e);
                if self.exit_on_error {
                    return Ok(1);
                }
            }
        }

        if self.color {
            println!("{}", "memscan interactive session".bright_yellow().bold());
        } else {
            println!("memscan interactive session");
        }
        println!("Type 'help' for available commands.");

        loop {
            print!("{} ", if self.color { ">".bright_yellow().bold().to_string() } else { ">".to_string() });
            io::stdout().flush()?;

            let mut input = String::new();
            if io::stdin().read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match self.handle_line(input) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => self.error(&e),
            }
        }
        Ok(0)
    }

    fn cmd_pid(&mut self, args: &[&str]) -> Result<()> {
        let pid: i32 = args
            .first()
            .ok_or_else(|| anyhow!("usage: pid <n>"))?
            .parse()?;
        self.session.set_pid(pid);
        self.done(format!("target set to pid {pid}"));
        match self.session.liveness()? {
            Liveness::Running => {}
            Liveness::Zombie => self.error("target pid is a zombie"),
            Liveness::Dead => self.error("target pid does not exist"),
            Liveness::Error => self.error("could not query target pid's liveness"),
        }
        Ok(())
    }

    fn cmd_snapshot(&mut self, args: &[&str]) -> Result<()> {
        let data_type = args
            .first()
            .map(|t| parse_data_type(t))
            .transpose()?
            .unwrap_or(DataType::I32);
        let stats = self.session.snapshot(data_type, &self.cancel)?;
        self.done(format!(
            "snapshot: {} regions visited, {} bytes scanned, {} matches",
            stats.regions_visited, stats.bytes_scanned, stats.matches
        ));
        Ok(())
    }

    fn cmd_scan(&mut self, args: &[&str]) -> Result<()> {
        if args.len() < 2 {
            bail!("usage: scan <dataType> <matchKind> [value [high]]");
        }
        let data_type = parse_data_type(args[0])?;
        let match_kind = parse_match_kind(args[1])?;
        let user = parse_user_value(match_kind, data_type, &args[2..])?;

        let stats = self
            .session
            .scan(data_type, match_kind, user.as_ref(), &self.cancel)?;
        self.done(format!(
            "scan: {} regions visited, {} bytes scanned, {} matches",
            stats.regions_visited, stats.bytes_scanned, stats.matches
        ));
        Ok(())
    }

    fn cmd_list(&mut self, args: &[&str]) -> Result<()> {
        let limit: usize = args.first().map(|s| s.parse()).transpose()?.unwrap_or(20);
        let records = self.session.list(limit)?;
        if records.is_empty() {
            self.info("no matches");
            return Ok(());
        }
        for record in &records {
            println!("{}", format_record(record, self.color));
        }
        Ok(())
    }

    fn cmd_write(&mut self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            bail!("usage: write <value> [index]");
        }
        let value = args[0];
        let index: Option<usize> = args.get(1).map(|s| s.parse()).transpose()?;
        let user = UserValue::parse_integer(value, DataType::I32)
            .or_else(|_| UserValue::parse_float(value, DataType::F64))
            .unwrap_or_else(|_| UserValue::from_string(value));
        let (stats, first_error) = self.session.write(&user, index)?;
        self.done(format!(
            "write: {}/{} succeeded",
            stats.succeeded, stats.attempted
        ));
        if let Some(e) = first_error {
            self.error(format!("first write failure: {e}"));
        }
        Ok(())
    }

    fn cmd_watch(&mut self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            bail!("usage: watch <addr> [intervalMs] [width]");
        }
        let addr = parse_address(args[0])?;
        let interval_ms: u64 = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(500);
        let width: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(4);

        self.info(format!(
            "watching {addr:#x} every {interval_ms}ms; press enter to stop"
        ));

        let cancel = CancelToken::new();
        let stop_signal = cancel.clone();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().read_line(&mut line);
            stop_signal.cancel();
        });

        let color = self.color;
        let result = self.session.watch(
            addr,
            width,
            Duration::from_millis(interval_ms),
            &cancel,
            |old, new| {
                let line = format!(
                    "  {:#x} {} -> {}",
                    addr,
                    libmemscan::format::to_hex(old),
                    libmemscan::format::to_hex(new)
                );
                if color {
                    println!("{}", line.bright_yellow());
                } else {
                    println!("{line}");
                }
            },
        );
        cancel.cancel();
        result?;
        self.done("watch stopped");
        Ok(())
    }

    fn cmd_set(&mut self, args: &[&str]) -> Result<()> {
        if args.len() < 2 {
            bail!(
                "usage: set pid|debug|color|regionLevel|autoBaseline|exitOnError|mode|endian|init <value>"
            );
        }
        match args[0] {
            "pid" => self.cmd_pid(&args[1..])?,
            "debug" => self.debug = parse_bool(args[1])?,
            "color" => self.color = parse_bool(args[1])?,
            "exitOnError" => self.exit_on_error = parse_bool(args[1])?,
            "autoBaseline" => self.session.set_auto_baseline(parse_bool(args[1])?),
            "endian" => self.session.set_reverse_endianness(parse_bool(args[1])?),
            "regionLevel" => self.session.set_region_level(parse_region_level(args[1])?),
            "mode" => {
                let mode = match args[1] {
                    "sequential" => ExecutionMode::Sequential,
                    "parallel" => ExecutionMode::Parallel,
                    other => bail!("unknown execution mode '{other}'"),
                };
                self.session.set_execution_mode(mode);
            }
            "init" => {
                let command = args[1..].join(" ");
                self.handle_line(&command)?;
                return Ok(());
            }
            other => bail!("unknown setting '{other}'"),
        }
        self.done("updated");
        Ok(())
    }

    fn cmd_help(&self, args: &[&str]) {
        if let Some(&topic) = args.first() {
            println!("no detailed help for '{topic}' yet; commands are listed below.");
        }
        println!("{}", if self.color { "Available commands:".bright_yellow().bold().to_string() } else { "Available commands:".to_string() });
        println!("  pid <n>                          - set target process, clears matches");
        println!("  reset                            - clear matches");
        println!("  count                            - print match count");
        println!("  snapshot [dataType]               - run a first-pass Any scan");
        println!("  scan <dataType> <matchKind> [v]   - first scan or narrowing scan");
        println!("  list [limit]                      - show matches");
        println!("  write <value> [index]             - write to one or all matches");
        println!("  watch <addr> [intervalMs] [width]  - monitor an address, enter to stop");
        println!("  set <key> <value>                  - session configuration");
        println!(
            "    keys: pid, debug, color, regionLevel, autoBaseline, exitOnError, mode, endian, init"
        );
        println!("  help [cmd], quit                   - this message / exit");
    }
}

fn format_record(record: &MatchRecord, color: bool) -> String {
    let current = record.current_hex.as_deref().unwrap_or("?");
    if color {
        format!(
            "  {} {:#x} {} old={} current={}",
            record.index.to_string().bright_black(),
            record.address,
            record.region_label.bright_black(),
            record.old_hex.bright_yellow(),
            current.bright_green(),
        )
    } else {
        format!(
            "  {} {:#x} {} old={} current={}",
            record.index, record.address, record.region_label, record.old_hex, current
        )
    }
}

fn parse_data_type(s: &str) -> Result<DataType> {
    DataType::from_token(s).ok_or_else(|| anyhow!("unknown data type '{s}'"))
}

fn parse_match_kind(s: &str) -> Result<MatchKind> {
    MatchKind::from_token(s).ok_or_else(|| anyhow!("unknown match kind '{s}'"))
}

fn parse_user_value(kind: MatchKind, data_type: DataType, operands: &[&str]) -> Result<Option<UserValue>> {
    if kind.operand_count() == 0 {
        return Ok(None);
    }
    match data_type {
        DataType::String if kind == MatchKind::Regex => {
            let pattern = operands.first().ok_or_else(|| anyhow!("regex pattern required"))?;
            Ok(Some(UserValue::from_string(*pattern)))
        }
        DataType::String => {
            let s = operands.first().ok_or_else(|| anyhow!("string value required"))?;
            Ok(Some(UserValue::from_string(*s)))
        }
        DataType::ByteArray => {
            let bytes = operands.first().ok_or_else(|| anyhow!("byte pattern required"))?;
            let mask = operands.get(1).copied();
            Ok(Some(UserValue::parse_bytes(bytes, mask)?))
        }
        DataType::F32 | DataType::F64 => {
            if kind.operand_count() == 2 {
                let (lo, hi) = (
                    operands.first().ok_or_else(|| anyhow!("low bound required"))?,
                    operands.get(1).ok_or_else(|| anyhow!("high bound required"))?,
                );
                Ok(Some(UserValue::parse_float_range(lo, hi, data_type)?))
            } else {
                let v = operands.first().ok_or_else(|| anyhow!("value required"))?;
                Ok(Some(UserValue::parse_float(v, data_type)?))
            }
        }
        _ => {
            if kind.operand_count() == 2 {
                let (lo, hi) = (
                    operands.first().ok_or_else(|| anyhow!("low bound required"))?,
                    operands.get(1).ok_or_else(|| anyhow!("high bound required"))?,
                );
                Ok(Some(UserValue::parse_integer_range(lo, hi, data_type)?))
            } else {
                let v = operands.first().ok_or_else(|| anyhow!("value required"))?;
                Ok(Some(UserValue::parse_integer(v, data_type)?))
            }
        }
    }
}

fn parse_address(s: &str) -> Result<usize> {
    if let Some(hex) = s.strip_prefix("0x") {
        Ok(usize::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse()?)
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        other => bail!("not a boolean: '{other}'"),
    }
}

fn parse_region_level(s: &str) -> Result<RegionLevel> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "all" => RegionLevel::All,
        "allrw" => RegionLevel::AllRw,
        "heapstackexecutable" | "hse" => RegionLevel::HeapStackExecutable,
        "heapstackexecutablebss" | "hseb" => RegionLevel::HeapStackExecutableBss,
        other => bail!("unknown region level '{other}'"),
    })
}
