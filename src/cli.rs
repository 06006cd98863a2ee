use clap::{Parser, builder::styling::AnsiColor};

/// memscan – inspect another Linux process's virtual memory.
#[derive(Parser, Debug)]
#[command(
    name = "memscan",
    bin_name = "memscan",
    about = "An interactive memory scanner for Linux processes",
    version,
    styles = clap::builder::Styles::styled()
        .header(AnsiColor::BrightYellow.on_default())
        .usage(AnsiColor::BrightYellow.on_default())
        .literal(AnsiColor::BrightGreen.on_default())
        .placeholder(AnsiColor::BrightCyan.on_default())
)]
pub struct Cli {
    /// Target pid to attach to at startup
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// An initial command to run before entering the REPL (e.g. "snapshot int32")
    #[arg(short, long)]
    pub init: Option<String>,

    /// Exit with status 1 if the initial command fails
    #[arg(long)]
    pub exit_on_error: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
