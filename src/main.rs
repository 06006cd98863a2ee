#[cfg(not(target_os = "linux"))]
compile_error!("memscan currently only supports Linux targets.");

mod cli;
mod repl;

use clap::Parser;
use cli::Cli;
use repl::Repl;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut repl = Repl::new(!cli.no_color, cli.exit_on_error);

    if let Some(pid) = cli.pid {
        repl.handle_line(&format!("pid {pid}"))?;
    }

    let code = repl.run(cli.init.as_deref())?;
    std::process::exit(code);
}
