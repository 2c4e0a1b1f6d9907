//! # tc-build
//!
//! Build an LLVM/binutils cross toolchain and test it by building Linux
//! kernels for several architectures.
//!
//! ## Usage
//!
//! ```bash
//! tc-build toolchain -t "X86;ARM"       # Fetch, build and install LLVM
//! tc-build toolchain --test-kernels     # ... then build defconfig kernels with it
//! tc-build toolchain --use-good-revision # Pinned LLVM revision instead of main
//! tc-build binutils -t arm aarch64      # Build GNU binutils for kernel targets
//! tc-build kernel -t arm --toolchain install
//! tc-build resolve --clang-version 15.0.3 -t all --json
//! tc-build deps                         # Pre-flight dependency check
//! tc-build sources                      # Show cache status
//! tc-build clean --sources              # Remove build folders and sources
//! ```
//!
//! ## Layout
//!
//! Run from a work folder: `llvm-project/` and `src/` hold sources,
//! `build/<component>/<target>/` build files and `install/` the result.
//!
//! Exit codes: 0 on success, 33 for invalid parameters, a failing child's
//! exit code, otherwise 1.

use clap::Parser;
use std::env;
use std::process::ExitCode;

mod builder;

use builder::{error, exec::Exec, logger, BuildCommands};

#[derive(Parser)]
#[command(name = "tc-build", about = "LLVM and binutils toolchain builder", version)]
struct Cli {
    /// Print debug output and every command
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Print every command before running it
    #[arg(long, global = true)]
    show_commands: bool,
    /// Print the commands that would change anything instead of running them
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: BuildCommands,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut exec = Exec::new(cli.show_commands || cli.verbose, cli.dry_run);

    match cli.command {
        BuildCommands::Toolchain(args) => builder::toolchain(&mut exec, &args),
        BuildCommands::Binutils(args) => builder::binutils(&mut exec, &args),
        BuildCommands::Kernel(args) => builder::kernel(&mut exec, &args),
        BuildCommands::Resolve(args) => builder::resolve(&args),
        BuildCommands::Deps => builder::check_deps(&mut exec),
        BuildCommands::Sources => builder::sources(),
        BuildCommands::Clean(args) => builder::clean(&exec, &args),
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(error::EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let env_level = env::var(logger::LOG_ENV).ok();
    logger::init(logger::level(cli.verbose, env_level.as_deref()));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            logger::flush();
            ExitCode::from(error::exit_code(&err))
        }
    }
}
