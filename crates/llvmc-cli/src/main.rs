use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logger;
mod session;

use session::{GlobalArgs, Session};

/// Drive the LLVM C API from the command line.
///
/// llvmc binds libLLVM at runtime and exposes a few module-level operations:
/// verifying, printing and optimising textual IR.
///
/// EXAMPLES:
///     llvmc probe                              Show which library was bound
///     llvmc verify input.ll                    Run the IR verifier
///     llvmc print input.ll -o copy.ll          Parse and print a module
///     llvmc opt input.ll --passes 'default<O3>'  Optimise a module
///
/// ENVIRONMENT VARIABLES:
///     LLVMC_LIBRARY           Library path or name (e.g. LLVM-18)
///     LLVMC_MESSAGE_ENCODING  latin1 or utf8
///     LLVMC_OPT_LEVEL         MCJIT optimisation level, 0-3
///     LLVMC_LOG               Log level (error, warn, info, debug, trace)
#[derive(Parser)]
#[command(name = "llvmc")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the LLVM shared library (overrides configuration)
    #[arg(long, global = true, value_name = "PATH")]
    library: Option<PathBuf>,

    /// Configuration file to use instead of searching for llvmc.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Probe the built-in stub instead of a real LLVM library (probe only)
    #[arg(long, global = true)]
    stub: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind the LLVM library and report its path and version
    Probe {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Parse an IR file and run the module verifier
    ///
    /// The verifier's message is printed verbatim; the exit status is
    /// non-zero when the module is broken.
    Verify {
        /// Textual or bitcode IR file
        file: PathBuf,
    },

    /// Parse an IR file and print the module
    Print {
        /// Textual or bitcode IR file
        file: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run a new pass manager pipeline over an IR file
    ///
    /// EXAMPLES:
    ///     llvmc opt input.ll
    ///     llvmc opt input.ll --passes 'function(instcombine,simplifycfg)'
    ///     llvmc opt input.ll --passes 'default<O2>' -o out.ll
    Opt {
        /// Textual or bitcode IR file
        file: PathBuf,
        /// Pipeline text (defaults to passes.pipeline)
        #[arg(long, short = 'p', value_name = "PIPELINE")]
        passes: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Verify after each pass
        #[arg(long)]
        verify_each: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let session = Session::load(GlobalArgs {
        library: cli.library,
        config: cli.config,
        stub: cli.stub,
        verbose: cli.verbose,
    })?;
    logger::init(logger::level_for(
        session.args.verbose,
        session.config().log.level,
    ));

    match cli.command {
        Commands::Probe { json } => commands::probe::run(&session, json)?,
        Commands::Config => commands::config::run(&session)?,
        Commands::Verify { file } => commands::verify::run(&session, &file)?,
        Commands::Print { file, output } => {
            commands::print::run(&session, &file, output.as_deref())?
        }
        Commands::Opt {
            file,
            passes,
            output,
            verify_each,
        } => {
            let args = commands::opt::OptArgs {
                file,
                passes,
                output,
                verify_each,
            };
            commands::opt::run(&session, args)?;
        }
    }

    Ok(())
}
