// CLI module
// Command-line interface and argument parsing

mod args;

pub use args::{CliArgs, LockType, RuntimeType};

use clap::Parser;

/// Parse command-line arguments using clap
///
/// On invalid arguments, missing arguments or `--help`, clap prints the
/// error or help text and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
