//! Command line front end: `dexpatch diff` and `dexpatch apply`.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::error;

use dexpatch::{apply_patch_file, generate_patch_file, DexError, DexPatchConfig};

/// Structural diff and patch for dex files.
#[derive(Parser, Debug)]
#[command(name = "dexpatch", version, about = "Structural dex diff/patch", arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Generate a patch from OLD to NEW.
    Diff(DiffArgs),
    /// Apply a patch to OLD and write the patched container.
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
struct DiffArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,
    #[arg(value_hint = ValueHint::FilePath)]
    new: PathBuf,
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Leave classes matching PATTERN out of the patched container.
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Fail when retained data still references an excluded class.
    #[arg(long)]
    strict: bool,

    /// Print per-section statistics as JSON to stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,
    #[arg(value_hint = ValueHint::FilePath)]
    out: PathBuf,
}

fn run(cli: Cli) -> Result<(), DexError> {
    match cli.command {
        Cmd::Diff(args) => {
            let config = DexPatchConfig {
                excluded_class_patterns: args.exclude,
                strict_exclusions: args.strict,
            };
            let output = generate_patch_file(&args.old, &args.new, &args.patch, &config)?;
            if args.json {
                match serde_json::to_string_pretty(&output) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Cannot serialize statistics: {}", e),
                }
            }
            Ok(())
        }
        Cmd::Apply(args) => apply_patch_file(&args.old, &args.patch, &args.out),
    }
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}
