//! CLI entry point: parses arguments, loads and links the named modules, then runs the VM.

use acsvm::config::Config;
use acsvm::error::CliError;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "acsvm", about = "Standalone virtual machine for compiled ACS object modules")]
struct Args {
    /// The main object file to run.
    object_file: PathBuf,

    /// Load an additional named module (may repeat).
    #[arg(short = 'n', long = "name", value_names = ["NAME", "PATH"], num_args = 2)]
    named: Vec<String>,

    /// Verbose diagnostics (enables DBG-level output).
    #[arg(short, long)]
    verbose: bool,

    /// Override the tic duration in milliseconds.
    #[arg(long)]
    tic_millis: Option<u64>,

    /// Optional TOML config file overlay.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let file_overlay = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            acsvm::diagnostics::emit(acsvm::diagnostics::Level::FatalError, &e.to_string());
            return ExitCode::FAILURE;
        }
    };
    let cli_overlay = Config {
        tic_millis: args.tic_millis,
        verbose: if args.verbose { Some(true) } else { None },
    };
    let config = file_overlay.merged_with(cli_overlay);
    let verbose = config.verbose.unwrap_or(false);

    acsvm::diagnostics::set_verbose(verbose);
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            acsvm::diagnostics::emit(acsvm::diagnostics::Level::FatalError, &message);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args, config: Config) -> Result<(), String> {
    let tic_duration = Duration::from_millis(config.tic_millis.unwrap_or(1000));
    let verbose = config.verbose.unwrap_or(false);

    let mut named_objects = Vec::new();
    let main_bytes = read_object(&args.object_file).map_err(|e| e.to_string())?;
    named_objects.push((String::new(), main_bytes));

    let mut iter = args.named.into_iter();
    while let (Some(name), Some(path)) = (iter.next(), iter.next()) {
        let bytes = read_object(&PathBuf::from(&path)).map_err(|e| e.to_string())?;
        named_objects.push((name, bytes));
    }

    let mut vm = acsvm::build_vm(named_objects, tic_duration, verbose).map_err(|e| e.to_string())?;
    acsvm::run(&mut vm).map_err(|e| e.to_string())
}

fn read_object(path: &std::path::Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::ReadFile {
        path: path.display().to_string(),
        source,
    })
}
