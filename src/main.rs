//! # dinja - JSX-like component compiler
//!
//! Compiles component source files into agent-host Markdown and an optional
//! companion runtime script bundle.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dinja_compiler::config::BuildConfig;
use dinja_compiler::orchestrator;

/// dinja component compiler
#[derive(Parser, Debug)]
#[command(name = "dinja")]
#[command(author, version, about = "Compiles JSX-like components into agent-host Markdown", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (equivalent to RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile source files into Markdown (and, for runtime-dialect files,
    /// a companion runtime bundle)
    Build(BuildArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Source glob patterns or directories to compile
    patterns: Vec<String>,

    /// Command output directory
    #[arg(long, env = "DINJA_OUT")]
    out: Option<PathBuf>,

    /// Agent output directory
    #[arg(long = "agents-out", env = "DINJA_AGENTS_OUT")]
    agents_out: Option<PathBuf>,

    /// Runtime bundle output directory
    #[arg(long = "runtime-out", env = "DINJA_RUNTIME_OUT")]
    runtime_out: Option<PathBuf>,

    /// Path to a JSON config file
    #[arg(short, long, env = "DINJA_CONFIG")]
    config: Option<PathBuf>,

    /// Compile and report without writing any output file
    #[arg(long)]
    dry_run: bool,

    /// Recompile on source file changes
    #[arg(long)]
    watch: bool,

    /// Bundle the runtime in code-split mode (one module per namespace)
    #[arg(long = "code-split")]
    code_split: bool,

    /// Minify the emitted runtime bundle
    #[arg(long)]
    minify: bool,

    /// Number of parallel compilation workers (0 disables parallelism)
    #[arg(long, default_value = "0")]
    jobs: usize,
}

impl BuildArgs {
    /// Merges CLI flags over a file-loaded [`BuildConfig`], flags winning
    /// (spec §6: "flag values win over file values over built-in
    /// defaults"). Boolean flags are only ever "on" at the CLI, so a `false`
    /// default never overrides a `true` file value.
    fn apply_to(self, mut config: BuildConfig) -> BuildConfig {
        if !self.patterns.is_empty() {
            config.patterns = self.patterns;
        }
        if let Some(out) = self.out {
            config.out_dir = out;
        }
        if let Some(agents_out) = self.agents_out {
            config.agents_out_dir = agents_out;
        }
        if let Some(runtime_out) = self.runtime_out {
            config.runtime_out_dir = runtime_out;
        }
        config.dry_run = config.dry_run || self.dry_run;
        config.watch = config.watch || self.watch;
        config.code_split = config.code_split || self.code_split;
        config.minify = config.minify || self.minify;
        config
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let result = match cli.command {
        Command::Build(args) => run_build_command(args),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run_build_command(args: BuildArgs) -> anyhow::Result<()> {
    let config_path = args.config.clone();
    let jobs = args.jobs;
    let file_config = BuildConfig::from_file(config_path.as_ref())?;
    let config = args.apply_to(file_config);

    if config.patterns.is_empty() {
        anyhow::bail!("no source patterns given; pass one or more paths or globs");
    }

    if config.watch {
        orchestrator::run_watch(&config)?;
    } else if jobs > 1 {
        orchestrator::run_build_parallel(&config, jobs)?;
    } else {
        orchestrator::run_build(&config)?;
    }
    Ok(())
}
