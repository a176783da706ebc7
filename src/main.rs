use std::path::{Path, PathBuf};
use std::{env, io, io::IsTerminal};

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::{Level, debug};

use huffc_core::{CompileRenderOptions, CompilerConfig, load_config};
use huffc_fs::StdSourceFS;

#[derive(Debug, Parser)]
#[command(
    name = "huffc",
    version,
    about = "Macro assembler for stack-machine bytecode",
    long_about = None,
    override_usage = "huffc [COMMAND] [INPUT]",
    after_help = "Examples:\n  huffc contracts/main.huff\n  huffc compile contracts/main.huff -m MAIN --sourcemap main.map.json\n  huffc macros contracts/main.huff\n  huffc --help"
)]
struct Cli {
    /// Optional explicit subcommand.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input source file, compiled with the default entry macro.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(long, global = true, default_value_t = Level::WARN)]
    log_level: Level,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile one macro to bytecode.
    Compile(CompileArgs),
    /// List the macros a program declares.
    Macros(MacrosArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Directory includes and the input are resolved against.
    #[arg(short = 'I', long = "include-path", value_name = "DIR")]
    include_path: Option<PathBuf>,
    /// Compiler config file in RON format.
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct CompileArgs {
    /// Input source file (.huff).
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Entry macro to expand.
    #[arg(short = 'm', long = "macro", value_name = "MACRO")]
    entry: Option<String>,
    #[command(flatten)]
    source: SourceArgs,
    /// Write the bytecode hex here instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "OUT")]
    output: Option<PathBuf>,
    /// Write the per-byte source map as JSON.
    #[arg(long = "sourcemap", value_name = "FILE")]
    sourcemap: Option<PathBuf>,
    /// Write a disassembly listing.
    #[arg(long = "listing", value_name = "FILE")]
    listing: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct MacrosArgs {
    /// Input source file (.huff).
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    #[command(flatten)]
    source: SourceArgs,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Compile(args)) => compile_command(args),
        Some(Commands::Macros(args)) => macros_command(args),
        None => {
            let Some(input) = cli.input else {
                print_banner();
                println!();
                let mut command = Cli::command();
                command.print_help()?;
                println!();
                return Ok(());
            };
            compile_command(CompileArgs {
                input,
                entry: None,
                source: SourceArgs {
                    include_path: None,
                    config: None,
                },
                output: None,
                sourcemap: None,
                listing: None,
            })
        }
    }
}

fn print_banner() {
    println!("huffc, version {}.", env!("CARGO_PKG_VERSION"));
    println!("Macro assembler for stack-machine bytecode.");
    println!("License: 0BSD - free to use, copy, modify, and distribute.");
    println!("Provided AS IS, without warranty or liability.");
}

/// Config, include directory and entry file path relative to it.
struct ResolvedSource {
    config: CompilerConfig,
    include_path: PathBuf,
    entry_file: PathBuf,
}

fn resolve_source(input: &Path, args: &SourceArgs) -> anyhow::Result<ResolvedSource> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => CompilerConfig::default(),
    };
    let include_path = args
        .include_path
        .clone()
        .or_else(|| config.include_path.clone())
        .unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")).to_path_buf());
    let entry_file = match input.strip_prefix(&include_path) {
        Ok(relative) if !include_path.as_os_str().is_empty() => relative.to_path_buf(),
        _ if args.include_path.is_none() && config.include_path.is_none() => input
            .file_name()
            .map(PathBuf::from)
            .with_context(|| format!("'{}' is not a file path", input.display()))?,
        _ => std::path::absolute(input)
            .with_context(|| format!("failed to resolve '{}'", input.display()))?,
    };
    debug!(
        include_path = %include_path.display(),
        entry_file = %entry_file.display(),
        "resolved input"
    );
    Ok(ResolvedSource {
        config,
        include_path,
        entry_file,
    })
}

fn compile_command(args: CompileArgs) -> anyhow::Result<()> {
    let resolved = resolve_source(&args.input, &args.source)?;
    let entry = args
        .entry
        .as_deref()
        .unwrap_or_else(|| resolved.config.entry_macro());

    let output = huffc_core::compile_with_options(
        entry,
        &resolved.entry_file,
        &resolved.include_path,
        &StdSourceFS,
        &resolved.config,
        CompileRenderOptions {
            color: stderr_supports_color(),
        },
    )
    .map_err(|error| anyhow::anyhow!(error.rendered))?;

    let hex = output.bytecode_hex();
    match &args.output {
        Some(path) => std::fs::write(path, format!("{hex}\n"))
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => println!("{hex}"),
    }

    if let Some(path) = &args.sourcemap {
        let json = serde_json::to_string_pretty(&output.sourcemap)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }

    if let Some(path) = &args.listing {
        let listing = output.listing(&resolved.config.opcode_table());
        std::fs::write(path, listing)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }
    Ok(())
}

fn macros_command(args: MacrosArgs) -> anyhow::Result<()> {
    let resolved = resolve_source(&args.input, &args.source)?;
    let program = huffc_core::load_program(
        &resolved.entry_file,
        &resolved.include_path,
        &StdSourceFS,
        &resolved.config,
        CompileRenderOptions {
            color: stderr_supports_color(),
        },
    )
    .map_err(|error| anyhow::anyhow!(error.rendered))?;

    for mac in program.macros.iter() {
        let params = if mac.template_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", mac.template_params.join(", "))
        };
        println!(
            "{}{params} takes({}) returns({})",
            mac.name, mac.takes, mac.returns
        );
    }
    Ok(())
}

fn stderr_supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if let Some(force) = env::var_os("CLICOLOR_FORCE") {
        return force != "0";
    }

    if let Some(choice) = env::var_os("CLICOLOR") {
        if choice == "0" {
            return false;
        }
    }

    io::stderr().is_terminal()
}
