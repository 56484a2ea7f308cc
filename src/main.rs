use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use qql_lang::cli::{self, CliError, RunOptions};
use qql_lang::executor::DEFAULT_MAX_CALL_DEPTH;
use qql_lang::output::Format;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "qql")]
#[command(about = "QQL - a quick query language for CRUD over database.table stores")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => Format::Text,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a QQL source file
    Run {
        /// Source file; `-` or nothing reads stdin
        file: Option<PathBuf>,

        /// Report failing statements and continue with the next one
        #[arg(short, long)]
        keep_going: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Deepest allowed nesting of function calls
        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_call_depth: usize,
    },

    /// Lex, parse and bind a source file without executing it
    Check {
        /// Source file; `-` or nothing reads stdin
        file: Option<PathBuf>,
    },

    /// Print the token stream of a source file
    Tokens {
        /// Source file; `-` or nothing reads stdin
        file: Option<PathBuf>,
    },

    /// List documentation categories
    Docs,

    /// Show documentation for a specific category
    Doc {
        /// Category name (use 'qql docs' to list categories)
        category: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            file,
            keep_going,
            format,
            max_call_depth,
        } => run(
            file,
            RunOptions {
                format: format.into(),
                keep_going,
                max_call_depth,
            },
        ),
        Commands::Check { file } => check(file),
        Commands::Tokens { file } => read_source(file)
            .and_then(|source| cli::dump_tokens(&source))
            .map(|tokens| print!("{}", tokens)),
        Commands::Docs => {
            print!("{}", cli::get_docs_overview());
            Ok(())
        }
        Commands::Doc { category } => cli::get_doc_category(&category).map(|content| print!("{}", content)),
    };

    match result {
        Ok(()) => {}
        // Failures were reported as they happened
        Err(CliError::Failed(_)) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_source(file: Option<PathBuf>) -> Result<String, CliError> {
    match file {
        Some(path) if path.as_os_str() != "-" => Ok(fs::read_to_string(path)?),
        _ if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        _ => Err(CliError::NoInput),
    }
}

fn run(file: Option<PathBuf>, options: RunOptions) -> Result<(), CliError> {
    let source = read_source(file)?;
    let stdout = io::stdout();
    let stderr = io::stderr();
    let summary = cli::execute_run(&source, &options, &mut stdout.lock(), &mut stderr.lock())?;
    if summary.failed > 0 {
        return Err(CliError::Failed(summary.failed));
    }
    Ok(())
}

fn check(file: Option<PathBuf>) -> Result<(), CliError> {
    let source = read_source(file)?;
    let result = cli::execute_check(&source)?;
    println!("OK: {} statement(s)", result.statements);
    Ok(())
}
