//! nbgrade CLI — grade notebook exercises from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "nbgrade", version, about = "Notebook exercise grader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a notebook against a test file
    Grade {
        /// Student notebook (.ipynb)
        notebook: PathBuf,

        /// Python file defining test_* functions
        tests: PathBuf,

        /// Permitted top-level modules (comma-separated)
        #[arg(long)]
        allowed_imports: Option<String>,

        /// Write the JSON result to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Grade one exercise from a course module tree
    Exercise {
        /// Module directory name (e.g. "02-regressao")
        #[arg(long)]
        module: String,

        /// Exercise stem (e.g. "01_mae_metric")
        #[arg(long)]
        exercise: String,

        /// Directory containing the modules (default from config)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Write the JSON result to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check a notebook's imports without executing it
    Check {
        /// Notebook to check
        notebook: PathBuf,

        /// Permitted top-level modules (comma-separated)
        #[arg(long)]
        allowed_imports: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Markdown,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nbgrade=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Grade {
            notebook,
            tests,
            allowed_imports,
            output,
            config,
            format,
        } => commands::grade::execute(notebook, tests, allowed_imports, output, config, format),
        Commands::Exercise {
            module,
            exercise,
            root,
            output,
            config,
            format,
        } => commands::exercise::execute(module, exercise, root, output, config, format),
        Commands::Check {
            notebook,
            allowed_imports,
            config,
        } => commands::check::execute(notebook, allowed_imports, config),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}
