mod demo;
mod handlers;
mod server;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use registrar_core::config::RegistrarConfig;

#[derive(Parser)]
#[command(
    name = "registrar",
    about = "Registrar: coordination kernel for enrollment and room scheduling",
    version
)]
struct Cli {
    /// TOML configuration file; defaults apply to anything it omits
    #[arg(long, global = true, env = "REGISTRAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP coordination server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "REGISTRAR_STORAGE")]
        storage: String,
    },

    /// Run the walkthrough scenarios against an in-memory kernel and print the results
    Demo,

    /// Print version information
    Version,
}

fn load_config(path: Option<&Path>) -> Result<RegistrarConfig, String> {
    let Some(path) = path else {
        return Ok(RegistrarConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("invalid config {}: {}", path.display(), e))
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::Serve { port, host, storage } => server::run(&host, port, &storage, config).await,
        Commands::Demo => demo::run(config).await,
        Commands::Version => {
            println!("registrar {}", env!("CARGO_PKG_VERSION"));
            println!("Coordination kernel for enrollment, scheduling, 2PC and leader election");
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
