use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use diagnosis_store::observability::{init_tracing, LogFormat};
use diagnosis_store::{records_to_csv, start_server, Config, Database};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "diagnosis-store")]
#[command(author, version, about = "Record, filter and export diagnosis responses from research studies")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML config file (server, database and logging settings)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (default: ./diagnosis.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default when no command is given)
    Serve {
        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write every record as CSV, same format as GET /export
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(Command::Completion { shell }) = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "diagnosis-store", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_tracing(config.logging.format);

    let command = cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    });

    let result = match command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            start_server(&config).map_err(|e| e.to_string())
        }
        Command::Export { output } => export(&config, output),
        Command::Completion { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn export(config: &Config, output: Option<PathBuf>) -> Result<(), String> {
    let db = Database::open_at(&config.database.path).map_err(|e| e.to_string())?;
    let records = db.get_all_records().map_err(|e| e.to_string())?;
    let csv = records_to_csv(&records);

    match output {
        Some(path) => {
            std::fs::write(&path, csv)
                .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
            eprintln!(
                "{} {} record(s) to {}",
                "Exported".green(),
                records.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(csv.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}
