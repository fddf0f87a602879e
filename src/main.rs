use sqlhelper::config::{self, Config};
use sqlhelper::sql::StatementType;
use sqlhelper::{DatabaseSession, Result, SqlHelperError, SqliteDriver};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: sqlhelper [--config PATH] [--truncate TABLE] [SQL...]";

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    truncate: Option<String>,
    sql: String,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> std::result::Result<Args, String> {
    let mut parsed = Args::default();
    let mut words = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--truncate" => {
                parsed.truncate = Some(iter.next().ok_or("--truncate needs a table name")?);
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            _ => words.push(arg),
        }
    }

    parsed.sql = words.join(" ");
    if parsed.sql.trim().is_empty() && parsed.truncate.is_none() {
        return Err(USAGE.to_string());
    }
    Ok(parsed)
}

fn run(args: Args) -> Result<ExitCode> {
    let path = args
        .config
        .or_else(config::default_config_path)
        .ok_or_else(|| SqlHelperError::Config("no --config given and no default config directory".to_string()))?;
    let config: Config = config::load_config(&path)?;
    let policy = config.retry_policy()?;

    let mut session = DatabaseSession::connect(&SqliteDriver, config.credentials())?;

    if let Some(table) = &args.truncate {
        session.clear_table(table)?;
    }

    let sql = args.sql.trim();
    if sql.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    match StatementType::from_sql(sql) {
        StatementType::Query => {
            let Some(rows) = session.query(sql, policy)? else {
                error!("Query gave no result after {} attempt(s)", policy.retries.saturating_add(1));
                return Ok(ExitCode::FAILURE);
            };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for row in &rows {
                serde_json::to_writer(&mut out, row)?;
                writeln!(out)?;
            }
            info!("{} row(s)", rows.len());
        }
        StatementType::Statement => {
            session.execute(sql, policy)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only rows
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
