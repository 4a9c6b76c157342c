use clap::{Parser, Subcommand};
use feedbase::client::{Client, Queryable};
use feedbase::config;
use feedbase::core::Result;
use feedbase::repl;
use feedbase::request::{Action, JsonRequest};
use feedbase::schema::{ddl, diff};
use feedbase::schema_map;
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "feedbase")]
#[command(version, about = "Typed SQLite client for the feedback service schema", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "FEEDBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Datasource URL; overrides the config file and DATABASE_URL
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create missing tables and indexes
    Push,
    /// Compare the database against the schema; exits 1 on drift
    Verify,
    /// Print the schema DDL
    Ddl,
    /// Print an ER diagram of the schema
    Erd,
    /// Run a JSON protocol request, e.g. `query feedback findMany '{"take": 5}'`
    Query {
        model: String,
        action: String,
        /// Arguments as a JSON object
        args: Option<String>,
    },
    /// Run a row-returning SQL statement and print the rows as JSON
    Raw {
        sql: String,
        /// Bound parameters as a JSON array
        #[arg(short, long)]
        params: Option<String>,
    },
    /// Run a SQL statement that returns no rows and print the affected count
    Exec {
        sql: String,
        #[arg(short, long)]
        params: Option<String>,
    },
    /// Interactive shell
    Repl,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn connect(cli: &Cli) -> Result<Client> {
    let mut config = config::load_or_default(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config = config.with_url(url);
    }
    let client = Client::open(&config)?;
    debug!(url = %client.settings().url, "Client ready");
    Ok(client)
}

fn parse_json(text: Option<&str>, default: JsonValue) -> Result<JsonValue> {
    match text {
        Some(text) => Ok(serde_json::from_str(text)?),
        None => Ok(default),
    }
}

fn print_json(value: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn raw_request(action: Action, sql: &str, params: Option<&str>) -> Result<JsonRequest> {
    let parameters = parse_json(params, json!([]))?;
    Ok(JsonRequest::new(
        None,
        action,
        json!({ "query": sql, "parameters": parameters }),
    ))
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Ddl => println!("{}", ddl::schema_sql()?),
        Commands::Erd => print!("{}", schema_map::render_schema_map(&schema_map::generate_schema_map())),
        Commands::Push => {
            connect(cli)?.push_schema()?;
            println!("Schema pushed.");
        }
        Commands::Verify => {
            let comparison = connect(cli)?.verify_schema()?;
            print!("{}", diff::format_comparison(&comparison));
            if !comparison.is_in_sync() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Query { model, action, args } => {
            let action: Action = action.parse()?;
            let args = parse_json(args.as_deref(), json!({}))?;
            let request = JsonRequest::new(Some(model.as_str()), action, args);
            print_json(&connect(cli)?.execute_request(&request)?)?;
        }
        Commands::Raw { sql, params } => {
            let request = raw_request(Action::QueryRaw, sql, params.as_deref())?;
            print_json(&connect(cli)?.execute_request(&request)?)?;
        }
        Commands::Exec { sql, params } => {
            let request = raw_request(Action::ExecuteRaw, sql, params.as_deref())?;
            print_json(&connect(cli)?.execute_request(&request)?)?;
        }
        Commands::Repl => repl::run_repl(&connect(cli)?)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(code) = e.code() {
                eprintln!("Code: {}", code);
            }
            ExitCode::FAILURE
        }
    }
}
