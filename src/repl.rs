use crate::client::{Client, Queryable};
use crate::core::db::StatementType;
use crate::core::Result;
use crate::raw::{self, Sql};
use crate::request::{Action, JsonRequest};
use crate::schema::{diff, schema};
use crate::schema_map;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::io::{self, BufRead, Write};

/// `Model.action {json}`, e.g. `feedback.findMany {"take": 5}`.
static REQUEST_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_]*)\.([A-Za-z]+)(?:\s+(.*))?$").ok());

/// Represents a parsed REPL command.
#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Models,
    Push,
    Verify,
    Erd,
    Quit,
    Request {
        model: String,
        action: String,
        args: String,
    },
    Sql(String),
    Unknown(String),
}

/// Parses a user input string into a corresponding `Command`.
///
/// Input starting with a colon is a REPL command, `Model.action {json}` is
/// a JSON protocol request and anything else is SQL.
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    if let Some(name) = input.strip_prefix(':') {
        return match name.trim() {
            "help" => Command::Help,
            "models" => Command::Models,
            "push" => Command::Push,
            "verify" => Command::Verify,
            "erd" => Command::Erd,
            "quit" | "q" | "exit" => Command::Quit,
            _ => Command::Unknown(input.to_string()),
        };
    }
    if let Some(re) = REQUEST_RE.as_ref() {
        if let Some(caps) = re.captures(input) {
            return Command::Request {
                model: caps[1].to_string(),
                action: caps[2].to_string(),
                args: caps.get(3).map_or("", |m| m.as_str()).trim().to_string(),
            };
        }
    }
    Command::Sql(input.to_string())
}

fn help_text() -> String {
    [
        "Available commands:",
        "  :help - List all available commands",
        "  :models - List models and their fields",
        "  :push - Create missing tables and indexes",
        "  :verify - Compare the database against the schema",
        "  :erd - Show the ER diagram of the schema",
        "  :quit - Leave the REPL",
        "",
        "  Model.action {json} - Run a request, e.g. feedback.findMany {\"take\": 5}",
        "",
        "Or enter SQL directly without any prefix.",
    ]
    .join("\n")
}

fn models_text() -> String {
    let mut out = String::new();
    for model in &schema().models {
        let fields: Vec<&str> = model.fields.iter().map(|f| f.name).collect();
        out.push_str(&format!("{}: {}\n", model.name, fields.join(", ")));
        if !model.relations.is_empty() {
            let relations: Vec<String> = model
                .relations
                .iter()
                .map(|r| format!("{} -> {}{}", r.name, r.target, if r.is_list() { "[]" } else { "" }))
                .collect();
            out.push_str(&format!("  relations: {}\n", relations.join(", ")));
        }
    }
    out
}

/// Renders rows as a `|`-separated table with a row count footer.
pub fn render_rows(columns: &[String], rows: &[Map<String, JsonValue>]) -> String {
    let header = columns.join(" | ");
    let mut out = format!("{}\n{}\n", header, "-".repeat(header.len()));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| match row.get(c) {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Null) | None => "NULL".to_string(),
                Some(other) => other.to_string(),
            })
            .collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    out.push_str(&format!("\n({} rows)", rows.len()));
    out
}

fn run_sql(client: &Client, sql: &str) -> Result<String> {
    match StatementType::from_sql(sql) {
        StatementType::Select | StatementType::Other => {
            let stmt = Sql::raw(sql).render();
            let result = client.with_engine(|engine| raw::query_raw(&engine.executor(), &stmt))?;
            Ok(render_rows(&result.columns, &result.rows))
        }
        _ => {
            let affected = client.execute_raw(Sql::raw(sql))?;
            Ok(format!("({} rows affected)", affected))
        }
    }
}

/// Executes one command and returns the text to print. `None` means quit.
pub fn execute_command(client: &Client, command: Command) -> Result<Option<String>> {
    let output = match command {
        Command::Quit => return Ok(None),
        Command::Help => help_text(),
        Command::Models => models_text(),
        Command::Push => {
            client.push_schema()?;
            "Schema pushed.".to_string()
        }
        Command::Verify => diff::format_comparison(&client.verify_schema()?),
        Command::Erd => schema_map::render_schema_map(&schema_map::generate_schema_map()),
        Command::Request { model, action, args } => {
            let action: Action = action.parse()?;
            let args = if args.is_empty() {
                JsonValue::Object(Map::new())
            } else {
                serde_json::from_str(&args)?
            };
            let request = JsonRequest::new((!action.is_raw()).then_some(model.as_str()), action, args);
            serde_json::to_string_pretty(&client.execute_request(&request)?)?
        }
        Command::Sql(sql) if sql.is_empty() => String::new(),
        Command::Sql(sql) => run_sql(client, &sql)?,
        Command::Unknown(input) => format!("Unknown command `{}`. Type :help for a list.", input),
    };
    Ok(Some(output))
}

/// Runs the REPL over standard input until `:quit` or end of input.
pub fn run_repl(client: &Client) -> Result<()> {
    println!("feedbase REPL. Type :help for commands, :quit to exit.");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match execute_command(client, parse_command(&line)) {
            Ok(Some(output)) => println!("{}", output),
            Ok(None) => break,
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}
