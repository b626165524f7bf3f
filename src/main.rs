use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ceap_analytics::{
    count_deputies, count_expenses, insert_deputies, insert_expenses, load_deputies_csv,
    load_expenses_csv, setup_database, HttpChatClient, InMemorySessionStore, Orchestrator,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import-deputies") => run_import_deputies(args.get(2)),
        Some("import-expenses") => run_import_expenses(args.get(2)),
        Some("ask") => run_ask(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("CEAP Analytics - gastos de deputados federais\n");
    println!("Usage:");
    println!("  ceap-analytics import-deputies <deputados.csv>");
    println!("  ceap-analytics import-expenses <despesas.csv>");
    println!("  ceap-analytics ask \"<pergunta em linguagem natural>\"\n");
    println!("Environment:");
    println!("  CEAP_DB       database path (default: ceap.db)");
    println!("  LLM_BASE_URL  OpenAI-compatible endpoint (default: http://localhost:11434/v1)");
    println!("  LLM_MODEL     model name (default: llama3.1)");
    println!("  LLM_API_KEY   bearer token, if the endpoint needs one");
}

fn db_path() -> String {
    env::var("CEAP_DB").unwrap_or_else(|_| "ceap.db".to_string())
}

fn open_db() -> Result<Connection> {
    let path = db_path();
    let conn = Connection::open(&path).with_context(|| format!("opening database {}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_import_deputies(csv_path: Option<&String>) -> Result<()> {
    let Some(csv_path) = csv_path else {
        bail!("missing CSV path: ceap-analytics import-deputies <deputados.csv>");
    };

    println!("📂 Loading deputies from {}...", csv_path);
    let deputies = load_deputies_csv(Path::new(csv_path))?;
    println!("✓ Parsed {} deputies", deputies.len());

    let conn = open_db()?;
    let upserted = insert_deputies(&conn, &deputies)?;
    println!("✓ Upserted {} deputies", upserted);
    println!("✓ Database now has {} deputies", count_deputies(&conn)?);

    Ok(())
}

fn run_import_expenses(csv_path: Option<&String>) -> Result<()> {
    let Some(csv_path) = csv_path else {
        bail!("missing CSV path: ceap-analytics import-expenses <despesas.csv>");
    };

    println!("📂 Loading expenses from {}...", csv_path);
    let expenses = load_expenses_csv(Path::new(csv_path))?;
    println!("✓ Parsed {} expense rows", expenses.len());

    let conn = open_db()?;
    let (inserted, duplicates) = insert_expenses(&conn, &expenses)?;
    println!("✓ Inserted {} new expenses", inserted);
    if duplicates > 0 {
        println!("✓ Skipped {} duplicates (re-import is safe)", duplicates);
    }
    println!("✓ Database now has {} expenses", count_expenses(&conn)?);

    Ok(())
}

fn run_ask(rest: &[String]) -> Result<()> {
    if rest.is_empty() {
        bail!("missing question: ceap-analytics ask \"quem gastou mais em 2024?\"");
    }
    let question = rest.join(" ");

    let conn = open_db()?;
    let client = HttpChatClient::from_env()?;
    println!("🤖 Model: {}\n", client.model_name());

    let orchestrator = Orchestrator::new(
        Arc::new(client),
        Arc::new(Mutex::new(conn)),
        Arc::new(InMemorySessionStore::new()),
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(orchestrator.answer(&question, None))?;

    println!("{}", result.answer);
    Ok(())
}
