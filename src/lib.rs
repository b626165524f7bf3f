// CEAP Analytics - Core Library
// Natural-language analytics over Brazilian federal deputies' expense
// reimbursements (CEAP). Exposes all modules for the CLI, the API server,
// and tests.

pub mod cota;
pub mod db;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod plan;
pub mod resolver;
pub mod session;
pub mod stats;
pub mod tools;

// Re-export commonly used types
pub use db::{
    count_deputies, count_expenses, insert_deputies, insert_expenses, load_deputies_csv,
    load_expenses_csv, setup_database, Deputy, Expense,
};
pub use error::{OrchestratorError, ToolError};
pub use llm::{ChatClient, ChatMessage, HttpChatClient, ModelTurn, ToolCallRequest};
pub use orchestrator::{Answer, DetailedAnswer, Orchestrator, ToolTraceEntry};
pub use plan::{QueryBuilder, QueryPlan, SortOrder};
pub use resolver::{resolve_expense_terms, resolve_party};
pub use session::{InMemorySessionStore, SessionStore, Turn};
pub use tools::{catalog, catalog_schemas, run_tool, ToolName, ToolSpec};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
