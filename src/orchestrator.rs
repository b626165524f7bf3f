// Bounded tool-calling conversation loop.
//
// One question is answered in at most MAX_ROUND_TRIPS model exchanges. Each
// exchange either ends with text or requests a batch of tool calls; every
// call in a batch executes (failures become structured payloads keyed by
// call id) before the model sees anything, so one bad call never poisons
// its siblings or ends the conversation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::error::{OrchestratorError, ToolError};
use crate::llm::{ChatClient, ChatMessage, ModelTurn, ToolCallRequest};
use crate::session::{SessionStore, MODEL_WINDOW_PAIRS};
use crate::tools::{catalog_schemas, run_tool};

/// Model exchanges allowed per question.
pub const MAX_ROUND_TRIPS: usize = 10;
/// Wall-clock budget for one tool execution.
pub const TOOL_TIMEOUT_SECS: u64 = 30;

const SYSTEM_PROMPT: &str = "\
Você é um assistente especializado em gastos de deputados federais \
brasileiros (CEAP, a cota parlamentar). Use as ferramentas disponíveis para \
consultar os dados; responda usando APENAS os valores retornados por elas. \
Nunca invente nomes, valores, partidos ou estados. Copie os números \
exatamente como retornados e formate valores monetários como R$ 123.456,78. \
Quando a pergunta pedir 'top X' ou 'quem gastou mais', use as ferramentas de \
ranking com o limite pedido; quando pedir quem gastou menos, use ordem \
ascendente. Se uma ferramenta retornar um erro, corrija os argumentos e \
tente novamente, ou explique a limitação ao usuário. Responda em português, \
de forma direta.";

const GIVE_UP_ANSWER: &str = "Não consegui concluir a análise dentro do \
limite de consultas ao banco. Tente uma pergunta mais específica.";

const EMPTY_ANSWER_FALLBACK: &str = "Não encontrei dados para responder a \
essa pergunta.";

#[derive(Debug, Serialize)]
pub struct Answer {
    pub session_id: String,
    pub answer: String,
}

/// One executed tool call, for the detailed (debugging) surface.
#[derive(Debug, Clone, Serialize)]
pub struct ToolTraceEntry {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct DetailedAnswer {
    pub answer: String,
    pub tool_trace: Vec<ToolTraceEntry>,
}

pub struct Orchestrator {
    client: Arc<dyn ChatClient>,
    conn: Arc<Mutex<Connection>>,
    sessions: Arc<dyn SessionStore>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ChatClient>,
        conn: Arc<Mutex<Connection>>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self { client, conn, sessions }
    }

    /// Answer a question in the context of a session. A missing session id
    /// starts a new session; the id is always returned so the caller can
    /// follow up.
    pub async fn answer(
        &self,
        question: &str,
        session_id: Option<String>,
    ) -> Result<Answer, OrchestratorError> {
        self.sessions.sweep();
        let session_id = session_id.unwrap_or_else(|| self.sessions.create());

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        for turn in self.sessions.recent_pairs(&session_id, MODEL_WINDOW_PAIRS) {
            messages.push(ChatMessage { role: turn.role, content: Some(turn.content), tool_calls: None, tool_call_id: None });
        }
        messages.push(ChatMessage::user(question));

        let (answer, _trace) = self.run_loop(messages).await?;
        self.sessions.append_exchange(&session_id, question, &answer);

        Ok(Answer { session_id, answer })
    }

    /// One-shot answer carrying the full tool trace. No session state is
    /// read or written.
    pub async fn answer_detailed(
        &self,
        question: &str,
    ) -> Result<DetailedAnswer, OrchestratorError> {
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(question)];
        let (answer, tool_trace) = self.run_loop(messages).await?;
        Ok(DetailedAnswer { answer, tool_trace })
    }

    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id)
    }

    async fn run_loop(
        &self,
        mut messages: Vec<ChatMessage>,
    ) -> Result<(String, Vec<ToolTraceEntry>), OrchestratorError> {
        let tools = catalog_schemas();
        let mut trace = Vec::new();

        for round in 0..MAX_ROUND_TRIPS {
            let turn = self.client.chat(&messages, &tools).await?;

            match turn {
                ModelTurn::Final(text) => {
                    let answer = if text.trim().is_empty() {
                        EMPTY_ANSWER_FALLBACK.to_string()
                    } else {
                        text
                    };
                    return Ok((answer, trace));
                }
                ModelTurn::ToolCalls(calls) => {
                    tracing::info!(round, calls = calls.len(), "model requested tools");
                    messages.push(ChatMessage::assistant_tool_calls(&calls));

                    for call in &calls {
                        let result = self.execute_tool_call(call).await;
                        trace.push(ToolTraceEntry {
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: result.clone(),
                        });
                        messages.push(ChatMessage::tool_result(&call.id, &result));
                    }
                }
            }
        }

        tracing::warn!("round-trip cap reached without a final answer");
        Ok((GIVE_UP_ANSWER.to_string(), trace))
    }

    /// Run one tool call on the blocking pool under the store lock, with a
    /// wall-clock budget. Every failure mode collapses to a payload the
    /// model can read.
    async fn execute_tool_call(&self, call: &ToolCallRequest) -> Value {
        let conn = Arc::clone(&self.conn);
        let name = call.name.clone();
        let args = call.arguments.clone();

        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            run_tool(&conn, &name, &args)
        });

        match tokio::time::timeout(Duration::from_secs(TOOL_TIMEOUT_SECS), task).await {
            Ok(Ok(Ok(value))) => value,
            Ok(Ok(Err(tool_err))) => {
                tracing::warn!(tool = %call.name, error = %tool_err, "tool call failed");
                tool_err.to_payload()
            }
            Ok(Err(join_err)) => {
                ToolError::Execution(format!("tool task failed: {}", join_err)).to_payload()
            }
            Err(_) => {
                tracing::warn!(tool = %call.name, "tool call timed out");
                ToolError::Execution(format!("timed out after {}s", TOOL_TIMEOUT_SECS)).to_payload()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_fixtures::seeded_connection;
    use crate::session::InMemorySessionStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// Scripted model: pops one turn per chat call and records what it saw.
    struct ScriptedClient {
        script: Mutex<Vec<ModelTurn>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedClient {
        fn new(mut turns: Vec<ModelTurn>) -> Arc<Self> {
            turns.reverse();
            Arc::new(Self { script: Mutex::new(turns), seen: Mutex::new(Vec::new()) })
        }

        fn calls_made(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn messages_at(&self, call: usize) -> Vec<ChatMessage> {
            self.seen.lock().unwrap()[call].clone()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[Value],
        ) -> Result<ModelTurn, OrchestratorError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| OrchestratorError::UpstreamModel("script exhausted".into()))
        }
    }

    fn orchestrator_with(client: Arc<ScriptedClient>) -> Orchestrator {
        Orchestrator::new(
            client,
            Arc::new(Mutex::new(seeded_connection())),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest { id: id.into(), name: name.into(), arguments }
    }

    #[tokio::test]
    async fn test_top_parties_scenario() {
        let client = ScriptedClient::new(vec![
            ModelTurn::ToolCalls(vec![tool_call(
                "call_0",
                "get_top_parties",
                json!({ "year": 2024, "limit": 5 }),
            )]),
            ModelTurn::Final("O partido que mais gastou em 2024 foi o PT.".into()),
        ]);
        let orch = orchestrator_with(Arc::clone(&client));

        let detailed = orch
            .answer_detailed("quais os 5 partidos que mais gastaram em 2024?")
            .await
            .unwrap();

        assert!(detailed.answer.contains("PT"));
        assert_eq!(detailed.tool_trace.len(), 1);
        assert_eq!(detailed.tool_trace[0].tool, "get_top_parties");
        assert_eq!(detailed.tool_trace[0].result[0]["party"], "PT");

        // The second model call must carry the tool result
        let second = client.messages_at(1);
        let tool_msg = second.iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_0"));
        assert!(tool_msg.content.as_deref().unwrap().contains("PT"));
    }

    #[tokio::test]
    async fn test_round_trip_cap_returns_narrative() {
        // A model that never stops asking for tools
        let turns: Vec<ModelTurn> = (0..MAX_ROUND_TRIPS + 5)
            .map(|i| {
                ModelTurn::ToolCalls(vec![tool_call(
                    &format!("call_{}", i),
                    "get_top_parties",
                    json!({}),
                )])
            })
            .collect();
        let client = ScriptedClient::new(turns);
        let orch = orchestrator_with(Arc::clone(&client));

        let result = orch.answer("pergunta sem fim", None).await.unwrap();

        assert_eq!(client.calls_made(), MAX_ROUND_TRIPS);
        assert!(!result.answer.is_empty());
        assert!(result.answer.contains("limite"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_fatal() {
        let client = ScriptedClient::new(vec![
            ModelTurn::ToolCalls(vec![
                tool_call("call_0", "get_everything", json!({})),
                tool_call("call_1", "search_deputy", json!({ "name": "ana" })),
            ]),
            ModelTurn::Final("Encontrei a deputada Ana Souza.".into()),
        ]);
        let orch = orchestrator_with(Arc::clone(&client));

        let detailed = orch.answer_detailed("quem é ana?").await.unwrap();

        // Both calls produced a result: one error payload, one real answer
        assert_eq!(detailed.tool_trace.len(), 2);
        assert_eq!(detailed.tool_trace[0].result["error"], "tool_not_found");
        assert_eq!(detailed.tool_trace[1].result[0]["name"], "Ana Souza");
        assert!(detailed.answer.contains("Ana"));
    }

    #[tokio::test]
    async fn test_validation_error_becomes_payload() {
        let client = ScriptedClient::new(vec![
            ModelTurn::ToolCalls(vec![tool_call(
                "call_0",
                "get_deputy_expenses",
                json!({ "deputy_id": "cem" }),
            )]),
            ModelTurn::Final("Preciso do ID numérico do deputado.".into()),
        ]);
        let orch = orchestrator_with(Arc::clone(&client));

        let detailed = orch.answer_detailed("gastos do deputado cem").await.unwrap();
        assert_eq!(detailed.tool_trace[0].result["error"], "validation_error");
        assert!(detailed.tool_trace[0].result["message"]
            .as_str()
            .unwrap()
            .contains("deputy_id"));
    }

    #[tokio::test]
    async fn test_session_history_reaches_the_model() {
        let client = ScriptedClient::new(vec![
            ModelTurn::Final("PT foi o que mais gastou.".into()),
            ModelTurn::Final("Em 2023 também foi o PT.".into()),
        ]);
        let orch = orchestrator_with(Arc::clone(&client));

        let first = orch.answer("qual partido gastou mais em 2024?", None).await.unwrap();
        let second = orch
            .answer("e em 2023?", Some(first.session_id.clone()))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);

        // The follow-up prompt must include the first exchange
        let followup_messages = client.messages_at(1);
        assert!(followup_messages
            .iter()
            .any(|m| m.content.as_deref() == Some("qual partido gastou mais em 2024?")));
        assert!(followup_messages
            .iter()
            .any(|m| m.content.as_deref() == Some("PT foi o que mais gastou.")));
    }

    #[tokio::test]
    async fn test_clear_session_forgets_history() {
        let client = ScriptedClient::new(vec![
            ModelTurn::Final("resposta um".into()),
            ModelTurn::Final("resposta dois".into()),
        ]);
        let orch = orchestrator_with(Arc::clone(&client));

        let first = orch.answer("primeira pergunta", None).await.unwrap();
        assert!(orch.clear_session(&first.session_id));

        let _ = orch
            .answer("segunda pergunta", Some(first.session_id.clone()))
            .await
            .unwrap();
        let followup_messages = client.messages_at(1);
        assert!(!followup_messages
            .iter()
            .any(|m| m.content.as_deref() == Some("primeira pergunta")));
    }

    #[tokio::test]
    async fn test_empty_final_text_never_returned() {
        let client = ScriptedClient::new(vec![ModelTurn::Final("   ".into())]);
        let orch = orchestrator_with(client);

        let result = orch.answer("pergunta", None).await.unwrap();
        assert!(!result.answer.trim().is_empty());
    }
}
