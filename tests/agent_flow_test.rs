//! End-to-end agent flows against mocked Ollama and ChromaDB servers

use ajan::agent::{Agent, AgentOptions, TrainingEvent, TrainingToggle, TurnOutcome};
use ajan::memory::ChromaClient;
use ajan::providers::Ollama;
use ajan::safety::{ConfirmationRequest, ConsentHandler};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

const COLLECTIONS: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";

struct Approve;

impl ConsentHandler for Approve {
    fn confirm(&self, _request: &ConfirmationRequest) -> bool {
        true
    }
}

fn model_reply(reply: &str) -> String {
    json!({ "model": "llama3", "response": reply, "done": true }).to_string()
}

async fn mock_backends(server: &mut ServerGuard, query_body: &str) {
    server
        .mock("POST", COLLECTIONS)
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;
    server
        .mock("GET", format!("{}/lessons", COLLECTIONS).as_str())
        .with_status(200)
        .with_body(r#"{"id":"c0ffee","name":"lessons"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/embeddings")
        .with_status(200)
        .with_body(r#"{"embedding":[0.25,0.5,0.75]}"#)
        .create_async()
        .await;
    server
        .mock("POST", format!("{}/c0ffee/query", COLLECTIONS).as_str())
        .with_status(200)
        .with_body(query_body)
        .create_async()
        .await;
}

const EMPTY_QUERY: &str = r#"{"ids":[[]],"metadatas":[[]],"distances":[[]]}"#;

#[tokio::test]
async fn test_training_writes_file_and_saves_lesson() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("hello.txt");
    let call = json!({
        "type": "tool_call",
        "tool_call": {
            "tool_name": "write_file",
            "params": { "file_path": target.to_string_lossy(), "content": "merhaba" }
        }
    })
    .to_string();

    let mut server = Server::new_async().await;
    mock_backends(&mut server, EMPTY_QUERY).await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(model_reply(&format!("Here you go:\n{}", call)))
        .create_async()
        .await;
    let add = server
        .mock("POST", format!("{}/c0ffee/add", COLLECTIONS).as_str())
        .match_body(Matcher::PartialJson(json!({
            "documents": ["write a greeting"],
            "metadatas": [{ "user_request": "write a greeting", "tool_call_json": call }]
        })))
        .with_status(201)
        .with_body("true")
        .expect(1)
        .create_async()
        .await;

    let ollama = Ollama::new(&server.url(), "llama3", "nomic-embed-text").unwrap();
    let memory = ChromaClient::connect(&server.url(), "lessons").await.unwrap();
    let mut agent = Agent::new(ollama.clone(), ollama, Some(memory), Approve, AgentOptions::default());

    assert_eq!(agent.toggle_training().await.unwrap(), TrainingToggle::Started);

    let turn = agent.prepare_tool_turn("write a greeting").await.unwrap();
    assert!(turn.recalled.is_empty());
    let report = agent.resolve_tool_turn(turn).await;

    assert!(matches!(report.outcome, TurnOutcome::Executed { ref tool, .. } if tool == "write_file"));
    assert_eq!(report.training, TrainingEvent::Captured);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "merhaba");

    match agent.toggle_training().await.unwrap() {
        TrainingToggle::Saved { lesson, .. } => {
            assert_eq!(lesson.user_request, "write a greeting");
            assert_eq!(lesson.tool_call_json, call);
        }
        other => panic!("unexpected toggle: {other:?}"),
    }
    add.assert_async().await;
}

#[tokio::test]
async fn test_recalled_lesson_is_sent_to_the_model() {
    let query = json!({
        "ids": [["lesson-1"]],
        "metadatas": [[{
            "user_request": "show the year",
            "tool_call_json": "{\"type\":\"tool_call\",\"tool_call\":{\"tool_name\":\"get_current_time\",\"params\":{\"format\":\"%Y\"}}}"
        }]],
        "distances": [[0.12]]
    })
    .to_string();

    let mut server = Server::new_async().await;
    mock_backends(&mut server, &query).await;
    let generate = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("SUCCESSFUL EXAMPLES".into()),
            Matcher::Regex("show the year".into()),
        ]))
        .with_status(200)
        .with_body(model_reply(
            r#"{"type":"tool_call","tool_call":{"tool_name":"get_current_time","params":{"format":"%Y"}}}"#,
        ))
        .expect(1)
        .create_async()
        .await;

    let ollama = Ollama::new(&server.url(), "llama3", "nomic-embed-text").unwrap();
    let memory = ChromaClient::connect(&server.url(), "lessons").await.unwrap();
    let mut agent = Agent::new(ollama.clone(), ollama, Some(memory), Approve, AgentOptions::default());

    let turn = agent.prepare_tool_turn("which year is it?").await.unwrap();
    assert_eq!(turn.recalled.len(), 1);
    assert!((turn.recalled[0].distance - 0.12).abs() < 1e-9);

    let report = agent.resolve_tool_turn(turn).await;
    match report.outcome {
        TurnOutcome::Executed { output, .. } => assert_eq!(output.len(), 4),
        other => panic!("unexpected outcome: {other:?}"),
    }
    generate.assert_async().await;
}

#[tokio::test]
async fn test_runs_without_memory_when_chroma_is_down() {
    assert!(ChromaClient::connect("http://127.0.0.1:9", "lessons").await.is_err());

    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(model_reply("Merhaba!"))
        .create_async()
        .await;

    let ollama = Ollama::new(&server.url(), "llama3", "nomic-embed-text").unwrap();
    let mut agent = Agent::new(
        ollama.clone(),
        ollama,
        None::<ChromaClient>,
        Approve,
        AgentOptions::default(),
    );

    assert!(!agent.has_memory());
    assert!(agent.toggle_training().await.is_err());
    assert_eq!(agent.handle_chat_input("selam").await.unwrap(), "Merhaba!");
}
