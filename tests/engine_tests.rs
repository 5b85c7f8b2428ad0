// Integration tests for the streaming turn pipeline
//
// Wire the real resolver, session registry, segmenter and event envelope
// together over in-memory collaborators: a scripted generator, a memory
// catalog and a memory vector index. No network, no model server.

use std::sync::Arc;

use agrichat::api::app_state::AppState;
use agrichat::api::events::{ChatEvent, EventSink};
use agrichat::api::ws::process_turn;
use agrichat::catalog::{CatalogData, CatalogStore, MemoryCatalogStore};
use agrichat::config::AppConfig;
use agrichat::error::{AppError, Result};
use agrichat::generation::{GenerateOptions, ScriptedGenerator, TokenGenerator};
use agrichat::index::{MemoryVectorIndex, SemanticIndex, SimpleEmbeddingModel};
use agrichat::models::{Organization, Product};
use agrichat::observability::AppMetrics;
use agrichat::services::handlers::SpecialRouter;
use agrichat::services::intent::{IntentClassifier, LlmIntentClassifier};
use agrichat::services::resolver::HybridContextResolver;
use agrichat::services::session::SessionRegistry;

/// Collects every emitted event in memory.
struct VecSink {
    events: Vec<ChatEvent>,
}

impl VecSink {
    fn new() -> Self {
        Self { events: Vec::new() }
    }

    fn chunks(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Chunk { content } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EventSink for VecSink {
    async fn emit(&mut self, event: ChatEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

/// Simulates a client that disconnects after a fixed number of events.
struct DroppingSink {
    events: Vec<ChatEvent>,
    fail_after: usize,
}

#[async_trait::async_trait]
impl EventSink for DroppingSink {
    async fn emit(&mut self, event: ChatEvent) -> Result<()> {
        if self.events.len() >= self.fail_after {
            return Err(AppError::Connection("client gone".into()));
        }
        self.events.push(event);
        Ok(())
    }
}

fn product(code: &str, name: &str) -> Product {
    Product {
        code: code.into(),
        name: name.into(),
        url: Some(format!("https://nnx.vn/{}", code.to_lowercase())),
        ingredients: Some("N-P-K 16-16-8".into()),
        usage: Some("Pha 10g với 8 lít nước, tưới gốc".into()),
        category: Some("Phân bón".into()),
    }
}

fn catalog() -> Arc<dyn CatalogStore> {
    Arc::new(MemoryCatalogStore::new(CatalogData {
        products: vec![
            product("ABC123", "Phân bón lá ABC"),
            product("NPK01", "Phân bón NPK cao cấp"),
            product("HCVS2", "Phân hữu cơ vi sinh"),
        ],
        organization: Some(Organization {
            name: Some("Nông Nghiệp Xanh".into()),
            hotline: Some("0900 123 456".into()),
            website: Some("https://nnx.vn/".into()),
            ..Default::default()
        }),
        experts: vec![],
    }))
}

async fn build_state(chat_generator: Arc<ScriptedGenerator>) -> AppState {
    let config = AppConfig::development();

    let catalog = catalog();

    let index = MemoryVectorIndex::new(Box::new(SimpleEmbeddingModel::new(128)));
    index
        .add_document("phân bón hữu cơ giúp cải tạo đất, tăng độ phì nhiêu")
        .await
        .unwrap();
    let index: Arc<dyn SemanticIndex> = Arc::new(index);

    // Classification runs over a generator whose replies never parse, so
    // every turn takes the deterministic keyword fallback.
    let classifier_generator: Arc<dyn TokenGenerator> = Arc::new(ScriptedGenerator::new(""));
    let classifier: Arc<dyn IntentClassifier> = Arc::new(LlmIntentClassifier::new(
        classifier_generator,
        &config.generator,
    ));

    let resolver = Arc::new(HybridContextResolver::new(
        classifier,
        catalog.clone(),
        index,
        config.retrieval.clone(),
    ));

    AppState::new(
        Arc::new(SessionRegistry::new(&config.session)),
        resolver,
        chat_generator,
        Arc::new(SpecialRouter::standard(catalog)),
        AppMetrics::default(),
        GenerateOptions::from_config(&config.generator),
        "Nông Nghiệp Xanh".into(),
        config.session.synthetic_chunk_chars,
    )
}

#[tokio::test]
async fn test_envelope_order_and_turn_persistence() {
    let generator = Arc::new(ScriptedGenerator::new(""));
    generator.push_reply("Dạ, chào anh chị. Em có thể giúp gì ạ?");
    let state = build_state(generator).await;

    let session = state.registry.get_or_create("s1");
    let mut guard = session.lock().await;
    let mut sink = VecSink::new();

    process_turn(&state, &mut guard, &mut sink, "xin chào")
        .await
        .unwrap();

    assert_eq!(sink.events.first(), Some(&ChatEvent::Start));
    assert_eq!(sink.events.last(), Some(&ChatEvent::End));
    assert_eq!(
        sink.chunks(),
        vec!["Dạ, chào anh chị.", "Em có thể giúp gì ạ?"]
    );

    let turns = guard.turns_snapshot();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_text, "xin chào");
    assert_eq!(
        turns[0].assistant_text,
        "Dạ, chào anh chị. Em có thể giúp gì ạ?"
    );
}

#[tokio::test]
async fn test_generation_failure_emits_error_then_end_and_persists_partial() {
    let generator = Arc::new(ScriptedGenerator::new(""));
    generator.push_failure("Dạ, em kiểm tra nhé. Sau đó thì", "model backend down");
    let state = build_state(generator).await;

    let session = state.registry.get_or_create("s1");
    let mut guard = session.lock().await;
    let mut sink = VecSink::new();

    process_turn(&state, &mut guard, &mut sink, "phân bón lá dùng sao")
        .await
        .unwrap();

    let has_error = sink
        .events
        .iter()
        .any(|e| matches!(e, ChatEvent::Error { .. }));
    assert!(has_error);
    assert_eq!(sink.events.last(), Some(&ChatEvent::End));

    // Only the sentence completed before the failure is persisted.
    let turns = guard.turns_snapshot();
    assert_eq!(turns[0].assistant_text, "Dạ, em kiểm tra nhé.");
}

#[tokio::test]
async fn test_disconnect_mid_generation_persists_emitted_sentences() {
    let generator = Arc::new(ScriptedGenerator::new(""));
    generator.push_reply("Câu thứ nhất xong rồi. Câu thứ hai cũng xong. Câu ba nữa.");
    let state = build_state(generator).await;

    let session = state.registry.get_or_create("s1");
    let mut guard = session.lock().await;
    // Allow start + one chunk, then the client vanishes.
    let mut sink = DroppingSink {
        events: Vec::new(),
        fail_after: 2,
    };

    let outcome = process_turn(&state, &mut guard, &mut sink, "kể tiếp đi").await;
    assert!(outcome.is_err());

    // No end event reached the client, but the turn still landed with the
    // sentence that was actually delivered.
    assert!(!sink.events.iter().any(|e| matches!(e, ChatEvent::End)));
    let turns = guard.turns_snapshot();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].assistant_text, "Câu thứ nhất xong rồi.");
}

#[tokio::test]
async fn test_entity_memory_carries_across_turns() {
    let generator = Arc::new(ScriptedGenerator::new("Dạ vâng ạ."));
    let state = build_state(generator).await;

    let session = state.registry.get_or_create("s1");

    {
        let mut guard = session.lock().await;
        let mut sink = VecSink::new();
        process_turn(
            &state,
            &mut guard,
            &mut sink,
            "thành phần của ABC123 là gì",
        )
        .await
        .unwrap();
        assert_eq!(guard.entity_memory(), Some("ABC123"));
    }

    {
        // Elliptical follow-up with a product intent but no product name.
        let mut guard = session.lock().await;
        let mut sink = VecSink::new();
        process_turn(&state, &mut guard, &mut sink, "liều lượng pha như thế nào")
            .await
            .unwrap();
        assert_eq!(guard.entity_memory(), Some("ABC123"));
        assert_eq!(guard.turns_snapshot().len(), 2);
    }
}

#[tokio::test]
async fn test_rapid_succession_turns_do_not_race() {
    let generator = Arc::new(ScriptedGenerator::new("Dạ vâng ạ."));
    let state = Arc::new(build_state(generator).await);

    let session = state.registry.get_or_create("s1");

    let mut tasks = Vec::new();
    for text in ["tin nhắn một", "tin nhắn hai"] {
        let state = state.clone();
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            let mut guard = session.lock().await;
            let mut sink = VecSink::new();
            process_turn(&state, &mut guard, &mut sink, text)
                .await
                .unwrap();
            // Events stay well-formed under contention.
            assert_eq!(sink.events.first(), Some(&ChatEvent::Start));
            assert_eq!(sink.events.last(), Some(&ChatEvent::End));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Both turns landed; neither update was lost.
    let guard = session.lock().await;
    let turns = guard.turns_snapshot();
    assert_eq!(turns.len(), 2);
    let users: Vec<String> = turns.iter().map(|t| t.user_text.clone()).collect();
    assert!(users.contains(&"tin nhắn một".to_string()));
    assert!(users.contains(&"tin nhắn hai".to_string()));
}

#[tokio::test]
async fn test_catalog_count_short_circuit_skips_generator() {
    // The scripted generator would answer with this sentinel if consulted.
    let generator = Arc::new(ScriptedGenerator::new("SENTINEL"));
    let state = build_state(generator).await;

    let session = state.registry.get_or_create("s1");
    let mut guard = session.lock().await;
    let mut sink = VecSink::new();

    process_turn(
        &state,
        &mut guard,
        &mut sink,
        "bên bạn có bao nhiêu sản phẩm",
    )
    .await
    .unwrap();

    assert_eq!(sink.events.first(), Some(&ChatEvent::Start));
    assert_eq!(sink.events.last(), Some(&ChatEvent::End));

    let turns = guard.turns_snapshot();
    assert!(turns[0].assistant_text.contains("3 sản phẩm"));
    assert!(!turns[0].assistant_text.contains("SENTINEL"));
}

#[tokio::test]
async fn test_malformed_payload_answered_with_clarification() {
    let generator = Arc::new(ScriptedGenerator::new("SENTINEL"));
    let state = build_state(generator).await;

    let session = state.registry.get_or_create("s1");
    let mut guard = session.lock().await;
    let mut sink = VecSink::new();

    process_turn(
        &state,
        &mut guard,
        &mut sink,
        r#"{"type": "unknown_kind", "blob": 1}"#,
    )
    .await
    .unwrap();

    // The turn is answered with a clarification and the session stays usable.
    assert_eq!(sink.events.last(), Some(&ChatEvent::End));
    assert_eq!(guard.turns_snapshot().len(), 1);

    let mut sink = VecSink::new();
    process_turn(&state, &mut guard, &mut sink, "xin chào")
        .await
        .unwrap();
    assert_eq!(guard.turns_snapshot().len(), 2);
}
