//! End-to-end tests of the analysis engine over the in-memory remote fakes.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ad_censor::config::Config;
use ad_censor::engine::{Engine, EngineError, CANCELLED, NOTHING_SUBMITTED, NOT_CONFIGURED};
use ad_censor::index::IndexError;
use ad_censor::models::AnalysisRequest;
use ad_censor::remote::memory::{InMemoryKnowledgeService, ScriptedVision, DEFAULT_REPLY};
use ad_censor::remote::{labels, KnowledgeService, RemoteError, VisionModel};

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    knowledge: Arc<InMemoryKnowledgeService>,
    vision: Arc<ScriptedVision>,
    engine: Engine,
}

impl Fixture {
    fn new() -> Self {
        Self::with_vision(ScriptedVision::default())
    }

    fn with_vision(vision: ScriptedVision) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let knowledge = Arc::new(InMemoryKnowledgeService::new());
        let vision = Arc::new(vision);
        let engine = Engine::new(
            &Config::default(),
            Some(knowledge.clone() as Arc<dyn KnowledgeService>),
            Some(vision.clone() as Arc<dyn VisionModel>),
        );
        Self {
            _dir: dir,
            root,
            knowledge,
            vision,
            engine,
        }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn image(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        image::RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }
}

#[tokio::test]
async fn nothing_submitted_makes_no_remote_calls() {
    let mut fx = Fixture::new();

    let reply = fx.engine.analyze("   ", None).await;

    assert_eq!(reply, NOTHING_SUBMITTED);
    assert_eq!(fx.knowledge.total_calls(), 0);
    assert_eq!(fx.vision.calls(), 0);
}

#[tokio::test]
async fn missing_image_falls_back_to_text_flow() {
    let mut fx = Fixture::new();
    let missing = fx.root.join("gone.png");

    let reply = fx.engine.analyze("Лучший кофе в городе!", Some(missing.as_path())).await;

    assert_eq!(reply, DEFAULT_REPLY);
    assert_eq!(fx.vision.calls(), 0);
    let messages = fx.knowledge.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("\"\"\"\nЛучший кофе в городе!\n\"\"\""));
    assert!(messages[0].ends_with("[Документов в базе знаний: 0]"));
}

#[tokio::test]
async fn directory_as_image_falls_back_to_text_flow() {
    let mut fx = Fixture::new();
    let folder = fx.root.join("banners");
    std::fs::create_dir(&folder).unwrap();

    let reply = fx.engine.analyze("Лучший кофе", Some(folder.as_path())).await;

    assert_eq!(reply, DEFAULT_REPLY);
    assert_eq!(fx.vision.calls(), 0);
    assert_eq!(fx.knowledge.messages().len(), 1);
}

#[tokio::test]
async fn missing_image_without_text_is_nothing_submitted() {
    let mut fx = Fixture::new();
    let missing = fx.root.join("gone.png");

    assert_eq!(fx.engine.analyze("", Some(missing.as_path())).await, NOTHING_SUBMITTED);
    assert_eq!(fx.knowledge.total_calls(), 0);
}

#[tokio::test]
async fn image_flow_embeds_description_and_text() {
    let mut fx = Fixture::new();
    let image = fx.image("banner.png");
    let doc = fx.write("38-FZ.txt", "Статья 5. Общие требования к рекламе.");
    fx.engine.add_document(&doc).await.unwrap();

    let reply = fx.engine.analyze("Скидка 50%", Some(image.as_path())).await;

    assert_eq!(reply, DEFAULT_REPLY);
    assert_eq!(fx.vision.calls(), 1);
    let query = &fx.knowledge.messages()[0];
    assert!(query.contains(ScriptedVision::DEFAULT_DESCRIPTION));
    assert!(query.contains("ТЕКСТ РЕКЛАМЫ:\n\"\"\"\nСкидка 50%\n\"\"\""));
    assert!(query.ends_with("[Документов в базе знаний: 1]"));
}

#[tokio::test]
async fn vision_failure_skips_the_agent() {
    let mut fx = Fixture::with_vision(ScriptedVision::new(vec![Err(RemoteError::status(
        403,
        "API key not valid for Gemini",
    ))]));
    let image = fx.image("banner.png");

    let reply = fx.engine.analyze("", Some(image.as_path())).await;

    assert!(reply.starts_with("Ошибка описания изображения (Gemini):\n"), "{}", reply);
    assert!(reply.contains("API key not valid for Gemini"));
    assert_eq!(fx.knowledge.agent_calls(), 0);
}

#[tokio::test]
async fn unconfigured_engine_refuses_work() {
    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("law.txt");
    std::fs::write(&doc, "Статья 1.").unwrap();
    let mut engine = Engine::new(&Config::default(), None, None);

    assert!(!engine.is_configured());
    assert_eq!(engine.analyze("", None).await, NOTHING_SUBMITTED);
    assert_eq!(engine.analyze("Реклама", None).await, NOT_CONFIGURED);
    assert!(matches!(
        engine.add_document(&doc).await,
        Err(EngineError::NotConfigured)
    ));
    engine.remove_document("law.txt").await;
    engine.clear_all_documents().await;
    assert!(engine.list_document_names().is_empty());
    assert_eq!(engine.document_count(), 0);
    assert_eq!(engine.test_connection().await, NOT_CONFIGURED);
}

#[tokio::test]
async fn documents_are_listed_sorted_with_chunks() {
    let mut fx = Fixture::new();
    let b = fx.write("koap.txt", "Статья 14.3. Нарушение законодательства о рекламе.");
    let a = fx.write("38-FZ.txt", "Статья 5. Общие требования к рекламе.");

    let results = fx.engine.add_documents(&[b, a]).await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(fx.engine.list_document_names(), vec!["38-FZ.txt", "koap.txt"]);
    assert_eq!(fx.engine.document_count(), 2);
    let chunks = fx.engine.chunks("koap.txt").unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, "koap.txt");
    assert!(fx.engine.chunks("missing.txt").is_none());
}

#[tokio::test]
async fn batch_continues_past_failures() {
    let mut fx = Fixture::new();
    let good = fx.write("law.txt", "Статья 1.");
    let bad = fx.write("law.rtf", "{\\rtf1}");

    let results = fx.engine.add_documents(&[bad.clone(), good.clone()]).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, bad);
    assert!(matches!(results[0].1, Err(EngineError::Load(_))));
    assert_eq!(results[1].1.as_deref().unwrap(), "law.txt");
    // Unsupported files never reach the remote store.
    assert_eq!(fx.knowledge.calls("upload_file"), 1);
}

#[tokio::test]
async fn indexing_failure_keeps_document() {
    let mut fx = Fixture::new();
    fx.knowledge.fail_operations("file is too large");
    let doc = fx.write("law.txt", "Статья 1.");

    let err = fx.engine.add_document(&doc).await.unwrap_err();

    assert!(matches!(err, EngineError::Index(IndexError::Indexing { .. })));
    assert_eq!(fx.engine.list_document_names(), vec!["law.txt"]);
    assert!(fx.engine.chunks("law.txt").is_some());
}

#[tokio::test]
async fn upload_failure_carries_hint() {
    let mut fx = Fixture::new();
    fx.knowledge
        .fail("upload_file", RemoteError::status(401, "api key expired"));
    let doc = fx.write("law.txt", "Статья 1.");

    let err = fx.engine.add_document(&doc).await.unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("Ошибка загрузки файла 'law.txt':\nНе авторизован."));
    assert!(fx.engine.list_document_names().is_empty());
    assert!(fx.engine.chunks("law.txt").is_none());
}

#[tokio::test]
async fn assistant_is_rebuilt_only_after_changes() {
    let mut fx = Fixture::new();
    let doc = fx.write("law.txt", "Статья 1.");

    fx.engine.analyze("первый", None).await;
    fx.engine.analyze("второй", None).await;
    assert_eq!(fx.knowledge.calls("create_assistant"), 1);

    fx.engine.add_document(&doc).await.unwrap();
    fx.engine.analyze("третий", None).await;
    assert_eq!(fx.knowledge.calls("create_assistant"), 2);
    assert_eq!(fx.knowledge.calls("delete_assistant"), 1);

    let assistants = fx.knowledge.assistants();
    assert_eq!(assistants.len(), 1);
    assert!(assistants[0].1.search_index.is_some());

    fx.engine.remove_document("law.txt").await;
    fx.engine.analyze("четвёртый", None).await;
    assert_eq!(fx.knowledge.calls("create_assistant"), 3);
    assert_eq!(fx.knowledge.calls("delete_assistant"), 2);
}

#[tokio::test]
async fn clear_all_discards_assistant_and_index() {
    let mut fx = Fixture::new();
    let doc = fx.write("law.txt", "Статья 1.");
    fx.engine.add_document(&doc).await.unwrap();
    fx.engine.analyze("Реклама", None).await;

    fx.engine.clear_all_documents().await;

    assert!(fx.knowledge.assistants().is_empty());
    assert!(fx.knowledge.index_ids().is_empty());
    assert_eq!(fx.knowledge.file_count(), 0);
    assert_eq!(fx.engine.document_count(), 0);
    assert!(fx.engine.chunks("law.txt").is_none());
}

#[tokio::test]
async fn restore_adopts_previous_session() {
    let knowledge = Arc::new(InMemoryKnowledgeService::new());
    knowledge.seed_index(labels("app", "ad_censor"), &["38-FZ.pdf"]);
    let mut engine = Engine::new(
        &Config::default(),
        Some(knowledge.clone() as Arc<dyn KnowledgeService>),
        None,
    );

    engine.restore().await;

    assert_eq!(engine.list_document_names(), vec!["38-FZ.pdf"]);
    assert!(engine.chunks("38-FZ.pdf").is_none());
    let reply = engine.analyze("Реклама", None).await;
    assert_eq!(reply, DEFAULT_REPLY);
    assert!(knowledge.messages()[0].ends_with("[Документов в базе знаний: 1]"));
}

#[tokio::test]
async fn cancelled_request_returns_cancelled_message() {
    let mut fx = Fixture::new();
    let image = fx.image("banner.png");
    let token = CancellationToken::new();
    token.cancel();

    let reply = fx
        .engine
        .analyze_with_cancel(AnalysisRequest::new("Реклама", Some(image)), token)
        .await;

    assert_eq!(reply, CANCELLED);
    assert_eq!(fx.vision.calls(), 0);
    assert_eq!(fx.knowledge.agent_calls(), 0);
}

#[tokio::test]
async fn vision_model_switch() {
    let mut fx = Fixture::new();
    let image = fx.image("banner.png");

    assert_eq!(fx.engine.vision_model(), "gemini-2.0-flash");
    fx.engine.set_vision_model("gemini-2.5-flash");
    fx.engine.analyze("", Some(image.as_path())).await;

    assert_eq!(fx.vision.models(), vec!["gemini-2.5-flash".to_string()]);
}

#[tokio::test]
async fn connection_report_lists_failed_probe() {
    let fx = Fixture::new();
    assert_eq!(fx.engine.test_connection().await, "ok");

    fx.knowledge
        .fail("list_files", RemoteError::status(403, "folder access denied"));
    let report = fx.engine.test_connection().await;

    assert!(report.contains("[FAIL] Файлы (files.list)"));
    assert!(report.contains("[OK] Индексы (search_indexes.list)"));
    assert!(report.contains("ai.assistants.editor"));
}

#[tokio::test]
async fn analysis_errors_are_reported_as_text() {
    let mut fx = Fixture::new();
    fx.knowledge
        .fail("create_thread", RemoteError::status(429, "quota"));

    let reply = fx.engine.analyze("Реклама", None).await;

    assert!(reply.starts_with("Ошибка анализа через YandexGPT:\nЛимит исчерпан."));
}
