use std::{
    collections::{
        BTreeMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use serde_json::json;

use super::{
    media::{
        build_plan,
        MediaUpload,
    },
    sync::{
        AssetFetcher,
        CardOutcome,
        FailureKind,
        NoteTransport,
        SkipReason,
        SyncOrchestrator,
        SyncPersistence,
    },
    types::{
        BuiltFields,
        FieldMapping,
    },
};
use crate::{
    core::{
        Card,
        CardId,
        Definition,
        SyncError,
    },
    render::placeholder::{
        contains_placeholder,
        image_token,
        AUDIO_TOKEN,
    },
};

#[derive(Default)]
struct MockTransport {
    failing_notes: HashSet<i64>,
    hanging_notes: HashSet<i64>,
    failing_media: HashSet<String>,
    updates: Mutex<Vec<(i64, BTreeMap<String, String>)>>,
    stored: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NoteTransport for MockTransport {
    async fn send_update(
        &self,
        note_id: i64,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SyncError> {
        if self.hanging_notes.contains(&note_id) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.updates.lock().unwrap().push((note_id, fields.clone()));
        if self.failing_notes.contains(&note_id) {
            return Err(SyncError::Anki(format!("note was not found: {}", note_id)));
        }
        Ok(())
    }

    async fn store_media(&self, filename: &str, url: &str) -> Result<(), SyncError> {
        if self.failing_media.contains(filename) {
            return Err(SyncError::Anki("failed to download".to_string()));
        }
        self.stored.lock().unwrap().push((filename.to_string(), url.to_string()));
        Ok(())
    }
}

struct EchoFetcher;

#[async_trait]
impl AssetFetcher for EchoFetcher {
    async fn resolve_upload_url(&self, upload: &MediaUpload) -> Result<String, SyncError> {
        Ok(format!("https://assets.test/{}", upload.source_path))
    }
}

struct HangingFetcher;

#[async_trait]
impl AssetFetcher for HangingFetcher {
    async fn resolve_upload_url(&self, upload: &MediaUpload) -> Result<String, SyncError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(format!("https://assets.test/{}", upload.source_path))
    }
}

#[derive(Default)]
struct MockPersistence {
    calls: Mutex<Vec<(Vec<CardId>, DateTime<Utc>)>>,
}

#[async_trait]
impl SyncPersistence for MockPersistence {
    async fn mark_synced(&self, card_ids: &[CardId], at: DateTime<Utc>) -> Result<(), SyncError> {
        self.calls.lock().unwrap().push((card_ids.to_vec(), at));
        Ok(())
    }
}

fn card(expression: &str, note_id: Option<i64>) -> Card {
    let mut card = Card::new(expression);
    card.reading = Some("よみ".to_string());
    card.anki_note_id = note_id;
    card.definitions = vec![Definition::simple("meaning").with_dictionary("JMdict")];
    card
}

fn orchestrator(transport: Arc<MockTransport>) -> SyncOrchestrator {
    SyncOrchestrator::new(transport, Arc::new(EchoFetcher), FieldMapping::mining_defaults())
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_skip_succeed_fail_partition() {
    let transport = Arc::new(MockTransport { failing_notes: HashSet::from([3]), ..Default::default() });
    let a = card("A", None);
    let b = card("B", Some(2));
    let c = card("C", Some(3));

    let report = orchestrator(transport.clone()).sync_batch(&[a.clone(), b.clone(), c.clone()]).await;

    assert_eq!(report.results.len(), 3);
    assert_eq!(
        report.outcome(a.id),
        Some(&CardOutcome::Skipped { reason: SkipReason::NotSynced })
    );
    assert_eq!(report.outcome(b.id), Some(&CardOutcome::Succeeded));
    match report.outcome(c.id) {
        Some(CardOutcome::Failed { reason }) => {
            assert_eq!(reason.kind, FailureKind::Transport);
            assert!(reason.message.contains("note was not found"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    // The skipped card never reaches the transport
    let sent: Vec<i64> = transport.updates.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(sent, vec![2, 3]);

    let persistence = MockPersistence::default();
    assert_eq!(report.persist(&persistence, now()).await.unwrap(), 1);
    let calls = persistence.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (vec![b.id], now()));
}

#[tokio::test]
async fn test_no_persistence_call_when_nothing_succeeds() {
    let transport = Arc::new(MockTransport { failing_notes: HashSet::from([7]), ..Default::default() });

    let report = orchestrator(transport).sync_batch(&[card("A", None), card("B", Some(7))]).await;

    let persistence = MockPersistence::default();
    assert_eq!(report.persist(&persistence, now()).await.unwrap(), 0);
    assert!(persistence.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_batch() {
    let transport = Arc::new(MockTransport::default());
    let report = orchestrator(transport.clone()).sync_batch(&[]).await;
    assert!(report.results.is_empty());
    assert!(transport.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_media_is_uploaded_and_placeholders_resolved() {
    let transport = Arc::new(MockTransport::default());
    let mut with_media = card("猫", Some(10));
    with_media.expression_audio = Some("jpod/猫.opus".to_string());
    with_media.definitions = vec![
        Definition::structured(json!({"tag": "img", "path": "img/cat.png"})).with_dictionary("A"),
        Definition::structured(json!({"tag": "img", "path": "img/cat.png"})).with_dictionary("B"),
    ];

    let report = orchestrator(transport.clone()).sync_batch(&[with_media.clone()]).await;
    assert_eq!(report.outcome(with_media.id), Some(&CardOutcome::Succeeded));

    let stored = transport.stored.lock().unwrap();
    // audio plus one picture per dictionary; main and glossary share uploads
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().any(|(name, url)| {
        name == "jreader_audio_jpod_猫_opus.ogg" && url == "https://assets.test/jpod/猫.opus"
    }));

    let updates = transport.updates.lock().unwrap();
    let (_, fields) = &updates[0];
    for value in fields.values() {
        assert!(!contains_placeholder(value), "placeholder sent: {}", value);
    }
    assert_eq!(fields["ExpressionAudio"], "[sound:jreader_audio_jpod_猫_opus.ogg]");
}

#[tokio::test]
async fn test_failed_media_upload_fails_only_that_card() {
    let mut broken = card("壊", Some(1));
    broken.expression_audio = Some("broken.opus".to_string());
    let healthy = card("元気", Some(2));

    let transport = Arc::new(MockTransport {
        failing_media: HashSet::from(["jreader_audio_broken_opus.ogg".to_string()]),
        ..Default::default()
    });

    let report = orchestrator(transport.clone()).sync_batch(&[broken.clone(), healthy.clone()]).await;

    match report.outcome(broken.id) {
        Some(CardOutcome::Failed { reason }) => {
            assert_eq!(reason.kind, FailureKind::Media);
            assert!(reason.message.contains("jreader_audio_broken_opus.ogg"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.outcome(healthy.id), Some(&CardOutcome::Succeeded));

    // The broken card's update was never sent
    let sent: Vec<i64> = transport.updates.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(sent, vec![2]);
}

#[tokio::test]
async fn test_transport_timeout() {
    let transport = Arc::new(MockTransport { hanging_notes: HashSet::from([5]), ..Default::default() });
    let slow = card("遅", Some(5));
    let fast = card("速", Some(6));

    let report = orchestrator(transport)
        .with_timeout(Duration::from_millis(50))
        .sync_batch(&[slow.clone(), fast.clone()])
        .await;

    match report.outcome(slow.id) {
        Some(CardOutcome::Failed { reason }) => assert_eq!(reason.kind, FailureKind::Timeout),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.outcome(fast.id), Some(&CardOutcome::Succeeded));
}

#[tokio::test]
async fn test_concurrent_batch_keeps_input_order() {
    let transport = Arc::new(MockTransport { failing_notes: HashSet::from([4]), ..Default::default() });
    let cards: Vec<Card> = (0..8).map(|i| card(&format!("語{}", i), Some(i))).collect();

    let report = orchestrator(transport).with_concurrency(4).sync_batch(&cards).await;

    let ids: Vec<CardId> = report.results.iter().map(|r| r.card_id).collect();
    let expected: Vec<CardId> = cards.iter().map(|c| c.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(report.succeeded_ids().len(), 7);
    assert_eq!(report.failed().count(), 1);
}

#[tokio::test]
async fn test_skipped_field_is_not_sent() {
    let transport = Arc::new(MockTransport::default());
    let mapping = FieldMapping::new().with("Front", "{expression}").with("Back", "none");
    let orchestrator = SyncOrchestrator::new(transport.clone(), Arc::new(EchoFetcher), mapping);

    orchestrator.sync_batch(&[card("犬", Some(1))]).await;

    let updates = transport.updates.lock().unwrap();
    let (_, fields) = &updates[0];
    assert_eq!(fields.len(), 1);
    assert_eq!(fields["Front"], "犬");
}

#[tokio::test]
async fn test_hanging_asset_resolution_times_out() {
    let transport = Arc::new(MockTransport::default());
    let mut with_audio = card("音", Some(1));
    with_audio.expression_audio = Some("jpod/音.opus".to_string());
    let without_media = card("無", Some(2));

    let orchestrator = SyncOrchestrator::new(
        transport.clone(),
        Arc::new(HangingFetcher),
        FieldMapping::mining_defaults(),
    )
    .with_timeout(Duration::from_millis(50));

    let report = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.sync_batch(&[with_audio.clone(), without_media.clone()]),
    )
    .await
    .expect("batch should finish once each call times out");

    match report.outcome(with_audio.id) {
        Some(CardOutcome::Failed { reason }) => assert_eq!(reason.kind, FailureKind::Timeout),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.outcome(without_media.id), Some(&CardOutcome::Succeeded));

    let sent: Vec<i64> = transport.updates.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(sent, vec![2]);
}

#[tokio::test]
async fn test_token_lookalike_text_is_left_alone() {
    let transport = Arc::new(MockTransport::default());
    let mut plain = card("注", Some(1));
    plain.definitions = vec![Definition::simple("see __JREADER_AUDIO__ note").with_dictionary("JMdict")];
    let mut with_audio = card("音", Some(2));
    with_audio.expression_audio = Some("jpod/音.opus".to_string());
    with_audio.sentence = Some(format!("{} in a sentence", AUDIO_TOKEN));

    let report = orchestrator(transport.clone()).sync_batch(&[plain.clone(), with_audio.clone()]).await;

    assert_eq!(report.outcome(plain.id), Some(&CardOutcome::Succeeded));
    assert_eq!(report.outcome(with_audio.id), Some(&CardOutcome::Succeeded));

    let updates = transport.updates.lock().unwrap();
    for (_, fields) in updates.iter() {
        for value in fields.values() {
            assert!(!contains_placeholder(value), "placeholder sent: {}", value);
        }
    }
    assert!(updates[0].1["Glossary"].contains("&#95;_JREADER_AUDIO__"));
    // Only the audio field points at the stored file; the sentence keeps its text
    assert_eq!(updates[1].1["Sentence"], "&#95;_JREADER_AUDIO__ in a sentence");
    assert_eq!(updates[1].1["ExpressionAudio"], "[sound:jreader_audio_jpod_音_opus.ogg]");
}

#[tokio::test]
async fn test_unplanned_placeholder_withholds_update() {
    let transport = Arc::new(MockTransport::default());
    let orchestrator = orchestrator(transport.clone());
    let stray = card("迷", Some(9));
    let plan = build_plan(&stray, &[]);
    let mut built = BuiltFields::default();
    built.fields.insert("Front".to_string(), "迷".to_string());
    built.fields.insert("Back".to_string(), format!("<img src=\"{}\">", image_token("X", 3)));

    let outcome = orchestrator.push_fields(9, built, &plan).await;

    match outcome {
        CardOutcome::Failed { reason } => {
            assert_eq!(reason.kind, FailureKind::UnresolvedPlaceholder);
            assert!(reason.message.contains("Back"));
            assert!(!reason.message.contains("Front"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(transport.updates.lock().unwrap().is_empty());
}
