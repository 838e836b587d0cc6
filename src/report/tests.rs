use super::*;
use crate::database::VectorIndex;
use crate::database::memory::MemoryIndex;
use crate::events::ProgressEvent;
use crate::llm::CompletionService;
use crate::llm::scripted::ScriptedCompletion;
use futures::StreamExt;
use tempfile::TempDir;

const YES: &str = r#"{"Result":{"Result":"Yes"},"Reason":{"Reason":"fully covered"}}"#;
const NO: &str = r#"{"Result":"No","Reason":"missing band"}"#;

fn record(id: &str, text: &str, vector: [f32; 3]) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        text: text.to_string(),
        vector: vector.to_vec(),
    }
}

fn requirements() -> Vec<VectorRecord> {
    vec![
        record("REQ-1", "Support n77", [1.0, 0.0, 0.0]),
        record("REQ-2", "Support n78", [0.0, 1.0, 0.0]),
        record("REQ-3", "Support MIMO", [0.0, 0.0, 1.0]),
    ]
}

fn descriptions() -> Vec<VectorRecord> {
    vec![
        record("D-1", "Radio supports n77", [0.9, 0.1, 0.0]),
        record("D-2", "Radio supports n78", [0.1, 0.9, 0.0]),
        record("D-3", "4x4 MIMO", [0.0, 0.1, 0.9]),
    ]
}

struct Harness {
    _dir: TempDir,
    index: Arc<MemoryIndex>,
    service: Arc<ScriptedCompletion>,
    bus: Arc<EventBus>,
    pipeline: ReportPipeline,
}

fn harness(index: MemoryIndex, service: ScriptedCompletion) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let index = Arc::new(index);
    let service = Arc::new(service);
    let bus = Arc::new(EventBus::new());

    let settings = PipelineSettings {
        requirements: "requirement".to_string(),
        descriptions: "description".to_string(),
        events: "events".to_string(),
        search: SearchParams {
            search_breadth: 200,
            exact: false,
        },
        export_path: dir.path().join("reports").join("Results-LLM.csv"),
    };
    let pipeline = ReportPipeline::new(
        VectorMatchStore::new(Arc::clone(&index) as Arc<dyn VectorIndex>),
        ComplianceJudge::with_default_template(
            Arc::clone(&service) as Arc<dyn CompletionService>
        ),
        Arc::clone(&bus),
        settings,
    );

    Harness {
        _dir: dir,
        index,
        service,
        bus,
        pipeline,
    }
}

async fn drained(bus: &EventBus) -> Vec<EventKind> {
    bus.mark_done();
    let events: Vec<ProgressEvent> = bus.drain().expect("drain").collect().await;
    events.into_iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn one_row_per_requirement_in_order() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements())
        .with_collection("description", descriptions());
    let service = ScriptedCompletion::new().respond(YES).respond(NO).respond(YES);
    let h = harness(index, service);

    let report = h.pipeline.run().await.expect("run should succeed");

    let ids: Vec<&str> = report.rows.iter().map(|r| r.requirement_id.as_str()).collect();
    assert_eq!(ids, vec!["REQ-1", "REQ-2", "REQ-3"]);

    let matched: Vec<Option<&str>> = report
        .rows
        .iter()
        .map(|r| r.description_id.as_deref())
        .collect();
    assert_eq!(matched, vec![Some("D-1"), Some("D-2"), Some("D-3")]);

    assert_eq!(report.rows[0].result, RowResult::Judged(Verdict::Yes));
    assert_eq!(report.rows[0].reason.as_deref(), Some("fully covered"));
    assert_eq!(report.rows[1].result, RowResult::Judged(Verdict::No));
    assert_eq!(h.pipeline.state(), RunState::Done);
    assert_eq!(h.service.prompts().len(), 3);

    let exported = std::fs::read_to_string(&report.export_path).expect("export exists");
    let lines: Vec<&str> = exported.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "Requirement ID,Requirement Text,Description ID,Description Text,Similarity Score,Result,Reason"
    );
    assert!(lines[2].starts_with("REQ-2,Support n78,D-2,Radio supports n78,"));
    assert!(lines[2].ends_with(",No,missing band"));
}

#[tokio::test]
async fn no_candidates_gives_no_match_rows_without_reasoning() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements()[..1].to_vec())
        .with_collection("description", Vec::new());
    let h = harness(index, ScriptedCompletion::new());

    let report = h.pipeline.run().await.expect("run should succeed");

    let row = &report.rows[0];
    assert_eq!(row.result, RowResult::NoMatch);
    assert_eq!(row.result.to_string(), "no match");
    assert!(row.description_id.is_none());
    assert!(row.description_text.is_none());
    assert!(row.similarity_score.is_none());
    assert!(h.service.prompts().is_empty());

    let kinds = drained(&h.bus).await;
    assert!(kinds.contains(&EventKind::RetrievalEnd {
        requirement_index: 0,
        requirement_id: "REQ-1".to_string(),
        matched: false,
    }));
    assert!(!kinds.iter().any(|k| matches!(
        k,
        EventKind::ReasoningStart { .. } | EventKind::ReasoningEnd { .. }
    )));
}

#[tokio::test]
async fn unreadable_judgment_does_not_stop_the_run() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements()[..2].to_vec())
        .with_collection("description", descriptions());
    let service = ScriptedCompletion::new()
        .respond("definitely not json")
        .respond(YES);
    let h = harness(index, service);

    let report = h.pipeline.run().await.expect("run should succeed");

    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].result, RowResult::Judged(Verdict::NotAvailable));
    assert!(
        report.rows[0]
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("not valid JSON"))
    );
    assert_eq!(report.rows[1].result, RowResult::Judged(Verdict::Yes));
}

#[tokio::test]
async fn missing_requirements_collection_aborts_without_export() {
    let index = MemoryIndex::new().with_collection("description", descriptions());
    let h = harness(index, ScriptedCompletion::new());
    let export_path = h.pipeline.settings().export_path.clone();

    let err = h.pipeline.run().await.expect_err("run should fail");

    assert!(matches!(
        err,
        ReportError::Configuration {
            stage: RunStage::LoadRequirements,
            ..
        }
    ));
    assert!(!export_path.exists());
    assert_eq!(h.pipeline.state(), RunState::Aborted);
}

#[tokio::test]
async fn missing_descriptions_collection_aborts_without_export() {
    let index = MemoryIndex::new().with_collection("requirement", requirements());
    let h = harness(index, ScriptedCompletion::new());
    let export_path = h.pipeline.settings().export_path.clone();

    let err = h.pipeline.run().await.expect_err("run should fail");

    assert!(matches!(err, ReportError::Configuration { .. }));
    assert!(err.to_string().contains("description"));
    assert!(!export_path.exists());
}

#[tokio::test]
async fn empty_requirements_collection_is_a_configuration_error() {
    let index = MemoryIndex::new()
        .with_collection("requirement", Vec::new())
        .with_collection("description", descriptions());
    let h = harness(index, ScriptedCompletion::new());

    let err = h.pipeline.run().await.expect_err("run should fail");
    assert!(matches!(err, ReportError::Configuration { .. }));
}

#[tokio::test]
async fn completion_failure_mid_run_aborts_without_export() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements())
        .with_collection("description", descriptions());
    let service = ScriptedCompletion::new()
        .respond(YES)
        .fail("model crashed");
    let h = harness(index, service);
    let export_path = h.pipeline.settings().export_path.clone();

    let err = h.pipeline.run().await.expect_err("run should fail");

    match err {
        ReportError::ServiceFailure {
            stage,
            requirement_id,
            ..
        } => {
            assert_eq!(stage, RunStage::Judge);
            assert_eq!(requirement_id.as_deref(), Some("REQ-2"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!export_path.exists());
    assert_eq!(h.pipeline.state(), RunState::Aborted);
}

#[tokio::test]
async fn search_failure_aborts_with_requirement_id() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements())
        .with_collection("description", descriptions())
        .failing_search_after(1);
    let h = harness(index, ScriptedCompletion::new().respond(YES));

    let err = h.pipeline.run().await.expect_err("run should fail");

    assert!(matches!(
        err,
        ReportError::ServiceFailure {
            stage: RunStage::Retrieve,
            requirement_id: Some(ref id),
            ..
        } if id == "REQ-2"
    ));
    assert_eq!(h.index.search_count(), 2);
}

#[tokio::test]
async fn phase_events_are_ordered_per_requirement() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements()[..1].to_vec())
        .with_collection("description", descriptions());
    let h = harness(index, ScriptedCompletion::new().respond(YES));

    let report = h.pipeline.run().await.expect("run should succeed");
    let kinds = drained(&h.bus).await;

    let id = "REQ-1".to_string();
    assert_eq!(
        kinds,
        vec![
            EventKind::Retrieve {
                query: Some("requirement".to_string()),
                source_count: 0,
            },
            EventKind::Retrieve {
                query: Some("requirement".to_string()),
                source_count: 1,
            },
            EventKind::RetrievalStart {
                requirement_index: 0,
                requirement_id: id.clone(),
            },
            EventKind::RetrievalEnd {
                requirement_index: 0,
                requirement_id: id.clone(),
                matched: true,
            },
            EventKind::ReasoningStart {
                requirement_index: 0,
                requirement_id: id.clone(),
            },
            EventKind::ReasoningEnd {
                requirement_index: 0,
                requirement_id: id,
            },
            EventKind::ReportReady {
                path: report.export_path.display().to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn event_log_is_reset_and_written() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements()[..2].to_vec())
        .with_collection("description", descriptions());
    let h = harness(index, ScriptedCompletion::new().respond(YES).respond(YES));

    h.pipeline.run().await.expect("first run");
    let first_run = h.index.events("events");

    let texts: Vec<&str> = first_run.iter().map(|e| e.event_text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Retrieving Context for Requirement 1...",
            "Reasoning with Context for Requirement 1...",
            "Retrieving Context for Requirement 2...",
            "Reasoning with Context for Requirement 2...",
            "Results-LLM.csv",
        ]
    );
    assert_eq!(first_run[0].request_id, "REQ-1");
    assert!(first_run.iter().all(|e| e.uuid == h.bus.run_id().to_string()));
}

#[tokio::test]
async fn event_log_failures_do_not_stop_the_run() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements()[..1].to_vec())
        .with_collection("description", descriptions())
        .failing_event_writes();
    let h = harness(index, ScriptedCompletion::new().respond(YES));

    let report = h.pipeline.run().await.expect("run should succeed");
    assert_eq!(report.rows.len(), 1);
}

#[tokio::test]
async fn tally_counts_results() {
    let index = MemoryIndex::new()
        .with_collection("requirement", requirements())
        .with_collection("description", descriptions());
    let service = ScriptedCompletion::new().respond(YES).respond(NO).respond(YES);
    let h = harness(index, service);

    let report = h.pipeline.run().await.expect("run should succeed");
    let tally = report.tally();

    assert_eq!(tally.get(&RowResult::Judged(Verdict::Yes)), Some(&2));
    assert_eq!(tally.get(&RowResult::Judged(Verdict::No)), Some(&1));
    assert_eq!(tally.get(&RowResult::NoMatch), None);
}

#[test]
fn service_failure_message_names_the_requirement() {
    let with_id = ReportError::ServiceFailure {
        stage: RunStage::Judge,
        requirement_id: Some("REQ-2".to_string()),
        source: anyhow::anyhow!("connection refused"),
    };
    assert_eq!(
        with_id.to_string(),
        "Service failure during judge of requirement REQ-2: connection refused"
    );

    let without_id = ReportError::ServiceFailure {
        stage: RunStage::LoadRequirements,
        requirement_id: None,
        source: anyhow::anyhow!("timed out"),
    };
    assert_eq!(
        without_id.to_string(),
        "Service failure during load requirements: timed out"
    );
}
