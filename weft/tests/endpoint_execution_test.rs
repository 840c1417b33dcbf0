// Endpoint execution tests
//
// End-to-end runs through the executor with a scripted provider: the
// validation feedback loop, the preview/apply split, skill learning,
// iteration exhaustion, and code-mode execution.

use std::sync::Arc;

use weft::progress::ProgressSink;
use weft::provider::ScriptedProvider;
use weft::schema::{FieldKind, FieldSpec, TargetSchema};
use weft::transform::{ChunkConfig, OutputCardinality, TransformMode};
use weft::{EndpointDefinition, EndpointExecutor, ExecuteOptions};
use weft_graph::{GraphError, GraphStore, MemoryGraphStore, Workflow};

fn endpoint() -> EndpointDefinition {
    EndpointDefinition {
        name: "contacts".to_string(),
        description: None,
        instruction: "Extract people from the export".to_string(),
        schema: TargetSchema::new(
            "person",
            vec![
                FieldSpec::required("temp_id", FieldKind::String),
                FieldSpec::required("title", FieldKind::String),
            ],
        ),
        mode: TransformMode::Direct,
        cardinality: OutputCardinality::RecordStream,
        chunking: None,
        input_files: vec![],
        code_command: None,
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<MemoryGraphStore>,
    provider: Arc<ScriptedProvider>,
    executor: EndpointExecutor,
    workflow_id: String,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryGraphStore::new());
    let workflow = store.create_workflow(Workflow::new("crm")).unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    let executor = EndpointExecutor::new(
        provider.clone(),
        Arc::clone(&store) as Arc<dyn GraphStore>,
        dir.path(),
    );
    Harness {
        _dir: dir,
        store,
        provider,
        executor,
        workflow_id: workflow.id,
    }
}

const VALID_REPLY: &str = r#"[OUTPUT][
    {"temp_id": "t1", "type": "Person", "title": "Ada Lovelace"}
][/OUTPUT]"#;

#[tokio::test]
async fn test_validation_failure_feeds_back_then_succeeds(
) -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    // First attempt misses the required temp_id field
    h.provider
        .push(r#"[OUTPUT][{"title": "Ada Lovelace"}][/OUTPUT]"#);
    h.provider.push(VALID_REPLY);

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        apply: true,
        ..ExecuteOptions::default()
    };
    let result = h
        .executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await?;

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.applied.as_ref().unwrap().counts.nodes_created, 1);

    // The retry prompt carried the violation back to the agent
    let prompts = h.provider.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Validation failed"));
    assert!(prompts[1].contains("temp_id"));

    let nodes = h.store.nodes_in_workflow(&h.workflow_id)?;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].title, "Ada Lovelace");
    Ok(())
}

#[tokio::test]
async fn test_preview_without_apply_leaves_store_untouched(
) -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    h.provider.push(VALID_REPLY);

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        apply: false,
        ..ExecuteOptions::default()
    };
    let result = h
        .executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await?;

    assert!(result.success);
    let preview = result.preview.expect("preview");
    assert_eq!(preview.projected.nodes_created, 1);
    assert!(result.applied.is_none());
    assert!(h.store.nodes_in_workflow(&h.workflow_id)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_learn_persists_a_skill() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    h.provider.push(format!(
        "[NOTE]names live in the second column[/NOTE]\n{}",
        VALID_REPLY
    ));

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        learn: true,
        ..ExecuteOptions::default()
    };
    let result = h
        .executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await?;

    assert!(result.success);
    let skill = result.skill.expect("skill");
    let doc = std::fs::read_to_string(&skill.doc_path)?;
    assert!(doc.contains("Extract people from the export"));
    assert!(doc.contains("names live in the second column"));
    Ok(())
}

#[tokio::test]
async fn test_iteration_exhaustion_is_a_run_failure() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    // Both turns produce invalid artifacts
    h.provider
        .push(r#"[OUTPUT][{"title": "no id"}][/OUTPUT]"#);
    h.provider
        .push(r#"[OUTPUT][{"title": "still no id"}][/OUTPUT]"#);

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        max_iterations: Some(2),
        ..ExecuteOptions::default()
    };
    let result = h
        .executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await?;

    assert!(!result.success);
    assert!(result.errors[0].contains("iteration budget"));
    assert!(result.preview.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unknown_workflow_is_structural() {
    let h = harness();
    h.provider.push(VALID_REPLY);

    let options = ExecuteOptions {
        workflow_id: Some("wf-missing".to_string()),
        ..ExecuteOptions::default()
    };
    let err = h
        .executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::WorkflowNotFound(_)));
    // Failed before spending a model call
    assert_eq!(h.provider.request_count(), 0);
}

#[tokio::test]
async fn test_code_mode_runs_the_program() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    // With `cat` as the interpreter, the program text itself is the artifact
    h.provider.push(
        r#"[PROGRAM][{"temp_id": "t1", "type": "Person", "title": "Grace Hopper"}][/PROGRAM]"#,
    );

    let mut endpoint = endpoint();
    endpoint.mode = TransformMode::Code;
    endpoint.code_command = Some("cat".to_string());

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        apply: true,
        ..ExecuteOptions::default()
    };
    let result = h
        .executor
        .execute(&endpoint, &options, &ProgressSink::disabled())
        .await?;

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.manifest.as_ref().unwrap().item_count, 1);
    let nodes = h.store.nodes_in_workflow(&h.workflow_id)?;
    assert_eq!(nodes[0].title, "Grace Hopper");
    Ok(())
}

#[tokio::test]
async fn test_unvalidated_chunks_never_reach_the_graph() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    // Missing the required title. With per-chunk validation off, the
    // merged artifact's own validation pass is the only gate left.
    h.provider
        .push(r#"[OUTPUT][{"temp_id": "t1", "type": "Person"}][/OUTPUT]"#);

    let mut endpoint = endpoint();
    endpoint.chunking = Some(ChunkConfig {
        validate_each_chunk: false,
        ..ChunkConfig::default()
    });

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        apply: true,
        ..ExecuteOptions::default()
    };
    let result = h
        .executor
        .execute(&endpoint, &options, &ProgressSink::disabled())
        .await?;

    assert!(!result.success);
    assert!(result.errors[0].contains("failed schema validation"));
    assert!(!result.manifest.expect("manifest").validation_passed);
    // Invalid data was never previewed, applied, or stored
    assert!(result.preview.is_none());
    assert!(result.applied.is_none());
    assert!(h.store.nodes_in_workflow(&h.workflow_id)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rerun_is_idempotent_through_the_matcher() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness();
    h.provider.push(VALID_REPLY);
    h.provider.push(VALID_REPLY);

    let options = ExecuteOptions {
        workflow_id: Some(h.workflow_id.clone()),
        apply: true,
        ..ExecuteOptions::default()
    };
    h.executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await?;
    let second = h
        .executor
        .execute(&endpoint(), &options, &ProgressSink::disabled())
        .await?;

    // Identical title and no property changes: skipped, not duplicated
    let counts = &second.applied.as_ref().unwrap().counts;
    assert_eq!(counts.nodes_created, 0);
    assert_eq!(counts.nodes_skipped, 1);
    assert_eq!(h.store.nodes_in_workflow(&h.workflow_id)?.len(), 1);
    Ok(())
}
