//! End-to-end flow: rules on disk → payload assembly → reply restoration.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sheet_assist::coordinator::ChatCoordinator;
use sheet_assist::error::CompletionError;
use sheet_assist::host::StaticSheetData;
use sheet_assist::llm::CompletionClient;
use sheet_assist::masking::{MaskingEngine, RuleStore};
use sheet_assist::paths::DataPaths;
use sheet_assist::reference::ReferenceResolver;
use sheet_assist::session::SessionStore;
use sheet_assist::settings::Settings;

struct EchoClient {
    payloads: Mutex<Vec<String>>,
}

impl EchoClient {
    fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionClient for EchoClient {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        _system: &str,
        payload: &str,
        _model: &str,
    ) -> Result<String, CompletionError> {
        self.payloads.lock().unwrap().push(payload.to_string());
        // The service echoes placeholders and reference ids verbatim.
        Ok("Per __COMPANY_1__, the value in @range_ref(#R1) looks right.".to_string())
    }
}

fn build_stack(
    paths: &DataPaths,
    client: Arc<EchoClient>,
) -> (Arc<MaskingEngine>, ChatCoordinator) {
    let masking = Arc::new(MaskingEngine::open(RuleStore::with_legacy(
        paths.rules_file(),
        paths.legacy_rules_file(),
    )));
    let mut data = StaticSheetData::new();
    data.insert("Sheet1!A1", "Acme Corp\t42");
    let resolver = Arc::new(ReferenceResolver::new(Arc::clone(&masking), Arc::new(data)));
    let coordinator = ChatCoordinator::new(
        Arc::clone(&masking),
        resolver,
        SessionStore::new(paths.sessions_dir()),
        Settings::load(paths),
        client as Arc<dyn CompletionClient>,
    );
    (masking, coordinator)
}

#[tokio::test]
async fn masked_payload_goes_out_and_reply_comes_back_restored() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = DataPaths::with_root(tmp.path());
    paths.ensure();

    let client = Arc::new(EchoClient::new());
    let (masking, coordinator) = build_stack(&paths, Arc::clone(&client));
    masking.add_rule("Acme Corp", "company").unwrap();

    let reply = coordinator
        .send("check @range(Sheet1,A1) for Acme Corp", None)
        .await
        .unwrap();

    // The reply is unmasked; the reference id is left as-is.
    assert_eq!(
        reply,
        "Per Acme Corp, the value in @range_ref(#R1) looks right."
    );

    let payloads = client.payloads.lock().unwrap();
    let payload = payloads.last().unwrap();
    assert!(payload.contains("#R1 = Sheet1!A1"));
    assert!(payload.contains("__COMPANY_1__\t42"));
    assert!(payload.contains("check @range_ref(#R1) for __COMPANY_1__"));
    assert!(!payload.contains("Acme Corp"));
    assert!(payload.contains("[target]\nnone"));
}

#[tokio::test]
async fn preview_then_commit_allocate_identical_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = DataPaths::with_root(tmp.path());
    paths.ensure();

    let client = Arc::new(EchoClient::new());
    let (_masking, coordinator) = build_stack(&paths, Arc::clone(&client));

    let preview = coordinator.preview("see @range(Sheet1,A1)", None);
    assert_eq!(preview.references[0].ref_id, "R1");
    assert!(client.payloads.lock().unwrap().is_empty());

    coordinator
        .send("see @range(Sheet1,A1)", None)
        .await
        .unwrap();
    let payloads = client.payloads.lock().unwrap();
    assert!(payloads.last().unwrap().contains("#R1 = Sheet1!A1"));
}

#[tokio::test]
async fn rules_persist_across_restart_and_legacy_files_migrate() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = DataPaths::with_root(tmp.path());
    paths.ensure();

    // A rule file written by the previous placeholder format.
    std::fs::write(paths.rules_file(), r#"{"Acme Corp":"[COMPANY_1]"}"#).unwrap();

    let client = Arc::new(EchoClient::new());
    let (masking, coordinator) = build_stack(&paths, Arc::clone(&client));

    // Migrated on load, effective immediately.
    assert_eq!(masking.mask("Acme Corp"), "__COMPANY_1__");
    let on_disk = std::fs::read_to_string(paths.rules_file()).unwrap();
    assert!(on_disk.contains("__COMPANY_1__"));

    // And the session history lands on disk after a send.
    coordinator.send("hello", None).await.unwrap();
    let store = SessionStore::new(paths.sessions_dir());
    let ids = store.list_ids();
    assert_eq!(ids.len(), 1);
    let session = store.load(&ids[0]).unwrap().unwrap();
    assert_eq!(session.messages.len(), 2);
}
