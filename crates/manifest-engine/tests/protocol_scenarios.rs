//! End-to-end protocol behaviour over a real filesystem store

use manifest_engine::{
    CallerInfo, EngineConfig, Operation, ProtocolEngine, RequestContext, IDENTITY_HEADER,
    INTERNAL_ERROR_MESSAGE,
};
use manifest_model::MAX_RECORD_NAME_LEN;
use manifest_store::RecordStore;
use manifest_test_utils::{
    FailOn, FailingStore, ParamsBuilder, TempStore, TestEngine, TOKEN_A, TOKEN_B,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Barrier};

fn ctx() -> RequestContext {
    RequestContext::new(
        CallerInfo::new()
            .with_remote_addr("10.0.0.4")
            .with_user("enroller")
            .with_agent("munki/6.4"),
    )
}

fn enroll(t: &TestEngine) -> u16 {
    t.engine
        .handle(&ParamsBuilder::enroll("C02TEST1", "Test-Mac", TOKEN_A).build(), &ctx())
        .status
}

/// Record written before identity tokens existed
const LEGACY: &[u8] = br#"{
  "record_name": "C02TEST1",
  "display_name": "Legacy",
  "catalogs": ["production"],
  "created_epoch": 1600000000,
  "created_date": "2020-09-13 12:26:40 UTC",
  "modified_epoch": 1600000000,
  "modified_date": "2020-09-13 12:26:40 UTC",
  "checkin_epoch": 1600000000,
  "checkin_date": "2020-09-13 12:26:40 UTC"
}"#;

fn strings<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[test]
fn enroll_fresh_record_uses_defaults() {
    let t = TestEngine::new();
    assert_eq!(enroll(&t), 201);

    let record = t.store.load("C02TEST1");
    assert_eq!(record.display_name().as_str(), "Test-Mac");
    assert_eq!(record.identity_token().map(|t| t.as_str()), Some(TOKEN_A));
    assert_eq!(strings(record.catalogs()), vec!["production"]);
    assert_eq!(strings(record.included_refs()), vec!["site_default"]);
    assert_eq!(record.created_at(), record.modified_at());
    assert_eq!(record.modified_at(), record.checked_in_at());
    assert_eq!(record.created_at().epoch, t.clock.epoch());
}

#[test]
fn enroll_twice_conflicts_and_leaves_store_alone() {
    let t = TestEngine::new();
    assert_eq!(enroll(&t), 201);
    let before = t.store.read_raw("C02TEST1").unwrap();

    t.clock.advance(60);
    let reply = t.engine.handle(
        &ParamsBuilder::enroll("C02TEST1", "Other-Mac", TOKEN_B).build(),
        &ctx(),
    );
    assert_eq!(reply.status, 409);
    assert_eq!(t.store.read_raw("C02TEST1").unwrap(), before);
    assert_eq!(t.store.entries(), vec!["C02TEST1"]);
}

#[test]
fn longest_valid_name_completes_every_operation() {
    let t = TestEngine::new();
    let name = "A".repeat(MAX_RECORD_NAME_LEN);

    let steps = [
        (ParamsBuilder::enroll(&name, "Test-Mac", TOKEN_A), 201),
        (ParamsBuilder::update(&name).uuid(TOKEN_A).display_name("Renamed"), 200),
        (ParamsBuilder::checkin(&name), 200),
        (ParamsBuilder::fetch(&name, TOKEN_A), 200),
    ];
    for (params, status) in steps {
        let reply = t.engine.handle(&params.build(), &ctx());
        assert_eq!(reply.status, status, "{}", String::from_utf8_lossy(&reply.body));
    }
    assert_eq!(t.store.load(&name).display_name().as_str(), "Renamed");
    assert_eq!(t.store.entries(), vec![name]);
}

#[test]
fn concurrent_enrolls_have_exactly_one_winner() {
    const N: usize = 12;
    let t = Arc::new(TestEngine::new());
    let barrier = Arc::new(Barrier::new(N));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let t = Arc::clone(&t);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let params =
                    ParamsBuilder::enroll("C02TEST1", &format!("Mac {i}"), TOKEN_A).build();
                barrier.wait();
                t.engine.handle(&params, &ctx()).status
            })
        })
        .collect();

    let mut statuses: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    statuses.sort_unstable();
    assert_eq!(statuses[0], 201);
    assert!(statuses[1..].iter().all(|s| *s == 409), "{statuses:?}");
    assert_eq!(t.store.entries(), vec!["C02TEST1"]);
}

#[test]
fn update_with_wrong_token_is_forbidden_and_byte_identical() {
    let t = TestEngine::new();
    enroll(&t);
    let before = t.store.read_raw("C02TEST1").unwrap();

    t.clock.advance(60);
    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1")
            .uuid(TOKEN_B)
            .display_name("Hijacked")
            .build(),
        &ctx(),
    );
    assert_eq!(reply.status, 403);
    assert_eq!(t.store.read_raw("C02TEST1").unwrap(), before);

    let body = reply.body_json().unwrap();
    assert_eq!(body["status"], "error");
    assert!(body.get("data").is_none());
}

#[test]
fn update_token_comparison_ignores_case() {
    let t = TestEngine::new();
    enroll(&t);
    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1")
            .uuid(&TOKEN_A.to_lowercase())
            .display_name("Renamed")
            .build(),
        &ctx(),
    );
    assert_eq!(reply.status, 200);
    assert_eq!(t.store.load("C02TEST1").display_name().as_str(), "Renamed");
}

#[test]
fn update_without_token_on_locked_record_is_forbidden() {
    let t = TestEngine::new();
    enroll(&t);
    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1").display_name("Renamed").build(),
        &ctx(),
    );
    assert_eq!(reply.status, 403);
}

#[test]
fn update_merges_supplied_over_stored() {
    let t = TestEngine::new();
    t.engine.handle(
        &ParamsBuilder::enroll("C02TEST1", "Test-Mac", TOKEN_A)
            .catalog(1, "testing")
            .manifest(2, "groups/lab")
            .build(),
        &ctx(),
    );
    let enrolled = t.store.load("C02TEST1");

    t.clock.advance(60);
    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1")
            .uuid(TOKEN_A)
            .catalog(1, "development")
            .catalog(2, "production")
            .build(),
        &ctx(),
    );
    assert_eq!(reply.status, 200);

    let updated = t.store.load("C02TEST1");
    assert_eq!(strings(updated.catalogs()), vec!["development", "production"]);
    assert_eq!(updated.display_name(), enrolled.display_name());
    assert_eq!(updated.included_refs(), enrolled.included_refs());
    assert_eq!(updated.created_at(), enrolled.created_at());
    assert_eq!(updated.modified_at().epoch, t.clock.epoch());
    assert_eq!(updated.checked_in_at().epoch, t.clock.epoch());

    let data = &reply.body_json().unwrap()["data"];
    assert_eq!(data["catalogs"], serde_json::json!(["development", "production"]));
    assert_eq!(data["manifests"], serde_json::json!(["site_default", "groups/lab"]));
}

#[test]
fn update_without_changes_keeps_modified_at() {
    let t = TestEngine::new();
    enroll(&t);
    let enrolled = t.store.load("C02TEST1");

    t.clock.advance(60);
    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1")
            .uuid(TOKEN_A)
            .display_name("Test-Mac")
            .build(),
        &ctx(),
    );
    assert_eq!(reply.status, 200);

    let updated = t.store.load("C02TEST1");
    assert_eq!(updated.modified_at(), enrolled.modified_at());
    assert!(updated.checked_in_at() > enrolled.checked_in_at());
}

#[test]
fn update_unknown_record_is_not_found() {
    let t = TestEngine::new();
    let reply = t.engine.handle(
        &ParamsBuilder::update("UNKNOWN").uuid(TOKEN_A).build(),
        &ctx(),
    );
    assert_eq!(reply.status, 404);
    assert!(t.store.entries().is_empty());
}

#[test]
fn update_self_inclusion_is_rejected() {
    let t = TestEngine::new();
    enroll(&t);
    let before = t.store.read_raw("C02TEST1").unwrap();
    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1")
            .uuid(TOKEN_A)
            .manifest(1, "C02TEST1")
            .build(),
        &ctx(),
    );
    assert_eq!(reply.status, 400);
    assert_eq!(t.store.read_raw("C02TEST1").unwrap(), before);
}

#[test]
fn checkin_only_moves_checked_in_at() {
    let t = TestEngine::new();
    enroll(&t);
    let before = t.store.load("C02TEST1");

    t.clock.advance(300);
    let reply = t
        .engine
        .handle(&ParamsBuilder::checkin("C02TEST1").build(), &ctx());
    assert_eq!(reply.status, 200);

    let after = t.store.load("C02TEST1");
    assert_eq!(after.display_name(), before.display_name());
    assert_eq!(after.catalogs(), before.catalogs());
    assert_eq!(after.included_refs(), before.included_refs());
    assert_eq!(after.identity_token(), before.identity_token());
    assert_eq!(after.modified_at(), before.modified_at());
    assert_eq!(after.modified_by(), before.modified_by());
    assert_eq!(after.checked_in_at().epoch, before.checked_in_at().epoch + 300);

    let data = &reply.body_json().unwrap()["data"];
    assert_eq!(data["recordname"], "C02TEST1");
    assert_eq!(data["checkin_date"], after.checked_in_at().human.as_str());
}

#[test]
fn checkin_unknown_record_is_not_found() {
    let t = TestEngine::new();
    let reply = t
        .engine
        .handle(&ParamsBuilder::checkin("UNKNOWN").build(), &ctx());
    assert_eq!(reply.status, 404);
    assert!(t.store.entries().is_empty());
}

#[test]
fn fetch_returns_document_with_identity_header() {
    let t = TestEngine::new();
    enroll(&t);
    let enrolled = t.store.load("C02TEST1");

    t.clock.advance(30);
    let reply = t.engine.handle(
        &ParamsBuilder::fetch("C02TEST1", &TOKEN_A.to_lowercase()).build(),
        &ctx(),
    );
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type, "application/json");
    assert_eq!(reply.header(IDENTITY_HEADER), Some(TOKEN_A));
    assert_eq!(reply.body, t.store.read_raw("C02TEST1").unwrap());
    assert!(reply.header("etag").unwrap().starts_with('"'));

    let fetched = t.store.load("C02TEST1");
    assert!(fetched.checked_in_at() > enrolled.checked_in_at());
}

#[test]
fn repeated_fetch_only_moves_checked_in_at() {
    let t = TestEngine::new();
    enroll(&t);
    let params = ParamsBuilder::fetch("C02TEST1", TOKEN_A).build();

    let mut previous = t.store.load("C02TEST1");
    for step in [0, 10, 0, 5] {
        t.clock.advance(step);
        assert_eq!(t.engine.handle(&params, &ctx()).status, 200);
        let current = t.store.load("C02TEST1");

        assert!(current.checked_in_at() >= previous.checked_in_at());
        assert_eq!(current.display_name(), previous.display_name());
        assert_eq!(current.catalogs(), previous.catalogs());
        assert_eq!(current.included_refs(), previous.included_refs());
        assert_eq!(current.identity_token(), previous.identity_token());
        assert_eq!(current.modified_at(), previous.modified_at());
        previous = current;
    }
}

#[test]
fn fetch_with_wrong_token_leaks_nothing() {
    let t = TestEngine::new();
    enroll(&t);
    let before = t.store.read_raw("C02TEST1").unwrap();

    let reply = t
        .engine
        .handle(&ParamsBuilder::fetch("C02TEST1", TOKEN_B).build(), &ctx());
    assert_eq!(reply.status, 403);
    assert!(reply.header(IDENTITY_HEADER).is_none());
    let body = String::from_utf8(reply.body).unwrap();
    assert!(!body.contains("Test-Mac"));
    assert!(!body.contains(TOKEN_A));
    assert_eq!(t.store.read_raw("C02TEST1").unwrap(), before);
}

#[test]
fn fetch_never_adopts_a_token() {
    let t = TestEngine::new();
    let tokenless = br#"{
  "record_name": "C02TEST1",
  "display_name": "Legacy",
  "identity_token": "",
  "catalogs": ["production"],
  "included_manifests": ["site_default"],
  "managed_installs": [],
  "created_epoch": 1600000000,
  "created_date": "2020-09-13 12:26:40 UTC",
  "modified_epoch": 1600000000,
  "modified_date": "2020-09-13 12:26:40 UTC",
  "checkin_epoch": 1600000000,
  "checkin_date": "2020-09-13 12:26:40 UTC"
}
"#;
    std::fs::write(t.store.path().join("C02TEST1"), tokenless).unwrap();

    let reply = t
        .engine
        .handle(&ParamsBuilder::fetch("C02TEST1", TOKEN_A).build(), &ctx());
    assert_eq!(reply.status, 403);
    assert_eq!(t.store.read_raw("C02TEST1").unwrap(), tokenless.to_vec());
}

#[test]
fn update_adopts_token_on_tokenless_record() {
    let t = TestEngine::new();
    std::fs::write(
        t.store.path().join("C02TEST1"),
        LEGACY,
    )
    .unwrap();

    let reply = t
        .engine
        .handle(&ParamsBuilder::update("C02TEST1").uuid(TOKEN_A).build(), &ctx());
    assert_eq!(reply.status, 200);
    assert_eq!(
        t.store.load("C02TEST1").identity_token().map(|t| t.as_str()),
        Some(TOKEN_A)
    );

    let reply = t
        .engine
        .handle(&ParamsBuilder::update("C02TEST1").uuid(TOKEN_B).build(), &ctx());
    assert_eq!(reply.status, 403);
}

#[test]
fn update_tokenless_record_without_token_proceeds() {
    let t = TestEngine::new();
    std::fs::write(
        t.store.path().join("C02TEST1"),
        LEGACY,
    )
    .unwrap();

    let reply = t.engine.handle(
        &ParamsBuilder::update("C02TEST1").display_name("Named").build(),
        &ctx(),
    );
    assert_eq!(reply.status, 200);
    let record = t.store.load("C02TEST1");
    assert!(record.identity_token().is_none());
    assert_eq!(record.display_name().as_str(), "Named");
}

#[test]
fn unknown_fields_survive_writes() {
    let t = TestEngine::new();
    enroll(&t);
    let path = t.store.path().join("C02TEST1");
    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    doc["managed_installs"] = serde_json::json!(["Firefox"]);
    doc["site_notes"] = serde_json::json!("rack 4");
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    t.engine
        .handle(&ParamsBuilder::checkin("C02TEST1").build(), &ctx());

    let after: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(after["managed_installs"], serde_json::json!(["Firefox"]));
    assert_eq!(after["site_notes"], "rack 4");
}

#[test]
fn invalid_names_rejected_before_store_access() {
    let dir = TempStore::new();
    let store = FailingStore::new(dir.store(), FailOn::Reads);
    let engine = ProtocolEngine::new(EngineConfig::default(), store).unwrap();

    for name in ["../etc/passwd", "/etc/passwd", "a/b", "C02 TEST", "", "..", "%2e%2e"] {
        for function in ["enroll", "update", "checkin", "fetch"] {
            let params = ParamsBuilder::enroll(name, "Mac", TOKEN_A)
                .function(function)
                .build();
            let reply = engine.handle(&params, &ctx());
            assert_eq!(reply.status, 400, "{function} {name:?}");
        }
    }
    assert!(dir.entries().is_empty());
}

#[test]
fn self_inclusion_on_enroll_creates_nothing() {
    let t = TestEngine::new();
    let reply = t.engine.handle(
        &ParamsBuilder::enroll("C02TEST1", "Test-Mac", TOKEN_A)
            .manifest(1, "C02TEST1")
            .build(),
        &ctx(),
    );
    assert_eq!(reply.status, 400);
    assert!(t.store.entries().is_empty());
}

#[test]
fn store_failure_is_generic_500() {
    let dir = TempStore::new();
    let audit = Arc::new(manifest_engine::MemoryAuditSink::new());
    let store = FailingStore::new(dir.store(), FailOn::Writes);
    let engine = ProtocolEngine::new(EngineConfig::default(), store)
        .unwrap()
        .with_audit(audit.clone());

    let reply = engine.handle(
        &ParamsBuilder::enroll("C02TEST1", "Test-Mac", TOKEN_A).build(),
        &ctx(),
    );
    assert_eq!(reply.status, 500);
    let body = reply.body_json().unwrap();
    assert_eq!(body["message"], INTERNAL_ERROR_MESSAGE);
    assert!(!String::from_utf8_lossy(&reply.body).contains("injected"));

    let event = audit.last().unwrap();
    assert_eq!(event.status, 500);
    assert_eq!(event.operation, Some(Operation::Enroll));
    assert!(event.detail.contains("injected failure"));
    assert!(dir.entries().is_empty());
}

#[test]
fn malformed_stored_document_is_500() {
    let t = TestEngine::new();
    std::fs::write(t.store.path().join("C02TEST1"), b"<?xml version=\"1.0\"?>").unwrap();
    let reply = t
        .engine
        .handle(&ParamsBuilder::checkin("C02TEST1").build(), &ctx());
    assert_eq!(reply.status, 500);
}

#[test]
fn every_request_is_audited_once() {
    let t = TestEngine::new();
    enroll(&t);
    t.engine
        .handle(&ParamsBuilder::checkin("C02TEST1").build(), &ctx());
    t.engine
        .handle(&ParamsBuilder::fetch("C02TEST1", TOKEN_B).build(), &ctx());
    t.engine
        .handle(&ParamsBuilder::checkin("UNKNOWN").build(), &ctx());

    let statuses: Vec<_> = t.audit.events().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![201, 200, 403, 404]);
    assert!(t
        .audit
        .events()
        .iter()
        .all(|e| e.caller == "ip=10.0.0.4 xff=- user=enroller agent=munki/6.4"));
}

#[test]
fn enroll_records_caller_in_document() {
    let t = TestEngine::new();
    enroll(&t);
    let record = t.engine.store().load(&"C02TEST1".parse().unwrap()).unwrap();
    assert_eq!(
        record.created_by(),
        "ip=10.0.0.4 xff=- user=enroller agent=munki/6.4"
    );
}
