//! End-to-end migration verification over JSON exports: the invariants a
//! migration must preserve and the failures it must surface.

use aim_core::{EntityKind, RawDataset};
use aim_crypto::{FernetKey, KeyRing};
use aim_verify::{EquivalenceIssue, IntegrityIssueKind, MigrationVerifier};
use proptest::prelude::*;
use serde_json::{json, Value};

const CURRENT_KEY: &str = "Jw4Ff1BWLnSykdfXDVOuEJCG6m9dyST5B1VhU_qg0fI=";

fn ring() -> KeyRing {
    KeyRing::from_base64_keys([CURRENT_KEY]).unwrap()
}

fn claude(id: i64, name: &str, token: String, enabled: i64) -> Value {
    json!({
        "id": id, "name": name, "url": "https://api.anthropic.com",
        "token": token, "timeout": 30000, "auto_update": 1,
        "type": "public_welfare", "enabled": enabled,
        "opus_model": "claude-opus", "sonnet_model": "claude-sonnet", "haiku_model": "claude-haiku",
        "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
    })
}

fn codex(id: i64, name: &str, token: String) -> Value {
    json!({
        "id": id, "name": name, "url": "https://api.openai.com",
        "token": token, "type": "paid", "enabled": 0,
        "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
    })
}

fn config(id: i64, key: &str, value: &str) -> Value {
    json!({
        "id": id, "key": key, "value": value, "description": null,
        "category": "general", "is_active": 1,
        "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
    })
}

fn mcp(id: i64, name: &str) -> Value {
    json!({
        "id": id, "name": name, "type": "stdio", "timeout": 30000,
        "command": "npx", "args": ["-y", name], "env": {"DEBUG": "1"}, "enabled": 1,
        "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
    })
}

fn export(
    claude: Vec<Value>,
    codex: Vec<Value>,
    mcp: Vec<Value>,
    configs: Vec<Value>,
) -> RawDataset {
    RawDataset::from_json_document(&json!({
        "version": "1.0.0",
        "claude_providers": claude,
        "codex_providers": codex,
        "agent_guides": [{
            "id": 1, "name": "default", "type": "only", "text": "Be concise.",
            "created_at": null, "updated_at": null
        }],
        "mcp_servers": mcp,
        "common_configs": configs,
    }))
    .unwrap()
}

#[test]
fn test_faithful_migration_under_fresh_ivs_succeeds() {
    let r = ring();
    let source = export(
        vec![claude(1, "primary", r.encode(b"sk-ant-1"), 1), claude(2, "backup", r.encode(b"sk-ant-2"), 0)],
        vec![codex(1, "openai", r.encode(b"sk-openai"))],
        vec![mcp(1, "filesystem")],
        vec![config(1, "version", "1.0.0"), config(2, "theme", "dark")],
    );
    // Re-encrypted, reordered, re-numbered.
    let migrated = export(
        vec![claude(10, "backup", r.encode(b"sk-ant-2"), 0), claude(11, "primary", r.encode(b"sk-ant-1"), 1)],
        vec![codex(4, "openai", r.encode(b"sk-openai"))],
        vec![mcp(9, "filesystem")],
        vec![config(7, "theme", "dark"), config(8, "version", "1.0.0")],
    );
    let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
    assert!(report.overall_success, "{:#?}", report);
}

#[test]
fn test_two_enabled_claude_providers_fail_singleton() {
    let r = ring();
    let raw = export(
        vec![claude(1, "a", r.encode(b"x"), 1), claude(2, "b", r.encode(b"y"), 1)],
        vec![],
        vec![],
        vec![config(1, "version", "1.0.0")],
    );
    let inspection = MigrationVerifier::new().inspect(&raw, Some(&r)).unwrap();
    let claude = inspection.integrity.entity(EntityKind::ClaudeProvider).unwrap();
    assert!(!claude.success);
    assert!(claude.issues.iter().any(|i| matches!(
        &i.kind,
        IntegrityIssueKind::MultipleEnabled { count: 2, record_ids } if record_ids == &vec![1, 2]
    )));
}

#[test]
fn test_duplicate_config_key_detected() {
    let raw = export(
        vec![],
        vec![],
        vec![],
        vec![config(1, "version", "1.0.0"), config(2, "version", "1.0.1")],
    );
    let inspection = MigrationVerifier::new().inspect(&raw, None).unwrap();
    let configs = inspection.integrity.entity(EntityKind::CommonConfig).unwrap();
    assert!(configs.issues.iter().any(|i| i.kind
        == IntegrityIssueKind::DuplicateKey {
            key: "version".into(),
            count: 2
        }));
    assert!(!inspection.success);
}

#[test]
fn test_dropped_row_fails_only_its_collection() {
    let r = ring();
    let configs = vec![config(1, "version", "1.0.0")];
    let source = export(
        vec![claude(1, "a", r.encode(b"x"), 1)],
        vec![codex(1, "c1", r.encode(b"1")), codex(2, "c2", r.encode(b"2")), codex(3, "c3", r.encode(b"3"))],
        vec![],
        configs.clone(),
    );
    let migrated = export(
        vec![claude(1, "a", r.encode(b"x"), 1)],
        vec![codex(1, "c1", r.encode(b"1")), codex(2, "c2", r.encode(b"2"))],
        vec![],
        configs,
    );
    let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
    assert!(!report.overall_success);

    let codex = report.equivalence.collection(EntityKind::CodexProvider).unwrap();
    assert_eq!(
        codex.issues,
        vec![EquivalenceIssue::CardinalityMismatch {
            expected: 3,
            actual: 2
        }]
    );
    let configs = report.equivalence.collection(EntityKind::CommonConfig).unwrap();
    assert!(configs.matches);
    assert_eq!(configs.matched, vec!["version"]);
    assert!(report.schema.all_tables_exist());
    assert!(report.integrity.all_checks_pass());
}

#[test]
fn test_dropped_claude_provider_fails_only_its_collection() {
    let r = ring();
    let codex_rows = vec![codex(1, "openai", r.encode(b"sk-openai"))];
    let configs = vec![config(1, "version", "1.0.0")];
    let source = export(
        vec![claude(1, "primary", r.encode(b"sk-ant-1"), 1), claude(2, "backup", r.encode(b"sk-ant-2"), 0)],
        codex_rows.clone(),
        vec![mcp(1, "filesystem")],
        configs.clone(),
    );
    let migrated = export(
        vec![claude(1, "primary", r.encode(b"sk-ant-1"), 1)],
        codex_rows,
        vec![mcp(1, "filesystem")],
        configs,
    );
    let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
    assert!(!report.overall_success);
    assert!(!report.equivalence.all_collections_match);

    let claude = report.equivalence.collection(EntityKind::ClaudeProvider).unwrap();
    assert_eq!(
        claude.issues,
        vec![EquivalenceIssue::CardinalityMismatch {
            expected: 2,
            actual: 1
        }]
    );
    for kind in [EntityKind::CodexProvider, EntityKind::McpServer, EntityKind::CommonConfig] {
        assert!(report.equivalence.collection(kind).unwrap().matches, "{kind}");
    }
}

/// Exports produced without surrogate ids carry `"id": null` or omit it.
fn without_id(mut row: Value, omit: bool) -> Value {
    if let Some(obj) = row.as_object_mut() {
        if omit {
            obj.remove("id");
        } else {
            obj.insert("id".into(), Value::Null);
        }
    }
    row
}

#[test]
fn test_export_without_ids_verifies() {
    let r = ring();
    let source = export(
        vec![claude(1, "primary", r.encode(b"sk-ant-1"), 1)],
        vec![codex(1, "openai", r.encode(b"sk-openai"))],
        vec![mcp(1, "filesystem")],
        vec![config(1, "version", "1.0.0"), config(2, "theme", "dark")],
    );
    let migrated = export(
        vec![without_id(claude(1, "primary", r.encode(b"sk-ant-1"), 1), false)],
        vec![without_id(codex(1, "openai", r.encode(b"sk-openai")), true)],
        vec![without_id(mcp(1, "filesystem"), false)],
        vec![
            without_id(config(1, "version", "1.0.0"), false),
            without_id(config(2, "theme", "dark"), false),
        ],
    );

    let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
    assert!(report.overall_success, "{:#?}", report);
    assert!(report.integrity.migrated.issues().next().is_none());

    let alone = MigrationVerifier::new().inspect(&migrated, Some(&r)).unwrap();
    assert!(alone.integrity.all_checks_pass);
}

#[test]
fn test_duplicates_without_ids_still_detected() {
    let r = ring();
    let raw = export(
        vec![
            without_id(claude(1, "a", r.encode(b"x"), 1), false),
            without_id(claude(2, "b", r.encode(b"y"), 1), false),
        ],
        vec![],
        vec![],
        vec![
            without_id(config(1, "version", "1.0.0"), false),
            without_id(config(2, "version", "1.0.1"), false),
        ],
    );
    let inspection = MigrationVerifier::new().inspect(&raw, Some(&r)).unwrap();
    let kinds: Vec<_> = inspection.integrity.issues().map(|i| &i.kind).collect();
    assert!(kinds.iter().any(|k| matches!(
        k,
        IntegrityIssueKind::MultipleEnabled { count: 2, record_ids } if record_ids.is_empty()
    )));
    assert!(kinds.contains(&&IntegrityIssueKind::DuplicateKey {
        key: "version".into(),
        count: 2
    }));
    assert!(!kinds.iter().any(|k| matches!(k, IntegrityIssueKind::DuplicateId { .. })));
}

#[test]
fn test_rotated_keys_verify_with_fallback() {
    let old = FernetKey::generate();
    let new = FernetKey::generate();
    let source_ring = KeyRing::single(old.clone());
    let migrated_ring = KeyRing::new(vec![new.clone(), old]).unwrap();
    let only_new = KeyRing::single(new);

    let source = export(vec![claude(1, "a", source_ring.encode(b"sk"), 1)], vec![], vec![], vec![]);
    // One secret re-encrypted under the new key, one left as the source wrote it.
    let migrated = export(vec![claude(1, "a", source_ring.encode(b"sk"), 1)], vec![], vec![], vec![]);
    let report = MigrationVerifier::new()
        .verify(&source, &source_ring, &migrated, &migrated_ring)
        .unwrap();
    assert!(report.overall_success);
    assert_eq!(report.summary().fallback_decryptions, 1);

    let reencrypted = export(vec![claude(1, "a", only_new.encode(b"sk"), 1)], vec![], vec![], vec![]);
    let report = MigrationVerifier::new()
        .verify(&source, &source_ring, &reencrypted, &migrated_ring)
        .unwrap();
    assert!(report.overall_success);
    assert_eq!(report.summary().fallback_decryptions, 0);
}

#[test]
fn test_secret_under_unknown_key_is_reported_not_raised() {
    let r = ring();
    let stranger = KeyRing::single(FernetKey::generate());
    let source = export(vec![claude(1, "a", r.encode(b"sk"), 1)], vec![], vec![], vec![]);
    let migrated = export(vec![claude(1, "a", stranger.encode(b"sk"), 1)], vec![], vec![], vec![]);
    let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
    assert!(!report.overall_success);
    let claude = report.equivalence.collection(EntityKind::ClaudeProvider).unwrap();
    assert!(matches!(
        &claude.issues[..],
        [EquivalenceIssue::DecryptionMismatch { .. }]
    ));
    let text = serde_json::to_string(&report).unwrap();
    assert!(!text.contains("\"sk\""));
}

#[test]
fn test_missing_table_fails_run() {
    let r = ring();
    let source = export(vec![], vec![], vec![], vec![]);
    let migrated = RawDataset::from_json_document(&json!({
        "claude_providers": [], "codex_providers": [], "agent_guides": [{
            "id": 1, "name": "default", "type": "only", "text": "Be concise."
        }], "mcp_servers": []
    }))
    .unwrap();
    let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
    assert!(!report.schema.migrated.all_tables_exist);
    assert!(!report.overall_success);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_equivalence_ignores_row_order(seed in any::<u64>()) {
        let r = ring();
        let names: Vec<String> = (0..6).map(|i| format!("key-{i}")).collect();
        let source_rows: Vec<Value> = names
            .iter()
            .enumerate()
            .map(|(i, k)| config(i as i64, k, &format!("value-{i}")))
            .collect();
        let mut shuffled = source_rows.clone();
        // Deterministic rotation driven by the seed.
        let len = shuffled.len();
        shuffled.rotate_left((seed % len as u64) as usize);
        if seed % 2 == 1 {
            shuffled.reverse();
        }

        let source = export(vec![], vec![], vec![], source_rows);
        let migrated = export(vec![], vec![], vec![], shuffled);
        let report = MigrationVerifier::new().verify(&source, &r, &migrated, &r).unwrap();
        prop_assert!(report.overall_success);
    }
}
