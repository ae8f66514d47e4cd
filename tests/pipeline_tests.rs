//! End-to-end tests: documents through resolution, validation, compilation
//! and diffing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use datalex_core::loader::resolve_project;
use datalex_core::{
    compile, diff, resolve, resolve_standalone, verify, CanonicalModel, FileSystemLoader,
    IssueCode, MemoryLoader, ModelDocument, ModelError, ResolutionError, ResolveOptions, Verified,
};

fn fixture(name: &str) -> ModelDocument {
    let text = match name {
        "commerce" => include_str!("fixtures/commerce.model.json"),
        "commerce_permuted" => include_str!("fixtures/commerce_permuted.model.json"),
        "customers" => include_str!("fixtures/customers.model.json"),
        other => panic!("unknown fixture {}", other),
    };
    ModelDocument::from_json_str(text).unwrap()
}

fn fixture_loader() -> MemoryLoader {
    MemoryLoader::new().with("customers", fixture("customers"))
}

fn compile_fixture(name: &str) -> CanonicalModel {
    let verified = verify(&fixture(name), &fixture_loader(), &ResolveOptions::default()).unwrap();
    assert!(!verified.has_errors(), "{}", verified.issues.format_all());
    verified.compile().unwrap()
}

fn model_doc(name: &str, imports: Value, entities: Value) -> ModelDocument {
    ModelDocument::new(json!({
        "model": {
            "name": name,
            "version": "1.0.0",
            "domain": "test",
            "owners": ["owner@example.com"],
            "state": "draft",
            "imports": imports
        },
        "entities": entities
    }))
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_compile_is_idempotent() {
    let first = compile_fixture("commerce");
    let second = compile_fixture("commerce");

    assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
    assert_eq!(first.checksum().unwrap(), second.checksum().unwrap());

    let reloaded = CanonicalModel::from_json_str(&first.to_json_pretty().unwrap()).unwrap();
    assert_eq!(reloaded, first);
}

#[test]
fn test_permuted_document_compiles_byte_identical() {
    let original = compile_fixture("commerce");
    let permuted = compile_fixture("commerce_permuted");

    assert_eq!(
        original.to_json_pretty().unwrap(),
        permuted.to_json_pretty().unwrap()
    );
    assert_eq!(original.checksum().unwrap(), permuted.checksum().unwrap());
}

#[test]
fn test_canonical_ordering() {
    let model = compile_fixture("commerce");

    let names: Vec<&str> = model.entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Address", "Customer", "DailyRevenue", "Order", "OrderLine"]
    );

    let lines = model.entity("OrderLine").unwrap();
    let fields: Vec<&str> = lines.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["order_id", "line_no", "quantity", "sku"]);

    assert_eq!(model.model.imports, vec!["customers"]);
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_import_cycle_names_both_models() {
    let a = model_doc("A", json!([{ "model": "B" }]), json!([]));
    let b = model_doc("B", json!([{ "model": "A" }]), json!([]));
    let loader = MemoryLoader::new().with("A", a.clone()).with("B", b);

    match resolve(&a, &loader) {
        Err(ResolutionError::CycleDetected { path }) => {
            assert_eq!(path, vec!["A", "B", "A"]);
        }
        other => panic!("expected cycle, got {:?}", other),
    }
}

#[test]
fn test_cross_model_relationship_from_fixtures() {
    let graph = resolve(&fixture("commerce"), &fixture_loader()).unwrap();
    let summary = graph.summary();

    assert_eq!(summary.root_model, "commerce");
    assert_eq!(summary.model_count, 2);
    assert_eq!(summary.total_entities, 5);

    let cross: Vec<_> = summary
        .cross_model_relationships
        .iter()
        .map(|r| (r.from_model.as_str(), r.to_model.as_str(), r.from_entity.as_str()))
        .collect();
    assert_eq!(cross, vec![("customers", "commerce", "Customer")]);
}

#[test]
fn test_broken_relationships_yield_two_warnings_and_no_edges() {
    let doc = ModelDocument::new(json!({
        "model": {
            "name": "shop", "version": "1.0.0", "domain": "sales",
            "owners": ["o@example.com"], "state": "draft"
        },
        "entities": [
            { "name": "Orders", "type": "table", "fields": [
                { "name": "id", "type": "integer", "primary_key": true },
                { "name": "customer_id", "type": "integer" }
            ]},
            { "name": "Customers", "type": "table", "fields": [
                { "name": "id", "type": "integer", "primary_key": true }
            ]}
        ],
        "relationships": [
            { "name": "orders_customer", "from": "Orders.customer_id", "to": "Customers.customer_id", "cardinality": "many_to_one" },
            { "name": "orders_customer_bad", "from": "Orders", "to": "Customers.customer_id", "cardinality": "many_to_one" }
        ]
    }));

    let graph = resolve_standalone(&doc).unwrap();
    let report = datalex_core::graph::resolve_relationship_edges(&graph);
    assert_eq!(report.edges.len(), 0);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].to_lowercase().contains("missing fields"));
    assert!(report.warnings[1].to_lowercase().contains("invalid field references"));

    let verified = verify(&doc, &MemoryLoader::new(), &ResolveOptions::default()).unwrap();
    assert!(verified.has_errors());
    assert!(verified.issues.with_code(IssueCode::MissingFields).count() >= 1);
    assert_eq!(verified.issues.with_code(IssueCode::InvalidFieldReference).count(), 1);
    assert!(verified.compile().is_err());
}

// =============================================================================
// Semantic rules
// =============================================================================

#[test]
fn test_primary_key_rule_exempts_views() {
    let doc = model_doc(
        "pk",
        json!([]),
        json!([
            { "name": "Ledger", "type": "table", "description": "d", "fields": [
                { "name": "amount", "type": "decimal" }
            ]},
            { "name": "LedgerView", "type": "view", "description": "d", "fields": [
                { "name": "amount", "type": "decimal" }
            ]}
        ]),
    );

    let verified = verify(&doc, &MemoryLoader::new(), &ResolveOptions::default()).unwrap();
    let pk: Vec<_> = verified
        .issues
        .with_code(IssueCode::MissingPrimaryKey)
        .collect();
    assert_eq!(pk.len(), 1);
    assert!(pk[0].message.contains("Ledger"));
    assert!(!pk[0].message.contains("LedgerView"));
}

// =============================================================================
// Diffing
// =============================================================================

fn with_order_fields(mut model: Value, fields: Value) -> ModelDocument {
    let order = model["entities"]
        .as_array_mut()
        .unwrap()
        .iter_mut()
        .find(|e| e["name"] == "Order")
        .unwrap();
    order["fields"] = fields;
    ModelDocument::new(model)
}

fn commerce_value() -> Value {
    serde_json::from_str(include_str!("fixtures/commerce.model.json")).unwrap()
}

fn compile_doc(doc: &ModelDocument) -> CanonicalModel {
    compile(&resolve(doc, &fixture_loader()).unwrap())
}

#[test]
fn test_field_removal_is_breaking() {
    let old = compile_fixture("commerce");
    let new = compile_doc(&with_order_fields(
        commerce_value(),
        json!([
            { "name": "id", "type": "bigint", "primary_key": true, "nullable": false },
            { "name": "customer_id", "type": "integer", "foreign_key": true, "nullable": false, "description": "Buyer" },
            { "name": "placed_at", "type": "timestamp", "nullable": false }
        ]),
    ));

    let report = diff(&old, &new);
    assert!(report.breaking);
    assert_eq!(report.fields.removed, vec!["Order.total"]);
    assert!(report
        .breaking_reasons
        .iter()
        .any(|r| r.contains("Order.total")));
}

#[test]
fn test_optional_field_addition_is_not_breaking() {
    let old = compile_fixture("commerce");
    let new = compile_doc(&with_order_fields(
        commerce_value(),
        json!([
            { "name": "id", "type": "bigint", "primary_key": true, "nullable": false },
            { "name": "customer_id", "type": "integer", "foreign_key": true, "nullable": false, "description": "Buyer" },
            { "name": "placed_at", "type": "timestamp", "nullable": false },
            { "name": "total", "type": "decimal(12,2)" },
            { "name": "coupon_code", "type": "varchar(32)" }
        ]),
    ));

    let report = diff(&old, &new);
    assert!(!report.breaking, "{:?}", report.breaking_reasons);
    assert_eq!(report.fields.added, vec!["Order.coupon_code"]);
    assert_eq!(report.change_count(), 1);
}

// =============================================================================
// Filesystem projects
// =============================================================================

fn write(dir: &Path, rel: &str, body: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn test_project_resolution_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "sales/commerce.model.json",
        include_str!("fixtures/commerce.model.json"),
    );
    write(
        tmp.path(),
        "crm/customers.model.json",
        include_str!("fixtures/customers.model.json"),
    );
    write(tmp.path(), ".drafts/ignored.model.json", "{ not json");

    let entries = resolve_project(
        tmp.path(),
        &FileSystemLoader::new(),
        &ResolveOptions::default(),
    );
    assert_eq!(entries.len(), 2);

    let graphs: BTreeMap<String, _> = entries
        .into_iter()
        .map(|entry| {
            let graph = entry.outcome.unwrap();
            (graph.root_name().to_string(), graph)
        })
        .collect();

    let commerce = &graphs["commerce"];
    assert_eq!(commerce.entity_count(), 5);
    let summary = commerce.summary();
    let customers = summary.models.iter().find(|m| m.name == "customers").unwrap();
    assert_eq!(customers.file, "customers.model.json");

    let from_disk = compile(commerce);
    assert_eq!(
        from_disk.checksum().unwrap(),
        compile_fixture("commerce").checksum().unwrap()
    );
}

#[test]
fn test_project_models_are_validated_before_compiling() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "crm/customers.model.json",
        include_str!("fixtures/customers.model.json"),
    );
    let broken = json!({
        "model": {
            "name": "orders", "version": "1.0.0", "domain": "sales",
            "owners": ["o@example.com"], "state": "draft",
            "imports": [{ "model": "customers", "entities": ["Missing"] }]
        },
        "entities": [
            { "name": "Order", "type": "table", "description": "d", "fields": [
                { "name": "id", "type": "integer", "primary_key": true }
            ]},
            { "name": "Order", "type": "view", "description": "d", "fields": [] }
        ]
    });
    write(tmp.path(), "sales/orders.model.json", &broken.to_string());

    let entries = resolve_project(
        tmp.path(),
        &FileSystemLoader::new(),
        &ResolveOptions::default(),
    );
    let verified: BTreeMap<String, Verified> = entries
        .into_iter()
        .map(|entry| {
            let verified = Verified::from_graph(entry.outcome.unwrap());
            (verified.graph.root_name().to_string(), verified)
        })
        .collect();

    let orders = &verified["orders"];
    assert!(orders.has_errors());
    assert_eq!(orders.issues.with_code(IssueCode::ImportEntityNotFound).count(), 1);
    assert!(orders.issues.with_code(IssueCode::DuplicateName).count() >= 1);
    assert!(matches!(orders.compile(), Err(ModelError::Blocked(_))));

    assert!(!verified["customers"].has_errors());
    assert!(verified["customers"].compile().is_ok());
}
