// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Producer tests against an in-process servlet host.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rgma_client::{
    ClientContext, OnDemandProducer, PrimaryProducer, RgmaError, SecondaryProducer, Storage, SupportedQueries,
    TimeInterval, TimeUnit,
};
use rgma_protocol::testing::{FakeServer, RecordedRequest, http_ok, single, unknown_resource};

fn context(server: &FakeServer) -> ClientContext {
    ClientContext::new(server.config()).unwrap()
}

fn operations(server: &FakeServer) -> Vec<String> {
    server.requests().into_iter().map(|r| r.operation).collect()
}

/// Producer servlet issuing ids from 10. While `forget` is set, the next
/// call naming an existing resource gets an unknown-resource answer and
/// clears the flag.
fn producer_servlet(create: &'static str, forget: Arc<AtomicBool>) -> FakeServer {
    let ids = AtomicUsize::new(10);
    FakeServer::start(move |request: &RecordedRequest| {
        if request.operation == create {
            return http_ok(&single(&ids.fetch_add(1, Ordering::SeqCst).to_string()));
        }
        if request.param("connectionId").is_some() && forget.swap(false, Ordering::SeqCst) {
            return http_ok(&unknown_resource());
        }
        http_ok(&single("OK"))
    })
}

fn hours(n: u64) -> TimeInterval {
    TimeInterval::new(n, TimeUnit::Hours).unwrap()
}

// ============================================================================
// Primary producer
// ============================================================================

#[test]
fn test_primary_create_params() {
    let server = producer_servlet("createPrimaryProducer", Arc::default());
    let ctx = context(&server);
    let producer = PrimaryProducer::new(&ctx, Storage::database("store").unwrap(), SupportedQueries::CL).unwrap();

    assert_eq!(producer.resource_endpoint().resource_id, 10);
    let create = &server.requests()[0];
    assert_eq!(create.param("type"), Some("database"));
    assert_eq!(create.param("logicalName"), Some("store"));
    assert_eq!(create.param("isLatest"), Some("true"));
    assert_eq!(create.param("isHistory"), Some("false"));
}

#[test]
fn test_primary_memory_storage_has_no_logical_name() {
    let server = producer_servlet("createPrimaryProducer", Arc::default());
    let ctx = context(&server);
    PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C).unwrap();

    let create = &server.requests()[0];
    assert_eq!(create.param("type"), Some("memory"));
    assert_eq!(create.param("logicalName"), None);
}

#[test]
fn test_declare_table_and_insert() {
    let server = producer_servlet("createPrimaryProducer", Arc::default());
    let ctx = context(&server);
    let mut producer = PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::CHL).unwrap();

    producer.declare_table("userTable", "WHERE site = 'a'", hours(2), hours(1)).unwrap();
    producer
        .insert("INSERT INTO userTable (id) VALUES (1)", Some(TimeInterval::from_secs(90).unwrap()))
        .unwrap();

    let requests = server.requests();
    let declare = &requests[1];
    assert_eq!(declare.operation, "declareTable");
    assert_eq!(declare.param("connectionId"), Some("10"));
    assert_eq!(declare.param("tableName"), Some("userTable"));
    assert_eq!(declare.param("predicate"), Some("WHERE site = 'a'"));
    assert_eq!(declare.param("hrpSec"), Some("7200"));
    assert_eq!(declare.param("lrpSec"), Some("3600"));

    let insert = &requests[2];
    assert_eq!(insert.method, "POST");
    assert_eq!(insert.param("insert"), Some("INSERT INTO userTable (id) VALUES (1)"));
    assert_eq!(insert.param("lrpSec"), Some("90"));

    // Resource calls share one persistent connection
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_insert_list_sends_every_statement() {
    let server = producer_servlet("createPrimaryProducer", Arc::default());
    let ctx = context(&server);
    let mut producer = PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C).unwrap();

    let statements = vec![
        "INSERT INTO t (a) VALUES (1)".to_string(),
        "INSERT INTO t (a) VALUES (2)".to_string(),
    ];
    producer.insert_list(&statements, None).unwrap();

    let insert = &server.requests()[1];
    assert_eq!(insert.params_named("insert"), statements);
    assert_eq!(insert.param("lrpSec"), None);
}

#[test]
fn test_partial_insert_reports_successful_operations() {
    let ids = AtomicUsize::new(1);
    let server = FakeServer::start(move |request| match request.operation.as_str() {
        "createPrimaryProducer" => http_ok(&single(&ids.fetch_add(1, Ordering::SeqCst).to_string())),
        _ => http_ok(r#"<p m="Table t does not exist" o="2"/>"#),
    });
    let ctx = context(&server);
    let mut producer = PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C).unwrap();

    let err = producer.insert_list(&["a", "b", "c"], None).unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.message(), "Table t does not exist");
    assert_eq!(err.num_successful_ops(), 2);
}

#[test]
fn test_restore_redeclares_tables_before_insert() {
    let forget = Arc::new(AtomicBool::new(false));
    let server = producer_servlet("createPrimaryProducer", forget.clone());
    let ctx = context(&server);
    let mut producer = PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C).unwrap();
    producer.declare_table("t1", "", hours(1), hours(1)).unwrap();
    producer.declare_table("t2", "", hours(1), hours(1)).unwrap();

    forget.store(true, Ordering::SeqCst);
    producer.insert("INSERT INTO t1 (a) VALUES (1)", None).unwrap();

    assert_eq!(
        operations(&server),
        [
            "createPrimaryProducer",
            "declareTable",
            "declareTable",
            "insert",
            "createPrimaryProducer",
            "declareTable",
            "declareTable",
            "insert",
        ]
    );
    let requests = server.requests();
    assert_eq!(requests[5].param("tableName"), Some("t1"));
    assert_eq!(requests[5].param("connectionId"), Some("11"));
    assert_eq!(requests[6].param("tableName"), Some("t2"));
    assert_eq!(requests[7].param("connectionId"), Some("11"));
    assert_eq!(producer.resource_endpoint().resource_id, 11);
}

#[test]
fn test_destroy_requires_ok() {
    let ids = AtomicUsize::new(1);
    let server = FakeServer::start(move |request| match request.operation.as_str() {
        "createPrimaryProducer" => http_ok(&single(&ids.fetch_add(1, Ordering::SeqCst).to_string())),
        _ => http_ok(&single("NOT OK")),
    });
    let ctx = context(&server);
    let mut producer = PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C).unwrap();

    let err = producer.destroy().unwrap_err();
    assert!(err.is_permanent());
}

// ============================================================================
// Secondary producer
// ============================================================================

#[test]
fn test_secondary_declare_table_has_no_lrp() {
    let server = producer_servlet("createSecondaryProducer", Arc::default());
    let ctx = context(&server);
    let mut producer =
        SecondaryProducer::new(&ctx, Storage::temporary_database(), SupportedQueries::CH).unwrap();
    producer.declare_table("t", "", hours(3)).unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].param("type"), Some("database"));
    assert_eq!(requests[0].param("logicalName"), None);
    assert_eq!(requests[1].param("hrpSec"), Some("10800"));
    assert_eq!(requests[1].param("lrpSec"), None);
}

#[test]
fn test_sign_of_life_restores_without_repeating() {
    let forget = Arc::new(AtomicBool::new(false));
    let server = producer_servlet("createSecondaryProducer", forget.clone());
    let ctx = context(&server);
    let mut producer = SecondaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C).unwrap();
    producer.declare_table("t", "", hours(1)).unwrap();

    producer.show_sign_of_life().unwrap();
    forget.store(true, Ordering::SeqCst);
    producer.show_sign_of_life().unwrap();

    assert_eq!(
        operations(&server),
        [
            "createSecondaryProducer",
            "declareTable",
            "showSignOfLife",
            "showSignOfLife",
            "createSecondaryProducer",
            "declareTable",
        ]
    );
    assert_eq!(producer.resource_id(), Some(11));
}

#[test]
fn test_sign_of_life_by_id() {
    let server = FakeServer::start(|request| match request.param("connectionId") {
        Some("5") => http_ok(&single("OK")),
        _ => http_ok(&unknown_resource()),
    });
    let ctx = context(&server);

    assert!(SecondaryProducer::show_sign_of_life_by_id(&ctx, 5).unwrap());
    assert!(!SecondaryProducer::show_sign_of_life_by_id(&ctx, 6).unwrap());

    let requests = server.requests();
    assert!(requests[0].target.contains("/SecondaryProducerServlet/showSignOfLife"));
    // Static calls do not keep their connection
    assert_eq!(server.connection_count(), 2);
}

#[test]
fn test_close_by_id_unknown_is_temporary() {
    let server = FakeServer::start(|_| http_ok(&unknown_resource()));
    let ctx = context(&server);

    let err = SecondaryProducer::close_by_id(&ctx, 3).unwrap_err();
    assert_eq!(err, RgmaError::temporary("Unknown resource."));
    assert_eq!(server.requests()[0].param("connectionId"), Some("3"));
}

// ============================================================================
// On-demand producer
// ============================================================================

#[test]
fn test_on_demand_create_and_declare() {
    let server = producer_servlet("createOnDemandProducer", Arc::default());
    let ctx = context(&server);
    let mut producer = OnDemandProducer::new(&ctx, "callback.example.org", 9100).unwrap();
    producer.declare_table("t", "WHERE a = 1").unwrap();
    producer.close().unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].param("hostName"), Some("callback.example.org"));
    assert_eq!(requests[0].param("port"), Some("9100"));
    assert_eq!(requests[1].param("predicate"), Some("WHERE a = 1"));
    assert_eq!(requests[2].operation, "close");
    assert!(producer.declare_table("t", "").unwrap_err().is_permanent());
}
