// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consumer tests against an in-process servlet host.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rgma_client::{
    ClientContext, Consumer, ConsumerQuery, QueryType, QueryTypeWithInterval, ResourceEndpoint, RgmaError,
    TimeInterval, TimeUnit,
};
use rgma_protocol::testing::{FakeServer, http_ok, rows, single, unknown_resource};

fn context(server: &FakeServer) -> ClientContext {
    ClientContext::new(server.config()).unwrap()
}

/// Consumer servlet handing out ids from 1 and answering pops from `pops`.
fn consumer_servlet(pops: Vec<String>) -> FakeServer {
    let ids = AtomicUsize::new(1);
    let pops = Mutex::new(pops.into_iter());
    FakeServer::start(move |request| match request.operation.as_str() {
        "createConsumer" => http_ok(&single(&ids.fetch_add(1, Ordering::SeqCst).to_string())),
        "pop" => http_ok(&pops.lock().unwrap().next().unwrap_or_else(|| rows(&[]))),
        "hasAborted" => http_ok(&single("true")),
        _ => http_ok(&single("OK")),
    })
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_create_continuous_consumer() {
    let server = consumer_servlet(vec![]);
    let ctx = context(&server);
    let consumer = Consumer::new(&ctx, "SELECT * FROM userTable", QueryType::Continuous).unwrap();

    let endpoint = consumer.resource_endpoint();
    assert_eq!(endpoint.resource_id, 1);
    assert!(endpoint.url.ends_with("/R-GMA/ConsumerServlet"));

    let create = &server.requests()[0];
    assert_eq!(create.operation, "createConsumer");
    assert_eq!(create.param("select"), Some("SELECT * FROM userTable"));
    assert_eq!(create.param("queryType"), Some("continuous"));
    assert_eq!(create.param("timeIntervalSec"), None);
    assert_eq!(create.param("timeoutSec"), None);
    assert!(create.params_named("producerConnections").is_empty());
}

#[test]
fn test_create_with_interval_timeout_and_producers() {
    let server = consumer_servlet(vec![]);
    let ctx = context(&server);
    let producers = [
        ResourceEndpoint::new("https://a:8443/R-GMA/PrimaryProducerServlet", 7),
        ResourceEndpoint::new("https://b:8443/R-GMA/SecondaryProducerServlet", 9),
    ];
    let interval = TimeInterval::new(10, TimeUnit::Minutes).unwrap();
    let timeout = TimeInterval::from_secs(30).unwrap();

    Consumer::with_options(
        &ctx,
        "SELECT * FROM t",
        ConsumerQuery::WithInterval(QueryTypeWithInterval::History, interval),
        Some(timeout),
        Some(&producers[..]),
    )
    .unwrap();

    let create = &server.requests()[0];
    assert_eq!(create.param("queryType"), Some("history"));
    assert_eq!(create.param("timeIntervalSec"), Some("600"));
    assert_eq!(create.param("timeoutSec"), Some("30"));
    assert_eq!(
        create.params_named("producerConnections"),
        [
            "7 https://a:8443/R-GMA/PrimaryProducerServlet",
            "9 https://b:8443/R-GMA/SecondaryProducerServlet",
        ]
    );
}

#[test]
fn test_empty_producer_list_rejected() {
    let server = consumer_servlet(vec![]);
    let ctx = context(&server);
    let err = Consumer::with_options(&ctx, "SELECT * FROM t", QueryType::Static, None, Some(&[][..])).unwrap_err();
    assert!(err.is_permanent());
    assert!(server.requests().is_empty());
}

#[test]
fn test_create_error_is_returned() {
    let server = FakeServer::start(|_| http_ok(r#"<p m="Syntax error in SELECT"/>"#));
    let ctx = context(&server);
    let err = Consumer::new(&ctx, "SELEKT", QueryType::Latest).unwrap_err();
    assert_eq!(err, RgmaError::permanent("Syntax error in SELECT"));
}

// ============================================================================
// Pop
// ============================================================================

#[test]
fn test_pop_returns_tuples_and_flags_repeat_after_end() {
    let first = r#"<r c="2" r="2"><v>alice</v><v>1</v><v>bob</v><n/><e/></r>"#.to_string();
    let second = r#"<r c="2" r="0"><e/></r>"#.to_string();
    let server = consumer_servlet(vec![first, second]);
    let ctx = context(&server);
    let mut consumer = Consumer::new(&ctx, "SELECT * FROM t", QueryType::History).unwrap();

    let tuples = consumer.pop(100).unwrap();
    assert_eq!(tuples.len(), 2);
    assert!(tuples.is_end_of_results());
    assert_eq!(tuples.rows()[0].get_string(0).unwrap(), "alice");
    assert!(tuples.rows()[1].is_null(1).unwrap());
    assert_eq!(tuples.rows()[1].get_int(1).unwrap(), 0);
    assert!(tuples.warning().is_empty());

    let again = consumer.pop(100).unwrap();
    assert!(again.is_empty());
    assert_eq!(again.warning(), "You have called pop again after end of results returned.");

    let pop = &server.requests()[1];
    assert_eq!(pop.param("connectionId"), Some("1"));
    assert_eq!(pop.param("maxCount"), Some("100"));
}

#[test]
fn test_pop_after_server_restart_warns_of_duplicates() {
    // The first consumer is forgotten as soon as it is created
    let ids = AtomicUsize::new(1);
    let server = FakeServer::start(move |request| match request.operation.as_str() {
        "createConsumer" => http_ok(&single(&ids.fetch_add(1, Ordering::SeqCst).to_string())),
        "pop" if request.param("connectionId") == Some("1") => http_ok(&unknown_resource()),
        _ => http_ok(&rows(&[&["x"]])),
    });
    let ctx = context(&server);
    let mut consumer = Consumer::new(&ctx, "SELECT * FROM t", QueryType::Continuous).unwrap();

    let tuples = consumer.pop(10).unwrap();
    assert_eq!(tuples.len(), 1);
    assert_eq!(
        tuples.warning(),
        "The query was restarted - many duplicates may be returned."
    );
    assert_eq!(consumer.resource_endpoint().resource_id, 2);

    let replayed = &server.requests()[2];
    assert_eq!(replayed.operation, "createConsumer");
    assert_eq!(replayed.param("queryType"), Some("continuous"));
}

// ============================================================================
// Abort and lifecycle
// ============================================================================

#[test]
fn test_abort_and_has_aborted() {
    let server = consumer_servlet(vec![]);
    let ctx = context(&server);
    let mut consumer = Consumer::new(&ctx, "SELECT * FROM t", QueryType::Continuous).unwrap();

    consumer.abort().unwrap();
    assert!(consumer.has_aborted().unwrap());

    let operations: Vec<String> = server.requests().into_iter().map(|r| r.operation).collect();
    assert_eq!(operations, ["createConsumer", "abort", "hasAborted"]);
}

#[test]
fn test_close_then_reuse_is_permanent() {
    let server = consumer_servlet(vec![]);
    let ctx = context(&server);
    let mut consumer = Consumer::new(&ctx, "SELECT * FROM t", QueryType::Continuous).unwrap();

    consumer.close().unwrap();
    let err = consumer.pop(1).unwrap_err();
    assert_eq!(
        err,
        RgmaError::permanent("This resource cannot be reused after you have closed or destroyed it.")
    );
    assert_eq!(server.requests().last().unwrap().operation, "close");
}
