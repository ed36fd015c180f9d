use serde_json::json;
use std::sync::Arc;
use strata_query::{
    BackendKind, Connection, ConnectionConfig, DeletesByFilter, DriverRegistry, Entity,
    EntityRegistry, FilterExpression, PageRequest, QueryOptions, RawStatement, Save,
};
use strata_query_arangodb::ArangoDriver;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Order;
impl Entity for Order {
    const NAME: &'static str = "orders";
}

async fn open(server: &MockServer) -> Connection {
    Mock::given(method("GET"))
        .and(path("/_db/shop/_api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"server": "arango", "version": "3.11.0"})))
        .mount(server)
        .await;

    let drivers = DriverRegistry::new();
    drivers.register(Arc::new(ArangoDriver::new())).await;

    let mut entities = EntityRegistry::new();
    entities.register::<Order>().unwrap();

    let address = server.address();
    let config = ConnectionConfig::new(BackendKind::ArangoDb)
        .with_host(address.ip().to_string())
        .with_port(address.port())
        .with_database("shop");

    Connection::open(&drivers, config, Arc::new(entities)).await.unwrap()
}

#[tokio::test]
async fn test_get_page_single_round_trip() {
    let server = MockServer::start().await;
    let connection = open(&server).await;

    let list: Vec<_> = (0..10).map(|i| json!({"_id": format!("orders/{}", i), "status": "a"})).collect();
    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_string_contains("LENGTH(ts)"))
        .and(body_partial_json(json!({
            "bindVars": {"@collection": "orders", "value0": ["a", "b"], "value1": 0, "value2": 10}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [{"total": 25, "list": list}],
            "hasMore": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orders = connection.repository::<Order>().await.unwrap();
    let page = orders
        .get_page(&PageRequest::new(1, 10).with_filter(FilterExpression::new().is_in("status", ["a", "b"])))
        .await
        .unwrap();

    assert_eq!(page.total, 25);
    assert_eq!(page.total_page, 3);
    assert!(page.has_more);
    assert_eq!(page.list.len(), 10);
}

#[tokio::test]
async fn test_save_and_delete_return_identifiers() {
    let server = MockServer::start().await;
    let connection = open(&server).await;

    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_string_contains("INSERT MERGE"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [{"_id": "orders/77"}],
            "hasMore": false,
            "extra": {"stats": {"writesExecuted": 1}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_string_contains("keepNull"))
        .and(body_partial_json(json!({"bindVars": {"attr2": "_status", "attr3": "_delete_date"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [{"_id": "orders/77"}],
            "hasMore": false,
            "extra": {"stats": {"writesExecuted": 1}}
        })))
        .mount(&server)
        .await;

    let orders = connection.repository::<Order>().await.unwrap();
    let saved = orders
        .save(&Save {
            payload: serde_json::from_value(json!({"code": "X-1", "_key": "forged"})).unwrap(),
            options: QueryOptions::default(),
        })
        .await
        .unwrap();
    assert_eq!(saved.identifiers, vec![json!("orders/77")]);

    let deleted = orders
        .deletes_by_filter(&DeletesByFilter {
            filter: FilterExpression::new().eq("code", "X-1"),
            options: QueryOptions::default(),
        })
        .await
        .unwrap();
    assert_eq!(deleted.affected, 1);
    assert_eq!(deleted.identifiers, vec![json!("orders/77")]);

    let requests = server.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|r| String::from_utf8_lossy(&r.body).contains("INSERT MERGE"))
        .unwrap();
    assert!(!String::from_utf8_lossy(&insert.body).contains("forged"));
}

#[tokio::test]
async fn test_execute_raw_with_named_binds() {
    let server = MockServer::start().await;
    let connection = open(&server).await;

    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_partial_json(json!({
            "query": "RETURN LENGTH(@@c)",
            "bindVars": {"@c": "orders"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [3],
            "hasMore": false
        })))
        .mount(&server)
        .await;

    let mut binds = std::collections::BTreeMap::new();
    binds.insert("@c".to_string(), "orders".into());
    let execution = connection
        .execute_raw(RawStatement::new("RETURN LENGTH(@@c)").named(binds))
        .await
        .unwrap();
    assert_eq!(execution.rows[0]["value"], json!(3));
}
