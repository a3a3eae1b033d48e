use periscope_core::App;
use periscope_core::app::ValidationStatus;
use periscope_core::config::AppPaths;
use periscope_core::schema::model::{FieldInfo, MessageInfo};
use periscope_core::storage::model::{NewHistoryRecord, TabState};
use std::collections::HashMap;
use std::net::SocketAddr;
use test_service::TestServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use test_service_impl::TestServiceImpl;

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(test_service::FILE_DESCRIPTOR_SET)
            .build_v1()
            .unwrap();

        Server::builder()
            .add_service(reflection_service)
            .add_service(TestServiceServer::new(TestServiceImpl))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

async fn scratch_app() -> (App, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = App::open_at(&AppPaths::in_dir(dir.path())).await.unwrap();
    (app, dir)
}

#[tokio::test]
async fn test_server_management() {
    let (app, _dir) = scratch_app().await;

    let first = app
        .create_server("alpha", "localhost:50051", false, false)
        .await
        .unwrap();
    let second = app
        .create_server("beta", "localhost:50052", true, false)
        .await
        .unwrap();

    app.toggle_favorite_server(second).await.unwrap();
    let servers = app.get_servers().await.unwrap();
    assert_eq!(servers[0].id, second, "favorites come first");
    assert_eq!(servers[1].id, first);

    app.update_server(first, "alpha2", "localhost:60051", false, false)
        .await
        .unwrap();
    let servers = app.get_servers().await.unwrap();
    assert!(servers.iter().any(|s| s.name == "alpha2"));

    app.delete_server(first).await.unwrap();
    assert_eq!(app.get_servers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_server_rejects_invalid_tls_options() {
    let (app, _dir) = scratch_app().await;
    // insecure_skip_verify without use_tls violates the option invariant.
    assert!(
        app.create_server("bad", "localhost:1", false, true)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_validate_server_address_ok() {
    let (app, _dir) = scratch_app().await;
    let addr = spawn_server().await;

    let result = app
        .validate_server_address(&addr.to_string(), false, false)
        .await;
    assert_eq!(result.status, ValidationStatus::Ok);
    assert!(result.message.is_none());
}

#[tokio::test]
async fn test_validate_server_address_connection_failed() {
    let (app, _dir) = scratch_app().await;

    let result = app.validate_server_address("127.0.0.1:1", false, false).await;
    assert_eq!(result.status, ValidationStatus::ConnectionFailed);
    assert!(result.message.is_some());
}

#[tokio::test]
async fn test_reflection_is_cached_and_revalidated() {
    let (app, _dir) = scratch_app().await;
    let addr = spawn_server().await;

    let id = app
        .create_server("local", &addr.to_string(), false, false)
        .await
        .unwrap();

    // Force refresh populates the cache atomically.
    let result = app.get_server_with_reflection(id).await.unwrap();
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.reflection.services.len(), 1);
    assert_eq!(result.reflection.services[0].name, "testserver.TestService");

    let stored = app.storage().get_server(id).await.unwrap();
    assert!(!stored.reflection_cache.is_empty());
    assert!(stored.reflection_cached_at.is_some());
    assert_eq!(stored.reflection_access_count, 0);
    assert!(stored.reflection_error.is_empty());

    // A bulk (non-forced) read is served from the cache and counted.
    let results = app.get_servers_with_reflection().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].error.is_none());
    assert_eq!(results[0].reflection.services.len(), 1);

    let stored = app.storage().get_server(id).await.unwrap();
    assert_eq!(stored.reflection_access_count, 1);

    // Past the access bound, the next read refreshes and resets the counter.
    for _ in 0..25 {
        app.storage().bump_reflection_access(id).await.unwrap();
    }
    let _ = app.get_servers_with_reflection().await.unwrap();
    let stored = app.storage().get_server(id).await.unwrap();
    assert_eq!(stored.reflection_access_count, 0, "refresh resets the counter");
}

#[tokio::test]
async fn test_reflection_failure_is_recorded() {
    let (app, _dir) = scratch_app().await;

    let id = app
        .create_server("down", "127.0.0.1:1", false, false)
        .await
        .unwrap();

    let result = app.get_server_with_reflection(id).await.unwrap();
    assert!(result.error.is_some());
    assert!(result.reflection.services.is_empty());

    let stored = app.storage().get_server(id).await.unwrap();
    assert!(stored.reflection_cache.is_empty());
    assert!(!stored.reflection_error.is_empty());
}

#[tokio::test]
async fn test_corrupt_cache_forces_refresh() {
    let (app, _dir) = scratch_app().await;
    let addr = spawn_server().await;

    let id = app
        .create_server("local", &addr.to_string(), false, false)
        .await
        .unwrap();
    app.storage()
        .update_reflection_cache(id, "definitely not json", "")
        .await
        .unwrap();

    // The unreadable body is replaced by a fresh wire result, not surfaced.
    let results = app.get_servers_with_reflection().await.unwrap();
    assert!(results[0].error.is_none(), "{:?}", results[0].error);
    assert_eq!(results[0].reflection.services.len(), 1);

    let stored = app.storage().get_server(id).await.unwrap();
    let cached: serde_json::Value = serde_json::from_str(&stored.reflection_cache).unwrap();
    assert!(cached["services"].is_array());
}

#[tokio::test]
async fn test_do_grpc_request_success_and_history() {
    let (app, _dir) = scratch_app().await;
    let addr = spawn_server().await;

    let id = app
        .create_server("local", &addr.to_string(), false, false)
        .await
        .unwrap();

    let response = app
        .do_grpc_request(
            id,
            &addr.to_string(),
            "testserver.TestService",
            "SimpleCall",
            r#"{"message":"test","value":42}"#,
            HashMap::from([("x-trace-id".to_string(), "t1".to_string())]),
            HashMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status_code, 0);
    assert!(response.error.is_none(), "{:?}", response.error);
    let body: serde_json::Value = serde_json::from_str(&response.response).unwrap();
    assert_eq!(body["result"], serde_json::json!("Echo: test"));
    assert_eq!(body["processed"], serde_json::json!(84));

    let history = app.get_history(id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert_eq!(record.service, "testserver.TestService");
    assert_eq!(record.method, "SimpleCall");
    assert_eq!(record.status_code, 0);
    assert!(record.execution_time_ms >= 0);
    assert!(record.request_headers_json.contains("x-trace-id"));
    assert_eq!(record.request_json, r#"{"message":"test","value":42}"#);

    let fetched = app.get_history_item(record.id).await.unwrap();
    assert_eq!(fetched, *record);

    app.delete_history_item(record.id).await.unwrap();
    assert!(app.get_history(id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_do_grpc_request_unknown_method_records_failure() {
    let (app, _dir) = scratch_app().await;
    let addr = spawn_server().await;

    let id = app
        .create_server("local", &addr.to_string(), false, false)
        .await
        .unwrap();

    let response = app
        .do_grpc_request(
            id,
            &addr.to_string(),
            "testserver.TestService",
            "InvalidMethod",
            "{}",
            HashMap::new(),
            HashMap::new(),
        )
        .await
        .unwrap();

    assert_ne!(response.status_code, 0);
    assert!(response.error.is_some());
    assert!(response.response.is_empty());

    // The failed call is history too.
    let history = app.get_history(id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status_code, response.status_code);
}

#[tokio::test]
async fn test_history_is_capped_at_500() {
    let (app, _dir) = scratch_app().await;
    let addr = spawn_server().await;

    let id = app
        .create_server("local", &addr.to_string(), false, false)
        .await
        .unwrap();

    for i in 0..510 {
        app.storage()
            .create_history(&NewHistoryRecord {
                server_id: id,
                service: "testserver.TestService".into(),
                method: format!("Bulk{i}"),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    // The next real request prunes the table back to the cap.
    app.do_grpc_request(
        id,
        &addr.to_string(),
        "testserver.TestService",
        "SimpleCall",
        r#"{"message":"last","value":1}"#,
        HashMap::new(),
        HashMap::new(),
    )
    .await
    .unwrap();

    assert_eq!(app.storage().history_count().await.unwrap(), 500);
    let newest = &app.get_history(id, 1).await.unwrap()[0];
    assert_eq!(newest.method, "SimpleCall", "the most recent record survives");
}

#[tokio::test]
async fn test_get_json_example_via_facade() {
    let (app, _dir) = scratch_app().await;

    let msg = MessageInfo {
        name: "x.Req".into(),
        fields: vec![FieldInfo {
            name: "query".into(),
            type_name: "string".into(),
            number: 1,
            ..Default::default()
        }],
    };
    let example = app.get_json_example(&msg);
    let parsed: serde_json::Value = serde_json::from_str(&example).unwrap();
    assert_eq!(parsed["query"], serde_json::json!(""));
}

#[tokio::test]
async fn test_tab_state_persistence() {
    let (app, _dir) = scratch_app().await;

    let tabs = vec![
        TabState {
            tab_id: "t1".into(),
            name: "SimpleCall".into(),
            component: "request".into(),
            props: "{}".into(),
            state: "{}".into(),
            is_active: true,
            order: 0,
        },
        TabState {
            tab_id: "t2".into(),
            name: "ComplexCall".into(),
            component: "request".into(),
            props: "{}".into(),
            state: "{}".into(),
            is_active: false,
            order: 1,
        },
    ];

    app.save_tab_states(&tabs).await.unwrap();
    assert_eq!(app.get_tab_states().await.unwrap(), tabs);

    app.delete_tab_state("t1").await.unwrap();
    let remaining = app.get_tab_states().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].tab_id, "t2");
}
