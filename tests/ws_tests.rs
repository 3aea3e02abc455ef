use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use flowtail::config::{Config, LogConfig};
use flowtail::log::{EventType, StreamKey};
use flowtail::server::router;
use flowtail::FlowtailEngine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;
mod helpers;
use helpers::{start_server, test_config, FLOW, WS};

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn request(engine: &FlowtailEngine, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    let req = match body {
        Some(body) => builder.body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = router(engine.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

mod push {
    use super::*;

    #[tokio::test]
    async fn test_unknown_workspace_or_flow_rejected() {
        let (addr, _engine) = start_server().await;

        let err = connect_async(format!("ws://{}/workspaces/nope/flows/{}/stream", addr, FLOW))
            .await
            .unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), StatusCode::NOT_FOUND),
            other => panic!("expected http error, got {:?}", other),
        }

        let err = connect_async(format!("ws://{}/workspaces/{}/flows/nope/stream", addr, WS))
            .await
            .unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), StatusCode::NOT_FOUND),
            other => panic!("expected http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_receive_over_websocket() {
        let (addr, engine) = start_server().await;
        let root = StreamKey::new(WS, FLOW, "");
        engine.log.append(&root, EventType::Progress, json!("e1")).await.unwrap();
        engine.log.append(&root, EventType::Progress, json!("e2")).await.unwrap();

        let (mut ws, _) = connect_async(format!("ws://{}/workspaces/{}/flows/{}/stream", addr, WS, FLOW))
            .await
            .unwrap();
        ws.send(Message::text(r#"{"parentId":""}"#)).await.unwrap();

        let e1 = next_json(&mut ws).await;
        let e2 = next_json(&mut ws).await;
        assert_eq!(e1["payload"], json!("e1"));
        assert_eq!(e1["streamMessageId"], json!("1"));
        assert_eq!(e1["workspaceId"], json!(WS));
        assert_eq!(e1["parentId"], json!(""));
        assert_eq!(e2["payload"], json!("e2"));
        assert_eq!(e2["streamMessageId"], json!("2"));

        // Garbage does not end the session.
        ws.send(Message::text("not json")).await.unwrap();

        engine.log.append(&root, EventType::EndStream, json!(null)).await.unwrap();
        let marker = next_json(&mut ws).await;
        assert_eq!(marker["eventType"], json!("end_stream"));

        ws.send(Message::text(r#"{"parentId":"","lastStreamMessageId":"0"}"#)).await.unwrap();
        assert_eq!(next_json(&mut ws).await["payload"], json!("e1"));
    }

    #[tokio::test]
    async fn test_server_shutdown_closes_socket() {
        let (addr, engine) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://{}/workspaces/{}/flows/{}/stream", addr, WS, FLOW))
            .await
            .unwrap();
        ws.send(Message::text(r#"{"parentId":""}"#)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        engine.shutdown.cancel();

        let closed = async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), closed).await.unwrap();
    }

    #[tokio::test]
    async fn test_action_history_stream_ends_when_closed() {
        let (addr, engine) = start_server().await;
        let action = StreamKey::for_action(WS, FLOW, "a1");
        engine.log.append(&action, EventType::ActionResult, json!({ "text": "hi" })).await.unwrap();
        engine.log.close(&action).await.unwrap();

        let (mut ws, _) = connect_async(format!(
            "ws://{}/workspaces/{}/flows/{}/actions/a1/history/stream?cursor=0",
            addr, WS, FLOW
        ))
        .await
        .unwrap();

        let entry = next_json(&mut ws).await;
        assert_eq!(entry["payload"], json!({ "text": "hi" }));

        let end = tokio::time::timeout(Duration::from_secs(2), ws.next()).await.unwrap();
        assert!(matches!(end, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }
}

mod http {
    use super::*;

    fn engine() -> FlowtailEngine {
        let config = Config { streaming: test_config(), ..Config::default() };
        FlowtailEngine::new(&config)
    }

    #[tokio::test]
    async fn test_pull_history_until_end() {
        let engine = engine();
        let (status, _) = request(&engine, Method::PUT, "/workspaces/W/flows/F", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        for i in 1..=2 {
            let (status, body) = request(
                &engine,
                Method::POST,
                "/workspaces/W/flows/F/actions/a1/events",
                Some(json!({ "eventType": "log", "payload": i })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["streamMessageId"], json!(i.to_string()));
        }

        let (status, page) = request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["entries"].as_array().unwrap().len(), 2);
        assert_eq!(page["cursor"], json!("2"));

        let (status, _) = request(&engine, Method::POST, "/workspaces/W/flows/F/actions/a1/close", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, page) = request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history?cursor=2", None).await;
        assert!(page["entries"].as_array().unwrap().is_empty());
        assert_eq!(page["cursor"], json!("end"));

        let (status, _) = request(
            &engine,
            Method::POST,
            "/workspaces/W/flows/F/actions/a1/events",
            Some(json!({ "eventType": "log" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_pull_behind_retention_is_gone() {
        let config = Config {
            streaming: test_config(),
            log: LogConfig { max_entries_per_key: 2, ..LogConfig::default() },
            ..Config::default()
        };
        let engine = FlowtailEngine::new(&config);
        engine.directory.register_flow("W", "F");

        for i in 1..=4 {
            let (status, _) = request(
                &engine,
                Method::POST,
                "/workspaces/W/flows/F/actions/a1/events",
                Some(json!({ "eventType": "log", "payload": i })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) =
            request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history?cursor=1", None).await;
        assert_eq!(status, StatusCode::GONE);
        assert!(body["error"].as_str().unwrap().contains("oldest retained is 3"));

        let (status, page) =
            request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history?cursor=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["entries"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_and_bad_cursor() {
        let engine = engine();
        let (status, body) = request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("workspace"));

        engine.directory.register_workspace("W");
        let (status, _) = request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        engine.directory.register_flow("W", "F");
        let (status, _) = request(&engine, Method::GET, "/workspaces/W/flows/F/actions/a1/history?cursor=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_flow_events_and_stats() {
        let engine = engine();
        engine.directory.register_flow("W", "F");

        let (status, _) = request(
            &engine,
            Method::POST,
            "/workspaces/W/flows/F/events",
            Some(json!({ "parentId": "task-1", "eventType": "progress", "payload": { "pct": 50 } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, stats) = request(&engine, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["keys"][0]["key"]["parentId"], json!("task-1"));
        assert_eq!(stats["keys"][0]["lastPosition"], json!(1));
    }
}
