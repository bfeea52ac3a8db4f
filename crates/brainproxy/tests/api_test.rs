//! Integration tests for the HTTP API.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;

use brainproxy::api::DEFAULT_SESSION_ID;
use brainproxy::cache::ActiveCache;
use brainproxy::llm::LLMError;
use common::{
    ScriptedProvider, TestOptions, call_response, chat_body, json_body, test_app, test_app_with,
    text_response,
};

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(body))
        .unwrap()
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[tokio::test]
async fn test_livez() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::get("/livez").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_readyz_reports_mode() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["mode"], "CLEAN");
}

#[tokio::test]
async fn test_version() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::get("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.get("version").is_some());
}

#[tokio::test]
async fn test_admin_shutdown_requires_loopback() {
    let app = test_app();

    // oneshot carries no peer address, so the loopback check fails
    let response = app
        .router
        .oneshot(
            Request::post("/api/admin/v1/shutdown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Native Chat
// ============================================================================

#[tokio::test]
async fn chat_makes_one_call_and_stores_two_turns() {
    let provider = ScriptedProvider::new(vec![Ok(text_response("hello back"))]);
    let app = test_app_with(provider, TestOptions::default());

    let response = app
        .router
        .oneshot(post_json("/chat", chat_body("hi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["text"], "hello back");
    assert_eq!(json["prompt_tokens"], 10);
    assert_eq!(json["response_tokens"], 5);
    assert_eq!(json["total_tokens"], 15);
    assert!(json.get("tool_calls").is_none());

    let requests = app.provider.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].cached_content.is_none());
    assert!(requests[0].tools.is_empty());

    let history = app.state.orchestrator.sessions().history(DEFAULT_SESSION_ID);
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn chat_replays_history_across_turns() {
    let provider = ScriptedProvider::new(vec![
        Ok(text_response("one")),
        Ok(text_response("two")),
        Ok(text_response("three")),
    ]);
    let app = test_app_with(provider, TestOptions::default());

    for message in ["first", "second", "third"] {
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/chat",
                json!({ "message": message, "session_id": "multi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let history = app.state.orchestrator.sessions().history("multi");
    assert_eq!(history.len(), 6);
    assert_eq!(history[4].text(), "third");
    assert_eq!(history[5].text(), "three");

    let requests = app.provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].contents.len(), 1);
    assert_eq!(requests[2].contents.len(), 5);
    assert_eq!(requests[2].contents[1].text(), "one");
}

#[tokio::test]
async fn chat_rejects_blocked_model() {
    let app = test_app();

    let response = app
        .router
        .oneshot(post_json(
            "/chat",
            json!({ "message": "hi", "model": "gemini-2.0-flash-exp" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let json = body_json(response).await;
    assert_eq!(json["detail"], "Experimental models are not allowed");
    assert!(app.provider.requests().is_empty());
    assert!(app.state.orchestrator.sessions().is_empty());
}

#[tokio::test]
async fn chat_attaches_cache_for_matching_model() {
    let provider = ScriptedProvider::new(vec![Ok(text_response("cached answer"))]);
    let options = TestOptions {
        cache: ActiveCache::explicit("cachedContents/abc", "gemini-2.0-flash"),
        ..TestOptions::default()
    };
    let app = test_app_with(provider, options);

    let response = app
        .router
        .oneshot(post_json(
            "/chat",
            json!({ "message": "hi", "model": "gemini-2.0-flash-001" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let requests = app.provider.requests();
    assert_eq!(
        requests[0].cached_content.as_deref(),
        Some("cachedContents/abc")
    );
}

#[tokio::test]
async fn chat_agentic_write_runs_tool_once() {
    let provider = ScriptedProvider::new(vec![
        Ok(call_response(
            "write_file",
            json!({ "path": "notes/out.txt", "content": "written" }),
        )),
        Ok(text_response("done")),
    ]);
    let app = test_app_with(provider, TestOptions::default());

    let response = app
        .router
        .oneshot(post_json(
            "/chat",
            json!({ "message": "write it", "use_agentic": true, "session_id": "s1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["text"], "done");
    assert_eq!(json["tool_calls"], json!(["Executed: write_file"]));

    let written = std::fs::read_to_string(app.root.path().join("notes/out.txt")).unwrap();
    assert_eq!(written, "written");

    assert_eq!(app.provider.requests().len(), 2);
    // user, model call, tool results, answer
    assert_eq!(app.state.orchestrator.sessions().history("s1").len(), 4);
}

#[tokio::test]
async fn chat_upstream_failure_is_bad_gateway() {
    let provider = ScriptedProvider::new(vec![Err(LLMError::Api {
        status: 503,
        message: "overloaded".to_string(),
    })]);
    let app = test_app_with(provider, TestOptions::default());

    let response = app
        .router
        .oneshot(post_json("/chat", chat_body("hi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let json = body_json(response).await;
    assert!(json["detail"].as_str().unwrap().contains("overloaded"));
    assert!(app.state.orchestrator.sessions().history(DEFAULT_SESSION_ID).is_empty());
    assert!(app.state.orchestrator.sessions().is_empty());
}

#[tokio::test]
async fn chat_empty_message_falls_back() {
    let app = test_app();

    let response = app
        .router
        .oneshot(post_json("/chat", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let requests = app.provider.requests();
    assert_eq!(requests[0].first_user_text(), Some("Hello"));
}

#[tokio::test]
async fn chat_requires_auth_when_token_set() {
    let options = TestOptions {
        api_token: Some("secret".to_string()),
        ..TestOptions::default()
    };
    let app = test_app_with(ScriptedProvider::default(), options);

    let response = app
        .router
        .clone()
        .oneshot(post_json("/chat", chat_body("hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json("/chat", chat_body("hi"));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Native Auxiliary Endpoints
// ============================================================================

#[tokio::test]
async fn reset_clears_sessions() {
    let app = test_app();
    let sessions = app.state.orchestrator.sessions();
    sessions.store("a", Vec::new());
    sessions.store("b", Vec::new());

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/reset?session_id=a").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(sessions.len(), 1);

    let response = app
        .router
        .oneshot(Request::post("/reset").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"All sessions cleared.");
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn status_reports_cache_and_costs() {
    let options = TestOptions {
        cache: ActiveCache::explicit("cachedContents/abc", "gemini-2.0-flash"),
        ..TestOptions::default()
    };
    let app = test_app_with(ScriptedProvider::default(), options);

    let response = app
        .router
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["mode"], "CACHED");
    assert_eq!(json["cache_id"], "cachedContents/abc");
    assert_eq!(json["cache_mode"], "explicit");
    assert_eq!(json["sessions"], 0);
    assert_eq!(json["total_cost"], 0.0);
}

#[tokio::test]
async fn files_lists_and_hides_noise() {
    let app = test_app();
    let root = app.root.path();
    std::fs::create_dir(root.join("src")).unwrap();
    std::fs::create_dir(root.join("node_modules")).unwrap();
    std::fs::write(root.join(".env"), "x").unwrap();
    std::fs::write(root.join("main.rs"), "fn main() {}").unwrap();

    let response = app
        .router
        .oneshot(Request::get("/files").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["files"], json!(["main.rs", "src/"]));
}

#[tokio::test]
async fn files_rejects_escape() {
    let app = test_app();

    let response = app
        .router
        .oneshot(
            Request::get("/files?path=../../etc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
}

#[tokio::test]
async fn files_missing_dir_is_not_found() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::get("/files?path=nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn models_filters_blocked_ids() {
    let provider = ScriptedProvider::default().with_models(&[
        "gemini-2.0-flash",
        "gemini-2.5-pro-preview",
        "gemini-exp-1206",
    ]);
    let app = test_app_with(provider, TestOptions::default());

    let response = app
        .router
        .oneshot(Request::get("/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let models = json["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], "gemini-2.0-flash");
    assert_eq!(models[0]["name"], "GEMINI-2.0-FLASH");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = test_app();

    let response = app
        .router
        .oneshot(
            Request::post("/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(app.provider.requests().is_empty());
}
