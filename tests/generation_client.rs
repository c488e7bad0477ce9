//! Generation client against stub endpoints served by tiny_http

use sitecloner::{Error, GenerationClient, GenerationConfig, Generator, PageContext};
use std::io::Read;
use std::sync::mpsc;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

/// What the stub saw of the request it answered
struct SeenRequest {
    url: String,
    api_key: Option<String>,
    body: serde_json::Value,
}

/// Serve a single request with `status`/`body` and report what was received.
fn stub_endpoint(status: u16, body: &'static str) -> (String, mpsc::Receiver<SeenRequest>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut raw = String::new();
            let _ = request.as_reader().read_to_string(&mut raw);
            let api_key = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("x-goog-api-key"))
                .map(|h| h.value.as_str().to_string());
            let seen = SeenRequest {
                url: request.url().to_string(),
                api_key,
                body: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            };
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header("Content-Type: application/json".parse::<Header>().unwrap());
            let _ = request.respond(response);
            let _ = tx.send(seen);
        }
    });

    (format!("http://{}/v1beta", addr), rx)
}

fn client(endpoint: &str, api_key: Option<&str>) -> GenerationClient {
    GenerationClient::new(GenerationConfig {
        api_key: api_key.map(str::to_string),
        endpoint: endpoint.to_string(),
        model: "gemini-2.0-flash".to_string(),
        timeout: Duration::from_secs(5),
    })
    .expect("Failed to build client")
}

fn sample_context() -> PageContext {
    PageContext {
        html: "<html><head><title>Shop</title></head><body><h1>Shop</h1></body></html>".into(),
        css_links: vec!["https://shop.test/main.css".into()],
        images: vec!["https://shop.test/logo.png".into()],
        screenshot: Some(vec![0x89, b'P', b'N', b'G']),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_generated_document_is_unwrapped() {
    let (endpoint, seen) = stub_endpoint(
        200,
        r#"{"candidates":[{"content":{"parts":[{"text":"<!DOCTYPE html><html><head></head><body>clone</body></html>"}]}}]}"#,
    );

    let ctx = sample_context();
    let doc = client(&endpoint, Some("test-key"))
        .generate_from_context(&ctx.generation_context())
        .await
        .expect("generation should succeed");

    assert!(doc.as_str().starts_with("<!DOCTYPE html>"));
    assert!(doc.has_document_structure());

    let seen = seen.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(seen.url, "/v1beta/models/gemini-2.0-flash:generateContent");
    assert_eq!(seen.api_key.as_deref(), Some("test-key"));

    // Prompt travels as the single text part of a single content entry
    let parts = &seen.body["contents"][0]["parts"];
    assert_eq!(parts.as_array().map(|p| p.len()), Some(1));
    let prompt = parts[0]["text"].as_str().unwrap();
    assert!(prompt.contains("<h1>Shop</h1>"));
    assert!(prompt.contains("https://shop.test/main.css"));
    assert!(prompt.contains("https://shop.test/logo.png"));
    assert!(prompt.contains("screenshot"));
}

#[tokio::test]
async fn test_missing_candidates_is_invalid_response() {
    let (endpoint, _seen) = stub_endpoint(200, r#"{"usageMetadata":{"promptTokenCount":12}}"#);
    let err = client(&endpoint, Some("k")).generate("prompt").await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)), "{:?}", err);
}

#[tokio::test]
async fn test_whitespace_output_is_empty_output() {
    let (endpoint, _seen) =
        stub_endpoint(200, r#"{"candidates":[{"content":{"parts":[{"text":" \n\n  "}]}}]}"#);
    let err = client(&endpoint, Some("k")).generate("prompt").await.unwrap_err();
    assert!(matches!(err, Error::EmptyOutput), "{:?}", err);
}

#[tokio::test]
async fn test_error_status_carries_status_and_body() {
    let (endpoint, _seen) =
        stub_endpoint(429, r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#);
    let err = client(&endpoint, Some("k")).generate("prompt").await.unwrap_err();
    match err {
        Error::RequestFailed { status, message } => {
            assert_eq!(status, Some(429));
            assert!(message.contains("Resource has been exhausted"));
        }
        other => panic!("expected RequestFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_credential_makes_no_request() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/v1beta", server.server_addr());

    let err = client(&endpoint, None).generate("prompt").await.unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)), "{:?}", err);

    let request = server.recv_timeout(Duration::from_millis(300)).unwrap();
    assert!(request.is_none(), "no request should reach the endpoint");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_request_failed() {
    // Bind then drop to get a port nothing listens on
    let addr = {
        let server = Server::http("127.0.0.1:0").unwrap();
        server.server_addr().to_string()
    };
    let err = client(&format!("http://{}", addr), Some("k"))
        .generate("prompt")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed { status: None, .. }), "{:?}", err);
}
