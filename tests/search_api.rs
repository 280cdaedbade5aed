mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{seeded_index, KeywordEmbedder, MemoryIndex};
use course_search::{router, AppState, SearchLimits, SearchService};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = Arc::new(seeded_index(&embedder));
    let service = SearchService::new(embedder, index, SearchLimits::default());
    router(AppState::new(service))
}

fn search_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let response = app()
        .oneshot(search_request(json!({"query": "SQL fundamentals", "top_k": 2})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );

    let body = json_body(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], "Introduction to SQL");
    assert_eq!(results[0]["data"]["course_name"], "Introduction to SQL");
    assert_eq!(results[0]["data"]["slug"], "introduction-to-sql");
    assert!(results[0]["score"].as_f64().unwrap() > results[1]["score"].as_f64().unwrap());
    assert_eq!(body["debug_info"]["query_text"], "SQL fundamentals");
    assert_eq!(
        body["debug_info"]["vector_dimensions"],
        KeywordEmbedder::dimension()
    );
}

#[tokio::test]
async fn defaults_apply_when_fields_are_omitted() {
    let response = app()
        .oneshot(search_request(json!({"query": "python"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn non_positive_top_k_is_rejected() {
    for top_k in [0, -3] {
        let response = app()
            .oneshot(search_request(json!({"query": "python", "top_k": top_k})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().contains("top_k"));
    }
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let response = app()
        .oneshot(search_request(json!({"query": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_query_is_a_client_error() {
    let response = app()
        .oneshot(search_request(json!({"top_k": 3})))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn healthz_reports_ok() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn preflight_allows_any_origin() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/search")
                .header(header::ORIGIN, "https://example.org")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn dimension_mismatch_maps_to_internal_error() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = Arc::new(MemoryIndex::new(KeywordEmbedder::dimension() + 3));
    let app = router(AppState::new(SearchService::new(
        embedder,
        index,
        SearchLimits::default(),
    )));

    let response = app
        .oneshot(search_request(json!({"query": "python"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("dimensions"), "{message}");
}
