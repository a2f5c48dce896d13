//! HTTP strategies against an in-process axum server

use agroadb_lookup::catalog::normalize_cnpj;
use agroadb_lookup::{
    Credential, FallbackExecutor, HttpStrategy, LookupResult, ResponseFormat, ScrapeRule,
    SourceDescriptor, Strategy, StrategyError, Subject,
};
use agroadb_resilience::RetryPolicy;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Hits {
    flaky: Arc<AtomicU32>,
    down: Arc<AtomicU32>,
}

async fn company(Path(document): Path<String>) -> Json<Value> {
    Json(json!({
        "cnpj": document,
        "razao_social": "AGROPECUARIA BOA VISTA LTDA",
        "descricao_situacao_cadastral": "ATIVA"
    }))
}

async fn flaky(State(hits): State<Hits>) -> impl IntoResponse {
    if hits.flaky.fetch_add(1, Ordering::SeqCst) < 2 {
        (StatusCode::BAD_GATEWAY, Json(json!({"error": "upstream"})))
    } else {
        (StatusCode::OK, Json(json!({"nome": "AGROPECUARIA BOA VISTA LTDA"})))
    }
}

async fn down(State(hits): State<Hits>) -> StatusCode {
    hits.down.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn throttled() -> impl IntoResponse {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "3")],
        "slow down",
    )
}

async fn guarded(headers: HeaderMap) -> impl IntoResponse {
    match headers.get("chave-api-dados").and_then(|v| v.to_str().ok()) {
        Some("k-123") => (StatusCode::OK, Json(json!([{"numeroProcesso": "1"}]))),
        _ => (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))),
    }
}

async fn search(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Json(json!({"authorization": auth, "echo": body}))
}

async fn page() -> Html<&'static str> {
    Html(
        r#"<html><body><table>
        <tr><th>Código do imóvel</th><td>MT-5107925-A1B2</td></tr>
        <tr><th>Situação</th><td><span>Ativo</span></td></tr>
        </table></body></html>"#,
    )
}

async fn spawn_server() -> (String, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/cnpj/:document", get(company))
        .route("/flaky", get(flaky))
        .route("/down", get(down))
        .route("/throttled", get(throttled))
        .route("/guarded", get(guarded))
        .route("/plain", get(|| async { "not json" }))
        .route("/search", post(search))
        .route("/page", get(page))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn cnpj() -> Subject {
    Subject::parse("11.222.333/0001-81").unwrap()
}

#[tokio::test]
async fn test_json_success_renders_document() {
    let (base, _) = spawn_server().await;
    let strategy = HttpStrategy::get("brasilapi", client(), format!("{}/cnpj/{{document}}", base));

    let raw = strategy.fetch(&cnpj()).await.unwrap();
    assert_eq!(raw["cnpj"], json!("11222333000181"));

    let payload = normalize_cnpj(&raw).unwrap();
    assert_eq!(payload["name"], json!("AGROPECUARIA BOA VISTA LTDA"));
}

#[tokio::test]
async fn test_status_classification() {
    let (base, _) = spawn_server().await;
    let fetch = |path: &str| {
        let strategy = HttpStrategy::get("status_check", client(), format!("{}{}", base, path));
        async move { strategy.fetch(&cnpj()).await }
    };

    assert_eq!(
        fetch("/throttled").await.unwrap_err(),
        StrategyError::RateLimited {
            retry_after: Some(Duration::from_secs(3))
        }
    );
    assert!(matches!(fetch("/down").await, Err(StrategyError::Network(_))));
    assert_eq!(
        fetch("/does-not-exist").await.unwrap_err(),
        StrategyError::parse("not found")
    );
    assert!(fetch("/guarded").await.unwrap_err().is_credentials_missing());
    assert!(matches!(fetch("/plain").await, Err(StrategyError::Parse(_))));
}

#[tokio::test]
async fn test_header_credential_is_sent() {
    let (base, _) = spawn_server().await;
    let strategy = HttpStrategy::get("ceis", client(), format!("{}/guarded", base))
        .with_credential(Credential::header("chave-api-dados", Some("k-123".into())));

    let raw = strategy.fetch(&cnpj()).await.unwrap();
    assert_eq!(raw, json!([{"numeroProcesso": "1"}]));
}

#[tokio::test]
async fn test_post_body_template_and_scheme() {
    let (base, _) = spawn_server().await;
    let strategy = HttpStrategy::post_json(
        "datajud",
        client(),
        format!("{}/search", base),
        json!({"query": {"match": {"partes.documento": "{document}"}}, "size": 10}),
    )
    .with_credential(Credential::header("Authorization", Some("abc".into())).with_scheme("APIKey"));

    let raw = strategy.fetch(&cnpj()).await.unwrap();
    assert_eq!(raw["authorization"], json!("APIKey abc"));
    assert_eq!(
        raw["echo"],
        json!({"query": {"match": {"partes.documento": "11222333000181"}}, "size": 10})
    );
}

#[tokio::test]
async fn test_html_scrape() {
    let (base, _) = spawn_server().await;
    let strategy = HttpStrategy::get("sicar_page", client(), format!("{}/page", base)).with_format(
        ResponseFormat::Html(vec![
            ScrapeRule::new("codigo_imovel", r"(?s)C[oó]digo do im[oó]vel.*?<td[^>]*>(.*?)</td>")
                .unwrap(),
            ScrapeRule::new("situacao", r"(?s)Situa[cç][aã]o.*?<td[^>]*>(.*?)</td>").unwrap(),
        ]),
    );

    let raw = strategy.fetch(&cnpj()).await.unwrap();
    assert_eq!(
        raw,
        json!({"codigo_imovel": "MT-5107925-A1B2", "situacao": "Ativo"})
    );
}

#[tokio::test]
async fn test_server_errors_are_retried_before_falling_back() {
    let (base, hits) = spawn_server().await;
    let descriptor = SourceDescriptor::builder("receita_cnpj", normalize_cnpj)
        .strategy(Arc::new(HttpStrategy::get(
            "primary",
            client(),
            format!("{}/down", base),
        )))
        .strategy(Arc::new(HttpStrategy::get(
            "secondary",
            client(),
            format!("{}/flaky", base),
        )))
        .build()
        .unwrap();

    let executor = FallbackExecutor::new(RetryPolicy::fast());
    let (result, trace) = executor.execute_traced(&descriptor, &cnpj()).await;

    assert_eq!(result.strategy(), Some("secondary"));
    assert_eq!(hits.down.load(Ordering::SeqCst), 3);
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 3);
    assert_eq!(trace.fallbacks, 1);
    assert_eq!(trace.retries_for("secondary"), 2);
}

#[tokio::test]
async fn test_missing_token_reports_credentials_missing() {
    let (base, _) = spawn_server().await;
    let descriptor = SourceDescriptor::builder("receita_cpf", normalize_cnpj)
        .requires_credentials(true)
        .strategy(Arc::new(
            HttpStrategy::get("serpro", client(), format!("{}/cnpj/{{document}}", base))
                .with_credential(Credential::bearer(None)),
        ))
        .build()
        .unwrap();

    let result = FallbackExecutor::new(RetryPolicy::fast())
        .execute(&descriptor, &cnpj())
        .await;
    assert_eq!(result, LookupResult::credentials_missing("receita_cpf"));
}
