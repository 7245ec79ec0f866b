use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use index::{GraphStats, Neo4jGraphStore};
use query::RetrievalQA;

#[derive(Clone)]
pub struct AppState {
    pub qa: Arc<RetrievalQA>,
    /// Only used by /health and /stats
    pub graph: Option<neo4rs::Graph>,
}

#[derive(Deserialize)]
pub struct AskForm {
    question: Option<String>,
}

#[derive(Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct PredictResponse {
    pub answer: String,
}

#[derive(Serialize)]
struct HealthResponse {
    neo4j: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_form).post(submit_form))
        .route("/api/predict", post(predict))
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn show_form() -> Html<String> {
    Html(render_page("", ""))
}

async fn submit_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AskForm>,
) -> Html<String> {
    let answer = state.qa.answer_query(form.question.as_deref()).await;
    Html(render_page(form.question.as_deref().unwrap_or(""), &answer))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictRequest>,
) -> Json<PredictResponse> {
    let answer = state.qa.answer_query(req.query.as_deref()).await;
    Json(PredictResponse { answer })
}

async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let graph = state.graph.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    // Check Neo4j with a simple query
    let neo4j_status = match graph.run(neo4rs::query("RETURN 1")).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        neo4j: neo4j_status,
    }))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GraphStats>, StatusCode> {
    let graph = state.graph.clone().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let stats = Neo4jGraphStore::new(graph)
        .get_stats()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read graph stats");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(stats))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_page(question: &str, answer: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Knowledge Graph QA</title>
</head>
<body>
<form method="post" action="/">
  <label for="question">Enter your question</label><br>
  <input type="text" id="question" name="question" size="80" value="{question}"><br>
  <button type="submit">Submit</button>
</form>
<label for="answer">Answer</label><br>
<textarea id="answer" rows="8" cols="80" readonly>{answer}</textarea>
</body>
</html>
"#,
        question = escape_html(question),
        answer = escape_html(answer)
    )
}
