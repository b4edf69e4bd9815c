use axum::{Json, extract::State};
use std::time::Instant;
use tracing::info;

use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{Note, NoteRequest};
use crate::state::AppState;

// Scrape a URL and extract a note from it
pub async fn scrape_handler(
    State(state): State<AppState>,
    Json(payload): Json<NoteRequest>,
) -> Json<Note> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let note = state.orchestrator.fetch_and_extract(&payload.url).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    info!(url = %payload.url, success = note.success, "scrape request served");
    Json(note)
}

// Parse a note from raw content
pub async fn parse_handler(
    State(state): State<AppState>,
    Json(payload): Json<NoteRequest>,
) -> Json<Note> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let note = state.orchestrator.parse(&payload.raw_content).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    info!(success = note.success, "parse request served");
    Json(note)
}

// Enrich a note with generated Q&A
pub async fn generate_questions_handler(
    State(state): State<AppState>,
    Json(note): Json<Note>,
) -> Json<Note> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let note = state.orchestrator.generate_qa(note).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    info!(success = note.success, pairs = note.qa.len(), "Q&A request served");
    Json(note)
}
