use crate::attempt::AttemptHandle;
use crate::error::{AppError, AttemptError};
use crate::models::{QuestionType, Quiz, QuizOption, QuizResult};
use crate::runner::AttemptSnapshot;
use crate::shuffle::shuffle_questions;
use crate::state::{AppState, StoredResult};
use crate::ws_protocol::{WsEnvelope, ATTEMPT_ABANDONED, QUIZ_SUBMITTED};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn find_attempt(state: &AppState, id: &Uuid, req_id: &str) -> Result<AttemptHandle, AppError> {
    if let Some(handle) = state.attempt(id) {
        return Ok(handle);
    }
    Err(missing_attempt(state, id, req_id))
}

fn attempt_error(state: &AppState, id: &Uuid, err: AttemptError, req_id: &str) -> AppError {
    match err {
        AttemptError::Closed => missing_attempt(state, id, req_id),
        err => AppError::from_attempt(err, req_id),
    }
}

/// Error for an id with no live attempt: a conflict once it was submitted,
/// otherwise not found.
fn missing_attempt(state: &AppState, id: &Uuid, req_id: &str) -> AppError {
    if state.results.contains(id) {
        AppError::from_attempt(AttemptError::AlreadySubmitted, req_id)
    } else {
        AppError::not_found("attempt not found", req_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub time_limit: u32,
    pub question_count: usize,
}

#[derive(Debug, Serialize)]
pub struct QuizListResponse {
    pub items: Vec<QuizSummary>,
    pub total: usize,
}

/// A question as shown to the taker: no answer key, only whether several
/// options may be picked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<QuizOption>,
    pub multi_select: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub time_limit: u32,
    pub questions: Vec<QuestionView>,
}

impl From<&Quiz> for QuizView {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id.clone(),
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            time_limit: quiz.time_limit_minutes,
            questions: quiz
                .questions
                .iter()
                .map(|q| QuestionView {
                    id: q.id.clone(),
                    text: q.text.clone(),
                    question_type: q.question_type,
                    options: q.options.clone(),
                    multi_select: q.allows_multi_select(),
                })
                .collect(),
        }
    }
}

pub async fn list_quizzes(
    State(state): State<AppState>,
    Query(viewer): Query<ViewerQuery>,
) -> Json<QuizListResponse> {
    let items: Vec<QuizSummary> = state
        .catalog
        .visible_to(viewer.user_id.as_deref())
        .iter()
        .map(|q| QuizSummary {
            id: q.id.clone(),
            title: q.title.clone(),
            description: q.description.clone(),
            time_limit: q.time_limit_minutes,
            question_count: q.questions.len(),
        })
        .collect();
    Json(QuizListResponse {
        total: items.len(),
        items,
    })
}

pub async fn get_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<QuizView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let quiz = state
        .catalog
        .get_visible(&id, viewer.user_id.as_deref())
        .ok_or_else(|| AppError::not_found("quiz not found", req_id))?;
    Ok(Json(QuizView::from(quiz.as_ref())))
}

#[derive(Debug, Deserialize)]
pub struct ShufflePayload {
    pub questions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ShuffleResponse {
    pub shuffled: Vec<String>,
}

pub async fn shuffle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ShufflePayload>,
) -> Result<Json<ShuffleResponse>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let shuffled = shuffle_questions(state.shuffler.as_ref(), payload.questions)
        .await
        .map_err(|e| AppError::from_shuffle(e, req_id))?;
    Ok(Json(ShuffleResponse { shuffled }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptPayload {
    pub quiz_id: String,
    pub user_id: Option<String>,
}

pub async fn start_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartAttemptPayload>,
) -> Result<(StatusCode, Json<AttemptSnapshot>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let quiz = state
        .catalog
        .get_visible(&payload.quiz_id, payload.user_id.as_deref())
        .ok_or_else(|| AppError::not_found("quiz not found", req_id.clone()))?;
    let handle = state.start_attempt(quiz, payload.user_id);
    let snapshot = handle
        .snapshot()
        .await
        .map_err(|e| AppError::from_attempt(e, req_id))?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn get_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<AttemptSnapshot>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if let Some(stored) = state.results.get(&id) {
        return Ok(Json(stored.final_state));
    }
    let handle = find_attempt(&state, &id, &req_id)?;
    match handle.snapshot().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        // Finalized while the request was in flight.
        Err(AttemptError::Closed) => state
            .results
            .get(&id)
            .map(|stored| Json(stored.final_state))
            .ok_or_else(|| AppError::not_found("attempt not found", req_id)),
        Err(err) => Err(AppError::from_attempt(err, req_id)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptionPayload {
    pub question_id: String,
    pub option_id: String,
}

pub async fn select_option(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectOptionPayload>,
) -> Result<Json<AttemptSnapshot>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = find_attempt(&state, &id, &req_id)?;
    let snapshot = handle
        .select_option(&payload.question_id, &payload.option_id)
        .await
        .map_err(|e| attempt_error(&state, &id, e, &req_id))?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnswerPayload {
    pub question_id: String,
    pub value: String,
}

pub async fn set_text_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<TextAnswerPayload>,
) -> Result<Json<AttemptSnapshot>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = find_attempt(&state, &id, &req_id)?;
    let snapshot = handle
        .set_text_answer(&payload.question_id, &payload.value)
        .await
        .map_err(|e| attempt_error(&state, &id, e, &req_id))?;
    Ok(Json(snapshot))
}

pub async fn next_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<AttemptSnapshot>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = find_attempt(&state, &id, &req_id)?;
    let snapshot = handle
        .go_next()
        .await
        .map_err(|e| attempt_error(&state, &id, e, &req_id))?;
    Ok(Json(snapshot))
}

pub async fn previous_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<AttemptSnapshot>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = find_attempt(&state, &id, &req_id)?;
    let snapshot = handle
        .go_previous()
        .await
        .map_err(|e| attempt_error(&state, &id, e, &req_id))?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    pub confirmed: bool,
}

pub async fn submit_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitPayload>,
) -> Result<Json<QuizResult>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = find_attempt(&state, &id, &req_id)?;
    let result = handle
        .submit(payload.confirmed)
        .await
        .map_err(|e| attempt_error(&state, &id, e, &req_id))?;
    Ok(Json(result))
}

pub async fn attempt_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredResult>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if let Some(stored) = state.results.get(&id) {
        return Ok(Json(stored));
    }
    if state.attempt(&id).is_some() {
        return Err(AppError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "attempt has not been submitted yet",
            req_id,
        ));
    }
    Err(AppError::not_found("attempt not found", req_id))
}

pub async fn abandon_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = state
        .remove_attempt(&id)
        .ok_or_else(|| missing_attempt(&state, &id, &req_id))?;
    if let Err(err) = handle.abandon().await {
        warn!(attempt_id = %id, "attempt task already stopped: {}", err);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let req_id = request_id_from_headers(&headers);
    let handle = find_attempt(&state, &id, &req_id)?;
    let receiver = handle.subscribe();
    // The final event may have gone out before the subscription.
    if state.results.contains(&id) {
        return Err(AppError::from_attempt(AttemptError::AlreadySubmitted, req_id));
    }
    Ok(ws.on_upgrade(move |socket| ws_session(socket, id, receiver)))
}

async fn ws_session(stream: WebSocket, attempt_id: Uuid, mut receiver: broadcast::Receiver<WsEnvelope>) {
    let (mut sender_ws, mut receiver_ws) = stream.split();

    let send_task = tokio::spawn(async move {
        loop {
            let msg = match receiver.recv().await {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(attempt_id = %attempt_id, skipped, "ws subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = sender_ws.send(Message::Close(None)).await;
                    break;
                }
            };
            let terminal = msg.event == QUIZ_SUBMITTED || msg.event == ATTEMPT_ABANDONED;
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender_ws.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            if terminal {
                let _ = sender_ws.send(Message::Close(None)).await;
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver_ws.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    send_task.abort();
    info!("ws disconnected for attempt {}", attempt_id);
}
