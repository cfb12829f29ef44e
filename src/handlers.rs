use crate::catalog::ExamCatalog;
use crate::error::{AppError, ErrorDetail};
use crate::models::{AnswerValue, ExamStatus, QuestionId, User};
use crate::results::build_report;
use crate::session::SessionView;
use crate::state::{Abandon, AppState, SessionAccess, SharedSession};
use crate::timer::Clock;
use crate::ws_protocol::{WsEnvelope, SESSION_STATE, SYNC};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use validator::Validate;

const SESSION_COOKIE: &str = "student_session";
static RATE_LIMIT: Lazy<DashMap<String, (u32, Instant)>> = Lazy::new(DashMap::new);

fn check_rate_limit(scope: &str, key: &str, limit_per_minute: u32) -> bool {
    let now = Instant::now();
    let full_key = format!("{scope}:{key}");
    if let Some(mut entry) = RATE_LIMIT.get_mut(&full_key) {
        if now.duration_since(entry.1) > Duration::from_secs(60) {
            *entry = (1, now);
            true
        } else if entry.0 >= limit_per_minute {
            false
        } else {
            entry.0 += 1;
            true
        }
    } else {
        RATE_LIMIT.insert(full_key, (1, now));
        true
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn current_user(jar: &CookieJar, state: &AppState) -> Option<User> {
    let sid = jar.get(SESSION_COOKIE)?.value().to_string();
    let logins = state.db.logins.read().await;
    logins.get(&sid).cloned()
}

async fn require_user(jar: &CookieJar, state: &AppState, req_id: &str) -> Result<User, AppError> {
    current_user(jar, state)
        .await
        .ok_or_else(|| AppError::unauthorized(req_id))
}

fn find_exam(state: &AppState, exam_id: &str, req_id: &str) -> Result<Arc<ExamCatalog>, AppError> {
    state
        .content
        .exam(exam_id)
        .ok_or_else(|| AppError::not_found("exam not found", req_id))
}

async fn owned_session(state: &AppState, session_id: &str, user: &User, req_id: &str) -> Result<SharedSession, AppError> {
    state
        .session_for(session_id, &user.id)
        .await
        .map_err(|access| match access {
            SessionAccess::Missing => AppError::not_found("session not found", req_id),
            SessionAccess::Forbidden => {
                AppError::new(StatusCode::FORBIDDEN, "FORBIDDEN", "access denied", req_id)
            }
        })
}

fn validation_error(errors: validator::ValidationErrors, req_id: &str) -> AppError {
    let details = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| ErrorDetail {
                field: field.to_string(),
                issue: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    AppError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "invalid payload", req_id).with_details(details)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Dashboard,
    Take,
    Results,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextScreen {
    pub screen: Screen,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
}

impl NextScreen {
    fn to(screen: Screen, exam_id: &str) -> Self {
        Self {
            screen,
            exam_id: Some(exam_id.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub identifier: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub next: NextScreen,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginPayload>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local");
    if !check_rate_limit("auth_login", ip, 30) {
        return Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "too many requests",
            req_id,
        ));
    }
    payload.validate().map_err(|e| validation_error(e, &req_id))?;

    // Credentials are not checked: any identifier resolves to a profile.
    let user = state
        .content
        .find_user(&payload.identifier)
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "invalid credentials", req_id.clone()))?;

    let session_id = uuid::Uuid::new_v4().to_string();
    state.db.logins.write().await.insert(session_id.clone(), user.clone());
    info!(user = %user.id, "student logged in");

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user,
            next: NextScreen {
                screen: Screen::Dashboard,
                exam_id: None,
            },
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    let req_id = request_id_from_headers(&headers);
    let sid = jar
        .get(SESSION_COOKIE)
        .map(|v| v.value().to_string())
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "no session", req_id.clone()))?;
    state.db.logins.write().await.remove(&sid);
    Ok((jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/")), StatusCode::NO_CONTENT))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<User>, AppError> {
    let req_id = request_id_from_headers(&headers);
    Ok(Json(require_user(&jar, &state, &req_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub q: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamCard {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub status: ExamStatus,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub duration_minutes: u32,
    pub total_questions: usize,
    pub can_start: bool,
}

fn exam_card(catalog: &ExamCatalog) -> ExamCard {
    let exam = catalog.exam();
    ExamCard {
        id: exam.id.clone(),
        title: exam.title.clone(),
        course_code: exam.course_code.clone(),
        status: exam.status,
        start_date: exam.start_date.clone(),
        start_time: exam.start_time.clone(),
        duration_minutes: exam.duration_minutes,
        total_questions: exam.total_questions,
        can_start: exam.status == ExamStatus::Live,
    }
}

fn matches_filter(card: &ExamCard, query: &DashboardQuery) -> bool {
    let status_ok = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => true,
        Some("live") => card.status == ExamStatus::Live,
        Some("upcoming") => card.status == ExamStatus::Upcoming,
        Some("locked") => card.status == ExamStatus::Locked,
        Some(_) => false,
    };
    let text_ok = match query.q.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(needle) => {
            let needle = needle.to_lowercase();
            card.title.to_lowercase().contains(&needle) || card.course_code.to_lowercase().contains(&needle)
        }
    };
    status_ok && text_ok
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let exams: Vec<_> = state
        .content
        .exams()
        .iter()
        .map(|c| exam_card(c))
        .filter(|card| matches_filter(card, &query))
        .collect();
    Ok(Json(json!({
        "user": user,
        "greeting": format!("Welcome back, {}!", user.first_name()),
        "exams": exams,
        "announcements": state.content.announcements(),
    })))
}

pub async fn instructions(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(exam_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    require_user(&jar, &state, &req_id).await?;
    let catalog = find_exam(&state, &exam_id, &req_id)?;
    let exam = catalog.exam();
    Ok(Json(json!({
        "examId": exam.id,
        "title": exam.title,
        "courseCode": exam.course_code,
        "durationMinutes": exam.duration_minutes,
        "totalQuestions": exam.total_questions,
        "totalMarks": exam.total_marks,
        "status": exam.status,
        "instructions": state.content.instructions(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct StartPayload {
    #[serde(default)]
    pub agreed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
    pub resumed: bool,
    pub next: NextScreen,
    pub session: SessionView,
}

pub async fn start_exam(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(exam_id): Path<String>,
    Json(payload): Json<StartPayload>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let catalog = find_exam(&state, &exam_id, &req_id)?;
    if !payload.agreed {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "instructions must be accepted",
            req_id,
        )
        .with_details(vec![ErrorDetail {
            field: "agreed".into(),
            issue: "must be true".into(),
        }]));
    }
    if catalog.exam().status != ExamStatus::Live {
        return Err(AppError::new(StatusCode::CONFLICT, "CONFLICT", "exam is not live", req_id));
    }

    let (session_id, resumed) = state.start_session(&user, catalog).await;
    let shared = owned_session(&state, &session_id, &user, &req_id).await?;
    let view = shared.lock().await.view();
    let status = if resumed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(StartResponse {
            session_id,
            resumed,
            next: NextScreen::to(Screen::Take, &exam_id),
            session: view,
        }),
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let view = shared.lock().await.view();
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct AnswerPayload {
    pub value: AnswerValue,
}

pub async fn set_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path((id, question_id)): Path<(String, QuestionId)>,
    Json(payload): Json<AnswerPayload>,
) -> Result<Json<SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let mut session = shared.lock().await;
    session
        .set_answer(question_id, payload.value)
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(session.view()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct OptionPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub option: String,
    pub checked: bool,
}

pub async fn select_option(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path((id, question_id)): Path<(String, QuestionId)>,
    Json(payload): Json<OptionPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    payload.validate().map_err(|e| validation_error(e, &req_id))?;
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let mut session = shared.lock().await;
    let value = session
        .select_option(question_id, &payload.option, payload.checked)
        .map_err(|e| AppError::session(e, req_id))?
        .clone();
    Ok(Json(json!({
        "questionId": question_id,
        "value": value,
        "answered": value.is_filled(),
    })))
}

pub async fn toggle_flag(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path((id, question_id)): Path<(String, QuestionId)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let flagged = shared
        .lock()
        .await
        .toggle_flag(question_id)
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(json!({ "questionId": question_id, "flagged": flagged })))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum NavigatePayload {
    Next,
    Previous,
    Jump {
        #[serde(rename = "questionId")]
        question_id: QuestionId,
    },
}

pub async fn navigate(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
    Json(payload): Json<NavigatePayload>,
) -> Result<Json<SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let mut session = shared.lock().await;
    let moved = match payload {
        NavigatePayload::Next => session.next(),
        NavigatePayload::Previous => session.previous(),
        NavigatePayload::Jump { question_id } => session.jump_to(question_id),
    };
    moved.map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(session.view()))
}

pub async fn request_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let mut session = shared.lock().await;
    let prompt = session
        .request_submit()
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(json!({
        "confirmOpen": true,
        "unanswered": prompt.unanswered,
        "totalQuestions": session.total_questions(),
    })))
}

pub async fn cancel_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    shared
        .lock()
        .await
        .cancel_submit()
        .map_err(|e| AppError::session(e, req_id))?;
    Ok(Json(json!({ "confirmOpen": false })))
}

pub async fn confirm_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    let submission = {
        let mut session = shared.lock().await;
        session
            .confirm_submit()
            .map_err(|e| AppError::session(e, req_id.clone()))?
    };
    let exam_id = submission.exam_id.clone();
    let answered = submission.answered;
    let unanswered = submission.unanswered;
    state.complete_session(&id, submission, false).await;
    Ok(Json(json!({
        "status": "submitted",
        "answered": answered,
        "unanswered": unanswered,
        "next": NextScreen::to(Screen::Results, &exam_id),
    })))
}

pub async fn abandon_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    owned_session(&state, &id, &user, &req_id).await?;
    match state.abandon_session(&id).await {
        Abandon::Removed => Ok(StatusCode::NO_CONTENT),
        Abandon::Missing => Err(AppError::not_found("session not found", req_id)),
        Abandon::AlreadySubmitted => Err(AppError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "session is already submitted",
            req_id,
        )),
    }
}

pub async fn results(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(exam_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let catalog = find_exam(&state, &exam_id, &req_id)?;
    let submission = state
        .submission_for(&user.id, &exam_id)
        .await
        .ok_or_else(|| AppError::not_found("no submission for this exam", req_id.clone()))?;
    let report = build_report(&catalog, &submission);
    Ok(Json(json!({
        "headline": format!("Congratulations, {}!", user.first_name()),
        "report": report,
        "next": NextScreen { screen: Screen::Dashboard, exam_id: None },
    })))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let req_id = request_id_from_headers(&headers);
    let user = require_user(&jar, &state, &req_id).await?;
    let shared = owned_session(&state, &id, &user, &req_id).await?;
    Ok(ws.on_upgrade(move |socket| ws_session(socket, state, id, shared)))
}

async fn next_event(receiver: &mut broadcast::Receiver<WsEnvelope>) -> Option<WsEnvelope> {
    loop {
        match receiver.recv().await {
            Ok(msg) => return Some(msg),
            Err(RecvError::Lagged(skipped)) => {
                warn!("ws client lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn ws_session(stream: WebSocket, state: AppState, session_id: String, shared: SharedSession) {
    let mut receiver = match state.db.broadcasters.get(&session_id) {
        Some(sender) => sender.subscribe(),
        None => return,
    };

    let (mut sender_ws, mut receiver_ws) = stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = next_event(&mut receiver).await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender_ws.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(message)) = receiver_ws.next().await {
        let Message::Text(txt) = message else { continue };
        let Ok(env) = serde_json::from_str::<WsEnvelope>(&txt) else {
            warn!(session = %session_id, "ignoring malformed ws message");
            continue;
        };
        if env.event == SYNC {
            let view = shared.lock().await.view();
            let clock = Clock::from_secs(view.remaining_secs).to_string();
            let mut reply = WsEnvelope::now(SESSION_STATE, json!({ "session": view, "clock": clock }));
            reply.request_id = env.request_id;
            state.publish(&session_id, reply);
        }
    }

    send_task.abort();
    info!("ws disconnected for session {}", session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_protocol::TIMER_TICK;

    #[tokio::test]
    async fn lagging_receiver_keeps_getting_events() {
        let (sender, mut receiver) = broadcast::channel(2);
        for remaining in (0..5).rev() {
            sender
                .send(WsEnvelope::now(TIMER_TICK, json!({ "remainingSecs": remaining })))
                .unwrap();
        }

        let first = next_event(&mut receiver).await.unwrap();
        assert_eq!(first.payload["remainingSecs"], 1);
        let second = next_event(&mut receiver).await.unwrap();
        assert_eq!(second.payload["remainingSecs"], 0);

        drop(sender);
        assert!(next_event(&mut receiver).await.is_none());
    }
}
