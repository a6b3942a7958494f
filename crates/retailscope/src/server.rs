use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use retailscope_core::config::DashboardConfig;
use retailscope_core::error::PipelineError;
use retailscope_core::forecast::{CancelFlag, Forecaster};
use retailscope_core::ingestion::{load_dataset, UploadedFile};
use retailscope_core::pipelines::{
    build_report, export_selection, run_forecast, AnalysisRequest, DashboardReport, ForecastPanel,
    SessionContext,
};
use retailscope_core::types::DatasetSummary;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const UPLOAD_FIELD: &str = "file";
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct SessionEntry {
    ctx: SessionContext,
    in_flight: Option<CancelFlag>,
    last_used: Instant,
}

impl SessionEntry {
    fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.last_used) >= idle
    }

    /// Stops any forecast still running for the dropped session.
    fn close(self) {
        if let Some(flag) = self.in_flight {
            flag.cancel();
        }
    }
}

type Sessions = HashMap<Uuid, SessionEntry>;

/// The live entry for `id`, marked as used. An idle entry is dropped instead.
fn touch(sessions: &mut Sessions, id: Uuid, idle: Duration) -> Option<&mut SessionEntry> {
    let now = Instant::now();
    if sessions
        .get(&id)
        .is_some_and(|entry| entry.is_idle(now, idle))
    {
        if let Some(entry) = sessions.remove(&id) {
            entry.close();
        }
        info!(session = %id, "session expired");
        return None;
    }

    let entry = sessions.get_mut(&id)?;
    entry.last_used = now;
    Some(entry)
}

fn evict_idle(sessions: &mut Sessions, idle: Duration) -> usize {
    let now = Instant::now();
    let expired: Vec<Uuid> = sessions
        .iter()
        .filter(|(_, entry)| entry.is_idle(now, idle))
        .map(|(id, _)| *id)
        .collect();
    for id in &expired {
        if let Some(entry) = sessions.remove(id) {
            entry.close();
        }
    }
    expired.len()
}

fn evict_least_recent(sessions: &mut Sessions) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(id, _)| *id);
    if let Some(id) = oldest {
        if let Some(entry) = sessions.remove(&id) {
            entry.close();
        }
        info!(session = %id, "session evicted to stay under the session limit");
    }
}

pub struct AppState {
    config: Arc<DashboardConfig>,
    forecaster: Arc<dyn Forecaster>,
    sessions: RwLock<Sessions>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: DashboardConfig, forecaster: Arc<dyn Forecaster>) -> SharedState {
        Arc::new(Self {
            config: Arc::new(config),
            forecaster,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    fn idle_timeout(&self) -> Duration {
        self.config.sessions.idle_timeout()
    }

    async fn insert(&self, ctx: SessionContext) {
        let mut sessions = self.sessions.write().await;
        evict_idle(&mut sessions, self.idle_timeout());
        while sessions.len() >= self.config.sessions.max_sessions {
            evict_least_recent(&mut sessions);
        }
        sessions.insert(
            ctx.session_id,
            SessionEntry {
                ctx,
                in_flight: None,
                last_used: Instant::now(),
            },
        );
    }

    async fn context(&self, id: Uuid) -> Result<SessionContext, ApiError> {
        let mut sessions = self.sessions.write().await;
        touch(&mut sessions, id, self.idle_timeout())
            .map(|entry| entry.ctx.clone())
            .ok_or_else(|| ApiError::session_not_found(id))
    }

    /// Drops every idle session; returns how many went.
    pub async fn evict_idle_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        evict_idle(&mut sessions, self.idle_timeout())
    }

    /// Registers a new in-flight forecast and cancels the one it supersedes.
    async fn begin_forecast(&self, id: Uuid) -> Result<(SessionContext, CancelFlag), ApiError> {
        let mut sessions = self.sessions.write().await;
        let entry = touch(&mut sessions, id, self.idle_timeout())
            .ok_or_else(|| ApiError::session_not_found(id))?;

        let flag = CancelFlag::new();
        if let Some(previous) = entry.in_flight.replace(flag.clone()) {
            previous.cancel();
        }
        Ok((entry.ctx.clone(), flag))
    }

    async fn finish_forecast(&self, id: Uuid, flag: &CancelFlag) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&id) {
            if entry
                .in_flight
                .as_ref()
                .is_some_and(|current| current.same_as(flag))
            {
                entry.in_flight = None;
            }
        }
    }

    async fn remove(&self, id: Uuid) -> bool {
        match self.sessions.write().await.remove(&id) {
            Some(entry) => {
                entry.close();
                true
            }
            None => false,
        }
    }

    async fn forecast(
        &self,
        ctx: SessionContext,
        request: AnalysisRequest,
        cancel: CancelFlag,
    ) -> ForecastPanel {
        let session_id = ctx.session_id;
        let config = self.config.clone();
        let forecaster = self.forecaster.clone();
        let flag = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            run_forecast(&ctx, &request, &config, forecaster.as_ref(), &flag)
        });

        let timeout = self.config.forecast.timeout();
        let panel = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(panel)) => panel,
            Ok(Err(err)) => {
                error!(session = %session_id, error = %err, "forecast task failed");
                ForecastPanel::unavailable("forecast task failed")
            }
            Err(_) => {
                cancel.cancel();
                warn!(session = %session_id, timeout_secs = timeout.as_secs(), "forecast timed out");
                ForecastPanel::unavailable(format!(
                    "forecast timed out after {} seconds",
                    timeout.as_secs()
                ))
            }
        };

        self.finish_forecast(session_id, &cancel).await;

        // A newer request for this session owns the panel now.
        if cancel.is_cancelled() && panel.is_ready() {
            return ForecastPanel::unavailable("superseded by a newer request");
        }
        panel
    }
}

pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/report", post(session_report))
        .route("/sessions/{id}/export", post(session_export))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn serve(config: DashboardConfig, forecaster: Arc<dyn Forecaster>) -> anyhow::Result<()> {
    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, forecaster);
    spawn_session_sweeper(state.clone());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
        })
        .await?;

    Ok(())
}

fn spawn_session_sweeper(state: SharedState) {
    let period = state.idle_timeout().min(MAX_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle_sessions().await;
            if evicted > 0 {
                debug!(evicted, "dropped idle sessions");
            }
        }
    });
}

#[derive(Debug, Serialize)]
struct SessionBody {
    session_id: Uuid,
    summary: DatasetSummary,
}

impl From<&SessionContext> for SessionBody {
    fn from(ctx: &SessionContext) -> Self {
        Self {
            session_id: ctx.session_id,
            summary: ctx.summary.clone(),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_session(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionBody>), ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let contents = field.bytes().await?;
        upload = Some((file_name, contents));
    }

    let Some((file_name, contents)) = upload else {
        return Err(ApiError::bad_request(format!(
            "multipart field '{UPLOAD_FIELD}' is required"
        )));
    };

    let loaded = tokio::task::spawn_blocking(move || {
        load_dataset(UploadedFile {
            file_name: &file_name,
            contents: &contents,
        })
    })
    .await
    .map_err(|err| ApiError::internal(format!("upload task failed: {err}")))??;

    let ctx = SessionContext::new(loaded);
    let body = SessionBody::from(&ctx);
    info!(session = %ctx.session_id, records = ctx.summary.total_records, "session created");
    state.insert(ctx).await;

    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionBody>, ApiError> {
    let ctx = state.context(id).await?;
    Ok(Json(SessionBody::from(&ctx)))
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.remove(id).await {
        info!(session = %id, "session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found(id))
    }
}

async fn session_report(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<DashboardReport>, ApiError> {
    let ctx = state.context(id).await?;
    let report = build_report(&ctx, &request, &state.config)?;

    let (ctx, cancel) = state.begin_forecast(id).await?;
    let forecast = state.forecast(ctx, request, cancel).await;
    Ok(Json(report.with_forecast(forecast)))
}

async fn session_export(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Response, ApiError> {
    let ctx = state.context(id).await?;
    let export = export_selection(&ctx, &request)?;
    let disposition = format!("attachment; filename=\"{}\"", export.file_name);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.contents,
    )
        .into_response())
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn session_not_found(id: Uuid) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("session {id} not found"))
    }

    fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("internal error: {message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::SchemaValidation(_) | PipelineError::DateConversion { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PipelineError::Parse(_) | PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::ForecastUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => return ApiError::internal(err.to_string()),
        };
        warn!(status = status.as_u16(), error = %err, "request rejected");
        ApiError::new(status, err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        warn!(status = status.as_u16(), error = %err, "multipart upload rejected");
        ApiError::new(status, err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chrono::Duration;
    use http_body_util::BodyExt;
    use hyper::Request;
    use retailscope_core::forecast::{ForecastError, ForecastPoint, ForecastRequest};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "retailscope-test-boundary";

    const SAMPLE_CSV: &str = "\
Order Date,Ship Date,Category,Sub-Category,Product Name,Sales,Discount,Profit,Quantity,Region
2023-01-01,2023-01-02,Technology,Phones,iPhone 14,999.99,0.1,199.99,1,West
2023-01-02,2023-01-03,Furniture,Chairs,Office Chair,299.99,0.0,59.99,1,East
2023-01-03,2023-01-04,Office Supplies,Binders,Binder Clips,15.99,0.05,3.19,5,South
";

    /// Flat forecast at the historical mean with a fixed band.
    struct FlatForecaster;

    impl Forecaster for FlatForecaster {
        fn name(&self) -> &'static str {
            "flat"
        }

        fn forecast(
            &self,
            request: &ForecastRequest<'_>,
        ) -> Result<Vec<ForecastPoint>, ForecastError> {
            let history = request.history;
            let mean = history.iter().map(|day| day.sales).sum::<f64>() / history.len() as f64;
            let last = history[history.len() - 1].date;
            let dates = history.iter().map(|day| day.date).chain(
                (1..=request.horizon.days() as i64).map(|step| last + Duration::days(step)),
            );
            Ok(dates
                .map(|date| ForecastPoint {
                    date,
                    yhat: mean,
                    yhat_lower: mean - 10.0,
                    yhat_upper: mean + 10.0,
                    trend: mean,
                    weekly: 0.0,
                    yearly: 0.0,
                })
                .collect())
        }
    }

    fn test_state() -> SharedState {
        AppState::new(DashboardConfig::default(), Arc::new(FlatForecaster))
    }

    fn multipart_upload(file_name: &str, contents: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/sessions")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload_sample(state: &SharedState) -> Uuid {
        let response = router(state.clone())
            .oneshot(multipart_upload("sales.csv", SAMPLE_CSV.as_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        body["session_id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn upload_creates_session_with_summary() {
        let state = test_state();
        let response = router(state.clone())
            .oneshot(multipart_upload("sales.csv", SAMPLE_CSV.as_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        let summary = &body["summary"];
        assert_eq!(summary["file_name"], "sales.csv");
        assert_eq!(summary["source_format"], "csv");
        assert_eq!(summary["total_records"], 3);
        assert_eq!(summary["category_count"], 3);
        assert_eq!(summary["extra_columns"], json!(["Region"]));
        assert_eq!(summary["first_order_date"], "2023-01-01");
        assert_eq!(summary["last_order_date"], "2023-01-03");
    }

    #[tokio::test]
    async fn upload_missing_columns_is_unprocessable() {
        let csv = "Order Date,Ship Date,Category,Sub-Category,Product Name,Sales,Quantity\n\
                   2023-01-01,2023-01-02,Technology,Phones,iPhone 14,999.99,1\n";
        let response = router(test_state())
            .oneshot(multipart_upload("short.csv", csv.as_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(
            message.contains("Missing required columns: Discount, Profit"),
            "{message}"
        );
    }

    #[tokio::test]
    async fn unreadable_upload_is_bad_request() {
        let response = router(test_state())
            .oneshot(multipart_upload("blob.bin", &[0u8, 159, 146, 150, 0, 1]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_without_file_field_is_bad_request() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/sessions")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let config = DashboardConfig {
            max_upload_bytes: 64,
            ..DashboardConfig::default()
        };
        let state = AppState::new(config, Arc::new(FlatForecaster));
        let response = router(state)
            .oneshot(multipart_upload("sales.csv", SAMPLE_CSV.as_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn report_includes_kpis_and_forecast() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let response = router(state)
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{id}/report"),
                json!({ "horizon_days": 30 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let report = read_json(response).await;
        assert_eq!(report["kpis"]["total_orders"], 3);
        assert!((report["kpis"]["total_sales"].as_f64().unwrap() - 1315.97).abs() < 1e-6);
        assert_eq!(report["profit_by_category"][0]["category"], "Furniture");
        assert_eq!(report["forecast"]["status"], "ready");
        assert_eq!(report["forecast"]["prediction"].as_array().unwrap().len(), 30);
        assert_eq!(report["forecast"]["fitted"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn report_with_category_filter_narrows_the_view() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let response = router(state)
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{id}/report"),
                json!({ "categories": ["Furniture"] }),
            ))
            .await
            .unwrap();

        let report = read_json(response).await;
        assert_eq!(report["kpis"]["total_orders"], 1);
        assert_eq!(report["insights"]["most_profitable_category"], "Furniture");
    }

    #[tokio::test]
    async fn empty_selection_degrades_forecast_only() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let response = router(state)
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{id}/report"),
                json!({ "start": "2024-01-01", "end": "2024-02-01" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let report = read_json(response).await;
        assert_eq!(report["kpis"]["has_data"], false);
        assert_eq!(report["kpis"]["avg_order_value"], 0.0);
        assert_eq!(report["forecast"]["status"], "unavailable");
    }

    #[tokio::test]
    async fn out_of_range_horizon_is_bad_request() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let response = router(state)
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{id}/report"),
                json!({ "horizon_days": 365 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let response = router(test_state())
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/report", Uuid::new_v4()),
                json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn export_returns_csv_newest_first() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let response = router(state)
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{id}/export"),
                json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("retail_data_2023-01-01_2023-01-03.csv"));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Order Date,Ship Date,Category"));
        assert!(lines[0].ends_with("Region"));
        assert!(lines[1].starts_with("2023-01-03 00:00:00"));
        assert!(lines[3].starts_with("2023-01-01 00:00:00"));
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn newer_forecast_cancels_the_older_one() {
        let state = test_state();
        let id = upload_sample(&state).await;

        let (_, first) = state.begin_forecast(id).await.unwrap();
        let (_, second) = state.begin_forecast(id).await.unwrap();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        state.finish_forecast(id, &first).await;
        let sessions = state.sessions.read().await;
        let in_flight = sessions[&id].in_flight.as_ref().unwrap();
        assert!(in_flight.same_as(&second));
    }

    async fn get_status(state: &SharedState, id: Uuid) -> StatusCode {
        router(state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn idle_session_expires() {
        let mut config = DashboardConfig::default();
        config.sessions.idle_secs = 1;
        let state = AppState::new(config, Arc::new(FlatForecaster));
        let id = upload_sample(&state).await;
        assert_eq!(get_status(&state, id).await, StatusCode::OK);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert_eq!(get_status(&state, id).await, StatusCode::NOT_FOUND);
        assert!(state.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_idle_sessions_and_cancels_their_forecasts() {
        let mut config = DashboardConfig::default();
        config.sessions.idle_secs = 1;
        let state = AppState::new(config, Arc::new(FlatForecaster));
        let id = upload_sample(&state).await;
        let (_, flag) = state.begin_forecast(id).await.unwrap();

        assert_eq!(state.evict_idle_sessions().await, 0);
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert_eq!(state.evict_idle_sessions().await, 1);
        assert!(flag.is_cancelled());
        assert_eq!(get_status(&state, id).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_limit_evicts_the_least_recently_used() {
        let mut config = DashboardConfig::default();
        config.sessions.max_sessions = 2;
        let state = AppState::new(config, Arc::new(FlatForecaster));

        let first = upload_sample(&state).await;
        let second = upload_sample(&state).await;
        // Reading the first session makes the second one the oldest.
        assert_eq!(get_status(&state, first).await, StatusCode::OK);
        let third = upload_sample(&state).await;

        assert_eq!(state.sessions.read().await.len(), 2);
        assert_eq!(get_status(&state, second).await, StatusCode::NOT_FOUND);
        assert_eq!(get_status(&state, first).await, StatusCode::OK);
        assert_eq!(get_status(&state, third).await, StatusCode::OK);
    }
}
