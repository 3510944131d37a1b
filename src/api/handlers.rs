use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{info, warn};
use utoipa::OpenApi;

use super::{
    auth::{AuthPrincipal, RequireAdmin},
    dto::{
        thresholds_from_json, BatchRequest, BatchResponse, DispatchDto, DispatchOutcome,
        HealthResponse, IngestResponse, LimitQuery, NotificationCreatedResponse, NotificationDto,
        ReadingDto, ReadingRequest, ReportedAlertRequest, ServiceStatus, StatsResponse,
        ThresholdValues, ThresholdsDto, ThresholdsUpdatedResponse,
    },
    errors::AppError,
    extract::JsonBody,
};
use crate::{
    alerts::{CallerResolver, DispatchResult, EmailStatus},
    context::AppContext,
    db::models::{SensorType, Severity},
    error::{CoreError, FieldViolation},
    messaging::{payload::BatchPayload, LinkState},
};

const DEFAULT_READINGS_LIMIT: i64 = 100;
const MAX_READINGS_LIMIT: i64 = 1000;
const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 500;

fn caller_resolver(ctx: &AppContext, principal: &AuthPrincipal) -> CallerResolver {
    CallerResolver::new(ctx.directory.clone(), principal.id)
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Store one reading, classify it and alert the caller if it is not normal.
#[utoipa::path(
    post,
    path = "/sensors/readings",
    request_body = ReadingRequest,
    responses(
        (status = 200, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Invalid reading"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "sensors"
)]
pub async fn post_reading(
    State(ctx): State<AppContext>,
    principal: AuthPrincipal,
    JsonBody(body): JsonBody,
) -> Result<Json<IngestResponse>, AppError> {
    let req = ReadingRequest::from_json(&body)?;
    let resolver = caller_resolver(&ctx, &principal);
    let processed = ctx
        .sensors
        .process(req.sensor_type, req.value, req.timestamp, &resolver)
        .await?;
    Ok(Json(processed.into()))
}

/// Multi-sensor payload as sent by older clients: `{mq2, temperature, sound}`.
/// Each value is processed on its own; dropped values are listed in `rejected`.
#[utoipa::path(
    post,
    path = "/sensors/data",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Sensor data processed", body = BatchResponse),
        (status = 400, description = "No usable sensor value"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "No value could be stored"),
    ),
    security(("bearer" = [])),
    tag = "sensors"
)]
pub async fn post_sensor_data(
    State(ctx): State<AppContext>,
    principal: AuthPrincipal,
    JsonBody(body): JsonBody,
) -> Result<Json<BatchResponse>, AppError> {
    let batch = BatchPayload::from_value(&body)?;
    let resolver = caller_resolver(&ctx, &principal);
    let report = ctx
        .sensors
        .process_batch(&batch.items, batch.timestamp, &resolver)
        .await;

    let mut rejected = batch.rejected.violations;
    let mut failures = report.failures.into_iter();
    if report.processed.is_empty() && report.dispatch_failed.is_empty() {
        // Nothing was stored: surface the first failure as the response.
        if let Some((_, e)) = failures.next() {
            return Err(e.into());
        }
    }
    for (sensor_type, e) in failures {
        let reason = match e {
            CoreError::Validation(v) => v.to_string(),
            CoreError::Storage(_) => "could not be stored".to_owned(),
        };
        rejected.push(FieldViolation { field: sensor_type.to_string(), reason });
    }

    let results = report
        .processed
        .into_iter()
        .map(IngestResponse::from)
        .chain(report.dispatch_failed.into_iter().map(IngestResponse::from))
        .collect();

    Ok(Json(BatchResponse {
        message: "Sensor data processed".into(),
        results,
        rejected,
    }))
}

/// Latest readings across all sensors, newest first.
#[utoipa::path(
    get,
    path = "/sensors/readings",
    params(LimitQuery),
    responses(
        (status = 200, description = "Latest readings (possibly empty)", body = Vec<ReadingDto>),
        (status = 400, description = "Invalid limit"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "sensors"
)]
pub async fn get_readings(
    State(ctx): State<AppContext>,
    _principal: AuthPrincipal,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ReadingDto>>, AppError> {
    let limit = query.resolve(DEFAULT_READINGS_LIMIT, MAX_READINGS_LIMIT)?;
    let readings = ctx.sensors.recent(limit).await?;
    Ok(Json(readings.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// The active threshold configuration. Created with defaults on first access.
#[utoipa::path(
    get,
    path = "/sensors/thresholds",
    responses(
        (status = 200, description = "Active thresholds", body = ThresholdsDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "thresholds"
)]
pub async fn get_thresholds(
    State(ctx): State<AppContext>,
    _principal: AuthPrincipal,
) -> Result<Json<ThresholdsDto>, AppError> {
    let active = ctx.thresholds.get_active().await?;
    Ok(Json(ThresholdsDto::from(active.as_ref())))
}

/// Replace the whole configuration. All nine fields are required and each
/// sensor needs `normal < warning < danger`.
#[utoipa::path(
    put,
    path = "/sensors/thresholds",
    request_body = ThresholdValues,
    responses(
        (status = 200, description = "Thresholds updated", body = ThresholdsUpdatedResponse),
        (status = 400, description = "Missing, non-numeric or unordered thresholds"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "thresholds"
)]
pub async fn put_thresholds(
    State(ctx): State<AppContext>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(body): JsonBody,
) -> Result<Json<ThresholdsUpdatedResponse>, AppError> {
    let candidate = thresholds_from_json(&body)?;
    let record = ctx.thresholds.replace(candidate, admin.id).await?;
    Ok(Json(ThresholdsUpdatedResponse {
        message: "Thresholds updated".into(),
        thresholds: ThresholdsDto::from(record.as_ref()),
    }))
}

/// Past configurations, newest first.
#[utoipa::path(
    get,
    path = "/sensors/thresholds/history",
    params(LimitQuery),
    responses(
        (status = 200, description = "Threshold history", body = Vec<ThresholdsDto>),
        (status = 400, description = "Invalid limit"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "thresholds"
)]
pub async fn get_threshold_history(
    State(ctx): State<AppContext>,
    _admin: RequireAdmin,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ThresholdsDto>>, AppError> {
    let limit = query.resolve(DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)?;
    let history = ctx.thresholds.history(limit).await?;
    Ok(Json(history.iter().map(ThresholdsDto::from).collect()))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// The caller's notifications, newest first.
#[utoipa::path(
    get,
    path = "/sensors/notifications",
    responses(
        (status = 200, description = "Caller's notifications", body = Vec<NotificationDto>),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "notifications"
)]
pub async fn get_notifications(
    State(ctx): State<AppContext>,
    principal: AuthPrincipal,
) -> Result<Json<Vec<NotificationDto>>, AppError> {
    let rows = ctx.notifications.list_for_principal(principal.id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Record an alert computed by a client. The reported status is checked
/// against the active thresholds, which decide the stored severity.
#[utoipa::path(
    post,
    path = "/sensors/notifications",
    request_body = ReportedAlertRequest,
    responses(
        (status = 201, description = "Notification created", body = NotificationCreatedResponse),
        (status = 200, description = "Nothing to record (normal value or no recipient)", body = NotificationCreatedResponse),
        (status = 400, description = "Invalid alert"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "notifications"
)]
pub async fn post_notification(
    State(ctx): State<AppContext>,
    principal: AuthPrincipal,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<NotificationCreatedResponse>), AppError> {
    let req = ReportedAlertRequest::from_json(&body)?;
    let resolver = caller_resolver(&ctx, &principal);
    let result = ctx
        .sensors
        .process_reported(
            req.sensor_type,
            req.status,
            req.message,
            req.value,
            req.timestamp,
            &resolver,
        )
        .await?;

    let (status, message) = match &result {
        DispatchResult::Sent { .. } => {
            info!(caller = %principal.id, "Client-reported alert recorded");
            (StatusCode::CREATED, "Notification created successfully")
        }
        DispatchResult::Skipped => (StatusCode::OK, "Value is within normal range; nothing recorded"),
        DispatchResult::NoRecipient => {
            warn!(caller = %principal.id, "Caller is not in the principal directory");
            (StatusCode::OK, "No recipient found; nothing recorded")
        }
    };
    let dispatch = DispatchDto::from(result);

    Ok((
        status,
        Json(NotificationCreatedResponse {
            message: message.into(),
            notification: dispatch.notification,
            email: dispatch.email,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Storage reachability and broker connection state. Always `200`; the
/// `status` field turns `degraded` when a dependency is down.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and dependency status", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let database_up = ctx.diagnostics.storage_reachable().await;
    let mqtt = ctx.mqtt.state();
    let healthy = database_up && mqtt != LinkState::Disconnected;

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        services: ServiceStatus {
            storage: ctx.diagnostics.backend().into(),
            database: if database_up { "connected" } else { "disconnected" }.into(),
            mqtt: mqtt.as_str().into(),
        },
        timestamp: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// Stored record counts per table.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Record counts", body = StatsResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn admin_stats(
    State(ctx): State<AppContext>,
    _admin: RequireAdmin,
) -> Result<Json<StatsResponse>, AppError> {
    let counts = ctx.diagnostics.counts().await?;
    Ok(Json(StatsResponse::new(ctx.diagnostics.backend(), counts)))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

struct BearerAuth;

impl utoipa::Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        post_reading,
        post_sensor_data,
        get_readings,
        get_thresholds,
        put_thresholds,
        get_threshold_history,
        get_notifications,
        post_notification,
        health,
        admin_stats,
    ),
    components(schemas(
        ReadingRequest,
        ReportedAlertRequest,
        BatchRequest,
        ThresholdValues,
        ThresholdsDto,
        ThresholdsUpdatedResponse,
        ReadingDto,
        NotificationDto,
        IngestResponse,
        BatchResponse,
        DispatchDto,
        DispatchOutcome,
        NotificationCreatedResponse,
        HealthResponse,
        ServiceStatus,
        StatsResponse,
        FieldViolation,
        EmailStatus,
        SensorType,
        Severity,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "sensors", description = "Reading ingestion and queries"),
        (name = "thresholds", description = "Alert threshold configuration"),
        (name = "notifications", description = "Recorded alerts"),
        (name = "admin", description = "Administration"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Environmental Monitoring API",
        version = "0.1.0",
        description = "Gas, temperature and sound readings with threshold-based alerting"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
