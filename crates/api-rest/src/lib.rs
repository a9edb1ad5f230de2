//! # API REST
//!
//! REST API for the LIMS data-entry engine.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON bodies, status codes, CORS)
//!
//! Every endpoint is stateless: the caller sends the persisted result string along with each
//! edit and stores the returned `result_value`. The only shared state is the immutable
//! [`ProfileRegistry`] built at startup.

#![warn(rust_2018_idioms)]

pub mod dto;

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use lims_core::{
    formula, session::form_fields, template, Evaluation, FieldValue, ProfileDefinition,
    ProfileRegistry, RecomputeMode, Resolved, ValueMap,
};

use dto::{
    EntryChangeReq, EntryChangeRes, EvaluateFormulaReq, EvaluateFormulaRes, HealthRes,
    ListProfilesRes, ProfileRes, ProfileSummary, ResolveProfileReq, TemplateVariablesReq,
    TemplateVariablesRes,
};

type ApiError = (StatusCode, &'static str);

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ProfileRegistry>,
    recompute_mode: RecomputeMode,
}

impl AppState {
    pub fn new(registry: Arc<ProfileRegistry>, recompute_mode: RecomputeMode) -> Self {
        Self {
            registry,
            recompute_mode,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_profiles,
        get_profile,
        resolve_profile,
        entry_change,
        evaluate_formula,
        template_variables,
    ),
    components(schemas(
        HealthRes,
        ProfileSummary,
        ListProfilesRes,
        ProfileRes,
        ResolveProfileReq,
        EntryChangeReq,
        EntryChangeRes,
        EvaluateFormulaReq,
        EvaluateFormulaRes,
        TemplateVariablesReq,
        TemplateVariablesRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles", get(list_profiles))
        .route("/profiles/resolve", post(resolve_profile))
        .route("/profiles/:profile_id", get(get_profile))
        .route("/entry/change", post(entry_change))
        .route("/formulas/evaluate", post(evaluate_formula))
        .route("/templates/variables", post(template_variables))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Unknown test names resolve to free-text entry; only a malformed tenant id is rejected.
fn resolve<'a>(
    state: &'a AppState,
    test_name: &str,
    tenant_id: Option<&str>,
) -> Result<Resolved<'a>, ApiError> {
    state
        .registry
        .resolve_entry_raw(test_name, tenant_id)
        .map_err(|e| {
            tracing::debug!("rejecting tenant id {:?}: {}", tenant_id, e);
            (StatusCode::BAD_REQUEST, "Invalid tenant id")
        })
}

fn profile_res(profile: &ProfileDefinition, free_text: bool) -> ProfileRes {
    ProfileRes {
        profile: profile.clone(),
        free_text,
        form: form_fields(profile, &ValueMap::new()),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "LIMS REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/profiles",
    responses(
        (status = 200, description = "Built-in profiles", body = ListProfilesRes)
    )
)]
/// List the built-in profile catalog.
#[axum::debug_handler]
async fn list_profiles(State(state): State<AppState>) -> Json<ListProfilesRes> {
    let profiles = state
        .registry
        .builtin_profiles()
        .iter()
        .map(ProfileSummary::from)
        .collect();
    Json(ListProfilesRes { profiles })
}

#[utoipa::path(
    get,
    path = "/profiles/{profile_id}",
    params(("profile_id" = String, Path, description = "Built-in profile id")),
    responses(
        (status = 200, description = "Profile definition and empty form", body = ProfileRes),
        (status = 404, description = "Unknown profile id")
    )
)]
/// Fetch one built-in profile by id.
#[axum::debug_handler]
async fn get_profile(
    State(state): State<AppState>,
    AxumPath(profile_id): AxumPath<String>,
) -> Result<Json<ProfileRes>, ApiError> {
    state
        .registry
        .get(&profile_id)
        .map(|profile| Json(profile_res(profile, false)))
        .ok_or((StatusCode::NOT_FOUND, "Profile not found"))
}

#[utoipa::path(
    post,
    path = "/profiles/resolve",
    request_body = ResolveProfileReq,
    responses(
        (status = 200, description = "Resolved profile, or the free-text entry, and its empty form", body = ProfileRes),
        (status = 400, description = "Invalid tenant id")
    )
)]
/// Resolve an order's test name to its entry profile.
///
/// A test with no structured profile resolves to a single free-text field.
#[axum::debug_handler]
async fn resolve_profile(
    State(state): State<AppState>,
    Json(req): Json<ResolveProfileReq>,
) -> Result<Json<ProfileRes>, ApiError> {
    let resolved = resolve(&state, &req.test_name, req.tenant_id.as_deref())?;
    Ok(Json(profile_res(resolved.profile(), resolved.is_free_text())))
}

#[utoipa::path(
    post,
    path = "/entry/change",
    request_body = EntryChangeReq,
    responses(
        (status = 200, description = "Updated result, recomputed fields and alerts", body = EntryChangeRes),
        (status = 400, description = "Invalid tenant id"),
        (status = 500, description = "Internal server error")
    )
)]
/// Apply one field edit to a stored result.
///
/// The stored result is reopened, the edit applied, calculated fields recomputed and alerts
/// re-evaluated. Alerts are advisory; the new result is always returned. A legacy free-text
/// result is returned unchanged unless the request sets `replace_legacy`.
#[axum::debug_handler]
async fn entry_change(
    State(state): State<AppState>,
    Json(req): Json<EntryChangeReq>,
) -> Result<Json<EntryChangeRes>, ApiError> {
    let resolved = resolve(&state, &req.test_name, req.tenant_id.as_deref())?;

    let mut session = resolved.open(&req.stored_result, state.recompute_mode);
    if req.replace_legacy {
        session.replace_legacy();
    }
    let new_value = req
        .new_value
        .unwrap_or_else(|| FieldValue::Text(String::new()));
    let reaction = session.set(&req.changed_key, new_value);

    let result_value = session.save().map_err(|e| {
        tracing::error!("Serialize result error: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;

    Ok(Json(EntryChangeRes {
        result_value,
        free_text: session.is_free_text(),
        legacy: session.legacy().map(str::to_owned),
        recomputed: reaction.recomputed,
        unsettled: reaction.unsettled,
        alerts: reaction.alerts,
        form: session.form(),
    }))
}

#[utoipa::path(
    post,
    path = "/formulas/evaluate",
    request_body = EvaluateFormulaReq,
    responses(
        (status = 200, description = "Formula result or the reason it is not ready", body = EvaluateFormulaRes)
    )
)]
/// Evaluate a formula against the given values.
#[axum::debug_handler]
async fn evaluate_formula(Json(req): Json<EvaluateFormulaReq>) -> Json<EvaluateFormulaRes> {
    let res = match formula::evaluate(&req.formula, &req.values) {
        Evaluation::Ready(value) => EvaluateFormulaRes {
            ready: true,
            value: Some(value),
            reason: None,
        },
        Evaluation::NotReady(reason) => EvaluateFormulaRes {
            ready: false,
            value: None,
            reason: Some(reason.to_string()),
        },
    };
    Json(res)
}

#[utoipa::path(
    post,
    path = "/templates/variables",
    request_body = TemplateVariablesReq,
    responses(
        (status = 200, description = "Input schema derived from the template", body = TemplateVariablesRes)
    )
)]
/// Extract `{{Variable}}` placeholders from a report template.
#[axum::debug_handler]
async fn template_variables(Json(req): Json<TemplateVariablesReq>) -> Json<TemplateVariablesRes> {
    Json(TemplateVariablesRes {
        input_schema: template::extract_variables(&req.html_template),
    })
}
