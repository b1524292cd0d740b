use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::county::{ALL_AZ_COUNTIES, CountySelection};
use crate::error::DashboardError;
use crate::pipeline::{self, DashboardView, DatasetBounds, resolve_range};
use crate::range::{CUTOFF_DATE, DateRange, parse_date_input};
use crate::record::Record;
use crate::source::SourceContext;

#[derive(Clone)]
struct AppState {
    ctx: Arc<SourceContext>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let ctx = SourceContext::open(&opts.source).context("open data source")?;

    // Prime the fetch cache; a failing source is reported per request afterwards.
    match ctx.load_records().await {
        Ok(records) => tracing::info!("Loaded {} records", records.len()),
        Err(e) => tracing::warn!("Initial fetch failed: {}", e),
    }

    let app = router(Arc::new(ctx));

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(ctx: Arc<SourceContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/stats", get(api_stats))
        .route("/api/counties", get(api_counties))
        .route("/api/dashboard", get(api_dashboard))
        .route("/api/export", get(api_export))
        .layer(cors)
        .with_state(AppState { ctx })
}

fn error_response(e: DashboardError) -> Response {
    let status = match &e {
        DashboardError::DataFetch { .. } => StatusCode::BAD_GATEWAY,
        DashboardError::MalformedRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DashboardError::InvalidRange { .. } | DashboardError::InvalidDate(_) => {
            StatusCode::BAD_REQUEST
        }
        DashboardError::EmptyDataset => StatusCode::NOT_FOUND,
        DashboardError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("{}", e);
    }
    (status, e.to_string()).into_response()
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    source: String,
    record_count: usize,
    bounds: Option<DatasetBounds>,
    cache_ttl_secs: u64,
    cutoff_date: NaiveDate,
}

async fn api_stats(State(st): State<AppState>) -> impl IntoResponse {
    let records = match st.ctx.load_records().await {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    Json(StatsResponse {
        source: st.ctx.location.clone(),
        record_count: records.len(),
        bounds: DatasetBounds::of(&records),
        cache_ttl_secs: st.ctx.source.ttl().await.as_secs(),
        cutoff_date: CUTOFF_DATE,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct CountyOpt {
    name: &'static str,
    code: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CountiesResponse {
    counties: Vec<CountyOpt>,
}

async fn api_counties(State(st): State<AppState>) -> impl IntoResponse {
    let counties = ALL_AZ_COUNTIES
        .iter()
        .map(|&name| CountyOpt {
            name,
            code: st.ctx.county_codes.code_for(name),
        })
        .collect();
    Json(CountiesResponse { counties })
}

#[derive(Debug, Deserialize)]
struct SelectionParams {
    start: Option<String>,
    end: Option<String>,
    /// Comma separated; omitted or `all` selects every county.
    counties: Option<String>,
}

fn parse_counties(raw: Option<&str>) -> CountySelection {
    match raw.map(str::trim) {
        None => CountySelection::all(),
        Some(s) if s.eq_ignore_ascii_case("all") => CountySelection::all(),
        Some(s) => CountySelection::from_user_input(
            s.split(',').map(str::trim).filter(|p| !p.is_empty()),
        ),
    }
}

fn parse_optional_date(s: Option<&str>) -> Result<Option<NaiveDate>, DashboardError> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_date_input)
        .transpose()
}

struct Selection {
    records: Vec<Record>,
    range: DateRange,
    counties: CountySelection,
}

async fn resolve_selection(
    st: &AppState,
    p: &SelectionParams,
) -> Result<Selection, DashboardError> {
    let start = parse_optional_date(p.start.as_deref())?;
    let end = parse_optional_date(p.end.as_deref())?;
    let counties = parse_counties(p.counties.as_deref());

    let records = st.ctx.load_records().await?;
    let bounds = DatasetBounds::of(&records);
    let range =
        resolve_range(start, end, bounds.as_ref())?.ok_or(DashboardError::EmptyDataset)?;

    Ok(Selection {
        records,
        range,
        counties,
    })
}

async fn build_view(st: &AppState, p: &SelectionParams) -> Result<DashboardView, DashboardError> {
    let sel = resolve_selection(st, p).await?;
    Ok(pipeline::run(
        &sel.records,
        &sel.range,
        &sel.counties,
        &st.ctx.county_codes,
    ))
}

async fn api_dashboard(
    State(st): State<AppState>,
    Query(p): Query<SelectionParams>,
) -> impl IntoResponse {
    match build_view(&st, &p).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_export(
    State(st): State<AppState>,
    Query(p): Query<SelectionParams>,
) -> impl IntoResponse {
    let (filename, bytes) = match resolve_selection(&st, &p)
        .await
        .and_then(|sel| pipeline::export(&sel.records, &sel.range, &sel.counties))
    {
        Ok(out) => out,
        Err(e) => return error_response(e),
    };
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
