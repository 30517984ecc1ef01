use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use handlebars::Handlebars;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::AppConfig;
use crate::dataset::Dataset;
use crate::downloader;
use crate::login::{self, UserStore};
use crate::mailer::Mailer;
use crate::report::ReportGenerator;
use crate::stats;

/// Shared application state handed to every request handler
///
/// The dataset is loaded once and never mutated, so no lock is needed; the
/// report generator carries its own mutex for the cold-start stampede.
pub struct AppState {
    pub config: AppConfig,
    pub dataset: Dataset,
    pub reports: ReportGenerator,
    pub users: UserStore,
    pub mailer: Option<Mailer>,
    pub templates: Handlebars<'static>,
}

/// Start the web application
///
/// Loads (or synthesizes) the dataset, compiles the page templates, wires up
/// the router and serves until the process is stopped.
///
/// # Arguments
/// * `config` - Runtime configuration from the environment
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::load_or_create(&config.data_path, config.sample_size)?;
    log::info!("dataset ready: {} rows", dataset.len());

    let users = UserStore::new(&config.database_dir);
    users.init()?;

    let mailer = match &config.smtp {
        Some(smtp) => match Mailer::new(smtp) {
            Ok(mailer) => Some(mailer),
            Err(e) => {
                log::warn!("mailer setup failed, confirmation emails disabled: {}", e);
                None
            }
        },
        None => {
            log::info!("MAIL_USERNAME/MAIL_PASSWORD not set, confirmation emails disabled");
            None
        }
    };

    let mut templates = Handlebars::new();
    templates.register_templates_directory(".hbs", "templates")?;

    let state = Arc::new(AppState {
        reports: ReportGenerator::new(&config.plot_dir),
        config,
        dataset,
        users,
        mailer,
        templates,
    });

    let protected = Router::new()
        .route("/profile", get(login::serve_profile).post(login::handle_profile))
        .route("/settings", get(login::serve_settings).post(login::handle_settings))
        .route_layer(middleware::from_fn(login::require_auth));

    let app = Router::new()
        .route("/", get(serve_home))
        .route("/charts", get(serve_charts))
        .route("/about", get(serve_about))
        .route("/download", get(serve_download))
        .route("/register", get(login::serve_register).post(login::handle_register))
        .route("/confirm/:token", get(login::confirm_email))
        .route(
            "/resend-confirmation",
            get(login::serve_resend).post(login::handle_resend),
        )
        .route("/login", get(login::serve_login).post(login::handle_login))
        .route("/logout", get(login::handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new(&state.config.plot_dir))
        .with_state(state.clone());

    let listener = TcpListener::bind(&state.config.bind_addr).await?;
    println!("Listening on http://{}", state.config.bind_addr);
    if let Ok(ip) = local_ip_address::local_ip() {
        let port = state
            .config
            .bind_addr
            .rsplit(':')
            .next()
            .unwrap_or("3000");
        println!("On your network: http://{}:{}", ip, port);
    }
    axum::serve(listener, app).await?;

    Ok(())
}

/// Render a named template into an HTML response
///
/// A template failure is a server bug, not user error; it is logged and
/// reported as a 500.
pub fn render(state: &AppState, template: &str, context: &serde_json::Value) -> Response {
    match state.templates.render(template, context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            log::error!("failed to render template `{}`: {}", template, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

/// Base template context shared by every page
///
/// Carries the logged-in user (for the navbar and theming) and any flash
/// notice passed along in the redirect query string.
pub fn page_context(
    state: &AppState,
    jar: &CookieJar,
    query: &HashMap<String, String>,
) -> serde_json::Value {
    let user = login::current_user(&state.users, jar);
    serde_json::json!({
        "user": user,
        "flash": {
            "error": query.get("error"),
            "success": query.get("success"),
            "info": query.get("info"),
        },
    })
}

/// Home page with the headline dataset metrics
async fn serve_home(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let metrics = stats::summary_metrics(&state.dataset);

    let mut ctx = page_context(&state, &jar, &query);
    ctx["metrics"] = serde_json::json!({
        "distinct_categories": metrics.distinct_categories,
        "total_earnings": format!("{:.2}", metrics.total_earnings),
        "avg_rating": format!("{:.2}", metrics.avg_rating),
    });
    ctx["rows"] = serde_json::json!(state.dataset.len());

    render(&state, "index", &ctx)
}

/// Chart gallery page
///
/// Ensures the chart artifacts exist (generating them on the first visit),
/// then lists every PNG in the plot directory. Recipes that failed are
/// surfaced as a diagnostic line instead of taking the page down.
async fn serve_charts(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut failures: Vec<serde_json::Value> = Vec::new();
    let mut cache_hit = false;

    match state.reports.ensure_generated(&state.dataset) {
        Ok(outcome) => {
            cache_hit = outcome.cache_hit;
            for (output, error) in &outcome.failures {
                failures.push(serde_json::json!({ "output": output, "error": error }));
            }
        }
        Err(e) => {
            log::error!("chart generation failed outright: {}", e);
            failures.push(serde_json::json!({
                "output": "all charts",
                "error": e.to_string(),
            }));
        }
    }

    let images = list_png_files(state.reports.out_dir());

    let mut ctx = page_context(&state, &jar, &query);
    ctx["image_count"] = serde_json::json!(images.len());
    ctx["images"] = serde_json::json!(images);
    ctx["failures"] = serde_json::json!(failures);
    ctx["has_failures"] = serde_json::json!(!failures.is_empty());
    ctx["cache_hit"] = serde_json::json!(cache_hit);

    render(&state, "charts", &ctx)
}

/// Sorted PNG filenames in the plot directory
fn list_png_files(dir: &std::path::Path) -> Vec<String> {
    let mut images: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".png") { Some(name) } else { None }
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    images.sort();
    images
}

/// About page
async fn serve_about(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ctx = page_context(&state, &jar, &query);
    render(&state, "about", &ctx)
}

/// Download the dataset
///
/// Logged-in users with the `excel` export preference get an XLSX workbook;
/// everyone else gets the backing CSV file verbatim. Re-serializing the
/// in-memory table is only a fallback, since it would not preserve the
/// formatting of an externally supplied file.
async fn serve_download(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let wants_excel = login::current_user(&state.users, &jar)
        .map(|user| user.settings.export_format == "excel")
        .unwrap_or(false);

    if wants_excel {
        match downloader::to_xlsx(&state.dataset) {
            Ok(bytes) => {
                return (
                    [
                        (
                            header::CONTENT_TYPE,
                            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                        ),
                        (
                            header::CONTENT_DISPOSITION,
                            "attachment; filename=\"fiverr_data.xlsx\"",
                        ),
                    ],
                    bytes,
                )
                    .into_response();
            }
            Err(e) => {
                log::error!("xlsx export failed, falling back to csv: {}", e);
            }
        }
    }

    let csv = match downloader::source_csv(&state.config.data_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!(
                "could not read {}, serializing the in-memory dataset instead: {}",
                state.config.data_path,
                e
            );
            match downloader::to_csv(&state.dataset) {
                Ok(csv) => csv.into_bytes(),
                Err(e) => {
                    log::error!("csv export failed: {}", e);
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Export failed").into_response();
                }
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"fiver_clean.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}
