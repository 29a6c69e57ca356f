use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    Household, Issue, MonteCarloConfig, ProjectionError, Scenario, has_errors, project_checked,
    run_monte_carlo, validate,
};

const DEFAULT_PATHS: u32 = 1_000;
const MAX_PATHS: u32 = 100_000;
const DEFAULT_VOLATILITY_PCT: f64 = 15.0;
const DEFAULT_SEED: u64 = 42;

#[derive(Parser, Debug)]
#[command(
    name = "fi-projection",
    about = "Year-by-year household FI projection (contributions, taxes, bucketed withdrawals, Monte Carlo FI ranges)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Project a household and print the year-by-year result as JSON
    Project {
        #[arg(long, help = "JSON file holding { household, scenario }")]
        input: PathBuf,
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Sample return paths and print the FI-year percentiles as JSON
    MonteCarlo {
        #[arg(long, help = "JSON file holding { household, scenario }")]
        input: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PATHS)]
        paths: u32,
        #[arg(
            long,
            default_value_t = DEFAULT_VOLATILITY_PCT,
            help = "Annual return volatility in percent"
        )]
        volatility: f64,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRequest {
    pub household: Household,
    pub scenario: Scenario,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonteCarloRequest {
    household: Household,
    scenario: Scenario,
    paths: Option<u32>,
    /// Percent, as on the command line.
    volatility: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<Issue>,
}

fn build_monte_carlo_config(
    paths: u32,
    volatility_pct: f64,
    seed: u64,
) -> Result<MonteCarloConfig, String> {
    if paths == 0 {
        return Err("paths must be > 0".to_string());
    }
    if paths > MAX_PATHS {
        return Err(format!("paths must be <= {MAX_PATHS}"));
    }
    if !(0.0..=100.0).contains(&volatility_pct) {
        return Err("volatility must be between 0 and 100".to_string());
    }
    Ok(MonteCarloConfig {
        paths,
        volatility: volatility_pct / 100.0,
        seed,
    })
}

fn ensure_valid(household: &Household, scenario: &Scenario) -> Result<(), ProjectionError> {
    let issues = validate(household, scenario);
    if has_errors(&issues) {
        return Err(ProjectionError::Validation(issues));
    }
    Ok(())
}

fn read_request<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ProjectionError> {
    let raw = fs::read_to_string(path).map_err(|source| ProjectionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, ProjectionError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn project_command(input: &Path, pretty: bool) -> Result<String, ProjectionError> {
    let request: ProjectionRequest = read_request(input)?;
    let result = project_checked(&request.household, &request.scenario)?;
    info!(
        rows = result.rows.len(),
        fi_year = ?result.fi_year,
        warnings = result.warnings.len(),
        "projection complete"
    );
    to_json(&result, pretty)
}

fn monte_carlo_command(
    input: &Path,
    config: MonteCarloConfig,
    pretty: bool,
) -> Result<String, ProjectionError> {
    let request: ProjectionRequest = read_request(input)?;
    ensure_valid(&request.household, &request.scenario)?;
    let summary = run_monte_carlo(&request.household, &request.scenario, &config)?;
    to_json(&summary, pretty)
}

pub async fn run_cli(cli: Cli) -> Result<(), ProjectionError> {
    let output = match cli.command {
        Command::Project { input, pretty } => project_command(&input, pretty)?,
        Command::MonteCarlo {
            input,
            paths,
            volatility,
            seed,
            pretty,
        } => {
            let config = build_monte_carlo_config(paths, volatility, seed)
                .map_err(ProjectionError::MonteCarlo)?;
            monte_carlo_command(&input, config, pretty)?
        }
        Command::Serve { port } => {
            return run_http_server(port).await.map_err(ProjectionError::Server);
        }
    };
    println!("{output}");
    Ok(())
}

fn router() -> Router {
    Router::new()
        .route("/api/project", post(project_handler))
        .route("/api/monte-carlo", post(monte_carlo_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "FI projection HTTP API listening");
    println!("Local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_handler(Json(request): Json<ProjectionRequest>) -> Response {
    match project_checked(&request.household, &request.scenario) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(e) => projection_error_response(e),
    }
}

async fn monte_carlo_handler(Json(request): Json<MonteCarloRequest>) -> Response {
    let config = match build_monte_carlo_config(
        request.paths.unwrap_or(DEFAULT_PATHS),
        request.volatility.unwrap_or(DEFAULT_VOLATILITY_PCT),
        request.seed.unwrap_or(DEFAULT_SEED),
    ) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let outcome = tokio::task::spawn_blocking(move || {
        ensure_valid(&request.household, &request.scenario)?;
        run_monte_carlo(&request.household, &request.scenario, &config)
    })
    .await;

    match outcome {
        Ok(Ok(summary)) => json_response(StatusCode::OK, summary),
        Ok(Err(e)) => projection_error_response(e),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Monte Carlo task failed: {e}"),
        ),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            issues: Vec::new(),
        },
    )
}

fn projection_error_response(e: ProjectionError) -> Response {
    let status = match e {
        ProjectionError::Io { .. } | ProjectionError::Server(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    json_response(
        status,
        ErrorResponse {
            error: e.to_string(),
            issues: e.issues().to_vec(),
        },
    )
}
