use anyhow::Result;
use clap::Parser;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;
use volley::prelude::*;

/// Ramp against the multi-tenant API: health, data listing and user creation per iteration.
#[derive(Parser, Debug)]
#[command(version = "0.1")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    base_url: String,

    /// Bearer token sent on every request; the mock service treats it as the tenant id.
    #[arg(short, long, env = "API_TOKEN", default_value = "test-tenant")]
    token: String,

    /// Divide every stage duration by this factor for a quick run.
    #[arg(short, long, default_value_t = 1)]
    scale: u32,
}

#[derive(Clone)]
struct Api {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("volley=info,api_load_test=info")
        .init();

    let args = Cli::parse();
    let api = Api {
        client: Client::new(),
        base_url: args.base_url.into(),
        token: args.token.into(),
    };

    let test = load_test("api-load-test", move |ctx: VuContext| {
        let api = api.clone();
        async move { iteration(&api, &ctx).await }
    })
    .stages(profile(args.scale))
    .threshold("req_failed", "rate<0.01")
    .threshold("req_duration", "p(95)<500")
    .threshold("req_duration", "p(99)<1000")
    .threshold("req_duration", "avg<200")
    .metric("response_time", MetricKind::Trend)
    .pacing(Duration::from_millis(500));

    let stop = test.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight iterations.");
            stop.cancel();
        }
    });

    let summary = test.await?;
    info!("Run complete");
    println!("{summary}");
    std::process::exit(summary.exit_code());
}

fn profile(scale: u32) -> Vec<Stage> {
    let scale = scale.max(1);
    [(120, 10), (180, 100), (180, 500), (120, 1000), (300, 1000), (120, 0)]
        .into_iter()
        .map(|(secs, target)| Stage::new(Duration::from_secs(secs) / scale, target))
        .collect()
}

#[derive(Debug)]
struct Reply {
    status: StatusCode,
    body: Value,
}

/// Why a request failed. An error status still carries the reply so its checks run.
#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("server answered {}", .0.status)]
    Status(Reply),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// The reply to check, whatever its status. Only transport errors end the iteration.
fn answered(res: Result<Reply, RequestError>) -> Result<Reply, reqwest::Error> {
    match res {
        Ok(reply) | Err(RequestError::Status(reply)) => Ok(reply),
        Err(RequestError::Transport(e)) => Err(e),
    }
}

fn is_ok(reply: &Reply) -> Result<bool, Infallible> {
    Ok(reply.status == StatusCode::OK)
}

fn has_success(reply: &Reply) -> Result<bool, &'static str> {
    reply
        .body
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s == "success")
        .ok_or("response has no status")
}

async fn iteration(api: &Api, ctx: &VuContext) -> Result<IterationResult> {
    let (health, elapsed) = timed(get_health(api)).await;
    ctx.record_duration("response_time", elapsed);
    let health = answered(health)?;
    let mut result = IterationResult::passed()
        .check("health status is 200", &health, is_ok)
        .check("health response has status success", &health, has_success);

    let (data, elapsed) = timed(get_data(api)).await;
    ctx.record_duration("response_time", elapsed);
    let data = answered(data)?;
    result = result
        .check("data status is 200", &data, is_ok)
        .check("data response has status success", &data, has_success);

    let name = format!("Test User {}", (ctx.vu_id() * 7919 + ctx.iteration()) % 10_000);
    let (created, elapsed) = timed(create_user(api, name)).await;
    ctx.record_duration("response_time", elapsed);
    let created = answered(created)?;
    Ok(result
        .check("create user status is 200", &created, is_ok)
        .check("create user response has status success", &created, has_success))
}

/// Status 400 and above is an `Err`, so the transaction counts it in `req_failed`.
async fn reply(res: reqwest::Response) -> Result<Reply, RequestError> {
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    let reply = Reply { status, body };
    if status.is_client_error() || status.is_server_error() {
        Err(RequestError::Status(reply))
    } else {
        Ok(reply)
    }
}

#[transaction]
async fn get_health(api: &Api) -> Result<Reply, RequestError> {
    let res = api
        .client
        .get(format!("{}/health", api.base_url))
        .bearer_auth(&api.token)
        .send()
        .await?;
    reply(res).await
}

#[transaction]
async fn get_data(api: &Api) -> Result<Reply, RequestError> {
    let res = api
        .client
        .get(format!("{}/api/data", api.base_url))
        .bearer_auth(&api.token)
        .send()
        .await?;
    reply(res).await
}

#[transaction("create user")]
async fn create_user(api: &Api, name: String) -> Result<Reply, RequestError> {
    let res = api
        .client
        .post(format!("{}/api/users", api.base_url))
        .bearer_auth(&api.token)
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await?;
    reply(res).await
}
