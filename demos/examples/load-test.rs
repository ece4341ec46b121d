use anyhow::Result;
use clap::Parser;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::FmtSubscriber;
use volley::prelude::*;

/// Ramp against the health endpoint alone.
#[derive(Parser, Debug)]
#[command(version = "0.1")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000/health")]
    url: String,

    /// Divide every stage duration by this factor for a quick run.
    #[arg(short, long, default_value_t = 1)]
    scale: u32,

    /// Stop as soon as `req_failed` breaches its threshold instead of at the end of the run.
    #[arg(long)]
    abort_on_fail: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("volley=info")
        .init();

    let args = Cli::parse();
    let client = Client::new();
    let url: std::sync::Arc<str> = args.url.into();

    let scale = args.scale.max(1);
    let mut test = load_test("load-test", move |_ctx: VuContext| {
        let client = client.clone();
        let url = url.clone();
        async move {
            let (status, body) = match get_health(&client, &url).await {
                Ok(reply) => reply,
                Err(HealthError::Status { status, body }) => (status, body),
                Err(HealthError::Transport(e)) => return Err(e),
            };

            Ok::<_, reqwest::Error>(
                IterationResult::passed()
                    .check("status is 200", &status, |s| {
                        Ok::<_, Infallible>(*s == StatusCode::OK)
                    })
                    .check("response has status success", &body, |b| {
                        b.get("status")
                            .and_then(Value::as_str)
                            .map(|s| s == "success")
                            .ok_or("response has no status")
                    }),
            )
        }
    })
    .stage(Duration::from_secs(120) / scale, 10)
    .stage(Duration::from_secs(180) / scale, 100)
    .stage(Duration::from_secs(180) / scale, 500)
    .stage(Duration::from_secs(120) / scale, 1000)
    .stage(Duration::from_secs(300) / scale, 1000)
    .stage(Duration::from_secs(120) / scale, 0)
    .threshold("req_duration", "p(95)<500")
    .threshold("req_duration", "p(99)<1000")
    .pacing(Duration::from_secs(1));

    test = if args.abort_on_fail {
        test.abort_on_fail("req_failed", "rate<0.01")
    } else {
        test.threshold("req_failed", "rate<0.01")
    };

    let stop = test.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight iterations.");
            stop.cancel();
        }
    });

    let summary = test.await?;
    println!("{summary}");
    std::process::exit(summary.exit_code());
}

#[derive(Debug, thiserror::Error)]
enum HealthError {
    #[error("server answered {status}")]
    Status { status: StatusCode, body: Value },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// An error status is an `Err` for `req_failed` but still reaches the checks.
#[transaction]
async fn get_health(client: &Client, url: &str) -> Result<(StatusCode, Value), HealthError> {
    let res = client.get(url).send().await?;
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    if status.is_client_error() || status.is_server_error() {
        Err(HealthError::Status { status, body })
    } else {
        Ok((status, body))
    }
}
