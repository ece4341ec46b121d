use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

pub const MOCK_PORT: u16 = 3002;

#[allow(unused)]
pub fn url(path: &str) -> String {
    format!("http://127.0.0.1:{MOCK_PORT}{path}")
}

#[allow(unused)]
pub fn failed_thresholds(summary: &volley::RunSummary) -> Vec<String> {
    summary
        .verdict
        .failed_thresholds
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[allow(unused)]
pub async fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    let wait = ONCE_LOCK.get().is_none();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("volley=debug,mock_service=info,axum::rejection=trace")
            .init();

        PrometheusBuilder::new()
            .with_http_listener("0.0.0.0:8002".parse::<SocketAddr>().unwrap())
            .install()
            .unwrap();

        // NOTE: Each #[tokio::test] owns its runtime, so the service gets a runtime of its own
        // that outlives any single test.
        std::thread::spawn(|| {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime
                .block_on(mock_service::run(SocketAddr::from(([127, 0, 0, 1], MOCK_PORT))))
                .unwrap();
        });
    });

    if wait {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
