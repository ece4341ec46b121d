mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use reqwest::{Client, StatusCode};
    use std::convert::Infallible;
    use std::time::Duration;
    use volley::prelude::*;
    use volley::Aggregation;

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn flaky_service_fails_req_failed() {
        init().await;

        let client = Client::new();
        let summary = load_test("flaky", move |_ctx: VuContext| {
            let client = client.clone();
            async move {
                get_flaky(&client, "thresholds-flaky").await?;
                Ok::<_, reqwest::Error>(IterationResult::passed())
            }
        })
        .stage(Duration::from_secs(2), 4)
        .threshold("req_failed", "rate<0.01")
        .threshold("req_duration", "p(95)<500")
        .pacing(Duration::from_millis(20))
        .await
        .unwrap();

        println!("{summary}");
        assert_eq!(summary.exit_code(), 99);
        assert_eq!(failed_thresholds(&summary), vec!["req_failed: rate<0.01"]);

        // Every fifth request fails, and each failure ends its iteration with an error.
        let failed = summary.metrics["req_failed"]
            .aggregate(Aggregation::Rate)
            .unwrap();
        assert!(failed > 0.1 && failed <= 0.2, "{failed}");
        assert_eq!(
            summary.metrics["iteration_errors"].aggregate(Aggregation::Rate),
            Some(failed)
        );
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn abort_on_fail_ends_the_run_early() {
        init().await;

        let client = Client::new();
        let summary = load_test("abort", move |_ctx: VuContext| {
            let client = client.clone();
            async move {
                get_flaky(&client, "thresholds-abort").await?;
                Ok::<_, reqwest::Error>(IterationResult::passed())
            }
        })
        .stage(Duration::from_secs(60), 4)
        .abort_on_fail("req_failed", "rate<0.05")
        .abort_grace(Duration::from_secs(1))
        .pacing(Duration::from_millis(20))
        .await
        .unwrap();

        assert!(summary.verdict.aborted);
        assert!(!summary.passed());
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn rate_limited_service_fails_checks() {
        init().await;

        let client = Client::new();
        let summary = load_test("limited", move |_ctx: VuContext| {
            let client = client.clone();
            async move {
                let status = get_limited(&client).await?;
                Ok::<_, reqwest::Error>(IterationResult::passed().check(
                    "status is 200",
                    &status,
                    |s| Ok::<_, Infallible>(*s == StatusCode::OK),
                ))
            }
        })
        .stage(Duration::from_millis(500), 10)
        .stage(Duration::from_secs(1), 10)
        .threshold("checks", "rate>0.99")
        .threshold("req_failed", "rate<0.01")
        .await
        .unwrap();

        // 429s are answered, so the transaction succeeds while the check fails.
        assert_eq!(failed_thresholds(&summary), vec!["checks: rate>0.99"]);
        let passed = summary.metrics["checks{status is 200}"]
            .aggregate(Aggregation::Rate)
            .unwrap();
        assert!(passed < 0.99, "{passed}");
        assert_eq!(
            summary.metrics["req_failed"].aggregate(Aggregation::Rate),
            Some(0.0)
        );
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn slow_service_fails_latency_thresholds() {
        init().await;

        let client = Client::new();
        let summary = load_test("slow", move |_ctx: VuContext| {
            let client = client.clone();
            async move {
                get_delayed(&client, 120).await?;
                Ok::<_, reqwest::Error>(IterationResult::passed())
            }
        })
        .stage(Duration::from_secs(1), 3)
        .stage(Duration::from_secs(1), 3)
        .threshold("req_duration", "p(95)<100")
        .threshold("req_duration", "min>=120")
        .threshold("req_duration{get_delayed}", "avg<100")
        .threshold("req_failed", "rate<0.01")
        .await
        .unwrap();

        assert_eq!(summary.exit_code(), 99);
        assert_eq!(
            failed_thresholds(&summary),
            vec!["req_duration: p(95)<100", "req_duration{get_delayed}: avg<100"]
        );

        let latency = &summary.metrics["req_duration"];
        assert_eq!(latency.count(), summary.iterations);
        assert!(latency.aggregate(Aggregation::Min).unwrap() >= 120.);
    }

    /* Scenario Helpers */

    #[transaction]
    async fn get_flaky(client: &Client, key: &str) -> Result<(), reqwest::Error> {
        client
            .get(url(&format!("/flaky/{key}/every/5")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    #[transaction]
    async fn get_limited(client: &Client) -> Result<StatusCode, reqwest::Error> {
        let res = client
            .get(url("/limited/50/delay/ms/1/server/thresholds"))
            .send()
            .await?;
        Ok(res.status())
    }

    #[transaction]
    async fn get_delayed(client: &Client, delay_ms: u64) -> Result<(), reqwest::Error> {
        client
            .get(url(&format!("/delay/ms/{delay_ms}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
