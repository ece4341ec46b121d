mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use reqwest::{Client, RequestBuilder, Response, StatusCode};
    use serde_json::Value;
    use std::convert::Infallible;
    use std::time::Duration;
    use volley::prelude::*;
    use volley::{Aggregation, VuState};

    const TENANT: &str = "test-tenant";

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn api_load_test_passes() {
        init().await;

        let client = Client::new();
        let summary = load_test("api-load-test", move |ctx: VuContext| {
            let client = client.clone();
            async move { api_iteration(&client, Some(TENANT), &ctx).await }
        })
        .stage(Duration::from_secs(1), 2)
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_millis(500), 0)
        .threshold("req_failed", "rate<0.01")
        .threshold("req_duration", "p(95)<500")
        .threshold("req_duration", "p(99)<1000")
        .threshold("response_time", "avg<200")
        .metric("response_time", MetricKind::Trend)
        .pacing(Duration::from_millis(100))
        .await
        .unwrap();

        println!("{summary}");
        assert!(summary.passed());
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.peak_vus, 5);
        assert!(!summary.interrupted);

        for check in [
            "checks{health status is 200}",
            "checks{data response has status success}",
            "checks{create user response has status success}",
        ] {
            let rate = summary.metrics[check].aggregate(Aggregation::Rate);
            assert_eq!(rate, Some(1.0), "{check}");
        }

        let health = &summary.metrics["req_duration{get_health}"];
        let users = &summary.metrics["req_duration{create user}"];
        assert_eq!(health.count(), summary.iterations);
        assert_eq!(users.count(), summary.iterations);
        assert_eq!(summary.metrics["req_duration"].count(), 3 * summary.iterations);
        assert_eq!(
            summary.metrics["response_time"].count(),
            3 * summary.iterations
        );

        assert!(summary.vus.iter().all(|vu| vu.state == VuState::Stopped));
        assert!(summary.vus.iter().all(|vu| vu.iterations > 0));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn rejected_requests_fail_checks() {
        init().await;

        let client = Client::new();
        let summary = load_test("unauthorized", move |_ctx: VuContext| {
            let client = client.clone();
            async move {
                let status = client.get(url("/api/data")).send().await?.status();
                Ok::<_, reqwest::Error>(IterationResult::passed().check(
                    "data status is 200",
                    &status,
                    |s| Ok::<_, Infallible>(*s == StatusCode::OK),
                ))
            }
        })
        .stage(Duration::from_secs(1), 3)
        .threshold("checks", "rate>0.99")
        .threshold("iteration_failed", "rate<0.01")
        .pacing(Duration::from_millis(50))
        .await
        .unwrap();

        assert!(!summary.passed());
        assert_eq!(summary.exit_code(), 99);
        assert_eq!(
            failed_thresholds(&summary),
            vec!["checks: rate>0.99", "iteration_failed: rate<0.01"]
        );
        assert_eq!(
            summary.metrics["failures"].aggregate(Aggregation::Rate),
            Some(1.0)
        );
        assert_eq!(
            summary.metrics["iteration_errors"].aggregate(Aggregation::Rate),
            Some(0.0)
        );
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn error_statuses_fail_requests_and_checks() {
        init().await;

        let client = Client::new();
        let summary = load_test("anonymous", move |ctx: VuContext| {
            let client = client.clone();
            async move { api_iteration(&client, None, &ctx).await }
        })
        .stage(Duration::from_secs(1), 2)
        .threshold("req_failed", "rate<0.01")
        .metric("response_time", MetricKind::Trend)
        .pacing(Duration::from_millis(50))
        .await
        .unwrap();

        assert_eq!(failed_thresholds(&summary), vec!["req_failed: rate<0.01"]);

        // Health is public. Both `/api` calls answer 401 and the iteration carries on.
        let req_failed = summary.metrics["req_failed"].aggregate(Aggregation::Rate);
        assert_eq!(req_failed, Some(2. / 3.));
        assert_eq!(summary.metrics["req_duration"].count(), 3 * summary.iterations);
        assert_eq!(
            summary.metrics["iteration_errors"].aggregate(Aggregation::Rate),
            Some(0.0)
        );

        for (check, rate) in [
            ("checks{health status is 200}", 1.0),
            ("checks{data status is 200}", 0.0),
            ("checks{create user status is 200}", 0.0),
        ] {
            assert_eq!(
                summary.metrics[check].aggregate(Aggregation::Rate),
                Some(rate),
                "{check}"
            );
            assert_eq!(summary.metrics[check].count(), summary.iterations, "{check}");
        }
    }

    /* Scenario Helpers */

    #[derive(Debug)]
    struct Reply {
        status: StatusCode,
        body: Value,
    }

    impl Reply {
        fn is_ok(&self) -> Result<bool, Infallible> {
            Ok(self.status == StatusCode::OK)
        }

        fn is_success(&self) -> Result<bool, &'static str> {
            self.body
                .get("status")
                .and_then(Value::as_str)
                .map(|s| s == "success")
                .ok_or("response has no status")
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum RequestError {
        #[error("server answered {}", .0.status)]
        Status(Reply),
        #[error(transparent)]
        Transport(#[from] reqwest::Error),
    }

    fn answered(res: Result<Reply, RequestError>) -> Result<Reply, reqwest::Error> {
        match res {
            Ok(reply) | Err(RequestError::Status(reply)) => Ok(reply),
            Err(RequestError::Transport(e)) => Err(e),
        }
    }

    async fn api_iteration(
        client: &Client,
        token: Option<&str>,
        ctx: &VuContext,
    ) -> anyhow::Result<IterationResult> {
        let mut result = IterationResult::passed();

        let (health, elapsed) = timed(get_health(client)).await;
        let health = answered(health)?;
        ctx.record_duration("response_time", elapsed);
        result = result
            .check("health status is 200", &health, Reply::is_ok)
            .check("health response has status success", &health, Reply::is_success);

        let (data, elapsed) = timed(get_data(client, token)).await;
        let data = answered(data)?;
        ctx.record_duration("response_time", elapsed);
        result = result
            .check("data status is 200", &data, Reply::is_ok)
            .check("data response has status success", &data, Reply::is_success);

        let name = format!("Test User {}-{}", ctx.vu_id(), ctx.iteration());
        let (created, elapsed) = timed(create_user(client, token, name)).await;
        let created = answered(created)?;
        ctx.record_duration("response_time", elapsed);
        result = result
            .check("create user status is 200", &created, Reply::is_ok)
            .check(
                "create user response has status success",
                &created,
                Reply::is_success,
            );

        Ok(result)
    }

    fn authorized(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn reply(res: Response) -> Result<Reply, RequestError> {
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
    async fn get_health(client: &Client) -> Result<Reply, RequestError> {
        let res = client.get(url("/health")).send().await?;
        reply(res).await
    }

    #[transaction]
    async fn get_data(client: &Client, token: Option<&str>) -> Result<Reply, RequestError> {
        let res = authorized(client.get(url("/api/data")), token)
            .send()
            .await?;
        reply(res).await
    }

    #[transaction("create user")]
    async fn create_user(
        client: &Client,
        token: Option<&str>,
        name: String,
    ) -> Result<Reply, RequestError> {
        let res = authorized(client.post(url("/api/users")), token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        reply(res).await
    }
}
