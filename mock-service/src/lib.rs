use axum::{
    async_trait, debug_handler,
    extract::{FromRequestParts, Path},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Requests each tenant may make against `/api` per minute.
pub const TENANT_REQUESTS_PER_MINUTE: u32 = 6000;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data", get(get_data))
        .route("/api/users", post(create_user))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/flaky/:key/every/:n", get(flaky))
        .route(
            "/limited/:max_tps/delay/ms/:delay_ms/server/:server_id",
            get(limited),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    debug!("Mock service listening on {addr}");
    axum::serve(listener, router()).await?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedUser {
    pub user_id: String,
}

#[debug_handler]
pub async fn health() -> Json<ApiResponse<()>> {
    counter!("mock_service.requests", "route" => "health").increment(1);
    Json(ApiResponse {
        status: "success".to_string(),
        message: Some("API is running".to_string()),
        data: None,
    })
}

/** Tenant-scoped API **/

/// Bearer token on `/api` routes; the token itself names the tenant.
pub struct Tenant(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Authorization header required"))?;

        let token = header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Bearer token required"))?;

        if TENANT_LIMITER.check_key(&token.to_string()).is_err() {
            counter!("mock_service.rate_limited").increment(1);
            return Err((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"));
        }

        Ok(Tenant(token.to_string()))
    }
}

lazy_static! {
    static ref TENANT_LIMITER: DefaultKeyedRateLimiter<String> = RateLimiter::keyed(
        Quota::per_minute(NonZeroU32::new(TENANT_REQUESTS_PER_MINUTE).unwrap())
    );
    static ref USERS: Arc<RwLock<HashMap<String, Vec<User>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

static NEXT_USER_ID: AtomicU64 = AtomicU64::new(1);

#[debug_handler]
pub async fn get_data(Tenant(tenant): Tenant) -> Json<ApiResponse<Vec<User>>> {
    counter!("mock_service.requests", "route" => "data").increment(1);
    let users = USERS
        .read()
        .unwrap()
        .get(&tenant)
        .map(|users| users.iter().rev().take(10).cloned().collect())
        .unwrap_or_default();

    Json(ApiResponse::success(users))
}

#[debug_handler]
pub async fn create_user(
    Tenant(tenant): Tenant,
    Json(new_user): Json<NewUser>,
) -> Result<Json<ApiResponse<CreatedUser>>, (StatusCode, &'static str)> {
    counter!("mock_service.requests", "route" => "users").increment(1);
    if new_user.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Invalid request body"));
    }

    let user = User {
        id: format!("user-{}", NEXT_USER_ID.fetch_add(1, Ordering::Relaxed)),
        name: new_user.name,
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        is_active: true,
    };
    let user_id = user.id.clone();
    USERS.write().unwrap().entry(tenant).or_default().push(user);

    Ok(Json(ApiResponse::success(CreatedUser { user_id })))
}

/** Test routes **/

#[debug_handler]
pub async fn delay(Path(delay_ms): Path<u64>) {
    counter!("mock_service.requests", "route" => "delay").increment(1);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

lazy_static! {
    static ref FLAKY_MAP: Arc<RwLock<HashMap<String, Arc<AtomicU64>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Fails every `n`th request made under `key` with a 500.
#[debug_handler]
pub async fn flaky(Path((key, n)): Path<(String, u64)>) -> Result<(), StatusCode> {
    counter!("mock_service.requests", "route" => "flaky").increment(1);

    let read = FLAKY_MAP.read().unwrap().get(&key).cloned();
    let count = if let Some(count) = read {
        count
    } else {
        FLAKY_MAP
            .write()
            .unwrap()
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    };

    let seen = count.fetch_add(1, Ordering::SeqCst) + 1;
    if n > 0 && seen % n == 0 {
        debug!("MOCK SERVER ___ FLAKY {seen}");
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        Ok(())
    }
}

lazy_static! {
    static ref LIMITED_MAP: Arc<RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

#[debug_handler]
pub async fn limited(
    Path((max_tps, delay_ms, server_id)): Path<(u32, u64, String)>,
) -> Result<(), StatusCode> {
    counter!("mock_service.requests", "route" => "limited").increment(1);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let read = LIMITED_MAP.read().unwrap().get(&server_id).cloned();
    let limiter = if let Some(limiter) = read {
        limiter
    } else {
        let limiter = Arc::new(rate_limiter(max_tps).ok_or(StatusCode::BAD_REQUEST)?);
        LIMITED_MAP
            .write()
            .unwrap()
            .insert(server_id, limiter.clone());
        limiter
    };

    match limiter.check() {
        Ok(_) => Ok(()),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

/** Utils **/

pub fn rate_limiter(tps: u32) -> Option<DefaultDirectRateLimiter> {
    NonZeroU32::new(tps).map(|tps| RateLimiter::direct(Quota::per_second(tps)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn send(req: Request<Body>) -> (StatusCode, String) {
        let res = router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_reports_success() {
        let (status, body) = send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let body: ApiResponse<()> = serde_json::from_str(&body).unwrap();
        assert_eq!(body.status, "success");
        assert_eq!(body.message.as_deref(), Some("API is running"));
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let (status, _) = send(Request::get("/api/data").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            Request::get("/api/data")
                .header(AUTHORIZATION, "Basic abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn created_users_are_listed_per_tenant() {
        let (status, body) = send(
            Request::post("/api/users")
                .header(AUTHORIZATION, "Bearer tenant-a")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"Test User 42"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let created: ApiResponse<CreatedUser> = serde_json::from_str(&body).unwrap();
        assert_eq!(created.status, "success");

        let (_, body) = send(
            Request::get("/api/data")
                .header(AUTHORIZATION, "Bearer tenant-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let data: ApiResponse<Vec<User>> = serde_json::from_str(&body).unwrap();
        let users = data.data.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, created.data.unwrap().user_id);

        let (_, body) = send(
            Request::get("/api/data")
                .header(AUTHORIZATION, "Bearer tenant-b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let data: ApiResponse<Vec<User>> = serde_json::from_str(&body).unwrap();
        assert!(data.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_user_is_rejected() {
        let (status, _) = send(
            Request::post("/api/users")
                .header(AUTHORIZATION, "Bearer tenant-c")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"  "}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delay_holds_the_response() {
        let start = std::time::Instant::now();
        let (status, _) = send(Request::get("/delay/ms/50").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn flaky_fails_every_nth_request() {
        let mut statuses = vec![];
        for _ in 0..6 {
            let (status, _) =
                send(Request::get("/flaky/unit/every/3").body(Body::empty()).unwrap()).await;
            statuses.push(status);
        }
        let failures = statuses
            .iter()
            .filter(|s| **s == StatusCode::INTERNAL_SERVER_ERROR)
            .count();
        assert_eq!(failures, 2);
        assert_eq!(statuses[2], StatusCode::INTERNAL_SERVER_ERROR);
    }
}
