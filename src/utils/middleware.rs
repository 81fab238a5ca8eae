use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const REQUESTS_PER_WINDOW: u32 = 30;
const WINDOW: Duration = Duration::from_secs(1);

static RATE_LIMITER: Lazy<DashMap<String, (u32, Instant)>> = Lazy::new(DashMap::new);

/// Fixed-window per-IP rate limit, applied in front of the whole API.
pub async fn global_rate_limiter(request: Request, next: Next) -> Result<Response, StatusCode> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let now = Instant::now();
    // The shard guard must drop before the handler runs.
    let exceeded = {
        let mut entry = RATE_LIMITER.entry(ip.clone()).or_insert((0, now));
        if now.duration_since(entry.1) > WINDOW {
            *entry = (1, now);
        } else {
            entry.0 += 1;
        }
        entry.0 > REQUESTS_PER_WINDOW
    };

    if exceeded {
        tracing::warn!(action = "rate_limit_exceeded", ip = %ip);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}
