// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use rand::seq::SliceRandom;

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Used when the configured pool is empty.
const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (compatible; assignment-sync/0.1)";

/// Create a configured asynchronous HTTP client.
///
/// Redirects are never followed by reqwest itself; the session client walks
/// them hop by hop so cookies set along the way are kept.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(client)
}

/// Pick a User-Agent from the pool at random.
pub fn random_user_agent(pool: &[String]) -> &str {
    let mut rng = rand::thread_rng();
    pool.choose(&mut rng)
        .map(String::as_str)
        .unwrap_or(FALLBACK_USER_AGENT)
}
