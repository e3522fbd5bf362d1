// src/services/session.rs

//! Cookie-carrying HTTP session client.
//!
//! The client never interprets page content beyond redirect hints. Cookie
//! state lives in an explicit [`AuthSession`] value that the caller owns and
//! threads through every call; nothing is kept on the client itself.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Method;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::http::{create_async_client, random_user_agent};
use crate::utils::url::{decode_html_entities, resolve, strip_port_443, with_origin};

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Pages longer than this are content, not redirect stubs.
const REDIRECT_STUB_MAX_LEN: usize = 500;

static SCRIPT_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:window\.location(?:\.href)?\s*=\s*['"]([^'"]+)['"]|content\s*=\s*['"]\s*\d+\s*;\s*url\s*=\s*['"]?([^'">]+))"#,
    )
    .unwrap()
});

/// Target of a `window.location.href = ...` or meta-refresh redirect.
pub fn script_redirect_target(body: &str) -> Option<String> {
    let caps = SCRIPT_REDIRECT.captures(body)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| decode_html_entities(m.as_str().trim()))
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Json(String),
    Form(String),
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = RequestBody::Json(value.to_string());
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().copied())
            .finish();
        self.body = RequestBody::Form(encoded);
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response with the status surfaced rather than raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated header.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location").filter(|l| !l.trim().is_empty())
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One request/response exchange with no redirect handling.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_async_client(&config.crawler)?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(json.clone()),
            RequestBody::Form(form) => builder
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(form.clone()),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Session cookies, last value wins per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Merge the `name=value` pair of one `Set-Cookie` header.
    pub fn merge_set_cookie(&mut self, header: &str) {
        let pair = header.split(';').next().unwrap_or_default();
        if let Some((name, value)) = pair.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                self.insert(name, value.trim());
            }
        }
    }

    /// The whole jar as a single `Cookie` header value.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Per-run session state; owned by exactly one scan and never persisted.
#[derive(Debug, Default)]
pub struct AuthSession {
    jar: CookieJar,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn jar_mut(&mut self) -> &mut CookieJar {
        &mut self.jar
    }
}

/// HTTP client that attaches session cookies and a rotating User-Agent.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn HttpTransport>,
    user_agents: Vec<String>,
    max_redirects: usize,
    portal_origin: String,
}

impl SessionClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            transport,
            user_agents: config.crawler.user_agents.clone(),
            max_redirects: config.crawler.max_redirects,
            portal_origin: config.portal.base().to_string(),
        }
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Send a request, optionally following HTTP redirects.
    ///
    /// Non-2xx statuses are returned, not raised. Cookies from every hop are
    /// merged into the session.
    pub async fn send(
        &self,
        session: &mut AuthSession,
        request: HttpRequest,
        follow_redirects: bool,
    ) -> Result<HttpResponse> {
        let mut request = request;
        let mut hops = 0;

        loop {
            let response = self.send_once(session, &mut request).await?;
            if !follow_redirects || !response.is_redirect() {
                return Ok(response);
            }
            let Some(location) = response.location() else {
                return Ok(response);
            };
            if hops >= self.max_redirects {
                return Err(AppError::RedirectLoop {
                    url: request.url,
                    limit: self.max_redirects,
                });
            }
            hops += 1;

            let next = resolve(
                &request.url,
                &strip_port_443(&decode_html_entities(location)),
            );
            request = redirected(request, response.status, next);
        }
    }

    /// GET a page, chasing HTTP and short script redirects, and return its body.
    pub async fn fetch_with_session(&self, session: &mut AuthSession, url: &str) -> Result<String> {
        let mut current = url.to_string();

        for _ in 0..=self.max_redirects {
            let mut request = HttpRequest::get(&current);
            let response = self.send_once(session, &mut request).await?;
            current = request.url;

            if response.is_redirect() {
                if let Some(location) = response.location() {
                    current = resolve(
                        &current,
                        &strip_port_443(&decode_html_entities(location)),
                    );
                    continue;
                }
            }

            if response.is_success() && response.body.len() < REDIRECT_STUB_MAX_LEN {
                if let Some(target) = script_redirect_target(&response.body) {
                    current = with_origin(&target, &self.portal_origin);
                    continue;
                }
            }

            return Ok(response.body);
        }

        Err(AppError::RedirectLoop {
            url: current,
            limit: self.max_redirects,
        })
    }

    async fn send_once(
        &self,
        session: &mut AuthSession,
        request: &mut HttpRequest,
    ) -> Result<HttpResponse> {
        request.url = decode_html_entities(&request.url);

        let mut outgoing = HttpRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: vec![
                (
                    "User-Agent".to_string(),
                    random_user_agent(&self.user_agents).to_string(),
                ),
                ("Accept".to_string(), ACCEPT.to_string()),
                ("Referer".to_string(), request.url.clone()),
            ],
            body: request.body.clone(),
        };
        if let Some(cookie) = session.jar().header_value() {
            outgoing.headers.push(("Cookie".to_string(), cookie));
        }
        outgoing.headers.extend(request.headers.iter().cloned());

        log::debug!("{} {}", outgoing.method, outgoing.url);
        let response = self.transport.execute(&outgoing).await.map_err(|e| {
            log::warn!("Fetch failed: {} - {}", outgoing.url, e);
            e
        })?;

        for set_cookie in response.header_all("set-cookie") {
            session.jar_mut().merge_set_cookie(set_cookie);
        }
        Ok(response)
    }
}

/// The follow-up request for a redirect; 301/302/303 turn into a bodiless GET.
fn redirected(request: HttpRequest, status: u16, url: String) -> HttpRequest {
    match status {
        307 | 308 => HttpRequest { url, ..request },
        _ => HttpRequest {
            method: Method::GET,
            url,
            headers: request
                .headers
                .into_iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case("content-type"))
                .collect(),
            body: RequestBody::Empty,
        },
    }
}
