// src/services/auth.rs

//! Single-sign-on login driver.
//!
//! Login is a small state machine: obtain an `authId` from the identity
//! provider, submit the credential callbacks, then chase redirects (HTTP,
//! script and SAML form POSTs) until the portal dashboard is reached.

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::json;

use super::session::{AuthSession, HttpRequest, HttpResponse, SessionClient, script_redirect_target};
use crate::error::{AppError, Result};
use crate::models::{Config, PortalConfig};
use crate::settings::Credentials;
use crate::utils::url::{decode_html_entities, resolve, strip_port_443, with_origin};

/// Iterations without progress after which a plain 200 counts as logged in.
const SETTLE_AFTER: usize = 5;

/// A SAML assertion waiting to be posted to the service provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlPost {
    pub acs_url: String,
    pub saml_response: String,
    pub relay_state: String,
}

/// Login progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Start,
    SsoChallenge {
        auth_id: String,
    },
    SsoSubmit {
        payload: serde_json::Value,
    },
    SamlRedirectChase {
        current_url: String,
        pending_post: Option<SamlPost>,
        iteration: usize,
    },
    Authenticated {
        landing_url: String,
    },
}

/// What a single chase response tells the driver to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaseOutcome {
    Landed,
    SamlPost {
        post: SamlPost,
        next_url: Option<String>,
    },
    Redirect(String),
    ScriptRedirect(String),
    Settled,
    Unresolved,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SsoReply {
    auth_id: Option<String>,
    token_id: Option<String>,
    success_url: Option<String>,
    message: Option<String>,
}

/// Drives the login state machine over a [`SessionClient`].
pub struct AuthDriver<'a> {
    client: &'a SessionClient,
    portal: PortalConfig,
    max_iterations: usize,
}

impl<'a> AuthDriver<'a> {
    pub fn new(client: &'a SessionClient, config: &Config) -> Self {
        Self {
            client,
            portal: config.portal.clone(),
            max_iterations: config.crawler.max_redirects,
        }
    }

    /// Log in and return the authenticated landing URL.
    pub async fn login(&self, session: &mut AuthSession, credentials: &Credentials) -> Result<String> {
        log::info!("Portal login started for {}", credentials.userid);
        let mut state = AuthState::Start;

        loop {
            state = match state {
                AuthState::Authenticated { landing_url } => {
                    log::info!("Portal session established: {landing_url}");
                    return Ok(landing_url);
                }
                other => self.step(session, credentials, other).await?,
            };
        }
    }

    /// Advance one state. Terminal failure is reported as `Err`.
    pub async fn step(
        &self,
        session: &mut AuthSession,
        credentials: &Credentials,
        state: AuthState,
    ) -> Result<AuthState> {
        match state {
            AuthState::Start => {
                let response = self
                    .client
                    .send(session, HttpRequest::post(&self.portal.sso_url), false)
                    .await?;
                let reply = parse_sso_reply(&response)?;
                let auth_id = reply.auth_id.ok_or_else(|| {
                    AppError::authentication(format!(
                        "identity provider returned no authId (status {})",
                        response.status
                    ))
                })?;
                Ok(AuthState::SsoChallenge { auth_id })
            }

            AuthState::SsoChallenge { auth_id } => Ok(AuthState::SsoSubmit {
                payload: credential_payload(&auth_id, credentials),
            }),

            AuthState::SsoSubmit { payload } => {
                let request = HttpRequest::post(&self.portal.sso_url).json(&payload);
                let response = self.client.send(session, request, false).await?;
                let reply = parse_sso_reply(&response)?;

                if reply.token_id.is_none() && reply.success_url.is_none() {
                    return Err(AppError::authentication(
                        reply.message.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                if let Some(token) = reply.token_id {
                    session
                        .jar_mut()
                        .insert(self.portal.token_cookie_name.clone(), token);
                }
                log::info!("SSO authentication succeeded; following SAML redirects");

                Ok(AuthState::SamlRedirectChase {
                    current_url: self.portal.login_url(),
                    pending_post: None,
                    iteration: 0,
                })
            }

            AuthState::SamlRedirectChase {
                current_url,
                pending_post,
                iteration,
            } => self.chase(session, current_url, pending_post, iteration).await,

            done @ AuthState::Authenticated { .. } => Ok(done),
        }
    }

    async fn chase(
        &self,
        session: &mut AuthSession,
        current_url: String,
        pending_post: Option<SamlPost>,
        iteration: usize,
    ) -> Result<AuthState> {
        if iteration >= self.max_iterations {
            return Err(AppError::RedirectLoop {
                url: current_url,
                limit: self.max_iterations,
            });
        }

        let request = match pending_post {
            Some(post) => {
                log::debug!("Posting SAML assertion to {}", post.acs_url);
                HttpRequest::post(&post.acs_url).form(&[
                    ("SAMLResponse", post.saml_response.as_str()),
                    ("RelayState", post.relay_state.as_str()),
                ])
            }
            None => HttpRequest::get(&current_url),
        };
        let requested_url = decode_html_entities(&request.url);
        let response = self.client.send(session, request, false).await?;

        let next = iteration + 1;
        let outcome = classify_chase_response(&response, &requested_url, iteration, &self.portal);
        log::debug!(
            "Chase step {iteration}: {} -> {}",
            response.status,
            outcome_name(&outcome)
        );

        match outcome {
            ChaseOutcome::Landed | ChaseOutcome::Settled => Ok(AuthState::Authenticated {
                landing_url: current_url,
            }),
            ChaseOutcome::SamlPost { post, next_url } => Ok(AuthState::SamlRedirectChase {
                current_url: next_url.unwrap_or(current_url),
                pending_post: Some(post),
                iteration: next,
            }),
            ChaseOutcome::Redirect(url) | ChaseOutcome::ScriptRedirect(url) => {
                Ok(AuthState::SamlRedirectChase {
                    current_url: url,
                    pending_post: None,
                    iteration: next,
                })
            }
            ChaseOutcome::Unresolved => Err(AppError::RedirectUnresolved {
                status: response.status,
                url: current_url,
            }),
        }
    }
}

/// Classify one response of the redirect chase.
///
/// `requested_url` is the URL that produced the response; relative
/// `Location` headers resolve against it.
pub fn classify_chase_response(
    response: &HttpResponse,
    requested_url: &str,
    iteration: usize,
    portal: &PortalConfig,
) -> ChaseOutcome {
    let body = &response.body;

    if response.status == 200
        && portal
            .landing_markers
            .iter()
            .any(|marker| !marker.is_empty() && body.contains(marker.as_str()))
    {
        return ChaseOutcome::Landed;
    }

    let location = response
        .location()
        .map(|loc| resolve(requested_url, &strip_port_443(&decode_html_entities(loc))));

    if let Some(post) = extract_saml_post(body, portal) {
        return ChaseOutcome::SamlPost {
            post,
            next_url: location,
        };
    }

    if let Some(url) = location {
        return ChaseOutcome::Redirect(url);
    }

    if let Some(target) = script_redirect_target(body) {
        return ChaseOutcome::ScriptRedirect(with_origin(
            &strip_port_443(&target),
            portal.base(),
        ));
    }

    if iteration >= SETTLE_AFTER && response.status == 200 {
        return ChaseOutcome::Settled;
    }

    ChaseOutcome::Unresolved
}

/// Pull the SAML assertion form out of an identity provider page.
pub fn extract_saml_post(body: &str, portal: &PortalConfig) -> Option<SamlPost> {
    if !body.contains("SAMLResponse") {
        return None;
    }

    let document = Html::parse_document(body);
    let response_sel = Selector::parse(r#"input[name="SAMLResponse"]"#).ok()?;
    let relay_sel = Selector::parse(r#"input[name="RelayState"]"#).ok()?;
    let form_sel = Selector::parse("form[action]").ok()?;

    let input = document.select(&response_sel).next()?;
    let saml_response = clean_base64(input.value().attr("value")?);
    if saml_response.is_empty() {
        return None;
    }

    let relay_state = document
        .select(&relay_sel)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(clean_relay_state)
        .unwrap_or_default();

    let action = input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "form")
        .and_then(|form| form.value().attr("action"))
        .or_else(|| {
            document
                .select(&form_sel)
                .next()
                .and_then(|form| form.value().attr("action"))
        })
        .map(str::trim)
        .filter(|action| !action.is_empty());

    let acs_url = match action {
        Some(action) => with_origin(&strip_port_443(&decode_html_entities(action)), portal.base()),
        None => portal.acs_url(),
    };

    Some(SamlPost {
        acs_url,
        saml_response,
        relay_state,
    })
}

/// Decode entities, drop anything outside the base64 alphabet and re-pad.
pub fn clean_base64(raw: &str) -> String {
    let decoded = decode_html_entities(raw);
    let body: String = decoded
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
        .collect();
    let pad = (4 - body.len() % 4) % 4;
    format!("{body}{}", "=".repeat(pad))
}

/// Decode entities and remove line breaks.
pub fn clean_relay_state(raw: &str) -> String {
    decode_html_entities(raw)
        .replace(['\r', '\n'], "")
        .trim()
        .to_string()
}

fn credential_payload(auth_id: &str, credentials: &Credentials) -> serde_json::Value {
    json!({
        "authId": auth_id,
        "callbacks": [
            {
                "type": "NameCallback",
                "output": [{ "name": "prompt", "value": "ユーザー名:" }],
                "input": [{ "name": "IDToken1", "value": credentials.userid }]
            },
            {
                "type": "PasswordCallback",
                "output": [{ "name": "prompt", "value": "パスワード:" }],
                "input": [{ "name": "IDToken2", "value": credentials.password }],
                "echoPassword": false
            }
        ]
    })
}

fn parse_sso_reply(response: &HttpResponse) -> Result<SsoReply> {
    serde_json::from_str(&response.body).map_err(|e| {
        AppError::authentication(format!(
            "identity provider reply is not JSON (status {}): {e}",
            response.status
        ))
    })
}

fn outcome_name(outcome: &ChaseOutcome) -> &'static str {
    match outcome {
        ChaseOutcome::Landed => "landed",
        ChaseOutcome::SamlPost { .. } => "saml-post",
        ChaseOutcome::Redirect(_) => "redirect",
        ChaseOutcome::ScriptRedirect(_) => "script-redirect",
        ChaseOutcome::Settled => "settled",
        ChaseOutcome::Unresolved => "unresolved",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;

    use super::*;
    use crate::services::session::RequestBody;
    use crate::services::testing::ScriptedTransport;

    const PORTAL: &str = "https://lms.example.ac.jp";
    const SSO: &str = "https://sso.example.ac.jp/opensso/json/authenticate";

    fn test_config() -> Config {
        let mut config = Config::default();
        config.portal.base_url = PORTAL.to_string();
        config.portal.sso_url = SSO.to_string();
        config
    }

    fn credentials() -> Credentials {
        Credentials {
            userid: "s123".into(),
            password: "secret".into(),
        }
    }

    /// Answers the two SSO calls; everything else goes to `chase`.
    fn sso_then<F>(chase: F) -> Arc<ScriptedTransport>
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        Arc::new(ScriptedTransport::routes(move |request| {
            if request.url == SSO {
                return match request.body {
                    RequestBody::Empty => HttpResponse::new(200, r#"{"authId":"A1"}"#),
                    _ => HttpResponse::new(200, r#"{"tokenId":"TOKEN-1","successUrl":"/"}"#),
                };
            }
            chase(request)
        }))
    }

    const SAML_PAGE: &str = r#"<html><body onload="document.forms[0].submit()">
        <form method="post" action="https&#x3a;&#x2f;&#x2f;lms.example.ac.jp:443&#x2f;simplesaml&#x2f;acs">
          <input type="hidden" name="SAMLResponse" value="PHNhbWw+
          dGVzdA&#x3d;&#x3d;" />
          <input type="hidden" name="RelayState" value="https&#x3a;&#x2f;&#x2f;lms.example.ac.jp&#x2f;webclass&#x2f;
" />
        </form></body></html>"#;

    #[tokio::test]
    async fn test_login_happy_path() {
        let transport = sso_then(|request| match (request.method.as_str(), request.url.as_str()) {
            ("GET", "https://lms.example.ac.jp/webclass/login.php?auth_mode=SAML") => {
                HttpResponse::new(302, "").with_header(
                    "Location",
                    "https://sso.example.ac.jp:443/opensso/saml2/jsp/idpSSOInit.jsp?x=1&amp;y=2",
                )
            }
            ("GET", "https://sso.example.ac.jp/opensso/saml2/jsp/idpSSOInit.jsp?x=1&y=2") => {
                HttpResponse::new(200, SAML_PAGE)
            }
            ("POST", "https://lms.example.ac.jp/simplesaml/acs") => {
                HttpResponse::new(302, "").with_header("Location", "/webclass/")
            }
            ("GET", "https://lms.example.ac.jp/webclass/") => HttpResponse::new(
                200,
                r#"<a class="cl-courseList_courseLink" href="/x">コースリスト</a>"#,
            ),
            _ => HttpResponse::new(404, "not found"),
        });
        let config = test_config();
        let client = SessionClient::new(transport.clone(), &config);
        let driver = AuthDriver::new(&client, &config);
        let mut session = AuthSession::new();

        let landing = driver.login(&mut session, &credentials()).await.unwrap();

        assert_eq!(landing, "https://lms.example.ac.jp/webclass/");
        assert_eq!(session.jar().get("iPlanetDirectoryPro"), Some("TOKEN-1"));

        let requests = transport.requests();
        let submit = &requests[1];
        let RequestBody::Json(payload) = &submit.body else {
            panic!("credential submit must be JSON");
        };
        let payload: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(payload["authId"], "A1");
        assert_eq!(payload["callbacks"][0]["input"][0]["value"], "s123");
        assert_eq!(payload["callbacks"][1]["input"][0]["name"], "IDToken2");
        assert_eq!(payload["callbacks"][1]["echoPassword"], false);

        let acs = requests
            .iter()
            .find(|r| r.method == Method::POST && r.url.ends_with("/simplesaml/acs"))
            .unwrap();
        let RequestBody::Form(form) = &acs.body else {
            panic!("SAML assertion must be form-encoded");
        };
        assert!(form.contains("SAMLResponse=PHNhbWw%2BdGVzdA%3D%3D"));
        assert!(form.contains("RelayState=https%3A%2F%2Flms.example.ac.jp%2Fwebclass%2F"));
        assert!(
            acs.header_value("cookie")
                .unwrap()
                .contains("iPlanetDirectoryPro=TOKEN-1")
        );
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            HttpResponse::new(200, r#"{"authId":"A1"}"#),
            HttpResponse::new(401, r#"{"code":401,"message":"Authentication Failed"}"#),
        ]));
        let config = test_config();
        let client = SessionClient::new(transport.clone(), &config);
        let driver = AuthDriver::new(&client, &config);
        let mut session = AuthSession::new();

        let err = driver.login(&mut session, &credentials()).await.unwrap_err();
        assert!(matches!(&err, AppError::Authentication(msg) if msg == "Authentication Failed"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_login_missing_auth_id() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![HttpResponse::new(
            503,
            "<html>maintenance</html>",
        )]));
        let config = test_config();
        let client = SessionClient::new(transport, &config);
        let driver = AuthDriver::new(&client, &config);

        let err = driver
            .login(&mut AuthSession::new(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_chase_stops_at_redirect_cap() {
        // 20 chained redirects against a cap of 15
        let transport = sso_then(|request| {
            let hop = request
                .url
                .rsplit("/hop/")
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            if hop >= 20 {
                HttpResponse::new(200, "コースリスト")
            } else {
                HttpResponse::new(302, "")
                    .with_header("Location", format!("{PORTAL}/hop/{}", hop + 1))
            }
        });
        let config = test_config();
        let client = SessionClient::new(transport.clone(), &config);
        let driver = AuthDriver::new(&client, &config);

        let err = driver
            .login(&mut AuthSession::new(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RedirectLoop { limit: 15, .. }));
        // two SSO calls plus exactly fifteen chase requests
        assert_eq!(transport.requests().len(), 17);
    }

    #[tokio::test]
    async fn test_chase_unresolved_page_fails() {
        let transport = sso_then(|_| HttpResponse::new(500, "<html>error</html>"));
        let config = test_config();
        let client = SessionClient::new(transport, &config);
        let driver = AuthDriver::new(&client, &config);

        let err = driver
            .login(&mut AuthSession::new(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RedirectUnresolved { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_chase_settles_after_quiet_iterations() {
        let transport = sso_then(|request| {
            let hop = request
                .url
                .rsplit("/r")
                .next()
                .and_then(|n| n.parse::<usize>().ok());
            match hop {
                Some(n) if n >= 5 => HttpResponse::new(200, "<html>home</html>"),
                Some(n) => HttpResponse::new(302, "").with_header("Location", format!("/r{}", n + 1)),
                None => HttpResponse::new(302, "").with_header("Location", "/r1"),
            }
        });
        let config = test_config();
        let client = SessionClient::new(transport, &config);
        let driver = AuthDriver::new(&client, &config);

        let landing = driver
            .login(&mut AuthSession::new(), &credentials())
            .await
            .unwrap();
        assert_eq!(landing, format!("{PORTAL}/r5"));
    }

    #[test]
    fn test_classify_script_redirect_resolves_against_portal() {
        let portal = test_config().portal;
        let response = HttpResponse::new(
            200,
            r#"<script>window.location.href = "webclass/index.php";</script>"#,
        );
        assert_eq!(
            classify_chase_response(&response, "https://sso.example.ac.jp/x", 1, &portal),
            ChaseOutcome::ScriptRedirect(format!("{PORTAL}/webclass/index.php"))
        );
    }

    #[test]
    fn test_classify_plain_200_early_is_unresolved() {
        let portal = test_config().portal;
        let response = HttpResponse::new(200, "<html>nothing</html>");
        assert_eq!(
            classify_chase_response(&response, PORTAL, 2, &portal),
            ChaseOutcome::Unresolved
        );
        assert_eq!(
            classify_chase_response(&response, PORTAL, 5, &portal),
            ChaseOutcome::Settled
        );
    }

    #[test]
    fn test_classify_landing_requires_200() {
        let portal = test_config().portal;
        let response = HttpResponse::new(403, "コースリスト");
        assert_eq!(
            classify_chase_response(&response, PORTAL, 0, &portal),
            ChaseOutcome::Unresolved
        );
    }

    #[test]
    fn test_saml_form_without_action_uses_fallback_acs() {
        let portal = test_config().portal;
        let body = r#"<form method="post"><input type="hidden" name="SAMLResponse" value="QUJD"></form>"#;
        let post = extract_saml_post(body, &portal).unwrap();
        assert_eq!(post.acs_url, portal.acs_url());
        assert_eq!(post.saml_response, "QUJD");
        assert_eq!(post.relay_state, "");
    }

    #[test]
    fn test_clean_base64_repads() {
        assert_eq!(clean_base64("QUJ\r\nD RA"), "QUJDRA==");
        assert_eq!(clean_base64("QUJDRA&#x3d;"), "QUJDRA==");
        assert_eq!(clean_base64("QUJD"), "QUJD");
        assert_eq!(clean_base64(""), "");
    }

    #[test]
    fn test_clean_relay_state() {
        assert_eq!(
            clean_relay_state("  https&#x3a;&#x2f;&#x2f;a.example&#x2f;?a=1&amp;b=2\r\n"),
            "https://a.example/?a=1&b=2"
        );
    }
}
