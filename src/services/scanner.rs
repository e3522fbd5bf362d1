// src/services/scanner.rs

//! Portal course scanner.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::auth::AuthDriver;
use super::parser::{parse_course_contents, parse_dashboard};
use super::session::{AuthSession, SessionClient};
use crate::error::{AppError, Result};
use crate::models::{AssignmentRecord, Config, CourseContent, CourseLink, Source};
use crate::settings::Credentials;

static LEADING_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+\s*").unwrap());
static TRAILING_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[(（].*[)）]\s*$").unwrap());

/// Result of one portal scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<AssignmentRecord>,
    pub course_total: usize,
    pub course_failures: usize,
}

/// Logs in once and walks every course on the dashboard, one request at a time.
pub struct CourseScanner {
    client: SessionClient,
    config: Config,
}

impl CourseScanner {
    pub fn new(client: SessionClient, config: &Config) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Scan all courses.
    ///
    /// Login and dashboard failures abort the scan; a failing course is
    /// logged and skipped.
    pub async fn scan(&self, credentials: &Credentials) -> Result<ScanOutcome> {
        let mut session = AuthSession::new();
        let landing_url = AuthDriver::new(&self.client, &self.config)
            .login(&mut session, credentials)
            .await?;

        let dashboard = self
            .client
            .fetch_with_session(&mut session, &landing_url)
            .await?;
        let courses = parse_dashboard(&dashboard, &self.config.portal)?;
        log::info!("Found {} courses on the dashboard", courses.len());

        let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
        let mut outcome = ScanOutcome {
            course_total: courses.len(),
            ..ScanOutcome::default()
        };

        for (i, course) in courses.iter().enumerate() {
            let course_name = normalize_course_name(&course.name);
            log::info!("[{}/{}] Scanning {}", i + 1, courses.len(), course_name);

            match self.scan_course(&mut session, course).await {
                Ok(contents) => {
                    log::debug!("{}: {} items", course_name, contents.len());
                    outcome
                        .records
                        .extend(contents.into_iter().map(|c| to_record(&course_name, c)));
                }
                Err(e) => {
                    let skip = AppError::parse_skip(course_name.as_str(), e);
                    log::warn!("{skip}");
                    outcome.course_failures += 1;
                }
            }

            if i + 1 < courses.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        log::info!(
            "Portal scan finished: {} items from {} courses ({} failed)",
            outcome.records.len(),
            outcome.course_total,
            outcome.course_failures
        );
        Ok(outcome)
    }

    async fn scan_course(
        &self,
        session: &mut AuthSession,
        course: &CourseLink,
    ) -> Result<Vec<CourseContent>> {
        let html = self.client.fetch_with_session(session, &course.url).await?;
        parse_course_contents(&html, &self.config.portal)
    }
}

/// Strip a leading course code and a trailing parenthetical suffix.
pub fn normalize_course_name(raw: &str) -> String {
    let without_code = LEADING_CODE.replace(raw, "");
    TRAILING_PAREN
        .replace(&without_code, "")
        .trim()
        .to_string()
}

fn to_record(course_name: &str, content: CourseContent) -> AssignmentRecord {
    AssignmentRecord::new(
        Source::Portal,
        course_name,
        content.title,
        content.start,
        content.end,
        content.share_link,
    )
}
