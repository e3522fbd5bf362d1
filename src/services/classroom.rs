// src/services/classroom.rs

//! Course-work source backed by the Classroom REST API.

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use serde::Deserialize;

use super::scanner::ScanOutcome;
use crate::error::{AppError, Result};
use crate::models::{AssignmentRecord, Config, CourseWork, RemoteCourse, Source};
use crate::utils::date::format_display;
use crate::utils::http::create_async_client;

/// Second upstream: active courses and their published course work.
#[async_trait]
pub trait CourseWorkSource: Send + Sync {
    async fn list_active_courses(&self) -> Result<Vec<RemoteCourse>>;

    async fn list_published_course_work(&self, course_id: &str) -> Result<Vec<CourseWork>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoursePage {
    #[serde(default)]
    courses: Vec<RemoteCourse>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseWorkPage {
    #[serde(default)]
    course_work: Vec<CourseWork>,
    next_page_token: Option<String>,
}

/// Classroom API client authenticated with a bearer token.
pub struct ClassroomClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ClassroomClient {
    pub fn new(config: &Config, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: create_async_client(&config.crawler)?,
            base_url: config.google.classroom_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        page_token: Option<&str>,
    ) -> Result<T> {
        let mut request = self.client.get(url).bearer_auth(&self.token).query(query);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::course_work_api(format!("{status} {body}")));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CourseWorkSource for ClassroomClient {
    async fn list_active_courses(&self) -> Result<Vec<RemoteCourse>> {
        let url = format!("{}/courses", self.base_url);
        let mut courses = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: CoursePage = self
                .get_page(&url, &[("courseStates", "ACTIVE")], page_token.as_deref())
                .await?;
            courses.extend(page.courses);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(courses)
    }

    async fn list_published_course_work(&self, course_id: &str) -> Result<Vec<CourseWork>> {
        let url = format!("{}/courses/{}/courseWork", self.base_url, course_id);
        let mut works = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: CourseWorkPage = self
                .get_page(
                    &url,
                    &[("courseWorkStates", "PUBLISHED")],
                    page_token.as_deref(),
                )
                .await?;
            works.extend(page.course_work);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(works)
    }
}

/// Fetch every active course's published work as records.
///
/// Listing courses must succeed; a single course's failure is logged and
/// counted.
pub async fn collect_course_work(source: &dyn CourseWorkSource) -> Result<ScanOutcome> {
    let courses = source.list_active_courses().await?;
    if courses.is_empty() {
        log::info!("No active courses");
    }

    let mut outcome = ScanOutcome {
        course_total: courses.len(),
        ..ScanOutcome::default()
    };

    for course in &courses {
        match source.list_published_course_work(&course.id).await {
            Ok(works) => outcome.records.extend(
                works
                    .iter()
                    .filter_map(|work| course_work_record(&course.name, work, &Local)),
            ),
            Err(e) => {
                log::warn!("{}", AppError::parse_skip(course.name.as_str(), e));
                outcome.course_failures += 1;
            }
        }
    }

    log::info!(
        "Course-work scan finished: {} items from {} courses ({} failed)",
        outcome.records.len(),
        outcome.course_total,
        outcome.course_failures
    );
    Ok(outcome)
}

/// Convert one piece of course work; work without a due date yields `None`.
///
/// The API reports the due instant in UTC; it is displayed in `tz`.
pub fn course_work_record<Tz: TimeZone>(
    course_name: &str,
    work: &CourseWork,
    tz: &Tz,
) -> Option<AssignmentRecord> {
    let due_date = work.due_date?;
    let due_time = work.due_time.unwrap_or_default();

    let Some(date) = NaiveDate::from_ymd_opt(due_date.year, due_date.month, due_date.day) else {
        log::warn!("Course work '{}' has an invalid due date", work.title);
        return None;
    };
    let time = NaiveTime::from_hms_opt(due_time.hours, due_time.minutes, 0).unwrap_or(NaiveTime::MIN);
    let due_local = tz.from_utc_datetime(&date.and_time(time)).naive_local();

    Some(AssignmentRecord::new(
        Source::CourseWork,
        course_name,
        work.title.as_str(),
        "",
        format_display(due_local),
        work.alternate_link.as_str(),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};

    use super::*;
    use crate::models::{DueDate, DueTime};
    use crate::services::testing::StaticCourseWork;

    fn work(title: &str, due_date: Option<DueDate>, due_time: Option<DueTime>) -> CourseWork {
        CourseWork {
            title: title.into(),
            due_date,
            due_time,
            alternate_link: format!("https://classroom.example.com/c/1/a/{title}"),
        }
    }

    #[test]
    fn test_record_in_display_timezone() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let record = course_work_record(
            "Physics",
            &work(
                "Lab",
                Some(DueDate {
                    year: 2024,
                    month: 12,
                    day: 1,
                }),
                Some(DueTime {
                    hours: 14,
                    minutes: 59,
                }),
            ),
            &jst,
        )
        .unwrap();

        assert_eq!(record.source, Source::CourseWork);
        assert_eq!(record.course_name, "Physics");
        assert_eq!(record.available_from, "");
        assert_eq!(record.due_at, "2024/12/01 23:59");
        assert_eq!(record.link_url, "https://classroom.example.com/c/1/a/Lab");
    }

    #[test]
    fn test_missing_due_time_is_midnight() {
        let record = course_work_record(
            "Physics",
            &work(
                "Essay",
                Some(DueDate {
                    year: 2025,
                    month: 1,
                    day: 5,
                }),
                None,
            ),
            &Utc,
        )
        .unwrap();
        assert_eq!(record.due_at, "2025/01/05 00:00");
    }

    #[test]
    fn test_no_due_date_or_bad_date_is_skipped() {
        assert!(course_work_record("P", &work("Open", None, None), &Utc).is_none());
        let bad = DueDate {
            year: 2025,
            month: 2,
            day: 30,
        };
        assert!(course_work_record("P", &work("Bad", Some(bad), None), &Utc).is_none());
    }

    #[tokio::test]
    async fn test_collect_isolates_failing_course() {
        let source = StaticCourseWork::new()
            .course(
                "c1",
                "Physics",
                vec![
                    work(
                        "Lab",
                        Some(DueDate {
                            year: 2024,
                            month: 12,
                            day: 1,
                        }),
                        None,
                    ),
                    work("Open", None, None),
                ],
            )
            .failing_course("c2", "Chemistry");

        let outcome = collect_course_work(&source).await.unwrap();
        assert_eq!(outcome.course_total, 2);
        assert_eq!(outcome.course_failures, 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].title, "Lab");
    }
}
