//! Service layer for the sync application.
//!
//! This module contains the upstream and downstream clients:
//! - Cookie-carrying HTTP session (`SessionClient`)
//! - Single-sign-on login (`AuthDriver`)
//! - Portal page parsing and course scanning (`CourseScanner`)
//! - Course-work API (`ClassroomClient`)
//! - Task sink (`GoogleTasksClient`)

pub mod auth;
pub mod classroom;
pub mod parser;
pub mod scanner;
pub mod session;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthDriver, AuthState, ChaseOutcome};
pub use classroom::{ClassroomClient, CourseWorkSource, collect_course_work};
pub use scanner::{CourseScanner, ScanOutcome};
pub use session::{
    AuthSession, CookieJar, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    SessionClient,
};
pub use tasks::{GoogleTasksClient, TaskSink};
