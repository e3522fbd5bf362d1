//! Records extracted from portal pages.

use serde::{Deserialize, Serialize};

/// A course link found on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseLink {
    /// Absolute course URL (carries the session-bound query string)
    pub url: String,
    /// Link text with decorative glyphs and tags removed
    pub name: String,
}

/// One assignment card on a course contents page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseContent {
    pub title: String,
    /// Canonical share link built from the content ID
    pub share_link: String,
    /// Availability start (empty when the period only has an end)
    pub start: String,
    /// Availability end, used as the deadline
    pub end: String,
}
