// src/models/selectors.rs

//! CSS selectors for the portal's dashboard and course pages.

use serde::{Deserialize, Serialize};

/// CSS selectors and markers used to read portal pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSelectors {
    /// Anchors on the dashboard that may point at a course
    #[serde(default = "default_course_link")]
    pub course_link: String,

    /// Path prefix a course anchor's href must start with
    #[serde(default = "default_course_path_prefix")]
    pub course_path_prefix: String,

    /// One assignment card on a course page
    #[serde(default = "default_card")]
    pub card: String,

    /// Title element within a card
    #[serde(default = "default_content_name")]
    pub content_name: String,

    /// "New" badge inside the title that must not leak into it
    #[serde(default = "default_new_badge")]
    pub new_badge: String,

    /// Value cell of a card's detail list
    #[serde(default = "default_detail_data")]
    pub detail_data: String,

    /// Label text preceding the availability period value
    #[serde(default = "default_period_label")]
    pub period_label: String,

    /// Separator between period start and end
    #[serde(default = "default_period_separator")]
    pub period_separator: String,
}

fn default_course_link() -> String {
    "a[href]".to_string()
}

fn default_course_path_prefix() -> String {
    "/webclass/course.php/".to_string()
}

fn default_card() -> String {
    "section.list-group-item.cl-contentsList_listGroupItem".to_string()
}

fn default_content_name() -> String {
    "h4.cm-contentsList_contentName".to_string()
}

fn default_new_badge() -> String {
    "cl-contentsList_new".to_string()
}

fn default_detail_data() -> String {
    ".cm-contentsList_contentDetailListItemData".to_string()
}

fn default_period_label() -> String {
    "利用可能期間".to_string()
}

fn default_period_separator() -> String {
    " - ".to_string()
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            course_link: default_course_link(),
            course_path_prefix: default_course_path_prefix(),
            card: default_card(),
            content_name: default_content_name(),
            new_badge: default_new_badge(),
            detail_data: default_detail_data(),
            period_label: default_period_label(),
            period_separator: default_period_separator(),
        }
    }
}
