// src/services/parser.rs

//! Extraction of course links and assignment cards from portal markup.
//!
//! Both functions are pure: they take page text and return records, skipping
//! anything that does not look like a course link or a complete card.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{CourseContent, CourseLink, PortalConfig};
use crate::utils::url::{extract_content_id, with_origin};

// Remainder of a course href after the configured path prefix.
static COURSE_HREF_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]+/login\?acs_=").unwrap());

/// Course links on the dashboard, deduplicated by path (first one wins).
pub fn parse_dashboard(html: &str, portal: &PortalConfig) -> Result<Vec<CourseLink>> {
    let selectors = &portal.selectors;
    let document = Html::parse_document(html);
    let link_sel = parse_selector(&selectors.course_link)?;

    let mut seen = HashSet::new();
    let mut courses = Vec::new();

    for anchor in document.select(&link_sel) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let Some(tail) = href.strip_prefix(selectors.course_path_prefix.as_str()) else {
            continue;
        };
        if !COURSE_HREF_TAIL.is_match(tail) {
            continue;
        }

        let key = href.split('?').next().unwrap_or(href);
        if !seen.insert(key.to_string()) {
            continue;
        }

        let name = collapse_whitespace(&anchor.text().collect::<String>().replace('»', ""));
        courses.push(CourseLink {
            url: with_origin(href, portal.base()),
            name,
        });
    }

    log::debug!("Dashboard lists {} courses", courses.len());
    Ok(courses)
}

/// Assignment cards on a course page.
///
/// Cards without a title or without a content ID are skipped.
pub fn parse_course_contents(html: &str, portal: &PortalConfig) -> Result<Vec<CourseContent>> {
    let selectors = &portal.selectors;
    let document = Html::parse_document(html);
    let card_sel = parse_selector(&selectors.card)?;
    let name_sel = parse_selector(&selectors.content_name)?;
    let data_sel = parse_selector(&selectors.detail_data)?;
    let link_sel = parse_selector("a[href]")?;

    let mut contents = Vec::new();

    for (index, card) in document.select(&card_sel).enumerate() {
        let Some(name_el) = card.select(&name_sel).next() else {
            log::debug!("Card {index}: no title element, skipped");
            continue;
        };

        let title = collapse_whitespace(&text_without_class(name_el, &selectors.new_badge));
        if title.is_empty() {
            log::debug!("Card {index}: empty title, skipped");
            continue;
        }

        let content_id = name_el
            .select(&link_sel)
            .chain(card.select(&link_sel))
            .filter_map(|a| a.value().attr("href"))
            .find_map(extract_content_id);
        let Some(content_id) = content_id else {
            log::debug!("Card {index} '{title}': no content link, skipped");
            continue;
        };

        let (start, end) = period_after_label(card, &data_sel, &selectors.period_label)
            .map(|period| split_period(&period, &selectors.period_separator))
            .unwrap_or_default();

        contents.push(CourseContent {
            title,
            share_link: portal.share_link(&content_id),
            start,
            end,
        });
    }

    Ok(contents)
}

/// Split an availability period; a lone value is the end.
pub fn split_period(period: &str, separator: &str) -> (String, String) {
    let parts: Vec<&str> = period.split(separator).collect();
    match parts.as_slice() {
        [start, end] => (start.trim().to_string(), end.trim().to_string()),
        _ => (String::new(), period.trim().to_string()),
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element, leaving out any descendant carrying `class`.
fn text_without_class(element: ElementRef<'_>, class: &str) -> String {
    let mut out = String::new();
    for node in element.children() {
        if let Some(text) = node.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(node) {
            if !child.value().classes().any(|c| c == class) {
                out.push_str(&text_without_class(child, class));
            }
        }
    }
    out
}

/// The first data cell that follows an element whose own text holds `label`.
fn period_after_label(card: ElementRef<'_>, data_sel: &Selector, label: &str) -> Option<String> {
    let mut after_label = false;
    for node in card.descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        if after_label && data_sel.matches(&element) {
            return Some(collapse_whitespace(&element.text().collect::<String>()));
        }
        if !after_label && own_text(element).contains(label) {
            after_label = true;
        }
    }
    None
}

fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal() -> PortalConfig {
        PortalConfig {
            base_url: "https://lms.example.ac.jp/".into(),
            ..PortalConfig::default()
        }
    }

    const DASHBOARD: &str = r#"
        <div class="cl-courseList">
          <a href='/webclass/course.php/ab12cd/login?acs_=111' Target='_top'>&raquo; 10234 Algorithms (2024)</a>
          <a href='/webclass/course.php/ab12cd/login?acs_=222' Target='_top'>&raquo; duplicate</a>
          <a href='/webclass/course.php/ff00/login?acs_=333' Target='_top'><span>»</span>
              Linear <b>Algebra</b></a>
          <a href='/webclass/course.php/XYZ/login?acs_=444'>not hex</a>
          <a href='/webclass/info.php'>Info</a>
        </div>"#;

    #[test]
    fn test_parse_dashboard() {
        let courses = parse_dashboard(DASHBOARD, &portal()).unwrap();
        assert_eq!(
            courses,
            vec![
                CourseLink {
                    url: "https://lms.example.ac.jp/webclass/course.php/ab12cd/login?acs_=111"
                        .into(),
                    name: "10234 Algorithms (2024)".into(),
                },
                CourseLink {
                    url: "https://lms.example.ac.jp/webclass/course.php/ff00/login?acs_=333".into(),
                    name: "Linear Algebra".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_dashboard_without_courses() {
        assert!(parse_dashboard("<html><body>ログイン</body></html>", &portal())
            .unwrap()
            .is_empty());
    }

    const COURSE_PAGE: &str = r#"
    <section class="list-group-item cl-contentsList_listGroupItem">
      <h4 class="cm-contentsList_contentName">
        <div class="cl-contentsList_new">New</div>
        <a href="/webclass/do_contents.php?reset_status=1&amp;id=9f3ab2&amp;page=1">Report 1</a>
      </h4>
      <div class="cm-contentsList_contentDetailList">
        <div class="cm-contentsList_contentDetailListItemLabel">利用回数</div>
        <div class="cm-contentsList_contentDetailListItemData">1</div>
        <div class="cm-contentsList_contentDetailListItemLabel">利用可能期間</div>
        <div class="cm-contentsList_contentDetailListItemData">
          2024/11/20 09:00 - 2024/12/01 23:59
        </div>
      </div>
    </section>
    <section class="list-group-item cl-contentsList_listGroupItem">
      <h4 class="cm-contentsList_contentName"><a href="/webclass/do_contents.php?id=77aa">Quiz</a></h4>
      <div class="cm-contentsList_contentDetailListItemLabel">利用可能期間</div>
      <div class="cm-contentsList_contentDetailListItemData">2024/12/10 17:00</div>
    </section>
    <section class="list-group-item cl-contentsList_listGroupItem">
      <h4 class="cm-contentsList_contentName">Reading (no link)</h4>
    </section>
    <section class="list-group-item cl-contentsList_listGroupItem">
      <div>No title here <a href="/webclass/do_contents.php?id=1234">x</a></div>
    </section>
    <section class="list-group-item cl-contentsList_listGroupItem">
      <h4 class="cm-contentsList_contentName"><a href="/webclass/do_contents.php?id=beef">Slides</a></h4>
    </section>"#;

    #[test]
    fn test_parse_course_contents() {
        let contents = parse_course_contents(COURSE_PAGE, &portal()).unwrap();
        assert_eq!(contents.len(), 3);

        assert_eq!(contents[0].title, "Report 1");
        assert_eq!(
            contents[0].share_link,
            "https://lms.example.ac.jp/webclass/login.php?id=9f3ab2&page=1&auth_mode=SAML"
        );
        assert_eq!(contents[0].start, "2024/11/20 09:00");
        assert_eq!(contents[0].end, "2024/12/01 23:59");

        assert_eq!(contents[1].title, "Quiz");
        assert_eq!(contents[1].start, "");
        assert_eq!(contents[1].end, "2024/12/10 17:00");

        assert_eq!(contents[2].title, "Slides");
        assert_eq!(contents[2].start, "");
        assert_eq!(contents[2].end, "");
    }

    #[test]
    fn test_invalid_configured_selector_is_reported() {
        let mut portal = portal();
        portal.selectors.card = "section[".into();
        assert!(matches!(
            parse_course_contents(COURSE_PAGE, &portal),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn test_split_period() {
        assert_eq!(
            split_period("2024/01/01 - 2024/01/31", " - "),
            ("2024/01/01".to_string(), "2024/01/31".to_string())
        );
        assert_eq!(
            split_period("2024/01/31", " - "),
            (String::new(), "2024/01/31".to_string())
        );
    }
}
