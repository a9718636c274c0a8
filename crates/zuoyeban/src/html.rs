use anyhow::Result;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::prefs::Preferences;
use crate::types::{Column, Entry, Label, LayoutResult, SubjectGroup};

/// Write a laid-out board to a standalone HTML file
pub fn generate_html(
    layout: &LayoutResult,
    prefs: &Preferences,
    subjects: &[String],
    labels: &[Label],
    path: &Path,
) -> Result<()> {
    let html = render_page(layout, prefs, subjects, labels);
    fs::write(path, html.into_string())?;
    Ok(())
}

pub fn render_page(
    layout: &LayoutResult,
    prefs: &Preferences,
    subjects: &[String],
    labels: &[Label],
) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Homework Board" }
                style { (PreEscaped(CSS)) }
            }
            body style={ "font-size: " (prefs.font_size) "px" } data-refresh=(prefs.refresh_interval) {
                div.container {
                    h1 { "Homework Board" }
                    div.top-buttons {
                        span.stats {
                            span #"total-count" { (layout.entry_count()) }
                            " entries"
                        }
                        button.button #"refreshButton" type="button" { "Refresh" }
                    }
                    (render_board(layout, prefs))
                    @if prefs.quick_publish {
                        (render_quick_publish(subjects, labels))
                    }
                    div.home-button {
                        a href="/" { "Home" }
                    }
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

/// The column container on its own
pub fn render_board(layout: &LayoutResult, prefs: &Preferences) -> Markup {
    html! {
        div.homework-container #"homeworkContainer" {
            @if layout.is_empty() {
                div.no-submissions { "No homework yet" }
            } @else {
                @for column in &layout.columns {
                    (render_column(column, prefs))
                }
            }
        }
    }
}

fn render_column(column: &Column, prefs: &Preferences) -> Markup {
    html! {
        div.column data-height=(column.height) {
            @for group in &column.groups {
                (render_group(group, prefs))
            }
        }
    }
}

fn render_group(group: &SubjectGroup, prefs: &Preferences) -> Markup {
    html! {
        div.subject-section.subject-continued[group.is_continuation] {
            div.subject-title {
                (group.subject)
                @if group.is_continuation {
                    " (continued)"
                }
            }
            ul.homework-list {
                @for entry in &group.entries {
                    (render_item(entry, prefs))
                }
            }
        }
    }
}

fn render_item(entry: &Entry, prefs: &Preferences) -> Markup {
    let deadline_attr = entry
        .deadline
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    html! {
        li.homework-item data-entry-id=(entry.id) data-deadline=(deadline_attr) {
            div.content-wrapper {
                span.content { (entry.content) }
                span.labels {
                    @for label in &entry.labels {
                        span.label-tag style=[label.color.as_ref().map(|c| format!("background-color: {}", c))] {
                            (label.name)
                        }
                    }
                }
            }
            div.dates-container {
                div.deadline {
                    @if prefs.edit_button {
                        button.edit-button type="button" data-id=(entry.id) title="Edit homework" {
                            "✎"
                        }
                    }
                    @if prefs.delete_button {
                        button.delete-button type="button" data-id=(entry.id) title="Delete homework" {
                            "✕"
                        }
                    }
                    "Due: " (deadline_text(entry))
                }
                div.timestamp { "Published: " (published_text(&entry.published_at)) }
            }
        }
    }
}

fn render_quick_publish(subjects: &[String], labels: &[Label]) -> Markup {
    html! {
        form.quick-publish #"quickPublishForm" method="post" action="/homework/publish" {
            select name="subject" required {
                @for subject in subjects {
                    option value=(subject) { (subject) }
                }
            }
            div.word-grid #"wordGrid" {}
            textarea name="content" placeholder="Homework" required {}
            input type="date" name="deadline" required;
            @if labels.is_empty() {
                input type="text" name="labels" placeholder="Labels, comma separated";
            } @else {
                div.label-choices {
                    @for choice in labels {
                        label {
                            input type="checkbox" name="label_id" value=(choice.id);
                            " " (choice.name)
                        }
                    }
                }
            }
            button type="submit" { "Publish" }
        }
    }
}

/// `MM-DD (Weekday)`, or "not set"
fn deadline_text(entry: &Entry) -> String {
    match entry.deadline {
        Some(date) => date.format("%m-%d (%a)").to_string(),
        None => "not set".to_string(),
    }
}

/// `MM-DD HH:MM` out of `YYYY-MM-DD HH:MM:SS`
fn published_text(timestamp: &str) -> &str {
    timestamp.get(5..16).unwrap_or(timestamp)
}

const CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #f4f6fb;
    color: #1d2433;
    line-height: 1.4;
    overflow-x: hidden;
}

.container {
    padding: 15px;
}

h1 {
    font-size: 2em;
    font-weight: 800;
    margin-bottom: 8px;
}

.top-buttons {
    display: flex;
    align-items: center;
    gap: 12px;
    margin-bottom: 8px;
}

.stats {
    color: #667;
    font-size: 0.85em;
    text-transform: uppercase;
    letter-spacing: 0.08em;
}

.button, .home-button a {
    color: #2952cc;
    text-decoration: none;
    font-weight: 600;
}

.homework-container {
    display: flex;
    gap: 15px;
    align-items: flex-start;
}

.column {
    flex: 1;
    min-width: 0;
}

.subject-section {
    background: #fff;
    border-radius: 8px;
    margin-bottom: 8px;
    box-shadow: 0 1px 3px rgba(0,0,0,0.08);
}

.subject-title {
    font-size: 1.3em;
    font-weight: 700;
    padding: 6px 12px;
    border-bottom: 2px solid #2952cc;
}

.subject-continued .subject-title {
    border-bottom-style: dashed;
    color: #556;
}

.homework-list {
    list-style: none;
}

.homework-item {
    padding: 8px 12px;
    border-bottom: 1px solid #eef;
}

.homework-item:last-child {
    border-bottom: none;
}

.content {
    white-space: pre-wrap;
    word-break: break-word;
}

.labels {
    display: block;
}

.label-tag {
    display: inline-block;
    background: #99a;
    color: #fff;
    font-size: 0.75em;
    padding: 2px 8px;
    margin: 4px 4px 0 0;
    border-radius: 10px;
}

.dates-container {
    display: flex;
    justify-content: space-between;
    color: #778;
    font-size: 0.8em;
    margin-top: 4px;
}

.edit-button, .delete-button {
    border: none;
    background: none;
    color: #c33;
    cursor: pointer;
    margin-right: 6px;
}

.no-submissions {
    padding: 60px 20px;
    text-align: center;
    color: #889;
}

.quick-publish {
    display: grid;
    gap: 8px;
    max-width: 480px;
    margin-top: 16px;
}

.word-grid {
    display: grid;
    grid-template-columns: repeat(3, 1fr);
    gap: 4px;
}

.word-grid button {
    padding: 4px;
}

.label-choices label {
    margin-right: 12px;
}

.home-button {
    margin-top: 8px;
}
"#;

const JAVASCRIPT: &str = r#"
(function () {
    const refreshSeconds = parseInt(document.body.dataset.refresh, 10) || 60;
    const params = new URLSearchParams(window.location.search);

    function viewport() {
        return { width: window.innerWidth, height: window.innerHeight };
    }

    // Tell the server what the display looks like; it debounces these
    function reportViewport() {
        return fetch('/api/viewport', {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify(viewport())
        }).catch(() => {});
    }

    function reload() {
        const v = viewport();
        params.set('width', v.width);
        params.set('height', v.height);
        window.location.search = params.toString();
    }

    if (!params.has('width') || !params.has('height')) {
        reportViewport().then(reload);
        return;
    }

    let resizeTimeout;
    window.addEventListener('resize', () => {
        reportViewport();
        clearTimeout(resizeTimeout);
        resizeTimeout = setTimeout(reload, 250);
    });

    setInterval(reload, refreshSeconds * 1000);

    document.getElementById('refreshButton').addEventListener('click', () => {
        fetch('/api/refresh').then(reload);
    });

    document.querySelectorAll('.delete-button').forEach(button => {
        button.addEventListener('click', () => {
            if (!confirm('Delete this homework?')) return;
            fetch('/api/submissions/' + button.dataset.id, { method: 'DELETE' }).then(reload);
        });
    });

    document.querySelectorAll('.edit-button').forEach(button => {
        button.addEventListener('click', () => {
            const item = button.closest('.homework-item');
            const current = item.querySelector('.content').textContent;
            const content = prompt('Edit homework', current);
            if (content === null || content === current) return;
            fetch('/api/submissions/' + button.dataset.id, {
                method: 'PUT',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ content: content })
            }).then(response => response.json()).then(result => {
                if (result.success) reload(); else alert(result.message);
            });
        });
    });

    const form = document.getElementById('quickPublishForm');
    if (form) {
        const content = form.querySelector('textarea[name="content"]');
        fetch('/api/global_words').then(r => r.json()).then(words => {
            const grid = document.getElementById('wordGrid');
            words.forEach(word => {
                const button = document.createElement('button');
                button.type = 'button';
                button.textContent = word;
                button.addEventListener('click', () => {
                    const start = content.selectionStart;
                    content.setRangeText(word, start, content.selectionEnd, 'end');
                    content.focus();
                });
                grid.appendChild(button);
            });
        }).catch(() => {});

        form.addEventListener('submit', event => {
            event.preventDefault();
            const data = new FormData(form);
            const body = {
                subject: data.get('subject'),
                content: data.get('content'),
                deadline: data.get('deadline')
            };
            const ids = data.getAll('label_id').map(Number);
            if (form.querySelector('input[name="label_id"]')) {
                body.label_ids = ids;
            } else {
                body.labels = (data.get('labels') || '').split(',')
                    .map(l => l.trim()).filter(l => l);
            }
            fetch('/api/submissions', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(body)
            }).then(response => response.json()).then(result => {
                if (result.success) reload(); else alert(result.message);
            });
        });
    }
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn make_entry(id: u32, deadline: Option<&str>) -> Entry {
        Entry {
            id,
            subject: "Math".to_string(),
            content: format!("Exercises <{}>", id),
            deadline: deadline.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            published_at: "2025-01-10 08:30:00".to_string(),
            labels: vec![Label {
                id: 1,
                name: "Written".to_string(),
                color: Some("#ff9800".to_string()),
            }],
        }
    }

    fn two_column_layout() -> LayoutResult {
        LayoutResult {
            columns: vec![
                Column {
                    groups: vec![SubjectGroup {
                        subject: "Math".to_string(),
                        entries: vec![make_entry(1, Some("2025-01-15"))],
                        is_continuation: false,
                    }],
                    height: 170,
                },
                Column {
                    groups: vec![SubjectGroup {
                        subject: "Math".to_string(),
                        entries: vec![make_entry(2, None)],
                        is_continuation: true,
                    }],
                    height: 170,
                },
            ],
            max_column_height: 200,
            forced_placements: 0,
        }
    }

    #[test]
    fn test_render_columns_and_continuation() {
        let html = render_page(&two_column_layout(), &Preferences::default(), &[], &[]).into_string();

        assert_eq!(html.matches("class=\"column\"").count(), 2);
        assert!(html.contains("subject-section subject-continued"));
        assert!(html.contains("Math (continued)"));
        assert!(html.contains("data-deadline=\"2025-01-15\""));
    }

    #[test]
    fn test_render_item_details() {
        let html = render_page(&two_column_layout(), &Preferences::default(), &[], &[]).into_string();

        // 2025-01-15 was a Wednesday
        assert!(html.contains("Due: 01-15 (Wed)"));
        assert!(html.contains("Due: not set"));
        assert!(html.contains("Published: 01-10 08:30"));
        assert!(html.contains("style=\"background-color: #ff9800\""));
        assert!(html.contains("Exercises &lt;1&gt;"));
    }

    #[test]
    fn test_render_empty_board() {
        let layout = LayoutResult {
            columns: vec![Column::default(); 3],
            max_column_height: 500,
            forced_placements: 0,
        };
        let html = render_page(&layout, &Preferences::default(), &[], &[]).into_string();

        assert!(html.contains("No homework yet"));
        assert!(!html.contains("class=\"column\""));
    }

    #[test]
    fn test_render_respects_preferences() {
        let prefs = Preferences {
            font_size: 22,
            refresh_interval: 30,
            delete_button: true,
            quick_publish: true,
            ..Default::default()
        };
        let subjects = vec!["Math".to_string(), "Art".to_string()];
        let html = render_page(&two_column_layout(), &prefs, &subjects, &[]).into_string();

        assert!(html.contains("font-size: 22px"));
        assert!(html.contains("data-refresh=\"30\""));
        assert_eq!(html.matches("class=\"delete-button\"").count(), 2);
        assert!(html.contains("action=\"/homework/publish\""));
        assert!(html.contains("<option value=\"Art\">Art</option>"));
    }

    #[test]
    fn test_render_hides_optional_controls_by_default() {
        let html = render_page(&two_column_layout(), &Preferences::default(), &[], &[]).into_string();

        assert!(!html.contains("class=\"delete-button\""));
        assert!(!html.contains("quick-publish\""));
    }

    #[test]
    fn test_render_edit_button_and_label_choices() {
        let prefs = Preferences {
            edit_button: true,
            quick_publish: true,
            ..Default::default()
        };
        let labels = vec![Label {
            id: 7,
            name: "Oral".to_string(),
            color: None,
        }];
        let html = render_page(&two_column_layout(), &prefs, &["Math".to_string()], &labels)
            .into_string();

        assert_eq!(html.matches("class=\"edit-button\"").count(), 2);
        assert!(html.contains("name=\"label_id\" value=\"7\""));
        assert!(!html.contains("name=\"labels\""));
        assert!(html.contains("id=\"wordGrid\""));
    }

    #[test]
    fn test_refresh_stays_on_board() {
        let html = render_page(&two_column_layout(), &Preferences::default(), &[], &[]).into_string();

        assert!(html.contains("id=\"refreshButton\""));
        assert!(!html.contains("href=\"/api/refresh\""));
        assert!(html.contains("fetch('/api/refresh').then(reload)"));
    }

    #[test]
    fn test_published_text_short_timestamp() {
        assert_eq!(published_text("2025-01-10 08:30:00"), "01-10 08:30");
        assert_eq!(published_text("bad"), "bad");
    }

    #[test]
    fn test_generate_html_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.html");

        generate_html(&two_column_layout(), &Preferences::default(), &[], &[], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("<!DOCTYPE html>"));
    }
}
