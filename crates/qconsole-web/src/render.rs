//! HTML rendering of the console with minijinja.
//!
//! Templates are compiled into the binary. Values are HTML-escaped; the image
//! `src` is emitted verbatim because record parsing guarantees it is base64.

use minijinja::{context, Environment};
use serde::Serialize;

use qconsole_common::record::FieldLine;
use qconsole_common::{Record, Result};

use crate::log::LogEntry;

const PAGE: &str = "page.html";
const LOG: &str = "log.html";
const ENTRY: &str = "entry.html";

pub struct Renderer {
    env: Environment<'static>,
}

#[derive(Debug, Serialize)]
struct EntryView {
    seq: u64,
    is_image: bool,
    src: String,
    caption: String,
    lines: Vec<FieldLine>,
}

impl From<&LogEntry> for EntryView {
    fn from(entry: &LogEntry) -> Self {
        match &entry.record {
            Record::Image { img, message } => EntryView {
                seq: entry.seq,
                is_image: true,
                src: format!("data:image/png;base64,{img}"),
                caption: message.clone(),
                lines: Vec::new(),
            },
            generic @ Record::Generic { .. } => EntryView {
                seq: entry.seq,
                is_image: false,
                src: String::new(),
                caption: String::new(),
                lines: generic.lines(),
            },
        }
    }
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(PAGE, include_str!("../templates/page.html")).map_err(anyhow::Error::from)?;
        env.add_template(LOG, include_str!("../templates/log.html")).map_err(anyhow::Error::from)?;
        env.add_template(ENTRY, include_str!("../templates/entry.html")).map_err(anyhow::Error::from)?;
        Ok(Self { env })
    }

    /// One log entry followed by its divider.
    pub fn render_entry(&self, entry: &LogEntry) -> Result<String> {
        let tmpl = self.env.get_template(ENTRY).map_err(anyhow::Error::from)?;
        let html = tmpl
            .render(context! { entry => EntryView::from(entry) })
            .map_err(anyhow::Error::from)?;
        Ok(html)
    }

    /// Every entry in arrival order.
    pub fn render_log(&self, entries: &[LogEntry]) -> Result<String> {
        let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();
        let tmpl = self.env.get_template(LOG).map_err(anyhow::Error::from)?;
        let html = tmpl.render(context! { entries => views }).map_err(anyhow::Error::from)?;
        Ok(html)
    }

    pub fn render_page(
        &self,
        draft: &str,
        entries: &[LogEntry],
        last_seq: u64,
        clear_draft: bool,
    ) -> Result<String> {
        let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();
        let tmpl = self.env.get_template(PAGE).map_err(anyhow::Error::from)?;
        let html = tmpl
            .render(context! {
                draft => draft,
                entries => views,
                last_seq => last_seq,
                clear_draft => clear_draft,
            })
            .map_err(anyhow::Error::from)?;
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MessageLog;

    fn log_of(payloads: &[&str]) -> Vec<LogEntry> {
        let mut log = MessageLog::new(None);
        for data in payloads {
            let (raw, record) = Record::decode(data).unwrap();
            log.push(raw, record);
        }
        log.entries()
    }

    #[test]
    fn test_generic_entry_lines() {
        let renderer = Renderer::new().unwrap();
        let entries = log_of(&[r#"{"value": 42, "nested": {"a": [1, 2]}}"#]);
        let html = renderer.render_entry(&entries[0]).unwrap();
        assert!(html.contains("value: 42"), "{html}");
        assert!(html.contains("nested: {&quot;a&quot;:[1,2]}"), "{html}");
        assert!(html.contains("<hr"));
    }

    #[test]
    fn test_image_entry() {
        let renderer = Renderer::new().unwrap();
        let entries = log_of(&[r#"{"img": "iVBORw0KGgo=", "message": "done"}"#]);
        let html = renderer.render_entry(&entries[0]).unwrap();
        assert!(html.contains(r#"<img src="data:image/png;base64,iVBORw0KGgo=""#), "{html}");
        assert!(html.contains(r#"<div class="caption">done</div>"#), "{html}");
        assert!(!html.contains("img: "));
    }

    #[test]
    fn test_values_are_escaped() {
        let renderer = Renderer::new().unwrap();
        let entries = log_of(&[r#"{"status": "<script>alert(1)</script>"}"#]);
        let html = renderer.render_entry(&entries[0]).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_log_keeps_arrival_order_with_dividers() {
        let renderer = Renderer::new().unwrap();
        let entries = log_of(&[r#"{"step": "first"}"#, r#"{"step": "second"}"#]);
        let html = renderer.render_log(&entries).unwrap();

        let first = html.find("step: first").unwrap();
        let second = html.find("step: second").unwrap();
        assert!(first < second);
        let dividers: Vec<usize> = html.match_indices("<hr").map(|(i, _)| i).collect();
        assert_eq!(dividers.len(), 2);
        assert!(first < dividers[0] && dividers[0] < second && second < dividers[1]);
    }

    #[test]
    fn test_page_shows_draft_and_log() {
        let renderer = Renderer::new().unwrap();
        let entries = log_of(&[r#"{"value": 42}"#]);
        let html = renderer.render_page("find <flights>", &entries, 1, false).unwrap();
        assert!(html.contains("find &lt;flights&gt;</textarea>"), "{html}");
        assert!(html.contains("Enter your query here..."));
        assert!(html.contains("value: 42"));
        assert!(html.contains("/api/events?after=1"));
        assert!(html.contains("const clearOnSubmit = false;"));
    }

    #[test]
    fn test_page_carries_clear_flag() {
        let renderer = Renderer::new().unwrap();
        let html = renderer.render_page("", &[], 0, true).unwrap();
        assert!(html.contains("const clearOnSubmit = true;"));
    }
}
