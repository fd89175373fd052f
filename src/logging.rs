use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::fmt;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

pub const EXTRACTION_TARGET: &str = "pattern_sense::extraction";
const MAX_DIFF_CHARS: usize = 2048;
const PREVIEW_CHAR_LIMIT: usize = 160;
const TARGET_GUTTER_WIDTH: usize = 28;
const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// One bulk-paste extraction, as logged at DEBUG level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub source: String,
    pub updates: Vec<FieldUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: String,
    pub before: String,
    pub after: String,
    pub changed: bool,
}

impl ExtractionRecord {
    pub fn new(source: String, updates: Vec<FieldUpdate>) -> Self {
        Self { source, updates }
    }

    pub fn changed_fields(&self) -> usize {
        self.updates.iter().filter(|update| update.changed).count()
    }

    pub fn render_pretty(&self, use_color: bool) -> String {
        let mut lines = vec![format!(
            "┌─ Field Extraction (fields: {}, changed: {})",
            self.updates.len(),
            self.changed_fields()
        )];
        push_body_line(
            &mut lines,
            format!("SRC : {}", preview_value(&self.source, use_color)),
        );

        for update in self.updates.iter().filter(|update| update.changed) {
            push_body_line(&mut lines, format!("• {}", update.field));
            match update.inline_diff(use_color) {
                Some(diff_lines) => {
                    for diff in diff_lines {
                        push_body_line(&mut lines, format!("  {}", diff));
                    }
                }
                None => {
                    push_body_line(
                        &mut lines,
                        format!("  - {}", preview_value(&update.before, use_color)),
                    );
                    push_body_line(
                        &mut lines,
                        format!("  + {}", preview_value(&update.after, use_color)),
                    );
                }
            }
        }

        lines.push("└─".to_string());
        lines.join("\n")
    }
}

impl FieldUpdate {
    pub fn new(field: impl Into<String>, before: String, after: String) -> Self {
        let changed = before != after;
        Self {
            field: field.into(),
            before,
            after,
            changed,
        }
    }

    fn inline_diff(&self, use_color: bool) -> Option<Vec<String>> {
        if self.before.is_empty() || self.before.len() + self.after.len() > MAX_DIFF_CHARS {
            return None;
        }

        let diff = TextDiff::from_words(&self.before, &self.after);
        let mut removed = String::new();
        let mut added = String::new();

        for change in diff.iter_all_changes() {
            let escaped = escape_fragment(change.value());
            match change.tag() {
                ChangeTag::Delete => removed.push_str(&stylize(escaped, use_color, DiffStyle::Delete)),
                ChangeTag::Insert => added.push_str(&stylize(escaped, use_color, DiffStyle::Insert)),
                ChangeTag::Equal => {
                    removed.push_str(&stylize(escaped.clone(), use_color, DiffStyle::Context));
                    added.push_str(&stylize(escaped, use_color, DiffStyle::Context));
                }
            }
        }

        Some(vec![format!("- {}", removed), format!("+ {}", added)])
    }
}

#[derive(Debug, Clone, Copy)]
enum DiffStyle {
    Delete,
    Insert,
    Context,
}

fn stylize(fragment: String, use_color: bool, style: DiffStyle) -> String {
    if !use_color {
        return fragment;
    }

    match style {
        DiffStyle::Delete => fragment.red().to_string(),
        DiffStyle::Insert => fragment.green().to_string(),
        DiffStyle::Context => fragment.dimmed().to_string(),
    }
}

fn escape_fragment(value: &str) -> String {
    let mut rendered = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => rendered.push('⏎'),
            '\t' => rendered.push('⇥'),
            '\r' => rendered.push('␍'),
            c if c.is_control() => rendered.push_str(&format!("\\u{{{:04X}}}", c as u32)),
            c => rendered.push(c),
        }
    }
    rendered
}

fn push_body_line(lines: &mut Vec<String>, content: String) {
    lines.push(format!("│ {}", content));
}

/// Truncates `value` to a single-line preview.
pub fn preview(value: &str, limit: usize) -> String {
    let mut preview: String = value.chars().take(limit).collect();
    if value.chars().count() > limit {
        preview.push_str("...");
    }
    escape_fragment(&preview)
}

fn preview_value(value: &str, use_color: bool) -> String {
    let escaped = preview(value, PREVIEW_CHAR_LIMIT);
    if use_color {
        escaped.cyan().to_string()
    } else {
        escaped
    }
}

#[derive(Debug, Default)]
struct ExtractionEventVisitor {
    record_json: Option<String>,
}

impl tracing::field::Visit for ExtractionEventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "record_json" {
            self.record_json = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "record_json" && self.record_json.is_none() {
            self.record_json = Some(format!("{value:?}"));
        }
    }
}

/// Compact single-line formatter; extraction events get a rendered diff box.
#[derive(Debug, Default)]
pub struct EngineFormatter;

impl EngineFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl<S, N> FormatEvent<S, N> for EngineFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let use_color = writer.has_ansi_escapes();

        write_prefix(&mut writer, metadata, use_color)?;
        ctx.format_fields(writer.by_ref(), event)?;
        writer.write_char('\n')?;

        if metadata.target() == EXTRACTION_TARGET {
            let mut visitor = ExtractionEventVisitor::default();
            event.record(&mut visitor);
            if let Some(json) = visitor.record_json {
                match serde_json::from_str::<ExtractionRecord>(&json) {
                    Ok(record) => {
                        writer.write_str(&record.render_pretty(use_color))?;
                        writer.write_char('\n')?;
                    }
                    Err(err) => {
                        writer.write_str("│ Failed to render field extraction: ")?;
                        writer.write_str(&err.to_string())?;
                        writer.write_char('\n')?;
                    }
                }
            }
        }

        Ok(())
    }
}

pub fn record_extraction(record: ExtractionRecord) {
    if !tracing::level_enabled!(Level::DEBUG) {
        return;
    }
    match serde_json::to_string(&record) {
        Ok(json) => tracing::event!(
            target: EXTRACTION_TARGET,
            Level::DEBUG,
            record_json = json.as_str(),
            fields = record.updates.len(),
            changed = record.changed_fields(),
            "bulk paste extraction"
        ),
        Err(_) => tracing::event!(
            target: EXTRACTION_TARGET,
            Level::DEBUG,
            "bulk paste extraction (serialization failure)"
        ),
    }
}

fn write_prefix(
    writer: &mut Writer<'_>,
    metadata: &tracing::Metadata<'_>,
    use_color: bool,
) -> fmt::Result {
    let timestamp = format_timestamp();
    if use_color {
        writer.write_str(&timestamp.as_str().dimmed().to_string())?;
    } else {
        writer.write_str(&timestamp)?;
    }

    let level = format!("{:>5}", metadata.level());
    if !level.starts_with(' ') {
        writer.write_char(' ')?;
    }
    if use_color {
        writer.write_str(&color_level(&level, *metadata.level()))?;
    } else {
        writer.write_str(&level)?;
    }
    writer.write_char(' ')?;

    let target = format!("{:<width$}", metadata.target(), width = TARGET_GUTTER_WIDTH);
    if use_color {
        writer.write_str(&target.blue().dimmed().to_string())?;
    } else {
        writer.write_str(&target)?;
    }
    writer.write_str(": ")
}

fn color_level(text: &str, level: Level) -> String {
    match level {
        Level::ERROR => text.red().bold().to_string(),
        Level::WARN => text.yellow().bold().to_string(),
        Level::INFO => text.green().to_string(),
        Level::DEBUG => text.cyan().to_string(),
        Level::TRACE => text.dimmed().to_string(),
    }
}

fn format_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "0000-00-00 00:00:00".to_string())
}
