//! Splits a pasted block of labelled text into script parameters.
//!
//! A paste counts as "bulk" when it carries a `Hook:` label and an `Angle:`
//! (or `Reframe:`) label. Anything else is taken verbatim as the title. This
//! is a best-effort heuristic, not a grammar: repeated or nested labels are
//! resolved by taking the first occurrence of each field and cutting its
//! value at whichever label comes next.

use crate::logging::{record_extraction, ExtractionRecord, FieldUpdate};
use crate::params::ScriptParams;
use regex::Regex;
use std::sync::LazyLock;

static LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(topic|title|hook|angle|reframe|keywords)\s*:")
        .expect("valid field label regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Hook,
    Angle,
    Keywords,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Hook => "hook",
            Field::Angle => "angle",
            Field::Keywords => "keywords",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "topic" | "title" => Some(Field::Title),
            "hook" => Some(Field::Hook),
            "angle" | "reframe" => Some(Field::Angle),
            "keywords" => Some(Field::Keywords),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Label {
    field: Field,
    start: usize,
    value_start: usize,
}

/// Fields recovered from one paste. `None` means "leave the parameter alone".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub hook: Option<String>,
    pub angle: Option<String>,
    pub keywords: Option<String>,
}

impl ExtractedFields {
    /// Applies every extracted field to `params` in a single update and
    /// returns the previous values.
    pub fn apply_to(self, params: &mut ScriptParams) -> ScriptParams {
        let before = params.clone();
        let mut next = params.clone();

        if let Some(title) = self.title {
            next.title = title;
        }
        if let Some(hook) = self.hook {
            next.hook = hook;
        }
        if let Some(angle) = self.angle {
            next.angle = angle;
        }
        if let Some(keywords) = self.keywords {
            next.keywords = keywords;
        }

        *params = next;
        before
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.hook.is_none() && self.angle.is_none() && self.keywords.is_none()
    }
}

fn labels(input: &str) -> Vec<Label> {
    LABEL_REGEX
        .captures_iter(input)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let field = Field::from_label(caps.get(1)?.as_str())?;
            Some(Label {
                field,
                start: whole.start(),
                value_start: whole.end(),
            })
        })
        .collect()
}

/// True when `input` looks like a labelled multi-field paste.
pub fn is_bulk_paste(input: &str) -> bool {
    let found = labels(input);
    let has = |field: Field| found.iter().any(|label| label.field == field);
    has(Field::Hook) && has(Field::Angle)
}

/// Extracts the labelled fields from `input`.
///
/// Non-bulk input is returned untouched as the title.
pub fn extract_fields(input: &str) -> ExtractedFields {
    let found = labels(input);
    let has = |field: Field| found.iter().any(|label| label.field == field);

    if !(has(Field::Hook) && has(Field::Angle)) {
        return ExtractedFields {
            title: Some(input.to_string()),
            ..ExtractedFields::default()
        };
    }

    let value_of = |field: Field| -> Option<String> {
        let (idx, label) = found
            .iter()
            .enumerate()
            .find(|(_, label)| label.field == field)?;
        let end = found
            .get(idx + 1)
            .map(|next| next.start)
            .unwrap_or(input.len());
        let value = input[label.value_start..end].trim();
        (!value.is_empty()).then(|| value.to_string())
    };

    ExtractedFields {
        // A bulk paste without a usable topic keeps the whole block as the title.
        title: Some(value_of(Field::Title).unwrap_or_else(|| input.to_string())),
        hook: value_of(Field::Hook),
        angle: value_of(Field::Angle),
        keywords: value_of(Field::Keywords),
    }
}

/// Handles text entered into the title field: bulk pastes fan out into every
/// labelled field, plain text only sets the title.
pub fn apply_title_input(params: &mut ScriptParams, input: &str) -> ExtractedFields {
    let fields = extract_fields(input);
    let before = fields.clone().apply_to(params);
    log_field_updates(input, &before, params);
    fields
}

fn log_field_updates(input: &str, before: &ScriptParams, after: &ScriptParams) {
    if !tracing::level_enabled!(tracing::Level::DEBUG) {
        return;
    }

    let updates = [
        (Field::Title, &before.title, &after.title),
        (Field::Hook, &before.hook, &after.hook),
        (Field::Angle, &before.angle, &after.angle),
        (Field::Keywords, &before.keywords, &after.keywords),
    ]
    .into_iter()
    .map(|(field, old, new)| FieldUpdate::new(field.name(), old.clone(), new.clone()))
    .collect::<Vec<_>>();

    record_extraction(ExtractionRecord::new(input.to_string(), updates));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ScriptType;

    #[test]
    fn splits_labelled_paste_into_fields() {
        let input = "Topic: Silence\nHook: It's not absence\nAngle: Reframe as processing";
        let fields = extract_fields(input);
        assert_eq!(fields.title.as_deref(), Some("Silence"));
        assert_eq!(fields.hook.as_deref(), Some("It's not absence"));
        assert_eq!(fields.angle.as_deref(), Some("Reframe as processing"));
        assert_eq!(fields.keywords, None);
    }

    #[test]
    fn labels_are_case_insensitive_and_order_free() {
        let input = "KEYWORDS: latency, load\nreframe: friction as signal\nhook: you pause\ntitle: Delay";
        let fields = extract_fields(input);
        assert_eq!(fields.title.as_deref(), Some("Delay"));
        assert_eq!(fields.hook.as_deref(), Some("you pause"));
        assert_eq!(fields.angle.as_deref(), Some("friction as signal"));
        assert_eq!(fields.keywords.as_deref(), Some("latency, load"));
    }

    #[test]
    fn multi_line_values_read_until_next_label() {
        let input = "Hook: line one\nline two\n\nAngle: tail\nthat runs\nto the end  ";
        let fields = extract_fields(input);
        assert_eq!(fields.hook.as_deref(), Some("line one\nline two"));
        assert_eq!(fields.angle.as_deref(), Some("tail\nthat runs\nto the end"));
    }

    #[test]
    fn missing_topic_keeps_whole_input_as_title() {
        let input = "Hook: a\nAngle: b";
        let fields = extract_fields(input);
        assert_eq!(fields.title.as_deref(), Some(input));
        assert_eq!(fields.hook.as_deref(), Some("a"));
    }

    #[test]
    fn non_bulk_input_is_identity_onto_title() {
        for input in ["Just a title", "Hook: only a hook", "Angle: only an angle", "", "  padded  "] {
            let fields = extract_fields(input);
            assert_eq!(fields.title.as_deref(), Some(input));
            assert_eq!(fields.hook, None);
            assert_eq!(fields.angle, None);
            assert_eq!(fields.keywords, None);
            assert!(!is_bulk_paste(input));
        }
    }

    #[test]
    fn empty_values_leave_params_untouched() {
        let mut params = ScriptParams::new(ScriptType::ResearchGuide);
        params.hook = "existing hook".into();
        params.keywords = "existing keywords".into();

        apply_title_input(&mut params, "Topic: New\nHook:\nAngle: fresh angle\nKeywords:   ");

        assert_eq!(params.title, "New");
        assert_eq!(params.hook, "existing hook");
        assert_eq!(params.angle, "fresh angle");
        assert_eq!(params.keywords, "existing keywords");
        assert_eq!(params.script_type, ScriptType::ResearchGuide);
    }

    #[test]
    fn topic_text_never_leaks_into_other_fields() {
        let input = "Hook: first\nTopic: The Topic\nAngle: second";
        let fields = extract_fields(input);
        assert_eq!(fields.title.as_deref(), Some("The Topic"));
        assert_eq!(fields.hook.as_deref(), Some("first"));
        assert_eq!(fields.angle.as_deref(), Some("second"));
    }

    #[test]
    fn label_words_inside_other_words_are_ignored() {
        let input = "Hook: triangle: shapes\nAngle: b";
        let fields = extract_fields(input);
        assert_eq!(fields.hook.as_deref(), Some("triangle: shapes"));
    }
}
