use crate::params::{ScriptParams, ScriptType};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../assets/system_prompt.md");

pub const RESEARCH_GUIDE_TAG: &str = "GENERATE RESEARCH GUIDE";
pub const SCRIPT_TAG: &str = "GENERATE SCRIPT";
pub const SHORT_SCRIPT_TAG: &str = "GENERATE SHORT SCRIPT (60 Seconds Strict)";

/// Picks the system instruction: a custom document when one is configured,
/// the embedded default otherwise.
pub struct PromptBlueprint<'a> {
    custom: Option<&'a str>,
    fallback: &'a str,
}

impl<'a> PromptBlueprint<'a> {
    pub fn new(custom: Option<&'a str>, fallback: &'a str) -> Self {
        Self { custom, fallback }
    }

    pub fn resolve(self) -> String {
        self.custom
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(self.fallback)
            .to_owned()
    }
}

/// Loads the system instruction, reading `path` when it is set.
pub fn load_system_instruction(path: Option<&Path>) -> Result<String> {
    let custom = match path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt at {:?}", path))?,
        ),
        None => None,
    };

    Ok(PromptBlueprint::new(custom.as_deref(), DEFAULT_SYSTEM_PROMPT).resolve())
}

/// Builds the user message for `params`.
///
/// Research guides carry the topic fields verbatim. Scripts carry the
/// research material, plus the topic fields as an optional override block
/// when the title is non-empty.
pub fn build_user_prompt(params: &ScriptParams) -> String {
    match params.script_type {
        ScriptType::ResearchGuide => format!(
            "{RESEARCH_GUIDE_TAG}\n\n\
             Topic Details:\n\
             TITLE: {title}\n\
             CORE THEME: {title}\n\
             HOOK: {hook}\n\
             ANGLE: {angle}\n\
             KEYWORDS: {keywords}\n",
            title = params.title,
            hook = params.hook,
            angle = params.angle,
            keywords = params.keywords,
        ),
        ScriptType::Full | ScriptType::Short => {
            let tag = if params.script_type == ScriptType::Short {
                SHORT_SCRIPT_TAG
            } else {
                SCRIPT_TAG
            };

            let mut prompt = format!(
                "{tag}\n\n[RESEARCH MATERIAL / FILTERED NOTES]\n{}\n",
                params.research_material
            );

            if !params.title.is_empty() {
                prompt.push_str(&format!(
                    "\n[CONTEXT & METADATA (Optional Override)]\n\
                     Title: {title}\n\
                     Core Theme: {title}\n\
                     Hook: {hook}\n\
                     Angle: {angle}\n\
                     Keywords: {keywords}\n",
                    title = params.title,
                    hook = params.hook,
                    angle = params.angle,
                    keywords = params.keywords,
                ));
            }

            prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn topic(script_type: ScriptType) -> ScriptParams {
        ScriptParams {
            script_type,
            title: "Silence".into(),
            hook: "It's not absence".into(),
            angle: "Reframe as processing".into(),
            keywords: "latency, load".into(),
            research_material: "Notes about default mode network.".into(),
        }
    }

    #[test]
    fn research_guide_duplicates_title_into_core_theme() {
        let prompt = build_user_prompt(&topic(ScriptType::ResearchGuide));
        assert!(prompt.starts_with(RESEARCH_GUIDE_TAG));
        assert!(prompt.contains("TITLE: Silence\n"));
        assert!(prompt.contains("CORE THEME: Silence\n"));
        assert!(prompt.contains("HOOK: It's not absence\n"));
        assert!(prompt.contains("ANGLE: Reframe as processing\n"));
        assert!(prompt.contains("KEYWORDS: latency, load\n"));
        assert!(!prompt.contains("RESEARCH MATERIAL"));
    }

    #[test]
    fn script_tags_differ_between_full_and_short() {
        let full = build_user_prompt(&topic(ScriptType::Full));
        let short = build_user_prompt(&topic(ScriptType::Short));
        assert!(full.starts_with(SCRIPT_TAG));
        assert!(!full.contains(SHORT_SCRIPT_TAG));
        assert!(short.starts_with(SHORT_SCRIPT_TAG));
        for prompt in [&full, &short] {
            assert!(prompt.contains("Notes about default mode network."));
            assert!(prompt.contains("[CONTEXT & METADATA (Optional Override)]"));
            assert!(prompt.contains("Core Theme: Silence"));
        }
    }

    #[test]
    fn script_without_title_omits_context_block() {
        let mut params = topic(ScriptType::Full);
        params.title.clear();
        let prompt = build_user_prompt(&params);
        assert!(!prompt.contains("CONTEXT & METADATA"));
        assert!(!prompt.contains("It's not absence"));
    }

    #[test]
    fn whitespace_title_still_adds_context_block() {
        let mut params = topic(ScriptType::Short);
        params.title = " ".into();
        let prompt = build_user_prompt(&params);
        assert!(prompt.contains("[CONTEXT & METADATA (Optional Override)]"));
    }

    #[test]
    fn blueprint_prefers_non_blank_custom_prompt() {
        assert_eq!(PromptBlueprint::new(Some("custom"), "fallback").resolve(), "custom");
        assert_eq!(PromptBlueprint::new(Some("  "), "fallback").resolve(), "fallback");
        assert_eq!(PromptBlueprint::new(None, "fallback").resolve(), "fallback");
    }

    #[test]
    fn loads_system_instruction_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "Only write haiku.").expect("write prompt");

        let loaded = load_system_instruction(Some(file.path())).expect("load prompt");
        assert_eq!(loaded, "Only write haiku.");

        let default = load_system_instruction(None).expect("default prompt");
        assert!(default.contains(RESEARCH_GUIDE_TAG));
        assert!(default.contains(SCRIPT_TAG));
    }

    #[test]
    fn missing_system_prompt_file_is_an_error() {
        let err = load_system_instruction(Some(Path::new("/nonexistent/prompt.md"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read system prompt"));
    }
}
