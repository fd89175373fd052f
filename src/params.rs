use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which prompt template and validation rule a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScriptType {
    #[default]
    Full,
    Short,
    ResearchGuide,
}

impl ScriptType {
    pub fn label(self) -> &'static str {
        match self {
            ScriptType::Full => "Full Script",
            ScriptType::Short => "Short Script",
            ScriptType::ResearchGuide => "Research Guide",
        }
    }

    pub fn is_script(self) -> bool {
        !matches!(self, ScriptType::ResearchGuide)
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ScriptType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "full" => Ok(ScriptType::Full),
            "short" => Ok(ScriptType::Short),
            "research" | "research-guide" | "guide" => Ok(ScriptType::ResearchGuide),
            other => Err(format!(
                "unknown script type '{other}' (expected full, short or research-guide)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a title is required to generate a research guide")]
    MissingTitle,
    #[error("research material is required to generate a script")]
    MissingResearchMaterial,
}

/// The live set of creative parameters a request is built from.
///
/// Serialized with the same field names the stored history has always used,
/// so existing history snapshots keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParams {
    #[serde(rename = "type", default)]
    pub script_type: ScriptType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub angle: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub research_material: String,
}

impl ScriptParams {
    pub fn new(script_type: ScriptType) -> Self {
        Self {
            script_type,
            ..Self::default()
        }
    }

    /// Checks the type-dependent precondition for invoking the generator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.script_type {
            ScriptType::ResearchGuide if self.title.is_empty() => {
                Err(ValidationError::MissingTitle)
            }
            ScriptType::Full | ScriptType::Short if self.research_material.trim().is_empty() => {
                Err(ValidationError::MissingResearchMaterial)
            }
            _ => Ok(()),
        }
    }

    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled Project"
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_guide_requires_title() {
        let mut params = ScriptParams::new(ScriptType::ResearchGuide);
        params.research_material = "plenty of notes".into();
        assert!(!params.can_submit());
        assert_eq!(params.validate(), Err(ValidationError::MissingTitle));

        params.title = "Silence".into();
        assert!(params.can_submit());
    }

    #[test]
    fn scripts_require_non_blank_research_material() {
        for script_type in [ScriptType::Full, ScriptType::Short] {
            let mut params = ScriptParams::new(script_type);
            params.title = "Silence".into();
            assert!(!params.can_submit());

            params.research_material = " \n\t ".into();
            assert_eq!(
                params.validate(),
                Err(ValidationError::MissingResearchMaterial)
            );

            params.research_material = "Notes".into();
            assert!(params.can_submit());
        }
    }

    #[test]
    fn any_non_empty_title_counts_as_present() {
        let mut params = ScriptParams::new(ScriptType::ResearchGuide);
        params.title = "   ".into();
        assert!(params.can_submit());
        assert_eq!(params.display_title(), "   ");

        params.title.clear();
        assert_eq!(params.validate(), Err(ValidationError::MissingTitle));
        assert_eq!(params.display_title(), "Untitled Project");
    }

    #[test]
    fn serializes_with_stored_history_field_names() {
        let mut params = ScriptParams::new(ScriptType::ResearchGuide);
        params.research_material = "x".into();
        let value = serde_json::to_value(&params).expect("serialize");
        assert_eq!(value["type"], "RESEARCH_GUIDE");
        assert_eq!(value["researchMaterial"], "x");
    }

    #[test]
    fn parses_script_type_names() {
        assert_eq!("FULL".parse::<ScriptType>(), Ok(ScriptType::Full));
        assert_eq!("short".parse::<ScriptType>(), Ok(ScriptType::Short));
        assert_eq!(
            "research_guide".parse::<ScriptType>(),
            Ok(ScriptType::ResearchGuide)
        );
        assert!("epic".parse::<ScriptType>().is_err());
    }
}
