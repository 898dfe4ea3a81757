//! Ruleset configuration and rule conversion
//!
//! The gate reads the list of ruleset names from a `pushgate.yml` file
//! at the repository root, fetches their rule definitions from the
//! service API, and converts them into the wire form the analyzer
//! endpoint expects.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Name of the ruleset config file expected at the repository root.
pub const RULESET_FILE: &str = "pushgate.yml";

#[derive(Debug, Default, Deserialize)]
struct RulesetConfig {
    #[serde(default)]
    rulesets: Vec<String>,
}

/// Ruleset names from the config file.
///
/// Unparseable YAML or a missing `rulesets` key yields an empty list;
/// the presence of the file itself is checked by the gate controller.
pub fn rulesets_from_config(path: &Path) -> Vec<String> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("cannot read ruleset file {}: {e}", path.display());
            return Vec::new();
        }
    };
    match serde_yaml::from_str::<RulesetConfig>(&text) {
        Ok(config) => config.rulesets,
        Err(e) => {
            warn!("invalid ruleset file {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// A ruleset as returned by the service API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRuleset {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RemoteRule>,
}

/// A rule definition as returned by the service API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRule {
    pub name: String,
    /// Base64-encoded rule body
    pub content: String,
    pub rule_type: String,
    pub language: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub element_checked: Option<String>,
}

/// A rule in the form the analyzer endpoint accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerRule {
    pub id: String,
    pub content_base64: String,
    pub language: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub entity_checked: Option<String>,
    pub pattern: Option<String>,
}

/// AST element names to the entity tags the analyzer checks.
const ELEMENT_TO_ENTITY: &[(&str, &str)] = &[
    ("FunctionCall", "functioncall"),
    ("IfCondition", "ifcondition"),
    ("Import", "import"),
    ("Assignment", "assign"),
    ("ForLoop", "forloop"),
    ("FunctionDefinition", "functiondefinition"),
    ("TryBlock", "tryblock"),
];

fn entity_for_element(element: &str) -> Option<&'static str> {
    ELEMENT_TO_ENTITY
        .iter()
        .find(|(name, _)| *name == element)
        .map(|(_, entity)| *entity)
}

/// Convert fetched rulesets into analyzer wire rules.
///
/// Rule ids are namespaced as `ruleset/rule`. AST rules whose element
/// kind has no analyzer entity are skipped.
pub fn to_analyzer_rules(rulesets: Vec<RemoteRuleset>) -> Vec<AnalyzerRule> {
    let mut rules = Vec::new();
    for ruleset in rulesets {
        for rule in ruleset.rules {
            let rule_type = rule.rule_type.to_lowercase();
            let entity_checked = if rule_type == "ast" {
                match rule.element_checked.as_deref().and_then(entity_for_element) {
                    Some(entity) => Some(entity.to_string()),
                    None => {
                        debug!(
                            "skipping AST rule {}/{} with unsupported element {:?}",
                            ruleset.name, rule.name, rule.element_checked
                        );
                        continue;
                    }
                }
            } else {
                None
            };
            rules.push(AnalyzerRule {
                id: format!("{}/{}", ruleset.name, rule.name),
                content_base64: rule.content,
                language: rule.language.to_lowercase(),
                rule_type,
                entity_checked,
                pattern: rule.pattern,
            });
        }
    }
    rules
}
