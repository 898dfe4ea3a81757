//! HTTP client for the hosted analysis service
//!
//! Two endpoints: a GraphQL API for fetching rule definitions and a
//! per-file analysis endpoint. Uses ureq (sync HTTP, no async runtime
//! needed). Requests are authenticated with an API token read once from
//! the environment at startup.
//!
//! Analysis requests are deliberately fail-open: a transport error,
//! timeout, or malformed payload for a single file is logged and turned
//! into zero violations so one unreachable file cannot abort the whole
//! push check. Ruleset fetching, by contrast, is a setup step and
//! propagates its errors.

use std::env;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::lang::Language;
use crate::models::Violation;
use crate::ruleset::{AnalyzerRule, RemoteRuleset};

/// Environment variable holding the API token.
pub const API_TOKEN_ENV: &str = "PUSHGATE_API_TOKEN";

const DEFAULT_ANALYSIS_URL: &str = "https://analysis.pushgate.io/analyze";
const DEFAULT_GRAPHQL_URL: &str = "https://api.pushgate.io/graphql";

/// Per-request timeout; exceeding it counts as zero violations.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire-level retry budget for provider-side (5xx) failures.
const MAX_ATTEMPTS: u32 = 3;

const RULESETS_QUERY: &str = "\
query RulesetsForClient($names: [String!]!) {
  ruleSetsForClient(names: $names) {
    name
    rules { name content ruleType language pattern elementChecked }
  }
}";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{API_TOKEN_ENV} environment variable not defined")]
    MissingToken,
    #[error("filename and content must be non-empty")]
    InvalidArgument,
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse API response: {0}")]
    Parse(String),
}

/// Seam between the gate and the hosted service, so orchestration and
/// gate logic can be exercised against a stub.
pub trait AnalysisService: Send + Sync {
    /// Fetch and install the rules for the named rulesets. Returns the
    /// number of rules loaded.
    fn load_rulesets(&self, names: &[String]) -> Result<usize, ClientError>;

    /// Analyze one file's content, returning the violations found.
    fn analyze(
        &self,
        path: &str,
        language: Language,
        content: &str,
    ) -> Result<Vec<Violation>, ClientError>;
}

/// Service client backed by sync HTTP via ureq.
pub struct AnalyzerClient {
    agent: ureq::Agent,
    api_token: String,
    analysis_url: String,
    graphql_url: String,
    // Rules are fetched once at setup and read-only afterwards.
    rules: OnceLock<Vec<AnalyzerRule>>,
}

fn make_agent() -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false) // We handle status codes ourselves
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build()
        .new_agent()
}

impl AnalyzerClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            agent: make_agent(),
            api_token: api_token.into(),
            analysis_url: env::var("PUSHGATE_ANALYSIS_URL")
                .unwrap_or_else(|_| DEFAULT_ANALYSIS_URL.to_string()),
            graphql_url: env::var("PUSHGATE_API_URL")
                .unwrap_or_else(|_| DEFAULT_GRAPHQL_URL.to_string()),
            rules: OnceLock::new(),
        }
    }

    /// Read the API token from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_token = env::var(API_TOKEN_ENV).map_err(|_| ClientError::MissingToken)?;
        if api_token.is_empty() {
            return Err(ClientError::MissingToken);
        }
        Ok(Self::new(api_token))
    }

    fn rules(&self) -> &[AnalyzerRule] {
        self.rules.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// POST a JSON body, retrying provider-side failures with
    /// randomized backoff.
    fn post_json(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .agent
                .post(url)
                .header("Content-Type", "application/json")
                .header("X-Api-Token", &self.api_token)
                .send_json(body);
            match result {
                Ok(response) if response.status().as_u16() >= 500 && attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_millis(
                        250 * u64::from(attempt) + rand::rng().random_range(0..250),
                    );
                    warn!(
                        "server error {} from {url}, retrying in {backoff:?} (attempt {attempt}/{MAX_ATTEMPTS})",
                        response.status()
                    );
                    std::thread::sleep(backoff);
                }
                other => return other,
            }
        }
    }

    fn fetch_rulesets(&self, names: &[String]) -> Result<Vec<RemoteRuleset>, ClientError> {
        let body = serde_json::json!({
            "query": RULESETS_QUERY,
            "variables": { "names": names },
        });
        let response = self
            .post_json(&self.graphql_url, &body)
            .map_err(|e| ClientError::Api {
                status: 0,
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.into_body().read_to_string().unwrap_or_default();
            return Err(ClientError::Api { status, message });
        }
        let parsed: RulesetsResponse = response
            .into_body()
            .read_json()
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(parsed
            .data
            .map(|d| d.rule_sets_for_client)
            .unwrap_or_default())
    }
}

impl AnalysisService for AnalyzerClient {
    fn load_rulesets(&self, names: &[String]) -> Result<usize, ClientError> {
        let rules = if names.is_empty() {
            Vec::new()
        } else {
            crate::ruleset::to_analyzer_rules(self.fetch_rulesets(names)?)
        };
        let count = rules.len();
        let _ = self.rules.set(rules);
        debug!("loaded {count} rules from {} rulesets", names.len());
        Ok(count)
    }

    fn analyze(
        &self,
        path: &str,
        language: Language,
        content: &str,
    ) -> Result<Vec<Violation>, ClientError> {
        if path.is_empty() || content.is_empty() {
            return Err(ClientError::InvalidArgument);
        }
        let filename = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path);
        let request = AnalysisRequest {
            filename,
            language: language.as_str().to_lowercase(),
            file_encoding: "utf-8",
            code_base64: BASE64.encode(content.as_bytes()),
            rules: self.rules(),
            log_output: false,
        };

        // Fail-open from here down: the gate favors letting a push
        // through over blocking on one file's infrastructure flakiness.
        let response = match self.post_json(&self.analysis_url, &request) {
            Ok(response) => response,
            Err(e) => {
                warn!("analysis request for {path} failed, treating as no violations: {e}");
                return Ok(Vec::new());
            }
        };
        let status = response.status().as_u16();
        if status >= 400 {
            warn!("analysis of {path} returned status {status}, treating as no violations");
            return Ok(Vec::new());
        }
        let parsed: AnalysisResponse = match response.into_body().read_json() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("malformed analysis response for {path}, treating as no violations: {e}");
                return Ok(Vec::new());
            }
        };
        Ok(violations_from_response(parsed, language))
    }
}

// Analysis endpoint types
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisRequest<'a> {
    filename: &'a str,
    language: String,
    file_encoding: &'static str,
    code_base64: String,
    rules: &'a [AnalyzerRule],
    log_output: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    #[serde(default)]
    rule_responses: Vec<RuleResponse>,
}

#[derive(Debug, Deserialize)]
struct RuleResponse {
    identifier: String,
    #[serde(default)]
    violations: Vec<WireViolation>,
}

#[derive(Debug, Deserialize)]
struct WireViolation {
    start: WirePosition,
    #[serde(default)]
    end: Option<WirePosition>,
    message: String,
    #[serde(default = "least_severe")]
    severity: u32,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    line: u32,
}

fn least_severe() -> u32 {
    4
}

/// Name reported in the `tool` field of violations this client builds.
const TOOL_NAME: &str = "pushgate-analyzer";

/// Map a terminal analysis response into violations, filling `language`
/// and `tool` from the request context even when the payload omits them.
fn violations_from_response(response: AnalysisResponse, language: Language) -> Vec<Violation> {
    let mut violations = Vec::new();
    for rule_response in response.rule_responses {
        for wire in rule_response.violations {
            violations.push(Violation {
                rule: rule_response.identifier.clone(),
                line: wire.start.line,
                line_count: wire
                    .end
                    .map(|end| end.line.saturating_sub(wire.start.line) + 1),
                description: wire.message,
                severity: wire.severity,
                category: wire.category,
                tool: TOOL_NAME.to_string(),
                rule_url: None,
                language: language.as_str().to_string(),
            });
        }
    }
    violations
}

#[derive(Deserialize)]
struct RulesetsResponse {
    data: Option<RulesetsData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RulesetsData {
    #[serde(default)]
    rule_sets_for_client: Vec<RemoteRuleset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_or_content_is_a_local_precondition() {
        let client = AnalyzerClient::new("token");
        let err = client.analyze("", Language::Python, "x = 1").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument));
        let err = client.analyze("a.py", Language::Python, "").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument));
    }

    #[test]
    fn response_mapping_fills_context_fields() {
        let json = r#"{
            "ruleResponses": [
                {
                    "identifier": "python-security/no-eval",
                    "violations": [
                        {"start": {"line": 10}, "end": {"line": 11}, "message": "eval is unsafe", "severity": 1, "category": "Security"},
                        {"start": {"line": 3}, "message": "minor"}
                    ]
                }
            ]
        }"#;
        let response: AnalysisResponse = serde_json::from_str(json).unwrap();
        let violations = violations_from_response(response, Language::Python);
        assert_eq!(violations.len(), 2);

        assert_eq!(violations[0].rule, "python-security/no-eval");
        assert_eq!(violations[0].line, 10);
        assert_eq!(violations[0].line_count, Some(2));
        assert_eq!(violations[0].severity, 1);
        assert_eq!(violations[0].category, "Security");
        assert_eq!(violations[0].language, "Python");
        assert_eq!(violations[0].tool, TOOL_NAME);

        // Omitted fields fall back without losing request context.
        assert_eq!(violations[1].line, 3);
        assert_eq!(violations[1].line_count, None);
        assert_eq!(violations[1].severity, 4);
        assert_eq!(violations[1].language, "Python");
    }

    #[test]
    fn empty_response_yields_no_violations() {
        let response: AnalysisResponse = serde_json::from_str("{}").unwrap();
        assert!(violations_from_response(response, Language::Go).is_empty());
    }

    #[test]
    fn ruleset_response_parses() {
        let json = r#"{
            "data": {
                "ruleSetsForClient": [
                    {
                        "name": "python-security",
                        "rules": [
                            {"name": "no-eval", "content": "cg==", "ruleType": "Ast",
                             "language": "Python", "pattern": null, "elementChecked": "FunctionCall"}
                        ]
                    }
                ]
            }
        }"#;
        let parsed: RulesetsResponse = serde_json::from_str(json).unwrap();
        let rulesets = parsed.data.unwrap().rule_sets_for_client;
        assert_eq!(rulesets.len(), 1);
        assert_eq!(rulesets[0].rules[0].element_checked.as_deref(), Some("FunctionCall"));
    }
}
