//! Oracle session: asks a chat-completions model to translate `IPageOrder`
//! logic into hidden expressions.
//!
//! One request per repository carries the system message, the source of
//! every legacy file, and a closing instruction. The model answers with
//! `updatePageHidden` tool calls, which are decoded, validated and turned
//! into a [`MigrationPlan`].

mod prompt;
mod types;

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

pub use prompt::build_messages;
pub use types::*;

use crate::config::OracleConfig;
use crate::error::{MigrationError, Result};
use crate::expression;
use crate::models::TransformationInstruction;
use crate::scanner::ScanReport;

/// Sampling temperature for every request.
pub const TEMPERATURE: f32 = 0.3;

/// Something that can infer page instructions from a scan.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Raw, unvalidated instructions. May be empty.
    async fn infer(&self, report: &ScanReport) -> Result<Vec<TransformationInstruction>>;
}

/// A validated page change, ready to be merged into a layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChange {
    pub page: String,
    pub hidden: Value,
}

/// The oracle's answer for one repository, validated and non-empty.
///
/// Only [`consult`] constructs a plan, so a plan always comes from a scan
/// that found legacy files.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    changes: Vec<PageChange>,
    legacy_files: Vec<PathBuf>,
}

impl MigrationPlan {
    pub fn changes(&self) -> &[PageChange] {
        &self.changes
    }

    /// Legacy files (relative to the workspace) made obsolete by the plan.
    pub fn legacy_files(&self) -> &[PathBuf] {
        &self.legacy_files
    }
}

/// Ask `oracle` about `report` and validate the answer.
///
/// An empty answer for a non-empty scan is an error: every real rule in a
/// legacy file should produce at least one page. So is a page named twice,
/// as applying both would keep only the last expression.
pub async fn consult<O>(oracle: &O, report: ScanReport) -> Result<MigrationPlan>
where
    O: Oracle + ?Sized,
{
    if report.is_empty() {
        return Err(MigrationError::Oracle(
            "no legacy files to translate".to_string(),
        ));
    }

    let instructions = oracle.infer(&report).await?;
    if instructions.is_empty() {
        return Err(MigrationError::OracleEmpty(report.legacy_files.len()));
    }

    let mut changes = Vec::with_capacity(instructions.len());
    let mut pages = HashSet::new();
    for instruction in instructions {
        let change = validate_instruction(instruction)?;
        if !pages.insert(change.page.clone()) {
            return Err(MigrationError::InvalidInstruction {
                page: change.page,
                reason: "more than one expression for the same page".to_string(),
            });
        }
        if !report.vocabulary.is_empty() {
            for path in expression::data_model_paths(&change.hidden) {
                if !report.vocabulary.contains(&path) {
                    tracing::warn!(page = %change.page, path = %path, "Expression references a path outside the data model");
                }
            }
        }
        changes.push(change);
    }

    Ok(MigrationPlan {
        changes,
        legacy_files: report
            .legacy_files
            .into_iter()
            .map(|file| file.path)
            .collect(),
    })
}

fn validate_instruction(instruction: TransformationInstruction) -> Result<PageChange> {
    let page = instruction.page.trim().to_string();
    let invalid = |reason: String| MigrationError::InvalidInstruction {
        page: instruction.page.clone(),
        reason,
    };

    if page.is_empty() {
        return Err(invalid("page is empty".to_string()));
    }
    if page.contains(['/', '\\']) || page == "." || page == ".." {
        return Err(invalid("page must be a layout name, not a path".to_string()));
    }

    let hidden = expression::parse(&instruction.expression).map_err(invalid)?;
    Ok(PageChange { page, hidden })
}

/// Pull `updatePageHidden` calls out of a chat response.
pub fn decode_instructions(response: ChatResponse) -> Result<Vec<TransformationInstruction>> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(MigrationError::Oracle("response has no choices".to_string()));
    };

    if let Some(content) = choice.message.content.as_deref().filter(|c| !c.is_empty()) {
        tracing::debug!(content, "Oracle replied with text");
    }

    let mut instructions = Vec::new();
    for call in choice.message.tool_calls.unwrap_or_default() {
        if call.function.name != UPDATE_PAGE_HIDDEN {
            tracing::warn!(function = %call.function.name, "Ignoring call to undeclared function");
            continue;
        }
        let args: UpdatePageHidden = serde_json::from_str(&call.function.arguments).map_err(|e| {
            MigrationError::Oracle(format!(
                "malformed {} arguments in call {}: {}",
                UPDATE_PAGE_HIDDEN, call.id, e
            ))
        })?;
        instructions.push(TransformationInstruction {
            page: args.page,
            expression: args.expression,
        });
    }
    Ok(instructions)
}

// ============================================================
// Chat completions oracle
// ============================================================

/// [`Oracle`] backed by an Azure OpenAI chat-completions deployment.
#[derive(Debug, Clone)]
pub struct ChatOracle {
    config: OracleConfig,
    client: Client,
}

impl ChatOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MigrationError::Config(format!("could not build oracle client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.config.endpoint, self.config.model
        )
    }

    pub fn request_for(&self, report: &ScanReport) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            temperature: TEMPERATURE,
            messages: build_messages(&report.legacy_files, &report.vocabulary),
            tools: vec![update_page_hidden_tool()],
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> MigrationError {
        if err.is_timeout() {
            MigrationError::OracleTimeout(self.config.timeout.as_secs())
        } else {
            MigrationError::Oracle(err.to_string())
        }
    }
}

#[async_trait]
impl Oracle for ChatOracle {
    async fn infer(&self, report: &ScanReport) -> Result<Vec<TransformationInstruction>> {
        let request = self.request_for(report);
        tracing::info!(
            messages = request.messages.len(),
            model = %self.config.model,
            "Running oracle analysis"
        );

        let response = self
            .client
            .post(self.url())
            .query(&[("api-version", self.config.api_version.as_str())])
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrationError::Oracle(format!("{}: {}", status, body)));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| self.map_send_error(e))?;
        let instructions = decode_instructions(chat)?;
        tracing::info!(count = instructions.len(), "Oracle finished evaluating");
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataModelVocabulary, LegacyLogicFile};

    struct Canned(Vec<TransformationInstruction>);

    #[async_trait]
    impl Oracle for Canned {
        async fn infer(&self, _report: &ScanReport) -> Result<Vec<TransformationInstruction>> {
            Ok(self.0.clone())
        }
    }

    fn report() -> ScanReport {
        ScanReport {
            legacy_files: vec![LegacyLogicFile {
                path: PathBuf::from("App/logic/A.cs"),
                source: "IPageOrder".into(),
            }],
            vocabulary: DataModelVocabulary::new(),
        }
    }

    fn instruction(page: &str, expression: &str) -> TransformationInstruction {
        TransformationInstruction {
            page: page.into(),
            expression: expression.into(),
        }
    }

    #[test]
    fn test_empty_answer_for_non_empty_scan_fails() {
        let err = tokio_test::block_on(consult(&Canned(vec![]), report())).unwrap_err();
        assert!(matches!(err, MigrationError::OracleEmpty(1)));
    }

    #[test]
    fn test_plan_keeps_legacy_files() {
        let oracle = Canned(vec![instruction("Page1", r#"["equals", ["dataModel", "a"], true]"#)]);
        let plan = tokio_test::block_on(consult(&oracle, report())).unwrap();
        assert_eq!(plan.changes().len(), 1);
        assert_eq!(plan.changes()[0].page, "Page1");
        assert_eq!(plan.legacy_files(), &[PathBuf::from("App/logic/A.cs")]);
    }

    #[test]
    fn test_malformed_expression_is_rejected() {
        let oracle = Canned(vec![instruction("Page1", r#"["equals" ["dataModel", "a"], true]"#)]);
        let err = tokio_test::block_on(consult(&oracle, report())).unwrap_err();
        assert_eq!(err.code(), "invalid_instruction");
    }

    #[test]
    fn test_same_page_twice_is_rejected() {
        let oracle = Canned(vec![
            instruction("Page3", r#"["equals", ["dataModel", "a"], true]"#),
            instruction("Page1", "true"),
            instruction(" Page3 ", r#"["equals", ["dataModel", "b"], true]"#),
        ]);
        let err = tokio_test::block_on(consult(&oracle, report())).unwrap_err();
        match err {
            MigrationError::InvalidInstruction { page, .. } => assert_eq!(page, "Page3"),
            other => panic!("expected an invalid instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_or_path_like_page_is_rejected() {
        for page in ["", "  ", "../Page1", "layouts/Page1"] {
            let oracle = Canned(vec![instruction(page, "true")]);
            let err = tokio_test::block_on(consult(&oracle, report())).unwrap_err();
            assert_eq!(err.code(), "invalid_instruction", "page {:?}", page);
        }
    }

    #[test]
    fn test_decode_reads_tool_calls() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {
                            "name": "updatePageHidden",
                            "arguments": "{\"page\":\"Page1\",\"expression\":\"[\\\"equals\\\",[\\\"dataModel\\\",\\\"funeral.isDead\\\"],true]\"}"
                        }},
                        {"id": "call_2", "type": "function", "function": {
                            "name": "somethingElse",
                            "arguments": "{}"
                        }}
                    ]
                }
            }]
        }))
        .unwrap();

        let instructions = decode_instructions(response).unwrap();
        assert_eq!(
            instructions,
            vec![instruction(
                "Page1",
                r#"["equals",["dataModel","funeral.isDead"],true]"#
            )]
        );
    }

    #[test]
    fn test_decode_without_tool_calls_is_empty() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "Nothing to do"}}]
        }))
        .unwrap();
        assert!(decode_instructions(response).unwrap().is_empty());
    }

    #[test]
    fn test_decode_malformed_arguments_fails() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "function": {"name": "updatePageHidden", "arguments": "{\"page\":1"}}
            ]}}]
        }))
        .unwrap();
        assert!(decode_instructions(response).is_err());
    }
}
