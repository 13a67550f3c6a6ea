//! MCP Prompts for KWDB guidance.
//!
//! `syntax_guide` is assembled per request and can pull live table and
//! database details. The remaining prompts pair a role framing with a
//! markdown guide compiled into the binary.

use crate::constants::PRODUCT_NAME;
use crate::error::ServerError;
use crate::server::KwdbMcpServer;
use rmcp::model::{GetPromptResult, Prompt, PromptArgument, PromptMessage, PromptMessageRole};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::warn;

const SYNTAX_GUIDE: &str = include_str!("../docs/SyntaxGuide.md");
const DB_DESCRIPTION: &str = include_str!("../docs/DBDescription.md");

/// A prompt whose body is a fixed guide.
struct GuidePrompt {
    name: &'static str,
    description: &'static str,
    title: &'static str,
    framing: &'static str,
    body: &'static str,
}

const GUIDE_PROMPTS: &[GuidePrompt] = &[
    GuidePrompt {
        name: "db_description",
        description: "KWDB (KaiwuDB) database description and capabilities",
        title: "KWDB (KaiwuDB) Database Description",
        framing: "You are a database expert specializing in KWDB (KaiwuDB). Help users understand the capabilities and features of the database.",
        body: DB_DESCRIPTION,
    },
    GuidePrompt {
        name: "cluster_management",
        description: "KWDB Cluster Management Guide and Best Practices",
        title: "KWDB Cluster Management Guide",
        framing: "You are a KWDB cluster management expert. Help users understand and implement KWDB cluster management operations.",
        body: include_str!("../docs/ClusterManagementGuide.md"),
    },
    GuidePrompt {
        name: "data_migration",
        description: "KWDB Data Migration Guide and Best Practices",
        title: "KWDB Data Migration Guide",
        framing: "You are a KWDB data migration expert. Help users understand and implement data migration operations.",
        body: include_str!("../docs/DataMigrationGuide.md"),
    },
    GuidePrompt {
        name: "installation",
        description: "KWDB Installation and Deployment Guide and Best Practices",
        title: "KWDB Installation and Deployment Guide",
        framing: "You are a KWDB installation and deployment expert. Help users understand and implement KWDB installation and deployment operations.",
        body: include_str!("../docs/InstallationGuide.md"),
    },
    GuidePrompt {
        name: "performance_tuning",
        description: "KWDB Performance Tuning Guide and Best Practices",
        title: "KWDB Performance Tuning Guide",
        framing: "You are a KWDB performance tuning expert. Help users understand and implement performance optimization operations.",
        body: include_str!("../docs/PerformanceTuningGuide.md"),
    },
    GuidePrompt {
        name: "troubleshooting",
        description: "KWDB Troubleshooting Guide and Best Practices",
        title: "KWDB Troubleshooting Guide",
        framing: "You are a KWDB troubleshooting expert. Help users diagnose and resolve KWDB issues.",
        body: include_str!("../docs/TroubleShootingGuide.md"),
    },
    GuidePrompt {
        name: "backup_restore",
        description: "KWDB Backup and Restore Guide and Best Practices",
        title: "KWDB Backup and Restore Guide",
        framing: "You are a KWDB backup and restore expert. Help users understand and implement backup and restore operations.",
        body: include_str!("../docs/BackupRestoreGuide.md"),
    },
    GuidePrompt {
        name: "dba_template",
        description: "KWDB Database Administration Template and Best Practices",
        title: "KWDB Database Administration Template",
        framing: "You are a KWDB database administration expert. Help users understand and implement database administration operations.",
        body: include_str!("../docs/DBATemplate.md"),
    },
];

/// Create a prompt argument helper.
fn prompt_arg(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(required),
    }
}

/// Create a prompt helper.
fn prompt(name: &str, description: &str, arguments: Option<Vec<PromptArgument>>) -> Prompt {
    Prompt {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        arguments,
        icons: None,
    }
}

/// Build the list of available prompts.
pub fn build_prompt_list() -> Vec<Prompt> {
    let mut prompts = vec![prompt(
        "syntax_guide",
        "KWDB (KaiwuDB) syntax guide and examples. Optional parameters: 'database' and 'table' for table-specific guidance",
        Some(vec![
            prompt_arg(
                "database",
                "Database name to provide specific table information",
                false,
            ),
            prompt_arg(
                "table",
                "Table name to provide specific table schema and examples",
                false,
            ),
        ]),
    )];

    prompts.extend(
        GUIDE_PROMPTS
            .iter()
            .map(|guide| prompt(guide.name, guide.description, None)),
    );
    prompts
}

/// Render a prompt by name.
pub async fn get_prompt(
    server: &KwdbMcpServer,
    name: &str,
    args: Option<&HashMap<String, String>>,
) -> Result<GetPromptResult, ServerError> {
    if name == "syntax_guide" {
        let arg = |key: &str| {
            args.and_then(|a| a.get(key))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        return Ok(syntax_guide_prompt(server, arg("database"), arg("table")).await);
    }

    let guide = GUIDE_PROMPTS
        .iter()
        .find(|g| g.name == name)
        .ok_or_else(|| ServerError::invalid_input(format!("Unknown prompt: {}", name)))?;

    Ok(GetPromptResult {
        description: Some(guide.title.to_string()),
        messages: vec![
            PromptMessage::new_text(PromptMessageRole::User, guide.framing),
            PromptMessage::new_text(PromptMessageRole::Assistant, guide.body),
        ],
    })
}

async fn syntax_guide_prompt(
    server: &KwdbMcpServer,
    database: Option<&str>,
    table: Option<&str>,
) -> GetPromptResult {
    let mut content = format!(
        "You are a SQL expert specializing in {}. Help users understand the syntax and capabilities of the database.\n\n{}",
        PRODUCT_NAME, SYNTAX_GUIDE
    );
    let mut title = format!("{} Syntax Guide", PRODUCT_NAME);

    if let Some(table) = table {
        content.push_str(&table_section(server, table).await);
        let _ = write!(title, " - Table: {}", table);
    }
    if let Some(database) = database {
        content.push_str(&database_section(server, database).await);
        let _ = write!(title, " - Database: {}", database);
    }

    GetPromptResult {
        description: Some(title),
        messages: vec![PromptMessage::new_text(PromptMessageRole::User, content)],
    }
}

/// Column listing plus example queries. Empty when the table can't be read.
async fn table_section(server: &KwdbMcpServer, table: &str) -> String {
    let columns = match server.metadata().table_columns(table).await {
        Ok(columns) if !columns.is_empty() => columns,
        Ok(_) => return String::new(),
        Err(e) => {
            warn!(table, error = %e, "Failed to load table columns for prompt");
            return String::new();
        }
    };

    let mut section = format!("\n\n## Table Schema for '{}'\n", table);
    for col in &columns {
        let (Some(name), Some(data_type)) = (col.get_string("column_name"), col.get_string("data_type"))
        else {
            continue;
        };
        let _ = write!(section, "- **{}**: {}", name, data_type);
        if matches!(col.get_string("is_nullable").as_deref(), Some("NO" | "false")) {
            section.push_str(" (NOT NULL)");
        }
        if let Some(default) = col.get_string("column_default").filter(|d| !d.is_empty()) {
            let _ = write!(section, " DEFAULT {}", default);
        }
        section.push('\n');
    }

    match server.metadata().example_queries(table).await {
        Ok(examples) => {
            push_examples(&mut section, "Read", table, &examples.read);
            push_examples(&mut section, "Write", table, &examples.write);
        }
        Err(e) => warn!(table, error = %e, "Failed to build example queries for prompt"),
    }

    section
}

fn push_examples(section: &mut String, kind: &str, table: &str, examples: &[String]) {
    if examples.is_empty() {
        return;
    }
    let _ = write!(section, "\n## Example {} Queries for '{}'\n", kind, table);
    for example in examples.iter().filter(|e| !e.is_empty()) {
        let _ = write!(section, "```sql\n{}\n```\n\n", example);
    }
}

/// Database properties. Empty when the database can't be read.
async fn database_section(server: &KwdbMcpServer, database: &str) -> String {
    let info = match server.metadata().database_info(database).await {
        Ok(info) => info,
        Err(e) => {
            warn!(database, error = %e, "Failed to load database info for prompt");
            return String::new();
        }
    };

    let mut section = format!("\n\n## Database Information for '{}'\n", database);
    let _ = writeln!(section, "- **Name**: {}", info.name);
    let _ = writeln!(section, "- **Version**: {}", info.version);
    let _ = writeln!(section, "- **Engine Type**: {}", info.engine_type);
    if !info.comment.is_empty() {
        let _ = writeln!(section, "- **Comment**: {}", info.comment);
    }
    for (key, value) in &info.properties {
        let _ = writeln!(section, "- **{}**: {}", key, value);
    }
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PoolConfig, QueryConfig};
    use rmcp::model::PromptMessageContent;

    fn offline_server() -> KwdbMcpServer {
        KwdbMcpServer::new(Config {
            connection_string: "postgresql://root@127.0.0.1:1/defaultdb".to_string(),
            pool: PoolConfig::default(),
            query: QueryConfig::default(),
        })
        .unwrap()
    }

    fn text(message: &PromptMessage) -> &str {
        match &message.content {
            PromptMessageContent::Text { text } => text,
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_prompt_list() {
        let prompts = build_prompt_list();
        let names: Vec<_> = prompts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "syntax_guide",
                "db_description",
                "cluster_management",
                "data_migration",
                "installation",
                "performance_tuning",
                "troubleshooting",
                "backup_restore",
                "dba_template",
            ]
        );
        let args = prompts[0].arguments.as_ref().unwrap();
        assert!(args.iter().all(|a| a.required == Some(false)));
    }

    #[test]
    fn test_guides_are_embedded() {
        for guide in GUIDE_PROMPTS {
            assert!(!guide.body.trim().is_empty(), "{} guide is empty", guide.name);
        }
        assert!(SYNTAX_GUIDE.contains("CREATE TS DATABASE"));
    }

    #[tokio::test]
    async fn test_guide_prompt_messages() {
        let server = offline_server();
        let result = get_prompt(&server, "troubleshooting", None).await.unwrap();
        assert_eq!(
            result.description.as_deref(),
            Some("KWDB Troubleshooting Guide")
        );
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].role, PromptMessageRole::User);
        assert_eq!(result.messages[1].role, PromptMessageRole::Assistant);
        assert!(text(&result.messages[0]).starts_with("You are a KWDB troubleshooting expert"));
    }

    #[tokio::test]
    async fn test_unknown_prompt() {
        let server = offline_server();
        let err = get_prompt(&server, "nope", None).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_syntax_guide_without_arguments() {
        let server = offline_server();
        let result = get_prompt(&server, "syntax_guide", None).await.unwrap();
        assert_eq!(
            result.description.as_deref(),
            Some("KWDB (KaiwuDB) Syntax Guide")
        );
        assert_eq!(result.messages.len(), 1);
        assert!(text(&result.messages[0]).contains("You are a SQL expert specializing in KWDB"));
    }

    #[tokio::test]
    async fn test_syntax_guide_degrades_when_database_unreachable() {
        let server = offline_server();
        let mut args = HashMap::new();
        args.insert("table".to_string(), "sensors".to_string());
        args.insert("database".to_string(), "tsdb".to_string());

        let result = get_prompt(&server, "syntax_guide", Some(&args)).await.unwrap();
        assert_eq!(
            result.description.as_deref(),
            Some("KWDB (KaiwuDB) Syntax Guide - Table: sensors - Database: tsdb")
        );
        let body = text(&result.messages[0]);
        assert!(!body.contains("## Table Schema"));
        assert!(!body.contains("## Database Information"));
    }
}
