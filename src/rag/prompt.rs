//! RAG prompt assembly.
//!
//! Layout with knowledge:
//! `system_role` + `"\n\n"` + blocks joined by `join_separator` + `question_prefix` + query,
//! where each block is the rendered `knowledge_intro`, a newline, and the chunk content.

use serde::{Deserialize, Serialize};

use super::types::KnowledgeChunk;

const UNTITLED: &str = "untitled";

/// Text fragments used to frame retrieved knowledge.
///
/// `knowledge_intro` may reference `{index}` (1-based) and `{title}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplate {
    pub system_role: String,
    pub knowledge_intro: String,
    pub question_prefix: String,
    pub join_separator: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_role: "You are a professional assistant. Answer only from the knowledge below; \
if it does not cover the question, say so explicitly."
                .to_string(),
            knowledge_intro: "[Knowledge {index} - {title}]".to_string(),
            question_prefix: "\n\nQuestion: ".to_string(),
            join_separator: "\n\n".to_string(),
        }
    }
}

impl PromptTemplate {
    fn render_intro(&self, index: usize, title: &str) -> String {
        self.knowledge_intro
            .replace("{index}", &index.to_string())
            .replace("{title}", title)
    }
}

pub fn build_prompt(query: &str, chunks: &[KnowledgeChunk], template: &PromptTemplate) -> String {
    if chunks.is_empty() {
        return format!("{}{}{}", template.system_role, template.question_prefix, query);
    }

    let knowledge = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let title = if chunk.title.is_empty() {
                UNTITLED
            } else {
                chunk.title.as_str()
            };
            format!("{}\n{}", template.render_intro(i + 1, title), chunk.content)
        })
        .collect::<Vec<_>>()
        .join(&template.join_separator);

    format!(
        "{}\n\n{}{}{}",
        template.system_role, knowledge, template.question_prefix, query
    )
}
