//! Built-in values used when `config.yml` leaves a setting out.

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_TOP_K: usize = 3;
pub const MIN_SIMILARITY_THRESHOLD: f32 = 0.0;
pub const DEFAULT_SOURCE: &str = "manual";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 120;

pub const RAG_SYSTEM_PROMPT: &str = "You are an enterprise knowledge-base assistant. \
Answer strictly according to the knowledge provided.";

/// System prompt for a plain-chat role. Unknown roles get the general assistant.
pub fn role_system_prompt(role: &str) -> &'static str {
    match role {
        "coder" => {
            "You are an expert programmer fluent in many languages and stacks. \
Give clear, accurate code suggestions and solutions."
        }
        "translator" => {
            "You are a professional translator between Chinese and English. \
Give accurate, natural translations."
        }
        "pm" => {
            "You are an experienced product manager skilled in product design, \
requirements analysis and project management. Give professional product advice."
        }
        "scholar" => {
            "You are a learned academic mentor across many disciplines. \
Give thorough, accurate academic answers."
        }
        _ => {
            "You are a helpful AI assistant that can help users with all kinds of problems. \
Give useful, accurate answers."
        }
    }
}
