//! Classification oracle client.
//!
//! The oracle is an external service (an Ollama-style generate API) that
//! maps file metadata to a category path, and can be asked once per run to
//! propose a whole category tree. Its answers are loosely structured text;
//! everything is validated and depth-clamped here at the boundary.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use shelfwright_core::{
    CategoryPath, CategoryTree, FileSignature, OracleConfig, OracleError, sanitize_name,
};

/// External classification oracle.
pub trait Oracle: Send + Sync {
    /// Map one file signature to a category path, choosing from the given
    /// categories. The returned path is at most `max_depth` deep.
    fn classify(
        &self,
        sig: &FileSignature,
        categories: &[CategoryPath],
        max_depth: u32,
    ) -> impl Future<Output = Result<CategoryPath, OracleError>> + Send;

    /// Propose a category tree for a sample of file signatures.
    fn generate_tree(
        &self,
        sample: &[FileSignature],
        max_depth: u32,
    ) -> impl Future<Output = Result<CategoryTree, OracleError>> + Send;
}

/// HTTP client for an Ollama-style `/api/generate` oracle.
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    classify_timeout: Duration,
    generate_timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl HttpOracle {
    /// Create a client from oracle settings.
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            classify_timeout: config.classify_timeout,
            generate_timeout: config.generate_timeout,
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        json_format: bool,
        num_predict: u32,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: json_format.then_some("json"),
            options: GenerateOptions {
                num_predict,
                temperature: 0.2,
            },
        };

        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout
                } else {
                    OracleError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Http(format!("status {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        Ok(body.response)
    }
}

impl Oracle for HttpOracle {
    async fn classify(
        &self,
        sig: &FileSignature,
        categories: &[CategoryPath],
        max_depth: u32,
    ) -> Result<CategoryPath, OracleError> {
        let category_list = categories
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let prompt = format!(
            "Classify the following file into ONE category from the list provided.\n\
             Respond with ONLY the category path.\n\n\
             Categories: {category_list}\n\n\
             File Information:\n\
             - Name: {}\n\
             - Extension: {}\n\
             - Size: {} bytes\n\n\
             Category:",
            sig.name, sig.extension, sig.size
        );

        let reply = self
            .generate(&prompt, false, 32, self.classify_timeout)
            .await?;
        debug!(file = %sig.name, %reply, "oracle classification reply");

        let path = parse_category_reply(&reply, max_depth)?;
        Ok(path)
    }

    async fn generate_tree(
        &self,
        sample: &[FileSignature],
        max_depth: u32,
    ) -> Result<CategoryTree, OracleError> {
        let sample_json = serde_json::to_string_pretty(sample)
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let prompt = format!(
            "Analyze the following file list and propose a hierarchical category \
             structure suitable for organizing them.\n\
             Use common sense categories based on file names, extensions, and typical usage.\n\
             Maximum category depth: {max_depth}.\n\
             Prioritize broader categories first. Be concise.\n\n\
             File Sample ({} files):\n{sample_json}\n\n\
             Respond ONLY with a JSON object representing the category tree, \
             where every key is a category name and every value is an object \
             of subcategories (empty for leaves).",
            sample.len()
        );

        let reply = self
            .generate(&prompt, true, 512, self.generate_timeout)
            .await?;
        debug!(len = reply.len(), "oracle tree reply received");

        parse_tree_reply(&reply, max_depth)
    }
}

/// Parse a classification reply into a depth-clamped path.
///
/// Models tend to decorate answers ("Category: X", quotes, backticks);
/// strip that before splitting on slashes.
fn parse_category_reply(reply: &str, max_depth: u32) -> Result<CategoryPath, OracleError> {
    let mut cleaned = reply.trim();
    if let Some((_, tail)) = cleaned.rsplit_once(':') {
        cleaned = tail;
    }
    let cleaned = cleaned.trim().trim_matches(['"', '`', '\'']).trim();

    let path = CategoryPath::from_slash(cleaned).truncated(max_depth);
    if path.is_empty() {
        return Err(OracleError::Malformed(format!(
            "empty category in reply {reply:?}"
        )));
    }
    Ok(path)
}

/// Parse a tree-generation reply (a JSON object of nested objects) into a
/// category tree, clamped to `max_depth`.
fn parse_tree_reply(reply: &str, max_depth: u32) -> Result<CategoryTree, OracleError> {
    let stripped = strip_code_fences(reply);
    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| OracleError::Malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(OracleError::Malformed(
            "tree reply is not a JSON object".to_string(),
        ));
    };

    let mut tree = CategoryTree::new(max_depth);
    let mut stack = Vec::new();
    insert_branches(&mut tree, &mut stack, &map);

    if tree.is_empty() {
        return Err(OracleError::Malformed(
            "tree reply contains no categories".to_string(),
        ));
    }
    Ok(tree)
}

fn insert_branches(
    tree: &mut CategoryTree,
    stack: &mut Vec<compact_str::CompactString>,
    map: &serde_json::Map<String, Value>,
) {
    for (raw_name, children) in map {
        let Some(name) = sanitize_name(raw_name) else {
            continue;
        };
        stack.push(name);
        // insert_path clamps anything deeper than the tree's bound
        tree.insert_path(&CategoryPath(stack.clone()));
        if let Value::Object(children) = children {
            if !children.is_empty() && (stack.len() as u32) < tree.max_depth() {
                insert_branches(tree, stack, children);
            }
        }
        stack.pop();
    }
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_reply_plain() {
        let path = parse_category_reply("Documents/Reports", 3).unwrap();
        assert_eq!(path.to_string(), "Documents/Reports");
    }

    #[test]
    fn test_parse_category_reply_decorated() {
        let path = parse_category_reply("Category: \"Media\"", 3).unwrap();
        assert_eq!(path.to_string(), "Media");

        let path = parse_category_reply("`Documents`\n", 3).unwrap();
        assert_eq!(path.to_string(), "Documents");
    }

    #[test]
    fn test_parse_category_reply_clamps_depth() {
        let path = parse_category_reply("Media/Video/Raw", 2).unwrap();
        assert_eq!(path.to_string(), "Media/Video");
    }

    #[test]
    fn test_parse_category_reply_empty_is_malformed() {
        assert!(matches!(
            parse_category_reply("  ", 3),
            Err(OracleError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_tree_reply() {
        let reply = r#"{"Documents": {"Reports": {}, "Invoices": {}}, "Images": {}}"#;
        let tree = parse_tree_reply(reply, 3).unwrap();

        assert!(tree.contains_path(&CategoryPath::from_slash("Documents/Reports")));
        assert!(tree.contains_path(&CategoryPath::from_slash("Images")));
        assert_eq!(tree.leaf_paths().len(), 3);
    }

    #[test]
    fn test_parse_tree_reply_strips_fences() {
        let reply = "```json\n{\"Code\": {}}\n```";
        let tree = parse_tree_reply(reply, 3).unwrap();
        assert!(tree.contains_path(&CategoryPath::from_slash("Code")));
    }

    #[test]
    fn test_parse_tree_reply_clamps_depth() {
        let reply = r#"{"A": {"B": {"C": {"D": {}}}}}"#;
        let tree = parse_tree_reply(reply, 2).unwrap();

        assert!(tree.contains_path(&CategoryPath::from_slash("A/B")));
        assert!(!tree.contains_path(&CategoryPath::from_slash("A/B/C")));
        for leaf in tree.leaf_paths() {
            assert!(leaf.depth() <= 2);
        }
    }

    #[test]
    fn test_parse_tree_reply_rejects_non_object() {
        assert!(matches!(
            parse_tree_reply(r#"["Documents", "Images"]"#, 3),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_tree_reply("not json at all", 3),
            Err(OracleError::Malformed(_))
        ));
    }
}
