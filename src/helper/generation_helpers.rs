use crate::llm::{CompletionRequest, GenerationError, TextGenerator};
use crate::models::Category;
use serde_json::{Map, Value};

const SYSTEM_PROMPT: &str = "You are an expert blog writer for TenantGuard, a legal tech platform. \
Return ONLY valid JSON and no markdown.";

const EXCERPT_FALLBACK_CHARS: usize = 200;

/// Everything needed to ask a provider for a new post.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub topic: String,
    pub category: Category,
    pub links: Vec<String>,
    pub research_notes: String,
    pub extra_context: String,
    pub provider_index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub tags: Vec<String>,
    pub generated_by: String,
}

/// Result of a revision. Title and excerpt are only present when the provider
/// changed them.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisedContent {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
}

pub fn build_context(links: &[String], research_notes: &str, extra_context: &str) -> Option<String> {
    let mut parts = Vec::new();
    let links: Vec<&str> = links.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
    if !links.is_empty() {
        let bullets: Vec<String> = links.iter().map(|link| format!("- {}", link)).collect();
        parts.push(format!("Reference links:\n{}", bullets.join("\n")));
    }
    if !research_notes.trim().is_empty() {
        parts.push(format!("Research notes:\n{}", research_notes.trim()));
    }
    if !extra_context.trim().is_empty() {
        parts.push(format!("Additional instructions:\n{}", extra_context.trim()));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

pub fn build_generation_prompt(topic: &str, category: Category) -> String {
    format!(
        r#"Write a professional blog post for TenantGuard about: {topic}

The blog post should:
1. Have an engaging title
2. Include a compelling excerpt (150-200 characters)
3. Be well-structured with clear sections
4. Be informative and professional
5. Include relevant keywords for SEO
6. Be approximately 800-1200 words
7. End with a call-to-action

Category: {category}

Return ONLY valid JSON with this structure:
{{
  "title": "Blog Post Title",
  "excerpt": "Brief excerpt",
  "content": "Full blog post content in markdown format",
  "suggested_tags": ["tag1", "tag2", "tag3"]
}}
"#
    )
}

pub fn build_revision_prompt(revision_request: &str, title: &str, content: &str) -> String {
    format!(
        r#"Revise the following blog post according to these instructions:

REVISION REQUEST: {revision_request}

CURRENT TITLE: {title}

CURRENT CONTENT:
{content}

Return ONLY valid JSON with this structure:
{{
  "title": "Revised title (if changed)",
  "excerpt": "Revised excerpt (optional)",
  "content": "Revised content in markdown format"
}}
"#
    )
}

fn into_object(value: Value, what: &str) -> Result<Map<String, Value>, GenerationError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(GenerationError::Parse(format!("LLM response {} is not an object", what))),
    }
}

/// Strict parse first, then the outermost `{...}` fragment. Raw text is
/// never accepted as content.
pub fn parse_llm_json(response_text: &str) -> Result<Map<String, Value>, GenerationError> {
    if let Ok(value) = serde_json::from_str::<Value>(response_text) {
        return into_object(value, "JSON");
    }

    let start = response_text.find('{');
    let end = response_text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            let fragment = &response_text[start..=end];
            let value = serde_json::from_str::<Value>(fragment)
                .map_err(|e| GenerationError::Parse(format!("LLM response JSON parse error: {}", e)))?;
            into_object(value, "JSON fragment")
        }
        _ => Err(GenerationError::Parse("LLM response did not include valid JSON".to_string())),
    }
}

fn non_empty_str<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts a JSON list of strings or one comma-separated string.
pub fn normalize_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => split_tag_string(joined),
        _ => Vec::new(),
    }
}

pub fn split_tag_string(joined: &str) -> Vec<String> {
    joined.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
}

pub fn fallback_excerpt(content: &str) -> String {
    let head: String = content.chars().take(EXCERPT_FALLBACK_CHARS).collect();
    format!("{}...", head)
}

pub fn interpret_generation(
    data: &Map<String, Value>,
    topic: &str,
    generated_by: &str,
) -> Result<GeneratedContent, GenerationError> {
    let content = data
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GenerationError::Validation("LLM response missing content".to_string()))?;

    Ok(GeneratedContent {
        title: non_empty_str(data, "title").unwrap_or(topic).to_string(),
        excerpt: non_empty_str(data, "excerpt").map(str::to_string).unwrap_or_else(|| fallback_excerpt(content)),
        content: content.to_string(),
        tags: normalize_tags(data.get("suggested_tags")),
        generated_by: generated_by.to_string(),
    })
}

pub async fn generate_content(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Result<GeneratedContent, GenerationError> {
    let completion = generator
        .complete(&CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            context: build_context(&request.links, &request.research_notes, &request.extra_context),
            prompt: build_generation_prompt(&request.topic, request.category),
            provider_index: request.provider_index,
        })
        .await?;

    let data = parse_llm_json(&completion.text)?;
    interpret_generation(&data, &request.topic, &completion.provider)
}

pub async fn revise_content(
    generator: &dyn TextGenerator,
    revision_request: &str,
    title: &str,
    content: &str,
    provider_index: Option<i64>,
) -> Result<RevisedContent, GenerationError> {
    let completion = generator
        .complete(&CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            context: None,
            prompt: build_revision_prompt(revision_request, title, content),
            provider_index,
        })
        .await?;

    let data = parse_llm_json(&completion.text)?;
    let content = non_empty_str(&data, "content")
        .ok_or_else(|| GenerationError::Validation("LLM response missing content".to_string()))?;

    Ok(RevisedContent {
        title: non_empty_str(&data, "title").map(str::to_string),
        excerpt: non_empty_str(&data, "excerpt").map(str::to_string),
        content: content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn context_is_omitted_when_empty() {
        assert_eq!(build_context(&[], "  ", ""), None);
    }

    #[test]
    fn context_joins_sections_with_blank_lines() {
        let links = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let context = build_context(&links, "Rents rose 8%", "Keep it short").unwrap();
        assert_eq!(
            context,
            "Reference links:\n- https://a.example\n- https://b.example\n\n\
             Research notes:\nRents rose 8%\n\nAdditional instructions:\nKeep it short"
        );
    }

    #[test]
    fn prose_wrapped_json_is_recovered() {
        let data = parse_llm_json("Sure! Here it is: {\"content\": \"Body\"} Hope this helps.").unwrap();
        assert_eq!(data.get("content"), Some(&json!("Body")));
    }

    #[test]
    fn non_object_json_is_a_parse_error() {
        assert!(matches!(parse_llm_json("[1, 2, 3]"), Err(GenerationError::Parse(_))));
        assert!(matches!(parse_llm_json("no json at all"), Err(GenerationError::Parse(_))));
        assert!(matches!(parse_llm_json("{not: valid}"), Err(GenerationError::Parse(_))));
    }

    #[test]
    fn missing_fields_fall_back() {
        let long_body = "x".repeat(250);
        let data = parse_llm_json(&json!({ "content": long_body, "suggested_tags": " rent, , eviction " }).to_string())
            .unwrap();
        let generated = interpret_generation(&data, "Rent hikes", "openai").unwrap();
        assert_eq!(generated.title, "Rent hikes");
        assert_eq!(generated.excerpt, format!("{}...", "x".repeat(200)));
        assert_eq!(generated.tags, vec!["rent".to_string(), "eviction".to_string()]);
    }

    #[test]
    fn empty_content_is_a_validation_error() {
        let data = parse_llm_json(r#"{"title": "T", "content": "   "}"#).unwrap();
        assert!(matches!(interpret_generation(&data, "T", "openai"), Err(GenerationError::Validation(_))));
    }

    #[actix_web::test]
    async fn generate_content_uses_provider_id() {
        let generator = ScriptedGenerator::new(vec![Ok(json!({
            "title": "Your deposit, explained",
            "excerpt": "What landlords can keep.",
            "content": "## Deposits\n\nBody",
            "suggested_tags": ["deposits"]
        })
        .to_string())]);
        let request = GenerationRequest {
            topic: "Deposits".to_string(),
            category: Category::Technical,
            links: vec![],
            research_notes: String::new(),
            extra_context: String::new(),
            provider_index: None,
        };

        let generated = generate_content(&generator, &request).await.unwrap();
        assert_eq!(generated.title, "Your deposit, explained");
        assert_eq!(generated.generated_by, "scripted");
        let sent = generator.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].context.is_none());
        assert!(sent[0].prompt.contains("about: Deposits"));
    }

    #[actix_web::test]
    async fn revision_requires_content() {
        let generator = ScriptedGenerator::new(vec![Ok(r#"{"title": "New"}"#.to_string())]);
        let result = revise_content(&generator, "Shorter", "Old", "Body", None).await;
        assert!(matches!(result, Err(GenerationError::Validation(_))));
    }
}
