use crate::models::db_operations::{posts_db_operations, DbError};
use ammonia::Builder;
use pulldown_cmark::{html, Options, Parser};
use rand::RngCore;
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::OnceLock;

const FALLBACK_SLUG: &str = "blog-post";

struct SlugPatterns {
    disallowed: Regex,
    separators: Regex,
    html_tag: Regex,
}

fn patterns() -> &'static SlugPatterns {
    static PATTERNS: OnceLock<SlugPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SlugPatterns {
        disallowed: Regex::new(r"[^\w\s-]").expect("static slug regex"),
        separators: Regex::new(r"[-\s]+").expect("static slug regex"),
        html_tag: Regex::new(r"(?i)</?[a-z][^>]*>").expect("static html regex"),
    })
}

/// Lowercases the title, drops punctuation and joins words with hyphens.
pub fn create_slug(title: &str) -> String {
    let p = patterns();
    let lowered = title.to_lowercase();
    let stripped = p.disallowed.replace_all(&lowered, "");
    let joined = p.separators.replace_all(&stripped, "-");
    let slug = joined.trim_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Slug for `title` that no other post uses. `exclude_id` lets a post keep
/// its own slug on update.
pub fn unique_slug(conn: &Connection, title: &str, exclude_id: Option<i64>) -> Result<String, DbError> {
    let base = create_slug(title);
    if !posts_db_operations::slug_exists(conn, &base, exclude_id)? {
        return Ok(base);
    }
    loop {
        let candidate = format!("{}-{}", base, random_suffix());
        if !posts_db_operations::slug_exists(conn, &candidate, exclude_id)? {
            return Ok(candidate);
        }
    }
}

/// Strips all HTML tags from input (for titles/excerpts).
pub fn strip_all_html(input: &str) -> String {
    Builder::new().tags(HashSet::new()).clean(input).to_string()
}

pub fn looks_like_html(content: &str) -> bool {
    patterns().html_tag.is_match(content)
}

fn sanitize_html(unsafe_html: &str) -> String {
    let tags_to_allow = [
        "h1", "h2", "h3", "h4", "h5", "h6", "b", "strong", "i", "em", "p", "br", "a", "ul", "ol", "li",
        "blockquote", "code", "pre", "hr", "img", "table", "thead", "tbody", "tr", "th", "td", "s", "del",
        "div", "span", "sup",
    ];
    let safe_attributes = ["src", "href", "alt", "title", "class", "width", "height", "align"];

    Builder::new()
        .tags(tags_to_allow.iter().cloned().collect::<HashSet<_>>())
        .generic_attributes(safe_attributes.iter().cloned().collect::<HashSet<_>>())
        .link_rel(Some("nofollow ugc"))
        .clean(unsafe_html)
        .to_string()
}

/// Renders stored post content for public display. Markdown is converted to
/// HTML; content that is already HTML is only sanitized.
pub fn render_content(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }
    if looks_like_html(content) {
        return sanitize_html(content);
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(content, options);
    let mut unsafe_html = String::new();
    html::push_html(&mut unsafe_html, parser);
    sanitize_html(&unsafe_html)
}
