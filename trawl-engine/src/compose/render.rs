//! Platform templating with an attribution block

use serde_json::Value;
use trawl_common::models::{ComposedOutput, Platform};

/// Source credited in the attribution block
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub domain: String,
}

fn primary_title(output: &ComposedOutput) -> &str {
    output
        .title_candidates
        .first()
        .map(String::as_str)
        .unwrap_or("Untitled")
}

fn hashtags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| format!("#{}", t.trim().trim_start_matches('#').replace(' ', "")))
        .filter(|t| t.len() > 1)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the export text for `platform`
pub fn render_export(platform: Platform, output: &ComposedOutput, sources: &[SourceRef]) -> String {
    match platform {
        Platform::Blog => render_blog(output, sources),
        Platform::Newsletter => render_newsletter(output, sources),
        Platform::Thread => render_thread(output, sources),
    }
}

fn render_blog(output: &ComposedOutput, sources: &[SourceRef]) -> String {
    let mut text = format!("# {}\n\n{}\n\n---\n\n## Sources\n\n", primary_title(output), output.body_markdown.trim());
    for source in sources {
        text.push_str(&format!("- [{}]({}) ({})\n", source.title, source.url, source.domain));
    }
    let tags = hashtags(&output.tags);
    if !tags.is_empty() {
        text.push_str(&format!("\nTags: {}\n", tags));
    }
    text
}

fn render_newsletter(output: &ComposedOutput, sources: &[SourceRef]) -> String {
    let mut text = format!("Subject: {}\n\n", primary_title(output));
    if let Some(preheader) = output.platform_extension.get("preheader").and_then(Value::as_str) {
        text.push_str(&format!("{}\n\n", preheader));
    }
    text.push_str(output.body_markdown.trim());
    text.push_str("\n\n---\nThis issue draws on:\n");
    for (i, source) in sources.iter().enumerate() {
        text.push_str(&format!("{}. {}: {}\n", i + 1, source.title, source.url));
    }
    text
}

/// Thread posts come from `platform_extension.posts` when present, else from
/// the body's paragraphs
fn render_thread(output: &ComposedOutput, sources: &[SourceRef]) -> String {
    let mut posts: Vec<String> = output
        .platform_extension
        .get("posts")
        .and_then(Value::as_array)
        .map(|posts| {
            posts
                .iter()
                .filter_map(Value::as_str)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if posts.is_empty() {
        posts = output
            .body_markdown
            .split("\n\n")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    let mut attribution = String::from("Sources:");
    for source in sources {
        attribution.push_str(&format!("\n{}", source.url));
    }
    let tags = hashtags(&output.tags);
    if !tags.is_empty() {
        attribution.push_str(&format!("\n{}", tags));
    }
    posts.push(attribution);

    let total = posts.len();
    posts
        .iter()
        .enumerate()
        .map(|(i, post)| format!("{}/{} {}", i + 1, total, post))
        .collect::<Vec<_>>()
        .join("\n\n")
}
