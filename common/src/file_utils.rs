use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// `<timestamp>_<slug>.md` for an exported deck.
pub fn generate_deck_filename(title: &str, at: DateTime<Utc>) -> String {
    let slug = create_slug(title);
    let slug = if slug.is_empty() { "deck".to_string() } else { slug };
    format!("{}_{}.md", at.format("%Y%m%d-%H%M%S"), slug)
}

const MAX_SLUG_LEN: usize = 50;

/// Lowercase ASCII slug; other scripts are dropped, separators collapse to `-`.
pub fn create_slug(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Save deck markdown into `dir`, creating it when missing
pub async fn save_markdown<P: AsRef<Path>>(dir: P, filename: &str, content: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let file_path = dir.join(filename);
    tokio::fs::write(&file_path, content).await?;

    Ok(file_path)
}
