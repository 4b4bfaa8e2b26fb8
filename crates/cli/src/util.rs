//! Pure helpers consumed by the shell: path resolution, file loading, and
//! command argument parsing. No state, no I/O beyond the obvious reads.

use std::path::{Path, PathBuf};

use tracing::warn;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "gif", "tiff", "tif",
];

/// Trim, strip surrounding quotes, and expand a leading `~`.
fn expand_path(raw: &str) -> PathBuf {
    let cleaned = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if let Some(rest) = cleaned.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(cleaned)
}

/// Resolve a user-supplied path to an existing image file, or `None` if it
/// does not exist or has a non-image extension.
pub fn resolve_and_validate_image_path(input: &str) -> Option<PathBuf> {
    if input.trim().is_empty() {
        return None;
    }
    let path = expand_path(input);
    let ext = path.extension()?.to_str()?.to_lowercase();
    if path.exists() && IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(path)
    } else {
        None
    }
}

/// Load a text file's content, warning (not failing) when it is missing or
/// unreadable.
pub fn load_file_content(input: &str) -> Option<String> {
    if input.trim().is_empty() {
        return None;
    }
    let path = expand_path(input);
    if !path.exists() {
        warn!(path = %path.display(), "File not found");
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error reading file");
            None
        }
    }
}

/// Split a `/command target [prompt]` input into its target and trailing
/// prompt. The target may be quoted to allow spaces; for `/search` the whole
/// remainder is the target.
pub fn extract_target_and_prompt(input: &str, command: &str) -> (String, String) {
    let rest = input
        .strip_prefix(&format!("/{command}"))
        .unwrap_or(input)
        .trim();

    if command == "search" {
        return (rest.to_string(), String::new());
    }

    for quote in ['"', '\''] {
        if let Some(stripped) = rest.strip_prefix(quote) {
            if let Some(end) = stripped.find(quote) {
                let target = stripped[..end].to_string();
                let prompt = stripped[end + 1..].trim().to_string();
                return (target, prompt);
            }
        }
    }

    let mut parts = rest.splitn(2, char::is_whitespace);
    let target = parts.next().unwrap_or_default().to_string();
    let prompt = parts.next().unwrap_or_default().trim().to_string();
    (target, prompt)
}

/// The current local date and time, spelled out for tool-result context.
pub fn current_date_time() -> String {
    chrono::Local::now()
        .format("%A, %B %-d, %Y, %-I:%M %p")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extract_plain_target_and_prompt() {
        let (target, prompt) =
            extract_target_and_prompt("/web https://example.com summarize it", "web");
        assert_eq!(target, "https://example.com");
        assert_eq!(prompt, "summarize it");
    }

    #[test]
    fn extract_quoted_target_keeps_spaces() {
        let (target, prompt) =
            extract_target_and_prompt("/load \"my notes.txt\" what are the action items", "load");
        assert_eq!(target, "my notes.txt");
        assert_eq!(prompt, "what are the action items");
    }

    #[test]
    fn extract_single_quoted_target() {
        let (target, prompt) = extract_target_and_prompt("/image 'cat pic.png' describe", "image");
        assert_eq!(target, "cat pic.png");
        assert_eq!(prompt, "describe");
    }

    #[test]
    fn extract_target_without_prompt() {
        let (target, prompt) = extract_target_and_prompt("/web https://example.com", "web");
        assert_eq!(target, "https://example.com");
        assert!(prompt.is_empty());
    }

    #[test]
    fn search_takes_the_whole_remainder() {
        let (target, prompt) =
            extract_target_and_prompt("/search latest rust release notes", "search");
        assert_eq!(target, "latest rust release notes");
        assert!(prompt.is_empty());
    }

    #[test]
    fn image_path_requires_image_extension() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "not an image").unwrap();
        assert!(resolve_and_validate_image_path(file.path().to_str().unwrap()).is_none());
    }

    #[test]
    fn image_path_accepts_existing_png() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let resolved = resolve_and_validate_image_path(file.path().to_str().unwrap());
        assert_eq!(resolved.unwrap(), file.path());
    }

    #[test]
    fn image_path_ignores_missing_file() {
        assert!(resolve_and_validate_image_path("/nonexistent/cat.png").is_none());
        assert!(resolve_and_validate_image_path("").is_none());
    }

    #[test]
    fn quoted_image_path_is_unwrapped() {
        let file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        let quoted = format!("\"{}\"", file.path().display());
        assert!(resolve_and_validate_image_path(&quoted).is_some());
    }

    #[test]
    fn load_reads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "file body").unwrap();
        let content = load_file_content(file.path().to_str().unwrap()).unwrap();
        assert!(content.contains("file body"));
    }

    #[test]
    fn load_missing_file_is_none() {
        assert!(load_file_content("/nonexistent/notes.txt").is_none());
    }

    #[test]
    fn date_time_is_spelled_out() {
        let now = current_date_time();
        // e.g. "Tuesday, August 4, 2026, 9:03 AM"
        assert!(now.contains(','));
        assert!(now.ends_with("AM") || now.ends_with("PM"));
    }
}
