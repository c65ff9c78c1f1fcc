use std::path::Path;

use anyhow::{bail, Context};
use tabrelay_engine::{latest_run_file, read_entries};

/// Render a short human summary of one result file.
pub(crate) fn summarize(
    dir: &Path,
    platform: Option<&str>,
    file: Option<&Path>,
) -> anyhow::Result<String> {
    let path = match file {
        Some(file) => file.to_path_buf(),
        None => match latest_run_file(dir, platform)? {
            Some(path) => path,
            None => bail!("no result files in {}", dir.display()),
        },
    };
    let log = read_entries(&path).with_context(|| format!("reading {}", path.display()))?;
    let counts = log.counts();

    let mut lines = vec![
        format!("file:      {}", path.display()),
        format!("items:     {}", counts.items),
        format!("progress:  {}", counts.progress),
        format!("errors:    {}", counts.errors),
    ];
    if log.skipped_lines > 0 {
        lines.push(format!("skipped:   {} unreadable line(s)", log.skipped_lines));
    }
    match log.summary() {
        Some(summary) => lines.push(format!("summary:   {summary}")),
        None => lines.push("summary:   none (run incomplete or failed)".to_string()),
    }
    for error in log.errors() {
        lines.push(format!("error:     {error}"));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabrelay_engine::IncrementalStore;

    #[test]
    fn latest_run_is_summarized() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = IncrementalStore::create(temp.path(), "duckduckgo").unwrap();
        store.append_items(&[json!({"title": "a"}), json!({"title": "b"})]).unwrap();
        store.append_summary(json!({"total_items": 2})).unwrap();

        let text = summarize(temp.path(), Some("duckduckgo"), None).unwrap();
        assert!(text.contains("items:     2"));
        assert!(text.contains("\"total_items\":2"));
        assert!(!text.contains("skipped"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(summarize(temp.path(), None, None).is_err());
    }
}
