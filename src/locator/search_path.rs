//! `PATH` lookup on the build node.

use tracing::{debug, warn};

use crate::node::RemoteFileSystem;

/// Splits a raw `PATH` value using the node's separator. Backslashes are kept
/// verbatim, empty entries are dropped and quoted entries are unquoted.
pub fn split_search_path(raw: &str, unix: bool) -> Vec<&str> {
    let sep = if unix { ':' } else { ';' };
    raw.split(sep)
        .map(|dir| {
            let dir = dir.trim();
            dir.strip_prefix('"')
                .and_then(|d| d.strip_suffix('"'))
                .unwrap_or(dir)
        })
        .filter(|dir| !dir.is_empty())
        .collect()
}

/// First `<dir>/<filename>` that exists, in `PATH` order.
pub async fn find_in_path(
    fs: &dyn RemoteFileSystem,
    path_var: Option<&str>,
    filename: &str,
    unix: bool,
) -> Option<String> {
    let raw = path_var?;
    debug!(path = raw, "PATH");

    for dir in split_search_path(raw, unix) {
        let candidate = fs.join(dir, filename);
        debug!(%candidate, "looking for file");
        match fs.exists(&candidate).await {
            Ok(true) => return Some(candidate),
            Ok(false) => {}
            Err(err) => warn!(%candidate, error = %err, "skipping unreadable PATH entry"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{fake::FakeNode, Node};

    #[test]
    fn splits_on_the_node_separator() {
        assert_eq!(split_search_path("/usr/bin:/usr/local/bin", true), vec!["/usr/bin", "/usr/local/bin"]);
        assert_eq!(
            split_search_path(r"C:\Windows;C:\Tools", false),
            vec![r"C:\Windows", r"C:\Tools"]
        );
        // A Windows PATH read on a unix-like node is not split on drive colons.
        assert_eq!(split_search_path(r"C:\Tools", false), vec![r"C:\Tools"]);
    }

    #[test]
    fn keeps_backslashes_and_unc_paths_intact() {
        assert_eq!(
            split_search_path(r"\\server\share\bin;C:\Program Files\Python", false),
            vec![r"\\server\share\bin", r"C:\Program Files\Python"]
        );
    }

    #[test]
    fn drops_empty_entries_and_quotes() {
        assert_eq!(
            split_search_path(r#";"C:\Program Files\Python311";;C:\Tools;"#, false),
            vec![r"C:\Program Files\Python311", r"C:\Tools"]
        );
        assert!(split_search_path("", true).is_empty());
    }

    #[tokio::test]
    async fn returns_first_match_in_order() {
        let node = FakeNode::unix()
            .file("/usr/local/bin/python3")
            .file("/opt/bin/python3");
        let found = find_in_path(node.fs(), Some("/usr/bin:/usr/local/bin:/opt/bin"), "python3", true).await;
        assert_eq!(found.as_deref(), Some("/usr/local/bin/python3"));
    }

    #[tokio::test]
    async fn unset_path_is_absent() {
        let node = FakeNode::unix().file("/usr/bin/python3");
        assert_eq!(find_in_path(node.fs(), None, "python3", true).await, None);
    }

    #[tokio::test]
    async fn no_match_is_absent() {
        let node = FakeNode::windows().file(r"C:\Tools\python.exe");
        assert_eq!(find_in_path(node.fs(), Some(r"C:\Windows;C:\Tools"), "py.exe", false).await, None);
    }

    #[tokio::test]
    async fn broken_entry_is_skipped() {
        let node = FakeNode::unix()
            .broken("/mnt/gone/python3")
            .file("/usr/bin/python3");
        let found = find_in_path(node.fs(), Some("/mnt/gone:/usr/bin"), "python3", true).await;
        assert_eq!(found.as_deref(), Some("/usr/bin/python3"));
    }
}
