//! Protocol handlers for directive lines.
//!
//! Every handler degrades failures to inline HTML-comment markers instead of
//! returning errors, so a broken directive becomes visible diagnostic output
//! while the rest of the document still resolves. The cli handler performs
//! no validation of its own; the resolver consults the security gate before
//! it is ever invoked.

use globset::GlobBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

/// Fixed ceiling on one shell command.
pub const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads a file as UTF-8 text, resolving relative paths against `base_dir`.
#[must_use]
pub fn handle_static(argument: &str, base_dir: &Path) -> String {
    let path = Path::new(argument);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    if !path.exists() {
        return format!("<!-- ERROR: File not found: {argument} -->");
    }

    match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => format!("<!-- ERROR reading {argument}: {e} -->"),
    }
}

/// Executes a shell command and captures stdout.
///
/// The child is waited on from a helper thread so the timeout can be
/// enforced with `recv_timeout`; on expiry the child is killed and a
/// timeout marker returned.
#[must_use]
pub fn handle_cli(command: &str, timeout: Duration) -> String {
    let mut shell = shell_command(command);
    shell
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = match shell.spawn() {
        Ok(child) => child,
        Err(e) => return format!("<!-- ERROR executing '{command}': {e} -->"),
    };
    let child_id = child.id();

    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(output)) => {
            let _ = handle.join();
            if output.status.success() {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                format!("<!-- ERROR executing '{command}': {} -->", stderr.trim())
            }
        }
        Ok(Err(e)) => {
            let _ = handle.join();
            format!("<!-- ERROR executing '{command}': {e} -->")
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            kill_process(child_id);
            let _ = handle.join();
            format!("<!-- ERROR: Command timed out: {command} -->")
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            format!("<!-- ERROR executing '{command}': wait thread terminated unexpectedly -->")
        }
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);
        shell
    }
    #[cfg(windows)]
    {
        let mut shell = Command::new("cmd");
        shell.arg("/C").arg(command);
        shell
    }
}

fn kill_process(pid: u32) {
    #[cfg(unix)]
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Expands a glob pattern (recursive `**` supported) relative to `base_dir`
/// and concatenates matching files in sorted lexical order, separated by a
/// blank line.
#[must_use]
pub fn handle_glob(pattern: &str, base_dir: &Path) -> String {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().into_owned()
    };

    let matcher = match GlobBuilder::new(&full_pattern).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => return format!("<!-- ERROR resolving glob '{pattern}': {e} -->"),
    };

    let mut matches: Vec<PathBuf> = WalkDir::new(literal_prefix(&full_pattern))
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| matcher.is_match(path))
        .collect();
    matches.sort();

    if matches.is_empty() {
        return format!("<!-- WARNING: No files matched pattern: {pattern} -->");
    }

    let mut parts = Vec::with_capacity(matches.len());
    for path in matches {
        match fs::read_to_string(&path) {
            Ok(content) => parts.push(content),
            Err(e) => parts.push(format!("<!-- ERROR reading {}: {e} -->", path.display())),
        }
    }
    parts.join("\n\n")
}

/// Longest leading run of pattern components free of glob metacharacters;
/// this is the directory the walk starts from.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut root = PathBuf::new();
    for component in Path::new(pattern).components() {
        if component
            .as_os_str()
            .to_string_lossy()
            .contains(['*', '?', '[', '{'])
        {
            break;
        }
        root.push(component);
    }
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_static_reads_relative_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("f.txt"), "Z").unwrap();
        assert_eq!(handle_static("f.txt", temp_dir.path()), "Z");
    }

    #[test]
    fn test_static_reads_absolute_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abs.txt");
        fs::write(&path, "absolute").unwrap();
        let elsewhere = TempDir::new().unwrap();
        assert_eq!(
            handle_static(&path.to_string_lossy(), elsewhere.path()),
            "absolute"
        );
    }

    #[test]
    fn test_static_missing_file_marker() {
        let temp_dir = TempDir::new().unwrap();
        let result = handle_static("nope.txt", temp_dir.path());
        assert_eq!(result, "<!-- ERROR: File not found: nope.txt -->");
    }

    #[test]
    fn test_static_directory_read_marker() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("d")).unwrap();
        let result = handle_static("d", temp_dir.path());
        assert!(result.starts_with("<!-- ERROR reading d:"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cli_captures_stdout() {
        let result = handle_cli("printf hello", CLI_TIMEOUT);
        assert_eq!(result, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_cli_nonzero_exit_marker() {
        let result = handle_cli("printf oops >&2 && false", CLI_TIMEOUT);
        assert!(result.starts_with("<!-- ERROR executing"));
        assert!(result.contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cli_timeout_marker() {
        let result = handle_cli("sleep 5", Duration::from_millis(100));
        assert_eq!(result, "<!-- ERROR: Command timed out: sleep 5 -->");
    }

    #[test]
    fn test_glob_sorted_concatenation() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.md"), "B").unwrap();
        fs::write(temp_dir.path().join("a.md"), "A").unwrap();
        fs::write(temp_dir.path().join("c.md"), "C").unwrap();

        let result = handle_glob("*.md", temp_dir.path());
        assert_eq!(result, "A\n\nB\n\nC");
    }

    #[test]
    fn test_glob_deterministic_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["z.md", "m.md", "a.md"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        let first = handle_glob("*.md", temp_dir.path());
        let second = handle_glob("*.md", temp_dir.path());
        assert_eq!(first, second);
        assert_eq!(first, "a.md\n\nm.md\n\nz.md");
    }

    #[test]
    fn test_glob_recursive_wildcard() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("docs/sub")).unwrap();
        fs::write(temp_dir.path().join("docs/top.md"), "top").unwrap();
        fs::write(temp_dir.path().join("docs/sub/deep.md"), "deep").unwrap();
        fs::write(temp_dir.path().join("docs/skip.txt"), "txt").unwrap();

        let result = handle_glob("docs/**/*.md", temp_dir.path());
        assert!(result.contains("top"));
        assert!(result.contains("deep"));
        assert!(!result.contains("txt"));
    }

    #[test]
    fn test_glob_star_does_not_cross_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("top.md"), "top").unwrap();
        fs::write(temp_dir.path().join("sub/deep.md"), "deep").unwrap();

        let result = handle_glob("*.md", temp_dir.path());
        assert!(result.contains("top"));
        assert!(!result.contains("deep"));
    }

    #[test]
    fn test_glob_no_matches_warning() {
        let temp_dir = TempDir::new().unwrap();
        let result = handle_glob("*.nope", temp_dir.path());
        assert_eq!(result, "<!-- WARNING: No files matched pattern: *.nope -->");
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("/a/b/*.md"), PathBuf::from("/a/b"));
        assert_eq!(literal_prefix("/a/**/c.md"), PathBuf::from("/a"));
        assert_eq!(literal_prefix("*.md"), PathBuf::from("."));
        assert_eq!(literal_prefix("/a/b/c.md"), PathBuf::from("/a/b/c.md"));
    }
}
