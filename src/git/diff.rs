//! Diff text rendering and line accounting
//!
//! Renders git2 diffs as unified patch text in the layout `git diff` prints,
//! builds the synthetic patches used for uncommitted files, and counts
//! added/removed lines.

use git2::{Diff, DiffFormat};

/// Render a git2 diff as unified patch text
pub fn render_patch(diff: &Diff<'_>) -> Result<String, git2::Error> {
    let mut out = String::new();

    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        let content = String::from_utf8_lossy(line.content());
        match line.origin() {
            // Content lines carry their marker separately from the text
            origin @ ('+' | '-' | ' ') => {
                out.push(origin);
                out.push_str(&content);
            }
            // File headers, hunk headers and end-of-file markers arrive preformatted
            _ => out.push_str(&content),
        }
        true
    })?;

    Ok(out)
}

/// Count added and removed lines in patch text.
///
/// `+++`/`---` lines inside a file header (between `diff --git` and the
/// first `@@`) are not content and are skipped. Text without any file header,
/// such as the synthetic patches below, is counted line by line.
pub fn count_line_changes(diff: &str) -> (usize, usize) {
    let mut additions = 0;
    let mut deletions = 0;
    let mut in_file_header = false;

    for line in diff.lines() {
        if line.starts_with("diff --") {
            in_file_header = true;
            continue;
        }
        if line.starts_with("@@") {
            in_file_header = false;
            continue;
        }
        if in_file_header && (line.starts_with("+++") || line.starts_with("---")) {
            continue;
        }

        if line.starts_with('+') {
            additions += 1;
        } else if line.starts_with('-') {
            deletions += 1;
        }
    }

    (additions, deletions)
}

/// Patch for a file that only exists in the working tree: every line added
pub fn synthesize_added(content: &str) -> String {
    prefix_lines(content, '+')
}

/// Patch for a file removed from the working tree: every HEAD line removed
pub fn synthesize_deleted(head_content: &str) -> String {
    prefix_lines(head_content, '-')
}

fn prefix_lines(content: &str, marker: char) -> String {
    content
        .lines()
        .map(|line| format!("{marker}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_added_diff() {
        let diff = synthesize_added("a\nb");
        assert_eq!(diff, "+a\n+b");
        assert_eq!(count_line_changes(&diff), (2, 0));
    }

    #[test]
    fn test_synthesized_deleted_diff() {
        let diff = synthesize_deleted("one\ntwo\nthree\n");
        assert_eq!(diff, "-one\n-two\n-three");
        assert_eq!(count_line_changes(&diff), (0, 3));
    }

    #[test]
    fn test_empty_content_gives_empty_diff() {
        assert_eq!(synthesize_added(""), "");
        assert_eq!(count_line_changes(""), (0, 0));
    }

    #[test]
    fn test_count_skips_file_header_lines() {
        let patch = "\
diff --git a/src/api/a.ts b/src/api/a.ts
index 1111111..2222222 100644
--- a/src/api/a.ts
+++ b/src/api/a.ts
@@ -1,3 +1,4 @@
 line1
-line2
+changed
 line3
+new
";
        assert_eq!(count_line_changes(patch), (2, 1));
    }

    #[test]
    fn test_count_keeps_content_that_looks_like_a_header() {
        // A removed line that itself starts with "--" is content inside a hunk
        let patch = "\
diff --git a/x.sql b/x.sql
--- a/x.sql
+++ b/x.sql
@@ -1,2 +1,1 @@
--- comment
+++ counter
 select 1;
";
        assert_eq!(count_line_changes(patch), (1, 1));
    }

    #[test]
    fn test_count_multiple_files() {
        let patch = "\
diff --git a/a b/a
new file mode 100644
--- /dev/null
+++ b/a
@@ -0,0 +1,2 @@
+x
+y
diff --git a/b b/b
deleted file mode 100644
--- a/b
+++ /dev/null
@@ -1 +0,0 @@
-z
\\ No newline at end of file
";
        assert_eq!(count_line_changes(patch), (2, 1));
    }
}
