//! # Script Builder
//!
//! Renders datasets or groups into removal commands. One command is produced
//! per on-disk path:
//!
//! ```text
//! <prefix> '<location><name><extension><invocation>' <postfix>;
//! ```
//!
//! Prefix and postfix are trimmed and only joined with a space when they are
//! not empty. Commands can be rendered inline (one space-joined command
//! string per entity, submitted as a single call) or multi-line, which is the
//! shape of the bash script file read back by
//! [`ScriptFileCommands`](crate::execution::ScriptFileCommands).

use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::defaults::BLOCK_MARKER;
use crate::error::Result;
use crate::group::Group;
use crate::path;

/// Something that owns on-disk paths and can be turned into commands.
pub trait Scriptable {
    /// Every path to act on.
    fn targets(&self) -> Vec<String>;

    /// One command per target.
    fn script_rows(&self, prefix: &str, postfix: &str) -> Vec<String> {
        self.targets()
            .iter()
            .map(|target| command_for(prefix, target, postfix))
            .collect()
    }
}

impl Scriptable for Dataset {
    fn targets(&self) -> Vec<String> {
        if !self.is_well_formed() {
            return Vec::new();
        }
        Dataset::targets(self)
    }
}

impl Scriptable for Group<'_> {
    fn targets(&self) -> Vec<String> {
        self.members()
            .iter()
            .flat_map(|member| Scriptable::targets(*member))
            .collect()
    }
}

impl<T: Scriptable + ?Sized> Scriptable for &T {
    fn targets(&self) -> Vec<String> {
        (**self).targets()
    }
}

/// `<prefix> '<target>' <postfix>;`
pub fn command_for(prefix: &str, target: &str, postfix: &str) -> String {
    let mut command = String::new();
    let prefix = prefix.trim();
    if !prefix.is_empty() {
        command.push_str(prefix);
        command.push(' ');
    }
    command.push('\'');
    command.push_str(target);
    command.push('\'');
    let postfix = postfix.trim();
    if !postfix.is_empty() {
        command.push(' ');
        command.push_str(postfix);
    }
    command.push(';');
    command
}

/// Commands for a set of entities, one block per entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    blocks: Vec<Vec<String>>,
}

impl Script {
    pub fn new<S: Scriptable>(items: &[S], prefix: &str, postfix: &str) -> Self {
        let blocks = items
            .iter()
            .map(|item| item.script_rows(prefix, postfix))
            .filter(|rows| !rows.is_empty())
            .collect();
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of individual commands across all blocks.
    pub fn command_count(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// One command string per entity, its rows joined with spaces.
    pub fn inline_commands(&self) -> Vec<String> {
        self.blocks.iter().map(|rows| rows.join(" ")).collect()
    }

    /// One newline-joined text per entity.
    pub fn multiline_commands(&self) -> Vec<String> {
        self.blocks.iter().map(|rows| rows.join("\n")).collect()
    }

    /// Full bash script text. Each entity block is followed by the block
    /// marker line.
    pub fn render_bash(&self) -> String {
        let mut text = String::from("#!/bin/bash\n");
        for rows in &self.blocks {
            for row in rows {
                text.push_str(row);
                text.push('\n');
            }
            text.push_str(BLOCK_MARKER);
            text.push('\n');
        }
        text.push_str("echo \"Script finished.\"\n");
        text
    }

    /// Write the bash script to `file`, never replacing an existing file.
    ///
    /// When `file` cannot be created, the write is retried once under the
    /// next free `name (N).ext`. Returns the path actually written.
    pub fn write_bash(&self, file: &Path) -> Result<PathBuf> {
        let file = if file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sh"))
        {
            file.to_path_buf()
        } else {
            file.with_extension("sh")
        };
        path::write_new_file(&file, self.render_bash().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::group::collect_groups;
    use std::fs;
    use tempfile::TempDir;

    fn alpha() -> Dataset {
        Dataset::new("alpha", ".ds")
            .with_descriptor("/desc/", 1)
            .with_location("/data/a/", ".p0", 1)
            .with_location("/data/a/", "", 1)
    }

    #[test]
    fn test_command_format() {
        assert_eq!(command_for(" rm -f ", "/a/b.ds", ""), "rm -f '/a/b.ds';");
        assert_eq!(command_for("", "/a/b.ds", ""), "'/a/b.ds';");
        assert_eq!(
            command_for("ls", "/a/b.ds", " > /dev/null "),
            "ls '/a/b.ds' > /dev/null;"
        );
    }

    #[test]
    fn test_dataset_rows_skip_blank_invocations() {
        let rows = alpha().script_rows("rm -f", "");
        assert_eq!(
            rows,
            vec!["rm -f '/desc/alpha.ds';", "rm -f '/data/a/alpha.ds.p0';"]
        );
    }

    #[test]
    fn test_malformed_dataset_has_no_rows() {
        assert!(Dataset::malformed().script_rows("rm", "").is_empty());
    }

    #[test]
    fn test_inline_and_multiline() {
        let items = [alpha(), Dataset::new("beta", ".ds").with_location("/b/", ".x", 1)];
        let script = Script::new(&items, "rm -f", "");
        assert_eq!(script.command_count(), 3);
        assert_eq!(
            script.inline_commands(),
            vec![
                "rm -f '/desc/alpha.ds'; rm -f '/data/a/alpha.ds.p0';",
                "rm -f '/b/beta.ds.x';"
            ]
        );
        assert_eq!(
            script.multiline_commands()[0],
            "rm -f '/desc/alpha.ds';\nrm -f '/data/a/alpha.ds.p0';"
        );
    }

    #[test]
    fn test_render_bash() {
        let script = Script::new(&[alpha()], "rm -f", "");
        assert_eq!(
            script.render_bash(),
            "#!/bin/bash\nrm -f '/desc/alpha.ds';\nrm -f '/data/a/alpha.ds.p0';\n#--\necho \"Script finished.\"\n"
        );
    }

    #[test]
    fn test_group_rows_cover_members() {
        let a = Dataset::new("feed_2024-01-05", ".ds").with_location("/d/", ".p", 1);
        let b = Dataset::new("feed_2024-01-06", ".ds").with_location("/d/", ".p", 1);
        let groups = collect_groups(&[&a, &b], &CancellationToken::new()).unwrap();
        let script = Script::new(&groups, "rm", "");
        assert_eq!(script.inline_commands().len(), 1);
        assert_eq!(script.command_count(), 2);
    }

    #[test]
    fn test_write_bash_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let script = Script::new(&[alpha()], "rm -f", "");
        let target = temp.path().join("scripts/rm_desc.sh");

        let first = script.write_bash(&target).unwrap();
        assert_eq!(first, target);
        let second = script.write_bash(&target).unwrap();
        assert_eq!(second, temp.path().join("scripts/rm_desc (1).sh"));
        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_write_bash_adds_extension() {
        let temp = TempDir::new().unwrap();
        let script = Script::new(&[alpha()], "rm", "");
        let written = script.write_bash(&temp.path().join("rm_x")).unwrap();
        assert_eq!(written, temp.path().join("rm_x.sh"));
    }
}
