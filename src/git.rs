//! Thin wrappers around the system `git` command.
//!
//! Every function here reads repository objects (refs, trees, blobs) and never
//! touches the index or the checked-out working tree, so they are safe to call
//! while the user has uncommitted changes or while other builds are running.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::DateTime;

use crate::error::{Error, Result};
use crate::refs::{Ref, RefKind, SubmodulePointers};

/// `for-each-ref` format: object, peeled object, refname, creator date.
const REF_FORMAT: &str = "%(objectname)\t%(*objectname)\t%(refname)\t%(creatordate:iso-strict)";

const MODE_GITLINK: &str = "160000";
const MODE_EXECUTABLE: &str = "100755";
const MODE_SYMLINK: &str = "120000";

/// One entry of `git ls-tree` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub kind: String,
    pub object: String,
    pub path: String,
}

impl TreeEntry {
    pub fn is_gitlink(&self) -> bool {
        self.mode == MODE_GITLINK
    }

    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// Run git in `cwd` and return its stdout.
pub fn run(cwd: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let command = format!("git {}", args.join(" "));
    log::trace!("{} (in {})", command, cwd.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| Error::Vcs {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::Vcs {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

fn run_string(cwd: &Path, args: &[&str]) -> Result<String> {
    let stdout = run(cwd, args)?;
    String::from_utf8(stdout).map_err(|e| Error::Vcs {
        command: format!("git {}", args.join(" ")),
        message: format!("non UTF-8 output: {}", e),
    })
}

/// Top-level directory of the repository containing `path`.
///
/// When `path` is inside a submodule, the superproject's root is returned so
/// that refs are discovered in the repository that owns the documentation.
pub fn toplevel(path: &Path) -> Result<PathBuf> {
    let output = run_string(
        path,
        &[
            "rev-parse",
            "--show-toplevel",
            "--show-superproject-working-tree",
        ],
    )?;
    // The superproject line, when present, comes last.
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .last()
        .map(|line| PathBuf::from(line.trim()))
        .ok_or_else(|| Error::Vcs {
            command: "git rev-parse --show-toplevel".to_string(),
            message: format!("no repository found at {}", path.display()),
        })
}

/// Whether `dir` is the root of its own git repository.
///
/// An uninitialized submodule directory resolves to the superproject, which
/// must not be mistaken for the submodule itself.
pub fn is_repository_root(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let Ok(top) = run_string(dir, &["rev-parse", "--show-toplevel"]) else {
        return false;
    };
    match (fs::canonicalize(top.trim()), fs::canonicalize(dir)) {
        (Ok(top), Ok(dir)) => top == dir,
        _ => false,
    }
}

/// Raw `for-each-ref` listing of every ref in the repository.
pub fn for_each_ref(gitroot: &Path) -> Result<String> {
    let format = format!("--format={}", REF_FORMAT);
    run_string(gitroot, &["for-each-ref", &format, "refs"])
}

/// Parse one line of [`for_each_ref`] output.
///
/// Returns `None` for refs that are neither branches, tags nor
/// remote-tracking branches (stash, notes, ...) and for symbolic remote
/// `HEAD` refs. The returned ref has no submodules and no config path yet.
pub fn parse_ref_line(line: &str) -> Option<Ref> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() != 4 {
        return None;
    }

    let commit = if fields[1].is_empty() {
        fields[0]
    } else {
        fields[1]
    };
    let refname = fields[2];
    let date = DateTime::parse_from_rfc3339(fields[3].trim()).ok()?;

    let reference = if let Some(name) = refname.strip_prefix("refs/heads/") {
        Ref::new(name, RefKind::Branch, commit)
    } else if let Some(name) = refname.strip_prefix("refs/tags/") {
        Ref::new(name, RefKind::Tag, commit)
    } else if let Some(rest) = refname.strip_prefix("refs/remotes/") {
        let (remote, name) = rest.split_once('/')?;
        if name == "HEAD" {
            return None;
        }
        Ref::new(name, RefKind::Branch, commit).with_remote(remote)
    } else {
        return None;
    };

    if reference.name.is_empty() || reference.name.contains(char::is_whitespace) {
        return None;
    }

    Some(reference.with_date(date))
}

/// Parse NUL-terminated `git ls-tree -z` output.
pub fn parse_ls_tree(output: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    for record in output.split(|b| *b == 0).filter(|r| !r.is_empty()) {
        let record = std::str::from_utf8(record).map_err(|e| Error::Vcs {
            command: "git ls-tree".to_string(),
            message: format!("non UTF-8 path: {}", e),
        })?;
        let malformed = || Error::Vcs {
            command: "git ls-tree".to_string(),
            message: format!("malformed entry '{}'", record),
        };
        let (meta, path) = record.split_once('\t').ok_or_else(malformed)?;
        let mut parts = meta.split(' ');
        let (Some(mode), Some(kind), Some(object)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        entries.push(TreeEntry {
            mode: mode.to_string(),
            kind: kind.to_string(),
            object: object.to_string(),
            path: path.to_string(),
        });
    }
    Ok(entries)
}

/// Recursive listing of the tree at `rev`, optionally limited to `pathspec`.
pub fn ls_tree(gitroot: &Path, rev: &str, pathspec: Option<&str>) -> Result<Vec<TreeEntry>> {
    let mut args = vec!["ls-tree", "-r", "-z", rev];
    if let Some(pathspec) = pathspec {
        args.push("--");
        args.push(pathspec);
    }
    parse_ls_tree(&run(gitroot, &args)?)
}

/// Submodule pointers recorded in a tree listing.
///
/// Fails when the tree pins submodules but has no `.gitmodules`, since the
/// submodules could then never be resolved.
pub fn submodule_pointers(entries: &[TreeEntry], rev: &str) -> Result<SubmodulePointers> {
    let pointers: SubmodulePointers = entries
        .iter()
        .filter(|entry| entry.is_gitlink())
        .map(|entry| (entry.path.clone(), entry.object.clone()))
        .collect();

    if !pointers.is_empty() && !entries.iter().any(|e| e.path == ".gitmodules") {
        return Err(Error::Vcs {
            command: format!("git ls-tree {}", rev),
            message: format!(
                "{} pins submodules ({}) but has no .gitmodules",
                rev,
                pointers.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        });
    }

    Ok(pointers)
}

/// Whether `path` exists in the tree at `rev`.
pub fn path_exists(gitroot: &Path, rev: &str, path: &str) -> bool {
    let spec = format!("{}:{}", rev, to_git_path(path));
    Command::new("git")
        .args(["cat-file", "-e", &spec])
        .current_dir(gitroot)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Contents of `path` at `rev`, or `None` when it does not exist there.
pub fn show_file(gitroot: &Path, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
    if !path_exists(gitroot, rev, path) {
        return Ok(None);
    }
    let spec = format!("{}:{}", rev, to_git_path(path));
    run(gitroot, &["cat-file", "blob", &spec]).map(Some)
}

/// Git always separates path components with `/`.
fn to_git_path(path: &str) -> String {
    if std::path::MAIN_SEPARATOR != '/' {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    } else {
        path.to_string()
    }
}

/// Stream the contents of `objects` through a single `git cat-file --batch`
/// process, handing each blob to `sink` in request order.
pub fn read_blobs<F>(gitroot: &Path, objects: &[String], mut sink: F) -> Result<()>
where
    F: FnMut(usize, Vec<u8>) -> Result<()>,
{
    if objects.is_empty() {
        return Ok(());
    }

    let command = "git cat-file --batch".to_string();
    let vcs_error = |message: String| Error::Vcs {
        command: command.clone(),
        message,
    };

    let mut child = Command::new("git")
        .args(["cat-file", "--batch"])
        .current_dir(gitroot)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| vcs_error(e.to_string()))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| vcs_error("stdin unavailable".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| vcs_error("stdout unavailable".to_string()))?;

    // Requests are written from a separate thread so a full stdout pipe can
    // never deadlock against a full stdin pipe.
    let requests: String = objects.iter().map(|o| format!("{}\n", o)).collect();
    let writer = std::thread::spawn(move || stdin.write_all(requests.as_bytes()));

    let mut reader = BufReader::new(stdout);
    let result = (|| -> Result<()> {
        for (index, object) in objects.iter().enumerate() {
            let mut header = String::new();
            reader.read_line(&mut header)?;
            let header = header.trim_end();
            if header.is_empty() || header.ends_with(" missing") {
                return Err(vcs_error(format!("missing object {}", object)));
            }
            let size: usize = header
                .rsplit(' ')
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| vcs_error(format!("malformed header '{}'", header)))?;

            let mut content = vec![0u8; size];
            reader.read_exact(&mut content)?;
            let mut newline = [0u8; 1];
            reader.read_exact(&mut newline)?;

            sink(index, content)?;
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = child.kill();
    }
    let _ = child.wait();
    let written = writer.join();
    result?;

    match written {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(vcs_error(format!("failed to send requests: {}", e))),
        Err(_) => Err(vcs_error("request writer panicked".to_string())),
    }
}

/// Write the tree at `rev` into `dest`, including submodules at their
/// pinned commits.
///
/// Submodule contents are read from the submodule's own repository, found at
/// the submodule path inside `gitroot`; a submodule that is not initialized
/// there cannot be exported.
pub fn export_tree(gitroot: &Path, rev: &str, dest: &Path) -> Result<()> {
    let entries = ls_tree(gitroot, rev, None)?;
    fs::create_dir_all(dest)?;

    let blobs: Vec<&TreeEntry> = entries.iter().filter(|e| e.is_blob()).collect();
    let objects: Vec<String> = blobs.iter().map(|e| e.object.clone()).collect();

    read_blobs(gitroot, &objects, |index, content| {
        write_entry(dest, blobs[index], content)
    })?;

    for entry in entries.iter().filter(|e| e.is_gitlink()) {
        let submodule_root = gitroot.join(&entry.path);
        if !is_repository_root(&submodule_root) {
            return Err(Error::Vcs {
                command: format!("git ls-tree {}", rev),
                message: format!(
                    "submodule '{}' (pinned at {}) is not initialized in {}",
                    entry.path,
                    entry.object,
                    gitroot.display()
                ),
            });
        }
        log::debug!(
            "Exporting submodule {} at {}",
            entry.path,
            entry.object
        );
        export_tree(&submodule_root, &entry.object, &dest.join(&entry.path))?;
    }

    Ok(())
}

fn write_entry(dest: &Path, entry: &TreeEntry, content: Vec<u8>) -> Result<()> {
    let path = dest.join(&entry.path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if entry.mode == MODE_SYMLINK {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            let target = std::ffi::OsStr::from_bytes(&content);
            std::os::unix::fs::symlink(target, &path)?;
            return Ok(());
        }
    }

    fs::write(&path, &content)?;

    #[cfg(unix)]
    if entry.mode == MODE_EXECUTABLE {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}
