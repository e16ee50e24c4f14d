//! Access-stage building blocks: account tasks, file install scripts and the
//! sshd directive rewrite.
//!
//! Pure functions only: callers run the returned scripts through a
//! `RemoteShell`.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::config::AccountConfig;
use crate::domain::credentials::PublicKey;
use crate::domain::host::RunAs;
use crate::domain::task::{Guard, Task, quote};

/// Directory holding per-account sudoers drop-ins.
pub const SUDOERS_DIR: &str = "/etc/sudoers.d";

/// Mode of a sudoers drop-in.
pub const SUDOERS_MODE: &str = "0440";

/// The directive enforced in `sshd_config`.
pub const PASSWORD_AUTH_KEYWORD: &str = "PasswordAuthentication";

// ── Account ──────────────────────────────────────────────────────────────────

/// Task that creates the account when it does not exist.
///
/// An existing account is left untouched; group membership is handled by
/// [`group_membership_task`] so that it is appended, never replaced.
#[must_use]
pub fn account_task(account: &AccountConfig) -> Task {
    let mut script = format!("useradd -m -s {}", quote(&account.shell));
    if !account.groups.is_empty() {
        script.push_str(&format!(" -G {}", quote(&account.groups.join(","))));
    }
    script.push(' ');
    script.push_str(&quote(&account.name));
    Task::new(format!("create account {}", account.name), RunAs::Root, script)
        .guarded(Guard::UnlessSucceeds(format!(
            "id -u {} >/dev/null 2>&1",
            quote(&account.name)
        )))
}

/// Task that appends the configured groups to an existing account.
///
/// Returns `None` when no groups are configured.
#[must_use]
pub fn group_membership_task(account: &AccountConfig) -> Option<Task> {
    if account.groups.is_empty() {
        return None;
    }
    let name = quote(&account.name);
    let check = account
        .groups
        .iter()
        .map(|g| format!("id -nG {name} | tr ' ' '\\n' | grep -qx {}", quote(g)))
        .collect::<Vec<_>>()
        .join(" && ");
    Some(
        Task::new(
            format!("append groups for {}", account.name),
            RunAs::Root,
            format!("usermod -a -G {} {name}", quote(&account.groups.join(","))),
        )
        .guarded(Guard::UnlessSucceeds(check)),
    )
}

/// Extract the home directory (field 6) from a `getent passwd` line.
#[must_use]
pub fn parse_passwd_home(line: &str) -> Option<String> {
    let home = line.trim().split(':').nth(5)?;
    (!home.is_empty()).then(|| home.to_string())
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Options for [`install_file_script`].
#[derive(Debug, Clone, Copy)]
pub struct FileSpec<'a> {
    pub path: &'a str,
    pub mode: &'a str,
    pub owner: Option<&'a str>,
    /// Command run against the staged file (`{}` is replaced by its path)
    /// before it is moved into place.
    pub validate: Option<&'a str>,
}

/// Script that atomically replaces `spec.path` with `content`.
///
/// The content is written to a sibling temp file, permissions are applied,
/// the optional validator runs, and only then is the file renamed over the
/// target. A failed validation leaves the target untouched.
#[must_use]
pub fn install_file_script(spec: &FileSpec<'_>, content: &str) -> String {
    let target = quote(spec.path);
    let staged = quote(&format!("{}.rollout-tmp", spec.path));
    let mut script = String::new();
    script.push_str(&format!("trap 'rm -f {staged}' EXIT\n"));
    script.push_str(&format!("printf '%s' {} > {staged}\n", quote(content)));
    script.push_str(&format!("chmod {} {staged}\n", spec.mode));
    if let Some(owner) = spec.owner {
        script.push_str(&format!("chown {} {staged}\n", quote(owner)));
    }
    if let Some(validate) = spec.validate {
        script.push_str(&validate.replace("{}", &staged));
        script.push('\n');
    }
    script.push_str(&format!("mv -f {staged} {target}\n"));
    script
}

/// Content of the sudoers drop-in for `account`.
#[must_use]
pub fn sudoers_entry(account: &str) -> String {
    format!("{account} ALL=(ALL) NOPASSWD:ALL\n")
}

/// Path of the sudoers drop-in for `account`.
#[must_use]
pub fn sudoers_path(account: &str) -> String {
    format!("{SUDOERS_DIR}/{account}")
}

/// Task that (re)writes the sudoers drop-in, validated with `visudo`.
#[must_use]
pub fn sudoers_task(account: &str) -> Task {
    let path = sudoers_path(account);
    let script = install_file_script(
        &FileSpec {
            path: &path,
            mode: SUDOERS_MODE,
            owner: Some("root:root"),
            validate: Some("visudo -cf {}"),
        },
        &sudoers_entry(account),
    );
    Task::new(format!("grant passwordless sudo to {account}"), RunAs::Root, script)
}

/// Script that appends `key` to `<home>/.ssh/authorized_keys`, creating the
/// directory (0700) and file (0600) owned by `account`.
#[must_use]
pub fn append_authorized_key_script(account: &str, home: &str, key: &PublicKey) -> String {
    let ssh_dir = quote(&format!("{home}/.ssh"));
    let file = quote(&format!("{home}/.ssh/authorized_keys"));
    let owner = quote(account);
    format!(
        "install -d -m 0700 -o {owner} -g \"$(id -gn {owner})\" {ssh_dir}\n\
         printf '%s\\n' {line} >> {file}\n\
         chown {owner}:\"$(id -gn {owner})\" {file}\n\
         chmod 0600 {file}\n",
        line = quote(&key.authorized_line()),
    )
}

// ── sshd_config ──────────────────────────────────────────────────────────────

static MATCH_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*match\s").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Result of [`ensure_directive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveEdit {
    pub content: String,
    pub changed: bool,
}

/// Ensure `keyword value` is the single active setting of `keyword` in the
/// global section of an sshd-style config.
///
/// - keyword matching is case-insensitive, as sshd's is;
/// - only lines before the first `Match` block are considered;
/// - the first active occurrence is replaced in place, or the first commented
///   one when nothing is active;
/// - other active occurrences in the global section are removed;
/// - when there is no occurrence the directive is inserted before the first
///   `Match` line, or appended.
#[must_use]
pub fn ensure_directive(content: &str, keyword: &str, value: &str) -> DirectiveEdit {
    let directive = format!("{keyword} {value}");
    let pattern = Regex::new(&format!(r"(?i)^\s*(#\s*)?{}(\s|=|$)", regex::escape(keyword)))
        .unwrap_or_else(|e| unreachable!("escaped keyword regex: {e}"));

    let lines: Vec<&str> = content.lines().collect();
    let global_end = lines
        .iter()
        .position(|line| MATCH_BLOCK.is_match(line))
        .unwrap_or(lines.len());
    // (index, commented) for each global occurrence.
    let occurrences: Vec<(usize, bool)> = lines[..global_end]
        .iter()
        .enumerate()
        .filter_map(|(i, line)| pattern.captures(line).map(|caps| (i, caps.get(1).is_some())))
        .collect();
    let target = occurrences
        .iter()
        .find(|(_, commented)| !commented)
        .or_else(|| occurrences.first())
        .map(|(i, _)| *i);

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        if i == global_end && target.is_none() {
            out.push(directive.clone());
        }
        if Some(i) == target {
            out.push(directive.clone());
            continue;
        }
        let active_duplicate = occurrences.iter().any(|&(at, commented)| at == i && !commented);
        if !active_duplicate {
            out.push((*line).to_string());
        }
    }
    if target.is_none() && global_end == lines.len() {
        out.push(directive);
    }

    let mut rendered = out.join("\n");
    rendered.push('\n');
    let changed = rendered != content;
    DirectiveEdit {
        content: rendered,
        changed,
    }
}

/// Backup path for a config file modified at `stamp`.
#[must_use]
pub fn backup_path(path: &str, stamp: &str) -> String {
    format!("{path}.{stamp}.bak")
}
