//! Known-dangerous substrings shared by every safety layer.
//!
//! The pre-flight safety stage, the tool runner and the default permission
//! policy all read from [`DANGEROUS_PATTERNS`], so the three layers cannot
//! drift apart. Matching is always case-insensitive substring matching.

/// Substrings that mark a plan step or command as dangerous.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    // destructive filesystem commands
    "rm -rf",
    "rm -fr",
    "rm -r ",
    "rmdir /s",
    "del /f",
    "del /s",
    "format c:",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    "shred ",
    ":(){",
    // privilege escalation
    "sudo ",
    "su root",
    "chmod 777",
    "chmod -r 777",
    "chown -r",
    "passwd ",
    "/etc/shadow",
    // destructive sql
    "drop table",
    "drop database",
    "truncate table",
    "delete from",
    "alter user",
    "grant all",
    // remote code piping
    "curl | sh",
    "curl | bash",
    "wget | sh",
    "| sh -",
    // destructive git history edits
    "git push --force",
    "git reset --hard",
    // secret-looking identifiers
    "api_key",
    "apikey",
    "password",
    "private_key",
    "secret_key",
    "aws_secret",
    "access_token",
    // machine control
    "shutdown ",
    "reboot",
    "kill -9",
];

/// Subset of [`DANGEROUS_PATTERNS`] that destroys data when executed.
pub const DESTRUCTIVE_PATTERNS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r ",
    "rmdir /s",
    "del /f",
    "del /s",
    "format c:",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    "shred ",
    "drop table",
    "drop database",
    "truncate table",
    "delete from",
    "git push --force",
    "git reset --hard",
];

/// Logging calls that leak whatever they print.
pub const LOGGING_CALLS: &[&str] = &[
    "console.log",
    "print(",
    "println!",
    "eprintln!",
    "logger.",
    "log::",
    "tracing::",
    "logging.",
];

/// Tokens that suggest the logged value is a secret.
pub const SECRET_TOKENS: &[&str] = &["secret", "token", "credential", "password", "api_key"];

/// System path prefixes a plan must never reference.
pub const SYSTEM_PATHS: &[&str] = &["/etc/", "/usr/", "/root/", "c:\\windows"];

/// Return every pattern from `patterns` contained in `text` (case-insensitive).
pub fn find_matches(text: &str, patterns: &[&'static str]) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    patterns
        .iter()
        .copied()
        .filter(|pattern| lowered.contains(pattern))
        .collect()
}

/// Return the dangerous patterns contained in `text`.
pub fn find_dangerous(text: &str) -> Vec<&'static str> {
    find_matches(text, DANGEROUS_PATTERNS)
}

/// True when `text` contains a data-destroying pattern.
pub fn is_destructive(text: &str) -> bool {
    !find_matches(text, DESTRUCTIVE_PATTERNS).is_empty()
}

/// True when `text` both logs something and mentions a secret.
pub fn logs_secret(text: &str) -> bool {
    !find_matches(text, LOGGING_CALLS).is_empty() && !find_matches(text, SECRET_TOKENS).is_empty()
}
