//! Danger classification of shell commands.
//!
//! The rules are tables, not code: each matcher contributes a `(tag,
//! severity)` pair and the most severe match wins. A command with no match
//! on any table and no read-only head is `Moderate`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    Safe,
    Moderate,
    Dangerous,
    Critical,
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DangerLevel::Safe      => write!(f, "safe"),
            DangerLevel::Moderate  => write!(f, "moderate"),
            DangerLevel::Dangerous => write!(f, "dangerous"),
            DangerLevel::Critical  => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub level:   DangerLevel,
    pub reasons: Vec<String>,
}

// ── Read-only allowlist ──────────────────────────────────────────────────

const READ_ONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "wc", "find", "grep", "rg", "fd", "tree", "pwd",
    "which", "whoami", "env", "echo", "du", "df", "file", "stat", "uname", "date",
    "uptime", "type", "less", "more", "diff", "jq", "sort", "uniq", "cut", "tr",
    "vitest", "jest", "pytest",
];

const GIT_READ_SUBCOMMANDS: &[&str] = &[
    "status", "log", "diff", "show", "branch", "remote", "rev-parse", "describe", "tag",
];

const NPM_READ_SUBCOMMANDS: &[&str] = &[
    "list", "ls", "view", "info", "show", "outdated", "audit", "test",
];

// ── Mutating constructs ──────────────────────────────────────────────────

const MUTATING_COMMANDS: &[&str] = &["rm", "mv", "cp", "mkdir", "touch", "chmod", "chown"];

const GIT_MUTATING_SUBCOMMANDS: &[&str] = &[
    "add", "commit", "push", "pull", "merge", "rebase", "reset", "checkout",
];

const PKG_MANAGERS: &[&str] = &["npm", "yarn", "pnpm"];
const PKG_MUTATING_SUBCOMMANDS: &[&str] = &["install", "add", "remove", "uninstall"];

// ── Whole-command pattern tables ─────────────────────────────────────────

struct PatternRule {
    regex: &'static Lazy<Regex>,
    tag:   &'static str,
    level: DangerLevel,
}

static PIPE_TO_SHELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z|da|fi)?sh\b").expect("pipe-to-shell rule")
});

static HEREDOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<[^<]").expect("heredoc rule"));

static FIND_MUTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfind\b.*(\s-delete\b|-exec\s+(rm|mv|cp|chmod|chown|sed|tee)\b)")
        .expect("find-mutation rule")
});

static XARGS_MUTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bxargs\b(\s+-\S+)*\s+(rm|mv|cp|chmod|chown|mkdir|touch|sed)\b")
        .expect("xargs-mutation rule")
});

static TEE_TO_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|\s*tee\s+(?:-a\s+)?([^\s;|&-][^\s;|&]*)").expect("tee rule")
});

// Matches each redirection, capturing the optional fd digit, the arrows,
// and the target. Fd duplication (`>&`) and `/dev/null` targets are
// filtered out by the caller.
static REDIRECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d?)(>>?)(&?)\s*([^\s;|&]*)").expect("redirect rule")
});

static PATTERN_RULES: &[PatternRule] = &[
    PatternRule { regex: &PIPE_TO_SHELL,   tag: "pipe-to-shell",   level: DangerLevel::Critical },
    PatternRule { regex: &HEREDOC,         tag: "heredoc",         level: DangerLevel::Dangerous },
    PatternRule { regex: &FIND_MUTATION,   tag: "find-mutation",   level: DangerLevel::Dangerous },
    PatternRule { regex: &XARGS_MUTATION,  tag: "xargs-mutation",  level: DangerLevel::Dangerous },
];

// ── Segment helpers ──────────────────────────────────────────────────────

static SEGMENT_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|\||&&|[|;]").expect("segment split"));

fn segments(command: &str) -> Vec<&str> {
    SEGMENT_SPLIT
        .split(command)
        .map(|s| s.trim().trim_end_matches('&').trim())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Tokens of one segment, with leading `VAR=value` assignments skipped and
/// the head command reduced to its basename.
fn segment_tokens(segment: &str) -> Vec<&str> {
    segment
        .split_whitespace()
        .skip_while(|t| t.contains('=') && !t.starts_with('-') && !t.contains('/'))
        .collect()
}

fn head_basename<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    tokens.first().map(|h| h.rsplit('/').next().unwrap_or(*h))
}

fn is_read_only_segment(segment: &str) -> bool {
    let tokens = segment_tokens(segment);
    let Some(head) = head_basename(&tokens) else { return false };
    if READ_ONLY_COMMANDS.contains(&head) {
        return true;
    }
    let sub = tokens.get(1).copied().unwrap_or("");
    match head {
        "git"  => GIT_READ_SUBCOMMANDS.contains(&sub),
        "node" => sub == "-v",
        "tsc"  => sub == "--noEmit",
        "npm"  => {
            NPM_READ_SUBCOMMANDS.contains(&sub)
                || (sub == "run" && tokens.get(2).copied() == Some("test"))
        }
        _ => false,
    }
}

fn mutating_tag(segment: &str) -> Option<String> {
    let tokens = segment_tokens(segment);
    let head = head_basename(&tokens)?;
    let sub = tokens.get(1).copied().unwrap_or("");
    if MUTATING_COMMANDS.contains(&head) {
        return Some(format!("mutating-command:{head}"));
    }
    if head == "git" && GIT_MUTATING_SUBCOMMANDS.contains(&sub) {
        return Some(format!("mutating-command:git-{sub}"));
    }
    if PKG_MANAGERS.contains(&head) && PKG_MUTATING_SUBCOMMANDS.contains(&sub) {
        return Some(format!("mutating-command:{head}-{sub}"));
    }
    // In-place editing flags turn text filters into mutators.
    if (head == "sed" || head == "perl") && tokens.iter().any(|t| *t == "-i" || t.starts_with("-i.") || *t == "-pi" || *t == "-pie") {
        return Some(format!("in-place-edit:{head}"));
    }
    if head == "awk" && segment.contains("-i inplace") {
        return Some("in-place-edit:awk".to_string());
    }
    None
}

fn redirection_tags(command: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for cap in REDIRECT.captures_iter(command) {
        let arrows  = &cap[2];
        let is_dup  = !cap[3].is_empty();
        let target  = cap.get(4).map(|m| m.as_str()).unwrap_or("");
        if is_dup || target.starts_with('&') {
            continue; // 2>&1, >&2, 1>&2: stream plumbing, not mutation
        }
        if target == "/dev/null" {
            continue;
        }
        if arrows == ">>" {
            tags.push("append-redirect".to_string());
        } else {
            tags.push(format!("output-redirect:{target}"));
        }
    }
    for cap in TEE_TO_FILE.captures_iter(command) {
        let target = &cap[1];
        if target != "/dev/null" {
            tags.push(format!("tee-to-file:{target}"));
        }
    }
    tags
}

/// True when the command contains any filesystem-mutation construct: a
/// mutating command in any pipeline segment, or mutation via redirection.
pub fn has_file_mutation(command: &str) -> bool {
    if segments(command).iter().any(|s| mutating_tag(s).is_some()) {
        return true;
    }
    if !redirection_tags(command).is_empty() {
        return true;
    }
    HEREDOC.is_match(command) || FIND_MUTATION.is_match(command) || XARGS_MUTATION.is_match(command)
}

/// True when every pipeline segment of the command has a read-only head
/// and no mutating construct is present.
pub fn is_read_only(command: &str) -> bool {
    let segs = segments(command);
    !segs.is_empty() && segs.iter().all(|s| is_read_only_segment(s)) && !has_file_mutation(command)
}

/// Classify a command string. The most severe matching rule wins; the
/// returned reasons list one tag per match.
pub fn classify_command(command: &str) -> Classification {
    fn bump(l: DangerLevel, tag: String, reasons: &mut Vec<String>, level: &mut DangerLevel) {
        if l > *level {
            *level = l;
        }
        reasons.push(tag);
    }

    let mut level = DangerLevel::Safe;
    let mut reasons: Vec<String> = Vec::new();
    let segs = segments(command);

    for seg in &segs {
        let tokens = segment_tokens(seg);
        if let Some(head) = head_basename(&tokens) {
            if head == "sudo" || head == "su" {
                bump(DangerLevel::Critical, format!("privilege-escalation:{head}"), &mut reasons, &mut level);
            }
        }
        if let Some(tag) = mutating_tag(seg) {
            bump(DangerLevel::Dangerous, tag, &mut reasons, &mut level);
        }
    }

    for rule in PATTERN_RULES {
        if rule.regex.is_match(command) {
            bump(rule.level, rule.tag.to_string(), &mut reasons, &mut level);
        }
    }

    for tag in redirection_tags(command) {
        bump(DangerLevel::Dangerous, tag, &mut reasons, &mut level);
    }

    if reasons.is_empty() {
        if !segs.is_empty() && segs.iter().all(|s| is_read_only_segment(s)) {
            Classification { level: DangerLevel::Safe, reasons: vec!["read-only".to_string()] }
        } else {
            Classification { level: DangerLevel::Moderate, reasons: Vec::new() }
        }
    } else {
        Classification { level, reasons }
    }
}
