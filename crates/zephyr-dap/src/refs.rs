//! Script references and qualified paths
//!
//! A script is addressed by its qualified path `<archive>:<relative/path>`.
//! The reference is a stable positive integer derived from the lowercased
//! qualified path; it doubles as the DAP `sourceReference` and as the upper
//! half of breakpoint ids.

use std::fmt;

use crate::protocol::Source;

// ── ScriptRef ────────────────────────────────────────────────────────────────

/// Stable handle for a script, derived from its qualified path.
///
/// Zero is the invalid reference (empty or unresolvable path); every real
/// script gets a positive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ScriptRef(pub i32);

impl ScriptRef {
    pub const INVALID: ScriptRef = ScriptRef(0);

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive the reference for a qualified script path.
///
/// Pure function of the lowercased path: equal paths (case-insensitive)
/// always yield equal, positive references.
pub fn script_reference(qualified_path: &str) -> ScriptRef {
    if qualified_path.is_empty() {
        return ScriptRef::INVALID;
    }
    let lowered = qualified_path.to_ascii_lowercase();
    let hash = crc32fast::hash(lowered.as_bytes());
    ScriptRef((hash % 0x7fff_fffe) as i32 + 1)
}

/// Resolve a DAP source to a reference: an explicit positive
/// `sourceReference` is authoritative, otherwise the (origin-qualified) path
/// is hashed.
pub fn source_reference(source: &Source) -> ScriptRef {
    if let Some(reference) = source.source_reference {
        if reference > 0 {
            return ScriptRef(reference as i32);
        }
    }
    let Some(path) = source.path.as_deref() else {
        return ScriptRef::INVALID;
    };
    match source.origin.as_deref() {
        Some(origin) => script_reference(&qualify(origin, path)),
        None => script_reference(path),
    }
}

// ── Breakpoint ids ───────────────────────────────────────────────────────────

/// Pack a (script reference, line) pair into a stable 64-bit breakpoint id.
pub fn breakpoint_id(script_ref: ScriptRef, line: u32) -> i64 {
    (i64::from(script_ref.0) << 32) | i64::from(line)
}

// ── Qualified path handling ──────────────────────────────────────────────────

/// Join an archive name and a container-relative path.
pub fn qualify(archive: &str, path: &str) -> String {
    format!("{archive}:{path}")
}

/// Returns `true` if the path carries an archive qualifier.
pub fn has_qualifier(path: &str) -> bool {
    path.contains(':')
}

/// The container-relative part of a possibly-qualified path.
pub fn strip_qualifier(path: &str) -> &str {
    match path.split_once(':') {
        Some((_, rest)) => rest,
        None => path,
    }
}

/// The archive part of a qualified path, if present and non-empty.
pub fn archive_of(path: &str) -> Option<&str> {
    match path.split_once(':') {
        Some((archive, _)) if !archive.is_empty() => Some(archive),
        _ => None,
    }
}

// ── Script file detection ────────────────────────────────────────────────────

const SCRIPT_EXTENSIONS: [&str; 5] = ["zs", "zsc", "zc", "acs", "dec"];
const SCRIPT_BASENAMES: [&str; 2] = ["decorate", "acs"];

/// Returns `true` if the path names a script file: known extension, or one
/// of the bare well-known lump names.
pub fn is_script_path(path: &str) -> bool {
    let relative = strip_qualifier(path);
    let basename = relative
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(relative)
        .to_ascii_lowercase();
    match basename.rsplit_once('.') {
        Some((_, ext)) => SCRIPT_EXTENSIONS.contains(&ext),
        None => SCRIPT_BASENAMES.contains(&basename.as_str()),
    }
}

/// Basename (final path segment) of a possibly-qualified script path.
pub fn basename(path: &str) -> &str {
    let relative = strip_qualifier(path);
    relative.rsplit(['/', '\\']).next().unwrap_or(relative)
}
