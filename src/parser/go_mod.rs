//! Go module discovery.
//!
//! Finds the `go.mod` governing a directory and reads the module path from
//! its `module` directive.

use std::fs;
use std::path::{Path, PathBuf};

use super::types::ModuleInfo;
use super::{ParseError, ParseResult};

/// Name of the module definition file.
pub const GO_MOD_FILE: &str = "go.mod";

/// Locates the module containing `start` and returns its path and root.
///
/// `start` may be a file or directory; the search walks up through its
/// ancestors until a `go.mod` is found.
pub fn discover_module(start: &Path) -> ParseResult<ModuleInfo> {
    let start = start.canonicalize()?;
    let go_mod = find_go_mod(&start)?;
    let path = module_path(&go_mod)?;
    let root = go_mod
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ParseError::GoModNotFound(start.display().to_string()))?;

    tracing::debug!(module = %path, root = %root.display(), "discovered module");
    Ok(ModuleInfo { path, root })
}

/// Walks up from `start` looking for a `go.mod` file.
pub fn find_go_mod(start: &Path) -> ParseResult<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(GO_MOD_FILE))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ParseError::GoModNotFound(start.display().to_string()))
}

/// Reads the module path out of a `go.mod` file.
pub fn module_path(go_mod: &Path) -> ParseResult<String> {
    let content = fs::read_to_string(go_mod)?;
    parse_module_directive(&content)
        .ok_or_else(|| ParseError::MissingModuleDirective(go_mod.display().to_string()))
}

/// Extracts the module path from `go.mod` content.
///
/// # Example
///
/// ```
/// use depscope::parser::go_mod::parse_module_directive;
///
/// let content = "module github.com/acme/tool // main module\n\ngo 1.22\n";
/// assert_eq!(
///     parse_module_directive(content),
///     Some("github.com/acme/tool".to_string())
/// );
/// ```
pub fn parse_module_directive(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = match line.find("//") {
            Some(idx) => &line[..idx],
            None => line,
        };
        let rest = line.trim().strip_prefix("module")?;
        // `modulefoo` is not a directive
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let path = rest.trim().trim_matches(['"', '`']);
        if path.is_empty() {
            None
        } else {
            Some(path.to_string())
        }
    })
}
