//! Go build constraints.
//!
//! A source file takes part in the build only when its name and its
//! `//go:build` line (or legacy `// +build` lines) agree with the target
//! [`BuildContext`]. Files excluded here never reach the extractor.

use std::collections::BTreeSet;
use std::env;

use thiserror::Error;

/// Operating systems recognised in file name suffixes.
const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Operating systems satisfying the `unix` tag.
const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// Architectures recognised in file name suffixes.
const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("Unexpected end of build constraint '{0}'")]
    UnexpectedEnd(String),

    #[error("Unexpected token '{token}' in build constraint '{line}'")]
    UnexpectedToken { token: String, line: String },
}

pub type ConstraintResult<T> = Result<T, ConstraintError>;

/// Target platform and tags a file list is selected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    /// Extra tags, as given to `go build -tags`
    pub tags: BTreeSet<String>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::host()
    }
}

impl BuildContext {
    pub fn new(goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        Self {
            goos: goos.into(),
            goarch: goarch.into(),
            tags: BTreeSet::new(),
        }
    }

    /// The running platform, overridden by `GOOS` / `GOARCH` when set.
    pub fn host() -> Self {
        let goos = env::var("GOOS")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| host_os().to_string());
        let goarch = env::var("GOARCH")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| host_arch().to_string());
        Self::new(goos, goarch)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether a single build tag is satisfied.
    pub fn matches_tag(&self, tag: &str) -> bool {
        if tag == self.goos || tag == self.goarch || self.tags.contains(tag) {
            return true;
        }
        match tag {
            "gc" => true,
            "unix" => UNIX_OS.contains(&self.goos.as_str()),
            "linux" => self.goos == "android",
            "solaris" => self.goos == "illumos",
            "darwin" => self.goos == "ios",
            _ => is_release_tag(tag),
        }
    }

    /// Applies the `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` name suffixes.
    ///
    /// # Example
    ///
    /// ```
    /// use depscope::analysis::BuildContext;
    ///
    /// let ctx = BuildContext::new("linux", "amd64");
    /// assert!(ctx.matches_file_name("poll_linux.go"));
    /// assert!(!ctx.matches_file_name("poll_windows.go"));
    /// assert!(!ctx.matches_file_name("asm_linux_arm64.go"));
    /// assert!(ctx.matches_file_name("windows.go"));
    /// ```
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let stem = file_name.strip_suffix(".go").unwrap_or(file_name);
        let stem = stem.strip_suffix("_test").unwrap_or(stem);
        // the part before the first underscore never constrains
        let Some(idx) = stem.find('_') else {
            return true;
        };
        let parts: Vec<&str> = stem[idx..].split('_').collect();
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.matches_tag(parts[n - 2]) && self.matches_tag(parts[n - 1]);
        }
        let last = parts[n - 1];
        if KNOWN_OS.contains(&last) || KNOWN_ARCH.contains(&last) {
            return self.matches_tag(last);
        }
        true
    }

    /// Evaluates the constraint lines in the file header of `source`.
    ///
    /// `//go:build` wins over `// +build` when both are present. A file
    /// without constraints always matches.
    pub fn matches_source(&self, source: &str) -> ConstraintResult<bool> {
        let header = Header::scan(source);
        if let Some(line) = header.go_build {
            let expr = Expr::parse(line)?;
            return Ok(expr.eval(&|tag: &str| self.matches_tag(tag)));
        }
        Ok(header
            .plus_build
            .iter()
            .all(|line| self.matches_plus_build(line)))
    }

    /// `// +build` semantics: spaces are OR, commas are AND.
    fn matches_plus_build(&self, line: &str) -> bool {
        line.split_whitespace().any(|option| {
            option.split(',').all(|term| match term.strip_prefix('!') {
                Some(tag) => !self.matches_tag(tag),
                None => self.matches_tag(term),
            })
        })
    }
}

fn is_release_tag(tag: &str) -> bool {
    tag.strip_prefix("go1.")
        .is_some_and(|minor| !minor.is_empty() && minor.chars().all(|c| c.is_ascii_digit()))
}

fn host_os() -> &'static str {
    match env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match env::consts::ARCH {
        "x86" => "386",
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "powerpc" => "ppc",
        "powerpc64" => "ppc64",
        "wasm32" => "wasm",
        other => other,
    }
}

/// Constraint lines found before the package clause.
#[derive(Debug, Default)]
struct Header<'a> {
    go_build: Option<&'a str>,
    plus_build: Vec<&'a str>,
}

impl<'a> Header<'a> {
    fn scan(source: &'a str) -> Self {
        let mut header = Header::default();
        let mut in_block = false;
        for line in source.lines() {
            let line = line.trim();
            if in_block {
                in_block = !line.contains("*/");
                continue;
            }
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix("//") {
                if let Some(expr) = comment.strip_prefix("go:build") {
                    if header.go_build.is_none() && starts_with_space(expr) {
                        header.go_build = Some(expr.trim());
                    }
                } else if let Some(expr) = comment.trim_start().strip_prefix("+build") {
                    if starts_with_space(expr) {
                        header.plus_build.push(expr.trim());
                    }
                }
                continue;
            }
            if line.starts_with("/*") {
                in_block = !line[2..].contains("*/");
                continue;
            }
            break;
        }
        header
    }
}

fn starts_with_space(rest: &str) -> bool {
    rest.starts_with(|c: char| c == ' ' || c == '\t')
}

/// A parsed `//go:build` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses `line` with Go precedence: `!` binds tighter than `&&`, which
    /// binds tighter than `||`.
    pub fn parse(line: &str) -> ConstraintResult<Self> {
        let tokens = tokenize(line)?;
        let mut parser = ExprParser {
            line,
            tokens,
            pos: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(parser.unexpected(token)),
        }
    }

    pub fn eval(&self, matches: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Tag(tag) => matches(tag),
            Expr::Not(inner) => !inner.eval(matches),
            Expr::And(lhs, rhs) => lhs.eval(matches) && rhs.eval(matches),
            Expr::Or(lhs, rhs) => lhs.eval(matches) || rhs.eval(matches),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Tag(tag) => tag,
            Token::Not => "!",
            Token::And => "&&",
            Token::Or => "||",
            Token::Open => "(",
            Token::Close => ")",
        }
    }
}

fn tokenize(line: &str) -> ConstraintResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let token = match c {
            ' ' | '\t' => continue,
            '!' => Token::Not,
            '(' => Token::Open,
            ')' => Token::Close,
            '&' | '|' => {
                if chars.next_if(|&(_, next)| next == c).is_none() {
                    return Err(ConstraintError::UnexpectedToken {
                        token: c.to_string(),
                        line: line.to_string(),
                    });
                }
                if c == '&' {
                    Token::And
                } else {
                    Token::Or
                }
            }
            c if is_tag_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some((idx, next)) = chars.next_if(|&(_, next)| is_tag_char(next)) {
                    end = idx + next.len_utf8();
                }
                Token::Tag(line[start..end].to_string())
            }
            other => {
                return Err(ConstraintError::UnexpectedToken {
                    token: other.to_string(),
                    line: line.to_string(),
                })
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

struct ExprParser<'a> {
    line: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> ConstraintResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ConstraintError::UnexpectedEnd(self.line.to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token) -> ConstraintError {
        ConstraintError::UnexpectedToken {
            token: token.text().to_string(),
            line: self.line.to_string(),
        }
    }

    fn or(&mut self) -> ConstraintResult<Expr> {
        let mut expr = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Expr::Or(Box::new(expr), Box::new(self.and()?));
        }
        Ok(expr)
    }

    fn and(&mut self) -> ConstraintResult<Expr> {
        let mut expr = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Expr::And(Box::new(expr), Box::new(self.not()?));
        }
        Ok(expr)
    }

    fn not(&mut self) -> ConstraintResult<Expr> {
        match self.next()? {
            Token::Not => Ok(Expr::Not(Box::new(self.not()?))),
            Token::Open => {
                let expr = self.or()?;
                match self.next()? {
                    Token::Close => Ok(expr),
                    other => Err(self.unexpected(&other)),
                }
            }
            Token::Tag(tag) => Ok(Expr::Tag(tag)),
            other => Err(self.unexpected(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> BuildContext {
        BuildContext::new("linux", "amd64")
    }

    #[test]
    fn test_file_name_suffixes() {
        let ctx = linux();
        assert!(ctx.matches_file_name("a.go"));
        assert!(ctx.matches_file_name("a_linux.go"));
        assert!(ctx.matches_file_name("a_amd64.go"));
        assert!(ctx.matches_file_name("a_linux_amd64.go"));
        assert!(ctx.matches_file_name("zsys_unix.go"));
        assert!(!ctx.matches_file_name("a_windows.go"));
        assert!(!ctx.matches_file_name("a_arm64.go"));
        assert!(!ctx.matches_file_name("a_windows_amd64.go"));
        assert!(!ctx.matches_file_name("a_linux_arm64.go"));
        assert!(ctx.matches_file_name("linux.go"));

        let android = BuildContext::new("android", "arm64");
        assert!(android.matches_file_name("a_linux.go"));
    }

    #[test]
    fn test_go_build_line() {
        let ctx = linux();
        assert!(!ctx.matches_source("//go:build ignore\n\npackage main\n").unwrap());
        assert!(!ctx.matches_source("//go:build windows\n\npackage a\n").unwrap());
        assert!(ctx.matches_source("//go:build linux && amd64\n\npackage a\n").unwrap());
        assert!(ctx.matches_source("//go:build !windows\n\npackage a\n").unwrap());
        assert!(ctx
            .matches_source("// Copyright\n\n//go:build (darwin || linux) && !cgo\n\npackage a\n")
            .unwrap());
        assert!(ctx.matches_source("//go:build go1.21\n\npackage a\n").unwrap());
        assert!(ctx.matches_source("package a\n").unwrap());
    }

    #[test]
    fn test_constraints_after_package_clause_ignored() {
        let src = "package a\n\n//go:build ignore\n";
        assert!(linux().matches_source(src).unwrap());
    }

    #[test]
    fn test_block_comment_header() {
        let src = "/* generated\n   code */\n//go:build windows\n\npackage a\n";
        assert!(!linux().matches_source(src).unwrap());
    }

    #[test]
    fn test_custom_tags() {
        let src = "//go:build integration\n\npackage a\n";
        assert!(!linux().matches_source(src).unwrap());
        assert!(linux().with_tags(["integration"]).matches_source(src).unwrap());
    }

    #[test]
    fn test_plus_build_lines() {
        let ctx = linux();
        assert!(ctx.matches_source("// +build linux darwin\n\npackage a\n").unwrap());
        assert!(!ctx.matches_source("// +build linux,386\n\npackage a\n").unwrap());
        assert!(!ctx
            .matches_source("// +build linux\n// +build !amd64\n\npackage a\n")
            .unwrap());
        // go:build takes precedence
        assert!(ctx
            .matches_source("//go:build linux\n// +build windows\n\npackage a\n")
            .unwrap());
    }

    #[test]
    fn test_expression_precedence() {
        let expr = Expr::parse("a || b && !c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Tag("a".into())),
                Box::new(Expr::And(
                    Box::new(Expr::Tag("b".into())),
                    Box::new(Expr::Not(Box::new(Expr::Tag("c".into())))),
                )),
            )
        );
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(matches!(Expr::parse("linux &&"), Err(ConstraintError::UnexpectedEnd(_))));
        assert!(matches!(
            Expr::parse("linux & amd64"),
            Err(ConstraintError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            Expr::parse("(linux"),
            Err(ConstraintError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            Expr::parse("linux)"),
            Err(ConstraintError::UnexpectedToken { ref token, .. }) if token == ")"
        ));
    }
}
