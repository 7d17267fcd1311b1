//! Go syntax extraction using tree-sitter.
//!
//! Walks a parsed Go file and reduces it to the ordered [`Fact`] sequence the
//! graph builder consumes: package marker, file marker, then imports,
//! declarations, and outbound references to imported packages in source
//! order.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tree_sitter::{Node, Parser};

use super::types::{DeclKind, Fact, TypeExpr};
use super::{ParseError, ParseResult};

/// Produces the structural facts for a single source file.
///
/// Implementations must emit the package marker first and the file marker
/// second; every other fact belongs to that file.
pub trait SyntaxExtractor: Send + Sync {
    /// Extracts the facts for the file at `path`.
    fn extract(&self, path: &Path) -> ParseResult<Vec<Fact>>;
}

/// Extractor for Go source files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoExtractor;

impl GoExtractor {
    pub fn new() -> Self {
        Self
    }

    fn parser() -> ParseResult<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|_| ParseError::LanguageInit)?;
        Ok(parser)
    }

    /// Extracts facts from in-memory source attributed to `path`.
    pub fn extract_source(&self, path: &Path, source: &str) -> ParseResult<Vec<Fact>> {
        let mut parser = Self::parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParseError::ParseFailed(path.display().to_string()))?;
        let root = tree.root_node();

        if root.has_error() {
            let (line, column) = first_error(root)
                .map(|node| {
                    let pos = node.start_position();
                    (pos.row + 1, pos.column + 1)
                })
                .unwrap_or((0, 0));
            return Err(ParseError::Syntax {
                path: path.display().to_string(),
                line,
                column,
            });
        }

        let mut walker = FileWalker::new(source);
        let package_name = walker
            .package_name(root)
            .ok_or_else(|| ParseError::MissingPackageClause(path.display().to_string()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        walker.facts.push(Fact::package(dir, package_name));
        walker.facts.push(Fact::file(path));
        walker.visit(root);

        Ok(walker.facts)
    }
}

impl SyntaxExtractor for GoExtractor {
    fn extract(&self, path: &Path) -> ParseResult<Vec<Fact>> {
        let content = fs::read_to_string(path)?;
        self.extract_source(path, &content)
    }
}

/// Finds the first error or missing node below `node`.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// Per-file traversal state.
struct FileWalker<'a> {
    source: &'a str,
    facts: Vec<Fact>,
    /// Names under which imports are visible in this file
    imports: HashSet<String>,
    /// Enclosing function scopes, outermost first
    scopes: Vec<String>,
    /// Function literal counters, one per open scope
    literal_counts: Vec<usize>,
    top_level_literals: usize,
}

impl<'a> FileWalker<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            facts: Vec::new(),
            imports: HashSet::new(),
            scopes: Vec::new(),
            literal_counts: Vec::new(),
            top_level_literals: 0,
        }
    }

    fn node_text(&self, node: Node<'_>) -> Option<&'a str> {
        self.source.get(node.start_byte()..node.end_byte())
    }

    fn package_name(&self, root: Node<'_>) -> Option<String> {
        let mut cursor = root.walk();
        let clause = root
            .children(&mut cursor)
            .find(|child| child.kind() == "package_clause")?;
        let mut clause_cursor = clause.walk();
        let ident = clause
            .named_children(&mut clause_cursor)
            .find(|child| child.kind() == "package_identifier" || child.kind() == "identifier")?;
        self.node_text(ident).map(str::to_string)
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_spec" => {
                self.import_spec(node);
                return;
            }
            "function_declaration" => {
                if let Some(name) = self.field_text(node, "name") {
                    self.push_decl(DeclKind::Func, name.to_string(), None);
                    self.enter_scope(name.to_string());
                    self.visit_children(node);
                    self.exit_scope();
                    return;
                }
            }
            "method_declaration" => {
                if let Some(name) = self.field_text(node, "name") {
                    let receiver = self.receiver_type(node);
                    let scope_name = match receiver.base_name() {
                        Ok(base) => format!("{}.{}", base, name),
                        Err(_) => name.to_string(),
                    };
                    self.push_decl(DeclKind::Func, name.to_string(), Some(receiver));
                    self.enter_scope(scope_name);
                    self.visit_children(node);
                    self.exit_scope();
                    return;
                }
            }
            "func_literal" => {
                let counter = match self.literal_counts.last_mut() {
                    Some(count) => count,
                    None => &mut self.top_level_literals,
                };
                let name = counter.to_string();
                *counter += 1;
                self.enter_scope(name);
                self.visit_children(node);
                self.exit_scope();
                return;
            }
            "const_spec" => self.named_decls(node, DeclKind::Const),
            "var_spec" => self.named_decls(node, DeclKind::Var),
            "type_spec" | "type_alias" => self.named_decls(node, DeclKind::Type),
            "selector_expression" => {
                if let (Some(operand), Some(field)) = (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("field"),
                ) {
                    if operand.kind() == "identifier" {
                        self.push_reference(operand, field);
                    }
                }
            }
            "qualified_type" => {
                if let (Some(package), Some(name)) = (
                    node.child_by_field_name("package"),
                    node.child_by_field_name("name"),
                ) {
                    self.push_reference(package, name);
                }
            }
            _ => {}
        }

        self.visit_children(node);
    }

    fn visit_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field)
            .and_then(|child| self.node_text(child))
    }

    fn enter_scope(&mut self, name: String) {
        self.scopes.push(name);
        self.literal_counts.push(0);
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
        self.literal_counts.pop();
    }

    fn push_decl(&mut self, kind: DeclKind, name: String, receiver: Option<TypeExpr>) {
        self.facts.push(Fact::Decl {
            kind,
            name,
            receiver,
            scope: self.scopes.clone(),
        });
    }

    fn named_decls(&mut self, node: Node<'_>, kind: DeclKind) {
        let mut cursor = node.walk();
        let names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|child| self.node_text(child))
            .map(str::to_string)
            .collect();
        for name in names {
            self.push_decl(kind, name, None);
        }
    }

    fn push_reference(&mut self, qualifier: Node<'_>, name: Node<'_>) {
        let (Some(qualifier), Some(name)) = (self.node_text(qualifier), self.node_text(name)) else {
            return;
        };
        // Selectors on local variables are not package references
        if !self.imports.contains(qualifier) {
            return;
        }
        self.facts.push(Fact::reference(qualifier, name));
    }

    fn import_spec(&mut self, node: Node<'_>) {
        let Some(raw_path) = self.field_text(node, "path") else {
            return;
        };
        let path = raw_path.trim_matches(['"', '`']).to_string();
        let alias = self.field_text(node, "name").map(str::to_string);

        match alias.as_deref() {
            Some("_") | Some(".") => {}
            Some(alias) => {
                self.imports.insert(alias.to_string());
            }
            None => {
                let leaf = path.rsplit('/').next().unwrap_or(&path);
                self.imports.insert(leaf.to_string());
            }
        }

        self.facts.push(Fact::Import { path, alias });
    }

    fn receiver_type(&self, method: Node<'_>) -> TypeExpr {
        let Some(params) = method.child_by_field_name("receiver") else {
            return TypeExpr::Other("missing receiver".to_string());
        };
        let mut cursor = params.walk();
        let param = params.named_children(&mut cursor).find(|child| {
            matches!(
                child.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            )
        });
        match param.and_then(|p| p.child_by_field_name("type")) {
            Some(typ) => self.type_expr(typ),
            None => TypeExpr::Other("empty receiver".to_string()),
        }
    }

    fn type_expr(&self, node: Node<'_>) -> TypeExpr {
        match node.kind() {
            "type_identifier" | "identifier" => {
                TypeExpr::Ident(self.node_text(node).unwrap_or_default().to_string())
            }
            "pointer_type" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).next();
                TypeExpr::Pointer(inner.map(|inner| Box::new(self.type_expr(inner))))
            }
            "generic_type" => {
                let base = node
                    .child_by_field_name("type")
                    .map(|base| self.type_expr(base))
                    .unwrap_or_else(|| TypeExpr::Other("generic_type".to_string()));
                let args = node
                    .child_by_field_name("type_arguments")
                    .map(|list| {
                        let mut cursor = list.walk();
                        let items: Vec<_> = list.named_children(&mut cursor).collect();
                        items.into_iter().map(|item| self.type_expr(item)).collect()
                    })
                    .unwrap_or_default();
                TypeExpr::Generic {
                    base: Box::new(base),
                    args,
                }
            }
            "parenthesized_type" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).next();
                match inner {
                    Some(inner) => self.type_expr(inner),
                    None => TypeExpr::Other("parenthesized_type".to_string()),
                }
            }
            other => TypeExpr::Other(other.to_string()),
        }
    }
}
