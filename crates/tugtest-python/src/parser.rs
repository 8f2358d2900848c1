//! Python source parsing and top-level function extraction.
//!
//! Uses tree-sitter's Python grammar. Only module-level `def` statements
//! (plain or decorated) are considered; methods and nested functions are
//! never returned. Functions whose parameter list uses anything other than
//! plain positional names are reported as [`FunctionItem::Skipped`] with a
//! reason, so callers can log the exclusion instead of silently dropping it.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

// ============================================================================
// Error Types
// ============================================================================

/// Errors produced while parsing Python source.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The source contains a syntax error.
    #[error("{}:{line}: invalid syntax near `{snippet}`", .path.display())]
    InvalidSyntax {
        path: PathBuf,
        line: u32,
        snippet: String,
    },

    /// The parser could not be configured or gave up.
    #[error("parser failure for {}: {reason}", .path.display())]
    ParserFailure { path: PathBuf, reason: String },

    /// The source file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Path of the file that failed to parse.
    pub fn path(&self) -> &Path {
        match self {
            ParseError::InvalidSyntax { path, .. }
            | ParseError::ParserFailure { path, .. }
            | ParseError::Read { path, .. } => path,
        }
    }
}

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

// ============================================================================
// Function Model
// ============================================================================

/// A statement in a function body, as seen by the complexity analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Grammar kind (e.g. `return_statement`, `if_statement`).
    pub kind: String,
    /// 1-based line.
    pub line: u32,
}

/// A top-level function eligible for test synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    /// Positional parameter names in declaration order.
    pub params: Vec<String>,
    /// 1-based line of the `def` keyword.
    pub line: u32,
    /// Source text of the definition, decorators included.
    pub source: String,
    /// Body statements in order, comments excluded.
    pub body: Vec<Statement>,
}

/// Why a top-level function was excluded from synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `async def` functions cannot be invoked synchronously.
    Async,
    /// Parameter declares a default value.
    DefaultValue(String),
    /// `*args` style parameter.
    VarArgs(String),
    /// `**kwargs` style parameter.
    KwArgs(String),
    /// Bare `*` marker introducing keyword-only parameters.
    KeywordOnlyMarker,
    /// `/` marker introducing positional-only parameters.
    PositionalOnlyMarker,
    /// Any other parameter form the grammar can produce.
    Unrecognized(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Async => write!(f, "async function"),
            SkipReason::DefaultValue(name) => write!(f, "default value for parameter '{}'", name),
            SkipReason::VarArgs(name) => write!(f, "variadic parameter '*{}'", name),
            SkipReason::KwArgs(name) => write!(f, "keyword parameter '**{}'", name),
            SkipReason::KeywordOnlyMarker => write!(f, "keyword-only parameters"),
            SkipReason::PositionalOnlyMarker => write!(f, "positional-only marker"),
            SkipReason::Unrecognized(text) => write!(f, "unsupported parameter `{}`", text),
        }
    }
}

/// One top-level function, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionItem {
    Eligible(FunctionSignature),
    Skipped {
        name: String,
        line: u32,
        reason: SkipReason,
    },
}

impl FunctionItem {
    /// Function name.
    pub fn name(&self) -> &str {
        match self {
            FunctionItem::Eligible(sig) => &sig.name,
            FunctionItem::Skipped { name, .. } => name,
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Python parser.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    /// Create a new Python parser.
    pub fn new() -> ParseResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::ParserFailure {
                path: PathBuf::new(),
                reason: format!("failed to set language: {}", e),
            })?;
        Ok(PythonParser { parser })
    }

    /// Read and parse a file.
    pub fn parse_file(&mut self, path: &Path) -> ParseResult<SourceFile> {
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(path, text)
    }

    /// Parse source text; `path` is used for error reporting and naming.
    pub fn parse(&mut self, path: &Path, text: String) -> ParseResult<SourceFile> {
        let tree = self
            .parser
            .parse(&text, None)
            .ok_or_else(|| ParseError::ParserFailure {
                path: path.to_path_buf(),
                reason: "parser returned no tree".to_string(),
            })?;

        let root = tree.root_node();
        let error = if root.has_error() {
            Some(first_error(root, text.as_bytes()))
        } else {
            python2_statement(root, text.as_bytes())
        };
        if let Some((line, snippet)) = error {
            return Err(ParseError::InvalidSyntax {
                path: path.to_path_buf(),
                line,
                snippet,
            });
        }

        Ok(SourceFile {
            path: path.to_path_buf(),
            text,
            tree,
        })
    }
}

/// A parsed Python source file. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    text: String,
    tree: Tree,
}

impl SourceFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Module name: the file stem (`string_utils` for `string_utils.py`).
    pub fn module_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Top-level function definitions in declaration order.
    pub fn functions(&self) -> Vec<FunctionItem> {
        let source = self.text.as_bytes();
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let mut items = Vec::new();

        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "function_definition" => items.push(function_item(child, child, source)),
                "decorated_definition" => {
                    if let Some(def) = child.child_by_field_name("definition") {
                        if def.kind() == "function_definition" {
                            items.push(function_item(child, def, source));
                        }
                    }
                }
                _ => {}
            }
        }

        items
    }
}

/// Build a function item. `outer` spans the decorators (if any), `def` is the
/// `function_definition` node itself.
fn function_item(outer: Node, def: Node, source: &[u8]) -> FunctionItem {
    let name = def
        .child_by_field_name("name")
        .map(|n| node_text(n, source))
        .unwrap_or_default();
    let line = def.start_position().row as u32 + 1;

    if def.child(0).is_some_and(|c| c.kind() == "async") {
        return FunctionItem::Skipped {
            name,
            line,
            reason: SkipReason::Async,
        };
    }

    let params = match def.child_by_field_name("parameters") {
        Some(params) => match positional_params(params, source) {
            Ok(params) => params,
            Err(reason) => return FunctionItem::Skipped { name, line, reason },
        },
        None => Vec::new(),
    };

    let body = def
        .child_by_field_name("body")
        .map(body_statements)
        .unwrap_or_default();

    FunctionItem::Eligible(FunctionSignature {
        name,
        params,
        line,
        source: node_text(outer, source),
        body,
    })
}

/// Collect plain positional parameter names, rejecting every other form.
fn positional_params(params: Node, source: &[u8]) -> Result<Vec<String>, SkipReason> {
    let mut cursor = params.walk();
    let mut names = Vec::new();

    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => names.push(node_text(param, source)),
            "typed_parameter" => {
                // `x: int` is positional; `*args: int` is not
                match param.named_child(0) {
                    Some(inner) if inner.kind() == "identifier" => {
                        names.push(node_text(inner, source))
                    }
                    Some(inner) => return Err(splat_reason(inner, source)),
                    None => return Err(SkipReason::Unrecognized(node_text(param, source))),
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                let name = param
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source))
                    .unwrap_or_else(|| node_text(param, source));
                return Err(SkipReason::DefaultValue(name));
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                return Err(splat_reason(param, source))
            }
            "keyword_separator" => return Err(SkipReason::KeywordOnlyMarker),
            "positional_separator" => return Err(SkipReason::PositionalOnlyMarker),
            "comment" => {}
            _ => return Err(SkipReason::Unrecognized(node_text(param, source))),
        }
    }

    Ok(names)
}

fn splat_reason(node: Node, source: &[u8]) -> SkipReason {
    let inner = node
        .named_child(0)
        .map(|n| node_text(n, source))
        .unwrap_or_default();
    match node.kind() {
        "list_splat_pattern" => SkipReason::VarArgs(inner),
        "dictionary_splat_pattern" => SkipReason::KwArgs(inner),
        _ => SkipReason::Unrecognized(node_text(node, source)),
    }
}

fn body_statements(block: Node) -> Vec<Statement> {
    let mut cursor = block.walk();
    block
        .named_children(&mut cursor)
        .filter(|stmt| stmt.kind() != "comment")
        .map(|stmt| Statement {
            kind: stmt.kind().to_string(),
            line: stmt.start_position().row as u32 + 1,
        })
        .collect()
}

fn node_text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}

/// Locate the first error or missing node for the diagnostic.
fn first_error(root: Node, source: &[u8]) -> (u32, String) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return (node.start_position().row as u32 + 1, snippet(node, source));
        }
        if node.has_error() {
            // Visit children left-to-right.
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    (root.start_position().row as u32 + 1, String::new())
}

/// The grammar still accepts `print x` and `exec code`; Python 3 does not.
fn python2_statement(root: Node, source: &[u8]) -> Option<(u32, String)> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if matches!(node.kind(), "print_statement" | "exec_statement") {
            return Some((node.start_position().row as u32 + 1, snippet(node, source)));
        }
        if cursor.goto_first_child() || cursor.goto_next_sibling() {
            continue;
        }
        loop {
            if !cursor.goto_parent() {
                return None;
            }
            if cursor.goto_next_sibling() {
                break;
            }
        }
    }
}

fn snippet(node: Node, source: &[u8]) -> String {
    node_text(node, source)
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(40)
        .collect()
}

/// Check that `text` is syntactically valid Python.
pub fn check_syntax(path: &Path, text: &str) -> ParseResult<()> {
    PythonParser::new()?.parse(path, text.to_string()).map(|_| ())
}

// ============================================================================
// Tests
// ============================================================================
