use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::primitives::bind_basic_name;
use crate::provider::{
    BasicKind, Declaration, FieldDecl, Import, PackageIndex, Scope, SourceLoader, TypeDecl,
    TypeDeclKind, TypeExpr, TypeIdentity, TypeProvider, TypeRef,
};

static PACKAGE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^package\s+(\w+)").unwrap());

static MODULE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*module\s+(\S+)").unwrap());

static IMPORT_SPEC_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:([\w.]+)\s+)?"([^"]+)""#).unwrap());

static FUNC_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^func\s+(?:\([^)]*\)\s*)?(\w+)").unwrap());

static FIELD_NAMES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(\w+(?:\s*,\s*\w+)*)\s+(\S.*)$").unwrap());

/// Scans Go sources for annotated functions and type declarations.
///
/// This is a line-oriented reader, not a type checker: it understands
/// package clauses, imports, `func` headers with their doc comments and
/// `type` declarations, and skips over everything else.
pub struct GoSourceLoader {
    index: PackageIndex,
    declarations: Vec<Declaration>,
    file_count: usize,
}

impl GoSourceLoader {
    /// Loads every `.go` file under `dirs`, skipping tests, `vendor`,
    /// `testdata`, hidden directories and anything under `exclude_dirs`
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(dirs: &[P], exclude_dirs: &[Q]) -> Result<Self> {
        let files = collect_go_files(dirs, exclude_dirs)?;
        info!("Scanning {} Go files", files.len());

        let mut modules = ModuleCache::default();
        let mut index = PackageIndex::new();
        let mut declarations = Vec::new();

        for path in &files {
            let source = fs::read_to_string(path).map_err(|e| Error::load(path, e.to_string()))?;
            let package_path = modules.package_path(path);
            let parsed = parse_go_source(path, &source, package_path.as_deref())?;
            debug!(
                "{}: package {}, {} types, {} annotated functions",
                path.display(),
                parsed.package_path,
                parsed.types.len(),
                parsed.declarations.len()
            );

            index.add_package(&parsed.package_path, &parsed.package_name);
            for decl in parsed.types {
                index.insert(&parsed.package_name, decl);
            }
            declarations.extend(parsed.declarations);
        }
        info!(
            "Indexed {} types in {} packages",
            index.type_count(),
            index.packages().count()
        );

        Ok(Self {
            index,
            declarations,
            file_count: files.len(),
        })
    }

    pub fn index(&self) -> &PackageIndex {
        &self.index
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }
}

impl SourceLoader for GoSourceLoader {
    fn declarations(&self) -> Result<Vec<Declaration>> {
        Ok(self.declarations.clone())
    }
}

impl TypeProvider for GoSourceLoader {
    fn lookup(&self, identity: &TypeIdentity) -> Option<&TypeDecl> {
        self.index.lookup(identity)
    }

    fn resolve_name(&self, scope: &Scope, name: &str) -> Option<TypeIdentity> {
        self.index.resolve_name(scope, name)
    }
}

/// Every Go source file under `dirs`, sorted and de-duplicated
fn collect_go_files<P: AsRef<Path>, Q: AsRef<Path>>(
    dirs: &[P],
    exclude_dirs: &[Q],
) -> Result<Vec<PathBuf>> {
    let excluded: Vec<&Path> = exclude_dirs.iter().map(AsRef::as_ref).collect();
    let mut files = Vec::new();

    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(Error::load(dir, "no such file or directory"));
        }

        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e, &excluded));

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && is_go_source(path) {
                files.push(path.to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_skipped_dir(entry: &DirEntry, excluded: &[&Path]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') || name.starts_with('_') || name == "vendor" || name == "testdata" {
        return true;
    }
    let path = entry.path();
    let skip = excluded
        .iter()
        .any(|ex| path.starts_with(ex) || path.ends_with(ex));
    if skip {
        debug!("Skipping excluded directory: {:?}", path);
    }
    skip
}

fn is_go_source(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".go") && !name.ends_with("_test.go")
}

/// Maps directories to import paths through the nearest `go.mod`
#[derive(Default)]
struct ModuleCache {
    /// Module root directory to module path, `None` when no go.mod was found
    roots: HashMap<PathBuf, Option<(PathBuf, String)>>,
}

impl ModuleCache {
    fn package_path(&mut self, file: &Path) -> Option<String> {
        let dir = fs::canonicalize(file.parent()?).ok()?;
        let (root, module) = self.module_for(&dir)?;
        let relative = dir.strip_prefix(&root).ok()?;
        let mut path = module;
        for component in relative.components() {
            path.push('/');
            path.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(path)
    }

    fn module_for(&mut self, dir: &Path) -> Option<(PathBuf, String)> {
        if let Some(cached) = self.roots.get(dir) {
            return cached.clone();
        }

        let found = dir.ancestors().find_map(|ancestor| {
            let content = fs::read_to_string(ancestor.join("go.mod")).ok()?;
            let module = MODULE_REGEX.captures(&content)?[1].trim_matches('"').to_string();
            Some((ancestor.to_path_buf(), module))
        });
        if found.is_none() {
            warn!("No go.mod above {}, using package names as import paths", dir.display());
        }

        self.roots.insert(dir.to_path_buf(), found.clone());
        found
    }
}

/// Contents of one Go file
#[derive(Debug, Default)]
pub struct ParsedGoFile {
    pub package_name: String,
    pub package_path: String,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDecl>,
    pub declarations: Vec<Declaration>,
}

/// Parses one Go source file.
///
/// `package_path` is the import path of the file's directory; without it
/// the package clause name is used.
pub fn parse_go_source(path: &Path, source: &str, package_path: Option<&str>) -> Result<ParsedGoFile> {
    let lines: Vec<&str> = source.lines().collect();
    let mut file = ParsedGoFile::default();
    let mut scope = Scope::default();

    let mut lex = LexState::default();
    let mut depth: i32 = 0;
    let mut doc: Vec<String> = Vec::new();
    let mut in_import_group = false;
    let mut in_type_group = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        i += 1;

        if depth > 0 || lex.in_raw_string {
            depth += lex.brace_delta(line);
            continue;
        }
        if lex.in_block_comment {
            doc.push(line.to_string());
            lex.brace_delta(line);
            continue;
        }

        if trimmed.is_empty() {
            doc.clear();
            continue;
        }
        if trimmed.starts_with("//") {
            doc.push(line.to_string());
            continue;
        }
        if trimmed.starts_with("/*") {
            doc.push(line.to_string());
            lex.brace_delta(line);
            continue;
        }

        let code = strip_line_comment(trimmed);

        if in_import_group {
            if code.starts_with(')') {
                in_import_group = false;
            } else if let Some(import) = parse_import_spec(code) {
                scope.imports.push(import);
            }
            continue;
        }

        if in_type_group {
            if code.starts_with(')') {
                in_type_group = false;
            } else {
                let (decl, next) = parse_type_spec(path, &lines, i, code, &scope)?;
                file.types.extend(decl);
                i = next;
            }
            doc.clear();
            continue;
        }

        if let Some(captures) = PACKAGE_REGEX.captures(code) {
            file.package_name = captures[1].to_string();
            file.package_path = package_path
                .map(str::to_string)
                .unwrap_or_else(|| file.package_name.clone());
            scope.package = file.package_path.clone();
            doc.clear();
            continue;
        }

        if file.package_name.is_empty() {
            return Err(Error::load(path, "code before the package clause"));
        }

        if let Some(rest) = code
            .strip_prefix("import")
            .filter(|rest| rest.starts_with([' ', '\t', '(']))
        {
            let rest = rest.trim();
            if rest.starts_with('(') {
                in_import_group = !rest.ends_with(')');
            } else if let Some(import) = parse_import_spec(rest) {
                scope.imports.push(import);
            }
            doc.clear();
            continue;
        }

        if let Some(rest) = code.strip_prefix("type ").or_else(|| code.strip_prefix("type(")) {
            let rest = rest.trim();
            if code.starts_with("type(") || rest.starts_with('(') {
                in_type_group = true;
            } else {
                let (decl, next) = parse_type_spec(path, &lines, i, rest, &scope)?;
                file.types.extend(decl);
                i = next;
            }
            doc.clear();
            continue;
        }

        if let Some(captures) = FUNC_REGEX.captures(code) {
            let name = captures[1].to_string();
            let is_entry = file.package_name == "main" && name == "main";
            if !doc.is_empty() {
                file.declarations.push(Declaration {
                    scope: scope.clone(),
                    name,
                    is_entry,
                    doc: std::mem::take(&mut doc),
                });
            }
        }

        doc.clear();
        depth += lex.brace_delta(line);
    }

    if depth != 0 || lex.in_raw_string || lex.in_block_comment {
        return Err(Error::load(path, "unbalanced braces or unterminated literal"));
    }
    if file.package_name.is_empty() {
        return Err(Error::load(path, "missing package clause"));
    }

    file.imports = scope.imports;
    Ok(file)
}

fn parse_import_spec(spec: &str) -> Option<Import> {
    let captures = IMPORT_SPEC_REGEX.captures(spec.trim())?;
    Some(Import {
        alias: captures.get(1).map(|m| m.as_str().to_string()),
        path: captures[2].to_string(),
    })
}

/// Parses `Name[TypeParams] Type` starting at `text`, pulling further lines
/// from `lines[next..]` while braces are open. Returns the declaration and
/// the index of the first line not consumed.
fn parse_type_spec(
    path: &Path,
    lines: &[&str],
    mut next: usize,
    text: &str,
    scope: &Scope,
) -> Result<(Option<TypeDecl>, usize)> {
    let text = strip_line_comment(text.trim());
    let name_len = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    let name = &text[..name_len];
    if name.is_empty() {
        warn!("{}: cannot read type declaration '{}'", path.display(), text);
        return Ok((None, next));
    }

    let mut rest = &text[name_len..];
    let mut type_params = Vec::new();
    if rest.starts_with('[') {
        if let Some(close) = closing_bracket(rest) {
            let inner = &rest[1..close];
            if inner.contains(char::is_whitespace) {
                type_params = parse_type_params(inner);
                rest = &rest[close + 1..];
            }
        }
    }
    let rest = rest.trim();
    let rest = rest.strip_prefix('=').map(str::trim).unwrap_or(rest);

    let mut body = rest.to_string();
    let mut lex = LexState::default();
    let mut open = lex.brace_delta(rest);
    while open > 0 || lex.in_raw_string {
        let Some(line) = lines.get(next) else {
            return Err(Error::load(path, format!("unbalanced braces in type {}", name)));
        };
        body.push('\n');
        body.push_str(line);
        open += lex.brace_delta(line);
        next += 1;
    }

    let ctx = BindContext {
        scope,
        type_params: &type_params,
    };
    let kind = match struct_body(&body) {
        Some(fields) => TypeDeclKind::Struct(ctx.parse_fields(fields)),
        None => TypeDeclKind::Alias(ctx.bind_text(&body)),
    };

    Ok((
        Some(TypeDecl {
            identity: TypeIdentity::new(&scope.package, name),
            type_params,
            kind,
        }),
        next,
    ))
}

/// `K comparable, V any` -> `[K, V]`; `A, B any` -> `[A, B]`
fn parse_type_params(inner: &str) -> Vec<String> {
    crate::provider::split_top_level(inner)
        .iter()
        .filter_map(|part| part.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Text between the braces of `struct { ... }`
fn struct_body(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("struct")?.trim_start();
    let open = rest.find('{')?;
    let close = rest.rfind('}')?;
    (open < close && rest[..open].trim().is_empty()).then(|| &rest[open + 1..close])
}

/// Names visible while binding the type expressions of one declaration
struct BindContext<'a> {
    scope: &'a Scope,
    type_params: &'a [String],
}

impl BindContext<'_> {
    fn parse_fields(&self, body: &str) -> Vec<FieldDecl> {
        split_statements(body)
            .iter()
            .flat_map(|statement| self.parse_field(statement))
            .collect()
    }

    /// One field statement: `A, B int \`tag\``, `*Embedded`, `Meta struct {...}`
    fn parse_field(&self, statement: &str) -> Vec<FieldDecl> {
        let (decl, tag) = split_tag(statement);

        let Some(captures) = FIELD_NAMES_REGEX.captures(decl) else {
            let name = embedded_name(decl);
            return vec![FieldDecl {
                exported: is_exported(&name),
                name,
                ty: self.bind_text(decl),
                tag,
                embedded: true,
            }];
        };

        let ty = self.bind_text(&captures[2]);
        captures[1]
            .split(',')
            .map(str::trim)
            .map(|name| FieldDecl {
                name: name.to_string(),
                ty: ty.clone(),
                tag: tag.clone(),
                exported: is_exported(name),
                embedded: false,
            })
            .collect()
    }

    fn bind_text(&self, text: &str) -> TypeExpr {
        let text = text.trim();
        if let Some(fields) = struct_body(text) {
            return TypeExpr::Struct(self.parse_fields(fields));
        }
        match TypeRef::parse(text) {
            Some(type_ref) => self.bind(&type_ref),
            None => {
                debug!("Unsupported type expression '{}'", text);
                TypeExpr::Unresolved(text.to_string())
            }
        }
    }

    /// Generic arguments keep the spelling of predeclared names
    fn bind_arg(&self, type_ref: &TypeRef) -> TypeExpr {
        match type_ref {
            TypeRef::Name {
                qualifier: None,
                name,
                args,
            } if args.is_empty() && !self.type_params.contains(name) => {
                bind_basic_name(name).unwrap_or_else(|| self.bind(type_ref))
            }
            _ => self.bind(type_ref),
        }
    }

    fn bind(&self, type_ref: &TypeRef) -> TypeExpr {
        match type_ref {
            TypeRef::Name {
                qualifier: None,
                name,
                args,
            } => {
                if args.is_empty() {
                    if let Some(index) = self.type_params.iter().position(|p| p == name) {
                        return TypeExpr::TypeParam {
                            name: name.clone(),
                            index,
                        };
                    }
                    if name == "any" || name == "error" {
                        return TypeExpr::Interface;
                    }
                    if let Some(kind) = BasicKind::from_go_name(name) {
                        return TypeExpr::Basic(kind);
                    }
                }
                TypeExpr::Named {
                    identity: TypeIdentity::new(&self.scope.package, name),
                    args: args.iter().map(|a| self.bind_arg(a)).collect(),
                }
            }
            TypeRef::Name {
                qualifier: Some(qualifier),
                name,
                args,
            } => match self.scope.import_path(qualifier) {
                Some(package) => TypeExpr::Named {
                    identity: TypeIdentity::new(package, name),
                    args: args.iter().map(|a| self.bind_arg(a)).collect(),
                },
                None => TypeExpr::Unresolved(format!("{}.{}", qualifier, name)),
            },
            TypeRef::Slice(inner) => match inner.as_ref() {
                TypeRef::Name {
                    qualifier: None,
                    name,
                    ..
                } if name == "byte" || name == "uint8" => TypeExpr::Basic(BasicKind::Bytes),
                inner => TypeExpr::Slice(Box::new(self.bind(inner))),
            },
            TypeRef::Pointer(inner) => TypeExpr::Pointer(Box::new(self.bind(inner))),
            TypeRef::Array(inner, len) => TypeExpr::Array(Box::new(self.bind(inner)), *len),
            TypeRef::Map(key, value) => {
                TypeExpr::Map(Box::new(self.bind(key)), Box::new(self.bind(value)))
            }
            TypeRef::Interface => TypeExpr::Interface,
        }
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Field name an embedded type is promoted under: `*pkg.Base[T]` -> `Base`
fn embedded_name(decl: &str) -> String {
    let decl = decl.trim().trim_start_matches('*');
    let decl = decl.split('[').next().unwrap_or(decl);
    decl.rsplit('.').next().unwrap_or(decl).to_string()
}

/// Splits a trailing raw-string tag off a field statement
fn split_tag(statement: &str) -> (&str, String) {
    let statement = statement.trim();
    if let Some(without_close) = statement.strip_suffix('`') {
        if let Some(open) = without_close.rfind('`') {
            return (
                without_close[..open].trim_end(),
                without_close[open + 1..].to_string(),
            );
        }
    }
    (statement, String::new())
}

/// Splits a struct body into field statements on newlines and semicolons
/// outside nested braces, dropping comments
fn split_statements(body: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '`' => {
                current.push(c);
                for n in chars.by_ref() {
                    current.push(n);
                    if n == '`' {
                        break;
                    }
                }
            }
            '"' => {
                current.push(c);
                while let Some(n) = chars.next() {
                    current.push(n);
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if n == '"' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            '{' | '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' | ')' => {
                depth -= 1;
                current.push(c);
            }
            '\n' | ';' if depth <= 0 => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
            }
            c => current.push(c),
        }
    }

    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    statements
}

/// Index of the `]` matching the `[` that starts `text`
fn closing_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes a trailing `//` comment that is not inside a literal
fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let bytes: Vec<(usize, char)> = line.char_indices().collect();

    for (pos, &(i, c)) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' && q != '`' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' | '`' => quote = Some(c),
                '/' if bytes.get(pos + 1).is_some_and(|&(_, n)| n == '/') => {
                    return line[..i].trim_end();
                }
                _ => {}
            },
        }
    }
    line
}

/// Lexical state carried across lines while counting braces
#[derive(Debug, Default)]
struct LexState {
    in_raw_string: bool,
    in_block_comment: bool,
}

impl LexState {
    /// Net change in brace depth over `line`, ignoring literals and comments
    fn brace_delta(&mut self, line: &str) -> i32 {
        let mut delta = 0;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if self.in_raw_string {
                if c == '`' {
                    self.in_raw_string = false;
                }
                continue;
            }
            match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                '`' => self.in_raw_string = true,
                '"' | '\'' => {
                    while let Some(n) = chars.next() {
                        if n == '\\' {
                            chars.next();
                        } else if n == c {
                            break;
                        }
                    }
                }
                '{' => delta += 1,
                '}' => delta -= 1,
                _ => {}
            }
        }

        delta
    }
}
