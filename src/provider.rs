//! Contracts between the interpreters and whatever knows the host source:
//! declarations with their comment blocks, type declarations, and
//! name resolution under an import scope.

use indexmap::IndexMap;
use log::debug;
use std::fmt;

use crate::error::Result;

/// Package path plus short type name; the true identity of a declared type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentity {
    pub package: String,
    pub name: String,
}

impl TypeIdentity {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.package.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.package, self.name)
        }
    }
}

/// One import of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub alias: Option<String>,
    pub path: String,
}

impl Import {
    /// Name the import is referred to by inside the file
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }
}

/// Import context a declaration was written in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub package: String,
    pub imports: Vec<Import>,
}

impl Scope {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            imports: Vec::new(),
        }
    }

    pub fn with_import(mut self, alias: Option<&str>, path: &str) -> Self {
        self.imports.push(Import {
            alias: alias.map(str::to_string),
            path: path.to_string(),
        });
        self
    }

    /// Import path bound to `qualifier` in this scope
    pub fn import_path(&self, qualifier: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|i| i.local_name() == qualifier)
            .map(|i| i.path.as_str())
    }
}

/// Scalar kinds of the host language, already collapsed to schema widths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicKind {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
}

impl BasicKind {
    /// Go predeclared type name to its kind
    pub fn from_go_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Self::Bool),
            "int" | "int8" | "int16" | "int32" | "rune" | "uint" | "uint8" | "uint16"
            | "uint32" | "byte" | "uintptr" => Some(Self::Int32),
            "int64" | "uint64" => Some(Self::Int64),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

/// A type expression with every name bound to an identity
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Basic(BasicKind),
    /// A primitive alias written in an annotation (`uuid`, `date-time`, ...)
    Primitive(String),
    Named {
        identity: TypeIdentity,
        args: Vec<TypeExpr>,
    },
    /// A name that could not be bound; resolves to a placeholder
    Unresolved(String),
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    Array(Box<TypeExpr>, u64),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Interface,
    Struct(Vec<FieldDecl>),
    TypeParam {
        name: String,
        index: usize,
    },
}

/// One field of a struct declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    /// Raw serialization tag text, without the surrounding backquotes
    pub tag: String,
    pub exported: bool,
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDeclKind {
    Struct(Vec<FieldDecl>),
    /// Any non-struct named type (`type Status string`, `type IDs = []int`)
    Alias(TypeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub identity: TypeIdentity,
    /// Type parameter names, by position
    pub type_params: Vec<String>,
    pub kind: TypeDeclKind,
}

/// A declaration and the comment block attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub scope: Scope,
    pub name: String,
    /// The program entry point, which carries the global annotations
    pub is_entry: bool,
    pub doc: Vec<String>,
}

/// Type introspection the schema resolver depends on
pub trait TypeProvider {
    /// Declaration of a fully-qualified type
    fn lookup(&self, identity: &TypeIdentity) -> Option<&TypeDecl>;

    /// Binds a possibly-qualified short name used in `scope` to an identity
    fn resolve_name(&self, scope: &Scope, name: &str) -> Option<TypeIdentity>;
}

/// Source of declarations, in a stable order
pub trait SourceLoader {
    fn declarations(&self) -> Result<Vec<Declaration>>;
}

impl SourceLoader for [Declaration] {
    fn declarations(&self) -> Result<Vec<Declaration>> {
        Ok(self.to_vec())
    }
}

impl SourceLoader for Vec<Declaration> {
    fn declarations(&self) -> Result<Vec<Declaration>> {
        Ok(self.clone())
    }
}

/// Type declarations of one package
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub types: IndexMap<String, TypeDecl>,
}

/// In-memory table of every type declaration that was loaded
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: IndexMap<String, Package>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a package; a later call with the same path keeps its types
    pub fn add_package(&mut self, path: &str, name: &str) -> &mut Package {
        self.packages
            .entry(path.to_string())
            .or_insert_with(|| Package {
                path: path.to_string(),
                name: name.to_string(),
                types: IndexMap::new(),
            })
    }

    pub fn insert(&mut self, package_name: &str, decl: TypeDecl) {
        let package = self.add_package(&decl.identity.package.clone(), package_name);
        package.types.insert(decl.identity.name.clone(), decl);
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.get(path)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn type_count(&self) -> usize {
        self.packages.values().map(|p| p.types.len()).sum()
    }

    fn has_type(&self, package: &str, name: &str) -> bool {
        self.packages
            .get(package)
            .is_some_and(|p| p.types.contains_key(name))
    }

    /// First package, in path order, matching `accept` and declaring `name`
    fn find_package<F>(&self, name: &str, accept: F) -> Option<&Package>
    where
        F: Fn(&Package) -> bool,
    {
        let mut candidates: Vec<&Package> = self
            .packages
            .values()
            .filter(|p| p.types.contains_key(name) && accept(p))
            .collect();
        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        candidates.into_iter().next()
    }
}

impl TypeProvider for PackageIndex {
    fn lookup(&self, identity: &TypeIdentity) -> Option<&TypeDecl> {
        self.packages.get(&identity.package)?.types.get(&identity.name)
    }

    fn resolve_name(&self, scope: &Scope, name: &str) -> Option<TypeIdentity> {
        let Some((qualifier, short)) = name.rsplit_once('.') else {
            if self.has_type(&scope.package, name) {
                return Some(TypeIdentity::new(&scope.package, name));
            }
            let package = self.find_package(name, |_| true)?;
            debug!("Bound {} to package {} outside its scope", name, package.path);
            return Some(TypeIdentity::new(&package.path, name));
        };

        if let Some(path) = scope.import_path(qualifier) {
            return Some(TypeIdentity::new(path, short));
        }
        if let Some(import) = scope
            .imports
            .iter()
            .find(|i| i.path == qualifier || i.path.ends_with(&format!("/{}", qualifier)))
        {
            return Some(TypeIdentity::new(&import.path, short));
        }
        if self.packages.contains_key(qualifier) {
            return Some(TypeIdentity::new(qualifier, short));
        }

        let suffix = format!("/{}", qualifier);
        let package = self.find_package(short, |p| p.path.ends_with(&suffix) || p.name == qualifier)?;
        Some(TypeIdentity::new(&package.path, short))
    }
}

/// Syntactic form of a type reference, before names are bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Name {
        qualifier: Option<String>,
        name: String,
        args: Vec<TypeRef>,
    },
    Pointer(Box<TypeRef>),
    Slice(Box<TypeRef>),
    Array(Box<TypeRef>, u64),
    Map(Box<TypeRef>, Box<TypeRef>),
    Interface,
}

impl TypeRef {
    /// Parses `*T`, `[]T`, `[N]T`, `map[K]V`, `interface{}`, `pkg.Name` and
    /// `Name[A, B[C]]`. Anything else (`func`, `chan`, inline structs) is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(rest) = text.strip_prefix('*') {
            return Some(Self::Pointer(Box::new(Self::parse(rest)?)));
        }
        if let Some(rest) = text.strip_prefix("[]") {
            return Some(Self::Slice(Box::new(Self::parse(rest)?)));
        }
        if text.starts_with('[') {
            let close = matching_bracket(text, 0)?;
            let elem = Box::new(Self::parse(&text[close + 1..])?);
            return Some(match text[1..close].trim().parse::<u64>() {
                Ok(len) => Self::Array(elem, len),
                // `[...]T` or a named constant length
                Err(_) => Self::Slice(elem),
            });
        }
        if let Some(rest) = text.strip_prefix("map[") {
            let close = matching_bracket(text, 3)?;
            let key = Self::parse(&rest[..close - 4])?;
            let value = Self::parse(&text[close + 1..])?;
            return Some(Self::Map(Box::new(key), Box::new(value)));
        }
        if text.starts_with("interface{") || text.starts_with("interface {") {
            return Some(Self::Interface);
        }
        if text.starts_with("struct") || text.starts_with("func") || text.starts_with("chan") {
            return None;
        }

        let (head, args) = match text.find('[') {
            Some(open) => {
                let close = matching_bracket(text, open)?;
                if !text[close + 1..].trim().is_empty() {
                    return None;
                }
                let args = split_top_level(&text[open + 1..close])
                    .iter()
                    .map(|a| Self::parse(a))
                    .collect::<Option<Vec<_>>>()?;
                (&text[..open], args)
            }
            None => (text, Vec::new()),
        };

        let head = head.trim();
        if head.is_empty() || !head.chars().all(is_name_char) {
            return None;
        }
        let (qualifier, name) = match head.rsplit_once('.') {
            Some((q, n)) if !q.is_empty() && !n.is_empty() => (Some(q.to_string()), n.to_string()),
            Some(_) => return None,
            None => (None, head.to_string()),
        };

        Some(Self::Name {
            qualifier,
            name,
            args,
        })
    }

    /// Qualified text of a name reference: `model.Item`
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Self::Name {
                qualifier: Some(q),
                name,
                ..
            } => Some(format!("{}.{}", q, name)),
            Self::Name { name, .. } => Some(name.clone()),
            _ => None,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
}

/// Index of the `]` closing the `[` at `open`
fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
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

/// Splits on commas that are not nested inside brackets or braces
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for c in text.chars() {
        match c {
            '[' | '{' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | '}' | ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(qualifier: Option<&str>, name: &str, args: Vec<TypeRef>) -> TypeRef {
        TypeRef::Name {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
            args,
        }
    }

    fn struct_decl(package: &str, type_name: &str) -> TypeDecl {
        TypeDecl {
            identity: TypeIdentity::new(package, type_name),
            type_params: Vec::new(),
            kind: TypeDeclKind::Struct(Vec::new()),
        }
    }

    #[test]
    fn test_parse_nested_generic() {
        let parsed = TypeRef::parse("Page[A[B], model.Item]").unwrap();
        assert_eq!(
            parsed,
            name(
                None,
                "Page",
                vec![
                    name(None, "A", vec![name(None, "B", vec![])]),
                    name(Some("model"), "Item", vec![]),
                ]
            )
        );
    }

    #[test]
    fn test_parse_composites() {
        assert_eq!(
            TypeRef::parse("map[string][]*model.Item").unwrap(),
            TypeRef::Map(
                Box::new(name(None, "string", vec![])),
                Box::new(TypeRef::Slice(Box::new(TypeRef::Pointer(Box::new(name(
                    Some("model"),
                    "Item",
                    vec![]
                ))))))
            )
        );
        assert_eq!(
            TypeRef::parse("[4]byte").unwrap(),
            TypeRef::Array(Box::new(name(None, "byte", vec![])), 4)
        );
        assert_eq!(TypeRef::parse("interface{}").unwrap(), TypeRef::Interface);
        assert_eq!(TypeRef::parse("func()"), None);
        assert_eq!(TypeRef::parse("Page[A"), None);
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("A, B[C, D], map[K]V"), vec!["A", "B[C, D]", "map[K]V"]);
    }

    #[test]
    fn test_resolve_name_through_imports() {
        let mut index = PackageIndex::new();
        index.insert("model", struct_decl("example.com/app/model", "Item"));
        index.insert("other", struct_decl("example.com/app/other", "Item"));
        index.insert("api", struct_decl("example.com/app/api", "Widget"));

        let scope = Scope::new("example.com/app/api")
            .with_import(None, "example.com/app/model")
            .with_import(Some("o"), "example.com/app/other");

        assert_eq!(
            index.resolve_name(&scope, "model.Item"),
            Some(TypeIdentity::new("example.com/app/model", "Item"))
        );
        assert_eq!(
            index.resolve_name(&scope, "o.Item"),
            Some(TypeIdentity::new("example.com/app/other", "Item"))
        );
        assert_eq!(
            index.resolve_name(&scope, "Widget"),
            Some(TypeIdentity::new("example.com/app/api", "Widget"))
        );
    }

    #[test]
    fn test_resolve_name_falls_back_to_known_packages() {
        let mut index = PackageIndex::new();
        index.insert("model", struct_decl("example.com/app/model", "Item"));
        let scope = Scope::new("example.com/app/main");

        assert_eq!(
            index.resolve_name(&scope, "model.Item"),
            Some(TypeIdentity::new("example.com/app/model", "Item"))
        );
        assert_eq!(
            index.resolve_name(&scope, "Item"),
            Some(TypeIdentity::new("example.com/app/model", "Item"))
        );
        assert_eq!(index.resolve_name(&scope, "nope.Item"), None);
        assert_eq!(index.resolve_name(&scope, "Missing"), None);
    }

    #[test]
    fn test_lookup() {
        let mut index = PackageIndex::new();
        index.insert("model", struct_decl("m", "Item"));
        assert!(index.lookup(&TypeIdentity::new("m", "Item")).is_some());
        assert!(index.lookup(&TypeIdentity::new("m", "Other")).is_none());
        assert_eq!(index.type_count(), 1);
        assert_eq!(TypeIdentity::new("m", "Item").to_string(), "m.Item");
    }
}
