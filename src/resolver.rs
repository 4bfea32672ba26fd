use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashMap;

use crate::models::{AdditionalProperties, Schema, SCHEMA_REF_PREFIX};
use crate::primitives::{
    basic_kind_to_schema, bind_basic_name, is_primitive, primitive_type_to_schema,
};
use crate::provider::{
    BasicKind, FieldDecl, Scope, TypeDeclKind, TypeExpr, TypeIdentity, TypeProvider, TypeRef,
};

/// Turns type references into schemas, registering named structs as components.
///
/// The registry maps a fully-qualified key (package path, short name, and
/// for generic instantiations the keys of every argument) to a reference
/// path. A key is registered before the fields of its type are visited, so
/// recursive types resolve to their own reference instead of expanding.
pub struct SchemaResolver<'p> {
    provider: &'p dyn TypeProvider,
    registry: HashMap<String, String>,
    /// Component name to the registry key that owns it
    claimed: HashMap<String, String>,
    /// Completed component schemas not yet handed to the document
    schemas: IndexMap<String, Schema>,
    /// Keys of non-struct named types currently being inlined
    inlining: Vec<String>,
}

impl<'p> SchemaResolver<'p> {
    pub fn new(provider: &'p dyn TypeProvider) -> Self {
        Self {
            provider,
            registry: HashMap::new(),
            claimed: HashMap::new(),
            schemas: IndexMap::new(),
            inlining: Vec::new(),
        }
    }

    /// Resolves a type reference written in an annotation.
    ///
    /// Never fails: anything that cannot be located becomes an `object`
    /// placeholder and a warning.
    pub fn resolve(&mut self, scope: &Scope, type_name: &str) -> Schema {
        let type_name = type_name.trim();
        if type_name.is_empty() {
            return Schema::object();
        }

        if is_primitive(type_name) {
            return primitive_type_to_schema(type_name);
        }

        let Some(type_ref) = TypeRef::parse(type_name) else {
            warn!("Cannot parse type reference '{}', using an object placeholder", type_name);
            return Schema::object();
        };

        let expr = self.bind(scope, &type_ref);
        self.resolve_expr(&expr)
    }

    /// Resolves an already bound type expression
    pub fn resolve_expr(&mut self, expr: &TypeExpr) -> Schema {
        self.schema_for(expr, &[]).unwrap_or_else(|| {
            warn!("Unresolved type {}, using an object placeholder", expr_key(expr));
            Schema::object()
        })
    }

    /// Reference path registered for a fully-qualified key, if any
    pub fn cached_reference(&self, key: &str) -> Option<&str> {
        self.registry.get(key).map(String::as_str)
    }

    /// Component schemas completed so far and not yet taken
    pub fn schemas(&self) -> &IndexMap<String, Schema> {
        &self.schemas
    }

    /// Hands over the completed component schemas; the registry is kept
    pub fn take_schemas(&mut self) -> IndexMap<String, Schema> {
        std::mem::take(&mut self.schemas)
    }

    /// Binds the names of a parsed reference under `scope`
    fn bind(&self, scope: &Scope, type_ref: &TypeRef) -> TypeExpr {
        match type_ref {
            TypeRef::Name {
                qualifier,
                name,
                args,
            } => {
                let full = type_ref.qualified_name().unwrap_or_else(|| name.clone());
                if args.is_empty() {
                    if qualifier.is_none() {
                        if let Some(expr) = bind_basic_name(name) {
                            return expr;
                        }
                    }
                    if is_primitive(&full) {
                        return TypeExpr::Primitive(full);
                    }
                }
                match self.provider.resolve_name(scope, &full) {
                    Some(identity) => TypeExpr::Named {
                        identity,
                        args: args.iter().map(|a| self.bind(scope, a)).collect(),
                    },
                    None => TypeExpr::Unresolved(full),
                }
            }
            TypeRef::Pointer(inner) => TypeExpr::Pointer(Box::new(self.bind(scope, inner))),
            TypeRef::Slice(inner) => TypeExpr::Slice(Box::new(self.bind(scope, inner))),
            TypeRef::Array(inner, len) => TypeExpr::Array(Box::new(self.bind(scope, inner)), *len),
            TypeRef::Map(key, value) => TypeExpr::Map(
                Box::new(self.bind(scope, key)),
                Box::new(self.bind(scope, value)),
            ),
            TypeRef::Interface => TypeExpr::Interface,
        }
    }

    /// Schema for `expr` with type parameters taken from `args`; `None` when unresolved
    fn schema_for(&mut self, expr: &TypeExpr, args: &[TypeExpr]) -> Option<Schema> {
        match expr {
            TypeExpr::Basic(kind) => Some(basic_kind_to_schema(*kind)),
            TypeExpr::Primitive(name) => Some(primitive_type_to_schema(name)),
            TypeExpr::Named {
                identity,
                args: type_args,
            } => {
                if let Some(schema) = well_known_schema(identity) {
                    return Some(schema);
                }
                let concrete: Vec<TypeExpr> =
                    type_args.iter().map(|a| substitute(a, args)).collect();
                self.resolve_named(identity, &concrete)
            }
            TypeExpr::Unresolved(name) => {
                debug!("No declaration for '{}'", name);
                None
            }
            TypeExpr::Pointer(inner) => self.schema_for(inner, args),
            TypeExpr::Slice(inner) => Some(Schema::array(self.element_schema(inner, args))),
            TypeExpr::Array(inner, len) => {
                let mut schema = Schema::array(self.element_schema(inner, args));
                schema.min_items = Some(*len);
                schema.max_items = Some(*len);
                Some(schema)
            }
            TypeExpr::Map(_, value) => {
                let additional = match value.as_ref() {
                    TypeExpr::Interface => AdditionalProperties::Bool(true),
                    value => match self.schema_for(value, args) {
                        Some(schema) => AdditionalProperties::Schema(Box::new(schema)),
                        None => AdditionalProperties::Bool(true),
                    },
                };
                let mut schema = Schema::object();
                schema.additional_properties = Some(additional);
                Some(schema)
            }
            TypeExpr::Interface => Some(Schema::object()),
            TypeExpr::Struct(fields) => Some(self.object_from_fields(fields, args)),
            TypeExpr::TypeParam { name, index } => match args.get(*index) {
                Some(arg) => {
                    let arg = arg.clone();
                    self.schema_for(&arg, &[])
                }
                None => {
                    debug!("Type parameter {} has no argument", name);
                    None
                }
            },
        }
    }

    fn element_schema(&mut self, expr: &TypeExpr, args: &[TypeExpr]) -> Schema {
        self.schema_for(expr, args).unwrap_or_else(|| {
            warn!("Unresolved element type {}, using an object placeholder", expr_key(expr));
            Schema::object()
        })
    }

    fn resolve_named(&mut self, identity: &TypeIdentity, args: &[TypeExpr]) -> Option<Schema> {
        let key = registry_key(identity, args);
        if let Some(reference) = self.registry.get(&key) {
            return Some(Schema::with_ref(reference.clone()));
        }

        let provider = self.provider;
        let Some(decl) = provider.lookup(identity) else {
            warn!("Type {} not found", identity);
            return None;
        };

        if !decl.type_params.is_empty() && decl.type_params.len() != args.len() {
            warn!(
                "Type {} takes {} type arguments, got {}",
                identity,
                decl.type_params.len(),
                args.len()
            );
        }

        match &decl.kind {
            TypeDeclKind::Alias(target) => {
                if self.inlining.contains(&key) {
                    warn!("Type {} refers to itself without a struct, using an object placeholder", key);
                    return Some(Schema::object());
                }
                self.inlining.push(key);
                let schema = self.schema_for(target, args);
                self.inlining.pop();
                schema
            }
            TypeDeclKind::Struct(fields) => {
                let display = if args.is_empty() {
                    identity.name.clone()
                } else {
                    let arg_names: Vec<String> = args.iter().map(display_name).collect();
                    generic_schema_name(&identity.name, &arg_names)
                };
                let name = self.claim_name(&display, &key);
                let reference = format!("{}{}", SCHEMA_REF_PREFIX, name);

                // Registered before the fields so recursive references hit the cache
                self.registry.insert(key.clone(), reference.clone());
                debug!("Registered {} as {}", key, name);

                let mut schema = self.object_from_fields(fields, args);
                schema.title = Some(name.clone());
                self.schemas.insert(name, schema);

                Some(Schema::with_ref(reference))
            }
        }
    }

    /// Picks a free component name, suffixing a counter on collision
    fn claim_name(&mut self, display: &str, key: &str) -> String {
        let mut candidate = display.to_string();
        let mut counter = 1;
        loop {
            match self.claimed.get(&candidate) {
                Some(owner) if owner != key => {
                    counter += 1;
                    candidate = format!("{}{}", display, counter);
                }
                _ => break,
            }
        }
        if candidate != display {
            warn!(
                "Schema name {} is already taken, registering {} as {}",
                display, key, candidate
            );
        }
        self.claimed.insert(candidate.clone(), key.to_string());
        candidate
    }

    fn object_from_fields(&mut self, fields: &[FieldDecl], args: &[TypeExpr]) -> Schema {
        let mut schema = Schema::object();
        let mut visited = Vec::new();
        self.collect_fields(&mut schema, fields, args, 0, &mut visited);
        schema
    }

    /// Adds the JSON-visible fields of a struct to `schema`.
    ///
    /// Embedded structs without an explicit JSON name are flattened; a field
    /// from a shallower struct wins over a promoted one with the same name.
    fn collect_fields(
        &mut self,
        schema: &mut Schema,
        fields: &[FieldDecl],
        args: &[TypeExpr],
        depth: usize,
        visited: &mut Vec<TypeIdentity>,
    ) {
        for field in fields {
            let json = JsonTag::parse(lookup_struct_tag(&field.tag, "json").as_deref());
            if json.skip {
                continue;
            }

            if field.embedded && json.name.is_empty() {
                if let Some((identity, embedded_fields, embedded_args)) =
                    self.embedded_struct(&field.ty, args)
                {
                    if visited.contains(&identity) {
                        continue;
                    }
                    visited.push(identity);
                    self.collect_fields(schema, embedded_fields, &embedded_args, depth + 1, visited);
                    visited.pop();
                    continue;
                }
            }

            if !field.exported {
                continue;
            }

            let name = if json.name.is_empty() {
                field.name.clone()
            } else {
                json.name.clone()
            };

            if depth > 0 && schema.properties.contains_key(&name) {
                continue;
            }

            let mut property = self.schema_for(&field.ty, args).unwrap_or_else(|| {
                warn!(
                    "Unresolved type {} of field {}, using an object placeholder",
                    expr_key(&field.ty),
                    field.name
                );
                Schema::object()
            });

            if let Some(desc) = lookup_struct_tag(&field.tag, "desc")
                .or_else(|| lookup_struct_tag(&field.tag, "description"))
                .filter(|d| !d.is_empty())
            {
                property.description = Some(desc);
            }

            schema.required.retain(|r| r != &name);
            if !json.omitempty {
                schema.required.push(name.clone());
            }
            schema.properties.insert(name, property);
        }
    }

    /// Declaration of the struct an embedded field promotes, with its arguments substituted
    fn embedded_struct(
        &self,
        ty: &TypeExpr,
        args: &[TypeExpr],
    ) -> Option<(TypeIdentity, &'p [FieldDecl], Vec<TypeExpr>)> {
        let (identity, type_args) = match ty {
            TypeExpr::Pointer(inner) => return self.embedded_struct(inner, args),
            TypeExpr::Named { identity, args } => (identity, args),
            _ => return None,
        };
        let provider = self.provider;
        match &provider.lookup(identity)?.kind {
            TypeDeclKind::Struct(fields) => Some((
                identity.clone(),
                fields.as_slice(),
                type_args.iter().map(|a| substitute(a, args)).collect(),
            )),
            TypeDeclKind::Alias(_) => None,
        }
    }
}

/// Composite component name of a generic instantiation: `PageOfItemAndUser`.
///
/// Package qualifiers are stripped from the base and from every argument.
pub fn generic_schema_name<S: AsRef<str>>(base: &str, args: &[S]) -> String {
    let parts: Vec<&str> = args.iter().map(|a| short_name(a.as_ref())).collect();
    format!("{}Of{}", short_name(base), parts.join("And"))
}

fn short_name(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, short)| short)
}

/// Name an argument contributes to a composite name
fn display_name(expr: &TypeExpr) -> String {
    match expr {
        TypeExpr::Named { identity, args } if args.is_empty() => identity.name.clone(),
        TypeExpr::Named { identity, args } => {
            let inner: Vec<String> = args.iter().map(display_name).collect();
            generic_schema_name(&identity.name, &inner)
        }
        TypeExpr::Basic(kind) => basic_display_name(*kind).to_string(),
        TypeExpr::Primitive(name) => match name.to_lowercase().as_str() {
            "any" | "interface{}" | "object" => "Any".to_string(),
            _ => written_name(short_name(name)),
        },
        TypeExpr::Unresolved(name) => written_name(short_name(name)),
        TypeExpr::Pointer(inner) => display_name(inner),
        TypeExpr::Slice(inner) | TypeExpr::Array(inner, _) => format!("{}List", display_name(inner)),
        TypeExpr::Map(_, value) => format!("{}Map", display_name(value)),
        TypeExpr::Interface => "Any".to_string(),
        TypeExpr::Struct(_) => "Object".to_string(),
        TypeExpr::TypeParam { name, .. } => name.clone(),
    }
}

fn basic_display_name(kind: BasicKind) -> &'static str {
    match kind {
        BasicKind::Bool => "bool",
        BasicKind::Int32 => "int32",
        BasicKind::Int64 => "int64",
        BasicKind::Float32 => "float32",
        BasicKind::Float64 => "float64",
        BasicKind::String => "string",
        BasicKind::Bytes => "bytes",
    }
}

/// Identifiers are used as written; anything else (`date-time`) is Pascal-cased
fn written_name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        pascal_case(name)
    }
}

fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Fully-qualified cache key of a named type and its arguments
fn registry_key(identity: &TypeIdentity, args: &[TypeExpr]) -> String {
    if args.is_empty() {
        identity.to_string()
    } else {
        let keys: Vec<String> = args.iter().map(expr_key).collect();
        format!("{}[{}]", identity, keys.join(","))
    }
}

fn expr_key(expr: &TypeExpr) -> String {
    match expr {
        TypeExpr::Basic(kind) => basic_display_name(*kind).to_string(),
        TypeExpr::Primitive(name) => name.to_lowercase(),
        TypeExpr::Named { identity, args } => registry_key(identity, args),
        TypeExpr::Unresolved(name) => format!("?{}", name),
        TypeExpr::Pointer(inner) => format!("*{}", expr_key(inner)),
        TypeExpr::Slice(inner) => format!("[]{}", expr_key(inner)),
        TypeExpr::Array(inner, len) => format!("[{}]{}", len, expr_key(inner)),
        TypeExpr::Map(key, value) => format!("map[{}]{}", expr_key(key), expr_key(value)),
        TypeExpr::Interface => "interface{}".to_string(),
        TypeExpr::Struct(fields) => {
            let names: Vec<String> = fields
                .iter()
                .map(|f| format!("{} {}", f.name, expr_key(&f.ty)))
                .collect();
            format!("struct{{{}}}", names.join("; "))
        }
        TypeExpr::TypeParam { name, .. } => name.clone(),
    }
}

/// Replaces type parameter occurrences with the positional arguments
fn substitute(expr: &TypeExpr, args: &[TypeExpr]) -> TypeExpr {
    match expr {
        TypeExpr::TypeParam { index, .. } => match args.get(*index) {
            Some(arg) => arg.clone(),
            None => expr.clone(),
        },
        TypeExpr::Named { identity, args: inner } => TypeExpr::Named {
            identity: identity.clone(),
            args: inner.iter().map(|a| substitute(a, args)).collect(),
        },
        TypeExpr::Pointer(inner) => TypeExpr::Pointer(Box::new(substitute(inner, args))),
        TypeExpr::Slice(inner) => TypeExpr::Slice(Box::new(substitute(inner, args))),
        TypeExpr::Array(inner, len) => TypeExpr::Array(Box::new(substitute(inner, args)), *len),
        TypeExpr::Map(key, value) => TypeExpr::Map(
            Box::new(substitute(key, args)),
            Box::new(substitute(value, args)),
        ),
        TypeExpr::Struct(fields) => TypeExpr::Struct(
            fields
                .iter()
                .map(|f| FieldDecl {
                    ty: substitute(&f.ty, args),
                    ..f.clone()
                })
                .collect(),
        ),
        _ => expr.clone(),
    }
}

/// Library types with a fixed wire representation
fn well_known_schema(identity: &TypeIdentity) -> Option<Schema> {
    match (identity.package.as_str(), identity.name.as_str()) {
        ("time", "Time") => Some(Schema::primitive("string", Some("date-time"))),
        ("time", "Duration") => Some(Schema::primitive("integer", Some("int64"))),
        ("encoding/json", "RawMessage") => Some(Schema::object()),
        ("mime/multipart", "FileHeader") => Some(Schema::primitive("string", Some("binary"))),
        (package, "UUID") if package.ends_with("uuid") => {
            Some(Schema::primitive("string", Some("uuid")))
        }
        _ => None,
    }
}

/// Decoded `json:"..."` tag value
#[derive(Debug, Default, PartialEq)]
struct JsonTag {
    name: String,
    omitempty: bool,
    skip: bool,
}

impl JsonTag {
    fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        if value == "-" {
            return Self {
                skip: true,
                ..Self::default()
            };
        }
        let mut parts = value.split(',');
        let name = parts.next().unwrap_or_default().to_string();
        let omitempty = parts.any(|opt| opt == "omitempty" || opt == "omitzero");
        Self {
            name,
            omitempty,
            skip: false,
        }
    }
}

/// Value of `key` in a struct tag (`json:"id,omitempty" desc:"Identifier"`)
pub fn lookup_struct_tag(tag: &str, key: &str) -> Option<String> {
    let mut rest = tag.trim();
    while !rest.is_empty() {
        let colon = rest.find(':')?;
        let name = rest[..colon].trim();
        let after = &rest[colon + 1..];
        let quoted = after.strip_prefix('"')?;

        let mut value = String::new();
        let mut chars = quoted.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                    }
                }
                '"' => {
                    end = Some(i);
                    break;
                }
                c => value.push(c),
            }
        }
        let end = end?;

        if name == key {
            return Some(value);
        }
        rest = quoted[end + 1..].trim_start();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{PackageIndex, TypeDecl};
    use pretty_assertions::assert_eq;

    const API: &str = "example.com/app/api";
    const MODEL: &str = "example.com/app/model";

    fn field(name: &str, ty: TypeExpr, tag: &str) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            ty,
            tag: tag.to_string(),
            exported: name.chars().next().is_some_and(char::is_uppercase),
            embedded: false,
        }
    }

    fn named(package: &str, name: &str) -> TypeExpr {
        TypeExpr::Named {
            identity: TypeIdentity::new(package, name),
            args: Vec::new(),
        }
    }

    fn struct_decl(package: &str, name: &str, params: &[&str], fields: Vec<FieldDecl>) -> TypeDecl {
        TypeDecl {
            identity: TypeIdentity::new(package, name),
            type_params: params.iter().map(|p| p.to_string()).collect(),
            kind: TypeDeclKind::Struct(fields),
        }
    }

    fn fixture() -> PackageIndex {
        let mut index = PackageIndex::new();
        index.insert(
            "api",
            struct_decl(
                API,
                "Widget",
                &[],
                vec![
                    field("ID", TypeExpr::Basic(BasicKind::Int32), r#"json:"id""#),
                    field("Name", TypeExpr::Basic(BasicKind::String), r#"json:"name,omitempty""#),
                    field("secret", TypeExpr::Basic(BasicKind::String), ""),
                    field("Skipped", TypeExpr::Basic(BasicKind::String), r#"json:"-""#),
                    field(
                        "Labels",
                        TypeExpr::Map(
                            Box::new(TypeExpr::Basic(BasicKind::String)),
                            Box::new(TypeExpr::Basic(BasicKind::String)),
                        ),
                        r#"json:"labels" desc:"Free-form labels""#,
                    ),
                ],
            ),
        );
        index.insert(
            "api",
            struct_decl(
                API,
                "Node",
                &[],
                vec![
                    field("Value", TypeExpr::Basic(BasicKind::Int64), r#"json:"value""#),
                    field(
                        "Next",
                        TypeExpr::Pointer(Box::new(named(API, "Node"))),
                        r#"json:"next,omitempty""#,
                    ),
                ],
            ),
        );
        index.insert(
            "api",
            struct_decl(
                API,
                "Page",
                &["T"],
                vec![
                    field(
                        "Items",
                        TypeExpr::Slice(Box::new(TypeExpr::TypeParam {
                            name: "T".into(),
                            index: 0,
                        })),
                        r#"json:"items""#,
                    ),
                    field("Total", TypeExpr::Basic(BasicKind::Int64), r#"json:"total""#),
                ],
            ),
        );
        index.insert(
            "api",
            struct_decl(
                API,
                "Item",
                &[],
                vec![field("Sku", TypeExpr::Basic(BasicKind::String), r#"json:"sku""#)],
            ),
        );
        index.insert(
            "model",
            struct_decl(
                MODEL,
                "Item",
                &[],
                vec![
                    field("ID", TypeExpr::Basic(BasicKind::Int64), r#"json:"id""#),
                    field("Price", TypeExpr::Basic(BasicKind::Float64), r#"json:"price""#),
                ],
            ),
        );
        index.insert(
            "api",
            TypeDecl {
                identity: TypeIdentity::new(API, "Status"),
                type_params: Vec::new(),
                kind: TypeDeclKind::Alias(TypeExpr::Basic(BasicKind::String)),
            },
        );
        index
    }

    fn scope() -> Scope {
        Scope::new(API).with_import(None, MODEL)
    }

    #[test]
    fn test_struct_becomes_component_reference() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        let schema = resolver.resolve(&scope(), "Widget");
        assert_eq!(schema, Schema::reference("Widget"));

        let widget = &resolver.schemas()["Widget"];
        assert_eq!(widget.title.as_deref(), Some("Widget"));
        assert_eq!(widget.required, vec!["id", "labels"]);
        assert_eq!(
            widget.properties.keys().collect::<Vec<_>>(),
            vec!["id", "name", "labels"]
        );
        let labels = &widget.properties["labels"];
        assert_eq!(labels.description.as_deref(), Some("Free-form labels"));
        assert_eq!(
            labels.additional_properties,
            Some(AdditionalProperties::Schema(Box::new(Schema::primitive("string", None))))
        );
    }

    #[test]
    fn test_resolving_twice_hits_the_cache() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        let first = resolver.resolve(&scope(), "Widget");
        let taken = resolver.take_schemas();
        let second = resolver.resolve(&scope(), "api.Widget");

        assert_eq!(first, second);
        assert_eq!(taken.len(), 1);
        assert!(resolver.schemas().is_empty());
    }

    #[test]
    fn test_self_referential_type_terminates() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        resolver.resolve(&scope(), "Node");
        let node = &resolver.schemas()["Node"];
        assert_eq!(node.properties["next"], Schema::reference("Node"));
        assert_eq!(node.required, vec!["value"]);
    }

    #[test]
    fn test_mutually_referential_types_terminate() {
        let mut index = PackageIndex::new();
        index.insert(
            "api",
            struct_decl(
                API,
                "A",
                &[],
                vec![field("B", TypeExpr::Pointer(Box::new(named(API, "B"))), r#"json:"b""#)],
            ),
        );
        index.insert(
            "api",
            struct_decl(
                API,
                "B",
                &[],
                vec![field("A", TypeExpr::Slice(Box::new(named(API, "A"))), r#"json:"a""#)],
            ),
        );
        let mut resolver = SchemaResolver::new(&index);

        assert_eq!(resolver.resolve(&scope(), "A"), Schema::reference("A"));
        assert_eq!(resolver.resolve(&scope(), "B"), Schema::reference("B"));

        let schemas = resolver.take_schemas();
        assert_eq!(schemas.keys().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(schemas["A"].properties["b"], Schema::reference("B"));
        assert_eq!(
            schemas["B"].properties["a"],
            Schema::array(Schema::reference("A"))
        );
    }

    #[test]
    fn test_generic_over_primitives_keeps_written_names() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        assert_eq!(resolver.resolve(&scope(), "Page[string]"), Schema::reference("PageOfstring"));
        assert_eq!(resolver.resolve(&scope(), "Page[int]"), Schema::reference("PageOfint"));
        assert_eq!(resolver.resolve(&scope(), "Page[uint8]"), Schema::reference("PageOfuint8"));
        assert_eq!(resolver.resolve(&scope(), "Page[int64]"), Schema::reference("PageOfint64"));

        let schemas = resolver.schemas();
        assert_eq!(
            schemas["PageOfuint8"].properties["items"],
            Schema::array(Schema::primitive("integer", Some("int32")))
        );
        assert_eq!(
            schemas["PageOfstring"].properties["items"],
            Schema::array(Schema::primitive("string", None))
        );
    }

    #[test]
    fn test_same_short_name_in_two_packages_does_not_collide() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        let local = resolver.resolve(&scope(), "Page[Item]");
        let qualified = resolver.resolve(&scope(), "Page[model.Item]");

        assert_eq!(local, Schema::reference("PageOfItem"));
        assert_eq!(qualified, Schema::reference("PageOfItem2"));
        assert_eq!(
            resolver.cached_reference("example.com/app/api.Page[example.com/app/api.Item]"),
            Some("#/components/schemas/PageOfItem")
        );
        assert_eq!(
            resolver.cached_reference("example.com/app/api.Page[example.com/app/model.Item]"),
            Some("#/components/schemas/PageOfItem2")
        );

        let schemas = resolver.schemas();
        assert_eq!(schemas["Item"].required, vec!["sku"]);
        assert_eq!(schemas["Item2"].required, vec!["id", "price"]);
        assert_eq!(
            schemas["PageOfItem"].properties["items"].items.as_deref(),
            Some(&Schema::reference("Item"))
        );
        assert_eq!(
            schemas["PageOfItem2"].properties["items"].items.as_deref(),
            Some(&Schema::reference("Item2"))
        );
    }

    #[test]
    fn test_named_non_struct_type_is_inlined() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        assert_eq!(resolver.resolve(&scope(), "Status"), Schema::primitive("string", None));
        assert!(resolver.schemas().is_empty());
    }

    #[test]
    fn test_unknown_types_fall_back_to_placeholders() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        assert_eq!(resolver.resolve(&scope(), "nowhere.Thing"), Schema::object());
        assert_eq!(resolver.resolve(&scope(), "func()"), Schema::object());

        let map = resolver.resolve(&scope(), "map[string]Missing");
        assert_eq!(map.additional_properties, Some(AdditionalProperties::Bool(true)));
    }

    #[test]
    fn test_composite_references() {
        let index = fixture();
        let mut resolver = SchemaResolver::new(&index);

        let list = resolver.resolve(&scope(), "[]model.Item");
        assert_eq!(list, Schema::array(Schema::reference("Item")));

        let fixed = resolver.resolve(&scope(), "[3]int");
        assert_eq!(fixed.min_items, Some(3));
        assert_eq!(fixed.max_items, Some(3));

        assert_eq!(resolver.resolve(&scope(), "uuid"), Schema::primitive("string", Some("uuid")));
        assert_eq!(
            resolver.resolve(&scope(), "time.Time"),
            Schema::primitive("string", Some("date-time"))
        );
    }

    #[test]
    fn test_embedded_struct_is_flattened() {
        let mut index = fixture();
        let mut base = field("Node", named(API, "Node"), "");
        base.embedded = true;
        index.insert(
            "api",
            struct_decl(
                API,
                "Tree",
                &[],
                vec![
                    base,
                    field("Value", TypeExpr::Basic(BasicKind::String), r#"json:"value,omitempty""#),
                ],
            ),
        );
        let mut resolver = SchemaResolver::new(&index);

        resolver.resolve(&scope(), "Tree");
        let tree = &resolver.schemas()["Tree"];
        assert_eq!(tree.properties.keys().collect::<Vec<_>>(), vec!["value", "next"]);
        assert_eq!(tree.properties["value"], Schema::primitive("string", None));
        assert!(tree.required.is_empty());
    }

    #[test]
    fn test_generic_schema_name() {
        assert_eq!(generic_schema_name("Response", &["model.User"]), "ResponseOfUser");
        assert_eq!(
            generic_schema_name("pkg.Page", &["Item", "a.b.Meta"]),
            "PageOfItemAndMeta"
        );
    }

    #[test]
    fn test_nested_generic_display_names() {
        let page = TypeExpr::Named {
            identity: TypeIdentity::new(API, "Page"),
            args: vec![TypeExpr::Slice(Box::new(named(MODEL, "Item")))],
        };
        assert_eq!(display_name(&page), "PageOfItemList");
        assert_eq!(
            display_name(&TypeExpr::Map(
                Box::new(TypeExpr::Basic(BasicKind::String)),
                Box::new(TypeExpr::Basic(BasicKind::Int32))
            )),
            "int32Map"
        );
        assert_eq!(display_name(&TypeExpr::Primitive("date-time".into())), "DateTime");
    }

    #[test]
    fn test_lookup_struct_tag() {
        let tag = r#"json:"id,omitempty" desc:"The \"primary\" key" validate:"required""#;
        assert_eq!(lookup_struct_tag(tag, "json").as_deref(), Some("id,omitempty"));
        assert_eq!(lookup_struct_tag(tag, "desc").as_deref(), Some("The \"primary\" key"));
        assert_eq!(lookup_struct_tag(tag, "validate").as_deref(), Some("required"));
        assert_eq!(lookup_struct_tag(tag, "xml"), None);
        assert_eq!(lookup_struct_tag("", "json"), None);
    }

    #[test]
    fn test_json_tag() {
        assert_eq!(
            JsonTag::parse(Some("name,omitempty")),
            JsonTag {
                name: "name".into(),
                omitempty: true,
                skip: false
            }
        );
        assert!(JsonTag::parse(Some("-")).skip);
        assert!(!JsonTag::parse(Some("-,")).skip);
        assert_eq!(JsonTag::parse(None), JsonTag::default());
    }
}
