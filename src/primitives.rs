use crate::models::Schema;
use crate::provider::{BasicKind, TypeExpr};

/// Maps a primitive type name used inside an annotation to a schema.
///
/// Matching is case-insensitive. Unknown names yield an empty schema with no
/// `type`; callers use [`Schema::has_type`] to decide whether to fall through
/// to structural resolution.
pub fn primitive_type_to_schema(type_name: &str) -> Schema {
    match type_name.trim().to_lowercase().as_str() {
        "string" => Schema::primitive("string", None),
        "int" | "integer" | "int8" | "int16" | "int32" | "uint" | "uint8" | "uint16"
        | "uint32" | "rune" | "uintptr" => Schema::primitive("integer", Some("int32")),
        "int64" | "uint64" => Schema::primitive("integer", Some("int64")),
        "float" | "float32" => Schema::primitive("number", Some("float")),
        "float64" | "double" | "number" => Schema::primitive("number", Some("double")),
        "bool" | "boolean" => Schema::primitive("boolean", None),
        "file" | "binary" => Schema::primitive("string", Some("binary")),
        "time" | "time.time" | "date-time" | "datetime" => {
            Schema::primitive("string", Some("date-time"))
        }
        "date" => Schema::primitive("string", Some("date")),
        "uuid" => Schema::primitive("string", Some("uuid")),
        "uri" | "url" => Schema::primitive("string", Some("uri")),
        "email" => Schema::primitive("string", Some("email")),
        "byte" | "bytes" => Schema::primitive("string", Some("byte")),
        "any" | "interface{}" | "object" => Schema::object(),
        _ => Schema::default(),
    }
}

/// True when `type_name` is one of the names [`primitive_type_to_schema`] knows
pub fn is_primitive(type_name: &str) -> bool {
    primitive_type_to_schema(type_name).has_type()
}

/// Maps a host-language scalar kind to a schema
pub fn basic_kind_to_schema(kind: BasicKind) -> Schema {
    match kind {
        BasicKind::Bool => Schema::primitive("boolean", None),
        BasicKind::Int32 => Schema::primitive("integer", Some("int32")),
        BasicKind::Int64 => Schema::primitive("integer", Some("int64")),
        BasicKind::Float32 => Schema::primitive("number", Some("float")),
        BasicKind::Float64 => Schema::primitive("number", Some("double")),
        BasicKind::String => Schema::primitive("string", None),
        BasicKind::Bytes => Schema::primitive("string", Some("byte")),
    }
}

/// Binds a predeclared Go type name.
///
/// The name is kept as written (`uint8`, not its kind) whenever the
/// annotation table maps it to the same schema as its scalar kind, so
/// generic instantiations are named after what the source says.
pub fn bind_basic_name(name: &str) -> Option<TypeExpr> {
    let kind = BasicKind::from_go_name(name)?;
    if primitive_type_to_schema(name) == basic_kind_to_schema(kind) {
        Some(TypeExpr::Primitive(name.to_string()))
    } else {
        Some(TypeExpr::Basic(kind))
    }
}

/// Coerces an annotation literal to the JSON type the schema declares.
///
/// Values that do not parse as the declared type are kept as strings.
pub fn coerce_value(schema: &Schema, raw: &str) -> serde_json::Value {
    use serde_json::Value;

    let raw = raw.trim();
    match schema.type_.as_deref() {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some("boolean") => match raw.to_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_table() {
        let cases = [
            ("string", "string", None),
            ("INT", "integer", Some("int32")),
            ("uint32", "integer", Some("int32")),
            ("int64", "integer", Some("int64")),
            ("float32", "number", Some("float")),
            ("Float64", "number", Some("double")),
            ("bool", "boolean", None),
            ("file", "string", Some("binary")),
            ("time.Time", "string", Some("date-time")),
            ("date", "string", Some("date")),
            ("UUID", "string", Some("uuid")),
            ("url", "string", Some("uri")),
            ("email", "string", Some("email")),
            ("bytes", "string", Some("byte")),
            ("interface{}", "object", None),
        ];

        for (name, type_, format) in cases {
            let schema = primitive_type_to_schema(name);
            assert_eq!(schema.type_.as_deref(), Some(type_), "type of {}", name);
            assert_eq!(schema.format.as_deref(), format, "format of {}", name);
        }
    }

    #[test]
    fn test_unknown_name_yields_typeless_schema() {
        let schema = primitive_type_to_schema("model.User");
        assert_eq!(schema, Schema::default());
        assert!(!is_primitive("Widget"));
        assert!(is_primitive("Boolean"));
    }

    #[test]
    fn test_basic_kinds() {
        assert_eq!(
            basic_kind_to_schema(BasicKind::Int64),
            Schema::primitive("integer", Some("int64"))
        );
        assert_eq!(basic_kind_to_schema(BasicKind::Bool), Schema::primitive("boolean", None));
    }

    #[test]
    fn test_coerce_value() {
        let int = Schema::primitive("integer", Some("int32"));
        let num = Schema::primitive("number", None);
        let flag = Schema::primitive("boolean", None);
        let text = Schema::primitive("string", None);

        assert_eq!(coerce_value(&int, "42"), json!(42));
        assert_eq!(coerce_value(&int, "abc"), json!("abc"));
        assert_eq!(coerce_value(&num, "1.5"), json!(1.5));
        assert_eq!(coerce_value(&flag, "TRUE"), json!(true));
        assert_eq!(coerce_value(&text, "10"), json!("10"));
    }
}
