use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::annotation::{
    join_unbalanced, parse_block, parse_external_docs, parse_header_line, parse_mime_types,
    parse_response_type, parse_router_path, parse_tags, split_params, Annotation, AnnotationType,
};
use crate::global::parse_security_requirement;
use crate::models::{
    append_line, ExternalDocs, Header, MediaType, Operation, Parameter, ParameterLocation,
    ParsedOperation, RequestBody, Response, Schema,
};
use crate::primitives::{coerce_value, primitive_type_to_schema};
use crate::provider::Scope;
use crate::resolver::SchemaResolver;

const DEFAULT_MIME_TYPE: &str = "application/json";
const MULTIPART_FORM: &str = "multipart/form-data";
const URLENCODED_FORM: &str = "application/x-www-form-urlencoded";

static PARAM_ATTRIBUTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(enums|default|example|format|minimum|maximum|minlength|maxlength)\((.*)\)$")
        .unwrap()
});

/// Builds one operation from a handler's comment block.
///
/// Returns `None` when the block carries `@ignore` or no usable `@router`;
/// in that case nothing is resolved, so no schema is registered either.
pub fn parse_operation<S: AsRef<str>>(
    resolver: &mut SchemaResolver<'_>,
    scope: &Scope,
    fn_name: &str,
    lines: &[S],
) -> Option<ParsedOperation> {
    let annotations = parse_block(lines);

    if annotations
        .iter()
        .any(|a| a.annotation_type == AnnotationType::Ignore)
    {
        debug!("Skipping {}: marked @ignore", fn_name);
        return None;
    }

    let (path, method) = annotations
        .iter()
        .filter(|a| a.annotation_type == AnnotationType::Router)
        .map(|a| parse_router_path(&a.content))
        .last()
        .filter(|(path, _)| !path.is_empty())?;

    let mut builder = OperationBuilder {
        resolver,
        scope,
        operation: Operation::default(),
        accept: Vec::new(),
        produce: Vec::new(),
    };
    for annotation in annotations {
        builder.apply(annotation);
    }

    let mut operation = builder.operation;
    if operation.operation_id.is_none() {
        operation.operation_id = Some(fn_name.to_string());
    }

    debug!("Parsed operation {} {} from {}", method.to_uppercase(), path, fn_name);
    Some(ParsedOperation {
        path,
        method,
        operation,
    })
}

/// Per-handler state: the operation in progress and the current MIME lists
struct OperationBuilder<'r, 'p, 's> {
    resolver: &'r mut SchemaResolver<'p>,
    scope: &'s Scope,
    operation: Operation,
    accept: Vec<String>,
    produce: Vec<String>,
}

impl OperationBuilder<'_, '_, '_> {
    fn apply(&mut self, annotation: Annotation) {
        let content = annotation.content;
        match annotation.annotation_type {
            AnnotationType::Router | AnnotationType::Ignore => {}
            AnnotationType::Id => self.operation.operation_id = Some(content),
            AnnotationType::Deprecated => self.operation.deprecated = true,
            AnnotationType::Summary => self.operation.summary = Some(content),
            AnnotationType::Description => append_line(&mut self.operation.description, &content),
            AnnotationType::Tags => {
                for tag in parse_tags(&content) {
                    if !self.operation.tags.contains(&tag) {
                        self.operation.tags.push(tag);
                    }
                }
            }
            AnnotationType::Param => self.parse_param(&content),
            AnnotationType::Accept => self.accept = parse_mime_types(&content),
            AnnotationType::Produce => self.produce = parse_mime_types(&content),
            AnnotationType::Success | AnnotationType::Failure => self.parse_response(&content),
            AnnotationType::Header => self.parse_response_header(&content),
            AnnotationType::ExternalDocs => {
                if let Some((url, description)) = parse_external_docs(&content) {
                    self.operation.external_docs = Some(ExternalDocs { description, url });
                }
            }
            AnnotationType::Security => {
                if let Some(requirement) = parse_security_requirement(&content) {
                    self.operation.security.push(requirement);
                }
            }
            other => debug!("Ignoring {:?} on a handler", other),
        }
    }

    /// `<name> <in> <type> <required> [description] [attributes...]`
    fn parse_param(&mut self, content: &str) {
        let params = join_unbalanced(split_params(content), '(', ')');
        if params.len() < 4 {
            warn!("@param needs name, location, type and required flag: '{}'", content);
            return;
        }

        let name = params[0].clone();
        let location = params[1].to_lowercase();
        let type_name = params[2].as_str();
        let required = params[3].eq_ignore_ascii_case("true");

        let mut description = Vec::new();
        let mut attributes = Vec::new();
        for token in &params[4..] {
            match PARAM_ATTRIBUTE_REGEX.captures(token) {
                Some(captures) => attributes.push((captures[1].to_lowercase(), captures[2].to_string())),
                None => description.push(token.as_str()),
            }
        }
        let description = description.join(" ");

        match location.as_str() {
            "body" => self.parse_body_param(type_name, description, required),
            "formdata" | "form" => {
                self.parse_form_data_param(name, type_name, description, required, &attributes)
            }
            other => {
                let Some(location) = ParameterLocation::parse(other) else {
                    warn!("Unknown location '{}' for parameter {}", other, name);
                    return;
                };

                let mut schema = self.param_schema(type_name);
                let example = apply_attributes(&mut schema, &attributes);
                self.operation.parameters.push(Parameter {
                    name,
                    location,
                    description: (!description.is_empty()).then_some(description),
                    required: required || location == ParameterLocation::Path,
                    deprecated: false,
                    schema: Some(schema),
                    example,
                });
            }
        }
    }

    fn parse_body_param(&mut self, type_name: &str, description: String, required: bool) {
        let schema = self.resolver.resolve(self.scope, type_name);
        let content_types = mime_or_default(&self.accept);

        let body = self
            .operation
            .request_body
            .get_or_insert_with(RequestBody::default);
        if !description.is_empty() {
            body.description = Some(description);
        }
        body.required |= required;
        for content_type in content_types {
            body.content.insert(
                content_type,
                MediaType {
                    schema: Some(schema.clone()),
                    example: None,
                },
            );
        }
    }

    fn parse_form_data_param(
        &mut self,
        name: String,
        type_name: &str,
        description: String,
        required: bool,
        attributes: &[(String, String)],
    ) {
        let is_file = type_name.eq_ignore_ascii_case("file");
        let content_type = if !is_file && self.accept.iter().any(|ct| ct == URLENCODED_FORM) {
            URLENCODED_FORM
        } else {
            MULTIPART_FORM
        };

        let mut property = if is_file {
            Schema::primitive("string", Some("binary"))
        } else {
            self.param_schema(type_name)
        };
        if let Some(example) = apply_attributes(&mut property, attributes) {
            property.example = Some(example);
        }
        if !description.is_empty() {
            property.description = Some(description);
        }

        let body = self
            .operation
            .request_body
            .get_or_insert_with(RequestBody::default);
        let media = body
            .content
            .entry(content_type.to_string())
            .or_insert_with(|| MediaType {
                schema: Some(Schema::object()),
                example: None,
            });
        let schema = media.schema.get_or_insert_with(Schema::object);

        schema.properties.insert(name.clone(), property);
        if required && !schema.required.contains(&name) {
            schema.required.push(name);
        }
    }

    /// Schema of a non-body parameter; `[]T` gives an array of `T`.
    ///
    /// Only primitive names are mapped. Anything else gets an empty schema
    /// and never reaches the resolver, so no component is registered.
    fn param_schema(&self, type_name: &str) -> Schema {
        if let Some(item) = type_name.strip_prefix("[]") {
            return Schema::array(self.param_schema(item));
        }
        let schema = primitive_type_to_schema(type_name);
        if !schema.has_type() {
            warn!("Parameter type '{}' is not a primitive, leaving its schema empty", type_name);
        }
        schema
    }

    /// `<status> {<kind>} <target> [description]`
    fn parse_response(&mut self, content: &str) {
        let Some(spec) = parse_response_type(content) else {
            warn!("Response annotation without a status code");
            return;
        };

        let schema = match spec.kind.as_str() {
            "" => None,
            "object" => Some(self.resolver.resolve(self.scope, &spec.target)),
            "array" => Some(Schema::array(self.resolver.resolve(self.scope, &spec.target))),
            "string" | "integer" | "number" | "boolean" => Some(Schema::primitive(&spec.kind, None)),
            other if !spec.target.is_empty() => {
                debug!("Resolving response kind '{}' through its target", other);
                Some(self.resolver.resolve(self.scope, &spec.target))
            }
            other => {
                warn!("Response kind '{}' without a target, leaving the body undescribed", other);
                None
            }
        };

        let description = if spec.description.is_empty() {
            reason_phrase(&spec.status).unwrap_or_default().to_string()
        } else {
            spec.description
        };

        let mut response = Response {
            description,
            ..Default::default()
        };
        if let Some(schema) = schema {
            for content_type in mime_or_default(&self.produce) {
                response.content.insert(
                    content_type,
                    MediaType {
                        schema: Some(schema.clone()),
                        example: None,
                    },
                );
            }
        }

        self.operation.responses.insert(&spec.status, response);
    }

    /// `<status> {<type>} <name> [description]`; the response must already exist
    fn parse_response_header(&mut self, content: &str) {
        let Some(spec) = parse_header_line(content) else {
            return;
        };

        let Some(response) = self.operation.responses.get_mut(&spec.status) else {
            debug!("Header {} targets undeclared response {}", spec.name, spec.status);
            return;
        };

        let schema = primitive_type_to_schema(&spec.type_name);
        response.headers.insert(
            spec.name,
            Header {
                description: (!spec.description.is_empty()).then_some(spec.description),
                required: false,
                schema: schema.has_type().then_some(schema),
            },
        );
    }
}

fn mime_or_default(types: &[String]) -> Vec<String> {
    if types.is_empty() {
        vec![DEFAULT_MIME_TYPE.to_string()]
    } else {
        types.to_vec()
    }
}

/// Applies `enums(..)`, `format(..)`, bounds and `default(..)` to `schema`;
/// array schemas get the refinements on their items.
/// Returns the `example(..)` value, if any.
fn apply_attributes(schema: &mut Schema, attributes: &[(String, String)]) -> Option<serde_json::Value> {
    let mut example = None;

    for (name, value) in attributes {
        match name.as_str() {
            "default" => {
                let default = match schema.items.as_deref() {
                    Some(items) => serde_json::Value::Array(
                        value.split(',').map(|v| coerce_value(items, v)).collect(),
                    ),
                    None => coerce_value(schema, value),
                };
                schema.default = Some(default);
            }
            "example" => {
                example = Some(coerce_value(schema.items.as_deref().unwrap_or(&*schema), value));
            }
            _ => match schema.items.as_deref_mut() {
                Some(items) => refine(items, name, value),
                None => refine(schema, name, value),
            },
        }
    }

    example
}

fn refine(schema: &mut Schema, name: &str, value: &str) {
    match name {
        "enums" => {
            schema.enum_values = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| coerce_value(schema, v))
                .collect();
        }
        "format" => schema.format = Some(value.trim().to_string()),
        "minimum" => schema.minimum = parse_number(name, value),
        "maximum" => schema.maximum = parse_number(name, value),
        "minlength" => schema.min_length = value.trim().parse().ok(),
        "maxlength" => schema.max_length = value.trim().parse().ok(),
        _ => {}
    }
}

fn parse_number(name: &str, value: &str) -> Option<f64> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        warn!("Ignoring non-numeric {}({})", name, value);
    }
    parsed
}

/// Canonical reason phrase of an HTTP status code
fn reason_phrase(status: &str) -> Option<&'static str> {
    let phrase = match status {
        "100" => "Continue",
        "101" => "Switching Protocols",
        "200" => "OK",
        "201" => "Created",
        "202" => "Accepted",
        "203" => "Non-Authoritative Information",
        "204" => "No Content",
        "206" => "Partial Content",
        "301" => "Moved Permanently",
        "302" => "Found",
        "303" => "See Other",
        "304" => "Not Modified",
        "307" => "Temporary Redirect",
        "308" => "Permanent Redirect",
        "400" => "Bad Request",
        "401" => "Unauthorized",
        "402" => "Payment Required",
        "403" => "Forbidden",
        "404" => "Not Found",
        "405" => "Method Not Allowed",
        "406" => "Not Acceptable",
        "408" => "Request Timeout",
        "409" => "Conflict",
        "410" => "Gone",
        "412" => "Precondition Failed",
        "413" => "Content Too Large",
        "415" => "Unsupported Media Type",
        "422" => "Unprocessable Content",
        "429" => "Too Many Requests",
        "500" => "Internal Server Error",
        "501" => "Not Implemented",
        "502" => "Bad Gateway",
        "503" => "Service Unavailable",
        "504" => "Gateway Timeout",
        "default" => "Default response",
        _ => return None,
    };
    Some(phrase)
}
