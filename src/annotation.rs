use once_cell::sync::Lazy;
use regex::Regex;

static ROUTER_METHOD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\w+)\]").unwrap());

static RESPONSE_KIND_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{(\w+)\}$").unwrap());

/// Every tag the interpreters understand, in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationType {
    // Root
    OpenApi,
    SelfUri,
    JsonSchemaDialect,

    // General API info
    Title,
    Version,
    Summary,
    Description,
    TermsOfService,
    ContactName,
    ContactUrl,
    ContactEmail,
    LicenseName,
    LicenseIdentifier,
    LicenseUrl,
    Server,
    ExternalDocs,

    // Tag groups
    TagName,
    TagSummary,
    TagDesc,
    TagParent,
    TagKind,
    TagDocsUrl,
    TagDocsDesc,

    // Security
    SecurityScheme,
    SecurityScope,
    Security,

    // Operation annotations
    Router,
    Id,
    Ignore,
    Deprecated,
    Tags,
    Param,
    Accept,
    Produce,
    Success,
    Failure,
    Header,

    Unknown(String),
}

impl From<&str> for AnnotationType {
    fn from(s: &str) -> Self {
        let name = s.trim_start_matches('@').to_lowercase();
        match name.as_str() {
            "openapi" => Self::OpenApi,
            "self" => Self::SelfUri,
            "jsonschemadialect" => Self::JsonSchemaDialect,
            "title" => Self::Title,
            "version" => Self::Version,
            "summary" => Self::Summary,
            "description" => Self::Description,
            "termsofservice" => Self::TermsOfService,
            "contact.name" => Self::ContactName,
            "contact.url" => Self::ContactUrl,
            "contact.email" => Self::ContactEmail,
            "license.name" => Self::LicenseName,
            "license.identifier" => Self::LicenseIdentifier,
            "license.url" => Self::LicenseUrl,
            "server" => Self::Server,
            "externaldocs" => Self::ExternalDocs,
            "tag.name" => Self::TagName,
            "tag.summary" => Self::TagSummary,
            "tag.desc" | "tag.description" => Self::TagDesc,
            "tag.parent" => Self::TagParent,
            "tag.kind" => Self::TagKind,
            "tag.docs.url" => Self::TagDocsUrl,
            "tag.docs.desc" => Self::TagDocsDesc,
            "securityscheme" => Self::SecurityScheme,
            "securityscope" => Self::SecurityScope,
            "security" => Self::Security,
            "router" => Self::Router,
            "id" => Self::Id,
            "ignore" => Self::Ignore,
            "deprecated" => Self::Deprecated,
            "tags" => Self::Tags,
            "param" => Self::Param,
            "accept" => Self::Accept,
            "produce" => Self::Produce,
            "success" => Self::Success,
            "failure" => Self::Failure,
            "header" => Self::Header,
            _ => Self::Unknown(name),
        }
    }
}

/// One decoded comment line: canonical tag plus its free-text content
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub annotation_type: AnnotationType,
    pub content: String,
}

impl Annotation {
    /// Decodes a raw comment line; `None` when the line carries no tag
    pub fn parse(line: &str) -> Option<Self> {
        let (tag, content) = parse_comment_line(line)?;
        Some(Self {
            annotation_type: AnnotationType::from(tag.as_str()),
            content,
        })
    }
}

/// Decodes every tagged line of a comment block, skipping plain prose
pub fn parse_block<S: AsRef<str>>(lines: &[S]) -> Vec<Annotation> {
    lines
        .iter()
        .filter_map(|line| Annotation::parse(line.as_ref()))
        .collect()
}

/// Splits one comment line into a lowercase tag (sigil included) and its content.
///
/// `// @Title My API` becomes `("@title", "My API")`. Lines that do not start
/// with `@` once the comment leader is removed yield `None`.
pub fn parse_comment_line(line: &str) -> Option<(String, String)> {
    let mut text = line.trim();
    if let Some(rest) = text.strip_prefix("//") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("/*") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix('*') {
        text = rest;
    }
    let text = text.trim();
    let text = text.strip_suffix("*/").unwrap_or(text).trim();

    if !text.starts_with('@') {
        return None;
    }

    let (tag, content) = match text.split_once(char::is_whitespace) {
        Some((tag, content)) => (tag, content.trim()),
        None => (text, ""),
    };

    Some((tag.to_lowercase(), content.to_string()))
}

/// Splits on whitespace, keeping quoted runs together.
///
/// Single or double quotes delimit one token and are not emitted. A quote
/// with no closing partner swallows the rest of the line, unsplit.
pub fn split_params(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            if let Some(close) = chars[i + 1..].iter().position(|&q| q == c) {
                current.extend(&chars[i + 1..i + 1 + close]);
                in_token = true;
                i += close + 2;
                continue;
            }
            current.extend(&chars[i + 1..]);
            in_token = !current.is_empty();
            break;
        } else if c.is_whitespace() {
            if in_token {
                result.push(std::mem::take(&mut current));
                in_token = false;
            }
        } else {
            current.push(c);
            in_token = true;
        }
        i += 1;
    }

    if in_token {
        result.push(current);
    }

    result
}

/// Resolves a MIME alias (`json`, `xml`, `form`, ...) to its full type
pub fn normalize_mime_type(mime_type: &str) -> String {
    match mime_type.to_lowercase().as_str() {
        "json" => "application/json".to_string(),
        "xml" => "application/xml".to_string(),
        "plain" | "text" => "text/plain".to_string(),
        "html" => "text/html".to_string(),
        "form" | "urlencoded" | "x-www-form-urlencoded" => {
            "application/x-www-form-urlencoded".to_string()
        }
        "multipart" | "mpfd" | "form-data" => "multipart/form-data".to_string(),
        "stream" | "octet-stream" | "binary" => "application/octet-stream".to_string(),
        "json-api" => "application/vnd.api+json".to_string(),
        "json-stream" => "application/x-json-stream".to_string(),
        "png" => "image/png".to_string(),
        "jpeg" => "image/jpeg".to_string(),
        "gif" => "image/gif".to_string(),
        _ => mime_type.to_string(),
    }
}

/// Parses a comma separated MIME list: `json, xml` -> `[application/json, application/xml]`
pub fn parse_mime_types(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(normalize_mime_type)
        .collect()
}

/// Parses a route: `/users/{id} [get]` -> `("/users/{id}", "get")`.
///
/// The method defaults to `get` when no bracketed token is present.
pub fn parse_router_path(s: &str) -> (String, String) {
    match ROUTER_METHOD_REGEX.captures(s) {
        Some(captures) => {
            let method = captures[1].to_lowercase();
            let path = ROUTER_METHOD_REGEX.replace_all(s, "").trim().to_string();
            (path, method)
        }
        None => (s.trim().to_string(), "get".to_string()),
    }
}

/// Parses a comma separated tag list, dropping blanks
pub fn parse_tags(content: &str) -> Vec<String> {
    content
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decoded `@success` / `@failure` content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSpec {
    pub status: String,
    pub kind: String,
    pub target: String,
    pub description: String,
}

/// Parses `200 {object} model.User "ok"`.
///
/// Without a `{kind}` token every token after the status is description.
/// Tokens split inside generic brackets (`Page[A, B]`) are glued back together.
pub fn parse_response_type(s: &str) -> Option<ResponseSpec> {
    let params = join_unbalanced(split_params(s), '[', ']');
    let (status, rest) = params.split_first()?;

    let mut spec = ResponseSpec {
        status: status.clone(),
        ..Default::default()
    };
    let mut description = Vec::new();

    for p in rest {
        if spec.kind.is_empty() && spec.target.is_empty() && description.is_empty() {
            if let Some(captures) = RESPONSE_KIND_REGEX.captures(p) {
                spec.kind = captures[1].to_lowercase();
                continue;
            }
        }
        if !spec.kind.is_empty() && spec.target.is_empty() && description.is_empty() {
            spec.target = p.clone();
        } else {
            description.push(p.as_str());
        }
    }

    spec.description = description.join(" ");
    Some(spec)
}

/// Decoded `@header` content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderSpec {
    pub status: String,
    pub type_name: String,
    pub name: String,
    pub description: String,
}

/// Parses `200 {string} X-Rate-Limit "calls per hour"`
pub fn parse_header_line(s: &str) -> Option<HeaderSpec> {
    let params = split_params(s);
    if params.len() < 3 {
        return None;
    }

    let mut spec = HeaderSpec {
        status: params[0].clone(),
        ..Default::default()
    };
    let mut description = Vec::new();

    for p in &params[1..] {
        if p.starts_with('{') && p.ends_with('}') {
            spec.type_name = p.trim_matches(|c| c == '{' || c == '}').to_string();
        } else if spec.name.is_empty() {
            spec.name = p.clone();
        } else {
            description.push(p.as_str());
        }
    }

    spec.description = description.join(" ");
    if spec.name.is_empty() {
        return None;
    }
    Some(spec)
}

/// Parses a server line: `http://localhost:8080 name=dev Development`
pub fn parse_server_line(s: &str) -> Option<(String, Option<String>, String)> {
    let parts = split_params(s);
    let (url, rest) = parts.split_first()?;

    let mut name = None;
    let mut description = Vec::new();
    for p in rest {
        match p.strip_prefix("name=") {
            Some(n) => name = Some(n.to_string()),
            None => description.push(p.as_str()),
        }
    }

    Some((url.clone(), name, description.join(" ")))
}

/// Parses `<url> [description...]` for external documentation tags
pub fn parse_external_docs(s: &str) -> Option<(String, Option<String>)> {
    let parts = split_params(s);
    let (url, rest) = parts.split_first()?;
    let description = (!rest.is_empty()).then(|| rest.join(" "));
    Some((url.clone(), description))
}

/// Glues tokens back together while `open`/`close` delimiters are unbalanced
pub fn join_unbalanced(tokens: Vec<String>, open: char, close: char) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(tokens.len());
    let mut depth: i32 = 0;

    for token in tokens {
        let opened = token.matches(open).count() as i32;
        let closed = token.matches(close).count() as i32;
        match result.last_mut() {
            Some(last) if depth > 0 => {
                last.push(' ');
                last.push_str(&token);
            }
            _ => result.push(token),
        }
        depth = (depth + opened - closed).max(0);
    }

    result
}
