use log::{debug, warn};
use url::Url;

use crate::annotation::{
    parse_block, parse_external_docs, parse_server_line, split_params, AnnotationType,
};
use crate::models::{
    append_line, Contact, Document, ExternalDocs, License, OAuthFlow, OAuthFlows,
    SecurityRequirement, SecurityScheme, Server, Tag,
};

/// Applies the annotations of the program entry point to the document
pub fn parse_global_annotations<S: AsRef<str>>(doc: &mut Document, lines: &[S]) {
    // Index into doc.tags of the group the tag.* annotations apply to
    let mut current_tag: Option<usize> = None;

    for annotation in parse_block(lines) {
        let content = annotation.content;
        match annotation.annotation_type {
            AnnotationType::OpenApi => doc.openapi = content,
            AnnotationType::SelfUri => doc.self_uri = Some(content),
            AnnotationType::JsonSchemaDialect => doc.json_schema_dialect = Some(content),

            AnnotationType::Title => doc.info.title = content,
            AnnotationType::Version => doc.info.version = content,
            AnnotationType::Summary => doc.info.summary = Some(content),
            AnnotationType::Description => append_line(&mut doc.info.description, &content),
            AnnotationType::TermsOfService => doc.info.terms_of_service = Some(content),

            AnnotationType::ContactName => contact(doc).name = Some(content),
            AnnotationType::ContactUrl => contact(doc).url = Some(content),
            AnnotationType::ContactEmail => contact(doc).email = Some(content),

            AnnotationType::LicenseName => license(doc).name = content,
            AnnotationType::LicenseIdentifier => license(doc).identifier = Some(content),
            AnnotationType::LicenseUrl => license(doc).url = Some(content),

            AnnotationType::Server => {
                if let Some(server) = parse_server(&content) {
                    doc.servers.push(server);
                }
            }
            AnnotationType::ExternalDocs => {
                if let Some((url, description)) = parse_external_docs(&content) {
                    doc.external_docs = Some(ExternalDocs { description, url });
                }
            }

            AnnotationType::TagName => {
                if content.is_empty() {
                    warn!("Ignoring @tag.name without a name");
                    continue;
                }
                doc.tags.push(Tag {
                    name: content,
                    ..Default::default()
                });
                current_tag = Some(doc.tags.len() - 1);
            }
            AnnotationType::TagSummary => {
                if let Some(tag) = tag_at(doc, current_tag) {
                    tag.summary = Some(content);
                }
            }
            AnnotationType::TagDesc => {
                if let Some(tag) = tag_at(doc, current_tag) {
                    append_line(&mut tag.description, &content);
                }
            }
            AnnotationType::TagParent => {
                if let Some(tag) = tag_at(doc, current_tag) {
                    tag.parent = Some(content);
                }
            }
            AnnotationType::TagKind => {
                if let Some(tag) = tag_at(doc, current_tag) {
                    tag.kind = Some(content);
                }
            }
            AnnotationType::TagDocsUrl => {
                if let Some(tag) = tag_at(doc, current_tag) {
                    tag.external_docs.get_or_insert_with(ExternalDocs::default).url = content;
                }
            }
            AnnotationType::TagDocsDesc => {
                if let Some(tag) = tag_at(doc, current_tag) {
                    tag.external_docs
                        .get_or_insert_with(ExternalDocs::default)
                        .description = Some(content);
                }
            }

            AnnotationType::SecurityScheme => parse_security_scheme(doc, &content),
            AnnotationType::SecurityScope => parse_security_scope(doc, &content),
            AnnotationType::Security => {
                if let Some(requirement) = parse_security_requirement(&content) {
                    doc.security.push(requirement);
                }
            }

            other => debug!("Ignoring {:?} on the entry point", other),
        }
    }
}

fn contact(doc: &mut Document) -> &mut Contact {
    doc.info.contact.get_or_insert_with(Contact::default)
}

fn license(doc: &mut Document) -> &mut License {
    doc.info.license.get_or_insert_with(License::default)
}

fn tag_at(doc: &mut Document, index: Option<usize>) -> Option<&mut Tag> {
    match index {
        Some(i) => doc.tags.get_mut(i),
        None => {
            warn!("Tag attribute given before any @tag.name, ignoring it");
            None
        }
    }
}

fn parse_server(content: &str) -> Option<Server> {
    let (url, name, description) = parse_server_line(content)?;
    if !url.starts_with('/') && Url::parse(&url).is_err() {
        warn!("Server URL '{}' is neither absolute nor root-relative", url);
    }
    Some(Server {
        url,
        description: (!description.is_empty()).then_some(description),
        name,
    })
}

/// `<scheme> [scopes...]`; scopes may also be comma separated
pub(crate) fn parse_security_requirement(content: &str) -> Option<SecurityRequirement> {
    let params = split_params(content);
    let (name, scopes) = params.split_first()?;
    let scopes = scopes
        .iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let mut requirement = SecurityRequirement::new();
    requirement.insert(name.clone(), scopes);
    Some(requirement)
}

/// `<name> <type> [args...]`
///
/// - apiKey: `<name> apiKey <in> <param>`
/// - http: `<name> http <scheme> [bearerFormat]`
/// - oauth2: `<name> oauth2 <flow> <url> [tokenUrl]`
/// - openIdConnect: `<name> openIdConnect <url>`
/// - mutualTLS: `<name> mutualTLS`
fn parse_security_scheme(doc: &mut Document, content: &str) {
    let params = split_params(content);
    if params.len() < 2 {
        warn!("@securityScheme needs a name and a type: '{}'", content);
        return;
    }

    let name = params[0].clone();
    let arg = |i: usize| params.get(i).cloned();

    let scheme = match params[1].to_lowercase().as_str() {
        "apikey" => SecurityScheme {
            type_: "apiKey".to_string(),
            in_: arg(2),
            name: arg(3),
            ..Default::default()
        },
        "http" => SecurityScheme {
            type_: "http".to_string(),
            scheme: arg(2),
            bearer_format: arg(3),
            ..Default::default()
        },
        "oauth2" => SecurityScheme {
            type_: "oauth2".to_string(),
            flows: match (arg(2), arg(3)) {
                (Some(flow), Some(url)) => create_oauth_flows(&flow, url, arg(4)),
                _ => None,
            },
            ..Default::default()
        },
        "openidconnect" => SecurityScheme {
            type_: "openIdConnect".to_string(),
            open_id_connect_url: arg(2),
            ..Default::default()
        },
        "mutualtls" => SecurityScheme {
            type_: "mutualTLS".to_string(),
            ..Default::default()
        },
        other => SecurityScheme {
            type_: other.to_string(),
            ..Default::default()
        },
    };

    debug!("Declared security scheme {} ({})", name, scheme.type_);
    doc.components_mut().security_schemes.insert(name, scheme);
}

fn create_oauth_flows(flow_type: &str, url: String, token_url: Option<String>) -> Option<OAuthFlows> {
    let mut flows = OAuthFlows::default();
    match flow_type.to_lowercase().as_str() {
        "implicit" => {
            flows.implicit = Some(OAuthFlow {
                authorization_url: Some(url),
                ..Default::default()
            })
        }
        "password" => {
            flows.password = Some(OAuthFlow {
                token_url: Some(url),
                ..Default::default()
            })
        }
        "clientcredentials" | "application" => {
            flows.client_credentials = Some(OAuthFlow {
                token_url: Some(url),
                ..Default::default()
            })
        }
        "authorizationcode" | "accesscode" => {
            flows.authorization_code = Some(OAuthFlow {
                authorization_url: Some(url),
                token_url,
                ..Default::default()
            })
        }
        other => {
            warn!("Unknown OAuth2 flow '{}'", other);
            return None;
        }
    }
    Some(flows)
}

/// `<scheme> <scope> <description...>`; adds the scope to every declared flow
fn parse_security_scope(doc: &mut Document, content: &str) {
    let params = split_params(content);
    if params.len() < 3 {
        return;
    }

    let scheme_name = &params[0];
    let scope = &params[1];
    let description = params[2..].join(" ");

    let flows = doc
        .components
        .as_mut()
        .and_then(|c| c.security_schemes.get_mut(scheme_name))
        .and_then(|s| s.flows.as_mut());

    match flows {
        Some(flows) => {
            for flow in flows.declared_mut() {
                flow.scopes.insert(scope.clone(), description.clone());
            }
        }
        None => debug!("Scope {} names undeclared OAuth2 scheme {}", scope, scheme_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn parse(lines: &[&str]) -> Document {
        let mut doc = Document::default();
        parse_global_annotations(&mut doc, lines);
        doc
    }

    #[test]
    fn test_info_fields() {
        let doc = parse(&[
            "// @OpenAPI 3.1.0",
            "// @Title Pet Store",
            "// @Version 1.2.3",
            "// @Description First line",
            "// @Description Second line",
            "// @TermsOfService https://example.com/terms",
            "// @Contact.Name API Team",
            "// @Contact.Email team@example.com",
            "// @License.Name MIT",
            "// @License.Identifier MIT",
        ]);

        assert_eq!(doc.openapi, "3.1.0");
        assert_eq!(doc.info.title, "Pet Store");
        assert_eq!(doc.info.version, "1.2.3");
        assert_eq!(doc.info.description.as_deref(), Some("First line\nSecond line"));
        assert_eq!(doc.info.terms_of_service.as_deref(), Some("https://example.com/terms"));
        let contact = doc.info.contact.unwrap();
        assert_eq!(contact.name.as_deref(), Some("API Team"));
        assert_eq!(contact.email.as_deref(), Some("team@example.com"));
        let license = doc.info.license.unwrap();
        assert_eq!(license.name, "MIT");
        assert_eq!(license.identifier.as_deref(), Some("MIT"));
    }

    #[test]
    fn test_servers() {
        let doc = parse(&[
            "// @Server https://api.example.com name=prod Production",
            "// @Server /v1",
            "// @Server localhost:8080",
        ]);
        assert_eq!(doc.servers.len(), 3);
        assert_eq!(doc.servers[0].name.as_deref(), Some("prod"));
        assert_eq!(doc.servers[0].description.as_deref(), Some("Production"));
        assert_eq!(doc.servers[1].url, "/v1");
        assert_eq!(doc.servers[1].description, None);
        assert_eq!(doc.servers[2].url, "localhost:8080");
    }

    #[test]
    fn test_tag_groups_follow_the_cursor() {
        let doc = parse(&[
            "// @Tag.Summary orphan",
            "// @Tag.Name users",
            "// @Tag.Desc User operations",
            "// @Tag.Docs.Url https://docs.example.com/users",
            "// @Tag.Name admin",
            "// @Tag.Parent users",
            "// @Tag.Kind nav",
            "// @Tag.Description Admin only",
        ]);

        assert_eq!(doc.tags.len(), 2);
        assert_eq!(doc.tags[0].name, "users");
        assert_eq!(doc.tags[0].summary, None);
        assert_eq!(doc.tags[0].description.as_deref(), Some("User operations"));
        assert_eq!(
            doc.tags[0].external_docs.as_ref().map(|d| d.url.as_str()),
            Some("https://docs.example.com/users")
        );
        assert_eq!(doc.tags[1].parent.as_deref(), Some("users"));
        assert_eq!(doc.tags[1].kind.as_deref(), Some("nav"));
        assert_eq!(doc.tags[1].description.as_deref(), Some("Admin only"));
    }

    #[test]
    fn test_security_schemes_and_scopes() {
        let doc = parse(&[
            "// @SecurityScope OAuth read:early declared before scheme",
            "// @SecurityScheme ApiKey apiKey header X-API-Key",
            "// @SecurityScheme Bearer http bearer JWT",
            "// @SecurityScheme OAuth oauth2 authorizationCode https://auth/authorize https://auth/token",
            "// @SecurityScope OAuth read:users Read user data",
            "// @SecurityScope Bearer write nothing happens",
            "// @SecurityScope Missing write nothing happens",
            "// @Security ApiKey",
            "// @Security OAuth read:users,write:users",
        ]);

        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert_eq!(schemes["ApiKey"].type_, "apiKey");
        assert_eq!(schemes["ApiKey"].in_.as_deref(), Some("header"));
        assert_eq!(schemes["ApiKey"].name.as_deref(), Some("X-API-Key"));
        assert_eq!(schemes["Bearer"].scheme.as_deref(), Some("bearer"));
        assert_eq!(schemes["Bearer"].bearer_format.as_deref(), Some("JWT"));
        assert_eq!(schemes["Bearer"].flows, None);

        let flow = schemes["OAuth"]
            .flows
            .as_ref()
            .and_then(|f| f.authorization_code.as_ref())
            .unwrap();
        assert_eq!(flow.authorization_url.as_deref(), Some("https://auth/authorize"));
        assert_eq!(flow.token_url.as_deref(), Some("https://auth/token"));
        let mut scopes = IndexMap::new();
        scopes.insert("read:users".to_string(), "Read user data".to_string());
        assert_eq!(flow.scopes, scopes);

        assert_eq!(doc.security.len(), 2);
        assert_eq!(doc.security[0]["ApiKey"], Vec::<String>::new());
        assert_eq!(doc.security[1]["OAuth"], vec!["read:users", "write:users"]);
    }

    #[test]
    fn test_empty_tag_name_keeps_the_current_tag() {
        let doc = parse(&[
            "// @Tag.Name users",
            "// @Tag.Name",
            "// @Tag.Desc User operations",
        ]);
        assert_eq!(doc.tags.len(), 1);
        assert_eq!(doc.tags[0].name, "users");
        assert_eq!(doc.tags[0].description.as_deref(), Some("User operations"));
    }

    #[test]
    fn test_oauth_without_url_has_no_flows() {
        let doc = parse(&[
            "// @SecurityScheme OAuth oauth2 implicit",
            "// @SecurityScope OAuth read Read",
        ]);
        let schemes = &doc.components.unwrap().security_schemes;
        assert_eq!(schemes["OAuth"].flows, None);
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let doc = parse(&["// @SecurityScheme Lonely", "// @Security", "// @ExternalDocs"]);
        assert!(doc.components.is_none());
        assert!(doc.security.is_empty());
        assert!(doc.external_docs.is_none());
    }
}
