use log::{debug, info, warn};

use crate::assembler::{add_parsed_operation, materialize_schemas};
use crate::error::Result;
use crate::global::parse_global_annotations;
use crate::models::Document;
use crate::operation::parse_operation;
use crate::provider::{Declaration, SourceLoader, TypeProvider};
use crate::resolver::SchemaResolver;

/// OpenAPI version written when neither `@openapi` nor configuration sets one
pub const DEFAULT_OPENAPI_VERSION: &str = "3.2.0";

/// Folds declarations, in order, into one document
pub struct Processor<'p> {
    document: Document,
    resolver: SchemaResolver<'p>,
    global_parsed: bool,
}

impl<'p> Processor<'p> {
    pub fn new(provider: &'p dyn TypeProvider) -> Self {
        Self {
            document: Document::default(),
            resolver: SchemaResolver::new(provider),
            global_parsed: false,
        }
    }

    /// Runs the interpreter a declaration calls for.
    ///
    /// The entry point feeds the global interpreter, once. Any other
    /// declaration mentioning `@router` is parsed as an operation and merged.
    pub fn process(&mut self, decl: &Declaration) {
        if decl.is_entry {
            if self.global_parsed {
                warn!("Ignoring annotations of a second entry point {}", decl.name);
            } else {
                debug!("Parsing global annotations on {}", decl.name);
                parse_global_annotations(&mut self.document, &decl.doc);
                self.global_parsed = true;
            }
            return;
        }

        if !has_router_annotation(&decl.doc) {
            return;
        }

        if let Some(parsed) = parse_operation(&mut self.resolver, &decl.scope, &decl.name, &decl.doc) {
            add_parsed_operation(&mut self.document, parsed);
        }
        materialize_schemas(&mut self.document, self.resolver.take_schemas());
    }

    /// Completes the document: fills in the OpenAPI version and drops empty components
    pub fn finish(mut self, openapi_version: Option<&str>) -> Document {
        materialize_schemas(&mut self.document, self.resolver.take_schemas());

        if let Some(version) = openapi_version {
            self.document.openapi = version.to_string();
        } else if self.document.openapi.is_empty() {
            self.document.openapi = DEFAULT_OPENAPI_VERSION.to_string();
        }

        if self.document.components.as_ref().is_some_and(|c| c.is_empty()) {
            self.document.components = None;
        }
        if !self.global_parsed {
            warn!("No entry point found, the document has no API info");
        }

        self.document
    }
}

/// True when any line of the block mentions `@router`, in any casing
fn has_router_annotation<S: AsRef<str>>(lines: &[S]) -> bool {
    lines
        .iter()
        .any(|line| line.as_ref().to_lowercase().contains("@router"))
}

/// Builds the document from every declaration the loader yields.
///
/// Loader failures abort the run; nothing partial is returned.
/// `openapi_version` overrides any `@openapi` annotation.
pub fn generate(
    loader: &dyn SourceLoader,
    provider: &dyn TypeProvider,
    openapi_version: Option<&str>,
) -> Result<Document> {
    let declarations = loader.declarations()?;
    info!("Processing {} annotated declarations", declarations.len());

    let mut processor = Processor::new(provider);
    for decl in &declarations {
        processor.process(decl);
    }

    let document = processor.finish(openapi_version);
    info!(
        "Generated {} paths and {} component schemas",
        document.paths.len(),
        document.components.as_ref().map_or(0, |c| c.schemas.len())
    );
    Ok(document)
}
