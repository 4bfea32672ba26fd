use indexmap::IndexMap;
use log::{debug, warn};

use crate::models::{Document, HttpMethod, Operation, ParsedOperation, Schema};

/// Merges a finished operation into `doc.paths`.
///
/// The path item is created on first use. An operation already stored under
/// the same path and method is replaced. Methods outside the fixed set land
/// in `additionalOperations`, keyed by their upper-case name.
pub fn add_operation(doc: &mut Document, path: &str, method: &str, operation: Operation) {
    let item = doc.paths.entry(path.to_string()).or_default();

    let replaced = match HttpMethod::parse(method) {
        Some(method) => item.slot_mut(method).replace(operation).is_some(),
        None => item
            .additional_operations
            .insert(method.to_uppercase(), operation)
            .is_some(),
    };

    if replaced {
        warn!(
            "Operation {} {} declared more than once, keeping the last one",
            method.to_uppercase(),
            path
        );
    }
}

/// Merges a parsed operation at its own path and method
pub fn add_parsed_operation(doc: &mut Document, parsed: ParsedOperation) {
    add_operation(doc, &parsed.path, &parsed.method, parsed.operation);
}

/// Appends resolved component schemas to `doc.components.schemas`
pub fn materialize_schemas(doc: &mut Document, schemas: IndexMap<String, Schema>) {
    if schemas.is_empty() {
        return;
    }
    let components = &mut doc.components_mut().schemas;
    for (name, schema) in schemas {
        debug!("Adding component schema {}", name);
        components.insert(name, schema);
    }
}
