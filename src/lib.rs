//! Generates OpenAPI 3.x documents from swag-style annotations in Go sources.
//!
//! The pipeline is: [`loader::GoSourceLoader`] scans the sources,
//! [`processor::generate`] folds every annotated declaration into a
//! [`models::Document`], and [`generator::Generator`] writes it as JSON.

pub mod annotation;
pub mod assembler;
pub mod error;
pub mod generator;
pub mod global;
pub mod loader;
pub mod models;
pub mod operation;
pub mod primitives;
pub mod processor;
pub mod provider;
pub mod resolver;

use log::debug;
use std::path::PathBuf;

pub use error::{Error, Result};
pub use generator::{write_document, Generator};
pub use loader::GoSourceLoader;
pub use models::Document;
pub use processor::{generate, Processor, DEFAULT_OPENAPI_VERSION};
pub use provider::{SourceLoader, TypeProvider};
pub use resolver::SchemaResolver;

/// Default output directory of the generated document
pub const DEFAULT_OUTPUT_DIR: &str = "./docs";

/// Settings of one generation run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directories (or single files) to scan for Go sources
    pub dirs: Vec<PathBuf>,
    /// Directories skipped while scanning
    pub exclude_dirs: Vec<PathBuf>,
    /// Directory receiving `openapi.json`
    pub output: PathBuf,
    /// Overrides any `@openapi` annotation
    pub openapi_version: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dirs: vec![PathBuf::from("./")],
            exclude_dirs: Vec::new(),
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            openapi_version: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.dirs.is_empty() {
            return Err(Error::InvalidConfig("no source directories given".into()));
        }
        if let Some(version) = &self.openapi_version {
            if !version.starts_with("3.") {
                return Err(Error::InvalidConfig(format!(
                    "unsupported OpenAPI version '{}', expected 3.x",
                    version
                )));
            }
        }
        Ok(())
    }
}

/// Loads the configured sources and assembles the document without writing it
pub fn build_document(config: &Config) -> Result<Document> {
    config.validate()?;
    debug!("Configuration: {:?}", config);

    let loader = GoSourceLoader::load(&config.dirs, &config.exclude_dirs)?;
    generate(&loader, &loader, config.openapi_version.as_deref())
}

/// Runs the whole pipeline and returns the path of the written document
pub fn run(config: &Config) -> Result<PathBuf> {
    let document = build_document(config)?;
    write_document(&document, &config.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParameterLocation, Schema};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    const MAIN_GO: &str = r#"package main

import "example.com/shop/api"

// @title Shop API
// @version 1.0
// @description Widgets and more.
// @server https://api.example.com name=prod Production
// @securityscheme ApiKey apiKey header X-API-Key
// @security ApiKey
// @router /ignored [get]
func main() {
	api.Serve()
}
"#;

    const TYPES_GO: &str = r#"package api

import (
	"time"

	"example.com/shop/model"
)

// Widget is sold in the shop.
type Widget struct {
	ID      int32     `json:"id"`
	Name    string    `json:"name,omitempty"`
	Created time.Time `json:"created"`
	Secret  string    `json:"-"`
}

type Node struct {
	Value string `json:"value"`
	Next  *Node  `json:"next,omitempty"`
}

type Item struct {
	Sku string `json:"sku"`
}

type Page[T any] struct {
	Items []T `json:"items"`
	Total int `json:"total"`
}

type Audited struct {
	CreatedBy string `json:"createdBy"`
}

type Order struct {
	Audited
	Lines []model.Item `json:"lines"`
}
"#;

    const HANDLERS_GO: &str = r#"package api

import (
	"net/http"

	"example.com/shop/model"
)

// GetWidget godoc
// @Summary Get a widget
// @Param id path int true "Widget ID"
// @Success 200 {object} Widget "ok"
// @Failure 404 "missing"
// @Router /widgets/{id} [get]
func GetWidget(w http.ResponseWriter, r *http.Request) {}

// @Success 200 {object} Node
// @Router /nodes [get]
func ListNodes(w http.ResponseWriter, r *http.Request) {}

// @Success 200 {object} Page[Item]
// @Router /items [get]
func LocalItems(w http.ResponseWriter, r *http.Request) {}

// @Success 200 {object} Page[model.Item]
// @Router /catalog [get]
func CatalogItems(w http.ResponseWriter, r *http.Request) {}

// @Success 200 {object} Widget
// @Router /internal [get]
// @Ignore
func Internal(w http.ResponseWriter, r *http.Request) {}

// @Summary first
// @Router /b [get]
func First() {}

// @Summary second
// @Router /b [get]
func Second() {}

// @Param order body Order true "Order"
// @Success 201 {object} Order
// @Router /orders [post]
func CreateOrder() {}

func Serve() {
	_ = model.Item{}
}
"#;

    const ITEM_GO: &str = r#"package model

type Item struct {
	ID    int64   `json:"id"`
	Price float64 `json:"price"`
}
"#;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn shop() -> TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "go.mod", "module example.com/shop\n\ngo 1.22\n");
        write(root, "cmd/main.go", MAIN_GO);
        write(root, "api/types.go", TYPES_GO);
        write(root, "api/handlers.go", HANDLERS_GO);
        write(root, "model/item.go", ITEM_GO);
        dir
    }

    fn config(root: &Path) -> Config {
        Config {
            dirs: vec![root.to_path_buf()],
            output: root.join("docs"),
            ..Default::default()
        }
    }

    #[test]
    fn test_document_info_and_paths() {
        let dir = shop();
        let doc = build_document(&config(dir.path())).unwrap();

        assert_eq!(doc.openapi, DEFAULT_OPENAPI_VERSION);
        assert_eq!(doc.info.title, "Shop API");
        assert_eq!(doc.info.version, "1.0");
        assert_eq!(doc.servers[0].url, "https://api.example.com");
        assert_eq!(doc.security[0]["ApiKey"], Vec::<String>::new());

        let paths: Vec<&str> = doc.paths.keys().map(String::as_str).collect();
        assert_eq!(
            paths,
            vec!["/widgets/{id}", "/nodes", "/items", "/catalog", "/b", "/orders"]
        );
    }

    #[test]
    fn test_widget_operation_and_schema() {
        let dir = shop();
        let doc = build_document(&config(dir.path())).unwrap();

        let get = doc.paths["/widgets/{id}"].get.as_ref().unwrap();
        assert_eq!(get.operation_id.as_deref(), Some("GetWidget"));
        assert_eq!(get.parameters[0].location, ParameterLocation::Path);
        assert_eq!(
            get.parameters[0].schema,
            Some(Schema::primitive("integer", Some("int32")))
        );
        assert_eq!(get.responses.codes["200"].description, "ok");
        assert_eq!(
            get.responses.codes["200"].content["application/json"].schema,
            Some(Schema::reference("Widget"))
        );
        assert_eq!(get.responses.codes["404"].description, "missing");
        assert!(get.responses.codes["404"].content.is_empty());

        let components = doc.components.as_ref().unwrap();
        let widget = &components.schemas["Widget"];
        assert_eq!(
            widget.properties.keys().collect::<Vec<_>>(),
            vec!["id", "name", "created"]
        );
        assert_eq!(widget.required, vec!["id", "created"]);
        assert_eq!(
            widget.properties["created"],
            Schema::primitive("string", Some("date-time"))
        );
        assert!(components.security_schemes.contains_key("ApiKey"));
    }

    #[test]
    fn test_ignored_handler_and_entry_routes_are_skipped() {
        let dir = shop();
        let doc = build_document(&config(dir.path())).unwrap();
        assert!(!doc.paths.contains_key("/internal"));
        assert!(!doc.paths.contains_key("/ignored"));
    }

    #[test]
    fn test_later_handler_overwrites_route() {
        let dir = shop();
        let doc = build_document(&config(dir.path())).unwrap();
        let get = doc.paths["/b"].get.as_ref().unwrap();
        assert_eq!(get.summary.as_deref(), Some("second"));
        assert_eq!(get.operation_id.as_deref(), Some("Second"));
    }

    #[test]
    fn test_self_reference_and_generic_names() {
        let dir = shop();
        let doc = build_document(&config(dir.path())).unwrap();
        let schemas = &doc.components.as_ref().unwrap().schemas;

        let node = &schemas["Node"];
        assert_eq!(node.properties["next"], Schema::reference("Node"));
        assert_eq!(node.required, vec!["value"]);

        let local = doc.paths["/items"].get.as_ref().unwrap();
        let catalog = doc.paths["/catalog"].get.as_ref().unwrap();
        assert_eq!(
            local.responses.codes["200"].content["application/json"].schema,
            Some(Schema::reference("PageOfItem"))
        );
        assert_eq!(
            catalog.responses.codes["200"].content["application/json"].schema,
            Some(Schema::reference("PageOfItem2"))
        );
        assert_eq!(schemas["Item"].required, vec!["sku"]);
        assert_eq!(schemas["Item2"].required, vec!["id", "price"]);
        assert_eq!(
            schemas["PageOfItem2"].properties["items"],
            Schema::array(Schema::reference("Item2"))
        );
    }

    #[test]
    fn test_embedded_fields_and_request_body() {
        let dir = shop();
        let doc = build_document(&config(dir.path())).unwrap();

        let post = doc.paths["/orders"].post.as_ref().unwrap();
        let body = post.request_body.as_ref().unwrap();
        assert!(body.required);
        assert_eq!(
            body.content["application/json"].schema,
            Some(Schema::reference("Order"))
        );

        let order = &doc.components.as_ref().unwrap().schemas["Order"];
        assert!(order.properties.contains_key("createdBy"));
        assert_eq!(
            order.properties["lines"],
            Schema::array(Schema::reference("Item2"))
        );
    }

    #[test]
    fn test_run_writes_stable_json() {
        let dir = shop();
        let mut config = config(dir.path());
        config.exclude_dirs = vec![dir.path().join("docs")];
        config.openapi_version = Some("3.1.0".to_string());

        let path = run(&config).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        run(&config).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);

        let value: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["openapi"], "3.1.0");
        assert_eq!(
            value["paths"]["/nodes"]["get"]["responses"]["200"]["content"]["application/json"]
                ["schema"]["$ref"],
            "#/components/schemas/Node"
        );
        assert!(value["components"]["schemas"]["Widget"]["properties"]
            .get("Secret")
            .is_none());
    }

    #[test]
    fn test_invalid_configuration() {
        let empty = Config {
            dirs: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(Error::InvalidConfig(_))));

        let v2 = Config {
            openapi_version: Some("2.0".to_string()),
            ..Default::default()
        };
        assert!(matches!(v2.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_broken_source_aborts_the_run() {
        let dir = shop();
        write(dir.path(), "api/broken.go", "package api\n\ntype Broken struct {\n");
        let err = run(&config(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(!dir.path().join("docs/openapi.json").exists());
    }
}
