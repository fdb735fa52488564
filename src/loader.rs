//! Document and schema loading from various sources.
//!
//! Documents are opened as [`Source`]s: files and strings can seek, stdin and HTTP
//! bodies cannot. Schema definitions are JSON files describing records by type
//! expression.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{LoadError, SchemaError};
use crate::schema::{FieldDescriptor, Schema, TypeRef};
use crate::stream::Source;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a document file. The resulting source can rewind.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::ReadError` if it cannot be opened.
pub fn open_document(path: &Path) -> Result<Source, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Source::seekable(file))
}

/// Open an in-memory document.
pub fn open_document_str(content: &str) -> Source {
    Source::from_string(content)
}

/// Open a document from any reader. The resulting source cannot rewind.
pub fn open_reader<R: Read + 'static>(reader: R) -> Source {
    Source::forward_only(reader)
}

/// Stream a document from an HTTP/HTTPS URL. The body is read as it arrives, so
/// the source cannot rewind.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the server answers
/// with an error status.
#[cfg(feature = "remote")]
pub fn open_document_url(url: &str) -> Result<Source, LoadError> {
    let response = fetch(url)?;
    Ok(Source::forward_only(response))
}

#[cfg(feature = "remote")]
fn fetch(url: &str) -> Result<reqwest::blocking::Response, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    // Check for HTTP errors before handing out the body
    response
        .error_for_status()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Open a document from a file path, a URL, or `-` for stdin.
///
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn open_document_auto(source: &str) -> Result<Source, LoadError> {
    if source == "-" {
        return Ok(open_reader(std::io::stdin()));
    }
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            open_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        open_document(Path::new(source))
    }
}

/// Load a schema definition from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// `LoadError::InvalidJson` if the file isn't valid JSON,
/// or `LoadError::Schema` if the definition is malformed.
pub fn load_schema(path: &Path) -> Result<Schema, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_schema_str(&content)
}

/// Load a schema definition from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON,
/// or `LoadError::Schema` if the definition is malformed.
pub fn load_schema_str(content: &str) -> Result<Schema, LoadError> {
    let definition: Value =
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    Ok(schema_from_definition(&definition)?)
}

/// Load a schema definition from an HTTP/HTTPS URL.
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails,
/// or `LoadError::InvalidJson` if the response isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_schema_url(url: &str) -> Result<Schema, LoadError> {
    let definition: Value = fetch(url)?
        .json()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;
    Ok(schema_from_definition(&definition)?)
}

/// Load a schema definition from a file path or URL.
pub fn load_schema_auto(source: &str) -> Result<Schema, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_schema_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_schema(Path::new(source))
    }
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDefinition {
        path: path.into(),
        message: message.into(),
    }
}

/// Build a schema from `{"root": ..., "records": {name: {field: spec}}}`.
fn schema_from_definition(definition: &Value) -> Result<Schema, SchemaError> {
    let root = definition
        .get("root")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("/root", "expected the root record name"))?;
    let records = definition
        .get("records")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("/records", "expected an object of records"))?;

    let mut builder = Schema::builder(root);
    for (name, fields) in records {
        let fields = fields
            .as_object()
            .ok_or_else(|| invalid(format!("/records/{}", name), "expected an object of fields"))?;
        let fields = fields
            .iter()
            .map(|(field, spec)| {
                let at = format!("/records/{}/{}", name, field);
                Ok((field.clone(), field_from_definition(&at, spec)?))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        builder = builder.with_record(name.clone(), fields);
    }
    builder.build()
}

fn field_from_definition(at: &str, spec: &Value) -> Result<FieldDescriptor, SchemaError> {
    match spec {
        Value::String(expr) => Ok(FieldDescriptor::new(expr.parse()?)),
        Value::Object(map) => field_from_object(at, map),
        _ => Err(invalid(at, "expected a type expression or a field object")),
    }
}

fn field_from_object(at: &str, map: &Map<String, Value>) -> Result<FieldDescriptor, SchemaError> {
    if let Some(key) = map
        .keys()
        .find(|key| !matches!(key.as_str(), "type" | "alias" | "default"))
    {
        return Err(invalid(at, format!("unknown key \"{}\"", key)));
    }
    let ty: TypeRef = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(at, "missing \"type\""))?
        .parse()?;
    let mut descriptor = FieldDescriptor::new(ty);
    match map.get("alias") {
        None => {}
        Some(Value::String(alias)) => descriptor = descriptor.alias(alias.clone()),
        Some(_) => return Err(invalid(at, "\"alias\" must be a string")),
    }
    if let Some(default) = map.get("default") {
        descriptor = descriptor.default_value(default.clone());
    }
    Ok(descriptor)
}
