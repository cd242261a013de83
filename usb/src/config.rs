use crate::error::{Result, UltimarcError};
use jsonschema::Validator;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use ultimarc_types::{DeviceClass, ResourceType, Rgb};

/// The schemas shipped with this crate. Every config document must satisfy `Base` first, then
/// the schema matching its resource type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    Base,
    UsbButtonColor,
}

impl Schema {
    pub fn for_resource(resource_type: ResourceType) -> Self {
        match resource_type {
            ResourceType::UsbButtonColor => Schema::UsbButtonColor,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Schema::Base => "base",
            Schema::UsbButtonColor => "usb-button-color",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Schema::Base => include_str!("../schemas/base.schema.json"),
            Schema::UsbButtonColor => include_str!("../schemas/usb-button-color.schema.json"),
        }
    }

    pub fn document(&self) -> Result<Value> {
        serde_json::from_str(self.source()).map_err(|e| UltimarcError::SchemaCompilation {
            schema: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

fn compile(name: &str, schema: &Value) -> Result<Validator> {
    Validator::new(schema).map_err(|e| UltimarcError::SchemaCompilation {
        schema: name.to_string(),
        message: e.to_string(),
    })
}

fn check(name: &str, schema: &Value, document: &Value) -> Result<()> {
    let validator = compile(name, schema)?;
    if let Err(e) = validator.validate(document) {
        return Err(UltimarcError::SchemaViolation {
            schema: name.to_string(),
            message: e.to_string(),
        });
    }
    Ok(())
}

/// A config document which passed the base schema and whose resource type is one the caller
/// accepts. It's built per call and consumed straight away, nothing here is cached.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    document: Value,
    resource_type: ResourceType,
    device_class: String,
}

impl ValidatedConfig {
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn device_class(&self) -> &str {
        &self.device_class
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn ensure_device_class(&self, expected: DeviceClass) -> Result<()> {
        if self.device_class != expected.class_id() {
            error!("Configuration device class is not \"{}\".", expected);
            return Err(UltimarcError::DeviceClassMismatch {
                expected: expected.to_string(),
                found: self.device_class.clone(),
            });
        }
        Ok(())
    }

    /// Deserialises the document into a typed resource, only call this after the resource schema
    /// has passed.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.document.clone()).map_err(UltimarcError::InvalidJson)
    }
}

/// The `colorRGB` payload of a `usb-button-color` document.
#[derive(Debug, Clone, Deserialize)]
pub struct ButtonColorConfig {
    #[serde(rename = "colorRGB")]
    pub color_rgb: Rgb,
}

pub fn load_schema(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path).map_err(|source| UltimarcError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|e| UltimarcError::SchemaCompilation {
        schema: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Reads the config at `path`, validates it against the base schema, and checks its
/// `resourceType` is one of `accepted`.
pub fn validate_base(path: &Path, accepted: &[ResourceType]) -> Result<ValidatedConfig> {
    let contents = fs::read_to_string(path).map_err(|source| UltimarcError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let document: Value = serde_json::from_str(&contents).map_err(|e| {
        error!("Configuration file is not valid JSON.");
        UltimarcError::InvalidJson(e)
    })?;

    let base = Schema::Base;
    if let Err(e) = check(base.name(), &base.document()?, &document) {
        error!("Configuration file did not validate against the base schema.\n{}", e);
        return Err(e);
    }

    // The base schema guarantees both of these are strings.
    let found = document["resourceType"].as_str().unwrap_or_default().to_string();
    let device_class = document["deviceClass"].as_str().unwrap_or_default().to_string();

    let resource_type = match ResourceType::from_str(&found) {
        Ok(resource_type) if accepted.contains(&resource_type) => resource_type,
        _ => {
            let accepted: Vec<String> = accepted.iter().map(|r| r.to_string()).collect();
            error!(
                "Resource type does not match accepted types ({}).",
                accepted.join(",")
            );
            return Err(UltimarcError::UnsupportedResourceType { found, accepted });
        }
    };

    debug!("Loaded {} configuration from {:?}", resource_type, path);
    Ok(ValidatedConfig {
        document,
        resource_type,
        device_class,
    })
}

/// Validates an already base-checked config against one of the bundled resource schemas.
pub fn validate_resource(config: &ValidatedConfig, schema: Schema) -> Result<()> {
    let result = check(schema.name(), &schema.document()?, config.document());
    if result.is_err() {
        error!("Configuration file did not validate against config schema.");
    }
    result
}

/// As `validate_resource`, with the resource schema read from disk.
pub fn validate_resource_file(config: &ValidatedConfig, schema_path: &Path) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let result = check(&schema_path.display().to_string(), &schema, config.document());
    if result.is_err() {
        error!("Configuration file did not validate against config schema.");
    }
    result
}

/// Yes / No check of a document against a schema, logging the reason on failure.
pub fn validate_config(document: &Value, schema: &Value) -> bool {
    match check("config", schema, document) {
        Ok(()) => true,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}
