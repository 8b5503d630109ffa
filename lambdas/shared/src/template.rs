//! CloudFormation template rewriting
//!
//! Templates are parsed as JSON first and as YAML second. YAML short-form
//! intrinsic functions (`!Ref`, `!GetAtt`, `!Sub`, ...) become their long JSON
//! form so both formats are edited as one `serde_json::Value` tree.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::errors::{Error, Result};
use crate::validation::attribute_group_name;

pub const APPLICATION_NAME_PARAMETER: &str = "AppRegistryApplicationName";
pub const ASSOCIATION_RESOURCE_TYPE: &str = "AWS::ServiceCatalogAppRegistry::AttributeGroupAssociation";
const ASSOCIATION_LOGICAL_ID_PREFIX: &str = "AppRegistryAttributeGroupAssociation";

/// A template together with the format it was read in
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedTemplate {
    Json(Value),
    Yaml(Value),
}

impl ParsedTemplate {
    pub fn parse(body: &str) -> Result<Self> {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return Ok(ParsedTemplate::Json(value));
        }

        let yaml: serde_yaml::Value = serde_yaml::from_str(body)
            .map_err(|e| Error::Template(format!("Template is neither JSON nor YAML: {}", e)))?;
        Ok(ParsedTemplate::Yaml(yaml_to_json(yaml)?))
    }

    pub fn body(&self) -> &Value {
        match self {
            ParsedTemplate::Json(v) | ParsedTemplate::Yaml(v) => v,
        }
    }

    pub fn body_mut(&mut self) -> &mut Value {
        match self {
            ParsedTemplate::Json(v) | ParsedTemplate::Yaml(v) => v,
        }
    }

    pub fn is_yaml(&self) -> bool {
        matches!(self, ParsedTemplate::Yaml(_))
    }

    /// Serialize back in the format the template was parsed from
    pub fn render(&self) -> Result<String> {
        match self {
            ParsedTemplate::Json(v) => Ok(serde_json::to_string_pretty(v)?),
            ParsedTemplate::Yaml(v) => serde_yaml::to_string(v)
                .map_err(|e| Error::Template(format!("Failed to write YAML template: {}", e))),
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Template(format!("Unsupported mapping key: {:?}", other))),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!(i)
            } else if let Some(u) = n.as_u64() {
                json!(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (k, v) in mapping {
                map.insert(yaml_key(k)?, yaml_to_json(v)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            intrinsic(tag.trim_start_matches('!'), yaml_to_json(tagged.value)?)
        }
    })
}

/// Long form of a short-form intrinsic function
fn intrinsic(name: &str, argument: Value) -> Value {
    match name {
        "Ref" => json!({ "Ref": argument }),
        "Condition" => json!({ "Condition": argument }),
        "GetAtt" => {
            let argument = match argument {
                Value::String(s) => match s.split_once('.') {
                    Some((resource, attribute)) => json!([resource, attribute]),
                    None => Value::String(s),
                },
                other => other,
            };
            json!({ "Fn::GetAtt": argument })
        }
        other => {
            let mut map = Map::new();
            map.insert(format!("Fn::{}", other), argument);
            Value::Object(map)
        }
    }
}

fn section<'a>(template: &'a mut Map<String, Value>, name: &str) -> Result<&'a mut Map<String, Value>> {
    template
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| Error::Template(format!("Template section {} is not a mapping", name)))
}

/// Add one attribute-group association per attribute plus the application
/// name parameter they reference. No-op for an empty attribute map.
pub fn embed_appregistry(template: &mut Value, attributes: &BTreeMap<String, String>) -> Result<()> {
    if attributes.is_empty() {
        return Ok(());
    }

    let root = template
        .as_object_mut()
        .ok_or_else(|| Error::Template("Template root is not a mapping".to_string()))?;

    section(root, "Parameters")?.insert(
        APPLICATION_NAME_PARAMETER.to_string(),
        json!({
            "Type": "String",
            "Description": "Name of the AppRegistry application the stack is associated with",
        }),
    );

    let resources = section(root, "Resources")?;
    for (index, (key, value)) in attributes.iter().enumerate() {
        resources.insert(
            format!("{}{}", ASSOCIATION_LOGICAL_ID_PREFIX, index),
            json!({
                "Type": ASSOCIATION_RESOURCE_TYPE,
                "Properties": {
                    "Application": { "Ref": APPLICATION_NAME_PARAMETER },
                    "AttributeGroup": attribute_group_name(key, value),
                },
            }),
        );
    }

    Ok(())
}
