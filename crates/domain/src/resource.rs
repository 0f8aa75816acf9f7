use std::fmt::{Display, Formatter};
use std::str::FromStr;

use relata_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming::canonical_name;
use crate::relationship::ObjectType;

/// Resource type that is privileged as the default binding target.
pub const WORKSPACE_RESOURCE_TYPE: &str = "workspace";

/// Operator of a legacy attribute filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOperation {
    /// Single literal value.
    Equal,
    /// List of literal values.
    In,
}

impl ResourceOperation {
    /// Returns a stable storage value for this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::In => "in",
        }
    }
}

impl FromStr for ResourceOperation {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "equal" => Ok(Self::Equal),
            "in" => Ok(Self::In),
            _ => Err(AppError::Validation(format!(
                "unknown resource definition operation '{value}'"
            ))),
        }
    }
}

/// Attribute filter restricting a legacy grant to specific resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    key: String,
    operation: ResourceOperation,
    value: String,
}

impl ResourceDefinition {
    /// Creates a resource definition from its attribute filter parts.
    ///
    /// `key` is the dotted resource type, e.g. `inventory.groups.id`.
    pub fn new(
        key: impl Into<String>,
        operation: ResourceOperation,
        value: impl Into<String>,
    ) -> AppResult<Self> {
        let key = key.into();
        if !key.contains('.') {
            return Err(AppError::Validation(format!(
                "resource definition key '{key}' must have the form 'application.resource'"
            )));
        }

        Ok(Self {
            key,
            operation,
            value: value.into(),
        })
    }

    /// Returns the dotted attribute key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Returns the filter operator.
    #[must_use]
    pub fn operation(&self) -> ResourceOperation {
        self.operation
    }

    /// Returns the raw literal value.
    #[must_use]
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Returns the relationship-model resource type named by the key.
    pub fn v2_resource_type(&self) -> AppResult<String> {
        let Some((application, resource)) = self.key.split_once('.') else {
            return Err(AppError::Validation(format!(
                "resource definition key '{}' must have the form 'application.resource'",
                self.key
            )));
        };

        Ok(format!(
            "{}/{}",
            canonical_name(application),
            canonical_name(resource)
        ))
    }

    /// Expands the literal into resource ids.
    ///
    /// `None` marks a JSON `null`, which callers resolve for workspace resources.
    pub fn resource_ids(&self) -> AppResult<Vec<Option<String>>> {
        match self.operation {
            ResourceOperation::In => match serde_json::from_str::<Value>(self.value.as_str()) {
                Ok(Value::Array(items)) => items
                    .into_iter()
                    .map(|item| json_resource_id(item, self.value.as_str()))
                    .collect(),
                Ok(scalar) => Ok(vec![json_resource_id(scalar, self.value.as_str())?]),
                Err(_) => Ok(self
                    .value
                    .split(',')
                    .map(|part| Some(part.to_owned()))
                    .collect()),
            },
            ResourceOperation::Equal => {
                let scalar =
                    serde_json::from_str::<Value>(self.value.as_str()).map_err(|error| {
                        AppError::Validation(format!(
                            "resource definition value '{}' is not a JSON literal: {error}",
                            self.value
                        ))
                    })?;
                Ok(vec![json_resource_id(scalar, self.value.as_str())?])
            }
        }
    }
}

fn json_resource_id(value: Value, literal: &str) -> AppResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value)),
        Value::Number(value) => Ok(Some(value.to_string())),
        Value::Bool(value) => Ok(Some(value.to_string())),
        Value::Array(_) | Value::Object(_) => Err(AppError::Validation(format!(
            "resource definition value '{literal}' contains a non-scalar resource id"
        ))),
    }
}

/// Concrete resource a permission or binding applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundResource {
    resource_type: String,
    resource_id: String,
}

impl BoundResource {
    /// Creates a bound resource.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Creates a workspace bound resource.
    #[must_use]
    pub fn workspace(resource_id: impl Into<String>) -> Self {
        Self::new(WORKSPACE_RESOURCE_TYPE, resource_id)
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.resource_type.as_str()
    }

    /// Returns the resource id.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        self.resource_id.as_str()
    }

    /// Returns whether the resource is a workspace.
    #[must_use]
    pub fn is_workspace(&self) -> bool {
        self.resource_type == WORKSPACE_RESOURCE_TYPE
    }

    /// Returns the relationship object type of the resource.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        if self.is_workspace() {
            return ObjectType::rbac(WORKSPACE_RESOURCE_TYPE);
        }

        match self.resource_type.split_once('/') {
            Some((namespace, name)) => ObjectType::new(namespace, name),
            None => ObjectType::rbac(self.resource_type.as_str()),
        }
    }
}

impl Display for BoundResource {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource_type, self.resource_id)
    }
}
