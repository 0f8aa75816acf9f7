use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Namespace of object types owned by this service.
const RBAC_NAMESPACE: &str = "rbac";

/// Namespaced object type in the relationship schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectType {
    namespace: String,
    name: String,
}

impl ObjectType {
    /// Creates an object type.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates an object type in the `rbac` namespace.
    #[must_use]
    pub fn rbac(name: impl Into<String>) -> Self {
        Self::new(RBAC_NAMESPACE, name)
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// Typed object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectReference {
    #[serde(rename = "type")]
    object_type: ObjectType,
    id: String,
}

impl ObjectReference {
    /// Creates an object reference.
    #[must_use]
    pub fn new(object_type: ObjectType, id: impl Into<String>) -> Self {
        Self {
            object_type,
            id: id.into(),
        }
    }

    /// Returns the object type.
    #[must_use]
    pub fn object_type(&self) -> &ObjectType {
        &self.object_type
    }

    /// Returns the object id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// Subject of a relationship, optionally narrowed to a relation of the subject object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectReference {
    subject: ObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relation: Option<String>,
}

impl SubjectReference {
    /// Creates a direct subject.
    #[must_use]
    pub fn direct(subject: ObjectReference) -> Self {
        Self {
            subject,
            relation: None,
        }
    }

    /// Creates a subject set, e.g. all `member`s of a group.
    #[must_use]
    pub fn with_relation(subject: ObjectReference, relation: impl Into<String>) -> Self {
        Self {
            subject,
            relation: Some(relation.into()),
        }
    }

    /// Returns the subject object.
    #[must_use]
    pub fn subject(&self) -> &ObjectReference {
        &self.subject
    }

    /// Returns the optional subject relation.
    #[must_use]
    pub fn relation(&self) -> Option<&str> {
        self.relation.as_deref()
    }
}

/// Relationship tuple `resource#relation@subject`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    resource: ObjectReference,
    relation: String,
    subject: SubjectReference,
}

impl Relationship {
    /// Creates a relationship tuple.
    #[must_use]
    pub fn new(
        resource: ObjectReference,
        relation: impl Into<String>,
        subject: SubjectReference,
    ) -> Self {
        Self {
            resource,
            relation: relation.into(),
            subject,
        }
    }

    /// Returns the resource object.
    #[must_use]
    pub fn resource(&self) -> &ObjectReference {
        &self.resource
    }

    /// Returns the relation name.
    #[must_use]
    pub fn relation(&self) -> &str {
        self.relation.as_str()
    }

    /// Returns the subject.
    #[must_use]
    pub fn subject(&self) -> &SubjectReference {
        &self.subject
    }
}

impl Display for Relationship {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let resource_type = self.resource.object_type();
        let subject = &self.subject.subject;
        let subject_type = subject.object_type();
        write!(
            formatter,
            "{}/{}:{}#{}@{}/{}:{}",
            resource_type.namespace(),
            resource_type.name(),
            self.resource.id(),
            self.relation,
            subject_type.namespace(),
            subject_type.name(),
            subject.id()
        )?;
        if let Some(relation) = self.subject.relation() {
            write!(formatter, "#{relation}")?;
        }

        Ok(())
    }
}
