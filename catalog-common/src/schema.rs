use std::fmt;
use std::sync::Arc;

/// The scalar kinds a schema field can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarKind::String => write!(f, "string"),
            ScalarKind::Integer => write!(f, "integer"),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Boolean => write!(f, "boolean"),
        }
    }
}

/// Description of the shape a single field is coerced into.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Scalar(ScalarKind),
    SequenceOf(Box<TypeDescriptor>),
    /// Mapping keys are always narrowed to a scalar kind, as JSON object keys are strings.
    MappingOf(ScalarKind, Box<TypeDescriptor>),
    SchemaRef(Arc<Schema>),
}

impl TypeDescriptor {
    pub fn string() -> Self {
        TypeDescriptor::Scalar(ScalarKind::String)
    }

    pub fn integer() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Integer)
    }

    pub fn float() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Float)
    }

    pub fn boolean() -> Self {
        TypeDescriptor::Scalar(ScalarKind::Boolean)
    }

    pub fn sequence_of(item: TypeDescriptor) -> Self {
        TypeDescriptor::SequenceOf(Box::new(item))
    }

    pub fn mapping_of(key: ScalarKind, value: TypeDescriptor) -> Self {
        TypeDescriptor::MappingOf(key, Box::new(value))
    }

    pub fn schema(schema: &Arc<Schema>) -> Self {
        TypeDescriptor::SchemaRef(schema.clone())
    }
}

/// An ordered set of named fields, each with a `TypeDescriptor`.
///
/// Schemas are immutable once provided by a `SchemaBuilder`, and a builder can only reference
/// schemas that already exist. The reference graph is therefore acyclic, which is what lets
/// the marshaller recurse without a depth bound.
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<(String, TypeDescriptor)>,
}

impl Schema {
    pub fn build(name: &str) -> SchemaBuilder {
        SchemaBuilder {
            name: name.to_owned(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterate over fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &TypeDescriptor)> {
        self.fields
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub struct SchemaBuilder {
    name: String,
    fields: Vec<(String, TypeDescriptor)>,
}

impl SchemaBuilder {
    /// Declare a field. Declaring the same name twice replaces the descriptor in place.
    pub fn field(mut self, name: &str, descriptor: TypeDescriptor) -> Self {
        match self.fields.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = descriptor,
            None => self.fields.push((name.to_owned(), descriptor)),
        }
        self
    }

    pub fn provide(self) -> Arc<Schema> {
        Arc::new(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}
