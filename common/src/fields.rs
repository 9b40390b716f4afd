use serde::{Deserialize, Serialize};

pub const ID_FIELD: &str = "_id";
pub const CREATION_TIME_FIELD: &str = "_creationTime";

/// Declared type of a table field as reported by the schema service
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Id,
    Object,
    Array,
    Bytes,
    Null,
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Id => "id",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Bytes => "bytes",
            FieldType::Null => "null",
            FieldType::Any => "any",
        }
    }

    /// Lenient parse: schema services disagree on names, anything unrecognized is `Any`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => FieldType::String,
            "number" | "float64" | "int64" | "bigint" | "float" | "integer" => FieldType::Number,
            "boolean" | "bool" => FieldType::Boolean,
            "id" => FieldType::Id,
            "object" | "record" => FieldType::Object,
            "array" => FieldType::Array,
            "bytes" => FieldType::Bytes,
            "null" => FieldType::Null,
            _ => FieldType::Any,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(FieldType::parse_lenient(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "fieldName")]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub optional: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType, optional: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional,
        }
    }

    pub fn is_system(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// Implicit fields every document carries, regardless of declared schema.
pub fn system_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new(ID_FIELD, FieldType::Id, false),
        FieldDescriptor::new(CREATION_TIME_FIELD, FieldType::Number, false),
    ]
}

/// Append the system fields the schema service left out.
pub fn with_system_fields(mut fields: Vec<FieldDescriptor>) -> Vec<FieldDescriptor> {
    for system in system_fields() {
        if !fields.iter().any(|f| f.name == system.name) {
            fields.push(system);
        }
    }
    fields
}

pub fn find_field<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.name == name)
}

pub fn has_field(fields: &[FieldDescriptor], name: &str) -> bool {
    find_field(fields, name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_descriptor_wire_shape() {
        let json = r#"[{"fieldName":"done","type":"boolean","optional":false},
                       {"fieldName":"category","type":"string"}]"#;
        let fields: Vec<FieldDescriptor> = serde_json::from_str(json).unwrap();
        assert_eq!(fields[0], FieldDescriptor::new("done", FieldType::Boolean, false));
        assert_eq!(fields[1].field_type, FieldType::String);
        assert!(!fields[1].optional);

        let back = serde_json::to_value(&fields[0]).unwrap();
        assert_eq!(back["fieldName"], "done");
        assert_eq!(back["type"], "boolean");
    }

    #[test]
    fn test_unknown_type_is_any() {
        assert_eq!(FieldType::parse_lenient("union"), FieldType::Any);
        assert_eq!(FieldType::parse_lenient("Float64"), FieldType::Number);
    }

    #[test]
    fn test_with_system_fields_appends_once() {
        let fields = with_system_fields(vec![
            FieldDescriptor::new("title", FieldType::String, false),
            FieldDescriptor::new(ID_FIELD, FieldType::Id, false),
        ]);
        assert_eq!(fields.len(), 3);
        assert!(has_field(&fields, CREATION_TIME_FIELD));
        assert_eq!(fields.iter().filter(|f| f.name == ID_FIELD).count(), 1);
    }
}
