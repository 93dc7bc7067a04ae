use geo::Geometry;
use serde_json::Value;

/// Name of the spatial reference assumed when a dataset does not declare one
pub const DEFAULT_SPATIAL_REFERENCE: &str = "WGS 84";

/// A named attribute column of a feature class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Field names are compared case-insensitively everywhere in the pipeline
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialReference {
    pub name: String,
}

impl SpatialReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for SpatialReference {
    fn default() -> Self {
        Self::new(DEFAULT_SPATIAL_REFERENCE)
    }
}

/// One row: an optional geometry plus one value per field of the owning class
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub values: Vec<Value>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry<f64>>, values: Vec<Value>) -> Self {
        Self { geometry, values }
    }
}

/// A table of features sharing one schema and spatial reference
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClass {
    pub name: String,
    pub spatial_reference: SpatialReference,
    pub fields: Vec<Field>,
    pub features: Vec<Feature>,
}

impl FeatureClass {
    pub fn new(
        name: impl Into<String>,
        spatial_reference: SpatialReference,
        fields: Vec<Field>,
    ) -> Self {
        Self {
            name: name.into(),
            spatial_reference,
            fields,
            features: Vec::new(),
        }
    }

    /// Index of the first field matching `name` (case-insensitive)
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.matches(name))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Value of `field` in `feature`, `None` when the class has no such field
    pub fn value<'a>(&self, feature: &'a Feature, field: &str) -> Option<&'a Value> {
        self.field_index(field)
            .and_then(|index| feature.values.get(index))
    }

    /// Append a row, padding or truncating its values to the schema width
    pub fn push(&mut self, mut feature: Feature) {
        feature.values.resize(self.fields.len(), Value::Null);
        self.features.push(feature);
    }

    /// Drop the named fields and their values.
    ///
    /// Returns the requested names that did not match any field; nothing is
    /// removed in that case.
    pub fn remove_fields(&mut self, names: &[&str]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| self.field_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let keep: Vec<bool> = self
            .fields
            .iter()
            .map(|field| !names.iter().any(|name| field.matches(name)))
            .collect();

        self.fields = self
            .fields
            .drain(..)
            .zip(&keep)
            .filter_map(|(field, &kept)| kept.then_some(field))
            .collect();

        for feature in &mut self.features {
            feature.values = feature
                .values
                .drain(..)
                .zip(&keep)
                .filter_map(|(value, &kept)| kept.then_some(value))
                .collect();
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
