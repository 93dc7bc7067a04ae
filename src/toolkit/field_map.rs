use crate::domain::Field;

/// One input column feeding an output field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInput {
    pub dataset: String,
    pub field: String,
}

/// An output field and the input columns it is built from.
///
/// The output value is read from the first input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    output: Field,
    inputs: Vec<FieldInput>,
}

impl FieldMap {
    pub fn output_name(&self) -> &str {
        &self.output.name
    }

    pub fn output_field(&self) -> &Field {
        &self.output
    }

    pub fn inputs(&self) -> &[FieldInput] {
        &self.inputs
    }

    pub fn first_input(&self) -> Option<&FieldInput> {
        self.inputs.first()
    }
}

/// Ordered output schema of a join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMappings {
    maps: Vec<FieldMap>,
}

impl FieldMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every field of `dataset`.
    ///
    /// A field whose name (case-insensitive) already has a map becomes an
    /// extra input of that map, so the table added first wins.
    pub fn add_table(&mut self, dataset: &str, fields: &[Field]) {
        for field in fields {
            let input = FieldInput {
                dataset: dataset.to_string(),
                field: field.name.clone(),
            };
            match self.find(&field.name) {
                Some(index) => self.maps[index].inputs.push(input),
                None => self.maps.push(FieldMap {
                    output: field.clone(),
                    inputs: vec![input],
                }),
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.maps.iter().position(|map| map.output.matches(name))
    }

    pub fn remove(&mut self, index: usize) -> FieldMap {
        self.maps.remove(index)
    }

    pub fn retain(&mut self, keep: impl FnMut(&FieldMap) -> bool) {
        self.maps.retain(keep);
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.maps.iter().map(FieldMap::output_name).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldMap> {
        self.maps.iter()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl<'a> IntoIterator for &'a FieldMappings {
    type Item = &'a FieldMap;
    type IntoIter = std::slice::Iter<'a, FieldMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.maps.iter()
    }
}
