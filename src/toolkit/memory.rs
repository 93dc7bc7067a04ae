use geo::Intersects;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::geojson::{read_feature_class, write_feature_class};
use super::{
    Description, MatchPolicy, SchemaCheck, SpatialJoinRequest, Toolkit, ToolkitError, ViewQuery,
    JOIN_COUNT_FIELD, TARGET_FID_FIELD,
};
use crate::domain::window::value_as_timestamp;
use crate::domain::{Feature, FeatureClass, Field};

const GEOJSON_EXTENSION: &str = "geojson";

/// Toolkit backed by an in-process workspace and GeoJSON files.
///
/// Names of objects created through the toolkit live in the workspace until
/// deleted. Any other dataset reference is a path to a `FeatureCollection`
/// file (the `.geojson` extension may be omitted). Copies and appends into
/// anything that is not a live workspace object are written to disk.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    /// Objects created by views, joins and copies, keyed by name
    objects: HashMap<String, FeatureClass>,
    /// Files read so far, keyed by resolved path
    cache: HashMap<PathBuf, FeatureClass>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a feature class into the workspace under its own name
    pub fn insert(&mut self, class: FeatureClass) -> Result<(), ToolkitError> {
        if self.objects.contains_key(&class.name) {
            return Err(ToolkitError::AlreadyExists(class.name));
        }
        self.objects.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FeatureClass> {
        self.objects.get(name)
    }

    /// Names of all objects currently held in the workspace, sorted
    pub fn object_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.objects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn is_path(dataset: &str) -> bool {
        dataset.contains('/')
            || dataset.contains('\\')
            || Path::new(dataset).extension().is_some_and(|ext| ext == GEOJSON_EXTENSION)
    }

    fn locate_file(dataset: &str) -> Option<PathBuf> {
        let path = PathBuf::from(dataset);
        if path.is_file() {
            return Some(path);
        }
        let with_extension = PathBuf::from(format!("{}.{}", dataset, GEOJSON_EXTENSION));
        with_extension.is_file().then_some(with_extension)
    }

    /// File a destination is persisted to: the file it already resolves to,
    /// else the path itself, else `<name>.geojson`
    fn destination_file(destination: &str) -> PathBuf {
        Self::locate_file(destination).unwrap_or_else(|| {
            if Self::is_path(destination) {
                PathBuf::from(destination)
            } else {
                PathBuf::from(format!("{}.{}", destination, GEOJSON_EXTENSION))
            }
        })
    }

    fn dataset_name(path: &Path) -> String {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Resolve a dataset reference, reading and caching files on first use
    fn resolve(&mut self, dataset: &str) -> Result<&FeatureClass, ToolkitError> {
        if self.objects.contains_key(dataset) {
            return self
                .objects
                .get(dataset)
                .ok_or_else(|| ToolkitError::NotFound(dataset.to_string()));
        }

        let path =
            Self::locate_file(dataset).ok_or_else(|| ToolkitError::NotFound(dataset.to_string()))?;

        if !self.cache.contains_key(&path) {
            let class = read_feature_class(&path, &Self::dataset_name(&path))?;
            tracing::debug!(
                "Loaded {:?}: {} features, {} fields",
                path,
                class.len(),
                class.fields.len()
            );
            self.cache.insert(path.clone(), class);
        }

        self.cache
            .get(&path)
            .ok_or_else(|| ToolkitError::NotFound(dataset.to_string()))
    }

    fn ensure_free(&self, name: &str) -> Result<(), ToolkitError> {
        if self.exists(name) {
            return Err(ToolkitError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Store `class` at `destination`: the live object of that name, or a file
    fn store(&mut self, destination: &str, mut class: FeatureClass) -> Result<(), ToolkitError> {
        if self.objects.contains_key(destination) {
            class.name = destination.to_string();
            self.objects.insert(destination.to_string(), class);
            return Ok(());
        }

        let path = Self::destination_file(destination);
        class.name = Self::dataset_name(&path);
        write_feature_class(&path, &class)?;
        self.cache.insert(path, class);
        Ok(())
    }
}

/// Reader for one output field of a join
enum ValueSource {
    Target(usize),
    Join(usize),
    Missing,
}

impl Toolkit for MemoryWorkspace {
    fn create_filtered_view(
        &mut self,
        workspace: &str,
        name: &str,
        query: &ViewQuery,
    ) -> Result<String, ToolkitError> {
        self.ensure_free(name)?;

        let table = Path::new(workspace).join(&query.table);
        let table = table.to_string_lossy();
        let source = self.resolve(&table)?;

        let date_index =
            source
                .field_index(&query.date_field)
                .ok_or_else(|| ToolkitError::InvalidQuery {
                    table: query.table.clone(),
                    reason: format!("no field named {}", query.date_field),
                })?;

        let mut view = FeatureClass::new(name, source.spatial_reference.clone(), source.fields.clone());
        view.features = source
            .features
            .iter()
            .filter(|feature| {
                feature
                    .values
                    .get(date_index)
                    .and_then(value_as_timestamp)
                    .is_some_and(|timestamp| query.window.contains(timestamp))
            })
            .cloned()
            .collect();

        self.objects.insert(name.to_string(), view);
        Ok(name.to_string())
    }

    fn exists(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    fn describe(&mut self, dataset: &str) -> Result<Description, ToolkitError> {
        let class = self.resolve(dataset)?;
        Ok(Description {
            name: class.name.clone(),
            spatial_reference: class.spatial_reference.clone(),
        })
    }

    fn list_fields(&mut self, dataset: &str) -> Result<Vec<Field>, ToolkitError> {
        Ok(self.resolve(dataset)?.fields.clone())
    }

    fn spatial_join(&mut self, request: &SpatialJoinRequest) -> Result<String, ToolkitError> {
        self.ensure_free(&request.output)?;

        let target = self.resolve(&request.target)?.clone();
        let join = self.resolve(&request.join)?.clone();

        let readers: Vec<ValueSource> = request
            .field_mappings
            .iter()
            .map(|map| match map.first_input() {
                Some(input) if input.dataset == request.target => target
                    .field_index(&input.field)
                    .map_or(ValueSource::Missing, ValueSource::Target),
                Some(input) if input.dataset == request.join => join
                    .field_index(&input.field)
                    .map_or(ValueSource::Missing, ValueSource::Join),
                _ => ValueSource::Missing,
            })
            .collect();

        let mut fields = vec![Field::new(JOIN_COUNT_FIELD), Field::new(TARGET_FID_FIELD)];
        fields.extend(request.field_mappings.iter().map(|map| map.output_field().clone()));

        let mut output = FeatureClass::new(
            request.output.as_str(),
            target.spatial_reference.clone(),
            fields,
        );

        for (fid, feature) in target.features.iter().enumerate() {
            let matches: Vec<&Feature> = match &feature.geometry {
                Some(point) => join
                    .features
                    .iter()
                    .filter(|candidate| {
                        candidate
                            .geometry
                            .as_ref()
                            .is_some_and(|polygon| point.intersects(polygon))
                    })
                    .collect(),
                None => Vec::new(),
            };

            if matches.is_empty() && request.match_policy == MatchPolicy::KeepCommon {
                continue;
            }

            let mut values = vec![Value::from(matches.len()), Value::from(fid)];
            values.extend(readers.iter().map(|reader| match reader {
                ValueSource::Target(index) => feature.values[*index].clone(),
                ValueSource::Join(index) => matches
                    .first()
                    .map_or(Value::Null, |matched| matched.values[*index].clone()),
                ValueSource::Missing => Value::Null,
            }));

            output.push(Feature::new(feature.geometry.clone(), values));
        }

        self.objects.insert(request.output.clone(), output);
        Ok(request.output.clone())
    }

    fn delete_field(&mut self, dataset: &str, fields: &[&str]) -> Result<(), ToolkitError> {
        let class = self
            .objects
            .get_mut(dataset)
            .ok_or_else(|| ToolkitError::NotFound(dataset.to_string()))?;

        class
            .remove_fields(fields)
            .map_err(|missing| ToolkitError::FieldNotFound {
                dataset: dataset.to_string(),
                field: missing.join(","),
            })
    }

    fn delete(&mut self, name: &str) -> Result<(), ToolkitError> {
        self.objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ToolkitError::NotFound(name.to_string()))
    }

    fn append(
        &mut self,
        source: &str,
        destination: &str,
        schema_check: SchemaCheck,
    ) -> Result<(), ToolkitError> {
        let source_class = self.resolve(source)?.clone();

        let mut target = match self.resolve(destination) {
            // an empty collection has no schema yet
            Ok(existing) if !(existing.fields.is_empty() && existing.is_empty()) => {
                existing.clone()
            }
            Ok(_) | Err(ToolkitError::NotFound(_)) => FeatureClass::new(
                destination,
                source_class.spatial_reference.clone(),
                source_class.fields.clone(),
            ),
            Err(err) => return Err(err),
        };

        if schema_check == SchemaCheck::Test {
            let same_fields = source_class.fields.len() == target.fields.len()
                && source_class
                    .fields
                    .iter()
                    .all(|field| target.field_index(&field.name).is_some());
            if !same_fields {
                return Err(ToolkitError::SchemaMismatch {
                    from: source.to_string(),
                    into: destination.to_string(),
                    reason: format!(
                        "fields [{}] do not match [{}]",
                        source_class.field_names().join(","),
                        target.field_names().join(",")
                    ),
                });
            }
        }

        let positions: Vec<Option<usize>> = target
            .fields
            .iter()
            .map(|field| source_class.field_index(&field.name))
            .collect();

        for feature in &source_class.features {
            let values = positions
                .iter()
                .map(|position| position.map_or(Value::Null, |i| feature.values[i].clone()))
                .collect();
            target.push(Feature::new(feature.geometry.clone(), values));
        }

        self.store(destination, target)
    }

    fn copy_features(&mut self, source: &str, destination: &str) -> Result<(), ToolkitError> {
        let class = self.resolve(source)?.clone();
        self.store(destination, class)
    }

    fn get_count(&mut self, dataset: &str) -> Result<usize, ToolkitError> {
        Ok(self.resolve(dataset)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::parse_timestamp;
    use crate::domain::{SpatialReference, TimeWindow};
    use crate::toolkit::{FieldMappings, JoinOperation};
    use geo::{polygon, Point};
    use serde_json::json;

    fn points() -> FeatureClass {
        let mut class = FeatureClass::new(
            "points",
            SpatialReference::default(),
            vec![Field::new("CollarSerialNum"), Field::new("DateYearAndJulian")],
        );
        for (serial, date, lon) in [
            ("A1", "2017-07-16 23:59:59", 1.0),
            ("A2", "2017-07-17 00:00:00", 1.0),
            ("A3", "2017-07-17 12:00:00", 5.0),
            ("A4", "2017-07-18 00:00:00", 1.0),
        ] {
            class.push(Feature::new(
                Some(Point::new(lon, 1.0).into()),
                vec![json!(serial), json!(date)],
            ));
        }
        class
    }

    fn zones() -> FeatureClass {
        let mut class = FeatureClass::new(
            "zones",
            SpatialReference::default(),
            vec![Field::new("Zone")],
        );
        class.push(Feature::new(
            Some(polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)].into()),
            vec![json!("west")],
        ));
        class
    }

    fn workspace() -> MemoryWorkspace {
        let mut workspace = MemoryWorkspace::new();
        workspace.insert(points()).unwrap();
        workspace.insert(zones()).unwrap();
        workspace
    }

    fn join_request(policy: MatchPolicy) -> SpatialJoinRequest {
        let mut mappings = FieldMappings::new();
        mappings.add_table("points", &points().fields);
        mappings.add_table("zones", &zones().fields);
        SpatialJoinRequest {
            target: "points".into(),
            join: "zones".into(),
            output: "spatial_join".into(),
            operation: JoinOperation::OneToOne,
            match_policy: policy,
            field_mappings: mappings,
        }
    }

    #[test]
    fn test_filtered_view_is_half_open() {
        let mut workspace = workspace();
        let window = TimeWindow::yesterday(parse_timestamp("2017-07-18 08:00:00").unwrap());
        let query = ViewQuery::new("points", "dateyearandjulian", window);

        let view = workspace.create_filtered_view("", "yesterday", &query).unwrap();

        let serials: Vec<&Value> = workspace
            .get(&view)
            .unwrap()
            .features
            .iter()
            .map(|f| &f.values[0])
            .collect();
        assert_eq!(serials, vec![&json!("A2"), &json!("A3")]);
    }

    #[test]
    fn test_filtered_view_unknown_field() {
        let mut workspace = workspace();
        let window = TimeWindow::yesterday(parse_timestamp("2017-07-18").unwrap());
        let query = ViewQuery::new("points", "Timestamp", window);

        let err = workspace
            .create_filtered_view("", "yesterday", &query)
            .unwrap_err();
        assert!(matches!(err, ToolkitError::InvalidQuery { .. }), "got {:?}", err);
        assert!(!workspace.exists("yesterday"));
    }

    #[test]
    fn test_filtered_view_name_collision() {
        let mut workspace = workspace();
        let window = TimeWindow::yesterday(parse_timestamp("2017-07-18").unwrap());
        let query = ViewQuery::new("points", "DateYearAndJulian", window);

        let err = workspace.create_filtered_view("", "zones", &query).unwrap_err();
        assert!(matches!(err, ToolkitError::AlreadyExists(_)));
    }

    #[test]
    fn test_spatial_join_keep_all() {
        let mut workspace = workspace();
        let output = workspace.spatial_join(&join_request(MatchPolicy::KeepAll)).unwrap();
        let joined = workspace.get(&output).unwrap();

        assert_eq!(joined.len(), 4, "Every target row is kept exactly once");
        assert_eq!(
            joined.field_names(),
            vec!["Join_Count", "TARGET_FID", "CollarSerialNum", "DateYearAndJulian", "Zone"]
        );
        // A3 sits outside the zone
        assert_eq!(joined.features[2].values[0], json!(0));
        assert_eq!(joined.features[2].values[4], Value::Null);
        assert_eq!(joined.features[0].values[0], json!(1));
        assert_eq!(joined.features[0].values[4], json!("west"));
        assert_eq!(joined.features[3].values[1], json!(3));
    }

    #[test]
    fn test_spatial_join_keep_common() {
        let mut workspace = workspace();
        let output = workspace.spatial_join(&join_request(MatchPolicy::KeepCommon)).unwrap();

        assert_eq!(workspace.get_count(&output).unwrap(), 3);
    }

    #[test]
    fn test_delete_field_and_object() {
        let mut workspace = workspace();
        let output = workspace.spatial_join(&join_request(MatchPolicy::KeepAll)).unwrap();

        workspace
            .delete_field(&output, &[JOIN_COUNT_FIELD, TARGET_FID_FIELD])
            .unwrap();
        assert_eq!(
            workspace.list_fields(&output).unwrap(),
            vec![Field::new("CollarSerialNum"), Field::new("DateYearAndJulian"), Field::new("Zone")]
        );

        workspace.delete(&output).unwrap();
        assert!(!workspace.exists(&output));
        assert!(matches!(workspace.delete(&output), Err(ToolkitError::NotFound(_))));
    }

    #[test]
    fn test_append_without_schema_test() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.geojson");
        let master = master.to_str().unwrap();
        let mut workspace = workspace();

        workspace.append("zones", master, SchemaCheck::NoTest).unwrap();
        workspace.append("points", master, SchemaCheck::NoTest).unwrap();

        let mut reopened = MemoryWorkspace::new();
        let appended = reopened.resolve(master).unwrap();
        assert_eq!(appended.field_names(), vec!["Zone"]);
        assert_eq!(appended.len(), 5);
        assert_eq!(appended.features[4].values, vec![Value::Null]);
    }

    #[test]
    fn test_append_schema_test_rejects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.geojson");
        let master = master.to_str().unwrap();
        let mut workspace = workspace();
        workspace.copy_features("zones", master).unwrap();

        let err = workspace
            .append("points", master, SchemaCheck::Test)
            .unwrap_err();
        assert!(matches!(err, ToolkitError::SchemaMismatch { .. }), "got {:?}", err);
        assert_eq!(workspace.get_count(master).unwrap(), 1);
    }

    #[test]
    fn test_append_into_empty_collection_takes_source_schema() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.geojson");
        std::fs::write(&master, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        let master = master.to_str().unwrap();
        let mut workspace = workspace();

        workspace.append("zones", master, SchemaCheck::NoTest).unwrap();

        let mut reopened = MemoryWorkspace::new();
        assert_eq!(reopened.list_fields(master).unwrap(), vec![Field::new("Zone")]);
        assert_eq!(reopened.get_count(master).unwrap(), 1);
    }

    #[test]
    fn test_live_object_destination_stays_in_workspace() {
        let mut workspace = workspace();
        workspace.copy_features("points", "zones").unwrap();

        assert_eq!(workspace.get("zones").unwrap().len(), 4);
        assert_eq!(workspace.get("zones").unwrap().name, "zones");
    }

    #[test]
    fn test_copy_features_to_file_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("enriched.geojson");
        let destination = destination.to_str().unwrap();
        let mut workspace = workspace();

        workspace.copy_features("points", destination).unwrap();
        workspace.copy_features("zones", destination).unwrap();

        let mut reopened = MemoryWorkspace::new();
        assert_eq!(reopened.get_count(destination).unwrap(), 1);
        assert_eq!(reopened.describe(destination).unwrap().name, "enriched");
    }

    #[test]
    fn test_missing_dataset() {
        let mut workspace = MemoryWorkspace::new();
        let err = workspace.describe("nowhere/to/be/found").unwrap_err();

        assert_eq!(err.kind(), crate::toolkit::ErrorKind::NotFound);
    }
}
