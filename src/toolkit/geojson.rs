//! GeoJSON `FeatureCollection` files as datasets of the memory workspace.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde_json::{json, Map, Value};
use std::path::Path;

use super::ToolkitError;
use crate::domain::{Feature, FeatureClass, Field, SpatialReference};

/// Read a `FeatureCollection` file into a feature class named `name`.
///
/// The schema is the union of property keys in first-seen order. The
/// spatial reference comes from the legacy `crs.properties.name` member.
pub fn read_feature_class(path: &Path, name: &str) -> Result<FeatureClass, ToolkitError> {
    let content = std::fs::read_to_string(path).map_err(|source| ToolkitError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|e| format_error(path, e))?;
    parse_feature_collection(&document, name).map_err(|reason| format_error(path, reason))
}

/// Write a feature class as a `FeatureCollection`, replacing `path`
pub fn write_feature_class(path: &Path, class: &FeatureClass) -> Result<(), ToolkitError> {
    let io_error = |source: std::io::Error| ToolkitError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let content = serde_json::to_string_pretty(&to_feature_collection(class))
        .map_err(|e| format_error(path, e))?;
    std::fs::write(path, content).map_err(io_error)
}

fn format_error(path: &Path, reason: impl ToString) -> ToolkitError {
    ToolkitError::Format {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

pub fn parse_feature_collection(document: &Value, name: &str) -> Result<FeatureClass, String> {
    if document["type"] != "FeatureCollection" {
        return Err("expected a FeatureCollection".to_string());
    }
    let features = document["features"]
        .as_array()
        .ok_or("FeatureCollection has no features array")?;

    let spatial_reference = document["crs"]["properties"]["name"]
        .as_str()
        .map(SpatialReference::new)
        .unwrap_or_default();

    // 1st pass: collect the schema, field names are case-insensitive
    let mut fields: Vec<Field> = Vec::new();
    for feature in features {
        if let Some(properties) = feature["properties"].as_object() {
            for key in properties.keys() {
                if !fields.iter().any(|f| f.matches(key)) {
                    fields.push(Field::new(key.as_str()));
                }
            }
        }
    }

    // 2nd pass: rows aligned to the schema
    let mut class = FeatureClass::new(name, spatial_reference, fields);
    for (index, feature) in features.iter().enumerate() {
        let geometry = geometry_from_json(&feature["geometry"])
            .map_err(|reason| format!("feature {}: {}", index, reason))?;
        let properties = feature["properties"].as_object();
        let values = class
            .fields
            .iter()
            .map(|field| {
                properties
                    .and_then(|properties| {
                        properties
                            .iter()
                            .find(|(key, _)| field.matches(key))
                            .map(|(_, value)| value.clone())
                    })
                    .unwrap_or(Value::Null)
            })
            .collect();
        class.push(Feature::new(geometry, values));
    }

    Ok(class)
}

pub fn to_feature_collection(class: &FeatureClass) -> Value {
    let features: Vec<Value> = class
        .features
        .iter()
        .map(|feature| {
            let properties: Map<String, Value> = class
                .fields
                .iter()
                .zip(&feature.values)
                .map(|(field, value)| (field.name.clone(), value.clone()))
                .collect();

            json!({
                "type": "Feature",
                "geometry": feature.geometry.as_ref().map(geometry_to_json),
                "properties": properties
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "crs": {
            "type": "name",
            "properties": { "name": class.spatial_reference.name }
        },
        "features": features
    })
}

fn coord_from_json(value: &Value) -> Result<Coord<f64>, String> {
    let position = value.as_array().ok_or("position must be an array")?;
    match (
        position.first().and_then(Value::as_f64),
        position.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(format!("invalid position: {}", value)),
    }
}

fn coords_from_json(value: &Value) -> Result<Vec<Coord<f64>>, String> {
    value
        .as_array()
        .ok_or("expected an array of positions")?
        .iter()
        .map(coord_from_json)
        .collect()
}

fn polygon_from_json(value: &Value) -> Result<Polygon<f64>, String> {
    let mut rings = value
        .as_array()
        .ok_or("polygon must be an array of rings")?
        .iter()
        .map(|ring| coords_from_json(ring).map(LineString::from));

    let exterior = rings.next().ok_or("polygon has no exterior ring")??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;

    Ok(Polygon::new(exterior, interiors))
}

fn array_of<T>(
    value: &Value,
    parse: impl Fn(&Value) -> Result<T, String>,
) -> Result<Vec<T>, String> {
    value
        .as_array()
        .ok_or("expected an array")?
        .iter()
        .map(parse)
        .collect()
}

/// Parse a GeoJSON geometry object; `null` is an empty geometry
pub fn geometry_from_json(value: &Value) -> Result<Option<Geometry<f64>>, String> {
    if value.is_null() {
        return Ok(None);
    }

    let coordinates = &value["coordinates"];
    let geometry: Geometry<f64> = match value["type"].as_str() {
        Some("Point") => Point::from(coord_from_json(coordinates)?).into(),
        Some("MultiPoint") => MultiPoint::new(
            coords_from_json(coordinates)?
                .into_iter()
                .map(Point::from)
                .collect(),
        )
        .into(),
        Some("LineString") => LineString::from(coords_from_json(coordinates)?).into(),
        Some("MultiLineString") => MultiLineString::new(array_of(coordinates, |line| {
            coords_from_json(line).map(LineString::from)
        })?)
        .into(),
        Some("Polygon") => polygon_from_json(coordinates)?.into(),
        Some("MultiPolygon") => MultiPolygon::new(array_of(coordinates, polygon_from_json)?).into(),
        Some("GeometryCollection") => {
            let members = array_of(&value["geometries"], |member| {
                geometry_from_json(member)?.ok_or_else(|| "null geometry in collection".to_string())
            })?;
            Geometry::GeometryCollection(GeometryCollection::from(members))
        }
        Some(other) => return Err(format!("unsupported geometry type: {}", other)),
        None => return Err("geometry has no type".to_string()),
    };

    Ok(Some(geometry))
}

fn line_to_json(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_to_json(polygon: &Polygon<f64>) -> Value {
    let rings = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(line_to_json)
        .collect();
    Value::Array(rings)
}

pub fn geometry_to_json(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.iter().map(|p| json!([p.x(), p.y()])).collect::<Vec<_>>()
        }),
        Geometry::Line(line) => json!({
            "type": "LineString",
            "coordinates": [[line.start.x, line.start.y], [line.end.x, line.end.y]]
        }),
        Geometry::LineString(ls) => json!({ "type": "LineString", "coordinates": line_to_json(ls) }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.iter().map(line_to_json).collect::<Vec<_>>()
        }),
        Geometry::Polygon(polygon) => json!({ "type": "Polygon", "coordinates": polygon_to_json(polygon) }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.iter().map(polygon_to_json).collect::<Vec<_>>()
        }),
        Geometry::Rect(rect) => json!({ "type": "Polygon", "coordinates": polygon_to_json(&rect.to_polygon()) }),
        Geometry::Triangle(triangle) => json!({
            "type": "Polygon",
            "coordinates": polygon_to_json(&triangle.to_polygon())
        }),
        Geometry::GeometryCollection(collection) => json!({
            "type": "GeometryCollection",
            "geometries": collection.iter().map(geometry_to_json).collect::<Vec<_>>()
        }),
    }
}
