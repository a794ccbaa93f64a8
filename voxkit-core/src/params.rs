//! Parameter persistence for filters and whole pipelines
//!
//! A pipeline document is a JSON object with a `PipelineBuilder` header and
//! one object per filter keyed by its index:
//!
//! ```json
//! {
//!   "PipelineBuilder": { "Number_Filters": 1, "Name": "Import" },
//!   "0": { "Filter_Name": "RawBinaryReader", "InputFile": "volume.raw" }
//! }
//! ```

use std::path::Path;

use serde_json::{Map, Value};

use crate::catalog::FilterCatalog;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::registry::DataArrayPath;

const PIPELINE_BUILDER: &str = "PipelineBuilder";
const NUMBER_FILTERS: &str = "Number_Filters";
const PIPELINE_NAME: &str = "Name";
const FILTER_NAME: &str = "Filter_Name";

/// Reads filter parameters from some persisted form
///
/// Every read takes the compiled-in default, returned when the key is
/// absent or holds a value of the wrong type.
pub trait ParametersReader {
    /// Make filter group `index` the current group
    fn open_filter_group(&mut self, index: usize) -> Result<()>;

    /// Leave the current group
    fn close_filter_group(&mut self) -> Result<()>;

    /// Read a string
    fn read_string(&self, key: &str, default: &str) -> String;

    /// Read a signed integer
    fn read_i64(&self, key: &str, default: i64) -> i64;

    /// Read a float
    fn read_f64(&self, key: &str, default: f64) -> f64;

    /// Read a flag; integers are accepted as 0/non-zero
    fn read_bool(&self, key: &str, default: bool) -> bool;

    /// Read three unsigned integers
    fn read_usize_vec3(&self, key: &str, default: [usize; 3]) -> [usize; 3];

    /// Read three floats
    fn read_f32_vec3(&self, key: &str, default: [f32; 3]) -> [f32; 3];

    /// Read a `container|group|array` path
    fn read_array_path(&self, key: &str, default: &DataArrayPath) -> DataArrayPath;
}

/// Writes filter parameters to some persisted form
pub trait ParametersWriter {
    /// Start filter group `index` for a filter of `class_name`
    fn open_filter_group(&mut self, index: usize, class_name: &str) -> Result<()>;

    /// Finish the current group
    fn close_filter_group(&mut self) -> Result<()>;

    /// Write a string
    fn write_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Write a signed integer
    fn write_i64(&mut self, key: &str, value: i64) -> Result<()>;

    /// Write a float
    fn write_f64(&mut self, key: &str, value: f64) -> Result<()>;

    /// Write a flag
    fn write_bool(&mut self, key: &str, value: bool) -> Result<()>;

    /// Write three unsigned integers
    fn write_usize_vec3(&mut self, key: &str, value: [usize; 3]) -> Result<()>;

    /// Write three floats
    fn write_f32_vec3(&mut self, key: &str, value: [f32; 3]) -> Result<()>;

    /// Write a `container|group|array` path
    fn write_array_path(&mut self, key: &str, value: &DataArrayPath) -> Result<()>;
}

/// [`ParametersReader`] over a JSON pipeline document
#[derive(Debug, Clone)]
pub struct JsonParametersReader {
    /// The whole document
    document: Map<String, Value>,

    /// The open filter group
    current: Option<Map<String, Value>>,
}

impl JsonParametersReader {
    /// Wrap a parsed document
    pub fn new(document: Value) -> Result<Self> {
        match document {
            Value::Object(document) => Ok(Self {
                document,
                current: None,
            }),
            _ => Err(Error::parameter("pipeline document must be a JSON object")),
        }
    }

    /// Parse a document from text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::new(serde_json::from_str(text)?)
    }

    /// Parse a document from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Number of filters announced by the header
    pub fn filter_count(&self) -> Result<usize> {
        self.document
            .get(PIPELINE_BUILDER)
            .and_then(|builder| builder.get(NUMBER_FILTERS))
            .and_then(Value::as_u64)
            .and_then(|count| usize::try_from(count).ok())
            .ok_or_else(|| {
                Error::parameter(format!("missing {PIPELINE_BUILDER}.{NUMBER_FILTERS}"))
            })
    }

    /// Pipeline name from the header, if present
    pub fn pipeline_name(&self) -> Option<&str> {
        self.document
            .get(PIPELINE_BUILDER)
            .and_then(|builder| builder.get(PIPELINE_NAME))
            .and_then(Value::as_str)
    }

    /// Class name stored in filter group `index`
    pub fn filter_name(&self, index: usize) -> Result<String> {
        self.group(index)?
            .get(FILTER_NAME)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::parameter(format!("filter group {index} has no {FILTER_NAME}")))
    }

    fn group(&self, index: usize) -> Result<&Map<String, Value>> {
        self.document
            .get(&index.to_string())
            .and_then(Value::as_object)
            .ok_or_else(|| Error::not_found("filter group", index.to_string()))
    }

    fn value(&self, key: &str) -> Option<&Value> {
        self.current.as_ref().and_then(|group| group.get(key))
    }

    fn triple<T>(&self, key: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<[T; 3]>
    where
        T: Copy + Default,
    {
        let values = self.value(key)?.as_array()?;
        if values.len() != 3 {
            return None;
        }
        let mut out = [T::default(); 3];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = convert(value)?;
        }
        Some(out)
    }
}

impl ParametersReader for JsonParametersReader {
    fn open_filter_group(&mut self, index: usize) -> Result<()> {
        self.current = Some(self.group(index)?.clone());
        Ok(())
    }

    fn close_filter_group(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }

    fn read_string(&self, key: &str, default: &str) -> String {
        self.value(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    fn read_i64(&self, key: &str, default: i64) -> i64 {
        self.value(key).and_then(Value::as_i64).unwrap_or(default)
    }

    fn read_f64(&self, key: &str, default: f64) -> f64 {
        self.value(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn read_bool(&self, key: &str, default: bool) -> bool {
        match self.value(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_i64().map_or(default, |n| n != 0),
            _ => default,
        }
    }

    fn read_usize_vec3(&self, key: &str, default: [usize; 3]) -> [usize; 3] {
        self.triple(key, |v| v.as_u64().and_then(|n| usize::try_from(n).ok()))
            .unwrap_or(default)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_f32_vec3(&self, key: &str, default: [f32; 3]) -> [f32; 3] {
        self.triple(key, |v| v.as_f64().map(|n| n as f32))
            .unwrap_or(default)
    }

    fn read_array_path(&self, key: &str, default: &DataArrayPath) -> DataArrayPath {
        self.value(key)
            .and_then(Value::as_str)
            .and_then(|text| text.parse().ok())
            .unwrap_or_else(|| default.clone())
    }
}

/// [`ParametersWriter`] building a JSON pipeline document
#[derive(Debug, Clone, Default)]
pub struct JsonParametersWriter {
    /// Finished filter groups
    document: Map<String, Value>,

    /// The open filter group and its index
    current: Option<(usize, Map<String, Value>)>,
}

impl JsonParametersWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the header and hand back the document
    pub fn finish(mut self, name: &str, filter_count: usize) -> Value {
        let mut builder = Map::new();
        builder.insert(NUMBER_FILTERS.to_string(), Value::from(filter_count));
        builder.insert(PIPELINE_NAME.to_string(), Value::from(name));
        self.document
            .insert(PIPELINE_BUILDER.to_string(), Value::Object(builder));
        Value::Object(self.document)
    }

    fn put(&mut self, key: &str, value: Value) -> Result<()> {
        let (_, group) = self
            .current
            .as_mut()
            .ok_or_else(|| Error::parameter(format!("no filter group open for '{key}'")))?;
        group.insert(key.to_string(), value);
        Ok(())
    }
}

impl ParametersWriter for JsonParametersWriter {
    fn open_filter_group(&mut self, index: usize, class_name: &str) -> Result<()> {
        if let Some((open, _)) = &self.current {
            return Err(Error::parameter(format!(
                "filter group {open} is still open"
            )));
        }
        let mut group = Map::new();
        group.insert(FILTER_NAME.to_string(), Value::from(class_name));
        self.current = Some((index, group));
        Ok(())
    }

    fn close_filter_group(&mut self) -> Result<()> {
        let (index, group) = self
            .current
            .take()
            .ok_or_else(|| Error::parameter("no filter group open"))?;
        self.document.insert(index.to_string(), Value::Object(group));
        Ok(())
    }

    fn write_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.put(key, Value::from(value))
    }

    fn write_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.put(key, Value::from(value))
    }

    fn write_f64(&mut self, key: &str, value: f64) -> Result<()> {
        self.put(key, Value::from(value))
    }

    fn write_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.put(key, Value::from(value))
    }

    fn write_usize_vec3(&mut self, key: &str, value: [usize; 3]) -> Result<()> {
        self.put(key, Value::from(value.to_vec()))
    }

    fn write_f32_vec3(&mut self, key: &str, value: [f32; 3]) -> Result<()> {
        let values: Vec<f64> = value.iter().copied().map(f64::from).collect();
        self.put(key, Value::from(values))
    }

    fn write_array_path(&mut self, key: &str, value: &DataArrayPath) -> Result<()> {
        self.put(key, Value::from(value.to_string()))
    }
}

/// Persist every filter of `pipeline` as a JSON document
pub fn write_pipeline(pipeline: &Pipeline) -> Result<Value> {
    let mut writer = JsonParametersWriter::new();
    let mut index = 0;
    for filter in pipeline.filters() {
        index = filter.write_parameters(&mut writer, index)?;
    }
    Ok(writer.finish(pipeline.name(), index))
}

/// Rebuild a pipeline from a JSON document, instantiating filters by name
pub fn read_pipeline(document: &Value, catalog: &FilterCatalog) -> Result<Pipeline> {
    let mut reader = JsonParametersReader::new(document.clone())?;
    let count = reader.filter_count()?;
    let mut pipeline = Pipeline::new(reader.pipeline_name().unwrap_or_default());

    for index in 0..count {
        let class_name = reader.filter_name(index)?;
        let mut filter = catalog.create(&class_name)?;
        filter.read_parameters(&mut reader, index)?;
        tracing::debug!(index, class_name = %class_name, "loaded filter");
        pipeline.push(filter);
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn written() -> Value {
        let mut writer = JsonParametersWriter::new();
        writer.open_filter_group(0, "Example").unwrap();
        writer.write_string("InputFile", "/tmp/volume.raw").unwrap();
        writer.write_i64("ScalarType", 4).unwrap();
        writer.write_bool("AddToExistingDataContainer", true).unwrap();
        writer.write_usize_vec3("Dimensions", [4, 5, 6]).unwrap();
        writer.write_f32_vec3("Resolution", [0.5, 0.25, 2.0]).unwrap();
        writer
            .write_array_path("AttributeMatrixPath", &DataArrayPath::group("DC", "CellData"))
            .unwrap();
        writer.close_filter_group().unwrap();
        writer.finish("Test", 1)
    }

    #[test]
    fn test_write_then_read_values() {
        let mut reader = JsonParametersReader::new(written()).unwrap();
        assert_eq!(reader.filter_count().unwrap(), 1);
        assert_eq!(reader.pipeline_name(), Some("Test"));
        assert_eq!(reader.filter_name(0).unwrap(), "Example");

        reader.open_filter_group(0).unwrap();
        assert_eq!(reader.read_string("InputFile", ""), "/tmp/volume.raw");
        assert_eq!(reader.read_i64("ScalarType", 0), 4);
        assert!(reader.read_bool("AddToExistingDataContainer", false));
        assert_eq!(reader.read_usize_vec3("Dimensions", [0; 3]), [4, 5, 6]);
        assert_eq!(reader.read_f32_vec3("Resolution", [1.0; 3]), [0.5, 0.25, 2.0]);
        assert_eq!(
            reader.read_array_path("AttributeMatrixPath", &DataArrayPath::default()),
            DataArrayPath::group("DC", "CellData")
        );
    }

    #[test]
    fn test_unknown_and_mistyped_keys_use_defaults() {
        let mut reader = JsonParametersReader::new(json!({
            "PipelineBuilder": { "Number_Filters": 1 },
            "0": { "Filter_Name": "X", "NumberOfComponents": "three", "Dimensions": [1, 2] }
        }))
        .unwrap();
        reader.open_filter_group(0).unwrap();

        assert_eq!(reader.read_i64("NumberOfComponents", 1), 1);
        assert_eq!(reader.read_usize_vec3("Dimensions", [7, 7, 7]), [7, 7, 7]);
        assert_eq!(reader.read_string("Nope", "fallback"), "fallback");
        assert!(!reader.read_bool("Nope", false));
    }

    #[test]
    fn test_integer_flags() {
        let mut reader = JsonParametersReader::new(json!({
            "0": { "Filter_Name": "X", "On": 1, "Off": 0 }
        }))
        .unwrap();
        reader.open_filter_group(0).unwrap();
        assert!(reader.read_bool("On", false));
        assert!(!reader.read_bool("Off", true));
    }

    #[test]
    fn test_missing_group() {
        let mut reader = JsonParametersReader::new(json!({})).unwrap();
        assert!(matches!(
            reader.open_filter_group(3),
            Err(Error::NotFound { kind: "filter group", .. })
        ));
        assert!(reader.filter_count().is_err());
    }

    #[test]
    fn test_write_outside_group_fails() {
        let mut writer = JsonParametersWriter::new();
        assert!(writer.write_i64("Orphan", 1).is_err());
        assert!(writer.close_filter_group().is_err());

        writer.open_filter_group(0, "A").unwrap();
        assert!(writer.open_filter_group(1, "B").is_err());
    }

    #[test]
    fn test_document_must_be_object() {
        assert!(JsonParametersReader::new(json!([1, 2, 3])).is_err());
        assert!(JsonParametersReader::from_json_str("not json").is_err());
    }
}
