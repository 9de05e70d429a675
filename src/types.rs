use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

//==============================================================================
// Cell values and rows
//==============================================================================

/// A scalar cell value: text as it arrived from a source, a computed number, or null
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Falsy in the sense used by the formula substitution: null or empty text
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Display form; null renders as an empty string
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

/// Shortest decimal form of a number, integers without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One record: raw source headers and declared column ids mapped to values,
/// tagged with the source it was loaded from. Key order is insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub source: Option<String>,
    fields: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new(source: Option<String>) -> Self {
        Self {
            source,
            fields: Vec::new(),
        }
    }

    pub fn from_pairs<K, V, I>(source: Option<&str>, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<CellValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Row::new(source.map(str::to_string));
        for (k, v) in pairs {
            row.set(k, v.into());
        }
        row
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Value under `key`, with an absent key reading as null
    pub fn value(&self, key: &str) -> &CellValue {
        static NULL: CellValue = CellValue::Null;
        self.get(key).unwrap_or(&NULL)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite; a new key is appended after the existing ones
    pub fn set(&mut self, key: impl Into<String>, value: CellValue) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_from(&self, source: &str) -> bool {
        self.source.as_deref() == Some(source)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.source.is_some());
        let mut map = serializer.serialize_map(Some(self.fields.len() + extra))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        if let Some(source) = &self.source {
            map.serialize_entry("__source", source)?;
        }
        map.end()
    }
}

//==============================================================================
// Schema
//==============================================================================

/// How a column gets its values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Copied from a source row
    Data,
    /// Computed by a registered function
    Function,
    /// Computed by an arithmetic formula
    Formula,
}

/// Declared data type; drives aggregation, totals and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Unique,
    Currency,
    Rate,
    Integer,
    Float,
    Strings,
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Unique => "unique",
            DataType::Currency => "currency",
            DataType::Rate => "rate",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Strings => "strings",
            DataType::Date => "date",
        }
    }
}

/// Declaration of one output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub heading: String,
    #[serde(default)]
    pub id: String,
    pub column_type: ColumnType,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ColumnSpec {
    pub fn new(heading: &str, id: &str, column_type: ColumnType, data_type: DataType) -> Self {
        Self {
            heading: heading.to_string(),
            id: id.to_string(),
            column_type,
            data_type,
            source_name: None,
            function: None,
            formula: None,
            filter: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source_name = Some(source.to_string());
        self
    }

    pub fn with_function(mut self, call: &str) -> Self {
        self.function = Some(call.to_string());
        self
    }

    pub fn with_formula(mut self, formula: &str) -> Self {
        self.formula = Some(formula.to_string());
        self
    }

    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    /// Id derived from a heading: lower-cased with whitespace removed
    pub fn derive_id(heading: &str) -> String {
        heading
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    pub fn is_unique(&self) -> bool {
        self.data_type == DataType::Unique
    }
}

/// The sheet schema document: `{ sheetName?, columnsConfig: [...] }`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "sheetName", default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(rename = "columnsConfig")]
    pub columns: Vec<ColumnSpec>,
}

/// The on-disk name of a schema
pub type SchemaDocument = Schema;

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            sheet_name: None,
            columns,
        }
    }

    /// The grouping key column
    pub fn unique_column(&self) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.is_unique() && c.column_type == ColumnType::Data)
    }

    pub fn column(&self, id: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.id.as_str())
    }

    /// `data` columns that rows from `source` carry: those bound to it, plus
    /// unbound ones such as the unique column
    pub fn data_columns_for<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a ColumnSpec> {
        self.columns.iter().filter(move |c| {
            c.column_type == ColumnType::Data
                && c.source_name.as_deref().map_or(true, |own| own == source)
        })
    }

    pub fn columns_of_type(&self, column_type: ColumnType) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(move |c| c.column_type == column_type)
    }

    /// Distinct sources of non-unique data columns, in declaration order
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for col in self.columns_of_type(ColumnType::Data) {
            if col.is_unique() {
                continue;
            }
            if let Some(source) = &col.source_name {
                if !sources.contains(source) {
                    sources.push(source.clone());
                }
            }
        }
        sources
    }
}

//==============================================================================
// Grouped output
//==============================================================================

/// Rows sharing a unique-column value, with their combined row.
/// A singleton group carries the row itself and no sub-rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: CellValue,
    pub combined: Row,
    pub sub_rows: Vec<Row>,
}

impl Group {
    pub fn has_sub_rows(&self) -> bool {
        !self.sub_rows.is_empty()
    }
}

/// Selected, grouped rows plus the whole-sheet totals row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetView {
    pub groups: Vec<Group>,
    pub totals: Row,
}
