use serde::Serialize;
use smallvec::SmallVec;

/// Cap on representative values stored per column.
pub const SAMPLE_VALUES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Date,
    Bool,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Date => "date",
            DataType::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// 1-based position in the sheet. Gaps are kept where header cells
    /// were blank; columns are never reindexed.
    pub index: usize,
    pub data_type: DataType,
    pub sample_values: SmallVec<[String; SAMPLE_VALUES]>,
    /// Non-empty cells seen in the sampled window, not the full column.
    pub non_empty_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetMetadata {
    pub sheet_name: String,
    /// 1-based row holding the column headers.
    pub header_row: usize,
    pub columns: Vec<ColumnMetadata>,
    /// Potential data rows below the header, empty rows included.
    pub total_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    PrimaryKey,
    ForeignKey,
    Value,
    Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnRole {
    pub role: RoleKind,
    pub data_type: DataType,
    pub unique_count: usize,
    pub total_count: usize,
    /// "sheet.column" the values point at, when the column links out.
    pub foreign_key_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: String,
    pub sheet_a: String,
    pub column_a: String,
    pub sheet_b: String,
    pub column_b: String,
    /// Sorted sample of shared values, capped at 10.
    pub overlapping_values: Vec<String>,
    /// |overlap| / max(|values_a|, |values_b|, 1), always in (0, 1].
    pub overlap_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    SheetSummary,
    RowSemantic,
    ColumnProfile,
    Relationship,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::SheetSummary => "sheet_summary",
            ChunkType::RowSemantic => "row_semantic",
            ChunkType::ColumnProfile => "column_profile",
            ChunkType::Relationship => "relationship",
        }
    }
}

/// One retrieval-sized unit of text plus filterable metadata. The
/// `content` field is what gets embedded; everything else rides along
/// in the vector store payload.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Stable across runs on identical input.
    pub chunk_id: String,
    pub chunk_type: ChunkType,
    pub sheet_name: String,
    pub content: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}
