use std::collections::HashMap;

use calamine::Data;
use serde_json::{json, Map, Value};

use super::parser::SheetData;
use super::text::{cell_to_string, extract_keywords, is_empty_cell};
use crate::models::{Chunk, ChunkType, ColumnRole, Relationship, RoleKind, SheetMetadata};

/// Values quoted in a column profile.
const PROFILE_SAMPLE: usize = 3;

/// Turns parsed sheets plus analysis results into the ordered chunk
/// sequence handed to the indexing layer. Emission order is fixed:
/// per sheet a summary, then row records, then column profiles; after
/// all sheets, one chunk per relationship in detection order.
pub struct SemanticChunker;

impl SemanticChunker {
    pub fn build_chunks(
        &self,
        metadata: &[SheetMetadata],
        data: &HashMap<String, SheetData>,
        roles: &HashMap<String, HashMap<String, ColumnRole>>,
        relationships: &[Relationship],
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for meta in metadata {
            let sheet_roles = &roles[&meta.sheet_name];
            let sheet_data = &data[&meta.sheet_name];

            chunks.push(sheet_summary(meta));

            // First primary-key column in sheet order carries the row
            // identifier; without one, rows embed no identifier.
            let pk_col = meta
                .columns
                .iter()
                .find(|c| {
                    sheet_roles
                        .get(&c.name)
                        .map_or(false, |r| r.role == RoleKind::PrimaryKey)
                })
                .map(|c| c.name.as_str());

            for row_idx in 0..meta.total_rows {
                let row: Vec<(&str, &Data)> = meta
                    .columns
                    .iter()
                    .filter_map(|col| {
                        sheet_data
                            .get(&col.name)
                            .and_then(|vals| vals.get(row_idx))
                            .map(|v| (col.name.as_str(), v))
                    })
                    .collect();
                if row.iter().all(|(_, v)| is_empty_cell(v)) {
                    continue;
                }
                chunks.push(row_chunk(
                    &meta.sheet_name,
                    row_idx + 1,
                    &row,
                    sheet_roles,
                    pk_col,
                ));
            }

            for col in &meta.columns {
                if let Some(chunk) =
                    column_profile(&meta.sheet_name, &col.name, &sheet_data[&col.name])
                {
                    chunks.push(chunk);
                }
            }
        }

        for (idx, rel) in relationships.iter().enumerate() {
            chunks.push(relationship_chunk(idx, rel));
        }

        tracing::info!("Built {} chunks", chunks.len());
        chunks
    }
}

fn sheet_summary(meta: &SheetMetadata) -> Chunk {
    let columns: Vec<&str> = meta.columns.iter().map(|c| c.name.as_str()).collect();
    let content = format!(
        "Sheet '{}' has {} rows. Columns: {}.",
        meta.sheet_name,
        meta.total_rows,
        columns.join(", ")
    );

    let mut payload = Map::new();
    payload.insert("total_rows".into(), json!(meta.total_rows));
    payload.insert("header_row".into(), json!(meta.header_row));

    Chunk {
        chunk_id: format!("sheet_{}", meta.sheet_name),
        chunk_type: ChunkType::SheetSummary,
        sheet_name: meta.sheet_name.clone(),
        content,
        payload,
    }
}

fn row_chunk(
    sheet_name: &str,
    row_number: usize,
    row: &[(&str, &Data)],
    roles: &HashMap<String, ColumnRole>,
    pk_col: Option<&str>,
) -> Chunk {
    let pk_value = pk_col.and_then(|pk| {
        row.iter()
            .find(|(col, v)| *col == pk && !is_empty_cell(v))
            .map(|(_, v)| cell_to_string(v))
    });

    let mut details = Vec::new();
    for (col, value) in row {
        if is_empty_cell(value) {
            continue;
        }
        let is_identifier = roles
            .get(*col)
            .map_or(false, |r| r.role == RoleKind::PrimaryKey);
        let label = if is_identifier {
            format!("{} (identifier)", col)
        } else {
            (*col).to_string()
        };
        details.push(format!("- {}: {}", label, cell_to_string(value)));
    }

    let content = format!(
        "Record in {} (Row {})\n\nDetails:\n{}",
        sheet_name,
        row_number,
        details.join("\n")
    );
    let keywords = extract_keywords(row.iter().map(|(col, v)| (*col, *v)));

    let mut payload = Map::new();
    payload.insert("row_index".into(), json!(row_number));
    payload.insert("keywords".into(), json!(keywords));
    payload.insert(
        "primary_key".into(),
        pk_value.map_or(Value::Null, Value::String),
    );

    Chunk {
        chunk_id: format!("row_{}_{}", sheet_name, row_number),
        chunk_type: ChunkType::RowSemantic,
        sheet_name: sheet_name.to_string(),
        content,
        payload,
    }
}

/// Emitted only for columns holding at least one value.
fn column_profile(sheet_name: &str, column: &str, values: &[Data]) -> Option<Chunk> {
    let non_null: Vec<String> = values
        .iter()
        .filter(|v| !is_empty_cell(v))
        .map(cell_to_string)
        .collect();
    if non_null.is_empty() {
        return None;
    }

    let sample: Vec<&str> = non_null
        .iter()
        .take(PROFILE_SAMPLE)
        .map(|s| s.as_str())
        .collect();
    let content = format!(
        "Column '{}' in {}. Contains {} values. Sample: {}.",
        column,
        sheet_name,
        non_null.len(),
        sample.join(", ")
    );

    let mut payload = Map::new();
    payload.insert("column".into(), json!(column));
    payload.insert("non_null_count".into(), json!(non_null.len()));

    Some(Chunk {
        chunk_id: format!("col_{}_{}", sheet_name, column),
        chunk_type: ChunkType::ColumnProfile,
        sheet_name: sheet_name.to_string(),
        content,
        payload,
    })
}

/// The id carries the relationship's position so two links sharing the
/// same (sheet_a, column_a) pair still get distinct ids.
fn relationship_chunk(idx: usize, rel: &Relationship) -> Chunk {
    let content = format!(
        "Link found: {}.{} <-> {}.{}. {} shared values (overlap ratio {:.2}).",
        rel.sheet_a,
        rel.column_a,
        rel.sheet_b,
        rel.column_b,
        rel.overlapping_values.len(),
        rel.overlap_ratio
    );

    let mut payload = Map::new();
    payload.insert("column_a".into(), json!(rel.column_a));
    payload.insert("sheet_b".into(), json!(rel.sheet_b));
    payload.insert("column_b".into(), json!(rel.column_b));
    payload.insert("overlap_ratio".into(), json!(rel.overlap_ratio));

    Chunk {
        chunk_id: format!("rel_{}_{}_{}", rel.sheet_a, rel.column_a, idx),
        chunk_type: ChunkType::Relationship,
        sheet_name: rel.sheet_a.clone(),
        content,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMetadata, DataType};
    use smallvec::SmallVec;

    fn column(name: &str, index: usize) -> ColumnMetadata {
        ColumnMetadata {
            name: name.to_string(),
            index,
            data_type: DataType::String,
            sample_values: SmallVec::new(),
            non_empty_count: 0,
        }
    }

    fn role(kind: RoleKind) -> ColumnRole {
        ColumnRole {
            role: kind,
            data_type: DataType::String,
            unique_count: 0,
            total_count: 0,
            foreign_key_to: None,
        }
    }

    fn products_fixture() -> (
        Vec<SheetMetadata>,
        HashMap<String, SheetData>,
        HashMap<String, HashMap<String, ColumnRole>>,
    ) {
        let metadata = vec![SheetMetadata {
            sheet_name: "Products".to_string(),
            header_row: 1,
            columns: vec![
                column("ProductID", 1),
                column("Name", 2),
                column("Notes", 3),
            ],
            total_rows: 3,
        }];

        let mut products: SheetData = HashMap::new();
        products.insert(
            "ProductID".into(),
            vec![
                Data::String("WidgetMax".into()),
                Data::Empty,
                Data::String("GizmoPro".into()),
            ],
        );
        products.insert(
            "Name".into(),
            vec![
                Data::String("Widget".into()),
                Data::Empty,
                Data::String("Gizmo".into()),
            ],
        );
        // Entirely empty column: no profile chunk expected.
        products.insert(
            "Notes".into(),
            vec![Data::Empty, Data::Empty, Data::Empty],
        );
        let mut data = HashMap::new();
        data.insert("Products".to_string(), products);

        let mut product_roles = HashMap::new();
        product_roles.insert("ProductID".to_string(), role(RoleKind::PrimaryKey));
        product_roles.insert("Name".to_string(), role(RoleKind::Value));
        product_roles.insert("Notes".to_string(), role(RoleKind::Value));
        let mut roles = HashMap::new();
        roles.insert("Products".to_string(), product_roles);

        (metadata, data, roles)
    }

    #[test]
    fn chunk_order_and_count() {
        let (metadata, data, roles) = products_fixture();
        let chunks = SemanticChunker.build_chunks(&metadata, &data, &roles, &[]);

        // 1 summary + 2 non-empty rows + 2 non-empty columns.
        assert_eq!(chunks.len(), 5);
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "sheet_Products",
                "row_Products_1",
                "row_Products_3",
                "col_Products_ProductID",
                "col_Products_Name",
            ]
        );
    }

    #[test]
    fn row_chunk_marks_identifier_and_carries_primary_key() {
        let (metadata, data, roles) = products_fixture();
        let chunks = SemanticChunker.build_chunks(&metadata, &data, &roles, &[]);

        let row = &chunks[1];
        assert_eq!(row.chunk_type, ChunkType::RowSemantic);
        assert!(row.content.contains("ProductID (identifier): WidgetMax"));
        assert!(row.content.contains("Name: Widget"));
        assert_eq!(row.payload["primary_key"], json!("WidgetMax"));
        assert_eq!(row.payload["row_index"], json!(1));

        let keywords: Vec<String> = row.payload["keywords"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        // camelCase id value is searchable by its constituent words.
        assert!(keywords.contains(&"widgetmax".to_string()));
        assert!(keywords.contains(&"widget".to_string()));
        assert!(keywords.contains(&"max".to_string()));
    }

    #[test]
    fn sheet_summary_names_all_columns() {
        let (metadata, data, roles) = products_fixture();
        let chunks = SemanticChunker.build_chunks(&metadata, &data, &roles, &[]);

        let summary = &chunks[0];
        assert_eq!(summary.chunk_type, ChunkType::SheetSummary);
        assert_eq!(
            summary.content,
            "Sheet 'Products' has 3 rows. Columns: ProductID, Name, Notes."
        );
    }

    #[test]
    fn column_profile_caps_sample_at_three() {
        let values = vec![
            Data::String("a".into()),
            Data::String("b".into()),
            Data::String("c".into()),
            Data::String("d".into()),
        ];
        let chunk = column_profile("S", "Letters", &values).unwrap();
        assert!(chunk.content.contains("Contains 4 values"));
        assert!(chunk.content.contains("Sample: a, b, c."));
    }

    #[test]
    fn relationship_chunks_get_distinct_ids_for_shared_source_pair() {
        let rel = |sheet_b: &str| Relationship {
            kind: "shared_key".to_string(),
            sheet_a: "Orders".to_string(),
            column_a: "CustomerID".to_string(),
            sheet_b: sheet_b.to_string(),
            column_b: "CustomerID".to_string(),
            overlapping_values: vec!["C1".to_string()],
            overlap_ratio: 0.5,
        };
        let rels = vec![rel("Customers"), rel("Refunds")];

        let (metadata, data, roles) = products_fixture();
        let chunks = SemanticChunker.build_chunks(&metadata, &data, &roles, &rels);

        let rel_ids: Vec<&str> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Relationship)
            .map(|c| c.chunk_id.as_str())
            .collect();
        assert_eq!(rel_ids, vec!["rel_Orders_CustomerID_0", "rel_Orders_CustomerID_1"]);
        assert_eq!(chunks.last().unwrap().sheet_name, "Orders");
    }
}
