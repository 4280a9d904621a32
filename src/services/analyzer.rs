use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use super::parser::SheetData;
use super::text::{cell_to_string, is_empty_cell};
use crate::models::{ColumnRole, Relationship, RoleKind, SheetMetadata};

/// Shared values kept on a relationship as evidence.
const OVERLAP_SAMPLE: usize = 10;

const ID_HINTS: [&str; 5] = ["_id", " id", "identifier", "key", "code"];
const METADATA_HINTS: [&str; 5] = ["updated", "created", "modified", "date", "timestamp"];

/// Derives cross-sheet links and per-column roles from parsed data.
/// Inputs are trusted to be well-formed parser output; a missing sheet
/// or column here is a programming error, not a handled case.
pub struct SchemaAnalyzer;

impl SchemaAnalyzer {
    /// Pairwise scan over sheets in workbook order (i < j), so each
    /// link is emitted once with `sheet_a` first in enumeration order.
    /// Candidate columns are matched by case-insensitive header
    /// equality only; a link is emitted when the distinct stringified
    /// value sets overlap at all.
    pub fn detect_relationships(
        &self,
        metadata: &[SheetMetadata],
        data: &HashMap<String, SheetData>,
    ) -> Vec<Relationship> {
        let mut relationships = Vec::new();
        for (i, meta_a) in metadata.iter().enumerate() {
            for meta_b in &metadata[i + 1..] {
                let data_a = &data[&meta_a.sheet_name];
                let data_b = &data[&meta_b.sheet_name];
                relationships.extend(find_links(meta_a, meta_b, data_a, data_b));
            }
        }
        tracing::info!("Detected {} cross-sheet relationships", relationships.len());
        relationships
    }

    /// Classify every column of one sheet. Rules escalate only: a
    /// primary key is never downgraded by a later rule, and the last
    /// relationship evaluated wins the `foreign_key_to` target.
    pub fn detect_roles(
        &self,
        meta: &SheetMetadata,
        sheet_data: &SheetData,
        relationships: &[Relationship],
    ) -> HashMap<String, ColumnRole> {
        let mut roles = HashMap::new();

        for col in &meta.columns {
            let values = &sheet_data[&col.name];
            let stringified: Vec<String> = values
                .iter()
                .filter(|v| !is_empty_cell(v))
                .map(cell_to_string)
                .collect();
            let total_count = stringified.len();
            let unique_count = stringified.iter().collect::<HashSet<_>>().len();

            let header_lower = col.name.trim().to_lowercase();
            let mut role = RoleKind::Value;
            let mut fk_target: Option<String> = None;

            let is_id_col = ID_HINTS.iter().any(|kw| header_lower.contains(kw))
                || header_lower.ends_with("id");
            if is_id_col {
                role = if total_count > 0 && unique_count == total_count {
                    RoleKind::PrimaryKey
                } else {
                    RoleKind::ForeignKey
                };
            }

            for rel in relationships {
                let target = if rel.sheet_a == meta.sheet_name && rel.column_a == col.name {
                    Some(format!("{}.{}", rel.sheet_b, rel.column_b))
                } else if rel.sheet_b == meta.sheet_name && rel.column_b == col.name {
                    Some(format!("{}.{}", rel.sheet_a, rel.column_a))
                } else {
                    None
                };
                if let Some(target) = target {
                    if role != RoleKind::PrimaryKey {
                        role = RoleKind::ForeignKey;
                    }
                    if fk_target.is_some() {
                        tracing::warn!(
                            "Column {}.{} participates in multiple relationships; \
                             keeping the last target {}",
                            meta.sheet_name,
                            col.name,
                            target
                        );
                    }
                    fk_target = Some(target);
                }
            }

            if role == RoleKind::Value
                && METADATA_HINTS.iter().any(|kw| header_lower.contains(kw))
            {
                role = RoleKind::Metadata;
            }

            roles.insert(
                col.name.clone(),
                ColumnRole {
                    role,
                    data_type: col.data_type,
                    unique_count,
                    total_count,
                    foreign_key_to: fk_target,
                },
            );
        }
        roles
    }
}

fn find_links(
    meta_a: &SheetMetadata,
    meta_b: &SheetMetadata,
    data_a: &SheetData,
    data_b: &SheetData,
) -> Vec<Relationship> {
    // First occurrence wins when a sheet repeats a header name.
    let mut cols_b: HashMap<String, &str> = HashMap::new();
    for col in &meta_b.columns {
        cols_b.entry(col.name.to_lowercase()).or_insert(&col.name);
    }

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    // Sheet A's column order fixes the emission order within a pair.
    for col_a in &meta_a.columns {
        let lower = col_a.name.to_lowercase();
        if !seen.insert(lower.clone()) {
            continue;
        }
        let Some(&name_b) = cols_b.get(&lower) else {
            continue;
        };

        let vals_a = distinct_values(&data_a[&col_a.name]);
        let vals_b = distinct_values(&data_b[name_b]);

        let mut overlap: Vec<String> = vals_a.intersection(&vals_b).cloned().collect();
        if overlap.is_empty() {
            continue;
        }
        let overlap_len = overlap.len();
        overlap.sort();
        overlap.truncate(OVERLAP_SAMPLE);

        links.push(Relationship {
            kind: "shared_key".to_string(),
            sheet_a: meta_a.sheet_name.clone(),
            column_a: col_a.name.clone(),
            sheet_b: meta_b.sheet_name.clone(),
            column_b: name_b.to_string(),
            overlapping_values: overlap,
            overlap_ratio: overlap_len as f64 / vals_a.len().max(vals_b.len()).max(1) as f64,
        });
    }
    links
}

fn distinct_values(values: &[calamine::Data]) -> HashSet<String> {
    values
        .par_iter()
        .filter(|v| !is_empty_cell(v))
        .map(cell_to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMetadata, DataType};
    use calamine::Data;
    use smallvec::SmallVec;

    fn column(name: &str, index: usize, data_type: DataType) -> ColumnMetadata {
        ColumnMetadata {
            name: name.to_string(),
            index,
            data_type,
            sample_values: SmallVec::new(),
            non_empty_count: 0,
        }
    }

    fn sheet(name: &str, columns: Vec<ColumnMetadata>, total_rows: usize) -> SheetMetadata {
        SheetMetadata {
            sheet_name: name.to_string(),
            header_row: 1,
            columns,
            total_rows,
        }
    }

    fn strings(values: &[&str]) -> Vec<Data> {
        values.iter().map(|v| Data::String(v.to_string())).collect()
    }

    fn orders_customers() -> (Vec<SheetMetadata>, HashMap<String, SheetData>) {
        let metadata = vec![
            sheet(
                "Orders",
                vec![
                    column("OrderID", 1, DataType::String),
                    column("CustomerID", 2, DataType::String),
                    column("Amount", 3, DataType::Number),
                ],
                4,
            ),
            sheet(
                "Customers",
                vec![
                    column("CustomerID", 1, DataType::String),
                    column("Name", 2, DataType::String),
                ],
                3,
            ),
        ];

        let mut orders: SheetData = HashMap::new();
        orders.insert("OrderID".into(), strings(&["O1", "O2", "O3", "O4"]));
        // C1 repeats, so Orders.CustomerID is not unique.
        orders.insert("CustomerID".into(), strings(&["C1", "C2", "C3", "C1"]));
        orders.insert(
            "Amount".into(),
            vec![
                Data::Float(10.0),
                Data::Float(20.0),
                Data::Float(30.0),
                Data::Float(40.0),
            ],
        );

        let mut customers: SheetData = HashMap::new();
        customers.insert("CustomerID".into(), strings(&["C1", "C2", "C3"]));
        customers.insert("Name".into(), strings(&["Ada", "Bob", "Cyd"]));

        let mut data = HashMap::new();
        data.insert("Orders".to_string(), orders);
        data.insert("Customers".to_string(), customers);
        (metadata, data)
    }

    #[test]
    fn shared_column_emits_one_relationship() {
        let (metadata, data) = orders_customers();
        let rels = SchemaAnalyzer.detect_relationships(&metadata, &data);

        assert_eq!(rels.len(), 1);
        let rel = &rels[0];
        assert_eq!(rel.kind, "shared_key");
        assert_eq!(rel.sheet_a, "Orders");
        assert_eq!(rel.sheet_b, "Customers");
        assert_eq!(rel.column_a, "CustomerID");
        assert_eq!(rel.overlap_ratio, 1.0);
        assert_eq!(rel.overlapping_values, vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn disjoint_values_emit_nothing() {
        let (metadata, mut data) = orders_customers();
        data.get_mut("Customers")
            .unwrap()
            .insert("CustomerID".into(), strings(&["X1", "X2"]));

        let rels = SchemaAnalyzer.detect_relationships(&metadata, &data);
        assert!(rels.is_empty());
    }

    #[test]
    fn overlap_sample_is_sorted_and_capped() {
        let many_a: Vec<String> = (0..15).map(|i| format!("v{:02}", i)).collect();
        let refs_a: Vec<&str> = many_a.iter().map(|s| s.as_str()).collect();

        let metadata = vec![
            sheet("A", vec![column("Code", 1, DataType::String)], 15),
            sheet("B", vec![column("Code", 1, DataType::String)], 15),
        ];
        let mut data = HashMap::new();
        let mut a: SheetData = HashMap::new();
        a.insert("Code".into(), strings(&refs_a));
        let mut b: SheetData = HashMap::new();
        b.insert("Code".into(), strings(&refs_a));
        data.insert("A".to_string(), a);
        data.insert("B".to_string(), b);

        let rels = SchemaAnalyzer.detect_relationships(&metadata, &data);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].overlapping_values.len(), 10);
        assert_eq!(rels[0].overlapping_values[0], "v00");
        assert_eq!(rels[0].overlap_ratio, 1.0);
    }

    #[test]
    fn unique_id_column_is_primary_key_despite_relationships() {
        let (metadata, data) = orders_customers();
        let rels = SchemaAnalyzer.detect_relationships(&metadata, &data);

        let customer_roles =
            SchemaAnalyzer.detect_roles(&metadata[1], &data["Customers"], &rels);
        let pk = &customer_roles["CustomerID"];
        assert_eq!(pk.role, RoleKind::PrimaryKey);
        assert_eq!(pk.unique_count, 3);
        assert_eq!(pk.total_count, 3);
    }

    #[test]
    fn relationship_records_foreign_key_target() {
        let (metadata, data) = orders_customers();
        let rels = SchemaAnalyzer.detect_relationships(&metadata, &data);

        let order_roles = SchemaAnalyzer.detect_roles(&metadata[0], &data["Orders"], &rels);
        let fk = &order_roles["CustomerID"];
        assert_eq!(fk.role, RoleKind::ForeignKey);
        assert_eq!(
            fk.foreign_key_to.as_deref(),
            Some("Customers.CustomerID")
        );
    }

    #[test]
    fn repeated_id_values_classify_as_foreign_key() {
        let metadata = vec![sheet(
            "Orders",
            vec![column("CustomerID", 1, DataType::String)],
            3,
        )];
        let mut orders: SheetData = HashMap::new();
        orders.insert("CustomerID".into(), strings(&["C1", "C1", "C2"]));

        let roles = SchemaAnalyzer.detect_roles(&metadata[0], &orders, &[]);
        assert_eq!(roles["CustomerID"].role, RoleKind::ForeignKey);
        assert_eq!(roles["CustomerID"].unique_count, 2);
        assert_eq!(roles["CustomerID"].total_count, 3);
    }

    #[test]
    fn timestamp_headers_classify_as_metadata() {
        let metadata = vec![sheet(
            "Log",
            vec![
                column("created_at", 1, DataType::Date),
                column("message", 2, DataType::String),
            ],
            2,
        )];
        let mut log: SheetData = HashMap::new();
        log.insert("created_at".into(), strings(&["2024-01-01", "2024-01-02"]));
        log.insert("message".into(), strings(&["boot", "shutdown"]));

        let roles = SchemaAnalyzer.detect_roles(&metadata[0], &log, &[]);
        assert_eq!(roles["created_at"].role, RoleKind::Metadata);
        assert_eq!(roles["message"].role, RoleKind::Value);
    }

    #[test]
    fn nulls_are_excluded_from_counts() {
        let metadata = vec![sheet(
            "Items",
            vec![column("item_id", 1, DataType::String)],
            4,
        )];
        let mut items: SheetData = HashMap::new();
        items.insert(
            "item_id".into(),
            vec![
                Data::String("A".into()),
                Data::Empty,
                Data::String("B".into()),
                Data::Empty,
            ],
        );

        let roles = SchemaAnalyzer.detect_roles(&metadata[0], &items, &[]);
        assert_eq!(roles["item_id"].total_count, 2);
        assert_eq!(roles["item_id"].unique_count, 2);
        assert_eq!(roles["item_id"].role, RoleKind::PrimaryKey);
    }
}
