use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::domains::csv::RowRecord;
use crate::domains::schema::{ColumnDescriptor, TableSchema, TypeCategory};
use crate::errors::{MigrationError, MigrationResult};

use super::types::{TypedRow, TypedValue};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

impl TypeCategory {
    /// Parse non-empty text into this category. `None` means the text is not a valid value.
    pub fn parse(&self, raw: &str) -> Option<TypedValue> {
        match self {
            TypeCategory::Text => Some(TypedValue::Text(raw.to_string())),
            TypeCategory::Identifier => Uuid::parse_str(raw.trim()).ok().map(TypedValue::Identifier),
            TypeCategory::Integer64 => raw.trim().parse().ok().map(TypedValue::Integer64),
            TypeCategory::Integer32 => raw.trim().parse().ok().map(TypedValue::Integer32),
            TypeCategory::Integer16 => raw.trim().parse().ok().map(TypedValue::Integer16),
            TypeCategory::Decimal => parse_decimal(raw.trim()).map(TypedValue::Decimal),
            TypeCategory::Temporal => parse_temporal(raw.trim()).map(TypedValue::Temporal),
        }
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Calendar date/time parsing shared by import and by store readers.
pub fn parse_temporal(text: &str) -> Option<NaiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Some(value);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|value| value.naive_local())
}

/// Map one raw cell to a typed value. Empty or absent text is null only for nullable columns.
pub fn coerce(raw: Option<&str>, descriptor: &ColumnDescriptor) -> MigrationResult<TypedValue> {
    let text = raw.unwrap_or_default();
    if text.is_empty() {
        return if descriptor.nullable {
            Ok(TypedValue::Null)
        } else {
            Err(MigrationError::NullNotAllowed {
                column: descriptor.name.clone(),
            })
        };
    }

    descriptor
        .category
        .parse(text)
        .ok_or_else(|| MigrationError::TypeCoercion {
            column: descriptor.name.clone(),
            raw_value: text.to_string(),
            target: descriptor.category,
        })
}

/// Positions of each schema column inside a record header.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    header: Vec<String>,
    sources: Vec<usize>,
}

impl ColumnPlan {
    /// Fails with `ColumnMismatch` unless the header names exactly the schema's columns.
    pub fn new(header: &[String], schema: &TableSchema) -> MigrationResult<Self> {
        let mut sources: Vec<Option<usize>> = vec![None; schema.len()];
        let mut unexpected = Vec::new();

        for (record_idx, name) in header.iter().enumerate() {
            match schema.position(name) {
                Some(schema_idx) if sources[schema_idx].is_none() => {
                    sources[schema_idx] = Some(record_idx)
                }
                _ => unexpected.push(name.clone()),
            }
        }

        let missing: Vec<String> = schema
            .columns
            .iter()
            .zip(&sources)
            .filter(|(_, source)| source.is_none())
            .map(|(column, _)| column.name.clone())
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(MigrationError::ColumnMismatch {
                missing,
                unexpected,
            });
        }

        Ok(Self {
            header: header.to_vec(),
            sources: sources.into_iter().flatten().collect(),
        })
    }

    pub fn serves(&self, record: &RowRecord) -> bool {
        record.header() == self.header.as_slice()
    }

    pub fn coerce(&self, record: &RowRecord, schema: &TableSchema) -> MigrationResult<TypedRow> {
        let values = schema
            .columns
            .iter()
            .zip(&self.sources)
            .map(|(column, &source)| coerce(record.value(source), column))
            .collect::<MigrationResult<Vec<_>>>()?;
        Ok(TypedRow::new(values))
    }
}

/// Coerce a single record against a schema.
pub fn coerce_row(record: &RowRecord, schema: &TableSchema) -> MigrationResult<TypedRow> {
    ColumnPlan::new(record.header(), schema)?.coerce(record, schema)
}

/// Coerce a group of records; the first failing row fails the whole group.
pub fn coerce_rows(records: &[RowRecord], schema: &TableSchema) -> MigrationResult<Vec<TypedRow>> {
    let mut plan: Option<ColumnPlan> = None;
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let current = match plan.take() {
            Some(existing) if existing.serves(record) => existing,
            _ => ColumnPlan::new(record.header(), schema)?,
        };
        rows.push(current.coerce(record, schema)?);
        plan = Some(current);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::schema::{CatalogColumn, TypeAliases};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn column(name: &str, declared_type: &str, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor::from_catalog(
            CatalogColumn {
                ordinal: 0,
                name: name.to_string(),
                declared_type: declared_type.to_string(),
                not_null: !nullable,
            },
            &TypeAliases::default(),
        )
    }

    fn scenario_schema() -> TableSchema {
        let mut id = column("id", "uniqueidentifier", false);
        id.ordinal = 0;
        let mut amt = column("amt", "decimal", true);
        amt.ordinal = 1;
        TableSchema::new("T", vec![id, amt])
    }

    #[test]
    fn test_nullable_empty_becomes_null() {
        let amt = column("amt", "decimal", true);
        assert_eq!(coerce(Some(""), &amt).unwrap(), TypedValue::Null);
        assert_eq!(coerce(None, &amt).unwrap(), TypedValue::Null);
    }

    #[test]
    fn test_non_nullable_never_returns_null() {
        for declared in ["uniqueidentifier", "bigint", "int", "bit", "money", "datetime", "nvarchar(10)"] {
            let col = column("c", declared, false);
            let err = coerce(Some(""), &col).unwrap_err();
            assert!(
                matches!(err, MigrationError::NullNotAllowed { ref column } if column == "c"),
                "{} produced {:?}",
                declared,
                err
            );
        }
    }

    #[test]
    fn test_integer_ranges_are_enforced() {
        assert_eq!(coerce(Some("-32768"), &column("s", "smallint", false)).unwrap(), TypedValue::Integer16(-32768));
        assert!(coerce(Some("32768"), &column("s", "smallint", false)).is_err());
        assert_eq!(coerce(Some(" 42 "), &column("i", "int", false)).unwrap(), TypedValue::Integer32(42));
        assert!(coerce(Some("2147483648"), &column("i", "int", false)).is_err());
        assert_eq!(
            coerce(Some("9223372036854775807"), &column("b", "bigint", false)).unwrap(),
            TypedValue::Integer64(i64::MAX)
        );
        assert_eq!(coerce(Some("1"), &column("flag", "bit", false)).unwrap(), TypedValue::Integer16(1));
    }

    #[test]
    fn test_decimal_parsing() {
        let amt = column("amt", "decimal(18,2)", false);
        assert_eq!(coerce(Some("1.50"), &amt).unwrap(), TypedValue::Decimal(dec!(1.50)));
        assert_eq!(coerce(Some("-0.25"), &amt).unwrap(), TypedValue::Decimal(dec!(-0.25)));
        assert_eq!(coerce(Some("1E-05"), &amt).unwrap(), TypedValue::Decimal(dec!(0.00001)));
        let err = coerce(Some("1,5x"), &amt).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::TypeCoercion { ref raw_value, target: TypeCategory::Decimal, .. } if raw_value == "1,5x"
        ));
    }

    #[test]
    fn test_temporal_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(14, 7, 9).unwrap();
        for text in ["2024-03-05 14:07:09", "2024-03-05T14:07:09", "2024/03/05 14:07:09", "2024-03-05T14:07:09+02:00"] {
            assert_eq!(parse_temporal(text), Some(expected), "{}", text);
        }
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(parse_temporal("2024-03-05"), Some(midnight));
        assert_eq!(parse_temporal("05.03.2024"), None);

        let millis = parse_temporal("2024-03-05 14:07:09.250").unwrap();
        assert_eq!(TypedValue::Temporal(millis).to_string(), "2024-03-05 14:07:09.250");
    }

    #[test]
    fn test_text_is_passed_through() {
        let memo = column("memo", "nvarchar(max)", true);
        assert_eq!(coerce(Some("  a,\"b\"  "), &memo).unwrap(), TypedValue::Text("  a,\"b\"  ".into()));
    }

    #[test]
    fn test_category_comes_from_descriptor_not_text() {
        let code = column("code", "varchar(10)", false);
        assert_eq!(coerce(Some("0042"), &code).unwrap(), TypedValue::Text("0042".into()));
    }

    #[test]
    fn test_coerce_is_deterministic() {
        let amt = column("amt", "money", true);
        assert_eq!(coerce(Some("12.3400"), &amt).unwrap(), coerce(Some("12.3400"), &amt).unwrap());
    }

    #[test]
    fn test_scenario_guid_with_null_amount() {
        let schema = scenario_schema();
        let record = RowRecord::from_pairs(&[("id", "3fa85f64-5717-4562-b3fc-2c963f66afa6"), ("amt", "")]).unwrap();
        let row = coerce_row(&record, &schema).unwrap();
        assert_eq!(
            row.values(),
            &[
                TypedValue::Identifier(Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap()),
                TypedValue::Null,
            ]
        );
    }

    #[test]
    fn test_scenario_empty_guid_is_rejected() {
        let schema = scenario_schema();
        let record = RowRecord::from_pairs(&[("id", ""), ("amt", "1.50")]).unwrap();
        let err = coerce_row(&record, &schema).unwrap_err();
        assert!(matches!(err, MigrationError::NullNotAllowed { ref column } if column == "id"));
    }

    #[test]
    fn test_header_matching_ignores_case_and_order() {
        let schema = scenario_schema();
        let record = RowRecord::from_pairs(&[("AMT", "2"), ("Id", "3fa85f64-5717-4562-b3fc-2c963f66afa6")]).unwrap();
        let row = coerce_row(&record, &schema).unwrap();
        assert_eq!(row.get(1), Some(&TypedValue::Decimal(dec!(2))));
    }

    #[test]
    fn test_header_matching_folds_non_ascii_letters() {
        let schema = TableSchema::new("T", vec![column("ämt", "decimal", true)]);
        let record = RowRecord::from_pairs(&[("ÄMT", "7.5")]).unwrap();

        assert_eq!(record.get("ämt"), Some("7.5"));
        let row = coerce_row(&record, &schema).unwrap();
        assert_eq!(row.get(0), Some(&TypedValue::Decimal(dec!(7.5))));
    }

    #[test]
    fn test_extra_or_missing_columns_fail() {
        let schema = scenario_schema();
        let extra = RowRecord::from_pairs(&[("id", "3fa85f64-5717-4562-b3fc-2c963f66afa6"), ("amt", "1"), ("note", "x")]).unwrap();
        match coerce_row(&extra, &schema).unwrap_err() {
            MigrationError::ColumnMismatch { missing, unexpected } => {
                assert!(missing.is_empty());
                assert_eq!(unexpected, vec!["note".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }

        let short = RowRecord::from_pairs(&[("id", "3fa85f64-5717-4562-b3fc-2c963f66afa6")]).unwrap();
        match coerce_row(&short, &schema).unwrap_err() {
            MigrationError::ColumnMismatch { missing, .. } => assert_eq!(missing, vec!["amt".to_string()]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_coerce_rows_fails_on_first_bad_row() {
        let schema = scenario_schema();
        let records = vec![
            RowRecord::from_pairs(&[("id", "3fa85f64-5717-4562-b3fc-2c963f66afa6"), ("amt", "1")]).unwrap(),
            RowRecord::from_pairs(&[("id", "not-a-guid"), ("amt", "1")]).unwrap(),
        ];
        let err = coerce_rows(&records, &schema).unwrap_err();
        assert_eq!(err.column(), Some("id"));
        assert_eq!(coerce_rows(&records[..1], &schema).unwrap().len(), 1);
    }
}
