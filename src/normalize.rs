//! Row normalization: raw text cells → typed [`Record`] or a [`RowRejection`].
//!
//! Spreadsheet rows are positional. Which position feeds which field is not hard-coded here; it is
//! declared by a versioned [`SheetLayout`] and checked against the entity schema once, when the
//! layout is bound. A layout that drifts from the schema fails at bind time instead of silently
//! shifting columns.

use std::fmt;

use thiserror::Error;

use crate::entity::EntityDescriptor;
use crate::error::{IngestError, IngestResult};
use crate::types::{DataType, Record, Value};

/// What to do when a numeric cell does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericFallback {
    /// Store zero and keep the row.
    #[default]
    Zero,
    /// Reject the row with [`RejectReason::ParseFailure`].
    Reject,
}

/// One positional column of a [`SheetLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Zero-based cell position.
    pub position: usize,
    /// Target field name in the entity schema.
    pub field: String,
}

impl ColumnMapping {
    pub fn new(position: usize, field: impl Into<String>) -> Self {
        Self {
            position,
            field: field.into(),
        }
    }
}

/// Versioned mapping from spreadsheet positions to entity fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub name: String,
    pub version: u32,
    /// Rows with fewer cells are rejected with [`RejectReason::TooFewColumns`].
    pub min_columns: usize,
    pub columns: Vec<ColumnMapping>,
}

impl SheetLayout {
    /// The 12-column product upload sheet.
    pub fn product_v1() -> Self {
        let fields = [
            "shop_id",
            "shop_code",
            "spu",
            "skc",
            "sku",
            "skc_code",
            "sku_code",
            "color_cn",
            "color_en",
            "size",
            "image_url",
            "bar_code",
        ];
        Self {
            name: "product".to_string(),
            version: 1,
            min_columns: fields.len(),
            columns: fields
                .iter()
                .enumerate()
                .map(|(pos, f)| ColumnMapping::new(pos, *f))
                .collect(),
        }
    }

    /// Check this layout against `descriptor` and return a normalizer for it.
    ///
    /// Every schema field must be mapped exactly once, and every mapped position must lie inside
    /// `min_columns` so an accepted row always has the cell.
    pub fn bind<'a>(&'a self, descriptor: &'a EntityDescriptor) -> IngestResult<RowNormalizer<'a>> {
        let err = |message: String| {
            IngestError::schema_mismatch(format!("layout {} v{}: {message}", self.name, self.version))
        };

        let mut positions: Vec<Option<usize>> = vec![None; descriptor.schema.len()];
        for col in &self.columns {
            let idx = descriptor
                .schema
                .index_of(&col.field)
                .ok_or_else(|| err(format!("field '{}' is not in {}", col.field, descriptor.table)))?;
            if positions[idx].is_some() {
                return Err(err(format!("field '{}' mapped more than once", col.field)));
            }
            if col.position >= self.min_columns {
                return Err(err(format!(
                    "field '{}' at position {} is outside min_columns {}",
                    col.field, col.position, self.min_columns
                )));
            }
            positions[idx] = Some(col.position);
        }

        let positions = positions
            .into_iter()
            .zip(descriptor.schema.field_names())
            .map(|(p, name)| p.ok_or_else(|| err(format!("field '{name}' has no column"))))
            .collect::<IngestResult<Vec<_>>>()?;
        let key = descriptor.resolve()?.conflict;

        Ok(RowNormalizer {
            layout: self,
            descriptor,
            positions,
            key,
        })
    }
}

/// Why a row was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("too few columns ({found} < {required})")]
    TooFewColumns { found: usize, required: usize },

    #[error("cannot parse column '{column}' (raw='{raw}'): {message}")]
    ParseFailure {
        column: String,
        raw: String,
        message: String,
    },

    #[error("natural key column '{column}' is blank")]
    MissingKey { column: String },
}

/// A skipped row with its location, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sheet '{sheet}' row {row}: {reason}")]
pub struct RowRejection {
    pub sheet: String,
    /// 1-based row number, header included (spreadsheet-style).
    pub row: usize,
    pub reason: RejectReason,
}

/// Output of [`RowNormalizer::normalize_rows`]: the valid/invalid partition of a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub rejected: Vec<RowRejection>,
}

/// A [`SheetLayout`] bound to an entity schema.
pub struct RowNormalizer<'a> {
    layout: &'a SheetLayout,
    descriptor: &'a EntityDescriptor,
    /// Cell position for each schema field, in schema order.
    positions: Vec<usize>,
    key: Vec<usize>,
}

impl fmt::Debug for RowNormalizer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowNormalizer")
            .field("layout", &format!("{} v{}", self.layout.name, self.layout.version))
            .field("table", &self.descriptor.table)
            .field("positions", &self.positions)
            .finish()
    }
}

impl RowNormalizer<'_> {
    /// Normalize one row of cells. Pure; does not log.
    pub fn normalize(&self, cells: &[String], fallback: NumericFallback) -> Result<Record, RejectReason> {
        if cells.len() < self.layout.min_columns {
            return Err(RejectReason::TooFewColumns {
                found: cells.len(),
                required: self.layout.min_columns,
            });
        }

        let mut values = Vec::with_capacity(self.positions.len());
        for (field, &pos) in self.descriptor.schema.fields.iter().zip(&self.positions) {
            let raw = cells[pos].as_str();
            let value = match field.data_type {
                DataType::Utf8 => Value::text(raw.trim()),
                DataType::Int64 => match raw.trim().parse::<i64>() {
                    Ok(v) => Value::Int64(v),
                    Err(_) if fallback == NumericFallback::Zero => Value::Int64(0),
                    Err(e) => {
                        return Err(RejectReason::ParseFailure {
                            column: field.name.clone(),
                            raw: raw.to_string(),
                            message: e.to_string(),
                        });
                    }
                },
            };
            values.push(value);
        }

        if let Some(&blank) = self.key.iter().find(|&&i| values[i].is_blank()) {
            return Err(RejectReason::MissingKey {
                column: self.descriptor.schema.fields[blank].name.clone(),
            });
        }
        Ok(Record::new(values))
    }

    /// Normalize every row of a sheet after skipping `header_rows` leading rows.
    ///
    /// Row numbers in rejections are 1-based and count the header, so the first data row under a
    /// single header line is row 2.
    pub fn normalize_rows<I>(&self, sheet: &str, rows: I, header_rows: usize, fallback: NumericFallback) -> Normalized
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut out = Normalized::default();
        for (idx0, row) in rows.into_iter().enumerate().skip(header_rows) {
            match self.normalize(&row, fallback) {
                Ok(record) => out.records.push(record),
                Err(reason) => out.rejected.push(RowRejection {
                    sheet: sheet.to_string(),
                    row: idx0 + 1,
                    reason,
                }),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnMapping, NumericFallback, RejectReason, SheetLayout};
    use crate::entity::Entity;
    use crate::model::Product;
    use crate::types::Value;

    fn row(shop_id: &str, sku: &str) -> Vec<String> {
        let mut r: Vec<String> = (0..12).map(|i| format!("c{i}")).collect();
        r[0] = shop_id.to_string();
        r[4] = sku.to_string();
        r
    }

    #[test]
    fn product_v1_maps_positions_to_fields() {
        let layout = SheetLayout::product_v1();
        let n = layout.bind(Product::descriptor()).unwrap();
        let rec = n.normalize(&row("42", " X1 "), NumericFallback::Zero).unwrap();
        let p = Product::from_record(&rec).unwrap();
        assert_eq!(p.shop_id, 42);
        assert_eq!(p.sku, "X1");
        assert_eq!(p.skc, "c3");
        assert_eq!(p.skc_code, "c5");
        assert_eq!(p.bar_code, "c11");
    }

    #[test]
    fn short_row_is_rejected() {
        let layout = SheetLayout::product_v1();
        let n = layout.bind(Product::descriptor()).unwrap();
        let short: Vec<String> = row("1", "X1").into_iter().take(8).collect();
        assert_eq!(
            n.normalize(&short, NumericFallback::Zero),
            Err(RejectReason::TooFewColumns { found: 8, required: 12 })
        );
    }

    #[test]
    fn numeric_fallback_policy() {
        let layout = SheetLayout::product_v1();
        let n = layout.bind(Product::descriptor()).unwrap();

        let rec = n.normalize(&row("shop-7", "X1"), NumericFallback::Zero).unwrap();
        assert_eq!(rec.get(0), Some(&Value::Int64(0)));

        let err = n.normalize(&row("shop-7", "X1"), NumericFallback::Reject).unwrap_err();
        assert!(matches!(err, RejectReason::ParseFailure { ref column, .. } if column == "shop_id"));
    }

    #[test]
    fn blank_sku_is_rejected() {
        let layout = SheetLayout::product_v1();
        let n = layout.bind(Product::descriptor()).unwrap();
        assert_eq!(
            n.normalize(&row("1", "  "), NumericFallback::Zero),
            Err(RejectReason::MissingKey { column: "sku".to_string() })
        );
    }

    #[test]
    fn normalize_rows_skips_header_and_numbers_rows() {
        let layout = SheetLayout::product_v1();
        let n = layout.bind(Product::descriptor()).unwrap();
        let rows = vec![
            row("shop_id", "sku"),
            row("1", "A"),
            row("1", "B").into_iter().take(8).collect(),
            row("1", "C"),
        ];
        let out = n.normalize_rows("Sheet1", rows, 1, NumericFallback::Zero);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].row, 3);
        assert_eq!(
            out.rejected[0].to_string(),
            "sheet 'Sheet1' row 3: too few columns (8 < 12)"
        );
    }

    #[test]
    fn drifted_layouts_fail_to_bind() {
        let mut missing = SheetLayout::product_v1();
        missing.columns.pop();
        assert!(missing.bind(Product::descriptor()).is_err());

        let mut unknown = SheetLayout::product_v1();
        unknown.columns.push(ColumnMapping::new(3, "category"));
        assert!(unknown.bind(Product::descriptor()).is_err());

        let mut outside = SheetLayout::product_v1();
        outside.min_columns = 10;
        assert!(outside.bind(Product::descriptor()).is_err());
    }
}
