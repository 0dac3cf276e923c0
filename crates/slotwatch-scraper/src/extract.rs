//! Slot extraction from scraped rows.
//!
//! Two tiers: rows with at least [`MIN_STRUCTURED_CELLS`] cells become
//! structured records (provider in column 0, time in column 3, hidden form
//! fields as extras); anything else is kept as an unstructured record holding
//! the row text and first link so later stages can decide what to do with it.

use slotwatch_core::SlotRecord;

use crate::row::SlotRow;

/// Minimum number of cells for a row to be read as provider/time columns.
pub const MIN_STRUCTURED_CELLS: usize = 4;

const PROVIDER_COLUMN: usize = 0;
const TIME_COLUMN: usize = 3;

/// Turns scraped rows into slot records, in source order.
///
/// Never fails: a row whose cells cannot be read is logged and skipped, and
/// problems with secondary fields only blank those fields.
pub fn extract_slots<R: SlotRow>(rows: &[R]) -> Vec<SlotRecord> {
    let mut slots = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let cells = match row.cells() {
            Ok(cells) => cells,
            Err(e) => {
                tracing::warn!(row = index, error = %e, "skipping unreadable slot row");
                continue;
            }
        };

        if cells.len() >= MIN_STRUCTURED_CELLS {
            slots.push(structured_record(index, row, &cells));
        } else {
            slots.push(fallback_record(index, row));
        }
    }

    tracing::debug!(rows = rows.len(), slots = slots.len(), "extracted slots");
    slots
}

fn structured_record<R: SlotRow>(index: usize, row: &R, cells: &[String]) -> SlotRecord {
    let mut record = SlotRecord::new(
        cells[PROVIDER_COLUMN].trim(),
        cells[TIME_COLUMN].trim(),
    );

    match row.hidden_fields() {
        Ok(Some(fields)) => {
            for (name, value) in fields {
                record.extra.insert(name, value);
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(row = index, error = %e, "could not read hidden inputs");
        }
    }

    record
}

fn fallback_record<R: SlotRow>(index: usize, row: &R) -> SlotRecord {
    let text = row.text().unwrap_or_else(|e| {
        tracing::debug!(row = index, error = %e, "could not read row text");
        String::new()
    });
    let href = match row.link_href() {
        Ok(href) => href.unwrap_or_default(),
        Err(e) => {
            tracing::debug!(row = index, error = %e, "could not read row link");
            String::new()
        }
    };
    SlotRecord::unstructured(text.trim(), href)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;

    /// Scripted row for exercising every accessor outcome.
    #[derive(Default)]
    struct FakeRow {
        cells: Option<Vec<&'static str>>,
        hidden: Option<Vec<(&'static str, &'static str)>>,
        hidden_fails: bool,
        text: Option<&'static str>,
        href: Option<&'static str>,
    }

    fn fail(what: &'static str) -> ExtractionError {
        ExtractionError {
            what,
            reason: "element detached".into(),
        }
    }

    impl SlotRow for FakeRow {
        fn cells(&self) -> Result<Vec<String>, ExtractionError> {
            self.cells
                .as_ref()
                .map(|c| c.iter().map(|s| (*s).to_string()).collect())
                .ok_or_else(|| fail("cells"))
        }

        fn hidden_fields(&self) -> Result<Option<Vec<(String, String)>>, ExtractionError> {
            if self.hidden_fails {
                return Err(fail("hidden fields"));
            }
            Ok(self.hidden.as_ref().map(|fields| {
                fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect()
            }))
        }

        fn text(&self) -> Result<String, ExtractionError> {
            self.text.map(str::to_string).ok_or_else(|| fail("text"))
        }

        fn link_href(&self) -> Result<Option<String>, ExtractionError> {
            Ok(self.href.map(str::to_string))
        }
    }

    fn structured(provider: &'static str, time: &'static str) -> FakeRow {
        FakeRow {
            cells: Some(vec![provider, "Medicina General", "Centro", time]),
            ..FakeRow::default()
        }
    }

    #[test]
    fn structured_row_maps_columns_zero_and_three() {
        let slots = extract_slots(&[structured(" Dr. Alvarez ", "15/06/2025 09:00")]);
        assert_eq!(slots, vec![SlotRecord::new("Dr. Alvarez", "15/06/2025 09:00")]);
    }

    #[test]
    fn hidden_fields_are_copied_into_extra() {
        let mut row = structured("Dr. Alvarez", "15/06/2025 09:00");
        row.hidden = Some(vec![("ID_AGENDA", "991"), ("HORA", "15/06/2025 09:00")]);
        let slots = extract_slots(&[row]);
        assert_eq!(slots[0].extra.get("ID_AGENDA").map(String::as_str), Some("991"));
        assert_eq!(slots[0].extra.len(), 2);
    }

    #[test]
    fn hidden_field_failure_keeps_the_row() {
        let mut row = structured("Dr. Alvarez", "15/06/2025 09:00");
        row.hidden_fails = true;
        let slots = extract_slots(&[row]);
        assert_eq!(slots.len(), 1);
        assert!(slots[0].extra.is_empty());
    }

    #[test]
    fn short_row_becomes_unstructured_record() {
        let row = FakeRow {
            cells: Some(vec!["Sin horas disponibles"]),
            text: Some("  Sin horas disponibles "),
            href: Some("/agenda"),
            ..FakeRow::default()
        };
        let slots = extract_slots(&[row]);
        assert_eq!(
            slots,
            vec![SlotRecord::unstructured("Sin horas disponibles", "/agenda")]
        );
    }

    #[test]
    fn unstructured_row_without_text_or_link_is_blank() {
        let row = FakeRow {
            cells: Some(vec![]),
            ..FakeRow::default()
        };
        let slots = extract_slots(&[row]);
        assert_eq!(slots, vec![SlotRecord::unstructured("", "")]);
    }

    #[test]
    fn unreadable_row_is_skipped_and_batch_continues() {
        let rows = vec![
            structured("Dr. Alvarez", "15/06/2025 09:00"),
            FakeRow::default(),
            structured("Dra. Perez", "16/06/2025 10:00"),
        ];
        let slots = extract_slots(&rows);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].provider, "Dr. Alvarez");
        assert_eq!(slots[1].provider, "Dra. Perez");
    }

    #[test]
    fn extraction_never_grows_and_structured_rows_are_complete() {
        let rows = vec![
            structured("A", "01/01/2030 10:00"),
            FakeRow::default(),
            FakeRow {
                cells: Some(vec!["x", "y"]),
                text: Some("x y"),
                ..FakeRow::default()
            },
            structured("B", "02/01/2030 10:00"),
        ];
        let slots = extract_slots(&rows);
        assert!(slots.len() <= rows.len());
        for slot in slots.iter().filter(|s| !s.extra.contains_key("text")) {
            assert!(!slot.provider.is_empty());
            assert!(!slot.time_raw.is_empty());
        }
    }

    #[test]
    fn html_rows_extract_end_to_end() {
        let html = r#"<table><tbody>
            <tr><td>Dr. Juan Alvarez</td><td>MG</td><td>Centro</td><td>15/06/2025 09:00</td>
                <td><form><input type="hidden" name="ID" value="1"></form></td></tr>
            <tr><td><a href="/mas">Ver m&aacute;s</a></td></tr>
        </tbody></table>"#;
        let rows = crate::row::parse_rows(html);
        let slots = extract_slots(&rows);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].provider, "Dr. Juan Alvarez");
        assert_eq!(slots[0].extra["ID"], "1");
        assert_eq!(slots[1].extra["text"], "Ver más");
        assert_eq!(slots[1].extra["href"], "/mas");
    }
}
