// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::columns::{CellAction, ColumnSet, UpdateRequest, set_path};
use crate::edit::{CellKey, EditSession, EditSessions, EditValue};

pub const EMPTY_MESSAGE: &str = "No se encontraron resultados.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub column_id: String,
    pub text: String,
    pub editable: bool,
    pub editing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedRow {
    Data { key: String, cells: Vec<RenderedCell> },
    Empty { message: &'static str, span: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub widths: Vec<u16>,
    pub rows: Vec<RenderedRow>,
}

/// A committed cell edit, addressed by position and identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub row_index: usize,
    pub row_key: String,
    pub column_id: String,
    pub value: EditValue,
}

/// Stable key for a row: its `id`, then `id_devolution`, then its position.
pub fn row_key(row: &Value, index: usize) -> String {
    ["id", "id_devolution"]
        .iter()
        .find_map(|field| match row.get(field) {
            Some(Value::Number(number)) => Some(number.to_string()),
            Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_else(|| format!("#{index}"))
}

#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: ColumnSet,
    rows: Vec<Value>,
    sessions: EditSessions,
}

impl DataTable {
    pub fn new(columns: ColumnSet) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            sessions: EditSessions::default(),
        }
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Value> {
        self.rows.get(index)
    }

    pub fn sessions(&self) -> &EditSessions {
        &self.sessions
    }

    pub fn set_columns(&mut self, columns: ColumnSet) {
        self.columns = columns;
        self.sessions.clear();
    }

    /// Replaces the rows; open edits survive only if their row is still present.
    pub fn set_rows(&mut self, rows: Vec<Value>) {
        let keys = rows
            .iter()
            .enumerate()
            .map(|(index, row)| row_key(row, index))
            .collect::<BTreeSet<_>>();
        let stale = self
            .sessions
            .active()
            .filter(|(key, _)| !keys.contains(&key.row_key))
            .map(|(key, _)| key.clone());
        if let Some(key) = stale {
            self.sessions.cancel(&key);
        }
        self.rows = rows;
    }

    pub fn render(&self) -> RenderedTable {
        let headers = self.columns.iter().map(|c| c.header.clone()).collect();
        let widths = self.columns.iter().map(|c| c.width).collect();
        if self.rows.is_empty() {
            return RenderedTable {
                headers,
                widths,
                rows: vec![RenderedRow::Empty {
                    message: EMPTY_MESSAGE,
                    span: self.columns.len().max(1),
                }],
            };
        }

        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let key = row_key(row, index);
                let cells = self
                    .columns
                    .iter()
                    .map(|column| {
                        let cell = CellKey::new(key.clone(), column.id.clone());
                        match self.sessions.get(&cell) {
                            Some(session) => RenderedCell {
                                column_id: column.id.clone(),
                                text: session.draft().to_owned(),
                                editable: true,
                                editing: true,
                            },
                            None => RenderedCell {
                                column_id: column.id.clone(),
                                text: column.display(row),
                                editable: column.can_edit(row),
                                editing: false,
                            },
                        }
                    })
                    .collect();
                RenderedRow::Data { key, cells }
            })
            .collect();
        RenderedTable {
            headers,
            widths,
            rows,
        }
    }

    pub fn cell_key(&self, row_index: usize, column_index: usize) -> Option<CellKey> {
        let row = self.rows.get(row_index)?;
        let column = self.columns.get(column_index)?;
        Some(CellKey::new(row_key(row, row_index), column.id.clone()))
    }

    pub fn begin_edit(
        &mut self,
        row_index: usize,
        column_index: usize,
    ) -> Result<&mut EditSession> {
        let row = self
            .rows
            .get(row_index)
            .ok_or_else(|| anyhow!("no row at position {}", row_index + 1))?;
        let column = self
            .columns
            .get(column_index)
            .ok_or_else(|| anyhow!("no column at position {}", column_index + 1))?;
        if !column.editable {
            bail!("{} is read-only", column.header);
        }
        if !column.can_edit(row) {
            bail!("{} has nothing to edit in this row", column.header);
        }
        let original = column.original_value(row);
        let key = CellKey::new(row_key(row, row_index), column.id.clone());
        // One editor at a time.
        self.sessions.clear();
        Ok(self.sessions.begin(key, original))
    }

    pub fn active_edit(&self) -> Option<(&CellKey, &EditSession)> {
        self.sessions.active()
    }

    pub fn active_edit_mut(&mut self) -> Option<&mut EditSession> {
        let key = self.sessions.active().map(|(key, _)| key.clone())?;
        self.sessions.get_mut(&key)
    }

    pub fn cancel_edit(&mut self) -> bool {
        match self.sessions.active().map(|(key, _)| key.clone()) {
            Some(key) => self.sessions.cancel(&key),
            None => false,
        }
    }

    /// Closes the active editor; yields an update only when the value changed.
    pub fn commit_edit(&mut self) -> Option<CellUpdate> {
        let key = self.sessions.active().map(|(key, _)| key.clone())?;
        let value = self.sessions.commit(&key)?;
        let row_index = self
            .rows
            .iter()
            .enumerate()
            .position(|(index, row)| row_key(row, index) == key.row_key)?;
        Some(CellUpdate {
            row_index,
            row_key: key.row_key,
            column_id: key.column_id,
            value,
        })
    }

    pub fn request_for(&self, update: &CellUpdate) -> Result<UpdateRequest> {
        let row = self
            .rows
            .get(update.row_index)
            .ok_or_else(|| anyhow!("row {} is no longer on this page", update.row_key))?;
        let column = self
            .columns
            .by_id(&update.column_id)
            .ok_or_else(|| anyhow!("unknown column {}", update.column_id))?;
        let action = column
            .action
            .as_ref()
            .ok_or_else(|| anyhow!("{} is read-only", column.header))?;
        action.request(row, &update.value)
    }

    /// Writes a patched value into the cached row so the table reflects it
    /// before the next fetch. Only plain field patches apply locally.
    pub fn apply_local_patch(&mut self, update: &CellUpdate) -> bool {
        let Some(column) = self.columns.by_id(&update.column_id) else {
            return false;
        };
        if !matches!(column.action, Some(CellAction::Patch { .. })) {
            return false;
        }
        let path = column.accessor_path.clone();
        match self.rows.get_mut(update.row_index) {
            Some(row) if row_key(row, update.row_index) == update.row_key => {
                set_path(row, &path, update.value.to_json())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DataTable, EMPTY_MESSAGE, RenderedRow, row_key};
    use crate::columns::{UpdateRequest, seller_columns};
    use crate::edit::EditValue;
    use crate::Resource;
    use serde_json::{Value, json};

    fn sellers() -> Vec<Value> {
        vec![
            json!({
                "id": 1, "number_seller": "V-01", "name": "Ana", "last_name": "Quispe",
                "dni": "12345678", "phone": null, "status": true
            }),
            json!({
                "id": 2, "number_seller": "V-02", "name": "Luis", "last_name": "Rojas",
                "dni": "87654321", "phone": "987654321", "status": false
            }),
        ]
    }

    fn table() -> DataTable {
        let mut table = DataTable::new(seller_columns().expect("seller columns"));
        table.set_rows(sellers());
        table
    }

    #[test]
    fn empty_table_renders_single_spanning_row() {
        let table = DataTable::new(seller_columns().expect("seller columns"));
        let rendered = table.render();
        assert_eq!(
            rendered.rows,
            vec![RenderedRow::Empty {
                message: EMPTY_MESSAGE,
                span: 6
            }]
        );
        assert_eq!(rendered.headers.len(), 6);
    }

    #[test]
    fn rows_render_through_column_renderers() {
        let rendered = table().render();
        let RenderedRow::Data { key, cells } = &rendered.rows[1] else {
            panic!("expected data row");
        };
        assert_eq!(key, "2");
        assert_eq!(cells[1].text, "Luis");
        assert_eq!(cells[5].text, "Inactivo");
        assert!(!cells[0].editable);
        assert!(cells[1].editable);
    }

    #[test]
    fn read_only_columns_refuse_edits() {
        let mut table = table();
        let error = table.begin_edit(0, 0).expect_err("code column is read-only");
        assert!(error.to_string().contains("read-only"));
        assert!(table.active_edit().is_none());
    }

    #[test]
    fn commit_reports_changed_value_and_patches_locally() -> anyhow::Result<()> {
        let mut table = table();
        table.begin_edit(0, 1)?.set_draft("Ana María");
        let update = table.commit_edit().expect("changed value yields an update");
        assert_eq!(update.row_index, 0);
        assert_eq!(update.row_key, "1");
        assert_eq!(update.column_id, "name");
        assert_eq!(update.value, EditValue::Text("Ana María".to_owned()));

        assert_eq!(
            table.request_for(&update)?,
            UpdateRequest::Patch {
                resource: Resource::Sellers,
                id: 1,
                field: "name".to_owned(),
                value: json!("Ana María"),
            }
        );
        assert!(table.apply_local_patch(&update));
        assert_eq!(table.rows()[0]["name"], "Ana María");
        assert!(table.active_edit().is_none());
        Ok(())
    }

    #[test]
    fn unchanged_commit_closes_editor_silently() -> anyhow::Result<()> {
        let mut table = table();
        table.begin_edit(1, 2)?;
        assert!(table.commit_edit().is_none());
        assert!(table.active_edit().is_none());
        Ok(())
    }

    #[test]
    fn editing_cell_renders_draft() -> anyhow::Result<()> {
        let mut table = table();
        table.begin_edit(0, 3)?.insert_char('9');
        let rendered = table.render();
        let RenderedRow::Data { cells, .. } = &rendered.rows[0] else {
            panic!("expected data row");
        };
        assert!(cells[3].editing);
        assert_eq!(cells[3].text, "9");
        Ok(())
    }

    #[test]
    fn replacing_rows_drops_edits_for_vanished_rows() -> anyhow::Result<()> {
        let mut table = table();
        table.begin_edit(1, 1)?;
        table.set_rows(vec![sellers().remove(0)]);
        assert!(table.active_edit().is_none());

        table.begin_edit(0, 1)?;
        table.set_rows(sellers());
        assert!(table.active_edit().is_some());
        Ok(())
    }

    #[test]
    fn row_key_falls_back_to_position() {
        assert_eq!(row_key(&json!({"id": 4}), 0), "4");
        assert_eq!(row_key(&json!({"id_devolution": 9}), 0), "9");
        assert_eq!(row_key(&json!({"name": "x"}), 3), "#3");
    }
}
