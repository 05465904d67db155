//! # Conversion Session
//!
//! Explicit state of one interactive conversion: the current file, loading
//! and error flags, the rendered JSON and, for workbooks, the cached sheet
//! records with the selected sheet set.
//!
//! Reading a file is split into [`Session::begin`] and [`Session::complete`].
//! Each `begin` hands out a [`Ticket`] for the next generation, and `complete`
//! only applies results whose ticket is still current, so a slow read of an
//! earlier file can never overwrite the state of a later one.
use crate::convert::convert;
use crate::convert::output_file_name;
use crate::convert::render_records;
use crate::convert::Conversion;
use crate::convert::ExcelData;
use crate::error::SheetJsonError;
use crate::spreadsheet::FileKind;
use crate::spreadsheet::SpreadsheetError;
use std::collections::HashSet;
use tracing::debug;

/// Proof that a read was started by [`Session::begin`] for one generation.
#[derive(Debug, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

#[derive(Debug, Default)]
pub struct Session {
    file_name: Option<String>,
    is_loading: bool,
    error: Option<String>,
    json: Option<String>,
    excel_data: Option<ExcelData>,
    selected: HashSet<String>,
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts converting `file_name`, discarding everything derived from the
    /// previous file.
    ///
    /// An unsupported extension sets the error message and hands out no ticket.
    pub fn begin(&mut self, file_name: &str) -> Result<Ticket, String> {
        self.reset();
        if FileKind::detect(file_name).is_none() {
            let error = SheetJsonError::from(SpreadsheetError::UnsupportedFileType(file_name.to_owned()));
            let message = error.user_message();
            self.error = Some(message.clone());
            return Err(message);
        }
        self.file_name = Some(file_name.to_owned());
        self.is_loading = true;
        debug!(file = file_name, generation = self.generation, "began conversion");
        Ok(Ticket { generation: self.generation })
    }

    /// Applies the outcome of reading the file of `ticket`.
    ///
    /// Returns `false` and changes nothing when a later `begin` or `clear`
    /// made the ticket stale.
    pub fn complete(&mut self, ticket: Ticket, read_result: std::io::Result<Vec<u8>>) -> bool {
        if ticket.generation != self.generation {
            debug!(ticket = ticket.generation, current = self.generation, "ignoring stale read");
            return false;
        }
        let Some(file_name) = self.file_name.clone() else {
            return false;
        };
        self.is_loading = false;

        let outcome = read_result
            .map_err(SheetJsonError::from)
            .and_then(|bytes| convert(&file_name, bytes));
        match outcome {
            Ok(Conversion::Table(records)) => self.apply_render(render_records(&records)),
            Ok(Conversion::Workbook(data)) => {
                self.selected = data.sheet_names().map(str::to_owned).collect();
                self.excel_data = Some(data);
                self.render_selection();
            }
            Err(error) => self.error = Some(error.user_message()),
        }
        true
    }

    /// Flips the selection of one sheet. Unknown sheet names are ignored.
    pub fn toggle_sheet(&mut self, name: &str) {
        if !self.has_sheet(name) {
            return;
        }
        if !self.selected.remove(name) {
            self.selected.insert(name.to_owned());
        }
        self.render_selection();
    }

    /// Replaces the selection with the known sheets among `names`.
    pub fn select_sheets<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selected = names
            .into_iter()
            .filter(|name| self.has_sheet(name.as_ref()))
            .map(|name| name.as_ref().to_owned())
            .collect();
        self.render_selection();
    }

    pub fn select_all(&mut self) {
        if let Some(data) = &self.excel_data {
            self.selected = data.sheet_names().map(str::to_owned).collect();
        }
        self.render_selection();
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
        self.render_selection();
    }

    /// Forgets the current file. A read still in flight becomes stale.
    pub fn clear(&mut self) {
        self.reset();
    }

    /// Name for saving the rendered JSON.
    pub fn output_file_name(&self) -> Option<String> {
        self.file_name.as_deref().map(output_file_name)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn json(&self) -> Option<&str> {
        self.json.as_deref()
    }

    pub fn excel_data(&self) -> Option<&ExcelData> {
        self.excel_data.as_ref()
    }

    /// Selected sheets in workbook order.
    pub fn selected_sheets(&self) -> Vec<&str> {
        self.excel_data
            .iter()
            .flat_map(|data| data.sheet_names())
            .filter(|name| self.selected.contains(*name))
            .collect()
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    fn has_sheet(&self, name: &str) -> bool {
        self.excel_data.as_ref().is_some_and(|data| data.get(name).is_some())
    }

    /// Re-renders the cached workbook records; normalization is not re-run.
    fn render_selection(&mut self) {
        if let Some(data) = &self.excel_data {
            let rendered = data.render(&self.selected);
            self.apply_render(rendered);
        }
    }

    fn apply_render(&mut self, rendered: Result<String, SheetJsonError>) {
        match rendered {
            Ok(json) => self.json = Some(json),
            Err(error) => {
                self.json = None;
                self.error = Some(error.user_message());
            }
        }
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.file_name = None;
        self.is_loading = false;
        self.error = None;
        self.json = None;
        self.excel_data = None;
        self.selected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::xls::testing::label;
    use crate::spreadsheet::xls::testing::XlsBuilder;
    use serde_json::json;
    use serde_json::Value;

    fn workbook() -> Vec<u8> {
        XlsBuilder::new()
            .sheet("First", &[label(0, 0, "a"), label(1, 0, "one")])
            .sheet("Second", &[label(0, 0, "b"), label(1, 0, "two")])
            .sheet("Blank", &[label(0, 0, "c")])
            .build()
    }

    fn json_value(session: &Session) -> Value {
        serde_json::from_str(session.json().unwrap()).unwrap()
    }

    #[test]
    fn csv_conversion() {
        let mut session = Session::new();
        let ticket = session.begin("people.csv").unwrap();
        assert!(session.is_loading());
        assert!(session.complete(ticket, Ok(b"name,tags\nAnn,\"x,y\"\n".to_vec())));
        assert!(!session.is_loading());
        assert_eq!(session.error(), None);
        assert_eq!(json_value(&session), json!([{"name": "Ann", "tags": ["x", "y"]}]));
        assert_eq!(session.output_file_name().as_deref(), Some("people.json"));
        assert!(session.excel_data().is_none());
    }

    #[test]
    fn unsupported_file_gets_no_ticket() {
        let mut session = Session::new();
        let message = session.begin("photo.png").unwrap_err();
        assert_eq!(message, "Please select a CSV or Excel file (.csv, .xlsx, .xls)");
        assert_eq!(session.error(), Some(message.as_str()));
        assert!(!session.is_loading());
        assert_eq!(session.file_name(), None);
    }

    #[test]
    fn stale_reads_are_ignored() {
        let mut session = Session::new();
        let first = session.begin("old.csv").unwrap();
        let second = session.begin("new.csv").unwrap();
        assert!(!session.complete(first, Ok(b"old\n1\n".to_vec())));
        assert_eq!(session.json(), None);
        assert!(session.is_loading());

        assert!(session.complete(second, Ok(b"new\n2\n".to_vec())));
        assert_eq!(json_value(&session), json!([{"new": "2"}]));

        let pending = session.begin("late.csv").unwrap();
        session.clear();
        assert!(!session.complete(pending, Ok(b"late\n3\n".to_vec())));
        assert_eq!(session.file_name(), None);
    }

    #[test]
    fn workbook_selection() {
        let mut session = Session::new();
        let ticket = session.begin("book.xls").unwrap();
        assert!(session.complete(ticket, Ok(workbook())));
        assert_eq!(session.selected_sheets(), vec!["First", "Second"]);
        assert_eq!(json_value(&session), json!({"First": [{"a": "one"}], "Second": [{"b": "two"}]}));

        session.toggle_sheet("First");
        assert!(!session.is_selected("First"));
        assert_eq!(json_value(&session), json!([{"b": "two"}]));

        session.toggle_sheet("Blank");
        assert_eq!(session.selected_sheets(), vec!["Second"]);

        session.deselect_all();
        assert_eq!(json_value(&session), json!([]));

        session.select_sheets(["Second", "First", "Missing"]);
        assert_eq!(session.selected_sheets(), vec!["First", "Second"]);

        session.select_sheets(["First"]);
        session.select_all();
        assert_eq!(session.excel_data().map(|data| data.total_records), Some(2));
        assert_eq!(session.selected_sheets().len(), 2);
    }

    #[test]
    fn failures_become_messages() {
        let mut session = Session::new();
        let ticket = session.begin("blank.xls").unwrap();
        let bytes = XlsBuilder::new().sheet("S", &[label(0, 0, "h")]).build();
        assert!(session.complete(ticket, Ok(bytes)));
        assert_eq!(session.error(), Some("No data found in the Excel file"));
        assert_eq!(session.json(), None);

        let ticket = session.begin("gone.csv").unwrap();
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert!(session.complete(ticket, Err(missing)));
        assert_eq!(session.error(), Some("Error parsing file: no such file"));
    }
}
