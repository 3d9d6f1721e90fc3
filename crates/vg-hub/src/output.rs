//! # Output Layer
//!
//! Response buffering, the `fixed16` framing header, and the four
//! rendering formats (`csv`, `broken_csv`, `json`, `python3`). The
//! answerer produces rows of [`ColumnValue`]s; everything
//! format-specific lives here.

use serde_json::Value;

use crate::query::column::ColumnValue;

/// Response status, carried in the `fixed16` framing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    BadRequest,
    NotFound,
    InternalError,
}

impl ResponseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::InternalError => 500,
        }
    }
}

/// How to frame the response on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseHeader {
    #[default]
    Off,
    Fixed16,
}

/// Rendering format selected by `OutputFormat:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Quoted, comma-separated CSV (`OutputFormat: CSV`).
    Csv,
    /// The legacy default: raw joins with the query separators.
    #[default]
    BrokenCsv,
    Json,
    Python3,
}

/// The four single-byte separators of the broken-csv format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub dataset: u8,
    pub field: u8,
    pub list: u8,
    pub host_service: u8,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            dataset: b'\n',
            field: b';',
            list: b',',
            host_service: b'|',
        }
    }
}

// =============================================================================
// Response buffer
// =============================================================================

/// Accumulates one response: payload data plus an optional error. The
/// first recorded error wins and replaces the payload on the wire.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    data: String,
    error: Option<(ResponseCode, String)>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &str) {
        self.data.push_str(data);
    }

    /// Record a failure. Only the first one is kept.
    pub fn set_error(&mut self, code: ResponseCode, message: String) {
        if self.error.is_none() {
            tracing::info!(code = code.as_u16(), %message, "request error");
            self.error = Some((code, message));
        } else {
            tracing::debug!(%message, "suppressing subsequent request error");
        }
    }

    pub fn error(&self) -> Option<&(ResponseCode, String)> {
        self.error.as_ref()
    }

    /// Serialize the response, honoring the configured framing.
    pub fn render_response(&self, header: ResponseHeader) -> Vec<u8> {
        let (code, payload) = match &self.error {
            Some((code, message)) => (*code, format!("{message}\n")),
            None => (ResponseCode::Ok, self.data.clone()),
        };
        let mut wire = Vec::with_capacity(payload.len() + 16);
        if header == ResponseHeader::Fixed16 {
            wire.extend_from_slice(format!("{:3} {:11}\n", code.as_u16(), payload.len()).as_bytes());
        }
        wire.extend_from_slice(payload.as_bytes());
        wire
    }
}

// =============================================================================
// Row rendering
// =============================================================================

/// Renders emitted rows in the plan's output format.
pub struct ResultWriter {
    format: OutputFormat,
    separators: Separators,
    csv: String,
    json_rows: Vec<Value>,
}

impl ResultWriter {
    pub fn new(format: OutputFormat, separators: Separators) -> Self {
        Self {
            format,
            separators,
            csv: String::new(),
            json_rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, cells: Vec<ColumnValue>) {
        match self.format {
            OutputFormat::BrokenCsv => {
                let field = char::from(self.separators.field);
                let row: Vec<String> = cells
                    .iter()
                    .map(|c| cell_text(c, &self.separators))
                    .collect();
                self.csv.push_str(&row.join(&field.to_string()));
                self.csv.push(char::from(self.separators.dataset));
            }
            OutputFormat::Csv => {
                let row: Vec<String> = cells
                    .iter()
                    .map(|c| quote_csv(&cell_text(c, &self.separators)))
                    .collect();
                self.csv.push_str(&row.join(","));
                self.csv.push_str("\r\n");
            }
            OutputFormat::Json | OutputFormat::Python3 => {
                self.json_rows
                    .push(Value::Array(cells.iter().map(cell_json).collect()));
            }
        }
    }

    pub fn finish(self) -> String {
        match self.format {
            OutputFormat::BrokenCsv | OutputFormat::Csv => self.csv,
            OutputFormat::Json => {
                let mut text = Value::Array(self.json_rows).to_string();
                text.push('\n');
                text
            }
            OutputFormat::Python3 => {
                let mut text = python_repr(&Value::Array(self.json_rows));
                text.push('\n');
                text
            }
        }
    }
}

/// Textual rendering of one cell, used by both csv flavors. List
/// elements join with the list separator, element parts with the
/// host-service separator.
pub(crate) fn cell_text(cell: &ColumnValue, separators: &Separators) -> String {
    match cell {
        ColumnValue::Text(s) => s.clone(),
        ColumnValue::Int(n) => n.to_string(),
        ColumnValue::Float(x) => x.to_string(),
        ColumnValue::List(elements) => {
            let hsep = char::from(separators.host_service).to_string();
            let lsep = char::from(separators.list).to_string();
            elements
                .iter()
                .map(|parts| parts.join(&hsep))
                .collect::<Vec<_>>()
                .join(&lsep)
        }
        ColumnValue::Null => String::new(),
    }
}

fn cell_json(cell: &ColumnValue) -> Value {
    match cell {
        ColumnValue::Text(s) => Value::String(s.clone()),
        ColumnValue::Int(n) => Value::Number((*n).into()),
        ColumnValue::Float(x) => serde_json::Number::from_f64(*x)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnValue::List(elements) => Value::Array(
            elements
                .iter()
                .map(|parts| {
                    if parts.len() == 1 {
                        Value::String(parts[0].clone())
                    } else {
                        Value::Array(parts.iter().cloned().map(Value::String).collect())
                    }
                })
                .collect(),
        ),
        ColumnValue::Null => Value::Null,
    }
}

fn quote_csv(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Python literal rendering: JSON syntax except for `None`.
fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(python_repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cells() -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text("frontend".into()),
            ColumnValue::Int(3),
            ColumnValue::List(vec![
                vec!["web01".into(), "HTTP".into()],
                vec!["web01".into(), "HTTPS".into()],
            ]),
            ColumnValue::Null,
        ]
    }

    #[test]
    fn test_broken_csv_uses_query_separators() {
        let mut w = ResultWriter::new(OutputFormat::BrokenCsv, Separators::default());
        w.add_row(sample_cells());
        assert_eq!(w.finish(), "frontend;3;web01|HTTP,web01|HTTPS;\n");
    }

    #[test]
    fn test_broken_csv_honors_custom_separators() {
        let custom = Separators {
            dataset: b'\n',
            field: b':',
            list: b' ',
            host_service: b'/',
        };
        let mut w = ResultWriter::new(OutputFormat::BrokenCsv, custom);
        w.add_row(sample_cells());
        assert_eq!(w.finish(), "frontend:3:web01/HTTP web01/HTTPS:\n");
    }

    #[test]
    fn test_csv_quotes_fields() {
        let mut w = ResultWriter::new(OutputFormat::Csv, Separators::default());
        w.add_row(vec![
            ColumnValue::Text("a,b".into()),
            ColumnValue::Text("say \"hi\"".into()),
            ColumnValue::Int(1),
        ]);
        assert_eq!(w.finish(), "\"a,b\",\"say \"\"hi\"\"\",1\r\n");
    }

    #[test]
    fn test_json_rows_nest_lists() {
        let mut w = ResultWriter::new(OutputFormat::Json, Separators::default());
        w.add_row(sample_cells());
        let text = w.finish();
        let parsed: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([["frontend", 3, [["web01", "HTTP"], ["web01", "HTTPS"]], null]])
        );
    }

    #[test]
    fn test_json_plain_list_elements_stay_strings() {
        let mut w = ResultWriter::new(OutputFormat::Json, Separators::default());
        w.add_row(vec![ColumnValue::List(vec![
            vec!["alice".into()],
            vec!["bob".into()],
        ])]);
        let parsed: Value = serde_json::from_str(w.finish().trim_end()).unwrap();
        assert_eq!(parsed, serde_json::json!([[["alice", "bob"]]]));
    }

    #[test]
    fn test_python3_renders_none() {
        let mut w = ResultWriter::new(OutputFormat::Python3, Separators::default());
        w.add_row(vec![ColumnValue::Null, ColumnValue::Int(2)]);
        assert_eq!(w.finish(), "[[None, 2]]\n");
    }

    #[test]
    fn test_float_cells() {
        let mut w = ResultWriter::new(OutputFormat::Json, Separators::default());
        w.add_row(vec![ColumnValue::Float(2.5), ColumnValue::Float(f64::NAN)]);
        let parsed: Value = serde_json::from_str(w.finish().trim_end()).unwrap();
        assert_eq!(parsed, serde_json::json!([[2.5, null]]));
    }

    #[test]
    fn test_fixed16_framing() {
        let mut out = OutputBuffer::new();
        out.append("data;1\n");
        let wire = out.render_response(ResponseHeader::Fixed16);
        let text = String::from_utf8(wire).unwrap();
        let (header, payload) = text.split_at(16);
        assert_eq!(header, "200           7\n");
        assert_eq!(payload, "data;1\n");
    }

    #[test]
    fn test_error_replaces_payload() {
        let mut out = OutputBuffer::new();
        out.append("partial");
        out.set_error(ResponseCode::BadRequest, "bad header".into());
        out.set_error(ResponseCode::NotFound, "later error, ignored".into());
        let wire = out.render_response(ResponseHeader::Fixed16);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("400"));
        assert!(text.ends_with("bad header\n"));
    }

    #[test]
    fn test_no_framing_without_fixed16() {
        let mut out = OutputBuffer::new();
        out.append("x\n");
        assert_eq!(out.render_response(ResponseHeader::Off), b"x\n");
    }
}
