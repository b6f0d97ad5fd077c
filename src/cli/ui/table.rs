use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::Style;

use super::painter::Painter;

/// A rounded table rendered through `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    builder: Builder,
}

impl Table {
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        let mut builder = Builder::default();
        builder.push_record(headers.into_iter().map(Into::<String>::into));
        for row in rows {
            builder.push_record(row);
        }
        Self { builder }
    }

    /// Two columns with the field names muted.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let rows = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["field", "value"], rows)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = self.builder.clone().build();
        table.with(Style::rounded());
        write!(f, "{table}")
    }
}
