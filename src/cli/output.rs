use std::fmt::Display;
use std::io;

use anyhow::Result;

use crate::bridge::BridgeEvent;

use super::command::OutputFormat;
use super::ui::{EventView, Painter};

/// Writes forwarded events, and pretty-mode summaries, to the command output.
pub(crate) struct EventPrinter<'w, W> {
    out: &'w mut W,
    format: OutputFormat,
    painter: Painter,
    printed: usize,
}

impl<'w, W> EventPrinter<'w, W>
where
    W: io::Write,
{
    pub(crate) fn new(out: &'w mut W, format: OutputFormat, use_colour: bool) -> Self {
        Self {
            out,
            format,
            painter: Painter::new(use_colour && format == OutputFormat::Pretty),
            printed: 0,
        }
    }

    pub(crate) fn painter(&self) -> &Painter {
        &self.painter
    }

    /// Writes one event as a JSON line or a pretty line.
    pub(crate) fn event(&mut self, event: &BridgeEvent) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *self.out, event)?;
                writeln!(self.out)?;
            }
            OutputFormat::Pretty => {
                let view = EventView::new(self.printed, event, &self.painter);
                writeln!(self.out, "{view}")?;
            }
        }
        self.printed += 1;
        Ok(())
    }

    /// Writes a summary block; JSON output carries only events.
    pub(crate) fn summary(&mut self, view: impl Display) -> Result<()> {
        if self.format == OutputFormat::Pretty {
            writeln!(self.out)?;
            writeln!(self.out, "{view}")?;
        }
        Ok(())
    }

    pub(crate) fn printed(&self) -> usize {
        self.printed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn json_output_is_one_object_per_line() {
        let mut out = Vec::new();
        let mut printer = EventPrinter::new(&mut out, OutputFormat::Json, true);
        printer.event(&BridgeEvent::BlePowerOn).expect("write to vec");
        printer.event(&BridgeEvent::BlePowerOff).expect("write to vec");
        printer.summary("ignored").expect("write to vec");
        assert_eq!(2, printer.printed());

        let text = String::from_utf8(out).expect("utf-8 output");
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is JSON"))
            .collect();
        assert_eq!(
            vec![
                json!({"event": "BLE_POWER_ON", "payload": null}),
                json!({"event": "BLE_POWER_OFF", "payload": null}),
            ],
            lines
        );
    }

    #[test]
    fn pretty_output_numbers_events_and_appends_summaries() {
        let mut out = Vec::new();
        let mut printer = EventPrinter::new(&mut out, OutputFormat::Pretty, false);
        printer.event(&BridgeEvent::BlePowerOn).expect("write to vec");
        printer.summary("done").expect("write to vec");

        assert_eq!(
            "[0000] BLE_POWER_ON\n\ndone\n",
            String::from_utf8(out).expect("utf-8 output")
        );
    }
}
