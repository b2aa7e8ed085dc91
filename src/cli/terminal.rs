use std::io::Write;

use ansi_term::{ANSIString, ANSIStrings, Colour, Style};
use tracing::warn;

use crate::{
    view::{
        state::{RollupRow, Rollups},
        Presenter,
    },
    viewport::layout::TimelineFrame,
};

/// What a [TerminalPresenter] prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Websites and Apps tables, reprinted whenever a value changes.
    Table,
    /// The colored timeline, reprinted whenever a cell changes.
    Graph,
}

/// Prints the view into a terminal. The timeline is rasterized into `columns` cells, each cell
/// taking the fill color of the bar covering its middle.
pub struct TerminalPresenter<W: Write> {
    out: W,
    output: Output,
    columns: usize,
    colors: bool,
    last_timeline: Option<String>,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, output: Output, columns: usize, colors: bool) -> Self {
        Self {
            out,
            output,
            columns: columns.max(1),
            colors,
            last_timeline: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_rollups(&mut self, rollups: &Rollups) -> std::io::Result<()> {
        match &rollups.current {
            Some(current) => writeln!(self.out, "You are currently on: {current}")?,
            None => writeln!(self.out, "Waiting for activity")?,
        }
        if rollups.stale {
            writeln!(self.out, "(disconnected, showing last known data)")?;
        }
        write_table(&mut self.out, "Websites", &rollups.sites)?;
        write_table(&mut self.out, "Apps", &rollups.apps)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn rasterize(&self, frame: &TimelineFrame) -> String {
        let cell_width = frame.width / self.columns as f64;
        let mut cells: Vec<ANSIString<'static>> = Vec::with_capacity(self.columns);
        for cell in 0..self.columns {
            let middle = (cell as f64 + 0.5) * cell_width;
            // Later bars are drawn over earlier ones.
            let bar = frame
                .bars
                .iter()
                .rev()
                .find(|v| v.x <= middle && middle < v.x + v.width);
            let tick = frame
                .ticks
                .iter()
                .any(|v| (v.x - middle).abs() <= cell_width / 2.);
            let symbol = if tick { "|" } else { " " };
            let cell = match bar {
                Some(bar) if self.colors => {
                    let (r, g, b) = bar.fill.to_rgb();
                    let (br, bg, bb) = bar.border.to_rgb();
                    Style::new()
                        .on(Colour::RGB(r, g, b))
                        .fg(Colour::RGB(br, bg, bb))
                        .paint(if tick { "|" } else { "█" })
                }
                Some(_) => Style::default().paint(if tick { "|" } else { "#" }),
                None => Style::default().paint(symbol),
            };
            cells.push(cell);
        }
        ANSIStrings(&cells).to_string()
    }

    fn write_timeline(&mut self, line: &str, frame: &TimelineFrame) -> std::io::Result<()> {
        let labels = frame
            .ticks
            .iter()
            .filter(|v| 0. <= v.x && v.x < frame.width)
            .map(|v| v.label.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{line}")?;
        writeln!(self.out, "{labels}")?;
        self.out.flush()
    }
}

fn write_table(out: &mut impl Write, title: &str, rows: &[RollupRow]) -> std::io::Result<()> {
    writeln!(out, "{title}")?;
    if rows.is_empty() {
        writeln!(out, "\t-")?;
    }
    for row in rows {
        writeln!(out, "\t{}\t{}", row.duration, row.key)?;
    }
    Ok(())
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn shows_timeline(&self) -> bool {
        self.output == Output::Graph
    }

    fn present_rollups(&mut self, rollups: &Rollups) {
        if self.output != Output::Table {
            return;
        }
        if let Err(e) = self.write_rollups(rollups) {
            warn!("Failed to print rollups {e}");
        }
    }

    fn present_timeline(&mut self, frame: &TimelineFrame) {
        let line = self.rasterize(frame);
        if self.last_timeline.as_ref() == Some(&line) {
            return;
        }
        if let Err(e) = self.write_timeline(&line, frame) {
            warn!("Failed to print timeline {e}");
        }
        self.last_timeline = Some(line);
    }
}
