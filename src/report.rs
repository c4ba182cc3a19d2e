use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets};

/// Per-iteration diagnostics handed to a Reporter.
///
/// Purely observational; nothing downstream of a reporter may alter the solve.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: usize,
    /// `||A x - y||` at the accepted iterate.
    pub residual_norm: f64,
    /// Objective value at the accepted iterate (smooth term plus penalties).
    pub objective: f64,
    pub abs_obj: f64,
    pub rel_obj: f64,
    pub abs_x: f64,
    pub rel_x: f64,
    /// Step size after backtracking.
    pub step_size: f64,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

/// Observer invoked once per iteration with the stopping statistics.
pub trait Reporter {
    fn on_iteration(&mut self, record: &IterationRecord);
    fn on_finish(&mut self) {}
}

/// Default reporter: buffers records and renders one table on finish.
pub struct StdoutReporter {
    rows: Vec<IterationRecord>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, record: &IterationRecord) {
        self.rows.push(record.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("||Ax-y||").set_alignment(CellAlignment::Right),
            Cell::new("objective").set_alignment(CellAlignment::Right),
            Cell::new("abs obj").set_alignment(CellAlignment::Right),
            Cell::new("rel obj").set_alignment(CellAlignment::Right),
            Cell::new("abs x").set_alignment(CellAlignment::Right),
            Cell::new("rel x").set_alignment(CellAlignment::Right),
            Cell::new("step").set_alignment(CellAlignment::Right),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.7e}", row.residual_norm)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.7e}", row.objective)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.abs_obj)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.rel_obj)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.abs_x)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.rel_x)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.step_size)).set_alignment(CellAlignment::Right),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        self.rows.clear();
    }
}
