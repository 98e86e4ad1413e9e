//! In-memory LP model and its textual serialisation.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::SolverError;

/// Relational operator of a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOp {
    Le,
    Eq,
    Ge,
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    binary: bool,
}

#[derive(Debug, Clone)]
struct Row {
    coeffs: Vec<(usize, f64)>,
    op: RowOp,
    rhs: f64,
}

/// A linear program with named columns, maximisation objective and
/// sparse constraint rows.
///
/// Columns are continuous and nonnegative unless marked binary. The
/// model serialises to the lp_solve LP format, which is also what the
/// external solver consumes.
#[derive(Debug, Clone, Default)]
pub struct LpModel {
    columns: Vec<Column>,
    objective: Vec<(usize, f64)>,
    rows: Vec<Row>,
}

impl LpModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a continuous nonnegative column, returning its index.
    pub fn add_column(&mut self, name: impl Into<String>) -> usize {
        self.columns.push(Column {
            name: name.into(),
            binary: false,
        });
        self.columns.len() - 1
    }

    /// Marks an existing column binary.
    pub fn set_binary(&mut self, column: usize) {
        self.columns[column].binary = true;
    }

    /// Sets the maximisation objective from (column, coefficient) pairs.
    pub fn set_objective(&mut self, coeffs: Vec<(usize, f64)>) {
        self.objective = coeffs;
    }

    /// Adds a constraint row. Zero coefficients are dropped, so a padded
    /// coefficient list behaves like its populated prefix.
    pub fn add_row(&mut self, coeffs: Vec<(usize, f64)>, op: RowOp, rhs: f64) {
        let coeffs = coeffs.into_iter().filter(|&(_, c)| c != 0.0).collect();
        self.rows.push(Row { coeffs, op, rhs });
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of constraint rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Name of a column.
    pub fn column_name(&self, column: usize) -> &str {
        &self.columns[column].name
    }

    /// Looks a column up by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Evaluates one row's left-hand side against a candidate solution.
    pub fn row_value(&self, row: usize, values: &[f64]) -> f64 {
        self.rows[row]
            .coeffs
            .iter()
            .map(|&(col, coeff)| coeff * values[col])
            .sum()
    }

    /// Whether a candidate solution satisfies every constraint row within
    /// `tol`.
    pub fn is_feasible(&self, values: &[f64], tol: f64) -> bool {
        self.rows.iter().enumerate().all(|(i, row)| {
            let lhs = self.row_value(i, values);
            match row.op {
                RowOp::Le => lhs <= row.rhs + tol,
                RowOp::Eq => (lhs - row.rhs).abs() <= tol,
                RowOp::Ge => lhs >= row.rhs - tol,
            }
        })
    }

    /// Renders the model in the lp_solve LP format.
    pub fn to_lp_format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "/* haulage flow model */");
        let _ = write!(out, "max:");
        for &(col, coeff) in &self.objective {
            let _ = write!(out, " {}", term(coeff, &self.columns[col].name));
        }
        let _ = writeln!(out, ";");
        let _ = writeln!(out);
        for (i, row) in self.rows.iter().enumerate() {
            let _ = write!(out, "r{}:", i + 1);
            for &(col, coeff) in &row.coeffs {
                let _ = write!(out, " {}", term(coeff, &self.columns[col].name));
            }
            let op = match row.op {
                RowOp::Le => "<=",
                RowOp::Eq => "=",
                RowOp::Ge => ">=",
            };
            let _ = writeln!(out, " {op} {};", row.rhs);
        }
        let binaries: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.binary)
            .map(|c| c.name.as_str())
            .collect();
        if !binaries.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "bin {};", binaries.join(", "));
        }
        out
    }

    /// Persists the model next to the given path stem as `<stem>.lp`.
    pub fn write_lp(&self, stem: &str) -> Result<(), SolverError> {
        let path = format!("{stem}.lp");
        std::fs::write(Path::new(&path), self.to_lp_format()).map_err(|source| {
            SolverError::Persist { path, source }
        })
    }
}

fn term(coeff: f64, name: &str) -> String {
    if coeff >= 0.0 {
        format!("+{coeff} {name}")
    } else {
        format!("{coeff} {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_model() -> LpModel {
        let mut model = LpModel::new();
        let x = model.add_column("x");
        let y = model.add_column("y");
        model.set_objective(vec![(x, 3.0), (y, 2.0)]);
        model.add_row(vec![(x, 1.0), (y, 1.0)], RowOp::Le, 4.0);
        model.add_row(vec![(x, 1.0), (y, -1.0)], RowOp::Eq, 0.0);
        model
    }

    #[test]
    fn test_column_lookup() {
        let model = small_model();
        assert_eq!(model.column_index("y"), Some(1));
        assert_eq!(model.column_index("z"), None);
        assert_eq!(model.column_name(0), "x");
    }

    #[test]
    fn test_feasibility_check() {
        let model = small_model();
        assert!(model.is_feasible(&[2.0, 2.0], 1e-9));
        assert!(!model.is_feasible(&[3.0, 2.0], 1e-9));
        assert!(!model.is_feasible(&[1.0, 2.0], 1e-9));
    }

    #[test]
    fn test_zero_coefficients_dropped() {
        let mut model = LpModel::new();
        let x = model.add_column("x");
        let y = model.add_column("y");
        model.add_row(vec![(x, 1.0), (y, 0.0)], RowOp::Le, 1.0);
        // y's coefficient vanished: any y value is feasible.
        assert!(model.is_feasible(&[1.0, 1e12], 1e-9));
    }

    #[test]
    fn test_lp_format_shape() {
        let mut model = small_model();
        let b = model.add_column("d_0");
        model.set_binary(b);
        let text = model.to_lp_format();
        assert!(text.contains("max: +3 x +2 y;"));
        assert!(text.contains("r1: +1 x +1 y <= 4;"));
        assert!(text.contains("r2: +1 x -1 y = 0;"));
        assert!(text.contains("bin d_0;"));
    }
}
