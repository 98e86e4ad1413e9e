//! MILP solver contract and the external lp_solve invocation.

use std::process::Command;

use log::warn;

use super::model::LpModel;
use crate::error::SolverError;

/// A MILP solver for [`LpModel`]s.
///
/// Returns one value per model column on an optimal solve. This is the
/// only blocking interface in the crate; everything else is bounded
/// simulation work.
pub trait Solver {
    fn solve(&mut self, model: &LpModel) -> Result<Vec<f64>, SolverError>;
}

/// Runs an external `lp_solve`-compatible executable on the serialised
/// model and parses the variable block from its output.
///
/// The expected output contract is lp_solve's:
///
/// ```text
/// Value of objective function: 123.45
///
/// Actual values of the variables:
/// C_0                       0.5
/// ...
/// ```
pub struct ExternalSolver {
    command: String,
    work_stem: String,
}

impl ExternalSolver {
    /// Uses the `lp_solve` executable from `PATH`.
    pub fn new() -> Self {
        Self::with_command("lp_solve")
    }

    /// Uses a specific solver executable.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            work_stem: std::env::temp_dir()
                .join("haulage_model")
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// Overrides where the scratch model file is written.
    pub fn with_work_stem(mut self, stem: impl Into<String>) -> Self {
        self.work_stem = stem.into();
        self
    }
}

impl Default for ExternalSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for ExternalSolver {
    fn solve(&mut self, model: &LpModel) -> Result<Vec<f64>, SolverError> {
        model.write_lp(&self.work_stem)?;
        let model_path = format!("{}.lp", self.work_stem);
        let output = Command::new(&self.command)
            .arg(&model_path)
            .output()
            .map_err(|source| SolverError::Launch {
                command: self.command.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            warn!("solver exited with {}", output.status);
            return Err(SolverError::NonOptimal(format!(
                "exit status {}: {}",
                output.status,
                stdout.lines().next().unwrap_or("")
            )));
        }
        parse_solution(model, &stdout)
    }
}

/// Extracts column values from lp_solve's textual report.
fn parse_solution(model: &LpModel, stdout: &str) -> Result<Vec<f64>, SolverError> {
    let mut values = vec![None; model.num_columns()];
    let mut in_variables = false;
    for line in stdout.lines() {
        if line.starts_with("Actual values of the variables") {
            in_variables = true;
            continue;
        }
        if !in_variables {
            if line.contains("infeasible") || line.contains("unbounded") {
                return Err(SolverError::NonOptimal(line.trim().to_owned()));
            }
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Some(column) = model.column_index(name) {
            let value: f64 = value.parse().map_err(|_| {
                SolverError::Output(format!("bad value '{value}' for column {name}"))
            })?;
            values[column] = Some(value);
        }
    }
    if !in_variables {
        return Err(SolverError::Output(
            "no variable block in solver output".into(),
        ));
    }
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| {
                SolverError::Output(format!("column {} missing from output", model.column_name(i)))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::RowOp;

    fn model() -> LpModel {
        let mut model = LpModel::new();
        let x = model.add_column("x");
        let y = model.add_column("y_long_name");
        model.set_objective(vec![(x, 1.0), (y, 1.0)]);
        model.add_row(vec![(x, 1.0), (y, 1.0)], RowOp::Le, 2.0);
        model
    }

    #[test]
    fn test_parse_solution() {
        let out = "\nValue of objective function: 2.00000000\n\n\
Actual values of the variables:\nx                               1.5\ny_long_name                     0.5\n";
        let values = parse_solution(&model(), out).unwrap();
        assert_eq!(values, vec![1.5, 0.5]);
    }

    #[test]
    fn test_parse_rejects_missing_column() {
        let out = "Actual values of the variables:\nx   1.0\n";
        assert!(parse_solution(&model(), out).is_err());
    }

    #[test]
    fn test_parse_rejects_infeasible_report() {
        let out = "This problem is infeasible\n";
        assert!(parse_solution(&model(), out).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage_value() {
        let out = "Actual values of the variables:\nx  abc\ny_long_name  0.5\n";
        assert!(parse_solution(&model(), out).is_err());
    }
}
