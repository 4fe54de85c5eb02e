use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::{FeatureMatrix, Model};

/// A linear regression artifact:
///
/// ```json
/// {
///   "columns": ["feature_1", "...", "hour_of_day", "day_of_week", "location_id"],
///   "intercept": 0.4,
///   "coefficients": [0.01, "...", 0.0]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub columns: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let model: LinearModel =
            serde_json::from_slice(bytes).context("parsing linear model artifact")?;
        if model.columns.len() != model.coefficients.len() {
            bail!(
                "linear model has {} columns but {} coefficients",
                model.columns.len(),
                model.coefficients.len()
            );
        }
        Ok(model)
    }
}

impl Model for LinearModel {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        if matrix.columns != self.columns {
            bail!(
                "input columns {:?} do not match model columns {:?}",
                matrix.columns,
                self.columns
            );
        }

        Ok(matrix
            .rows
            .iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(x, w)| x * w)
                        .sum::<f64>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::model_columns;

    fn model(window_size: usize) -> LinearModel {
        let columns = model_columns(window_size);
        let mut coefficients = vec![0.0; columns.len()];
        // Weight only the most recent hour.
        coefficients[window_size - 1] = 2.0;
        LinearModel {
            columns,
            intercept: 1.0,
            coefficients,
        }
    }

    #[test]
    fn test_predict() {
        let matrix = FeatureMatrix {
            columns: model_columns(2),
            rows: vec![
                vec![5.0, 3.0, 8.0, 1.0, 72.0],
                vec![0.0, 0.0, 0.0, 0.0, 1.0],
            ],
        };
        assert_eq!(model(2).predict(&matrix).unwrap(), vec![7.0, 1.0]);
    }

    #[test]
    fn test_predict_rejects_reordered_columns() {
        let mut columns = model_columns(2);
        columns.swap(2, 3);
        let matrix = FeatureMatrix {
            columns,
            rows: vec![vec![0.0; 5]],
        };
        assert!(model(2).predict(&matrix).is_err());
    }

    #[test]
    fn test_from_json_checks_lengths() {
        let json = serde_json::to_vec(&model(3)).unwrap();
        assert_eq!(LinearModel::from_json(&json).unwrap(), model(3));

        let bad = br#"{"columns": ["a", "b"], "intercept": 0.0, "coefficients": [1.0]}"#;
        assert!(LinearModel::from_json(bad).is_err());
    }
}
