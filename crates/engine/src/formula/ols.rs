//! Ordinary least squares for the explosive `OLS(y, x1, x2, ...)` function.
//!
//! The regression is computed once when the formula is entered. Its output
//! is a block of plain value cells next to the formula cell:
//!
//! ```text
//!   (r, c)            (r, c+1)  (r, c+2)    (r, c+3)   (r, c+4)
//!   OLS Regression    y hat     residuals   beta 1     b0
//!                     ŷ1        e1          beta 2     b1
//!                     ŷ2        e2          ...
//! ```

use super::eval::Term;
use crate::cell::CellValue;
use crate::reference::CellId;

/// Pivot magnitude below which a matrix is treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Build from columns of equal length.
    pub fn from_columns(columns: &[Vec<f64>]) -> Self {
        let cols = columns.len();
        let rows = columns.first().map_or(0, Vec::len);
        let mut m = Self::zeros(rows, cols);
        for (c, column) in columns.iter().enumerate() {
            for (r, value) in column.iter().take(rows).enumerate() {
                m.set(r, c, *value);
            }
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t.set(c, r, self.get(r, c));
            }
        }
        t
    }

    /// Matrix product, `None` when the inner dimensions differ.
    pub fn mul(&self, other: &Matrix) -> Option<Matrix> {
        if self.cols != other.rows {
            return None;
        }
        let mut product = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                let dot = (0..self.cols).map(|k| self.get(r, k) * other.get(k, c)).sum();
                product.set(r, c, dot);
            }
        }
        Some(product)
    }

    /// Gauss-Jordan inverse with partial pivoting. `None` for non-square or
    /// singular matrices.
    pub fn inverse(&self) -> Option<Matrix> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Self::identity(n);

        for col in 0..n {
            let pivot = (col..n).max_by(|&x, &y| a.get(x, col).abs().total_cmp(&a.get(y, col).abs()))?;
            let magnitude = a.get(pivot, col).abs();
            if magnitude.is_nan() || magnitude <= SINGULAR_EPSILON {
                return None;
            }
            a.swap_rows(col, pivot);
            inv.swap_rows(col, pivot);

            let p = a.get(col, col);
            for c in 0..n {
                a.set(col, c, a.get(col, c) / p);
                inv.set(col, c, inv.get(col, c) / p);
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a.set(r, c, a.get(r, c) - factor * a.get(col, c));
                    inv.set(r, c, inv.get(r, c) - factor * inv.get(col, c));
                }
            }
        }
        Some(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

/// Result of one regression.
#[derive(Debug, Clone, PartialEq)]
pub struct Regression {
    /// Intercept first, then one coefficient per regressor.
    pub coefficients: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    /// XᵀX could not be inverted; every output is NaN.
    pub singular: bool,
}

impl Regression {
    /// Text shown in the formula cell.
    pub fn status(&self) -> &'static str {
        if self.singular {
            "OLS Regression: singular matrix"
        } else {
            "OLS Regression"
        }
    }
}

/// One output cell of an explosive formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
    pub cell: CellId,
    pub value: CellValue,
}

/// Regress `y` on the regressors, with an intercept.
///
/// All slices must have the same length.
pub fn ols(y: &[f64], regressors: &[Vec<f64>]) -> Regression {
    let n = y.len();
    let mut columns = Vec::with_capacity(regressors.len() + 1);
    columns.push(vec![1.0; n]);
    columns.extend(regressors.iter().cloned());

    let x = Matrix::from_columns(&columns);
    let y_col = Matrix::from_columns(&[y.to_vec()]);
    let xt = x.transpose();

    let beta = xt
        .mul(&x)
        .and_then(|xtx| xtx.inverse())
        .and_then(|xtx_inv| xt.mul(&y_col).and_then(|xty| xtx_inv.mul(&xty)));

    let Some(beta) = beta else {
        return Regression {
            coefficients: vec![f64::NAN; columns.len()],
            fitted: vec![f64::NAN; n],
            residuals: vec![f64::NAN; n],
            singular: true,
        };
    };

    let coefficients: Vec<f64> = (0..beta.rows()).map(|i| beta.get(i, 0)).collect();
    let fitted: Vec<f64> = (0..n)
        .map(|i| (0..x.cols()).map(|k| x.get(i, k) * coefficients[k]).sum())
        .collect();
    let residuals = y.iter().zip(&fitted).map(|(y, f)| y - f).collect();

    Regression { coefficients, fitted, residuals, singular: false }
}

/// Check evaluated `OLS` arguments and run the regression.
///
/// Errors are the messages shown in the formula cell.
pub fn regress(args: &[Term]) -> Result<Regression, String> {
    if args.len() < 2 {
        return Err("OLS requires a y range and at least one x range".to_string());
    }
    let mut series = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Term::Range(range) => series.push(range.values.iter().map(Term::to_number).collect::<Vec<f64>>()),
            _ => return Err("OLS arguments must be ranges".to_string()),
        }
    }
    let y = series.remove(0);
    if series.iter().any(|x| x.len() != y.len()) {
        return Err("OLS ranges must have equal length".to_string());
    }
    Ok(ols(&y, &series))
}

/// Cells written by a regression anchored at `origin`, skipping any that
/// fall outside the sheet's `(rows, cols)`.
pub fn explosion_cells(origin: CellId, regression: &Regression, (rows, cols): (usize, usize)) -> Vec<Explosion> {
    let (r, c) = (origin.row, origin.col);
    let mut cells = vec![
        (r, c + 1, CellValue::String("y hat".to_string())),
        (r, c + 2, CellValue::String("residuals".to_string())),
    ];
    for (i, (fitted, residual)) in regression.fitted.iter().zip(&regression.residuals).enumerate() {
        cells.push((r + i + 1, c + 1, CellValue::Number(*fitted)));
        cells.push((r + i + 1, c + 2, CellValue::Number(*residual)));
    }
    for (i, beta) in regression.coefficients.iter().enumerate() {
        cells.push((r + i, c + 3, CellValue::String(format!("beta {}", i + 1))));
        cells.push((r + i, c + 4, CellValue::Number(*beta)));
    }

    cells
        .into_iter()
        .filter(|(row, col, _)| *row <= rows && *col <= cols)
        .map(|(row, col, value)| Explosion { cell: CellId::new(origin.sheet, row, col), value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::eval::RangeTerm;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn column(values: &[f64]) -> Term {
        Term::Range(RangeTerm {
            height: values.len(),
            width: 1,
            values: values.iter().map(|&v| Term::Number(v)).collect(),
        })
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Matrix::from_columns(&[vec![4.0, 2.0], vec![7.0, 6.0]]);
        let inv = m.inverse().unwrap();
        let product = m.mul(&inv).unwrap();
        assert!(close(product.get(0, 0), 1.0));
        assert!(close(product.get(0, 1), 0.0));
        assert!(close(product.get(1, 0), 0.0));
        assert!(close(product.get(1, 1), 1.0));
    }

    #[test]
    fn test_inverse_singular() {
        let m = Matrix::from_columns(&[vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert_eq!(m.inverse(), None);
        assert_eq!(Matrix::zeros(2, 3).inverse(), None);
    }

    #[test]
    fn test_mul_dimension_mismatch() {
        assert_eq!(Matrix::zeros(2, 3).mul(&Matrix::zeros(2, 3)), None);
    }

    #[test]
    fn test_ols_exact_line() {
        // y = 1 + 2x
        let regression = ols(&[3.0, 5.0, 7.0, 9.0], &[vec![1.0, 2.0, 3.0, 4.0]]);
        assert!(!regression.singular);
        assert!(close(regression.coefficients[0], 1.0));
        assert!(close(regression.coefficients[1], 2.0));
        assert!(regression.residuals.iter().all(|r| close(*r, 0.0)));
        assert!(close(regression.fitted[2], 7.0));
    }

    #[test]
    fn test_ols_singular_is_nan() {
        let regression = ols(&[1.0, 2.0, 3.0], &[vec![1.0, 1.0, 1.0]]);
        assert!(regression.singular);
        assert!(regression.coefficients.iter().all(|b| b.is_nan()));
        assert_eq!(regression.status(), "OLS Regression: singular matrix");
    }

    #[test]
    fn test_regress_argument_errors() {
        assert_eq!(
            regress(&[column(&[1.0])]),
            Err("OLS requires a y range and at least one x range".to_string())
        );
        assert_eq!(
            regress(&[column(&[1.0, 2.0]), column(&[1.0])]),
            Err("OLS ranges must have equal length".to_string())
        );
        assert_eq!(
            regress(&[column(&[1.0, 2.0]), Term::Number(1.0)]),
            Err("OLS arguments must be ranges".to_string())
        );
    }

    #[test]
    fn test_explosion_layout() {
        let regression = ols(&[3.0, 5.0, 7.0], &[vec![1.0, 2.0, 3.0]]);
        let origin = CellId::new(0, 1, 1);
        let cells = explosion_cells(origin, &regression, (100, 15));

        let at = |row, col| cells.iter().find(|e| e.cell == CellId::new(0, row, col)).map(|e| &e.value);
        assert_eq!(at(1, 2), Some(&CellValue::String("y hat".into())));
        assert_eq!(at(1, 3), Some(&CellValue::String("residuals".into())));
        assert_eq!(at(1, 4), Some(&CellValue::String("beta 1".into())));
        assert_eq!(at(2, 4), Some(&CellValue::String("beta 2".into())));
        assert!(matches!(at(2, 5), Some(CellValue::Number(b)) if close(*b, 2.0)));
        assert!(matches!(at(4, 2), Some(CellValue::Number(f)) if close(*f, 7.0)));
        // 2 labels + 3 fitted + 3 residuals + 2 beta labels + 2 betas
        assert_eq!(cells.len(), 12);
    }

    #[test]
    fn test_explosion_skips_out_of_bounds() {
        let regression = ols(&[3.0, 5.0, 7.0], &[vec![1.0, 2.0, 3.0]]);
        let cells = explosion_cells(CellId::new(0, 1, 13), &regression, (3, 15));
        assert!(cells.iter().all(|e| e.cell.row <= 3 && e.cell.col <= 15));
        // y hat and residuals columns survive, the beta columns do not.
        assert_eq!(cells.len(), 6);
    }
}
