//! 主成分分析.
//!
//! 样本数远小于特征数 (几百张图 vs. 十几万体素), 因此分解 `n x n` 的
//! Gram 矩阵 `Xc Xc^T` 而不是协方差矩阵.

use std::cmp::Reverse;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use ordered_float::OrderedFloat;

use crate::{NvError, NvResult};

/// 实对称矩阵的特征分解.
///
/// 返回 `(values, vectors)`: 特征值降序, `vectors` 的第 `i` 列对应 `values[i]`.
pub(crate) fn eigh(a: ArrayView2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "特征分解需要方阵");
    let m = DMatrix::from_fn(n, n, |i, j| a[(i, j)]);
    let SymmetricEigen {
        eigenvalues,
        eigenvectors,
    } = m.symmetric_eigen();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| Reverse(OrderedFloat(eigenvalues[i])));
    let values = order.iter().map(|&i| eigenvalues[i]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(r, c)| eigenvectors[(r, order[c])]);
    (values, vectors)
}

/// PCA 参数.
#[derive(Debug, Clone, Copy)]
pub struct Pca {
    n_components: usize,
}

/// PCA 拟合结果.
#[derive(Debug, Clone)]
pub struct PcaFit {
    /// 投影坐标, `n_samples x k`.
    pub scores: Array2<f64>,

    /// 主轴, `k x n_features`, 每行为单位向量.
    pub components: Array2<f64>,

    /// 每个成分解释的方差 (无偏估计), 降序.
    pub explained_variance: Array1<f64>,

    /// 各特征的均值.
    pub mean: Array1<f64>,
}

impl Pca {
    /// 保留 `n_components` 个成分. `n_components` 为 0 时程序 panic.
    pub fn new(n_components: usize) -> Self {
        assert!(n_components > 0, "成分个数不能为 0");
        Self { n_components }
    }

    /// 拟合并返回投影. 实际成分数不超过 `min(n_samples, n_features)`.
    pub fn fit(&self, x: ArrayView2<f64>) -> NvResult<PcaFit> {
        let (n, p) = x.dim();
        if n < 2 || p == 0 {
            return Err(NvError::Empty("PCA input"));
        }
        let k = self.n_components.min(n).min(p);

        let mean = x.mean_axis(Axis(0)).ok_or(NvError::Empty("PCA input"))?;
        let xc = &x - &mean.view().insert_axis(Axis(0));
        let gram = xc.dot(&xc.t());
        let (values, vectors) = eigh(gram.view());

        let mut scores = Array2::<f64>::zeros((n, k));
        let mut components = Array2::<f64>::zeros((k, p));
        for i in 0..k {
            let lambda = values[i].max(0.0);
            let mut u = vectors.column(i).to_owned();
            // 固定符号: 绝对值最大的分量取正.
            let pivot = u.iter().fold(0.0f64, |m, &v| if v.abs() > m.abs() { v } else { m });
            if pivot < 0.0 {
                u.mapv_inplace(|v| -v);
            }
            let sigma = lambda.sqrt();
            scores.column_mut(i).assign(&(&u * sigma));
            if sigma > 0.0 {
                components.row_mut(i).assign(&(xc.t().dot(&u) / sigma));
            }
        }
        let explained_variance = values.slice(s![..k]).mapv(|l| l.max(0.0) / (n - 1) as f64);
        log::debug!("PCA explained variance: {explained_variance}");

        Ok(PcaFit {
            scores,
            components,
            explained_variance,
            mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pca_scores_are_ordered_and_uncorrelated() {
        // 主要沿 (1, 1, 0) 方向分布, 次要沿 (1, -1, 0), 第三维为常数.
        let x = array![
            [3.0, 3.0, 1.0],
            [-3.0, -3.0, 1.0],
            [1.0, -1.0, 1.0],
            [-1.0, 1.0, 1.0],
            [2.0, 2.5, 1.0],
            [-2.0, -2.5, 1.0],
        ];
        let fit = Pca::new(3).fit(x.view()).unwrap();
        assert_eq!(fit.scores.dim(), (6, 3));
        let ev = &fit.explained_variance;
        assert!(ev[0] > ev[1] && ev[1] >= ev[2]);
        assert!(ev[2].abs() < 1e-9);

        // 成分间不相关.
        let c01: f64 = fit.scores.column(0).dot(&fit.scores.column(1));
        assert!(c01.abs() < 1e-9);

        // 第一主轴接近 (1, 1, 0) / sqrt(2).
        let axis = fit.components.row(0);
        assert!((axis[0].abs() - axis[1].abs()).abs() < 0.1);
        assert!(axis[2].abs() < 1e-9);
        assert!((axis.dot(&axis) - 1.0).abs() < 1e-9);

        assert_eq!(fit.mean[2], 1.0);
    }

    #[test]
    fn test_pca_clamps_components() {
        let x = array![[1.0, 2.0], [3.0, 5.0], [0.0, 1.0]];
        let fit = Pca::new(5).fit(x.view()).unwrap();
        assert_eq!(fit.scores.ncols(), 2);
        assert!(Pca::new(1).fit(array![[1.0, 2.0]].view()).is_err());
    }

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_eigh_2x2() {
        let (d, v) = eigh(array![[2.0, 1.0], [1.0, 2.0]].view());
        assert!((d[0] - 3.0).abs() < 1e-12);
        assert!((d[1] - 1.0).abs() < 1e-12);
        let r = 0.5f64.sqrt();
        assert!((v[(0, 0)].abs() - r).abs() < 1e-12);
        assert!((v[(0, 0)] * v[(1, 0)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_eigh_reconstruction() {
        let b = array![
            [4.0, 1.0, -2.0, 0.5, 0.0],
            [1.0, 3.0, 0.0, 1.5, -1.0],
            [-2.0, 0.0, 5.0, 0.0, 2.0],
            [0.5, 1.5, 0.0, 1.0, 0.3],
            [0.0, -1.0, 2.0, 0.3, 2.0],
        ];
        let (d, v) = eigh(b.view());
        assert!(d.windows(2).into_iter().all(|w| w[0] >= w[1]));
        let back = (&v * &d.view().insert_axis(Axis(0))).dot(&v.t());
        assert_close(&back, &b, 1e-9);
        assert_close(&v.t().dot(&v), &Array2::eye(5), 1e-9);
    }

    #[test]
    fn test_eigh_sorts_diagonal_input() {
        let (d, v) = eigh(array![[1.0, 0.0], [0.0, 7.0]].view());
        assert!((d[0] - 7.0).abs() < 1e-12 && (d[1] - 1.0).abs() < 1e-12);
        assert_close(&v.mapv(f64::abs), &array![[0.0, 1.0], [1.0, 0.0]], 1e-12);
    }
}
