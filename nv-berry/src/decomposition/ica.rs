//! FastICA 及成分的术语标注.
//!
//! 输入矩阵的每一行是一张图 (特征), 每一列是一个体素 (样本), 因此分解得到的
//! 是空间上相互独立的成分图.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use super::pca::eigh;
use super::stats::{percentile, top_k};
use crate::{NvError, NvResult};

/// FastICA 参数. 使用 `logcosh` 非线性和并行 (对称) 更新.
#[derive(Debug, Clone, Copy)]
pub struct FastIca {
    /// 成分个数.
    pub n_components: usize,

    /// 随机种子.
    pub seed: u64,

    /// 收敛容差.
    pub tol: f64,

    /// 最大迭代次数.
    pub max_iter: usize,
}

impl Default for FastIca {
    fn default() -> Self {
        Self {
            n_components: 20,
            seed: 42,
            tol: 1e-4,
            max_iter: 200,
        }
    }
}

/// FastICA 拟合结果.
#[derive(Debug, Clone)]
pub struct IcaFit {
    /// 成分图, `k x n_samples`.
    pub sources: Array2<f64>,

    /// 解混矩阵与白化矩阵之积, `k x n_features`.
    pub components: Array2<f64>,

    /// 实际迭代次数.
    pub n_iter: usize,
}

impl FastIca {
    /// 以 `n_components` 个成分创建, 其余参数取默认值.
    pub fn new(n_components: usize) -> Self {
        assert!(n_components > 0, "成分个数不能为 0");
        Self {
            n_components,
            ..Default::default()
        }
    }

    /// 拟合 `x` (`n_features x n_samples`).
    pub fn fit(&self, x: ArrayView2<f64>) -> NvResult<IcaFit> {
        let (n_features, n_samples) = x.dim();
        if n_features == 0 || n_samples < 2 {
            return Err(NvError::Empty("ICA input"));
        }
        let k = self.n_components.min(n_features);
        if k < self.n_components {
            log::warn!("only {n_features} features, using {k} components");
        }

        // 按特征去均值.
        let mean = x.mean_axis(Axis(1)).ok_or(NvError::Empty("ICA input"))?;
        let xc = &x - &mean.insert_axis(Axis(1));

        // PCA 白化.
        let (d, u) = eigh(xc.dot(&xc.t()).view());
        let mut whitening = Array2::<f64>::zeros((k, n_features));
        for i in 0..k {
            let di = d[i].max(f64::EPSILON).sqrt();
            whitening.row_mut(i).assign(&(&u.column(i) / di));
        }
        let x1 = whitening.dot(&xc) * (n_samples as f64).sqrt();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let w_init = Array2::from_shape_simple_fn((k, k), || StandardNormal.sample(&mut rng));
        let (w, n_iter) = self.parallel(x1.view(), w_init.view());

        let components = w.dot(&whitening);
        let sources = components.dot(&xc);
        Ok(IcaFit {
            sources,
            components,
            n_iter,
        })
    }

    /// 对称 FastICA 迭代. 返回解混矩阵与迭代次数.
    fn parallel(&self, x1: ArrayView2<f64>, w_init: ArrayView2<f64>) -> (Array2<f64>, usize) {
        let p = x1.ncols() as f64;
        let mut w = sym_decorrelation(w_init);
        for it in 1..=self.max_iter {
            let gwx = w.dot(&x1).mapv(f64::tanh);
            let g_wx = gwx
                .mapv(|t| 1.0 - t * t)
                .mean_axis(Axis(1))
                .unwrap_or_else(|| Array1::zeros(w.nrows()));
            let w1 = gwx.dot(&x1.t()) / p - &(&w * &g_wx.insert_axis(Axis(1)));
            let w1 = sym_decorrelation(w1.view());

            let lim = w1
                .dot(&w.t())
                .diag()
                .iter()
                .map(|d| (d.abs() - 1.0).abs())
                .fold(0.0, f64::max);
            w = w1;
            if lim < self.tol {
                log::debug!("FastICA converged after {it} iterations");
                return (w, it);
            }
        }
        log::warn!(
            "FastICA did not converge in {} iterations, consider raising the tolerance",
            self.max_iter
        );
        (w, self.max_iter)
    }
}

/// 对称正交化: `W <- (W W^T)^{-1/2} W`.
fn sym_decorrelation(w: ArrayView2<f64>) -> Array2<f64> {
    let (d, e) = eigh(w.dot(&w.t()).view());
    let inv_sqrt = d.mapv(|x| 1.0 / x.max(f64::MIN_POSITIVE).sqrt());
    let scaled = &e * &inv_sqrt.insert_axis(Axis(0));
    scaled.dot(&e.t()).dot(&w)
}

/// 标注后的 ICA 成分.
#[derive(Debug, Clone)]
pub struct LabelledComponent {
    /// 成分图 (已按需翻转符号).
    pub map: Array1<f64>,

    /// `|map|` 的 90% 分位数, 用作显示阈值.
    pub threshold: f64,

    /// 权重最大的术语, 按权重降序.
    pub terms: Vec<String>,
}

impl LabelledComponent {
    /// 以逗号连接的术语, 用作图标题.
    pub fn title(&self) -> String {
        self.terms.join(", ")
    }
}

/// 每个成分报告的术语个数.
pub const N_TERMS_PER_COMPONENT: usize = 4;

/// 用解码术语标注 ICA 成分.
///
/// `term_matrix` 为 `n_features x n_terms`, `term_names` 为其列名.
/// 术语权重为 `components . term_matrix`. 若成分图的负向峰值大于正向峰值,
/// 成分图与术语权重一起取反.
pub fn label_components(
    fit: &IcaFit,
    term_matrix: ArrayView2<f64>,
    term_names: &[String],
) -> NvResult<Vec<LabelledComponent>> {
    if term_matrix.nrows() != fit.components.ncols() || term_matrix.ncols() != term_names.len() {
        return Err(NvError::ShapeMismatch {
            expected: vec![fit.components.ncols(), term_names.len()],
            found: term_matrix.shape().to_vec(),
        });
    }
    let ica_terms = fit.components.dot(&term_matrix);

    let labelled = fit
        .sources
        .outer_iter()
        .zip(ica_terms.outer_iter())
        .map(|(ic, weights)| {
            let (lo, hi) = ic
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let (map, weights): (Array1<f64>, Vec<f64>) = if -lo > hi {
                (ic.mapv(|v| -v), weights.iter().map(|v| -v).collect())
            } else {
                (ic.to_owned(), weights.to_vec())
            };
            let abs: Vec<f64> = map.iter().map(|v| v.abs()).collect();
            let threshold = percentile(&abs, 90.0).unwrap_or(0.0);
            let terms = top_k(&weights, N_TERMS_PER_COMPONENT)
                .into_iter()
                .map(|j| term_names[j].clone())
                .collect();
            LabelledComponent {
                map,
                threshold,
                terms,
            }
        })
        .collect();
    Ok(labelled)
}

/// 取 `fit` 的前 `k` 个成分 (用于限制作图数量).
pub fn truncate(fit: &IcaFit, k: usize) -> IcaFit {
    let k = k.min(fit.sources.nrows());
    IcaFit {
        sources: fit.sources.slice(s![..k, ..]).to_owned(),
        components: fit.components.slice(s![..k, ..]).to_owned(),
        n_iter: fit.n_iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn correlation(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
        let (ma, mb) = (a.mean().unwrap(), b.mean().unwrap());
        let a = a.mapv(|v| v - ma);
        let b = b.mapv(|v| v - mb);
        a.dot(&b) / (a.dot(&a).sqrt() * b.dot(&b).sqrt())
    }

    fn sources() -> Array2<f64> {
        let n = 2000;
        let mut s = Array2::zeros((2, n));
        for i in 0..n {
            let t = i as f64 * 0.01;
            s[(0, i)] = (3.0 * t).sin().signum();
            s[(1, i)] = 2.0 * (0.7 * t).fract() - 1.0;
        }
        s
    }

    #[test]
    fn test_fast_ica_recovers_sources() {
        let s = sources();
        let mixing = array![[1.0, 0.5], [0.4, 1.2], [0.8, -0.6]];
        let x = mixing.dot(&s);

        let fit = FastIca::new(2).fit(x.view()).unwrap();
        assert_eq!(fit.sources.dim(), (2, 2000));
        assert_eq!(fit.components.dim(), (2, 3));
        for truth in s.outer_iter() {
            let best = fit
                .sources
                .outer_iter()
                .map(|r| correlation(r, truth).abs())
                .fold(0.0, f64::max);
            assert!(best > 0.95, "best correlation {best}");
        }
    }

    #[test]
    fn test_component_count_is_clamped() {
        let x = sources();
        let fit = FastIca::default().fit(x.view()).unwrap();
        assert_eq!(fit.sources.nrows(), 2);
        assert!(FastIca::default().fit(Array2::zeros((0, 5)).view()).is_err());
    }

    #[test]
    fn test_label_components() {
        let fit = IcaFit {
            sources: array![
                [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0],
                [-5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            ],
            components: array![[1.0, 0.0], [0.0, -1.0]],
            n_iter: 1,
        };
        let names: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let terms = array![[0.5, 0.1, 0.4, 0.0, 0.3], [0.2, 0.9, 0.0, 0.1, 0.0]];

        let labelled = label_components(&fit, terms.view(), &names).unwrap();
        assert_eq!(labelled[0].terms, vec!["a", "c", "e", "b"]);
        assert!((labelled[0].threshold - 0.91).abs() < 1e-12);

        // 第二个成分被翻转, 术语权重随之翻转.
        assert_eq!(labelled[1].map[0], 5.0);
        assert_eq!(labelled[1].terms[0], "b");
        assert_eq!(labelled[1].title(), "b, a, d, c");

        assert!(label_components(&fit, terms.t(), &names).is_err());
        assert_eq!(truncate(&fit, 1).sources.nrows(), 1);
    }

    #[test]
    fn test_sym_decorrelation_is_orthonormal() {
        let w = array![[1.0, 0.5, 0.2], [0.3, 2.0, -0.4], [0.0, 0.7, 1.5]];
        let u = sym_decorrelation(w.view());
        let uut = u.dot(&u.t());
        for ((i, j), v) in uut.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-9, "{uut:?}");
        }
    }
}
