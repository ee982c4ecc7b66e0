//! 精确梯度的 t-SNE.
//!
//! 样本数只有几百, 不需要 Barnes-Hut 近似.

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::{NvError, NvResult};

const MACHINE_EPSILON: f64 = f64::EPSILON;

/// 困惑度二分搜索的最大步数与容差.
const PERPLEXITY_STEPS: usize = 100;
const PERPLEXITY_TOL: f64 = 1e-5;

/// t-SNE 参数.
#[derive(Debug, Clone, Copy)]
pub struct Tsne {
    /// 嵌入维数.
    pub n_components: usize,

    /// 困惑度.
    pub perplexity: f64,

    /// 早期放大系数.
    pub early_exaggeration: f64,

    /// 早期放大阶段的迭代次数.
    pub exaggeration_iter: usize,

    /// 学习率.
    pub learning_rate: f64,

    /// 总迭代次数.
    pub n_iter: usize,

    /// 随机种子.
    pub seed: u64,
}

impl Default for Tsne {
    fn default() -> Self {
        Self {
            n_components: 3,
            perplexity: 5.0,
            early_exaggeration: 12.0,
            exaggeration_iter: 250,
            learning_rate: 200.0,
            n_iter: 1000,
            seed: 42,
        }
    }
}

/// 两两之间的欧氏距离平方.
pub fn squared_distances(x: ArrayView2<f64>) -> Array2<f64> {
    let norms: Array1<f64> = x.outer_iter().map(|r| r.dot(&r)).collect();
    let mut d = x.dot(&x.t()) * -2.0;
    Zip::indexed(&mut d).for_each(|(i, j), v| {
        *v = if i == j {
            0.0
        } else {
            (*v + norms[i] + norms[j]).max(0.0)
        };
    });
    d
}

/// 对第 `i` 行二分搜索精度 `beta`, 使条件分布的熵等于 `ln(perplexity)`.
fn conditional_row(distances: ArrayView2<f64>, i: usize, perplexity: f64) -> Array1<f64> {
    let n = distances.nrows();
    let target = perplexity.ln();
    let (mut beta, mut lo, mut hi) = (1.0, f64::NEG_INFINITY, f64::INFINITY);
    let mut p = Array1::<f64>::zeros(n);

    for _ in 0..PERPLEXITY_STEPS {
        let mut sum_p = 0.0;
        for j in 0..n {
            p[j] = if j == i {
                0.0
            } else {
                (-distances[(i, j)] * beta).exp()
            };
            sum_p += p[j];
        }
        if sum_p == 0.0 {
            sum_p = MACHINE_EPSILON;
        }
        let mut sum_dp = 0.0;
        for j in 0..n {
            p[j] /= sum_p;
            sum_dp += distances[(i, j)] * p[j];
        }
        let entropy = sum_p.ln() + beta * sum_dp;
        let diff = entropy - target;
        if diff.abs() <= PERPLEXITY_TOL {
            break;
        }
        if diff > 0.0 {
            lo = beta;
            beta = if hi == f64::INFINITY { beta * 2.0 } else { (beta + hi) / 2.0 };
        } else {
            hi = beta;
            beta = if lo == f64::NEG_INFINITY { beta / 2.0 } else { (beta + lo) / 2.0 };
        }
    }
    p
}

/// 对称化的联合概率 `P`, 总和为 1.
pub fn joint_probabilities(distances: ArrayView2<f64>, perplexity: f64) -> Array2<f64> {
    let n = distances.nrows();
    let mut cond = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        cond.row_mut(i).assign(&conditional_row(distances, i, perplexity));
    }
    let p = &cond + &cond.t();
    let total = p.sum().max(MACHINE_EPSILON);
    let mut p = p / total;
    Zip::indexed(&mut p).for_each(|(i, j), v| {
        *v = if i == j { 0.0 } else { (*v).max(MACHINE_EPSILON) };
    });
    p
}

/// KL 散度对嵌入坐标的梯度, 同时返回散度值.
///
/// 低维分布为自由度 `max(n_components - 1, 1)` 的 Student-t.
fn kl_gradient(p: &Array2<f64>, y: &Array2<f64>) -> (f64, Array2<f64>) {
    let (n, dim) = y.dim();
    let dof = (dim as f64 - 1.0).max(1.0);
    let exponent = (dof + 1.0) / -2.0;

    let mut w = squared_distances(y.view());
    Zip::indexed(&mut w).for_each(|(i, j), v| {
        *v = if i == j { 0.0 } else { (*v / dof + 1.0).powf(exponent) };
    });
    let sum_w = w.sum().max(MACHINE_EPSILON);

    let mut kl = 0.0;
    let mut grad = Array2::<f64>::zeros((n, dim));
    for i in 0..n {
        let mut g = grad.row_mut(i);
        for j in 0..n {
            if i == j {
                continue;
            }
            let q = (w[(i, j)] / sum_w).max(MACHINE_EPSILON);
            let pij = p[(i, j)];
            kl += pij * (pij.max(MACHINE_EPSILON) / q).ln();
            let coeff = (pij - q) * w[(i, j)];
            for d in 0..dim {
                g[d] += coeff * (y[(i, d)] - y[(j, d)]);
            }
        }
    }
    grad *= 2.0 * (dof + 1.0) / dof;
    (kl, grad)
}

impl Tsne {
    /// 以 `perplexity` 创建, 其余参数取默认值.
    pub fn new(perplexity: f64) -> Self {
        Self {
            perplexity,
            ..Default::default()
        }
    }

    /// 嵌入 `x` (`n_samples x n_features`), 返回 `n_samples x n_components`.
    pub fn fit_transform(&self, x: ArrayView2<f64>) -> NvResult<Array2<f64>> {
        let n = x.nrows();
        if n < 2 {
            return Err(NvError::Empty("t-SNE input"));
        }
        assert!(self.perplexity > 0.0, "困惑度必须为正");
        if self.perplexity >= n as f64 {
            log::warn!("perplexity {} is not below the sample count {n}", self.perplexity);
        }

        let p = joint_probabilities(squared_distances(x).view(), self.perplexity);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut y = Array2::from_shape_simple_fn((n, self.n_components), || {
            let v: f64 = StandardNormal.sample(&mut rng);
            v * 1e-4
        });

        let exaggerated = &p * self.early_exaggeration;
        let stage1 = self.exaggeration_iter.min(self.n_iter);
        self.descend(&exaggerated, &mut y, 0..stage1, 0.5);
        let kl = self.descend(&p, &mut y, stage1..self.n_iter, 0.8);
        log::info!("t-SNE finished, KL divergence {kl:.4}");
        Ok(y)
    }

    /// 带动量和自适应增益的梯度下降, 返回最后一次的 KL 散度.
    fn descend(
        &self,
        p: &Array2<f64>,
        y: &mut Array2<f64>,
        iters: std::ops::Range<usize>,
        momentum: f64,
    ) -> f64 {
        const MIN_GAIN: f64 = 0.01;
        let mut update = Array2::<f64>::zeros(y.dim());
        let mut gains = Array2::<f64>::ones(y.dim());
        let mut kl = 0.0;

        for it in iters {
            let (err, mut grad) = kl_gradient(p, y);
            kl = err;
            Zip::from(&mut gains)
                .and(&update)
                .and(&grad)
                .for_each(|g, &u, &d| {
                    *g = if u * d < 0.0 { *g + 0.2 } else { (*g * 0.8).max(MIN_GAIN) };
                });
            grad *= &gains;
            update = &update * momentum - &(&grad * self.learning_rate);
            *y += &update;
            if (it + 1) % 100 == 0 {
                log::debug!("t-SNE iteration {}: KL {err:.4}", it + 1);
            }
        }
        kl
    }
}

/// 按列去均值, 使嵌入的中心位于原点.
pub fn center_columns(y: &mut Array2<f64>) {
    if let Some(mean) = y.mean_axis(Axis(0)) {
        *y -= &mean.insert_axis(Axis(0));
    }
}
