//! 简单统计工具.

use ordered_float::OrderedFloat;

/// 线性插值的百分位数, `q` 取 `[0, 100]`.
///
/// 非有限值被忽略; 没有有限值时返回 `None`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    assert!((0.0..=100.0).contains(&q), "百分位必须在 [0, 100] 内");
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_unstable_by_key(|&x| OrderedFloat(x));
    let pos = q / 100.0 * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(v[lo] + (v[hi] - v[lo]) * (pos - lo as f64))
}

/// 值最大的 `k` 个元素的下标, 按值降序.
pub fn top_k(values: &[f64], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(values[i])));
    idx.truncate(k);
    idx
}

/// 标签编码器: 将标签映射为其在有序去重标签表中的位置.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder<T> {
    classes: Vec<T>,
}

impl<T: Ord + Clone> LabelEncoder<T> {
    /// 由全部标签建立编码表.
    pub fn fit(labels: &[T]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// 有序去重后的标签.
    #[inline]
    pub fn classes(&self) -> &[T] {
        &self.classes
    }

    /// 编码. 出现未知标签时返回 `None`.
    pub fn transform(&self, labels: &[T]) -> Option<Vec<usize>> {
        labels
            .iter()
            .map(|l| self.classes.binary_search(l).ok())
            .collect()
    }

    /// 解码. 编码越界时返回 `None`.
    #[inline]
    pub fn inverse(&self, code: usize) -> Option<&T> {
        self.classes.get(code)
    }
}
