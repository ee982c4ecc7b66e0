//! 背景掩膜估计与掩膜外插值.
//!
//! 公开数据集中的统计图常常已被作者掩膜过: 脑外区域为 NaN 或某个常数.
//! 直接重采样会把这些边界值插值进脑内, 因此需要先向外插值几层.

use std::collections::BTreeMap;

use ndarray::{Array3, ArrayView3, Zip};
use ordered_float::OrderedFloat;

use super::morph_3d::diamond_neighbours;
use crate::consts::threshold::BACKGROUND_BORDER;
use crate::{BinaryMask, Idx3d, SpatialAttr, Volume};

/// `pos` 距离最近边界是否小于 `border` 个体素.
#[inline]
fn on_border((x, y, z): Idx3d, (sx, sy, sz): (usize, usize, usize), border: usize) -> bool {
    let near = |i: usize, n: usize| i < border || i + border >= n;
    near(x, sx) || near(y, sy) || near(z, sz)
}

/// 出现最多的值. 若有多个, 取最小者. 输入为空时返回 `None`.
fn mode<I: IntoIterator<Item = f32>>(values: I) -> Option<f32> {
    let mut counts: BTreeMap<OrderedFloat<f32>, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(OrderedFloat(v)).or_default() += 1;
    }
    // `max_by_key` 在并列时返回最后一个, 因此逆序遍历.
    counts
        .into_iter()
        .rev()
        .max_by_key(|&(_, c)| c)
        .map(|(v, _)| v.into_inner())
}

/// 由体数据边界估计背景并求前景掩膜.
///
/// 1. 若距离边界 2 个体素以内存在 NaN, 前景为所有非 NaN 体素;
/// 2. 否则以边界处的众数作为背景值, 前景为所有不等于背景值的体素.
pub fn compute_background_mask(volume: &Volume) -> BinaryMask {
    BinaryMask::new(background_foreground(volume.data()), *volume.affine())
}

fn background_foreground(data: ArrayView3<f32>) -> Array3<bool> {
    let shape = data.dim();
    let border: Vec<f32> = data
        .indexed_iter()
        .filter(|(pos, _)| on_border(*pos, shape, BACKGROUND_BORDER))
        .map(|(_, &v)| v)
        .collect();

    if border.iter().any(|v| v.is_nan()) {
        return data.mapv(|v| !v.is_nan());
    }
    match mode(border) {
        Some(bg) => data.mapv(|v| v != bg),
        None => Array3::from_elem(shape, true),
    }
}

/// 判断体数据是否已被掩膜过, 即需要向外插值.
///
/// 掩膜外的值全为 NaN 或只有一种取值时返回 `true`. 掩膜外没有体素时同样返回 `true`.
pub fn needs_extrapolation(volume: &Volume, mask: &BinaryMask) -> bool {
    assert_eq!(volume.shape(), mask.shape(), "体数据与掩膜形状不一致");
    let mut outside = volume
        .data()
        .into_iter()
        .zip(mask.data())
        .filter_map(|(&v, &m)| (!m).then_some(v))
        .peekable();

    let Some(&first) = outside.peek() else {
        return true;
    };
    // NaN 之间视为同一取值.
    let same = |v: f32| (v.is_nan() && first.is_nan()) || v == first;
    outside.all(same)
}

/// 向掩膜外插值 `iterations` 层.
///
/// 每一层将掩膜膨胀一次, 新增外壳体素取其位于旧掩膜内的有限 6-邻居的均值,
/// 没有这样的邻居时取 0. 最终掩膜外的体素均置为 0.
///
/// 返回插值后的体数据和扩大后的掩膜.
pub fn extrapolate_out_mask(
    volume: &Volume,
    mask: &BinaryMask,
    iterations: usize,
) -> (Volume, BinaryMask) {
    assert_eq!(volume.shape(), mask.shape(), "体数据与掩膜形状不一致");
    let shape = volume.shape();
    let mut data = volume.data().to_owned();
    let mut mask = mask.clone();

    for _ in 0..iterations {
        let shell = mask.outer_shell();
        let mut next = data.clone();
        for pos in shell.positions() {
            let (sum, cnt) = diamond_neighbours(pos, shape)
                .into_iter()
                .filter(|&n| mask[n] && data[n].is_finite())
                .fold((0.0f64, 0usize), |(s, c), n| (s + data[n] as f64, c + 1));
            next[pos] = if cnt == 0 { 0.0 } else { (sum / cnt as f64) as f32 };
        }
        data = next;
        mask = mask.dilate(1);
    }

    let mut out = volume.clone();
    Zip::from(out.data_mut())
        .and(&data)
        .and(mask.data())
        .for_each(|o, &d, &m| *o = if m { d } else { 0.0 });
    (out, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Affine;

    /// 9x9x9 的体数据, 中心 5x5x5 立方体为 `inside`, 其余为 `outside`.
    fn masked_cube(inside: f32, outside: f32) -> Volume {
        let data = Array3::from_shape_fn((9, 9, 9), |(x, y, z)| {
            if (2..7).contains(&x) && (2..7).contains(&y) && (2..7).contains(&z) {
                inside + (x + y + z) as f32
            } else {
                outside
            }
        });
        Volume::new(data, Affine::identity())
    }

    #[test]
    fn test_mode_prefers_smallest_on_tie() {
        assert_eq!(mode([3.0, 1.0, 3.0, 1.0, 2.0]), Some(1.0));
        assert_eq!(mode([0.0, 0.0, 5.0]), Some(0.0));
        assert_eq!(mode(std::iter::empty()), None);
    }

    #[test]
    fn test_background_from_nan_border() {
        let v = masked_cube(10.0, f32::NAN);
        let m = compute_background_mask(&v);
        assert_eq!(m.count(), 125);
        assert!(m[(2, 2, 2)]);
        assert!(!m[(1, 2, 2)]);
        assert!(needs_extrapolation(&v, &m));
    }

    #[test]
    fn test_background_from_constant_border() {
        let v = masked_cube(10.0, 0.0);
        let m = compute_background_mask(&v);
        assert_eq!(m.count(), 125);
        assert!(needs_extrapolation(&v, &m));

        // 边界众数不为 0 时同样适用.
        let v = masked_cube(10.0, -1.0);
        assert_eq!(compute_background_mask(&v).count(), 125);
    }

    #[test]
    fn test_nan_inside_border_ring() {
        let mut v = masked_cube(10.0, 0.0);
        v[(0, 4, 4)] = f32::NAN;
        let m = compute_background_mask(&v);
        // 边界含 NaN 时, 前景为全部非 NaN 体素.
        assert_eq!(m.count(), 9 * 9 * 9 - 1);
    }

    #[test]
    fn test_needs_extrapolation() {
        let v = masked_cube(10.0, f32::NAN);
        assert!(needs_extrapolation(&v, &v.binarize(|x| x.is_finite())));

        let v = masked_cube(10.0, 0.0);
        let m = v.binarize(|x| x != 0.0);
        assert!(needs_extrapolation(&v, &m));

        // 掩膜外取值多样, 不需要插值.
        let mut noisy = v.clone();
        noisy[(0, 0, 0)] = 7.0;
        noisy[(8, 8, 8)] = -7.0;
        assert!(!needs_extrapolation(&noisy, &m));
    }

    #[test]
    fn test_empty_outside_needs_extrapolation() {
        let v = Volume::new(Array3::from_elem((3, 3, 3), 1.0), Affine::identity());
        let m = v.binarize(|_| true);
        assert!(needs_extrapolation(&v, &m));
    }

    #[test]
    fn test_extrapolate_fills_shell() {
        let mut data = Array3::from_elem((5, 5, 5), f32::NAN);
        data[(2, 2, 2)] = 4.0;
        let v = Volume::new(data, Affine::identity());
        let m = v.binarize(|x| x.is_finite());

        let (once, m1) = extrapolate_out_mask(&v, &m, 1);
        assert_eq!(m1.count(), 7);
        assert_eq!(once[(1, 2, 2)], 4.0);
        assert_eq!(once[(2, 2, 3)], 4.0);
        // 掩膜外置 0.
        assert_eq!(once[(0, 0, 0)], 0.0);
        assert_eq!(once.finite_min_max(), Some((0.0, 4.0)));

        let (twice, m2) = extrapolate_out_mask(&v, &m, 2);
        assert_eq!(m2.count(), 25);
        assert_eq!(twice[(0, 2, 2)], 4.0);
        assert_eq!(twice[(1, 1, 2)], 4.0);
    }

    #[test]
    fn test_extrapolate_averages_neighbours() {
        let mut data = Array3::from_elem((3, 1, 1), f32::NAN);
        data[(0, 0, 0)] = 2.0;
        data[(2, 0, 0)] = 6.0;
        let v = Volume::new(data, Affine::identity());
        let m = v.binarize(|x| x.is_finite());
        let (out, m1) = extrapolate_out_mask(&v, &m, 1);
        assert_eq!(m1.count(), 3);
        assert_eq!(out[(1, 0, 0)], 4.0);
    }
}
