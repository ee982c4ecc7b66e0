//! 重采样: 将体数据映射到目标仿射变换和形状所定义的网格上.
//!
//! 对目标网格上的每个体素 `t`, 其在源数据中的 (小数) 体素坐标为
//! `source_affine⁻¹ · target_affine · t`. 落在源数据范围外的体素取 0.

use ndarray::{Array3, Array4, ArrayView3, ArrayViewMut2, Axis};

use crate::{Affine, NvError, NvResult, Shape3d, SpatialAttr, Volume, VolumeSeries};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 边界容差, 以体素为单位.
const EDGE_EPS: f64 = 1e-6;

/// 插值方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Interpolation {
    /// 三线性插值, 用于连续值统计图.
    #[default]
    Continuous,

    /// 最近邻, 用于标签和掩膜.
    Nearest,
}

/// 三线性插值. 权重为 0 的角点不参与计算, 因此恰好落在网格点上时
/// 相邻的 NaN 不会扩散.
fn trilinear(src: &ArrayView3<f32>, p: [f64; 3]) -> f32 {
    let (sx, sy, sz) = src.dim();
    let dims = [sx, sy, sz];
    let mut base = [0usize; 3];
    let mut frac = [0f64; 3];
    for a in 0..3 {
        let n = dims[a] as f64;
        if p[a] < -EDGE_EPS || p[a] > n - 1.0 + EDGE_EPS {
            return 0.0;
        }
        let c = p[a].clamp(0.0, n - 1.0);
        let f = c.floor().min((n - 2.0).max(0.0));
        base[a] = f as usize;
        frac[a] = c - f;
    }

    let mut acc = 0.0f64;
    for corner in 0..8usize {
        let mut w = 1.0f64;
        let mut idx = base;
        for a in 0..3 {
            let hi = (corner >> a) & 1 == 1;
            w *= if hi { frac[a] } else { 1.0 - frac[a] };
            idx[a] += usize::from(hi);
        }
        if w != 0.0 {
            acc += w * src[(idx[0], idx[1], idx[2])] as f64;
        }
    }
    acc as f32
}

/// 最近邻插值.
fn nearest(src: &ArrayView3<f32>, p: [f64; 3]) -> f32 {
    let (sx, sy, sz) = src.dim();
    let dims = [sx, sy, sz];
    let mut idx = [0usize; 3];
    for a in 0..3 {
        let r = p[a].round();
        if r < 0.0 || r > dims[a] as f64 - 1.0 {
            return 0.0;
        }
        idx[a] = r as usize;
    }
    src[(idx[0], idx[1], idx[2])]
}

/// 对单个 3D 数组重采样. `voxel_map` 为目标体素坐标到源体素坐标的变换.
fn resample_array(
    src: ArrayView3<f32>,
    voxel_map: &Affine,
    shape: Shape3d,
    interp: Interpolation,
) -> Array3<f32> {
    let mut out = Array3::<f32>::zeros(shape);
    let fill = |i: usize, mut plane: ArrayViewMut2<f32>| {
        for ((j, k), v) in plane.indexed_iter_mut() {
            let p = voxel_map.apply([i as f64, j as f64, k as f64]);
            *v = match interp {
                Interpolation::Continuous => trilinear(&src, p),
                Interpolation::Nearest => nearest(&src, p),
            };
        }
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, plane)| fill(i, plane));
        } else {
            out.axis_iter_mut(Axis(0))
                .enumerate()
                .for_each(|(i, plane)| fill(i, plane));
        }
    }
    out
}

/// 求目标体素坐标到源体素坐标的变换.
fn voxel_map(source: &Affine, target: &Affine) -> NvResult<Affine> {
    let inv = source.inverse().ok_or(NvError::SingularAffine)?;
    Ok(inv.compose(target))
}

/// 重采样实现块
impl Volume {
    /// 重采样到由 `affine` 和 `shape` 定义的网格.
    ///
    /// 如果已经位于该网格上, 则直接拷贝. 源仿射不可逆时返回 `Err`.
    pub fn resample(
        &self,
        affine: &Affine,
        shape: Shape3d,
        interp: Interpolation,
    ) -> NvResult<Volume> {
        if self.shape() == shape && self.affine.approx_eq(affine, 1e-4) {
            return Ok(self.clone());
        }
        let map = voxel_map(&self.affine, affine)?;
        Ok(Volume {
            header: self.header.clone(),
            affine: *affine,
            data: resample_array(self.data.view(), &map, shape, interp),
        })
    }

    /// 重采样到 `like` 所在的网格.
    #[inline]
    pub fn resample_like<S: SpatialAttr + ?Sized>(
        &self,
        like: &S,
        interp: Interpolation,
    ) -> NvResult<Volume> {
        self.resample(like.affine(), like.shape(), interp)
    }
}

/// 重采样实现块
impl VolumeSeries {
    /// 逐个体数据重采样到由 `affine` 和 `shape` 定义的网格.
    pub fn resample(
        &self,
        affine: &Affine,
        shape: Shape3d,
        interp: Interpolation,
    ) -> NvResult<VolumeSeries> {
        if self.shape() == shape && self.affine.approx_eq(affine, 1e-4) {
            return Ok(self.clone());
        }
        let map = voxel_map(&self.affine, affine)?;
        let (x, y, z) = shape;
        let mut data = Array4::<f32>::zeros((x, y, z, self.len()));
        for (t, mut dst) in data.axis_iter_mut(Axis(3)).enumerate() {
            let src = self.data.index_axis(Axis(3), t);
            dst.assign(&resample_array(src, &map, shape, interp));
        }
        Ok(VolumeSeries {
            header: self.header.clone(),
            affine: *affine,
            data,
        })
    }

    /// 重采样到 `like` 所在的网格.
    #[inline]
    pub fn resample_like<S: SpatialAttr + ?Sized>(
        &self,
        like: &S,
        interp: Interpolation,
    ) -> NvResult<VolumeSeries> {
        self.resample(like.affine(), like.shape(), interp)
    }
}
