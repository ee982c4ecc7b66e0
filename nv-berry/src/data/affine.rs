//! 体素索引到物理坐标 (毫米) 的仿射变换.

use nalgebra::{Matrix4, Vector4};
use nifti::{NiftiHeader, XForm};

/// 4x4 仿射矩阵. 最后一行恒为 `[0, 0, 0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine(Matrix4<f64>);

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Matrix4<f64>> for Affine {
    #[inline]
    fn from(m: Matrix4<f64>) -> Self {
        Self(m)
    }
}

impl Affine {
    /// 单位变换.
    #[inline]
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// 由前三行构造. 第四行自动补为 `[0, 0, 0, 1]`.
    #[rustfmt::skip]
    pub fn from_rows([x, y, z]: [[f64; 4]; 3]) -> Self {
        Self(Matrix4::new(
            x[0], x[1], x[2], x[3],
            y[0], y[1], y[2], y[3],
            z[0], z[1], z[2], z[3],
            0.0, 0.0, 0.0, 1.0,
        ))
    }

    /// 由各轴体素尺寸 (毫米) 和原点平移构造对角仿射.
    pub fn from_zooms([x, y, z]: [f64; 3], [tx, ty, tz]: [f64; 3]) -> Self {
        Self::from_rows([[x, 0.0, 0.0, tx], [0.0, y, 0.0, ty], [0.0, 0.0, z, tz]])
    }

    /// 从 nifti header 获取仿射: sform 优先, 其次 qform, 最后由形状和 `pixdim` 推出.
    ///
    /// 读取前先修正 `nifti` 会拒绝的字段: qfac 只取 ±1, 体素尺寸取绝对值,
    /// 尺寸为 0 时取 1.
    pub fn from_header(h: &NiftiHeader) -> Self {
        let mut h = h.clone();
        h.pixdim[0] = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        for v in &mut h.pixdim[1..4] {
            *v = if *v == 0.0 { 1.0 } else { v.abs() };
        }
        h.dim[0] = h.dim[0].clamp(3, 7);
        Self(h.affine::<f64>())
    }

    /// 将仿射写入 header 的 sform 部分 (`sform_code = 1`, `qform_code = 0`),
    /// 并同步 `pixdim`.
    pub fn write_to_header(&self, h: &mut NiftiHeader) {
        h.set_sform(&self.0, XForm::ScannerAnat);
        h.qform_code = XForm::Unknown as i16;
        let [x, y, z] = self.zooms();
        h.pixdim[0] = 1.0;
        h.pixdim[1] = x as f32;
        h.pixdim[2] = y as f32;
        h.pixdim[3] = z as f32;
    }

    /// 矩阵本身.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// 各轴体素尺寸, 即线性部分各列的模.
    pub fn zooms(&self) -> [f64; 3] {
        [0, 1, 2].map(|j| self.0.fixed_view::<3, 1>(0, j).norm())
    }

    /// 将体素坐标 (可为小数) 变换到物理坐标.
    #[inline]
    pub fn apply(&self, [i, j, k]: [f64; 3]) -> [f64; 3] {
        let p = self.0 * Vector4::new(i, j, k, 1.0);
        [p.x, p.y, p.z]
    }

    /// 矩阵乘法 `self * rhs`.
    #[inline]
    pub fn compose(&self, rhs: &Affine) -> Affine {
        Self(self.0 * rhs.0)
    }

    /// 求逆. 线性部分奇异时返回 `None`.
    pub fn inverse(&self) -> Option<Affine> {
        if self.0.fixed_view::<3, 3>(0, 0).determinant().abs() < f64::EPSILON {
            return None;
        }
        self.0.try_inverse().map(Self)
    }

    /// 两个仿射是否在 `tol` 容差内相等.
    #[inline]
    pub fn approx_eq(&self, other: &Affine, tol: f64) -> bool {
        (self.0 - other.0).amax() <= tol
    }
}
