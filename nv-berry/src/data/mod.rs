use std::ops::{Index, IndexMut};
use std::path::Path;

use either::Either;
use ndarray::{Array3, Array4, ArrayView3, ArrayViewMut3, Axis, Ix3, Ix4, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{Idx3d, NvError, NvResult, Shape3d};

mod affine;
pub mod background;
pub mod morph_3d;
pub mod resample;
pub mod window;

pub use affine::Affine;
pub use resample::Interpolation;
pub use window::{ColorMap, DisplayWindow};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 打开 nifti 文件后得到的 3D 体数据或 4D 序列.
pub type LoadedImage = Either<Volume, VolumeSeries>;

/// 带有空间信息的体数据的共用属性.
pub trait SpatialAttr {
    /// 体素索引到物理坐标的仿射变换.
    fn affine(&self) -> &Affine;

    /// 空间形状 `(x, y, z)`.
    fn shape(&self) -> Shape3d;

    /// 空间体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (x, y, z) = self.shape();
        x * y * z
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (x0, y0, z0): &Idx3d) -> bool {
        let (x, y, z) = self.shape();
        *x0 < x && *y0 < y && *z0 < z
    }

    /// 各轴体素尺寸, 以毫米为单位.
    #[inline]
    fn zooms(&self) -> [f64; 3] {
        self.affine().zooms()
    }

    /// 是否与 `other` 位于同一网格 (形状一致, 仿射在 1e-4 容差内一致).
    fn same_grid<S: SpatialAttr + ?Sized>(&self, other: &S) -> bool {
        self.shape() == other.shape() && self.affine().approx_eq(other.affine(), 1e-4)
    }
}

/// 去除第三维之后的所有长度为 1 的维度.
fn squeeze(shape: &[usize]) -> Vec<usize> {
    let (head, tail) = shape.split_at(shape.len().min(3));
    let mut out = head.to_vec();
    out.extend(tail.iter().copied().filter(|&d| d != 1));
    while out.len() < 3 {
        out.push(1);
    }
    out
}

/// 构造一个写出用的 header: 仅保留 `reference` 中的描述性字段.
fn output_header(reference: Option<&NiftiHeader>, affine: &Affine) -> NiftiHeader {
    let mut h = NiftiHeader::default();
    if let Some(r) = reference {
        h.descrip = r.descrip.clone();
        h.xyzt_units = r.xyzt_units;
        h.intent_code = r.intent_code;
    }
    affine.write_to_header(&mut h);
    h.scl_slope = 1.0;
    h.scl_inter = 0.0;
    h.vox_offset = 352.0;
    h.magic = *b"n+1\0";
    h
}

/// 打开任意 nifti 文件. 第三维之后的单一维度会被压缩掉.
///
/// 如果剩余维度为 3, 返回 `Either::Left(Volume)`; 为 4 则返回
/// `Either::Right(VolumeSeries)`; 其他情况返回 `Err`.
pub fn open_image<P: AsRef<Path>>(path: P) -> NvResult<LoadedImage> {
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let header = Box::new(obj.header().clone());
    let affine = Affine::from_header(&header);
    let data = obj.into_volume().into_ndarray::<f32>()?;

    let shape = squeeze(data.shape());
    let data = data
        .into_shape(shape.as_slice())
        .map_err(|_| NvError::Dimensionality(shape.len()))?;

    match shape.len() {
        3 => {
            let data = data
                .into_dimensionality::<Ix3>()
                .map_err(|_| NvError::Dimensionality(3))?;
            Ok(Either::Left(Volume {
                header,
                affine,
                data: data.as_standard_layout().into_owned(),
            }))
        }
        4 => {
            let data = data
                .into_dimensionality::<Ix4>()
                .map_err(|_| NvError::Dimensionality(4))?;
            Ok(Either::Right(VolumeSeries {
                header,
                affine,
                data: data.as_standard_layout().into_owned(),
            }))
        }
        n => Err(NvError::Dimensionality(n)),
    }
}

/// nii 格式 3D 体数据, 包括 header、仿射变换和体素值. 体素值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct Volume {
    header: BoxedHeader,
    affine: Affine,
    data: Array3<f32>,
}

impl SpatialAttr for Volume {
    #[inline]
    fn affine(&self) -> &Affine {
        &self.affine
    }

    #[inline]
    fn shape(&self) -> Shape3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Volume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Volume {
    /// 由数据和仿射直接创建体数据.
    pub fn new(data: Array3<f32>, affine: Affine) -> Self {
        Self {
            header: Box::default(),
            affine,
            data,
        }
    }

    /// 创建与 `like` 位于同一网格、值全为 0 的体数据.
    pub fn zeros_like<S: SpatialAttr + ?Sized>(like: &S) -> Self {
        Self::new(Array3::zeros(like.shape()), *like.affine())
    }

    /// 打开 nii 文件格式的 3D 体数据. 如果文件实际是 4D 的, 返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> NvResult<Self> {
        match open_image(path)? {
            Either::Left(v) => Ok(v),
            Either::Right(_) => Err(NvError::Dimensionality(4)),
        }
    }

    /// 保存到 `path`. 后缀 `.gz` 表示压缩.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NvResult<()> {
        let header = output_header(Some(&self.header), &self.affine);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&self.data)?;
        Ok(())
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.data.view_mut()
    }

    /// 取出底层数据.
    #[inline]
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    /// 原始 header.
    #[inline]
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// 将所有非有限值 (NaN, inf) 替换为 `value`. 返回替换个数.
    pub fn replace_non_finite(&mut self, value: f32) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|v| !v.is_finite())
            .for_each(|v| {
                cnt += 1;
                *v = value;
            });
        cnt
    }

    /// 将掩膜外的体素置为 `value`. 两者网格必须一致, 否则程序 panic.
    pub fn apply_mask(&mut self, mask: &BinaryMask, value: f32) {
        assert_eq!(self.shape(), mask.shape(), "体数据与掩膜形状不一致");
        Zip::from(&mut self.data)
            .and(&mask.data)
            .for_each(|v, &m| {
                if !m {
                    *v = value;
                }
            });
    }

    /// 按阈值二值化: `pred(value)` 为真的体素属于掩膜.
    pub fn binarize<F: Fn(f32) -> bool>(&self, pred: F) -> BinaryMask {
        BinaryMask::new(self.data.mapv(pred), self.affine)
    }

    /// 有限值中的最小值与最大值. 没有有限值时返回 `None`.
    pub fn finite_min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// nii 格式 4D 体数据序列, 最后一维为序列维.
#[derive(Debug, Clone)]
pub struct VolumeSeries {
    header: BoxedHeader,
    affine: Affine,
    data: Array4<f32>,
}

impl SpatialAttr for VolumeSeries {
    #[inline]
    fn affine(&self) -> &Affine {
        &self.affine
    }

    #[inline]
    fn shape(&self) -> Shape3d {
        let (x, y, z, _) = self.data.dim();
        (x, y, z)
    }
}

impl VolumeSeries {
    /// 由数据和仿射直接创建.
    pub fn new(data: Array4<f32>, affine: Affine) -> Self {
        Self {
            header: Box::default(),
            affine,
            data,
        }
    }

    /// 将若干同网格 3D 体数据堆叠为 4D 序列. 输入为空或网格不一致时返回 `Err`.
    pub fn stack<'a, I: IntoIterator<Item = &'a Volume>>(volumes: I) -> NvResult<Self> {
        let volumes: Vec<&Volume> = volumes.into_iter().collect();
        let first = volumes.first().ok_or(NvError::Empty("volume stack"))?;
        let views: Vec<ArrayView3<f32>> = volumes
            .iter()
            .map(|v| {
                if v.same_grid(*first) {
                    Ok(v.data())
                } else {
                    let (x, y, z) = v.shape();
                    let (a, b, c) = first.shape();
                    Err(NvError::ShapeMismatch {
                        expected: vec![a, b, c],
                        found: vec![x, y, z],
                    })
                }
            })
            .collect::<NvResult<_>>()?;
        let data = ndarray::stack(Axis(3), &views).map_err(|_| NvError::Dimensionality(4))?;
        Ok(Self::new(data, first.affine))
    }

    /// 序列长度.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// 序列是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取出第 `index` 个 3D 体数据 (拷贝). 越界时 panic.
    pub fn volume_at(&self, index: usize) -> Volume {
        Volume {
            header: self.header.clone(),
            affine: self.affine,
            data: self.data.index_axis(Axis(3), index).to_owned(),
        }
    }

    /// 按序迭代所有 3D 体数据.
    pub fn volumes(&self) -> impl ExactSizeIterator<Item = Volume> + '_ {
        (0..self.len()).map(|i| self.volume_at(i))
    }

    /// 保存到 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NvResult<()> {
        let header = output_header(Some(&self.header), &self.affine);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&self.data)?;
        Ok(())
    }
}

/// 3D 二值掩膜.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    affine: Affine,
    data: Array3<bool>,
}

impl SpatialAttr for BinaryMask {
    #[inline]
    fn affine(&self) -> &Affine {
        &self.affine
    }

    #[inline]
    fn shape(&self) -> Shape3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for BinaryMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BinaryMask {
    /// 由数据和仿射直接创建.
    pub fn new(data: Array3<bool>, affine: Affine) -> Self {
        Self { affine, data }
    }

    /// 打开 nii 文件, 非零体素视为前景.
    pub fn open<P: AsRef<Path>>(path: P) -> NvResult<Self> {
        Ok(Volume::open(path)?.binarize(|v| v != 0.0))
    }

    /// 以 `u8` (0/1) 格式保存.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NvResult<()> {
        let header = output_header(None, &self.affine);
        let data = self.data.mapv(u8::from);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)?;
        Ok(())
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    /// 按行优先序收集所有前景体素索引.
    pub fn positions(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, &m)| m.then_some(pos))
            .collect()
    }

    /// 逐体素与运算. 形状不一致时程序 panic.
    pub fn and(&self, other: &BinaryMask) -> BinaryMask {
        assert_eq!(self.shape(), other.shape(), "掩膜形状不一致");
        let mut data = self.data.clone();
        Zip::from(&mut data).and(&other.data).for_each(|a, &b| *a &= b);
        Self::new(data, self.affine)
    }

    /// 逐体素取反.
    pub fn not(&self) -> BinaryMask {
        Self::new(self.data.mapv(|m| !m), self.affine)
    }

    /// 转换为 0/1 取值的体数据.
    pub fn to_volume(&self) -> Volume {
        Volume::new(self.data.mapv(|m| if m { 1.0 } else { 0.0 }), self.affine)
    }

    pub(crate) fn data_mut(&mut self) -> &mut Array3<bool> {
        &mut self.data
    }
}
