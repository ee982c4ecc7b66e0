//! 体数据与掩膜内体素矩阵之间的互相转换.

use std::path::{Path, PathBuf};

use either::Either;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_npy::{read_npy, write_npy};

use crate::cache::Memory;
use crate::data::open_image;
use crate::{BinaryMask, Idx3d, Interpolation, NvError, NvResult, Volume, VolumeSeries};

/// 掩膜器. 将体数据展平为掩膜内体素组成的向量, 以及反向还原.
///
/// 体素顺序为掩膜的行优先顺序.
#[derive(Debug, Clone)]
pub struct Masker {
    mask: BinaryMask,
    positions: Vec<Idx3d>,
}

impl Masker {
    /// 以 `mask` 创建. 空掩膜返回 `Err`.
    pub fn new(mask: BinaryMask) -> NvResult<Self> {
        let positions = mask.positions();
        if positions.is_empty() {
            return Err(NvError::Empty("mask"));
        }
        Ok(Self { mask, positions })
    }

    /// 从 nii 文件读取掩膜.
    pub fn open<P: AsRef<Path>>(path: P) -> NvResult<Self> {
        Self::new(BinaryMask::open(path)?)
    }

    /// 掩膜.
    #[inline]
    pub fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    /// 特征 (掩膜内体素) 个数.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.positions.len()
    }

    /// 展平单个体数据. 不在掩膜网格上时先重采样, 非有限值置 0.
    pub fn transform(&self, volume: &Volume) -> NvResult<Array1<f64>> {
        let volume = volume.resample_like(&self.mask, Interpolation::Continuous)?;
        Ok(self
            .positions
            .iter()
            .map(|&p| {
                let v = volume[p];
                if v.is_finite() {
                    v as f64
                } else {
                    0.0
                }
            })
            .collect())
    }

    /// 读取若干文件并展平为 `n_images x n_features` 矩阵.
    ///
    /// 4D 文件的每个体数据各占一行.
    pub fn transform_paths<P: AsRef<Path>>(&self, paths: &[P]) -> NvResult<Array2<f64>> {
        let mut rows: Vec<Array1<f64>> = Vec::with_capacity(paths.len());
        for p in paths {
            match open_image(p.as_ref())? {
                Either::Left(v) => rows.push(self.transform(&v)?),
                Either::Right(s) => {
                    for v in s.volumes() {
                        rows.push(self.transform(&v)?);
                    }
                }
            }
        }
        let views: Vec<ArrayView1<f64>> = rows.iter().map(|r| r.view()).collect();
        if views.is_empty() {
            return Ok(Array2::zeros((0, self.n_features())));
        }
        ndarray::stack(Axis(0), &views).map_err(|_| NvError::Dimensionality(2))
    }

    /// 同 `transform_paths`, 但把结果以 `.npy` 形式缓存在 `memory` 目录下.
    ///
    /// 缓存键由文件路径和掩膜共同决定.
    pub fn transform_paths_cached<P: AsRef<Path>>(
        &self,
        paths: &[P],
        memory: &Memory,
    ) -> NvResult<Array2<f64>> {
        let names: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_owned()).collect();
        let key = Memory::key("masker_transform", &(&names, &self.positions))?;
        let file = memory.dir().join(format!("{key}.npy"));
        if let Ok(x) = read_npy::<_, Array2<f64>>(&file) {
            if x.ncols() == self.n_features() {
                log::debug!("masked matrix loaded from {}", file.display());
                return Ok(x);
            }
        }
        let x = self.transform_paths(paths)?;
        std::fs::create_dir_all(memory.dir())?;
        write_npy(&file, &x)?;
        Ok(x)
    }

    /// 将特征向量还原为体数据. 掩膜外为 0.
    pub fn inverse_transform(&self, row: ArrayView1<f64>) -> Volume {
        assert_eq!(row.len(), self.n_features(), "特征个数与掩膜不一致");
        let mut out = Volume::zeros_like(&self.mask);
        for (&p, &v) in self.positions.iter().zip(row) {
            out[p] = v as f32;
        }
        out
    }

    /// 将矩阵的每一行还原为体数据, 组成 4D 序列.
    pub fn inverse_transform_rows(&self, x: ArrayView2<f64>) -> NvResult<VolumeSeries> {
        let volumes: Vec<Volume> = x
            .axis_iter(Axis(0))
            .map(|row| self.inverse_transform(row))
            .collect();
        VolumeSeries::stack(&volumes)
    }
}
