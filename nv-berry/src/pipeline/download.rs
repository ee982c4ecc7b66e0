//! 下载统计图并重采样到统一网格.

use either::Either;

use crate::consts::threshold::EXTRAPOLATION_ITERATIONS;
use crate::data::background::{compute_background_mask, extrapolate_out_mask, needs_extrapolation};
use crate::data::open_image;
use crate::dataset::{split_id, DataLayout};
use crate::metadata::{Fetch, MetadataRow, MetadataTable};
use crate::{Interpolation, NvError, NvResult, SpatialAttr, Volume, VolumeSeries};

/// 若统计图已被掩膜过 (掩膜外全为 NaN 或常数), 向掩膜外插值 3 层.
pub fn fill_outside_background(volume: Volume) -> Volume {
    let bg = compute_background_mask(&volume);
    if needs_extrapolation(&volume, &bg) {
        log::debug!("extrapolating outside {} background voxels", bg.count());
        extrapolate_out_mask(&volume, &bg, EXTRAPOLATION_ITERATIONS).0
    } else {
        volume
    }
}

/// 处理结果: 单个 3D 文件, 或拆分后的若干子图编号.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resampled {
    /// 3D 文件, 编号不变.
    Single,

    /// 4D 文件被拆分为若干 3D 文件, 参数为子图编号.
    Split(Vec<i64>),
}

/// 下载器: 下载原始文件, 插值、重采样后写入 `resampled/`.
pub struct Downloader<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    layout: &'a DataLayout,
    target: &'a Volume,
}

impl<'a, F: Fetch + ?Sized> Downloader<'a, F> {
    /// `target` 提供目标网格 (仿射与形状).
    pub fn new(fetcher: &'a F, layout: &'a DataLayout, target: &'a Volume) -> Self {
        Self {
            fetcher,
            layout,
            target,
        }
    }

    /// 原始文件不存在时下载.
    fn ensure_original(&self, row: &MetadataRow) -> NvResult<()> {
        let path = self.layout.original_path(row.image_id(), row.image.ext());
        if !path.exists() {
            log::info!("downloading {}", path.display());
            self.fetcher.download(&row.image.file, &path)?;
        }
        Ok(())
    }

    /// 处理单个 3D 体数据.
    fn resample_volume(&self, volume: Volume) -> NvResult<Volume> {
        fill_outside_background(volume).resample_like(self.target, Interpolation::Continuous)
    }

    /// 处理单行: 下载, 插值, 重采样并保存.
    pub fn process(&self, row: &MetadataRow) -> NvResult<Resampled> {
        self.ensure_original(row)?;
        let id = row.image_id();
        let ext = row.image.ext();
        let original = self.layout.original_path(id, ext);

        log::info!("resampling {}", original.display());
        match open_image(&original)? {
            Either::Left(volume) => {
                let out = self.resample_volume(volume)?;
                out.save(self.layout.resampled_path(id, ext))?;
                Ok(Resampled::Single)
            }
            Either::Right(series) => {
                let volumes = series
                    .volumes()
                    .map(|v| self.resample_volume(v))
                    .collect::<NvResult<Vec<_>>>()?;
                let out = VolumeSeries::stack(&volumes)?;
                debug_assert!(out.same_grid(self.target));

                let mut ids = Vec::with_capacity(out.len());
                for (index, v) in out.volumes().enumerate() {
                    let child = split_id(id, index).ok_or_else(|| {
                        NvError::Metadata(format!("split id of image {id} volume {index} overflows"))
                    })?;
                    v.save(self.layout.resampled_path(child, ext))?;
                    ids.push(child);
                }
                log::info!("split 4D image {id} into {} volumes", ids.len());
                Ok(Resampled::Split(ids))
            }
        }
    }

    /// 处理整张表. 失败的行被记录并去除; 4D 文件的行被替换为子图行.
    pub fn run(&self, table: &MetadataTable) -> NvResult<MetadataTable> {
        self.layout.ensure_dirs()?;
        let mut out = table.clone();
        for row in table {
            match self.process(row) {
                Ok(Resampled::Single) => {}
                Ok(Resampled::Split(ids)) => {
                    let children = ids
                        .into_iter()
                        .map(|child| {
                            let mut r = row.clone();
                            r.image.image_id = child;
                            r
                        })
                        .collect();
                    out.replace_with_children(row.image_id(), children);
                }
                Err(e) => {
                    log::warn!("could not load image {}: {e}", row.image_id());
                    out.exclude_ids(&[row.image_id()]);
                }
            }
        }
        Ok(out)
    }
}
