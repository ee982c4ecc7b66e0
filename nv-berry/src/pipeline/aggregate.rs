//! 体素级聚合: 激活频率图与平均激活图.

use std::path::Path;

use either::Either;
use ndarray::{Array2, ArrayView2, Axis};

use crate::consts::threshold::ACTIVATION;
use crate::dataset::{image_loader, resampled_filename, DataLayout};
use crate::decomposition::Masker;
use crate::metadata::MetadataTable;
use crate::text::GROUPS;
use crate::{BinaryMask, Interpolation, NvError, NvResult, Volume};

/// 将单个体数据计入频率累加器. NaN 与掩膜外视为 0.
fn accumulate(acc: &mut Volume, volume: &Volume, mask: &BinaryMask) -> NvResult<()> {
    let mut v = volume.resample_like(mask, Interpolation::Nearest)?;
    v.replace_non_finite(0.0);
    v.apply_mask(mask, 0.0);
    acc.data_mut()
        .zip_mut_with(&v.data(), |a, &x| {
            if x.abs() > ACTIVATION {
                *a += 1.0;
            }
        });
    Ok(())
}

/// 激活频率图: 每个体素上 `|value| > 3` 的图像百分比.
///
/// 读取 `resampled/` 下表中每一行对应的文件, 最近邻重采样到 `mask` 的网格.
/// 4D 文件的每个体数据各算一张图. 无法读取的文件被记录并跳过;
/// 没有任何可用图像时返回 `Err`.
pub fn frequency_map(
    table: &MetadataTable,
    layout: &DataLayout,
    mask: &BinaryMask,
) -> NvResult<Volume> {
    let items = table.iter().map(|r| (r.image_id(), r.image.ext().to_owned()));
    let loader = image_loader(items, layout.resampled_dir(), resampled_filename)?;

    let mut acc = Volume::zeros_like(mask);
    let mut n_images = 0usize;
    for (id, img) in loader {
        match img {
            Ok(Either::Left(v)) => {
                accumulate(&mut acc, &v, mask)?;
                n_images += 1;
            }
            Ok(Either::Right(s)) => {
                for v in s.volumes() {
                    accumulate(&mut acc, &v, mask)?;
                    n_images += 1;
                }
            }
            Err(e) => log::warn!("skipping image {id}: {e}"),
        }
    }
    if n_images == 0 {
        return Err(NvError::Empty("frequency map"));
    }
    log::info!("frequency map over {n_images} images");

    let scale = 100.0 / n_images as f32;
    acc.data_mut().mapv_inplace(|c| c * scale);
    Ok(acc)
}

/// 平均激活图.
#[derive(Debug, Clone)]
pub struct MeanMaps {
    /// 全部图像的平均.
    pub all: Volume,

    /// 每个关键词组的平均. 没有任何图像提到的组不出现.
    pub groups: Vec<(&'static str, Volume)>,
}

impl MeanMaps {
    /// 保存为 `dir/all.nii.gz` 和 `dir/<group>.nii.gz`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> NvResult<()> {
        let dir = dir.as_ref();
        self.all.save(dir.join(crate::consts::filename::MEAN_ALL))?;
        for (name, v) in &self.groups {
            v.save(dir.join(format!("{name}.nii.gz")))?;
        }
        Ok(())
    }
}

/// 由掩膜矩阵 `x` (`n_images x n_voxels`) 和关键词组计数 `counts`
/// (`n_images x n_groups`) 计算平均激活图.
pub fn mean_maps(x: ArrayView2<f64>, counts: &Array2<usize>, masker: &Masker) -> NvResult<MeanMaps> {
    if x.nrows() == 0 {
        return Err(NvError::Empty("mean maps"));
    }
    if counts.nrows() != x.nrows() {
        return Err(NvError::ShapeMismatch {
            expected: vec![x.nrows(), GROUPS.len()],
            found: counts.shape().to_vec(),
        });
    }

    let mean_of = |rows: &[usize]| {
        let sub = x.select(Axis(0), rows);
        sub.mean_axis(Axis(0))
            .map(|m| masker.inverse_transform(m.view()))
    };

    let all_rows: Vec<usize> = (0..x.nrows()).collect();
    let all = mean_of(&all_rows).ok_or(NvError::Empty("mean maps"))?;

    let mut groups = Vec::with_capacity(GROUPS.len());
    for (g, (name, _)) in GROUPS.iter().enumerate() {
        let rows: Vec<usize> = counts
            .column(g)
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| (c != 0).then_some(i))
            .collect();
        match mean_of(&rows) {
            Some(v) => {
                log::info!("group `{name}`: {} images", rows.len());
                groups.push((*name, v));
            }
            None => log::warn!("group `{name}` matches no image, skipped"),
        }
    }
    Ok(MeanMaps { all, groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{test_collection, test_image};
    use crate::{Affine, VolumeSeries};
    use ndarray::{array, Array3};

    fn cube_mask() -> BinaryMask {
        let mut data = Array3::from_elem((4, 4, 4), false);
        data[(1, 1, 1)] = true;
        data[(2, 2, 2)] = true;
        data[(3, 3, 3)] = true;
        BinaryMask::new(data, Affine::identity())
    }

    #[test]
    fn test_frequency_map() {
        let root = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(root.path());
        layout.ensure_dirs().unwrap();
        let mask = cube_mask();

        let mut a = Volume::zeros_like(&mask);
        a[(1, 1, 1)] = 4.0;
        a[(2, 2, 2)] = -5.0;
        a[(0, 0, 0)] = 10.0;
        a.save(layout.resampled_path(1, ".nii.gz")).unwrap();

        let mut b = Volume::zeros_like(&mask);
        b[(1, 1, 1)] = f32::NAN;
        b[(3, 3, 3)] = 3.0;
        let mut c = Volume::zeros_like(&mask);
        c[(1, 1, 1)] = 3.5;
        VolumeSeries::stack([&b, &c])
            .unwrap()
            .save(layout.resampled_path(2, ".nii.gz"))
            .unwrap();

        let table = MetadataTable::join(
            vec![test_image(1, 7, "Z"), test_image(2, 7, "Z"), test_image(3, 7, "Z")],
            vec![test_collection(7, "c")],
        );
        let freq = frequency_map(&table, &layout, &mask).unwrap();
        // 3 张图 (第 2 个文件是 4D 的), 第 3 行文件缺失.
        assert!((freq[(1, 1, 1)] - 200.0 / 3.0).abs() < 1e-4);
        assert!((freq[(2, 2, 2)] - 100.0 / 3.0).abs() < 1e-4);
        assert_eq!(freq[(3, 3, 3)], 0.0);
        assert_eq!(freq[(0, 0, 0)], 0.0);
    }

    #[test]
    fn test_frequency_map_without_images() {
        let root = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(root.path());
        layout.ensure_dirs().unwrap();
        let table = MetadataTable::join(vec![test_image(1, 7, "Z")], vec![]);
        assert!(matches!(
            frequency_map(&table, &layout, &cube_mask()),
            Err(NvError::Empty(_))
        ));
    }

    #[test]
    fn test_mean_maps() {
        let masker = Masker::new(cube_mask()).unwrap();
        let x = array![[1.0, 2.0, 3.0], [3.0, 4.0, 5.0], [5.0, 0.0, 1.0]];
        let mut counts = Array2::<usize>::zeros((3, GROUPS.len()));
        counts[(0, 0)] = 2;
        counts[(2, 0)] = 1;
        counts[(1, 2)] = 1;

        let maps = mean_maps(x.view(), &counts, &masker).unwrap();
        assert_eq!(maps.all[(1, 1, 1)], 3.0);
        assert_eq!(maps.all[(2, 2, 2)], 2.0);
        assert_eq!(maps.groups.len(), 2);
        assert_eq!(maps.groups[0].0, "language");
        assert_eq!(maps.groups[0].1[(3, 3, 3)], 2.0);
        assert_eq!(maps.groups[1].0, "motor");
        assert_eq!(maps.groups[1].1[(2, 2, 2)], 4.0);

        let dir = tempfile::tempdir().unwrap();
        maps.save(dir.path()).unwrap();
        assert!(dir.path().join("all.nii.gz").exists());
        assert!(dir.path().join("motor.nii.gz").exists());
        assert!(!dir.path().join("audio.nii.gz").exists());
    }

    #[test]
    fn test_mean_maps_shape_mismatch() {
        let masker = Masker::new(cube_mask()).unwrap();
        let x = Array2::<f64>::zeros((2, 3));
        let counts = Array2::<usize>::zeros((3, GROUPS.len()));
        assert!(mean_maps(x.view(), &counts, &masker).is_err());
        let empty = Array2::<f64>::zeros((0, 3));
        let counts = Array2::<usize>::zeros((0, GROUPS.len()));
        assert!(matches!(
            mean_maps(empty.view(), &counts, &masker),
            Err(NvError::Empty(_))
        ));
    }
}
