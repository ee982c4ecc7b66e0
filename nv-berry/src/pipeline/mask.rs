//! 灰质掩膜构建.

use std::path::Path;

use either::Either;

use crate::consts::threshold::{BRAIN_MASK, CLOSING_ITERATIONS, GREY_MATTER};
use crate::data::open_image;
use crate::{BinaryMask, Interpolation, NvResult, SpatialAttr, Volume};

/// 打开 3D 体数据. 如果是 4D 序列, 取第一个体数据.
pub fn open_first_volume<P: AsRef<Path>>(path: P) -> NvResult<Volume> {
    match open_image(path)? {
        Either::Left(v) => Ok(v),
        Either::Right(s) if !s.is_empty() => Ok(s.volume_at(0)),
        Either::Right(_) => Err(crate::NvError::Empty("volume series")),
    }
}

/// 由标准空间脑掩膜和灰质概率图计算灰质掩膜.
///
/// 1. 将概率图重采样到脑掩膜的网格上;
/// 2. 以 0.33 为阈值二值化, 再做 2 次闭运算;
/// 3. 与脑掩膜 (`> 1e-13`) 求交.
pub fn grey_matter_mask(brain_mask: &Volume, grey_matter: &Volume) -> NvResult<BinaryMask> {
    let gm = grey_matter.resample_like(brain_mask, Interpolation::Continuous)?;
    let gm_mask = gm
        .binarize(|v| v > GREY_MATTER)
        .close(CLOSING_ITERATIONS);
    let brain = brain_mask.binarize(|v| v > BRAIN_MASK);
    let mask = gm_mask.and(&brain);
    log::info!(
        "grey matter mask: {} of {} voxels ({} in brain mask)",
        mask.count(),
        mask.size(),
        brain.count()
    );
    Ok(mask)
}

/// 读取文件, 计算灰质掩膜并保存到 `output`.
pub fn build_grey_matter_mask<P, Q, R>(brain_mask: P, grey_matter: Q, output: R) -> NvResult<BinaryMask>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let brain = open_first_volume(brain_mask)?;
    let grey = open_first_volume(grey_matter)?;
    let mask = grey_matter_mask(&brain, &grey)?;
    mask.save(output)?;
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Affine;
    use ndarray::Array3;

    #[test]
    fn test_grey_matter_mask() {
        // 2mm 网格上的脑掩膜: 除去最外一层.
        let brain_affine = Affine::from_zooms([2.0; 3], [0.0; 3]);
        let brain = Volume::new(
            Array3::from_shape_fn((10, 10, 10), |(x, y, z)| {
                let inner = |i: usize| (1..9).contains(&i);
                if inner(x) && inner(y) && inner(z) {
                    1.0
                } else {
                    0.0
                }
            }),
            brain_affine,
        );

        // 1mm 网格上的概率图: 左半边为灰质, 中间挖一个空洞.
        let mut grey = Volume::new(
            Array3::from_shape_fn((20, 20, 20), |(x, _, _)| if x < 10 { 0.9 } else { 0.1 }),
            Affine::identity(),
        );
        // 物理坐标 (4, 10, 10), 落在脑掩膜网格的 (2, 5, 5), 四周都是灰质.
        grey[(4, 10, 10)] = 0.0;
        let resampled = grey.resample_like(&brain, Interpolation::Continuous).unwrap();
        assert!(resampled[(2, 5, 5)] < GREY_MATTER);

        let mask = grey_matter_mask(&brain, &grey).unwrap();
        assert!(mask.same_grid(&brain));
        // 小空洞被闭运算填上.
        assert!(mask[(2, 5, 5)]);
        assert!(mask[(4, 5, 5)]);
        // 脑掩膜外和右半边均不在灰质掩膜内.
        assert!(!mask[(0, 5, 5)]);
        assert!(!mask[(8, 5, 5)]);
        let brain_mask = brain.binarize(|v| v > BRAIN_MASK);
        assert_eq!(mask.and(&brain_mask), mask);
    }

    #[test]
    fn test_build_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let brain = Volume::new(Array3::from_elem((6, 6, 6), 1.0), Affine::identity());
        let grey = Volume::new(Array3::from_elem((6, 6, 6), 0.5), Affine::identity());
        let (b, g, out) = (
            dir.path().join("brain.nii.gz"),
            dir.path().join("grey.nii"),
            dir.path().join("gm_mask.nii.gz"),
        );
        brain.save(&b).unwrap();
        grey.save(&g).unwrap();

        let mask = build_grey_matter_mask(&b, &g, &out).unwrap();
        let back = BinaryMask::open(&out).unwrap();
        assert_eq!(back, mask);
        // 闭运算的腐蚀把越界视为背景, 外层两圈被去掉.
        assert_eq!(mask.count(), 8);
    }
}
