//! 通用体数据加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use std::io;
use std::path::{Path, PathBuf};

use crate::data::open_image;
use crate::{LoadedImage, NvResult};

/// 文件名构造器. 接受图像编号和扩展名, 获得文件名.
pub type FilenameBuilder = fn(i64, &str) -> String;

/// 从指定 (编号, 扩展名) 序列、路径、文件名构造器来创建加载器.
///
/// # 注意
///
/// 1. `path` 必须是已存在的目录, 否则返回 `Err`.
/// 2. 每一项 `(id, ext)` 都应在 `path` 下有形如 `builder(id, ext)` 的 nifti
///   文件, 否则加载器在迭代时会返回 `Err`.
pub fn image_loader<I, S, P>(items: I, path: P, builder: FilenameBuilder) -> NvResult<ImageLoader>
where
    I: IntoIterator<Item = (i64, S)>,
    S: Into<String>,
    P: AsRef<Path>,
{
    let path = path.as_ref().to_owned();
    if !path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", path.display()),
        )
        .into());
    }

    let mut items: Vec<(i64, String)> = items.into_iter().map(|(i, e)| (i, e.into())).collect();
    items.reverse();

    Ok(ImageLoader {
        path,
        items_rev: items,
        builder,
    })
}

/// 3D / 4D 体数据加载器, 并在内部自动转换文件名.
#[derive(Debug)]
pub struct ImageLoader {
    path: PathBuf,
    items_rev: Vec<(i64, String)>,
    builder: FilenameBuilder,
}

impl Iterator for ImageLoader {
    type Item = (i64, NvResult<LoadedImage>);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, ext) = self.items_rev.pop()?;

        self.path.push((self.builder)(id, &ext));
        let data = open_image(self.path.as_path());
        self.path.pop();

        Some((id, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}

impl ExactSizeIterator for ImageLoader {
    #[inline]
    fn len(&self) -> usize {
        self.items_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::resampled_filename;
    use crate::{Affine, Volume};
    use ndarray::Array3;

    #[test]
    fn test_loader_order_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        for id in [3, -3360] {
            let v = Volume::new(Array3::from_elem((2, 2, 2), id as f32), Affine::identity());
            v.save(dir.path().join(resampled_filename(id, ".nii.gz")))
                .unwrap();
        }

        let items = [(3, ".nii.gz"), (4, ".nii.gz"), (-3360, ".nii.gz")];
        let mut loader = image_loader(items, dir.path(), resampled_filename).unwrap();
        assert_eq!(loader.len(), 3);

        let (id, img) = loader.next().unwrap();
        assert_eq!(id, 3);
        assert_eq!(img.unwrap().left().unwrap()[(0, 0, 0)], 3.0);

        let (id, img) = loader.next().unwrap();
        assert_eq!(id, 4);
        assert!(img.is_err());

        let (id, img) = loader.next().unwrap();
        assert_eq!(id, -3360);
        assert!(img.is_ok());
        assert!(loader.next().is_none());
    }

    #[test]
    fn test_loader_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("resampled");
        let err = image_loader([(1, ".nii.gz")], &missing, resampled_filename).unwrap_err();
        assert!(matches!(err, crate::NvError::Io(e) if e.kind() == io::ErrorKind::NotFound));
    }
}
