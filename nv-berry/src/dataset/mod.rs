//! 数据目录布局与文件命名.
//!
//! ```text
//! <root>/
//!   original/    下载的原始文件, `%04d<ext>`
//!   resampled/   重采样后的文件, `%06d<ext>`
//!   cache/       函数结果缓存
//!   metadata.csv
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::filename::{CACHE_DIR, METADATA, ORIGINAL_DIR, RESAMPLED_DIR};
use crate::NvResult;

pub mod loader;

pub use loader::{image_loader, FilenameBuilder, ImageLoader};

/// 拆分文件名为 (主干, 扩展名). `.nii.gz` 视为一个整体扩展名.
///
/// 路径部分会被去掉, 与 URL 末段同样适用.
pub fn split_ext(name: &str) -> (&str, &str) {
    let base = name.rsplit('/').next().unwrap_or(name);
    if let Some(stem) = base.strip_suffix(".nii.gz") {
        return (stem, &base[stem.len()..]);
    }
    match base.rfind('.') {
        Some(0) | None => (base, ""),
        Some(i) => base.split_at(i),
    }
}

/// 原始下载文件名: 至少 4 位, 不足补 0.
#[inline]
pub fn original_filename(id: i64, ext: &str) -> String {
    format!("{id:04}{ext}")
}

/// 重采样文件名: 至少 6 位, 不足补 0. 负号占一位, 如 `-03360.nii.gz`.
#[inline]
pub fn resampled_filename(id: i64, ext: &str) -> String {
    format!("{id:06}{ext}")
}

/// 4D 文件拆分后第 `index` 个体数据的合成编号, 即 `"-{id}{index}"` 解析为整数.
///
/// 例如 `(336, 0) -> -3360`, `(12, 11) -> -1211`. 结果超出 `i64` 范围时返回 `None`.
pub fn split_id(id: i64, index: usize) -> Option<i64> {
    let v: i64 = format!("{}{index}", id.unsigned_abs()).parse().ok()?;
    Some(if id >= 0 { -v } else { v })
}

/// 数据根目录及其下的约定子目录.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// 以 `root` 为根目录.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 原始文件目录.
    #[inline]
    pub fn original_dir(&self) -> PathBuf {
        self.root.join(ORIGINAL_DIR)
    }

    /// 重采样文件目录.
    #[inline]
    pub fn resampled_dir(&self) -> PathBuf {
        self.root.join(RESAMPLED_DIR)
    }

    /// 缓存目录.
    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    /// 元数据表路径.
    #[inline]
    pub fn metadata_csv(&self) -> PathBuf {
        self.root.join(METADATA)
    }

    /// 编号为 `id` 的原始文件路径.
    #[inline]
    pub fn original_path(&self, id: i64, ext: &str) -> PathBuf {
        self.original_dir().join(original_filename(id, ext))
    }

    /// 编号为 `id` 的重采样文件路径.
    #[inline]
    pub fn resampled_path(&self, id: i64, ext: &str) -> PathBuf {
        self.resampled_dir().join(resampled_filename(id, ext))
    }

    /// 创建所有子目录. 已经存在时不报错.
    pub fn ensure_dirs(&self) -> NvResult<()> {
        for d in [self.original_dir(), self.resampled_dir(), self.cache_dir()] {
            fs::create_dir_all(d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ext() {
        assert_eq!(split_ext("a/b/zstat1.nii.gz"), ("zstat1", ".nii.gz"));
        assert_eq!(split_ext("http://x.org/media/t.nii"), ("t", ".nii"));
        assert_eq!(split_ext("img.v2.nii"), ("img.v2", ".nii"));
        assert_eq!(split_ext("noext"), ("noext", ""));
        assert_eq!(split_ext(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_filenames() {
        assert_eq!(original_filename(7, ".nii.gz"), "0007.nii.gz");
        assert_eq!(original_filename(12345, ".nii"), "12345.nii");
        assert_eq!(resampled_filename(7, ".nii.gz"), "000007.nii.gz");
        assert_eq!(resampled_filename(-3360, ".nii.gz"), "-03360.nii.gz");
    }

    #[test]
    fn test_split_id() {
        assert_eq!(split_id(336, 0), Some(-3360));
        assert_eq!(split_id(336, 4), Some(-3364));
        assert_eq!(split_id(12, 11), Some(-1211));
        assert_eq!(split_id(-5, 2), Some(52));
    }

    #[test]
    fn test_split_id_overflow() {
        assert_eq!(split_id(i64::MAX / 10, 7), Some(-(i64::MAX / 10 * 10 + 7)));
        assert_eq!(split_id(i64::MAX / 10, 8), None);
        assert_eq!(split_id(i64::MAX, 0), None);
        assert_eq!(split_id(i64::MIN, 0), None);
    }

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        layout.ensure_dirs().unwrap();
        assert!(layout.original_dir().is_dir());
        assert!(layout.cache_dir().is_dir());
        assert_eq!(
            layout.resampled_path(-3360, ".nii.gz"),
            dir.path().join("resampled").join("-03360.nii.gz")
        );
        assert_eq!(layout.metadata_csv(), dir.path().join("metadata.csv"));
    }
}
