//! 外部数据的位置. 环境变量优先, 其次为约定的默认位置.

use std::env;
use std::path::PathBuf;

use nv_berry::consts::filename::{GM_MASK, MNI_BRAIN_MASK, MNI_TEMPLATE};
use nv_berry::dataset::DataLayout;

/// 读取非空环境变量.
fn non_empty_var(key: &str) -> Option<PathBuf> {
    env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// SPM 安装目录.
///
/// 1. 若环境变量 `$SPM_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/spm12`.
pub fn spm_dir() -> Option<PathBuf> {
    non_empty_var("SPM_DIR").or_else(|| dirs::home_dir().map(|h| h.join("spm12")))
}

/// SPM 灰质概率图 `<spm>/tpm/grey.nii`.
pub fn grey_matter_template() -> Option<PathBuf> {
    spm_dir().map(|d| d.join("tpm").join("grey.nii"))
}

/// FSL 标准空间模板目录.
///
/// 1. `$FSL_STANDARD_DIR`;
/// 2. `$FSLDIR/data/standard`;
/// 3. `/usr/share/fsl/data/standard`.
pub fn fsl_standard_dir() -> PathBuf {
    non_empty_var("FSL_STANDARD_DIR")
        .or_else(|| non_empty_var("FSLDIR").map(|d| d.join("data").join("standard")))
        .unwrap_or_else(|| PathBuf::from("/usr/share/fsl/data/standard"))
}

/// MNI152 2mm 模板.
#[inline]
pub fn mni_template() -> PathBuf {
    fsl_standard_dir().join(MNI_TEMPLATE)
}

/// MNI152 2mm 脑掩膜.
#[inline]
pub fn mni_brain_mask() -> PathBuf {
    fsl_standard_dir().join(MNI_BRAIN_MASK)
}

/// 数据根目录: `$NEUROVAULT_DATA_DIR`, 否则 `/tmp/neurovault_analysis`.
pub fn data_dir() -> PathBuf {
    non_empty_var("NEUROVAULT_DATA_DIR")
        .unwrap_or_else(|| env::temp_dir().join("neurovault_analysis"))
}

/// 数据根目录的布局. `dir` 非空时优先使用.
pub fn layout(dir: Option<PathBuf>) -> DataLayout {
    DataLayout::new(dir.unwrap_or_else(data_dir))
}

/// 灰质掩膜的默认位置 (当前目录下).
#[inline]
pub fn gm_mask() -> PathBuf {
    PathBuf::from(GM_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_locations() {
        assert!(mni_template().ends_with("MNI152_T1_2mm.nii.gz"));
        assert!(mni_brain_mask().ends_with("MNI152_T1_2mm_brain_mask.nii.gz"));
        assert_eq!(gm_mask(), PathBuf::from("gm_mask.nii.gz"));
        let l = layout(Some(PathBuf::from("/data/nv")));
        assert_eq!(l.root(), std::path::Path::new("/data/nv"));
        assert!(layout(None).root().ends_with("neurovault_analysis") || env::var("NEUROVAULT_DATA_DIR").is_ok());
    }
}
