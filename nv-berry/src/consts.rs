//! 通用常量.

/// 阈值.
pub mod threshold {
    /// 灰质概率图的二值化阈值.
    pub const GREY_MATTER: f32 = 0.33;

    /// 标准空间脑掩膜的二值化阈值.
    pub const BRAIN_MASK: f32 = 1e-13;

    /// 统计量绝对值超过该值时视为 "显著激活".
    pub const ACTIVATION: f32 = 3.0;

    /// 灰质掩膜闭运算的迭代次数.
    pub const CLOSING_ITERATIONS: usize = 2;

    /// 掩膜外插值的迭代次数.
    pub const EXTRAPOLATION_ITERATIONS: usize = 3;

    /// 检测背景值时取的边缘厚度 (体素).
    pub const BACKGROUND_BORDER: usize = 2;
}

/// 手工整理的排除列表.
pub mod exclusion {
    /// 不是脑图 (96, 97, 98), 质量很差 (338, 339), 或与 336 重复 (335).
    pub const FAULTY_IDS: [i64; 6] = [96, 97, 98, 338, 339, 335];

    /// 4D 拆分后得到的平均图, 不是 Z 分数.
    pub const NOT_Z_SCORES: [i64; 3] = [-3360, -3362, -3364];

    /// 明显不是 Z 图, 或者图像本身有问题.
    pub const BROKEN_IDS: [i64; 5] = [1202, 1163, 1931, 1101, 1099];

    /// 保留的统计图类型.
    pub const STAT_MAP_TYPES: [&str; 3] = ["Z", "F", "T"];
}

/// 远程接口.
pub mod url {
    /// NeuroVault 集合元数据.
    pub const NEUROVAULT_COLLECTIONS: &str = "http://neurovault.org/api/collections/?format=json";

    /// NeuroVault 图像元数据.
    pub const NEUROVAULT_IMAGES: &str = "http://neurovault.org/api/images/?format=json";

    /// NeuroSynth 解码接口前缀, 后接 NeuroVault 图像编号.
    pub const NEUROSYNTH_DECODE: &str = "http://neurosynth.org/decode/data/?neurovault=";
}

/// 约定的文件名.
pub mod filename {
    /// 灰质掩膜.
    pub const GM_MASK: &str = "gm_mask.nii.gz";

    /// 合并后的元数据表.
    pub const METADATA: &str = "metadata.csv";

    /// 激活频率图.
    pub const FREQ_MAP: &str = "freq_map.nii.gz";

    /// 全部图像的平均激活图.
    pub const MEAN_ALL: &str = "all.nii.gz";

    /// ICA 成分 (4D).
    pub const ICA: &str = "ica.nii.gz";

    /// 原始下载文件所在子目录.
    pub const ORIGINAL_DIR: &str = "original";

    /// 重采样文件所在子目录.
    pub const RESAMPLED_DIR: &str = "resampled";

    /// 缓存子目录.
    pub const CACHE_DIR: &str = "cache";

    /// MNI152 2mm 模板.
    pub const MNI_TEMPLATE: &str = "MNI152_T1_2mm.nii.gz";

    /// MNI152 2mm 脑掩膜.
    pub const MNI_BRAIN_MASK: &str = "MNI152_T1_2mm_brain_mask.nii.gz";
}

/// 解码术语在元数据表中的列名前缀.
pub const TERM_PREFIX: &str = "neurosynth decoding ";

/// 激活频率图的轴向切片位置 (毫米), 等价于 `linspace(-30, 60, 7)`.
pub const AXIAL_CUTS_MM: [f64; 7] = [-30.0, -15.0, 0.0, 15.0, 30.0, 45.0, 60.0];
