#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 NeuroVault 统计图谱 (statistical maps) 的元数据获取、
//! 下载与重采样、灰质掩膜构建、体素级聚合, 以及 ICA / PCA / t-SNE 分解与可视化.
//!
//! 各个阶段都是一次性的数据变换, 通过磁盘上的中间文件串联起来;
//! `scripts/*` 下的可执行程序负责按顺序调用它们.
//!
//! # 注意
//!
//! 1. 所有体数据均按照 nifti 的轴顺序 `(x, y, z[, t])` 保存, 不做转置.
//! 2. 数值上不追求与其他科学计算库的结果逐位一致.
//!
//! # 开发计划
//!
//! ### 体数据读写与仿射变换 ✅
//!
//! 读取任意 NIfTI-1 文件, 优先使用 sform, 其次 qform, 最后退化为 pixdim 缩放.
//!
//! 实现位于 `nv-berry/src/data`.
//!
//! ### 重采样 ✅
//!
//! 将任意体数据按目标仿射变换和形状重采样 (三线性插值 / 最近邻).
//!
//! 实现位于 `nv-berry/src/data/resample.rs`.
//!
//! ### 三维二值形态学 & 灰质掩膜 ✅
//!
//! 6-邻域十字结构元的腐蚀、膨胀、开、闭运算; 背景掩膜的自动检测与掩膜外插值.
//!
//! 实现位于 `nv-berry/src/data/morph_3d.rs`, `nv-berry/src/data/background.rs`.
//!
//! ### 元数据获取与合并 ✅
//!
//! NeuroVault 图像 / 集合元数据的获取 (支持分页)、左连接、排除列表、CSV 持久化.
//!
//! 实现位于 `nv-berry/src/metadata`.
//!
//! ### 下载、重采样与 4D 拆分 ✅
//!
//! 实现位于 `nv-berry/src/pipeline/download.rs`.
//!
//! ### 激活频率图 & 平均激活图 ✅
//!
//! 实现位于 `nv-berry/src/pipeline/aggregate.rs`.
//!
//! ### NeuroSynth 术语解码 ✅
//!
//! 实现位于 `nv-berry/src/decode.rs`.
//!
//! ### 关键词组文本向量化 ✅
//!
//! 实现位于 `nv-berry/src/text.rs`.
//!
//! ### ICA / PCA / t-SNE 的纯 Rust 实现 ✅
//!
//! 特征分解使用 Jacobi 迭代, 不依赖系统 BLAS/LAPACK.
//!
//! 实现位于 `nv-berry/src/decomposition`.
//!
//! ### 可视化 ✅
//!
//! 脑切片拼图 (`image`) 与统计图表 (`plotters`, SVG).
//!
//! 实现位于 `nv-berry/src/plot`.
//!
//! ### 磁盘缓存 ✅
//!
//! 以参数哈希为键的函数结果缓存, 避免重复联网.
//!
//! 实现位于 `nv-berry/src/cache.rs`.

/// 三维体素索引 `(x, y, z)`.
pub type Idx3d = (usize, usize, usize);

/// 三维形状 `(x, y, z)`.
pub type Shape3d = (usize, usize, usize);

/// 体数据基础结构: 读写, 仿射变换, 重采样, 形态学.
pub mod data;

pub use data::{
    Affine, BinaryMask, Interpolation, LoadedImage, SpatialAttr, Volume, VolumeSeries,
};

pub mod cache;
pub mod consts;
pub mod dataset;
pub mod decode;
pub mod decomposition;
mod error;
pub mod metadata;
pub mod pipeline;
pub mod plot;
pub mod prelude;
pub mod text;

pub use error::{NvError, NvResult};
