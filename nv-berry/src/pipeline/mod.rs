//! 各处理阶段: 灰质掩膜, 下载与重采样, 体素级聚合.

pub mod aggregate;
pub mod download;
pub mod mask;

pub use aggregate::{frequency_map, mean_maps, MeanMaps};
pub use download::{fill_outside_background, Downloader, Resampled};
pub use mask::{build_grey_matter_mask, grey_matter_mask, open_first_volume};
