//! 🧠欢迎光临🧪
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Shape3d};

pub use crate::data::{
    open_image, Affine, BinaryMask, ColorMap, DisplayWindow, Interpolation, LoadedImage,
    SpatialAttr, Volume, VolumeSeries,
};
pub use crate::{NvError, NvResult};

pub use crate::cache::Memory;
pub use crate::consts::exclusion::{BROKEN_IDS, FAULTY_IDS, NOT_Z_SCORES, STAT_MAP_TYPES};
pub use crate::dataset::{image_loader, original_filename, resampled_filename, DataLayout};
pub use crate::decode::{vectorize_terms, TermDecoder};
pub use crate::metadata::{Fetch, HttpFetcher, MetadataRow, MetadataTable};

pub use crate::decomposition::{FastIca, LabelEncoder, Masker, Pca, Tsne};
pub use crate::pipeline::{frequency_map, grey_matter_mask, mean_maps, Downloader};
