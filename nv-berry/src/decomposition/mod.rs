//! 矩阵分解与降维.
//!
//! 特征分解由 `nalgebra` 的 `SymmetricEigen` 完成.

pub mod ica;
pub mod masker;
pub mod pca;
pub mod stats;
pub mod tsne;

pub use ica::{label_components, FastIca, IcaFit, LabelledComponent};
pub use masker::Masker;
pub use pca::{Pca, PcaFit};
pub use stats::{percentile, LabelEncoder};
pub use tsne::Tsne;
