//! 运行时错误.

use thiserror::Error;

/// 库内统一的运行时错误.
#[derive(Debug, Error)]
pub enum NvError {
    /// 底层 I/O 错误.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// nifti 文件读写错误.
    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// HTTP 请求失败.
    #[error("HTTP request to `{url}` failed: {reason}")]
    Http {
        /// 请求地址.
        url: String,

        /// 失败原因.
        reason: String,
    },

    /// JSON 解析错误.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV 读写错误.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// 缓存编码 / 解码错误.
    #[error("cache encoding error: {0}")]
    Cache(#[from] bincode::Error),

    /// npy 读写错误.
    #[error("npy error: {0}")]
    Npy(String),

    /// 图像编码错误.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// 图表绘制错误.
    #[error("plot error: {0}")]
    Plot(String),

    /// 体数据维度不受支持. 参数为实际维度.
    #[error("unsupported volume dimensionality: {0}")]
    Dimensionality(usize),

    /// 仿射变换不可逆, 无法重采样.
    #[error("affine transform is singular")]
    SingularAffine,

    /// 两个体数据 (或矩阵) 形状不一致.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 期望形状.
        expected: Vec<usize>,

        /// 实际形状.
        found: Vec<usize>,
    },

    /// 输入为空, 无法计算. 参数说明了上下文.
    #[error("empty input: {0}")]
    Empty(&'static str),

    /// 元数据格式不符合预期.
    #[error("malformed metadata: {0}")]
    Metadata(String),
}

/// 库内统一的运行时结果.
pub type NvResult<T> = Result<T, NvError>;

impl From<ndarray_npy::WriteNpyError> for NvError {
    fn from(e: ndarray_npy::WriteNpyError) -> Self {
        Self::Npy(e.to_string())
    }
}

impl From<ndarray_npy::ReadNpyError> for NvError {
    fn from(e: ndarray_npy::ReadNpyError) -> Self {
        Self::Npy(e.to_string())
    }
}

impl<E: std::error::Error + Send + Sync> From<plotters::drawing::DrawingAreaErrorKind<E>> for NvError {
    fn from(e: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        Self::Plot(e.to_string())
    }
}
