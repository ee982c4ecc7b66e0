//! 可视化: 脑切片拼图 (PNG) 与统计图表 (SVG).

pub mod chart;
pub mod mosaic;

pub use chart::{factor_scatter_matrix, term_distribution};
pub use mosaic::{
    peak_world, plot_frequency_map, plot_stat_map, render, save_figure, with_title, Cuts,
    OverlayStyle,
};
