//! 统计图表 (SVG).

use std::path::Path;

use ndarray::ArrayView2;
use plotters::prelude::*;

use crate::{NvError, NvResult};

/// 条形图每一行的高度 (像素).
const BAR_ROW_HEIGHT: u32 = 18;

/// 第 `i` 类 (共 `n` 类) 的颜色: 色相均匀分布.
pub fn palette(i: usize, n: usize) -> HSLColor {
    let n = n.max(1);
    HSLColor(i as f64 / n as f64 * 0.85, 0.75, 0.45)
}

/// 术语分布的水平条形图. 每个术语一行, 条长为其总权重, 术语名写在条上.
pub fn term_distribution<P: AsRef<Path>>(names: &[String], totals: &[f64], path: P) -> NvResult<()> {
    if names.len() != totals.len() {
        return Err(NvError::ShapeMismatch {
            expected: vec![names.len()],
            found: vec![totals.len()],
        });
    }
    if names.is_empty() {
        return Err(NvError::Empty("term distribution"));
    }
    let n = names.len();
    let max = totals.iter().copied().filter(|v| v.is_finite()).fold(0.0, f64::max);
    let max = if max > 0.0 { max * 1.05 } else { 1.0 };

    let root = SVGBackend::new(path.as_ref(), (500, BAR_ROW_HEIGHT * n as u32 + 40)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0..max, 0.0..n as f64)?;

    chart.draw_series(totals.iter().enumerate().map(|(i, &v)| {
        let y = i as f64;
        Rectangle::new([(0.0, y + 0.1), (v.max(0.0), y + 0.9)], BLUE.mix(0.6).filled())
    }))?;
    chart.draw_series(names.iter().enumerate().map(|(i, name)| {
        Text::new(name.clone(), (max * 0.01, i as f64 + 0.75), ("sans-serif", 13).into_font())
    }))?;

    root.present()?;
    log::info!("term distribution written to {}", path.as_ref().display());
    Ok(())
}

fn padded_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(1e-9);
    (lo - pad)..(hi + pad)
}

/// 按类别着色的散点矩阵.
///
/// `data` 为 `n_samples x k`, `codes` 为每个样本的类别编号 (`< classes.len()`).
/// 对角线面板只写列号, 图例列出所有类别.
pub fn factor_scatter_matrix<P: AsRef<Path>>(
    data: ArrayView2<f64>,
    codes: &[usize],
    classes: &[String],
    legend_title: &str,
    path: P,
) -> NvResult<()> {
    let (n, k) = data.dim();
    if codes.len() != n {
        return Err(NvError::ShapeMismatch {
            expected: vec![n],
            found: vec![codes.len()],
        });
    }
    if k == 0 || n == 0 {
        return Err(NvError::Empty("scatter matrix"));
    }
    assert!(codes.iter().all(|&c| c < classes.len()), "类别编号越界");

    const CELL: u32 = 240;
    const LEGEND: u32 = 200;
    let side = CELL * k as u32;
    let root = SVGBackend::new(path.as_ref(), (side + LEGEND, side.max(40 + 18 * classes.len() as u32)))
        .into_drawing_area();
    root.fill(&WHITE)?;
    let (grid, legend) = root.split_horizontally(side);

    let ranges: Vec<_> = (0..k).map(|j| padded_range(data.column(j).iter().copied())).collect();
    for (cell_idx, cell) in grid.split_evenly((k, k)).iter().enumerate() {
        let (row, col) = (cell_idx / k, cell_idx % k);
        if row == col {
            cell.draw(&Text::new(
                format!("{col}"),
                (CELL as i32 / 2 - 6, CELL as i32 / 2 - 10),
                ("sans-serif", 24).into_font(),
            ))?;
            continue;
        }
        let mut chart = ChartBuilder::on(cell)
            .margin(6)
            .x_label_area_size(20)
            .y_label_area_size(30)
            .build_cartesian_2d(ranges[col].clone(), ranges[row].clone())?;
        chart
            .configure_mesh()
            .disable_mesh()
            .label_style(("sans-serif", 10))
            .draw()?;
        chart.draw_series((0..n).map(|i| {
            let color = palette(codes[i], classes.len());
            Circle::new((data[(i, col)], data[(i, row)]), 3, color.filled())
        }))?;
    }

    legend.draw(&Text::new(
        legend_title.to_owned(),
        (10, 10),
        ("sans-serif", 15).into_font(),
    ))?;
    for (i, name) in classes.iter().enumerate() {
        let y = 38 + 18 * i as i32;
        legend.draw(&Circle::new((16, y), 5, palette(i, classes.len()).filled()))?;
        legend.draw(&Text::new(name.clone(), (28, y - 7), ("sans-serif", 13).into_font()))?;
    }

    root.present()?;
    log::info!("scatter matrix written to {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_term_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.svg");
        let names = vec!["motor".to_owned(), "auditory".to_owned()];
        term_distribution(&names, &[1.5, 0.25], &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("auditory"));
        assert!(term_distribution(&names, &[1.0], &path).is_err());
    }

    #[test]
    fn test_factor_scatter_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pca.svg");
        let data = array![[0.0, 1.0, 2.0], [1.0, 0.5, -1.0], [2.0, 2.0, 0.0], [3.0, -1.0, 1.0]];
        let classes = vec!["12".to_owned(), "40".to_owned()];
        factor_scatter_matrix(data.view(), &[0, 1, 1, 0], &classes, "collection_id", &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("collection_id"));
        assert!(svg.contains("circle"));
        assert!(factor_scatter_matrix(data.view(), &[0, 1], &classes, "c", &path).is_err());
    }

    #[test]
    fn test_palette_is_distinct() {
        let a = palette(0, 3).rgb();
        let b = palette(1, 3).rgb();
        assert_ne!(a, b);
    }
}
