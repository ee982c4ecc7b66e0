//! 脑切片拼图: 灰度解剖模板 + 伪彩色统计图 + 色条.

use std::fs::OpenOptions;
use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use ndarray::{Array2, ArrayView3};
use plotters::prelude::{BitMapBackend, IntoDrawingArea, IntoFont, Text, BLACK};
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::consts::AXIAL_CUTS_MM;
use crate::data::{ColorMap, DisplayWindow};
use crate::{Affine, Interpolation, NvError, NvResult, SpatialAttr, Volume};

/// 面板之间的间隔 (像素).
const GAP: u32 = 4;

/// 色条宽度 (像素).
const COLORBAR_WIDTH: u32 = 16;

/// 标题栏高度 (像素).
const TITLE_HEIGHT: u32 = 28;

/// 标题记录文件名. 与图片位于同一目录.
pub const TITLES_CSV: &str = "titles.csv";

/// 切面.
#[derive(Debug, Clone, PartialEq)]
pub enum Cuts {
    /// 若干轴向切片, 参数为世界坐标 z (毫米).
    Axial(Vec<f64>),

    /// 经过某个世界坐标点的矢状、冠状、轴向三个切面.
    Ortho([f64; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plane {
    Sagittal,
    Coronal,
    Axial,
}

/// 叠加层的显示方式.
#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    /// 色表.
    pub cmap: ColorMap,

    /// 显示窗口.
    pub window: DisplayWindow,

    /// `|value| <= threshold` 的体素不显示.
    pub threshold: f32,
}

impl OverlayStyle {
    /// `hot` 色表, 窗口 `[0, vmax]`, 只显示正值.
    pub fn hot(vmax: f32) -> Option<Self> {
        Some(Self {
            cmap: ColorMap::Hot,
            window: DisplayWindow::new(0.0, vmax)?,
            threshold: 0.0,
        })
    }

    /// `cold_hot` 色表, 窗口 `[-bound, bound]`.
    pub fn cold_hot(bound: f32, threshold: f32) -> Option<Self> {
        Some(Self {
            cmap: ColorMap::ColdHot,
            window: DisplayWindow::symmetric(bound)?,
            threshold,
        })
    }
}

/// 从 `data` 中切出一个二维面板, 行从上到下, 列从左到右.
///
/// 轴向和冠状面的上方为 y / z 增大的方向; `flip_x` 为真时左右翻转.
fn slice_plane(data: ArrayView3<f32>, plane: Plane, index: usize, flip_x: bool) -> Array2<f32> {
    let (nx, ny, nz) = data.dim();
    let x_of = |c: usize| if flip_x { nx - 1 - c } else { c };
    match plane {
        Plane::Axial => Array2::from_shape_fn((ny, nx), |(r, c)| data[(x_of(c), ny - 1 - r, index)]),
        Plane::Coronal => Array2::from_shape_fn((nz, nx), |(r, c)| data[(x_of(c), index, nz - 1 - r)]),
        Plane::Sagittal => Array2::from_shape_fn((nz, ny), |(r, c)| data[(index, c, nz - 1 - r)]),
    }
}

#[inline]
fn clamp_index(v: f64, n: usize) -> usize {
    if v.is_finite() {
        num::clamp(v.round(), 0.0, (n - 1) as f64) as usize
    } else {
        n / 2
    }
}

/// 将切面换算为 (切面, 体素下标) 列表.
fn cut_indices(template: &Volume, inverse: &Affine, cuts: &Cuts) -> Vec<(Plane, usize)> {
    let (nx, ny, nz) = template.shape();
    match cuts {
        Cuts::Axial(zs) => {
            let center = template
                .affine()
                .apply([nx as f64 / 2.0, ny as f64 / 2.0, nz as f64 / 2.0]);
            zs.iter()
                .map(|&z| {
                    let v = inverse.apply([center[0], center[1], z]);
                    (Plane::Axial, clamp_index(v[2], nz))
                })
                .collect()
        }
        Cuts::Ortho(p) => {
            let [i, j, k] = inverse.apply(*p);
            vec![
                (Plane::Sagittal, clamp_index(i, nx)),
                (Plane::Coronal, clamp_index(j, ny)),
                (Plane::Axial, clamp_index(k, nz)),
            ]
        }
    }
}

fn fill_block(img: &mut RgbImage, x0: u32, y0: u32, scale: u32, rgb: [u8; 3]) {
    for dy in 0..scale {
        for dx in 0..scale {
            img.put_pixel(x0 + dx, y0 + dy, Rgb(rgb));
        }
    }
}

fn draw_colorbar(img: &mut RgbImage, x0: u32, cmap: ColorMap) {
    let h = img.height();
    for y in 0..h {
        let t = if h > 1 { 1.0 - y as f32 / (h - 1) as f32 } else { 1.0 };
        let rgb = cmap.rgb(t);
        for x in x0..(x0 + COLORBAR_WIDTH).min(img.width()) {
            img.put_pixel(x, y, Rgb(rgb));
        }
    }
}

/// 渲染拼图.
///
/// `overlay` 先被重采样到模板网格上. 每个体素放大为 `scale x scale` 个像素.
/// 有叠加层时在最右侧绘制色条.
pub fn render(
    template: &Volume,
    overlay: Option<(&Volume, &OverlayStyle)>,
    cuts: &Cuts,
    scale: u32,
) -> NvResult<RgbImage> {
    assert!(scale > 0, "放大倍数不能为 0");
    let inverse = template.affine().inverse().ok_or(NvError::SingularAffine)?;
    let flip_x = template.affine().matrix()[(0, 0)] < 0.0;
    let bg_window = template
        .finite_min_max()
        .and_then(|(lo, hi)| DisplayWindow::new(lo, hi))
        .unwrap_or(DisplayWindow::unit());

    let overlay = match overlay {
        Some((v, style)) => Some((v.resample_like(template, Interpolation::Continuous)?, *style)),
        None => None,
    };

    let panels = cut_indices(template, &inverse, cuts);
    if panels.is_empty() {
        return Err(NvError::Empty("cuts"));
    }
    let slices: Vec<(Array2<f32>, Option<Array2<f32>>)> = panels
        .iter()
        .map(|&(plane, index)| {
            let bg = slice_plane(template.data(), plane, index, flip_x);
            let ov = overlay
                .as_ref()
                .map(|(v, _)| slice_plane(v.data(), plane, index, flip_x));
            (bg, ov)
        })
        .collect();

    let panels_width: u32 = slices.iter().map(|(bg, _)| bg.ncols() as u32 * scale).sum();
    let bar = if overlay.is_some() { GAP + COLORBAR_WIDTH } else { 0 };
    let width = panels_width + GAP * (slices.len() as u32 - 1) + bar;
    let height = slices
        .iter()
        .map(|(bg, _)| bg.nrows() as u32 * scale)
        .max()
        .unwrap_or(0);

    let mut img = RgbImage::new(width, height);
    let mut x0 = 0;
    for (bg, ov) in &slices {
        for ((r, c), &t) in bg.indexed_iter() {
            let mut rgb = ColorMap::Gray.rgb(bg_window.eval_unit(t).unwrap_or(0.0));
            if let (Some(ov), Some((_, style))) = (ov, &overlay) {
                let v = ov[(r, c)];
                if v.is_finite() && v.abs() > style.threshold {
                    rgb = style.cmap.rgb(style.window.eval_unit(v).unwrap_or(0.0));
                }
            }
            fill_block(&mut img, x0 + c as u32 * scale, r as u32 * scale, scale, rgb);
        }
        x0 += bg.ncols() as u32 * scale + GAP;
    }
    if let Some((_, style)) = &overlay {
        draw_colorbar(&mut img, x0, style.cmap);
    }
    Ok(img)
}

/// 绝对值最大的体素的世界坐标. 没有有限值时返回 `None`.
pub fn peak_world(volume: &Volume) -> Option<[f64; 3]> {
    let (pos, _) = volume
        .data()
        .indexed_iter()
        .filter(|(_, v)| v.is_finite())
        .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))?;
    let (i, j, k) = pos;
    Some(volume.affine().apply([i as f64, j as f64, k as f64]))
}

/// 激活频率图: `hot` 色表, 窗口 `[0, max]`, 7 个轴向切片.
pub fn plot_frequency_map(template: &Volume, freq: &Volume, scale: u32) -> NvResult<RgbImage> {
    let vmax = freq
        .finite_min_max()
        .map(|(_, hi)| hi)
        .filter(|&hi| hi > 0.0)
        .ok_or(NvError::Empty("frequency map"))?;
    let style = OverlayStyle::hot(vmax).ok_or(NvError::Empty("frequency map"))?;
    render(
        template,
        Some((freq, &style)),
        &Cuts::Axial(AXIAL_CUTS_MM.to_vec()),
        scale,
    )
}

/// 统计图: `cold_hot` 色表, 对称窗口, 三个正交切面经过峰值.
pub fn plot_stat_map(
    template: &Volume,
    stat: &Volume,
    threshold: f32,
    scale: u32,
) -> NvResult<RgbImage> {
    let peak = peak_world(stat).ok_or(NvError::Empty("stat map"))?;
    let bound = stat
        .finite_min_max()
        .map(|(lo, hi)| lo.abs().max(hi.abs()))
        .unwrap_or(0.0);
    let style = OverlayStyle::cold_hot(bound, threshold).ok_or(NvError::Empty("stat map"))?;
    render(template, Some((stat, &style)), &Cuts::Ortho(peak), scale)
}

/// 在图片上方加一条白底标题栏, 标题居中.
///
/// 系统中找不到字体时只留下空白标题栏.
pub fn with_title(img: &RgbImage, title: &str) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut out = RgbImage::from_pixel(w, h + TITLE_HEIGHT, Rgb([255, 255, 255]));
    imageops::replace(&mut out, img, 0, TITLE_HEIGHT as i64);
    if let Err(e) = draw_title(&mut out, title) {
        log::warn!("cannot draw title `{title}`: {e}");
    }
    out
}

fn draw_title(img: &mut RgbImage, title: &str) -> NvResult<()> {
    let (w, h) = img.dimensions();
    let root = BitMapBackend::with_buffer(&mut **img, (w, h)).into_drawing_area();
    let style = ("sans-serif", 18)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let centre = ((w / 2) as i32, (TITLE_HEIGHT / 2) as i32);
    root.draw(&Text::new(title.to_owned(), centre, style))?;
    root.present()?;
    Ok(())
}

/// 保存带标题栏的图片, 并把 `(文件名, 标题)` 追加到同目录下的 `titles.csv`.
pub fn save_figure<P: AsRef<Path>>(img: &RgbImage, path: P, title: &str) -> NvResult<()> {
    let path = path.as_ref();
    with_title(img, title).save(path)?;
    log::info!("{}: {title}", path.display());

    let side = path.parent().unwrap_or(Path::new("")).join(TITLES_CSV);
    let fresh = !side.exists();
    let file = OpenOptions::new().create(true).append(true).open(&side)?;
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if fresh {
        w.write_record(["file", "title"])?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    w.write_record([name.as_str(), title])?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn template() -> Volume {
        Volume::new(
            Array3::from_shape_fn((10, 12, 8), |(x, _, _)| x as f32),
            Affine::identity(),
        )
    }

    #[test]
    fn test_axial_layout() {
        let img = render(&template(), None, &Cuts::Axial(vec![2.0, 5.0]), 2).unwrap();
        assert_eq!(img.width(), 2 * 10 * 2 + GAP);
        assert_eq!(img.height(), 12 * 2);
        // 模板沿 x 递增: 最左列最暗, 最右列最亮.
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(19, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_ortho_overlay_and_colorbar() {
        let t = template();
        let mut stat = Volume::zeros_like(&t);
        stat[(3, 4, 5)] = 10.0;
        let style = OverlayStyle::hot(10.0).unwrap();
        let img = render(&t, Some((&stat, &style)), &Cuts::Ortho([3.0, 4.0, 5.0]), 1).unwrap();

        // 矢状 (12 x 8), 冠状 (10 x 8), 轴向 (10 x 12), 色条.
        assert_eq!(img.width(), 12 + GAP + 10 + GAP + 10 + GAP + COLORBAR_WIDTH);
        assert_eq!(img.height(), 12);

        let axial_x0 = 12 + GAP + 10 + GAP;
        assert_eq!(img.get_pixel(axial_x0 + 3, 12 - 1 - 4).0, [255, 255, 255]);
        // 阈值以下仍显示模板.
        assert_eq!(img.get_pixel(axial_x0, 0).0, [0, 0, 0]);

        let bar_x = img.width() - 1;
        assert_eq!(img.get_pixel(bar_x, 0).0, ColorMap::Hot.rgb(1.0));
        assert_eq!(img.get_pixel(bar_x, 11).0, ColorMap::Hot.rgb(0.0));
    }

    #[test]
    fn test_peak_and_stat_map() {
        let t = template();
        let mut stat = Volume::zeros_like(&t);
        stat[(2, 3, 4)] = 1.0;
        stat[(7, 1, 1)] = -6.0;
        assert_eq!(peak_world(&stat), Some([7.0, 1.0, 1.0]));
        let img = plot_stat_map(&t, &stat, 0.5, 1).unwrap();
        assert!(img.width() > img.height());
        assert!(plot_stat_map(&t, &Volume::zeros_like(&t), 0.5, 1).is_err());
    }

    #[test]
    fn test_save_figure_titles() {
        let dir = tempfile::tempdir().unwrap();
        let img = render(&template(), None, &Cuts::Axial(vec![0.0]), 1).unwrap();
        save_figure(&img, dir.path().join("a.png"), "motor, hand").unwrap();
        save_figure(&img, dir.path().join("b.png"), "audio").unwrap();
        assert!(dir.path().join("a.png").exists());

        let saved = image::open(dir.path().join("a.png")).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (img.width(), img.height() + TITLE_HEIGHT));

        let text = std::fs::read_to_string(dir.path().join(TITLES_CSV)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["file,title", "a.png,\"motor, hand\"", "b.png,audio"]);
    }

    #[test]
    fn test_title_strip_above_image() {
        let img = render(&template(), None, &Cuts::Axial(vec![0.0, 4.0]), 3).unwrap();
        let titled = with_title(&img, "IC 1");
        assert_eq!(titled.width(), img.width());
        assert_eq!(titled.height(), img.height() + TITLE_HEIGHT);
        // 标题居中, 左上角保持白底.
        assert_eq!(titled.get_pixel(0, 0).0, [255, 255, 255]);
        for (x, y, p) in img.enumerate_pixels() {
            assert_eq!(titled.get_pixel(x, y + TITLE_HEIGHT), p);
        }
    }
}
