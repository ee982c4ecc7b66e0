//! 数据准备: 灰质掩膜, 元数据与图像下载, 激活频率图.
//!
//! ```shell
//! cargo run --release -p grabber -- gm-mask
//! cargo run --release -p grabber -- fetch
//! cargo run --release -p grabber -- plot-overlay some_map.nii.gz -o some_map.png
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Axis;

use nv_berry::consts::filename::FREQ_MAP;
use nv_berry::metadata::fetch_images_with_collections;
use nv_berry::pipeline::build_grey_matter_mask;
use nv_berry::pipeline::open_first_volume;
use nv_berry::plot::{plot_frequency_map, plot_stat_map, save_figure, term_distribution};
use nv_berry::prelude::*;

/// 拼图中每个体素放大的倍数.
const SCALE: u32 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 输出 debug 级别日志.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 由 MNI 脑掩膜和 SPM 灰质概率图构建灰质掩膜.
    GmMask {
        /// 标准空间脑掩膜, 默认取 FSL 的 MNI152 2mm 掩膜.
        #[arg(long)]
        brain_mask: Option<PathBuf>,

        /// 灰质概率图, 默认取 `$SPM_DIR/tpm/grey.nii`.
        #[arg(long)]
        grey_matter: Option<PathBuf>,

        /// 输出文件.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 获取元数据, 解码术语, 下载并重采样全部图像, 计算激活频率图.
    Fetch {
        /// 数据目录, 默认取 `$NEUROVAULT_DATA_DIR`.
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// 灰质掩膜.
        #[arg(short, long)]
        mask: Option<PathBuf>,

        /// 重采样的目标模板, 默认取 FSL 的 MNI152 2mm 模板.
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// 在模板上绘制统计图.
    PlotOverlay {
        /// 统计图.
        map: PathBuf,

        /// 显示阈值, 绝对值不超过它的体素不着色.
        #[arg(long, default_value_t = 3.0)]
        threshold: f32,

        /// 图标题.
        #[arg(long, default_value = "")]
        title: String,

        /// 背景模板.
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// 输出 PNG.
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose);

    match args.command {
        Command::GmMask {
            brain_mask,
            grey_matter,
            output,
        } => gm_mask(brain_mask, grey_matter, output),
        Command::Fetch {
            data_dir,
            mask,
            template,
        } => fetch(data_dir, mask, template),
        Command::PlotOverlay {
            map,
            threshold,
            title,
            template,
            output,
        } => {
            let template = template.unwrap_or_else(utils::paths::mni_template);
            let template = open_first_volume(&template)
                .with_context(|| format!("failed to open template {}", template.display()))?;
            let stat = open_first_volume(&map)
                .with_context(|| format!("failed to open {}", map.display()))?;
            let img = plot_stat_map(&template, &stat, threshold, SCALE)?;
            save_figure(&img, &output, &title)?;
            Ok(())
        }
    }
}

fn gm_mask(
    brain_mask: Option<PathBuf>,
    grey_matter: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let brain_mask = brain_mask.unwrap_or_else(utils::paths::mni_brain_mask);
    let grey_matter = match grey_matter.or_else(utils::paths::grey_matter_template) {
        Some(p) => p,
        None => bail!("SPM directory not found, set $SPM_DIR or pass --grey-matter"),
    };
    let output = output.unwrap_or_else(utils::paths::gm_mask);

    let mask = build_grey_matter_mask(&brain_mask, &grey_matter, &output).with_context(|| {
        format!(
            "failed to build grey matter mask from {} and {}",
            brain_mask.display(),
            grey_matter.display()
        )
    })?;
    log::info!("{} voxels written to {}", mask.count(), output.display());
    Ok(())
}

fn fetch(data_dir: Option<PathBuf>, mask: Option<PathBuf>, template: Option<PathBuf>) -> Result<()> {
    let layout = utils::paths::layout(data_dir);
    layout
        .ensure_dirs()
        .with_context(|| format!("failed to create {}", layout.root().display()))?;
    let memory = Memory::new(layout.cache_dir());
    let fetcher = HttpFetcher::default();

    // 元数据.
    let mut table = memory
        .cache("fetch_images_with_collections", &(), || {
            fetch_images_with_collections(&fetcher)
        })
        .context("failed to fetch NeuroVault metadata")?;
    let n = table.len();
    table.exclude_ids(&FAULTY_IDS);
    table.retain_map_types(&STAT_MAP_TYPES);
    log::info!("{} of {n} images kept after filtering", table.len());
    if !table.ids_are_unique() {
        bail!("image ids are not unique");
    }

    // 术语解码.
    let mut terms = TermDecoder::new(&fetcher, Some(&memory)).decode_table(&table);
    let vocabulary = vectorize_terms(&mut terms);
    log::info!("{} decoded terms", vocabulary.len());

    utils::sep();
    for (name, count) in table.collection_name_counts() {
        println!("{count:>5}  {name}");
    }
    utils::sep();

    table.merge_terms(terms);

    // 下载并重采样.
    let template = template.unwrap_or_else(utils::paths::mni_template);
    let target = open_first_volume(&template)
        .with_context(|| format!("failed to open template {}", template.display()))?;
    let mut table = Downloader::new(&fetcher, &layout, &target).run(&table)?;
    table.exclude_ids(&NOT_Z_SCORES);
    table.exclude_ids(&BROKEN_IDS);
    table.save_csv(layout.metadata_csv())?;
    log::info!("{} images written to {}", table.len(), layout.metadata_csv().display());

    // 激活频率图.
    let mask = mask.unwrap_or_else(utils::paths::gm_mask);
    let mask = BinaryMask::open(&mask)
        .with_context(|| format!("failed to open mask {}, run `gm-mask` first", mask.display()))?;
    let freq = frequency_map(&table, &layout, &mask)?;
    freq.save(layout.root().join(FREQ_MAP))?;
    let img = plot_frequency_map(&target, &freq, SCALE)?;
    save_figure(
        &img,
        layout.root().join("freq_map.png"),
        "Percentage of activations (Z or T > 3)",
    )?;

    // 术语分布.
    let (names, m) = table.term_matrix();
    if names.is_empty() {
        log::warn!("no decoded terms, term distribution skipped");
    } else {
        let totals = m.sum_axis(Axis(0)).to_vec();
        term_distribution(&names, &totals, layout.root().join("terms.svg"))?;
    }
    Ok(())
}
