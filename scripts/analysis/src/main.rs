//! 对重采样后的图像做分析: ICA 成分与术语标注, 关键词组平均图, PCA / t-SNE 散点矩阵.
//!
//! 需要先运行 `grabber fetch`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array2;

use nv_berry::consts::filename::ICA;
use nv_berry::consts::threshold::BRAIN_MASK;
use nv_berry::decomposition::ica::N_TERMS_PER_COMPONENT;
use nv_berry::decomposition::tsne::center_columns;
use nv_berry::decomposition::label_components;
use nv_berry::pipeline::open_first_volume;
use nv_berry::plot::{factor_scatter_matrix, plot_stat_map, save_figure};
use nv_berry::prelude::*;
use nv_berry::text::{extract_documents, vectorize};

/// 拼图中每个体素放大的倍数.
const SCALE: u32 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 输出 debug 级别日志.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 数据目录, 默认取 `$NEUROVAULT_DATA_DIR`.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// FastICA 分解, 用解码术语标注每个成分并作图.
    Ica {
        /// 成分个数.
        #[arg(short = 'k', long, default_value_t = 20)]
        n_components: usize,

        /// 灰质掩膜.
        #[arg(short, long)]
        mask: Option<PathBuf>,

        /// 背景模板.
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// 全部图像及各关键词组的平均激活图.
    MeanMaps {
        /// 灰质掩膜.
        #[arg(short, long)]
        mask: Option<PathBuf>,

        /// 输出目录, 默认为数据目录.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// PCA 和 t-SNE 嵌入, 按集合着色.
    Pca {
        /// 标准空间脑掩膜.
        #[arg(short, long)]
        brain_mask: Option<PathBuf>,

        /// t-SNE 困惑度.
        #[arg(long, default_value_t = 5.0)]
        perplexity: f64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose);
    log::info!("running on {} cpus", utils::cpus());

    let layout = utils::paths::layout(args.data_dir);
    let table = MetadataTable::open_csv(layout.metadata_csv()).with_context(|| {
        format!(
            "failed to open {}, run `grabber fetch` first",
            layout.metadata_csv().display()
        )
    })?;
    if table.is_empty() {
        bail!("no image in {}", layout.metadata_csv().display());
    }
    let memory = Memory::new(layout.cache_dir());

    match args.command {
        Command::Ica {
            n_components,
            mask,
            template,
        } => ica(&layout, &memory, &table, n_components, mask, template),
        Command::MeanMaps { mask, output } => {
            let output = output.unwrap_or_else(|| layout.root().to_owned());
            mean(&layout, &memory, &table, mask, &output)
        }
        Command::Pca {
            brain_mask,
            perplexity,
        } => embed(&layout, &memory, table, brain_mask, perplexity),
    }
}

/// 表中各图像重采样文件的路径.
fn resampled_paths(layout: &DataLayout, table: &MetadataTable) -> Vec<PathBuf> {
    table
        .iter()
        .map(|r| layout.resampled_path(r.image_id(), r.image.ext()))
        .collect()
}

/// 读取掩膜矩阵, 确保每张图恰好占一行.
fn masked_matrix(
    layout: &DataLayout,
    memory: &Memory,
    table: &MetadataTable,
    masker: &Masker,
) -> Result<Array2<f64>> {
    let x = masker
        .transform_paths_cached(&resampled_paths(layout, table), memory)
        .context("failed to load resampled images")?;
    if x.nrows() != table.len() {
        bail!(
            "{} rows loaded for {} images, some files are still 4D",
            x.nrows(),
            table.len()
        );
    }
    log::info!("masked matrix: {} images x {} voxels", x.nrows(), x.ncols());
    Ok(x)
}

fn open_masker(mask: Option<PathBuf>) -> Result<Masker> {
    let mask = mask.unwrap_or_else(utils::paths::gm_mask);
    Masker::open(&mask)
        .with_context(|| format!("failed to open mask {}, run `grabber gm-mask` first", mask.display()))
}

fn ica(
    layout: &DataLayout,
    memory: &Memory,
    table: &MetadataTable,
    n_components: usize,
    mask: Option<PathBuf>,
    template: Option<PathBuf>,
) -> Result<()> {
    let masker = open_masker(mask)?;
    let x = masked_matrix(layout, memory, table, &masker)?;

    let fit = FastIca::new(n_components).fit(x.view())?;
    log::info!("FastICA: {} components, {} iterations", fit.sources.nrows(), fit.n_iter);
    masker
        .inverse_transform_rows(fit.sources.view())?
        .save(layout.root().join(ICA))?;

    let (names, term_matrix) = table.term_matrix();
    if names.len() < N_TERMS_PER_COMPONENT {
        log::warn!("only {} decoded terms available", names.len());
    }
    let labelled = label_components(&fit, term_matrix.view(), &names)?;

    let template = template.unwrap_or_else(utils::paths::mni_template);
    let template = open_first_volume(&template)
        .with_context(|| format!("failed to open template {}", template.display()))?;
    let out_dir = layout.root().join("ica_maps");
    fs::create_dir_all(&out_dir)?;
    for (i, c) in labelled.iter().enumerate() {
        let map = masker.inverse_transform(c.map.view());
        let img = plot_stat_map(&template, &map, c.threshold as f32, SCALE)?;
        save_figure(&img, out_dir.join(format!("component_{i}_ic.png")), &c.title())?;
    }
    utils::sep();
    Ok(())
}

fn mean(
    layout: &DataLayout,
    memory: &Memory,
    table: &MetadataTable,
    mask: Option<PathBuf>,
    output: &Path,
) -> Result<()> {
    let masker = open_masker(mask)?;
    let x = masked_matrix(layout, memory, table, &masker)?;
    let counts = vectorize(&extract_documents(table, false));

    let maps = mean_maps(x.view(), &counts, &masker)?;
    fs::create_dir_all(output)?;
    maps.save(output)
        .with_context(|| format!("failed to write mean maps to {}", output.display()))?;
    log::info!("{} group maps written to {}", maps.groups.len(), output.display());
    Ok(())
}

fn embed(
    layout: &DataLayout,
    memory: &Memory,
    mut table: MetadataTable,
    brain_mask: Option<PathBuf>,
    perplexity: f64,
) -> Result<()> {
    let brain_mask = brain_mask.unwrap_or_else(utils::paths::mni_brain_mask);
    let mask = open_first_volume(&brain_mask)
        .with_context(|| format!("failed to open brain mask {}", brain_mask.display()))?
        .binarize(|v| v > BRAIN_MASK);
    let masker = Masker::new(mask)?;

    table.exclude_ids(&FAULTY_IDS);
    let x = masked_matrix(layout, memory, &table, &masker)?;

    let collections = table.collection_ids();
    let encoder = LabelEncoder::fit(&collections);
    let codes = encoder
        .transform(&collections)
        .context("collection id missing from the encoder")?;
    let classes: Vec<String> = encoder.classes().iter().map(i64::to_string).collect();
    log::info!("{} collections", classes.len());

    let pca = Pca::new(3).fit(x.view())?;
    factor_scatter_matrix(
        pca.scores.view(),
        &codes,
        &classes,
        "collection_id",
        layout.root().join("pca.svg"),
    )?;

    let mut y = Tsne::new(perplexity).fit_transform(x.view())?;
    center_columns(&mut y);
    factor_scatter_matrix(
        y.view(),
        &codes,
        &classes,
        "collection_id",
        layout.root().join("tsne.svg"),
    )?;
    Ok(())
}
