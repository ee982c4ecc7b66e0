//! 元数据自由文本的关键词组向量化.
//!
//! 每个文档由图像 (可选再加上集合) 的描述性字段拼接而成, 然后对七个固定的
//! 关键词组分别统计词出现次数. 文档中的空白都被规整为两个空格, 因此只需
//! 查找 `" word "` 即可实现整词匹配, 相邻的词也不会互相干扰.

use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::metadata::{MetadataRow, MetadataTable};

/// 关键词组个数.
pub const N_GROUPS: usize = 7;

/// 关键词组: (组名, 组内词).
pub const GROUPS: [(&str, &[&str]); N_GROUPS] = [
    (
        "language",
        &[
            "semantic",
            "linguistic",
            "language",
            "word",
            "words",
            "reading",
            "verb",
            "voice",
        ],
    ),
    ("audio", &["audio", "auditory", "audition", "listening", "tone"]),
    ("motor", &["motor", "button", "hand", "finger", "foot"]),
    ("hand", &["button", "hand", "finger"]),
    (
        "visual terms",
        &[
            "imagery", "color", "photo", "visual", "visually", "viewing", "pictures",
        ],
    ),
    ("secondary visual", &["checkerboard", "scrambled"]),
    (
        "objects",
        &["shoe", "chair", "bottle", "scissors", "house", "cat"],
    ),
];

/// 图像字段重复的次数 (启用集合字段时), 用以提高图像自身信息的权重.
const IMAGE_FIELD_REPEAT: usize = 3;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_.;,:!?'()]").unwrap());
static CONTRAST_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(-|>|vs).*$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// 所有组名, 按 `GROUPS` 的顺序.
pub fn group_names() -> impl ExactSizeIterator<Item = &'static str> {
    GROUPS.iter().map(|(name, _)| *name)
}

/// 规整单个字段: 去掉 `.nii` / `.gz`, 转小写, 两端补空格, 标点替换为空格.
///
/// 空字段 (即缺失值) 返回空串.
pub fn to_str(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let value = value.replace(".nii", "").replace(".gz", "").to_lowercase();
    PUNCTUATION
        .replace_all(&format!(" {value} "), " ")
        .into_owned()
}

/// 在 `to_str` 的基础上, 去掉第一个 `-`, `>` 或 `vs` 及其之后的内容.
///
/// 对比定义常写作 `A > B` 或 `A vs B`, 只保留前半部分.
fn to_str_head(value: &str) -> String {
    CONTRAST_TAIL.replace(&to_str(value), " ").into_owned()
}

/// 由一行元数据构造文档.
pub fn extract_document(row: &MetadataRow, with_collection: bool) -> String {
    let image = &row.image;
    let mut parts: Vec<String> = [
        &image.description,
        &image.name,
        &image.contrast_definition,
        &image.contrast_definition_cogatlas,
    ]
    .iter()
    .map(|f| to_str_head(f))
    .collect();

    if with_collection {
        parts = std::iter::repeat(parts)
            .take(IMAGE_FIELD_REPEAT)
            .flatten()
            .collect();
        parts.push(to_str(row.collection_description()));
        parts.push(to_str(row.collection_name()));
    }

    let doc = parts.join(" ");
    format!(" {} ", WHITESPACE.replace_all(&doc, "  "))
}

/// 对表中每一行构造文档.
pub fn extract_documents(table: &MetadataTable, with_collection: bool) -> Vec<String> {
    table
        .iter()
        .map(|r| extract_document(r, with_collection))
        .collect()
}

/// 单个文档在各个关键词组上的计数.
pub fn group_counts(doc: &str) -> [usize; N_GROUPS] {
    GROUPS.map(|(_, words)| {
        words
            .iter()
            .map(|w| doc.matches(&format!(" {w} ")).count())
            .sum()
    })
}

/// `n_docs x n_groups` 的计数矩阵.
pub fn vectorize<S: AsRef<str>>(documents: &[S]) -> Array2<usize> {
    let mut x = Array2::zeros((documents.len(), N_GROUPS));
    for (mut row, doc) in x.rows_mut().into_iter().zip(documents) {
        for (v, c) in row.iter_mut().zip(group_counts(doc.as_ref())) {
            *v = c;
        }
    }
    x
}
