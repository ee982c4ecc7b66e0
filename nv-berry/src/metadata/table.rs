//! 合并后的元数据表.
//!
//! 每行对应一张图像, 附带所属集合的信息以及 NeuroSynth 解码得到的术语权重.
//! 表在各个阶段之间以 CSV 形式传递.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{CollectionRecord, ImageRecord};
use crate::consts::TERM_PREFIX;
use crate::{NvError, NvResult};

/// 元数据表中的一行.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    /// 图像部分.
    pub image: ImageRecord,

    /// 集合部分. 左连接时找不到对应集合则为 `None`.
    pub collection: Option<CollectionRecord>,

    /// 解码术语 -> 相关系数. 缺失的术语视为 0.
    pub terms: BTreeMap<String, f64>,
}

impl MetadataRow {
    /// 图像编号.
    #[inline]
    pub fn image_id(&self) -> i64 {
        self.image.image_id
    }

    /// 集合名称, 没有集合时为空串.
    #[inline]
    pub fn collection_name(&self) -> &str {
        self.collection.as_ref().map_or("", |c| c.name.as_str())
    }

    /// 集合描述, 没有集合时为空串.
    #[inline]
    pub fn collection_description(&self) -> &str {
        self.collection.as_ref().map_or("", |c| c.description.as_str())
    }
}

/// 元数据表.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataTable {
    rows: Vec<MetadataRow>,
}

/// CSV 中的固定列.
const FIXED_COLUMNS: [&str; 13] = [
    "image_id",
    "collection_id",
    "url_image",
    "file",
    "map_type",
    "name_image",
    "description_image",
    "contrast_definition",
    "contrast_definition_cogatlas",
    "url_collection",
    "DOI",
    "name_collection",
    "description_collection",
];

impl MetadataTable {
    /// 由若干行构建.
    pub fn new(rows: Vec<MetadataRow>) -> Self {
        Self { rows }
    }

    /// 以 `collection_id` 将图像左连接到集合.
    ///
    /// 结果行数与 `images` 一致, 顺序也保持不变.
    pub fn join(images: Vec<ImageRecord>, collections: Vec<CollectionRecord>) -> Self {
        let by_id: HashMap<i64, CollectionRecord> = collections
            .into_iter()
            .map(|c| (c.collection_id, c))
            .collect();
        let rows = images
            .into_iter()
            .map(|image| MetadataRow {
                collection: by_id.get(&image.collection_id).cloned(),
                image,
                terms: BTreeMap::new(),
            })
            .collect();
        Self { rows }
    }

    /// 所有行.
    #[inline]
    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空表.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按顺序迭代所有行.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, MetadataRow> {
        self.rows.iter()
    }

    /// 所有图像编号.
    pub fn image_ids(&self) -> Vec<i64> {
        self.rows.iter().map(MetadataRow::image_id).collect()
    }

    /// 所有行的集合编号.
    pub fn collection_ids(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.image.collection_id).collect()
    }

    /// 去除编号位于 `ids` 中的行. 返回去除的行数.
    pub fn exclude_ids(&mut self, ids: &[i64]) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| !ids.contains(&r.image_id()));
        before - self.rows.len()
    }

    /// 仅保留统计图类型位于 `types` 中的行. 返回去除的行数.
    pub fn retain_map_types(&mut self, types: &[&str]) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| types.contains(&r.image.map_type.as_str()));
        before - self.rows.len()
    }

    /// 将编号为 `id` 的行替换为 `children`, 子行依次追加到表尾.
    ///
    /// 用于 4D 文件拆分. 若编号不存在, 仅追加.
    pub fn replace_with_children(&mut self, id: i64, children: Vec<MetadataRow>) {
        self.rows.retain(|r| r.image_id() != id);
        self.rows.extend(children);
    }

    /// 按编号查找行.
    pub fn get(&self, id: i64) -> Option<&MetadataRow> {
        self.rows.iter().find(|r| r.image_id() == id)
    }

    /// 编号是否唯一.
    pub fn ids_are_unique(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows.iter().all(|r| seen.insert(r.image_id()))
    }

    /// 集合名称的出现次数, 按次数降序 (次数相同时按名称升序).
    pub fn collection_name_counts(&self) -> Vec<(String, usize)> {
        self.rows
            .iter()
            .filter(|r| r.collection.is_some())
            .map(|r| r.collection_name().to_owned())
            .counts()
            .into_iter()
            .sorted_by(|(na, ca), (nb, cb)| cb.cmp(ca).then_with(|| na.cmp(nb)))
            .collect()
    }

    /// 按 `image_id` 内连接术语表: 没有术语的行被去除.
    pub fn merge_terms(&mut self, mut terms: HashMap<i64, BTreeMap<String, f64>>) {
        self.rows.retain_mut(|r| match terms.remove(&r.image_id()) {
            Some(t) => {
                r.terms = t;
                true
            }
            None => false,
        });
    }

    /// 所有出现过的术语, 按字典序.
    pub fn term_names(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|r| r.terms.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    /// `n_images x n_terms` 的术语矩阵, 列顺序同 `term_names`.
    ///
    /// 缺失值取 0; 负相关意味着该术语不在图中出现, 同样截断为 0.
    pub fn term_matrix(&self) -> (Vec<String>, Array2<f64>) {
        let names = self.term_names();
        let mut m = Array2::<f64>::zeros((self.rows.len(), names.len()));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, name) in names.iter().enumerate() {
                let v = row.terms.get(name).copied().unwrap_or(0.0);
                m[(i, j)] = if v.is_finite() { v.max(0.0) } else { 0.0 };
            }
        }
        (names, m)
    }

    /// 写出 CSV. 固定列在前, 术语列 (`neurosynth decoding <term>`) 在后.
    pub fn write_csv<W: Write>(&self, w: W) -> NvResult<()> {
        let names = self.term_names();
        let mut wtr = csv::Writer::from_writer(w);
        let header = FIXED_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(names.iter().map(|t| format!("{TERM_PREFIX}{t}")));
        wtr.write_record(header)?;

        for r in &self.rows {
            let c = r.collection.as_ref();
            let c_field = |f: fn(&CollectionRecord) -> &str| c.map_or("", f).to_owned();
            let mut rec = vec![
                r.image.image_id.to_string(),
                r.image.collection_id.to_string(),
                r.image.url.clone(),
                r.image.file.clone(),
                r.image.map_type.clone(),
                r.image.name.clone(),
                r.image.description.clone(),
                r.image.contrast_definition.clone(),
                r.image.contrast_definition_cogatlas.clone(),
                c_field(|c| c.url.as_str()),
                c_field(|c| c.doi.as_str()),
                c_field(|c| c.name.as_str()),
                c_field(|c| c.description.as_str()),
            ];
            rec.extend(
                names
                    .iter()
                    .map(|t| r.terms.get(t).map_or_else(String::new, |v| v.to_string())),
            );
            wtr.write_record(&rec)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// 读取 `write_csv` 写出的 CSV. 术语列中的空单元格视为缺失.
    ///
    /// `url_collection` 为空的行视为没有集合.
    pub fn read_csv<R: Read>(r: R) -> NvResult<Self> {
        let mut rdr = csv::Reader::from_reader(r);
        let headers = rdr.headers()?.clone();
        let col = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| NvError::Metadata(format!("missing column `{name}`")))
        };
        let idx: Vec<usize> = FIXED_COLUMNS.iter().map(|c| col(c)).collect::<NvResult<_>>()?;
        let term_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.strip_prefix(TERM_PREFIX).map(|t| (i, t.to_owned())))
            .collect();

        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            let field = |k: usize| rec.get(idx[k]).unwrap_or("").to_owned();
            let int = |k: usize| {
                field(k)
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| NvError::Metadata(format!("{}: {e}", FIXED_COLUMNS[k])))
            };

            let image = ImageRecord {
                image_id: int(0)?,
                collection_id: int(1)?,
                url: field(2),
                file: field(3),
                map_type: field(4),
                name: field(5),
                description: field(6),
                contrast_definition: field(7),
                contrast_definition_cogatlas: field(8),
            };
            // 合集元数据中任一字段非空即视为存在该合集.
            let has_collection = (9..13).any(|k| !field(k).is_empty());
            let collection = has_collection.then(|| CollectionRecord {
                collection_id: image.collection_id,
                url: field(9),
                doi: field(10),
                name: field(11),
                description: field(12),
            });
            let mut terms = BTreeMap::new();
            for (i, t) in &term_cols {
                let cell = rec.get(*i).unwrap_or("").trim();
                if cell.is_empty() {
                    continue;
                }
                let v: f64 = cell
                    .parse()
                    .map_err(|e| NvError::Metadata(format!("term `{t}`: {e}")))?;
                terms.insert(t.clone(), v);
            }
            rows.push(MetadataRow {
                image,
                collection,
                terms,
            });
        }
        Ok(Self { rows })
    }

    /// 保存到 CSV 文件.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> NvResult<()> {
        self.write_csv(std::fs::File::create(path)?)
    }

    /// 从 CSV 文件读取.
    pub fn open_csv<P: AsRef<Path>>(path: P) -> NvResult<Self> {
        Self::read_csv(std::fs::File::open(path)?)
    }
}

impl<'a> IntoIterator for &'a MetadataTable {
    type Item = &'a MetadataRow;
    type IntoIter = std::slice::Iter<'a, MetadataRow>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn image(id: i64, collection_id: i64, map_type: &str) -> ImageRecord {
        ImageRecord {
            image_id: id,
            collection_id,
            url: format!("http://neurovault.org/images/{id}/"),
            file: format!("http://neurovault.org/media/images/{collection_id}/{id}.nii.gz"),
            map_type: map_type.to_owned(),
            name: format!("image {id}"),
            ..Default::default()
        }
    }

    pub(crate) fn collection(id: i64, name: &str) -> CollectionRecord {
        CollectionRecord {
            collection_id: id,
            url: format!("http://neurovault.org/collections/{id}/"),
            doi: format!("10.0/{id}"),
            name: name.to_owned(),
            description: String::new(),
        }
    }

    fn sample() -> MetadataTable {
        MetadataTable::join(
            vec![
                image(1, 10, "Z"),
                image(2, 10, "T"),
                image(96, 11, "Z"),
                image(4, 12, "other"),
            ],
            vec![collection(10, "Alpha"), collection(11, "Beta")],
        )
    }

    #[test]
    fn test_left_join() {
        let t = sample();
        assert_eq!(t.len(), 4);
        assert_eq!(t.image_ids(), vec![1, 2, 96, 4]);
        assert_eq!(t.get(2).unwrap().collection_name(), "Alpha");
        assert!(t.get(4).unwrap().collection.is_none());
        assert!(t.ids_are_unique());
    }

    #[test]
    fn test_filters_and_counts() {
        let mut t = sample();
        assert_eq!(t.exclude_ids(&[96, 97, 98]), 1);
        assert_eq!(t.retain_map_types(&["Z", "F", "T"]), 1);
        assert_eq!(t.image_ids(), vec![1, 2]);
        assert_eq!(t.collection_name_counts(), vec![("Alpha".to_owned(), 2)]);
    }

    #[test]
    fn test_replace_with_children() {
        let mut t = sample();
        let parent = t.get(1).unwrap().clone();
        let children = (0..2)
            .map(|i| {
                let mut c = parent.clone();
                c.image.image_id = -(10 + i);
                c
            })
            .collect();
        t.replace_with_children(1, children);
        assert_eq!(t.image_ids(), vec![2, 96, 4, -10, -11]);
        assert!(t.ids_are_unique());
    }

    #[test]
    fn test_terms_and_matrix() {
        let mut t = sample();
        let terms = HashMap::from([
            (1, BTreeMap::from([("motor".to_owned(), 0.3), ("visual".to_owned(), -0.2)])),
            (2, BTreeMap::from([("auditory".to_owned(), 0.1)])),
            (4, BTreeMap::new()),
        ]);
        t.merge_terms(terms);
        assert_eq!(t.image_ids(), vec![1, 2, 4]);
        let (names, m) = t.term_matrix();
        assert_eq!(names, vec!["auditory", "motor", "visual"]);
        assert_eq!(m.dim(), (3, 3));
        assert_eq!(m[(0, 1)], 0.3);
        assert_eq!(m[(0, 2)], 0.0);
        assert_eq!(m[(1, 0)], 0.1);
        assert_eq!(m.row(2).sum(), 0.0);
    }

    #[test]
    fn test_csv_round_trip() {
        let mut t = sample();
        t.rows[0].image.description = "a, \"quoted\" text".to_owned();
        t.rows[0].terms.insert("motor".to_owned(), 0.25);
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.lines().next().unwrap().ends_with("neurosynth decoding motor"));

        let back = MetadataTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_csv_keeps_collection_without_url() {
        let mut c = collection(12, "Auditory Study");
        c.url.clear();
        c.doi.clear();
        let t = MetadataTable::join(vec![image(4, 12, "Z"), image(5, 13, "Z")], vec![c]);
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();

        let back = MetadataTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back.get(4).unwrap().collection_name(), "Auditory Study");
        assert!(back.get(5).unwrap().collection.is_none());
        assert_eq!(back, t);
    }

    #[test]
    fn test_csv_missing_column() {
        let err = MetadataTable::read_csv("image_id\n1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, NvError::Metadata(_)));
    }
}
