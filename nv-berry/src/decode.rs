//! NeuroSynth 术语解码.
//!
//! 对每张 NeuroVault 图像查询 NeuroSynth 的解码接口, 得到 `术语 -> 相关系数`
//! 的稀疏映射. 原始响应经 [`Memory`] 缓存, 重复运行不再联网.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;

use crate::cache::Memory;
use crate::consts::url::NEUROSYNTH_DECODE;
use crate::metadata::{url_id, Fetch, MetadataTable};
use crate::NvResult;

/// 单张图像的解码结果.
pub type TermWeights = BTreeMap<String, f64>;

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    data: Vec<DecodeEntry>,
}

#[derive(Debug, Deserialize)]
struct DecodeEntry {
    analysis: String,
    r: f64,
}

/// 解析解码接口的响应.
pub fn parse_response(body: &str) -> NvResult<TermWeights> {
    let resp: DecodeResponse = serde_json::from_str(body)?;
    Ok(resp.data.into_iter().map(|e| (e.analysis, e.r)).collect())
}

/// 解码器.
pub struct TermDecoder<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    memory: Option<&'a Memory>,
}

impl<'a, F: Fetch + ?Sized> TermDecoder<'a, F> {
    /// 创建解码器. `memory` 为 `None` 时不缓存.
    pub fn new(fetcher: &'a F, memory: Option<&'a Memory>) -> Self {
        Self { fetcher, memory }
    }

    /// 图像 URL 对应的解码接口地址.
    pub fn decode_url(image_url: &str) -> NvResult<String> {
        Ok(format!("{NEUROSYNTH_DECODE}{}", url_id(image_url)?))
    }

    fn get_text(&self, url: &str) -> NvResult<String> {
        match self.memory {
            Some(mem) => mem.cache("url_get", url, || self.fetcher.get_text(url)),
            None => self.fetcher.get_text(url),
        }
    }

    /// 解码单张图像. 任何错误都记录日志并返回空结果.
    pub fn decode_image(&self, image_url: &str) -> TermWeights {
        let res = Self::decode_url(image_url)
            .and_then(|u| self.get_text(&u))
            .and_then(|body| parse_response(&body));
        res.unwrap_or_else(|e| {
            log::warn!("no terms for {image_url}: {e}");
            TermWeights::new()
        })
    }

    /// 解码表中所有图像, 返回 `image_id -> 解码结果`.
    pub fn decode_table(&self, table: &MetadataTable) -> HashMap<i64, TermWeights> {
        table
            .iter()
            .map(|row| {
                log::info!("fetching terms for image {}", row.image_id());
                (row.image_id(), self.decode_image(&row.image.url))
            })
            .collect()
    }
}

/// 将稀疏的解码结果稠密化: 所有图像拥有相同的术语集合, 缺失的术语取 0.
///
/// 返回按字典序排列的术语表.
pub fn vectorize_terms(terms: &mut HashMap<i64, TermWeights>) -> Vec<String> {
    let vocabulary: BTreeSet<String> = terms.values().flat_map(|t| t.keys().cloned()).collect();
    for weights in terms.values_mut() {
        for term in &vocabulary {
            weights.entry(term.clone()).or_insert(0.0);
        }
    }
    vocabulary.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{test_collection, test_image, MockFetcher};

    const BODY_1: &str = r#"{"data": [{"analysis": "motor", "r": 0.31}, {"analysis": "hand", "r": -0.05}]}"#;

    #[test]
    fn test_parse_response() {
        let t = parse_response(BODY_1).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t["motor"], 0.31);
        assert!(parse_response(r#"{"error": 1}"#).is_err());
    }

    #[test]
    fn test_decode_url() {
        let u = TermDecoder::<MockFetcher>::decode_url("http://neurovault.org/images/110/").unwrap();
        assert_eq!(u, "http://neurosynth.org/decode/data/?neurovault=110");
    }

    #[test]
    fn test_decode_table_with_failures() {
        let f = MockFetcher::default()
            .with(&format!("{NEUROSYNTH_DECODE}1"), BODY_1)
            .with(&format!("{NEUROSYNTH_DECODE}2"), "<html>oops</html>");
        let table = MetadataTable::join(
            vec![test_image(1, 7, "Z"), test_image(2, 7, "Z"), test_image(3, 7, "T")],
            vec![test_collection(7, "c")],
        );
        let decoder = TermDecoder::new(&f, None);
        let mut terms = decoder.decode_table(&table);
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[&1].len(), 2);
        assert!(terms[&2].is_empty());
        assert!(terms[&3].is_empty());

        let vocab = vectorize_terms(&mut terms);
        assert_eq!(vocab, vec!["hand", "motor"]);
        assert_eq!(terms[&3]["motor"], 0.0);
        assert_eq!(terms[&1]["hand"], -0.05);
    }

    #[test]
    fn test_responses_are_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let mem = Memory::new(dir.path());
        let f = MockFetcher::default().with(&format!("{NEUROSYNTH_DECODE}1"), BODY_1);
        let decoder = TermDecoder::new(&f, Some(&mem));
        let url = "http://neurovault.org/images/1/";
        assert_eq!(decoder.decode_image(url), decoder.decode_image(url));
        assert_eq!(f.requests.borrow().len(), 1);
    }
}
