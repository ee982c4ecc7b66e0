//! NeuroVault 元数据记录.
//!
//! 接口返回的 JSON 先反序列化为 `*Json` 结构 (容忍缺失字段和 `null`),
//! 再转换为字段齐全的记录. 记录本身只包含普通字段, 可以直接用 `bincode` 缓存.

use serde::{Deserialize, Deserializer, Serialize};

use crate::dataset::split_ext;
use crate::{NvError, NvResult};

/// 缺失或 `null` 的字符串字段视为空串.
fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// 取 URL 倒数第二段并解析为编号, 如 `http://neurovault.org/images/110/` -> 110.
pub fn url_id(url: &str) -> NvResult<i64> {
    let segments: Vec<&str> = url.split('/').collect();
    segments
        .len()
        .checked_sub(2)
        .and_then(|i| segments[i].parse().ok())
        .ok_or_else(|| NvError::Metadata(format!("no numeric id in url `{url}`")))
}

/// 图像接口的单条 JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageJson {
    #[serde(default, deserialize_with = "null_as_empty")]
    url: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    file: String,

    /// 所属集合的 URL.
    #[serde(default)]
    collection: Option<serde_json::Value>,

    #[serde(default)]
    collection_id: Option<i64>,

    #[serde(default, deserialize_with = "null_as_empty")]
    map_type: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    description: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    contrast_definition: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    contrast_definition_cogatlas: String,
}

/// 集合接口的单条 JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionJson {
    id: i64,

    #[serde(default, deserialize_with = "null_as_empty")]
    url: String,

    #[serde(default, rename = "DOI", deserialize_with = "null_as_empty")]
    doi: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    description: String,
}

/// 一张统计图的元数据.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 图像编号. 4D 拆分得到的子图为负数.
    pub image_id: i64,

    /// 所属集合编号.
    pub collection_id: i64,

    /// 元数据 URL.
    pub url: String,

    /// 文件下载地址.
    pub file: String,

    /// 统计图类型, 如 `Z`, `T`, `F`.
    pub map_type: String,

    /// 名称.
    pub name: String,

    /// 描述.
    pub description: String,

    /// 对比定义.
    pub contrast_definition: String,

    /// Cognitive Atlas 中的对比定义.
    pub contrast_definition_cogatlas: String,
}

impl ImageRecord {
    /// 下载文件的扩展名, 如 `.nii.gz`.
    #[inline]
    pub fn ext(&self) -> &str {
        split_ext(&self.file).1
    }
}

impl TryFrom<ImageJson> for ImageRecord {
    type Error = NvError;

    fn try_from(j: ImageJson) -> NvResult<Self> {
        let image_id = url_id(&j.url)?;
        let collection_id = match (&j.collection, j.collection_id) {
            (Some(serde_json::Value::String(u)), _) => url_id(u)?,
            (Some(serde_json::Value::Number(n)), _) => n
                .as_i64()
                .ok_or_else(|| NvError::Metadata(format!("bad collection of image {image_id}")))?,
            (_, Some(id)) => id,
            _ => {
                return Err(NvError::Metadata(format!(
                    "image {image_id} has no collection"
                )))
            }
        };
        Ok(Self {
            image_id,
            collection_id,
            url: j.url,
            file: j.file,
            map_type: j.map_type,
            name: j.name,
            description: j.description,
            contrast_definition: j.contrast_definition,
            contrast_definition_cogatlas: j.contrast_definition_cogatlas,
        })
    }
}

/// 一个集合 (通常对应一篇论文) 的元数据.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// 集合编号.
    pub collection_id: i64,

    /// 元数据 URL.
    pub url: String,

    /// 论文 DOI.
    pub doi: String,

    /// 名称.
    pub name: String,

    /// 描述.
    pub description: String,
}

impl From<CollectionJson> for CollectionRecord {
    fn from(j: CollectionJson) -> Self {
        Self {
            collection_id: j.id,
            url: j.url,
            doi: j.doi,
            name: j.name,
            description: j.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_id() {
        assert_eq!(url_id("http://neurovault.org/images/110/").unwrap(), 110);
        assert_eq!(url_id("http://neurovault.org/collections/7/").unwrap(), 7);
        assert!(url_id("http://neurovault.org/images/abc/").is_err());
        assert!(url_id("").is_err());
    }

    #[test]
    fn test_image_from_json() {
        let j: ImageJson = serde_json::from_str(
            r#"{
                "url": "http://neurovault.org/images/110/",
                "file": "http://neurovault.org/media/images/7/zstat1.nii.gz",
                "collection": "http://neurovault.org/collections/7/",
                "map_type": "Z",
                "name": "listening > rest",
                "description": null,
                "extra_field": 3
            }"#,
        )
        .unwrap();
        let r = ImageRecord::try_from(j).unwrap();
        assert_eq!(r.image_id, 110);
        assert_eq!(r.collection_id, 7);
        assert_eq!(r.description, "");
        assert_eq!(r.contrast_definition_cogatlas, "");
        assert_eq!(r.ext(), ".nii.gz");
    }

    #[test]
    fn test_image_collection_fallbacks() {
        let j: ImageJson = serde_json::from_str(
            r#"{"url": "http://x/images/5/", "collection_id": 9, "collection": null}"#,
        )
        .unwrap();
        assert_eq!(ImageRecord::try_from(j).unwrap().collection_id, 9);

        let j: ImageJson = serde_json::from_str(r#"{"url": "http://x/images/5/"}"#).unwrap();
        assert!(ImageRecord::try_from(j).is_err());
    }

    #[test]
    fn test_collection_from_json() {
        let j: CollectionJson = serde_json::from_str(
            r#"{"id": 7, "url": "http://x/collections/7/", "DOI": "10.1/abc", "name": "Study"}"#,
        )
        .unwrap();
        let c = CollectionRecord::from(j);
        assert_eq!(c.collection_id, 7);
        assert_eq!(c.doi, "10.1/abc");
        assert_eq!(c.description, "");
    }
}
