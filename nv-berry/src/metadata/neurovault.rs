//! NeuroVault 元数据接口.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{CollectionJson, CollectionRecord, Fetch, ImageJson, ImageRecord, MetadataTable};
use crate::consts::url::{NEUROVAULT_COLLECTIONS, NEUROVAULT_IMAGES};
use crate::{NvError, NvResult};

/// 获取 `url` 处的全部条目.
///
/// 接口可能直接返回 JSON 数组, 也可能返回 `{"results": [...], "next": url|null}`
/// 形式的分页对象. 后者会沿 `next` 一直获取到最后一页.
pub fn fetch_all<T: DeserializeOwned, F: Fetch + ?Sized>(
    fetcher: &F,
    url: &str,
) -> NvResult<Vec<T>> {
    let mut out = Vec::new();
    let mut next = Some(url.to_owned());
    let mut pages = 0usize;

    while let Some(page_url) = next.take() {
        let body = fetcher.get_text(&page_url)?;
        pages += 1;
        let items = match serde_json::from_str::<Value>(&body)? {
            Value::Array(items) => items,
            Value::Object(mut obj) => {
                next = match obj.remove("next") {
                    Some(Value::String(u)) if u != page_url => Some(u),
                    _ => None,
                };
                match obj.remove("results") {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(NvError::Metadata(format!(
                            "page `{page_url}` has no `results` array"
                        )))
                    }
                }
            }
            _ => {
                return Err(NvError::Metadata(format!(
                    "unexpected JSON at `{page_url}`"
                )))
            }
        };
        for item in items {
            out.push(serde_json::from_value(item)?);
        }
    }
    log::debug!("fetched {} entries in {pages} page(s) from {url}", out.len());
    Ok(out)
}

/// 获取全部图像元数据. 无法确定编号的条目被跳过.
pub fn fetch_images<F: Fetch + ?Sized>(fetcher: &F) -> NvResult<Vec<ImageRecord>> {
    let raw: Vec<ImageJson> = fetch_all(fetcher, NEUROVAULT_IMAGES)?;
    let total = raw.len();
    let images: Vec<ImageRecord> = raw
        .into_iter()
        .filter_map(|j| match ImageRecord::try_from(j) {
            Ok(r) => Some(r),
            Err(e) => {
                log::warn!("skipping image: {e}");
                None
            }
        })
        .collect();
    log::info!("fetched {}/{total} image records", images.len());
    Ok(images)
}

/// 获取全部集合元数据.
pub fn fetch_collections<F: Fetch + ?Sized>(fetcher: &F) -> NvResult<Vec<CollectionRecord>> {
    let raw: Vec<CollectionJson> = fetch_all(fetcher, NEUROVAULT_COLLECTIONS)?;
    log::info!("fetched {} collection records", raw.len());
    Ok(raw.into_iter().map(CollectionRecord::from).collect())
}

/// 获取图像与集合元数据, 并将图像左连接到集合.
pub fn fetch_images_with_collections<F: Fetch + ?Sized>(fetcher: &F) -> NvResult<MetadataTable> {
    let collections = fetch_collections(fetcher)?;
    let images = fetch_images(fetcher)?;
    Ok(MetadataTable::join(images, collections))
}
