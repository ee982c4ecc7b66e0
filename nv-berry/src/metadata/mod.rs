//! NeuroVault 元数据: 获取, 合并, 过滤与持久化.

mod fetch;
mod neurovault;
mod records;
mod table;

pub use fetch::{Fetch, HttpFetcher};
pub use neurovault::{fetch_all, fetch_collections, fetch_images, fetch_images_with_collections};
pub use records::{url_id, CollectionJson, CollectionRecord, ImageJson, ImageRecord};
pub use table::{MetadataRow, MetadataTable};

#[cfg(test)]
pub(crate) use fetch::mock::MockFetcher;
#[cfg(test)]
pub(crate) use table::tests::{collection as test_collection, image as test_image};
