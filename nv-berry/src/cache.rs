//! 磁盘函数结果缓存.
//!
//! 以函数名和参数的 `bincode` 编码做 SHA-256 作为键, 结果同样以 `bincode`
//! 保存在缓存目录下. 写入时先写临时文件再重命名, 中途崩溃不会留下被截断的条目.
//! 不做失效管理, 需要时调用 [`Memory::clear`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::NvResult;

/// 磁盘缓存.
#[derive(Debug, Clone)]
pub struct Memory {
    dir: PathBuf,
}

impl Memory {
    /// 以 `dir` 为缓存目录. 目录在第一次写入时创建.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }

    /// 缓存目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 计算 `(name, args)` 对应的键 (64 位十六进制串).
    pub fn key<A: Serialize + ?Sized>(name: &str, args: &A) -> NvResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(bincode::serialize(args)?);
        Ok(hex::encode(hasher.finalize()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    /// 读取缓存值. 不存在或无法解码时返回 `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);
        let bytes = fs::read(&path).ok()?;
        match bincode::deserialize(&bytes) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("ignoring unreadable cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// 写入缓存值.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> NvResult<()> {
        fs::create_dir_all(&self.dir)?;
        let bytes = bincode::serialize(value)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// 若已缓存则直接返回, 否则调用 `f` 计算并缓存其结果.
    ///
    /// `f` 返回 `Err` 时不写入缓存.
    pub fn cache<A, T, F>(&self, name: &str, args: &A, f: F) -> NvResult<T>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> NvResult<T>,
    {
        let key = Self::key(name, args)?;
        if let Some(v) = self.get(&key) {
            log::debug!("cache hit: {name} [{}]", &key[..12]);
            return Ok(v);
        }
        log::debug!("cache miss: {name} [{}]", &key[..12]);
        let v = f()?;
        self.put(&key, &v)?;
        Ok(v)
    }

    /// 删除全部缓存.
    pub fn clear(&self) -> NvResult<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::NvError;

    #[test]
    fn test_key_depends_on_name_and_args() {
        let a = Memory::key("f", &(1, "x")).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, Memory::key("f", &(1, "x")).unwrap());
        assert_ne!(a, Memory::key("g", &(1, "x")).unwrap());
        assert_ne!(a, Memory::key("f", &(2, "x")).unwrap());
    }

    #[test]
    fn test_cache_hit_skips_computation() {
        let dir = tempfile::tempdir().unwrap();
        let mem = Memory::new(dir.path().join("cache"));
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![1.5f64, 2.5])
        };

        let a: Vec<f64> = mem.cache("compute", "arg", compute).unwrap();
        let b: Vec<f64> = mem.cache("compute", "arg", compute).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.get(), 1);

        let _: Vec<f64> = mem.cache("compute", "other", compute).unwrap();
        assert_eq!(calls.get(), 2);

        mem.clear().unwrap();
        assert!(!mem.dir().exists());
        let _: Vec<f64> = mem.cache("compute", "arg", compute).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mem = Memory::new(dir.path());
        let r: NvResult<u32> = mem.cache("fail", &(), || Err(NvError::Empty("nothing")));
        assert!(r.is_err());
        let r: u32 = mem.cache("fail", &(), || Ok(3)).unwrap();
        assert_eq!(r, 3);
    }

    #[test]
    fn test_corrupt_entry_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let mem = Memory::new(dir.path());
        let key = Memory::key("v", &()).unwrap();
        fs::write(mem.entry_path(&key), [1u8]).unwrap();
        let v: String = mem.cache("v", &(), || Ok("fresh".to_owned())).unwrap();
        assert_eq!(v, "fresh");
        assert_eq!(mem.get::<String>(&key).as_deref(), Some("fresh"));
    }
}
