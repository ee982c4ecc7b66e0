//! 远程资源获取.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use crate::{NvError, NvResult};

/// 远程资源获取方式. 测试中可替换为内存实现.
pub trait Fetch {
    /// 以文本形式获取 `url` 的内容.
    fn get_text(&self, url: &str) -> NvResult<String>;

    /// 下载 `url` 到本地文件 `dest`. 失败时不留下不完整的文件.
    fn download(&self, url: &str, dest: &Path) -> NvResult<()>;
}

/// 基于 `ureq` 的阻塞 HTTP 客户端.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl HttpFetcher {
    /// 以给定读超时创建客户端.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout_read(timeout).build();
        Self { agent }
    }

    fn call(&self, url: &str) -> NvResult<ureq::Response> {
        self.agent.get(url).call().map_err(|e| NvError::Http {
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// 读出全部响应体. 不同于 `Response::into_string`, 没有 10MB 的上限.
fn read_text(mut reader: impl Read) -> io::Result<String> {
    let mut body = String::new();
    reader.read_to_string(&mut body)?;
    Ok(body)
}

impl Fetch for HttpFetcher {
    fn get_text(&self, url: &str) -> NvResult<String> {
        log::debug!("GET {url}");
        Ok(read_text(self.call(url)?.into_reader())?)
    }

    fn download(&self, url: &str, dest: &Path) -> NvResult<()> {
        log::debug!("GET {url} -> {}", dest.display());
        let resp = self.call(url)?;
        let tmp = dest.with_extension("part");
        let res = File::create(&tmp).and_then(|mut f| io::copy(&mut resp.into_reader(), &mut f));
        if let Err(e) = res {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        fs::rename(&tmp, dest)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_text_has_no_size_cap() {
        let page = "[".to_owned() + &"0,".repeat(6 * 1024 * 1024) + "0]";
        assert!(page.len() > 10 * 1024 * 1024);
        let body = read_text(Cursor::new(page.as_bytes())).unwrap();
        assert_eq!(body.len(), page.len());
        assert!(body.ends_with("0]"));
    }

    #[test]
    fn test_read_text_rejects_invalid_utf8() {
        let err = read_text(Cursor::new(vec![0x7b, 0xff, 0x7d])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
