use std::path::PathBuf;

use crate::utils::clean_key;

/// Local file cache for downloaded objects / 本地文件缓存
pub trait LocalCache: Send + Sync {
    /// Local file backing a storage key / 存储键对应的本地文件
    fn local_path(&self, key: &str) -> PathBuf;
}

/// Cache rooted at a local directory / 基于本地目录的缓存
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl LocalCache for DirectoryCache {
    // `..` segments are folded away so a key never resolves outside the root
    fn local_path(&self, key: &str) -> PathBuf {
        let key = clean_key(key);
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}
