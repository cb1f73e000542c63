use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// セッションスコープのアーティファクト参照（ストア相対名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// 1回のキャプチャの成果物バンドル
///
/// 画像は必須。深度・関節セットは任意で、個別に有無を確認すること。
/// 作成後は不変。受理されるまでフローコントローラが単独で所有する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedBundle {
    pub image: ArtifactRef,
    pub depth: Option<ArtifactRef>,
    pub joints: Option<ArtifactRef>,
    pub captured_at_ms: u64,
}

impl CapturedBundle {
    /// バンドルに含まれる全アーティファクト参照
    pub fn refs(&self) -> Vec<&ArtifactRef> {
        let mut refs = vec![&self.image];
        refs.extend(self.depth.as_ref());
        refs.extend(self.joints.as_ref());
        refs
    }
}

/// アーティファクト格納の境界トレイト
///
/// 「パスにバイト列を書く・読む」だけのセッションスコープ抽象。
/// 特定のファイルシステムには依存しない。
pub trait ArtifactStore: Send + Sync {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<ArtifactRef>;
    fn read(&self, artifact: &ArtifactRef) -> io::Result<Vec<u8>>;
    fn remove(&self, artifact: &ArtifactRef) -> io::Result<()>;
}

/// ファイルシステム上のセッションディレクトリ実装
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// セッションディレクトリを作成して開く
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ArtifactStore for DirStore {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<ArtifactRef> {
        fs::write(self.path_for(name), bytes)?;
        Ok(ArtifactRef::new(name))
    }

    fn read(&self, artifact: &ArtifactRef) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(&artifact.name))
    }

    fn remove(&self, artifact: &ArtifactRef) -> io::Result<()> {
        fs::remove_file(self.path_for(&artifact.name))
    }
}

/// メモリ実装（テスト・ヘッドレス実行用）
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<ArtifactRef> {
        self.entries.lock().insert(name.to_string(), bytes.to_vec());
        Ok(ArtifactRef::new(name))
    }

    fn read(&self, artifact: &ArtifactRef) -> io::Result<Vec<u8>> {
        self.entries
            .lock()
            .get(&artifact.name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, artifact.name.clone()))
    }

    fn remove(&self, artifact: &ArtifactRef) -> io::Result<()> {
        self.entries
            .lock()
            .remove(&artifact.name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, artifact.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let r = store.write("joints.json", b"{}").unwrap();
        assert_eq!(store.read(&r).unwrap(), b"{}");
        store.remove(&r).unwrap();
        assert!(store.read(&r).is_err());
    }

    #[test]
    fn test_dir_store_roundtrip() {
        let root = std::env::temp_dir().join(format!("saisun_test_{}", std::process::id()));
        let store = DirStore::create(&root).unwrap();
        let r = store.write("image.jpg", &[1, 2, 3]).unwrap();
        assert_eq!(store.read(&r).unwrap(), vec![1, 2, 3]);
        store.remove(&r).unwrap();
        assert!(store.read(&r).is_err());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_bundle_refs() {
        let bundle = CapturedBundle {
            image: ArtifactRef::new("a.jpg"),
            depth: None,
            joints: Some(ArtifactRef::new("a.json")),
            captured_at_ms: 1,
        };
        let refs = bundle.refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "a.jpg");
    }
}
