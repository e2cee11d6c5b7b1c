//! 导出缓存 - 业务能力层
//!
//! 磁盘上的投稿缓存，以 forum ID 为键，独占所有条目目录的读写。
//!
//! ## 目录结构
//! ```text
//! <download_dir>/<venue>/
//!     <forum>/artifacts.json   原始 ArtifactSet
//!     <forum>/paper.pdf        PDF（可选）
//!     <forum>/bundle.json      DocumentBundle
//!     <forum>/bundle.txt       渲染后的文本
//!     runs/<run-tag>/manifest.json
//!     .staging/                写入中的临时目录
//! ```
//!
//! 条目先在 `.staging/` 中完整写好，再整体重命名到位，
//! 因此任何时刻都看不到写了一半的条目。
//! 重写条目时，目录中的附加输出文件（生成 / 评估结果）会被带到新条目中。

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::models::submission::sanitize_component;
use crate::models::{ArtifactKind, ArtifactSet, DocumentBundle, ExportManifest, SubmissionRef};

const ARTIFACTS_FILE: &str = "artifacts.json";
const PDF_FILE: &str = "paper.pdf";
const BUNDLE_FILE: &str = "bundle.json";
const BUNDLE_TEXT_FILE: &str = "bundle.txt";
const STAGING_DIR: &str = ".staging";
/// 由缓存自己生成的条目文件，其余文件视为附加输出
const ENTRY_FILES: &[&str] = &[ARTIFACTS_FILE, PDF_FILE, BUNDLE_FILE, BUNDLE_TEXT_FILE];
const RUNS_DIR: &str = "runs";

/// 导出缓存
#[derive(Debug, Clone)]
pub struct ExportCache {
    root: PathBuf,
}

impl ExportCache {
    /// 打开 `<download_dir>/<venue>` 下的缓存
    pub async fn open(download_dir: &Path, venue_id: &str) -> Result<Self, CacheError> {
        Self::open_at(download_dir.join(sanitize_component(venue_id))).await
    }

    /// 直接打开某个会议目录（`--submission-folder`）
    ///
    /// 会确认目录可写，并清理上次中断留下的临时目录。
    pub async fn open_at(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache = Self { root: root.into() };
        let staging = cache.staging_dir();
        fs::create_dir_all(&staging)
            .await
            .map_err(|source| CacheError::Unwritable {
                path: staging.clone(),
                source,
            })?;

        let probe = staging.join(format!(".probe-{:016x}", rand::random::<u64>()));
        fs::write(&probe, b"ok")
            .await
            .map_err(|source| CacheError::Unwritable {
                path: cache.root.clone(),
                source,
            })?;
        let _ = fs::remove_file(&probe).await;

        cache.sweep_staging().await;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, submission: &SubmissionRef) -> PathBuf {
        self.root.join(submission.cache_key())
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// 清理临时目录
    ///
    /// 替换条目时中断会留下 `<key>-<随机数>.old`：目标条目不存在时先恢复，再清理其余内容。
    async fn sweep_staging(&self) {
        let Ok(mut entries) = fs::read_dir(self.staging_dir()).await else {
            return;
        };
        let mut swept = 0;
        let mut restored = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if let Some(target) = self.retired_entry_target(&path) {
                if !fs::try_exists(&target).await.unwrap_or(true) && fs::rename(&path, &target).await.is_ok() {
                    warn!("♻️ 恢复了替换中断的旧条目: {}", target.display());
                    restored += 1;
                    continue;
                }
            }
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            if removed.is_ok() {
                swept += 1;
            }
        }
        if swept > 0 || restored > 0 {
            info!("🧹 已清理 {} 个未完成的临时条目，恢复 {} 个旧条目", swept, restored);
        }
    }

    /// `.staging/<key>-<16 位十六进制>.old` 对应的条目目录
    fn retired_entry_target(&self, path: &Path) -> Option<PathBuf> {
        if !path.is_dir() {
            return None;
        }
        let name = path.file_name()?.to_str()?;
        let (key, nonce) = name.strip_suffix(".old")?.rsplit_once('-')?;
        if key.is_empty() || nonce.len() != 16 || !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.root.join(key))
    }

    /// 条目是否存在
    pub async fn exists(&self, submission: &SubmissionRef) -> bool {
        fs::try_exists(self.entry_dir(submission).join(ARTIFACTS_FILE))
            .await
            .unwrap_or(false)
    }

    /// 读取缓存的产物；条目不存在时返回 `None`
    pub async fn read(&self, submission: &SubmissionRef) -> Result<Option<ArtifactSet>, CacheError> {
        let dir = self.entry_dir(submission);
        let Some(mut set) = read_json::<ArtifactSet>(&dir.join(ARTIFACTS_FILE)).await? else {
            return Ok(None);
        };
        let pdf_path = dir.join(PDF_FILE);
        match fs::read(&pdf_path).await {
            Ok(bytes) => set.pdf = Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => set.pdf = None,
            Err(source) => return Err(CacheError::ReadFailed { path: pdf_path, source }),
        }
        Ok(Some(set))
    }

    /// 读取缓存的文档包
    pub async fn read_bundle(&self, submission: &SubmissionRef) -> Result<Option<DocumentBundle>, CacheError> {
        read_json(&self.entry_dir(submission).join(BUNDLE_FILE)).await
    }

    /// 缓存条目对该角色是否完整：必需产物全部实际存在且文档包已生成
    ///
    /// 读取失败视为不完整，触发重新获取。
    pub async fn is_complete(&self, submission: &SubmissionRef, required: &[ArtifactKind]) -> bool {
        let set = match self.read(submission).await {
            Ok(Some(set)) => set,
            Ok(None) => return false,
            Err(e) => {
                warn!("⚠️ {} 缓存读取失败，将重新获取: {}", submission.display_name(), e);
                return false;
            }
        };
        let bundle_ready = fs::try_exists(self.entry_dir(submission).join(BUNDLE_FILE))
            .await
            .unwrap_or(false);
        bundle_ready && set.has_all(required)
    }

    /// 原子地写入一个条目：先写临时目录，成功后整体替换旧条目
    ///
    /// # 返回
    /// 条目目录路径
    pub async fn write(&self, set: &ArtifactSet, bundle: &DocumentBundle) -> Result<PathBuf, CacheError> {
        let key = set.submission.cache_key();
        let target = self.entry_dir(&set.submission);
        let staging = self
            .staging_dir()
            .join(format!("{}-{:016x}", key, rand::random::<u64>()));

        let staged = match self.stage_entry(&staging, set, bundle).await {
            Ok(()) => carry_outputs(&target, &staging).await,
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        let previous = if fs::try_exists(&target).await.unwrap_or(false) {
            let aside = self
                .staging_dir()
                .join(format!("{}-{:016x}.old", key, rand::random::<u64>()));
            fs::rename(&target, &aside)
                .await
                .map_err(|source| CacheError::WriteFailed {
                    path: target.clone(),
                    source,
                })?;
            Some(aside)
        } else {
            None
        };

        if let Err(source) = fs::rename(&staging, &target).await {
            // 恢复旧条目
            if let Some(aside) = &previous {
                let _ = fs::rename(aside, &target).await;
            }
            let _ = fs::remove_dir_all(&staging).await;
            return Err(CacheError::WriteFailed { path: target, source });
        }

        if let Some(aside) = previous {
            let _ = fs::remove_dir_all(&aside).await;
        }
        debug!("条目已写入: {}", target.display());
        Ok(target)
    }

    async fn stage_entry(&self, staging: &Path, set: &ArtifactSet, bundle: &DocumentBundle) -> Result<(), CacheError> {
        fs::create_dir_all(staging)
            .await
            .map_err(|source| CacheError::WriteFailed {
                path: staging.to_path_buf(),
                source,
            })?;
        write_file(&staging.join(ARTIFACTS_FILE), &to_json(set, staging)?).await?;
        if let Some(pdf) = &set.pdf {
            write_file(&staging.join(PDF_FILE), pdf).await?;
        }
        write_file(&staging.join(BUNDLE_FILE), &to_json(bundle, staging)?).await?;
        write_file(&staging.join(BUNDLE_TEXT_FILE), bundle.render_text().as_bytes()).await?;
        Ok(())
    }

    /// 在条目目录中写入一个附加输出文件（生成 / 评估结果）
    pub async fn write_output(
        &self,
        submission: &SubmissionRef,
        file_name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let path = self.entry_dir(submission).join(file_name);
        write_file_atomic(&path, contents).await?;
        Ok(path)
    }

    /// 读取条目目录中的附加输出文件；不存在时返回 `None`
    pub async fn read_output(&self, submission: &SubmissionRef, file_name: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_dir(submission).join(file_name);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::ReadFailed { path, source }),
        }
    }

    /// 写入本次运行的清单
    pub async fn write_manifest(&self, manifest: &ExportManifest) -> Result<PathBuf, CacheError> {
        let path = self
            .root
            .join(RUNS_DIR)
            .join(sanitize_component(&manifest.run_tag))
            .join("manifest.json");
        let bytes = to_json(manifest, &path)?;
        write_file_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// 列出所有已缓存的条目，按投稿编号排序
    pub async fn cached_entries(&self) -> Result<Vec<(ArtifactSet, Option<DocumentBundle>)>, CacheError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|source| CacheError::ReadFailed {
                path: self.root.clone(),
                source,
            })?;

        let mut found = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| CacheError::ReadFailed {
                    path: self.root.clone(),
                    source,
                })?;
            let Some(entry) = entry else { break };
            let dir = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name == RUNS_DIR || !dir.is_dir() {
                continue;
            }
            match read_json::<ArtifactSet>(&dir.join(ARTIFACTS_FILE)).await {
                Ok(Some(set)) => {
                    let bundle = self.read_bundle(&set.submission).await.unwrap_or_else(|e| {
                        warn!("⚠️ 文档包读取失败 ({}): {}", dir.display(), e);
                        None
                    });
                    found.push((set, bundle));
                }
                Ok(None) => debug!("跳过非条目目录: {}", dir.display()),
                Err(e) => warn!("⚠️ 跳过损坏的条目: {}", e),
            }
        }
        found.sort_by(|(a, _), (b, _)| {
            let key = |s: &ArtifactSet| s.metadata.number.or(s.submission.number).unwrap_or(u64::MAX);
            key(a).cmp(&key(b)).then_with(|| a.submission.forum_id.cmp(&b.submission.forum_id))
        });
        Ok(found)
    }
}

// ========== 文件辅助函数 ==========

fn to_json<T: Serialize>(value: &T, path: &Path) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec_pretty(value).map_err(|source| CacheError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    fs::write(path, contents)
        .await
        .map_err(|source| CacheError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// 把旧条目中的附加输出文件（生成 / 评估结果）复制到新条目
async fn carry_outputs(from: &Path, to: &Path) -> Result<(), CacheError> {
    let Ok(mut entries) = fs::read_dir(from).await else {
        return Ok(());
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = entry.file_name();
        let Some(name_str) = name.to_str() else { continue };
        if ENTRY_FILES.contains(&name_str) || name_str.contains(".tmp-") || !path.is_file() {
            continue;
        }
        let dest = to.join(&name);
        fs::copy(&path, &dest)
            .await
            .map_err(|source| CacheError::WriteFailed { path: dest, source })?;
    }
    Ok(())
}

/// 写入同目录下的临时文件后重命名
async fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| CacheError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let temp_path = path.with_extension(format!("tmp-{:08x}", rand::random::<u32>()));
    write_file(&temp_path, contents).await?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|source| CacheError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}
