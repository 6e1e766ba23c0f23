//! Flow 快照和恢复

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::types::{Flow, Task, TaskStatus};

/// Flow 快照：恢复一个 flow 所需的全部状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    /// 每次发布递增
    pub version: u64,
    pub flow: Flow,
    /// 按插入顺序，包含依赖边
    pub tasks: Vec<Task>,
    pub taken_at: DateTime<Utc>,
}

impl FlowSnapshot {
    pub fn new(version: u64, flow: Flow, tasks: Vec<Task>) -> Self {
        Self {
            version,
            flow,
            tasks,
            taken_at: Utc::now(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize flow snapshot")
    }

    /// 从 JSON 反序列化
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize flow snapshot")
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write snapshot to {:?}", path.as_ref()))
    }

    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read snapshot from {:?}", path.as_ref()))?;
        Self::from_json(&json)
    }
}

/// 快照管理器：每个 flow 保留最近的 `max_snapshots` 个快照
pub struct SnapshotManager {
    snapshot_dir: PathBuf,
    max_snapshots: usize,
    /// 串行化 save + cleanup
    write_lock: Mutex<()>,
}

impl SnapshotManager {
    pub fn new<P: Into<PathBuf>>(snapshot_dir: P, max_snapshots: usize) -> Result<Self> {
        let snapshot_dir = snapshot_dir.into();

        if !snapshot_dir.exists() {
            fs::create_dir_all(&snapshot_dir).with_context(|| {
                format!("Failed to create snapshot directory: {:?}", snapshot_dir)
            })?;
        }

        Ok(Self {
            snapshot_dir,
            max_snapshots: max_snapshots.max(1),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// 保存快照并清理同一 flow 的旧快照
    pub fn save(&self, snapshot: &FlowSnapshot) -> Result<PathBuf> {
        let filename = format!("flow_{}_{:08}.json", snapshot.flow.id, snapshot.version);
        let path = self.snapshot_dir.join(filename);

        {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            snapshot.save_to_file(&path)?;
            self.cleanup(&snapshot.flow.id)?;
        }

        tracing::debug!(
            target: "flowpilot.snapshot",
            flow_id = %snapshot.flow.id,
            version = snapshot.version,
            path = %path.display(),
            "snapshot saved"
        );
        Ok(path)
    }

    /// 加载某个 flow 的最新快照
    pub fn load_latest(&self, flow_id: &str) -> Result<Option<FlowSnapshot>> {
        match self.list(Some(flow_id))?.first() {
            Some(path) => FlowSnapshot::load_from_file(path).map(Some),
            None => Ok(None),
        }
    }

    /// 列出快照（版本倒序）
    pub fn list(&self, flow_id: Option<&str>) -> Result<Vec<PathBuf>> {
        let prefix = match flow_id {
            Some(id) => format!("flow_{id}_"),
            None => "flow_".to_string(),
        };

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(filename) = path.file_name().and_then(|s| s.to_str()) {
                if filename.starts_with(&prefix) {
                    snapshots.push(path);
                }
            }
        }

        // zero-padded version keeps lexical order == version order
        snapshots.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(snapshots)
    }

    fn cleanup(&self, flow_id: &str) -> Result<()> {
        for path in self.list(Some(flow_id))?.iter().skip(self.max_snapshots) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove old snapshot: {:?}", path))
                }
            }
        }
        Ok(())
    }

    /// 删除某个 flow 的全部快照
    pub fn clear(&self, flow_id: &str) -> Result<usize> {
        let snapshots = self.list(Some(flow_id))?;
        let count = snapshots.len();
        for path in snapshots {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove snapshot: {:?}", path))?;
        }
        Ok(count)
    }
}
