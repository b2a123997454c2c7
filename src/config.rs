use crate::orchestrator::DEFAULT_POOL_SIZE;
use crate::package_manager::{InstallRequest, SkipRulesOverride};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 目标软件列表的持久化接口
pub trait SoftwareStore {
    fn software_list(&self) -> &[InstallRequest];
    fn add_software(&mut self, request: InstallRequest);
    fn update_software(&mut self, index: usize, request: InstallRequest) -> Result<()>;
    fn remove_software(&mut self, index: usize) -> Result<InstallRequest>;
    fn save(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 默认使用并行模式
    pub parallel: bool,
    pub pool_size: usize,
    pub software: Vec<InstallRequest>,
    /// 按后端名（winget / brew / apt）追加的跳过规则
    pub skip_rules: BTreeMap<String, SkipRulesOverride>,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel: false,
            pool_size: DEFAULT_POOL_SIZE,
            software: Vec::new(),
            skip_rules: BTreeMap::new(),
            path: Self::default_path(),
        }
    }
}

/// 批量文件只需要 software 段
#[derive(Debug, Default, Deserialize)]
struct SoftwareFile {
    #[serde(default)]
    software: Vec<InstallRequest>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/swiftinstall/config.toml")
    }

    /// 读取配置；文件不存在时返回默认值（保存时写到同一路径）
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("读取配置失败: {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("解析配置失败: {}", config_path.display()))?
        } else {
            log::debug!("配置文件不存在，使用默认配置: {}", config_path.display());
            Self::default()
        };
        config.path = config_path;
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取另一个 TOML 文件中的软件列表
    pub fn read_software_file(path: &Path) -> Result<Vec<InstallRequest>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取软件列表失败: {}", path.display()))?;
        let file: SoftwareFile =
            toml::from_str(&content).with_context(|| format!("解析软件列表失败: {}", path.display()))?;
        Ok(file.software)
    }

    /// 合并外部列表，按包标识去重；返回新增条目数
    pub fn import_from_file(&mut self, path: &Path) -> Result<usize> {
        let mut added = 0;
        for request in Self::read_software_file(path)? {
            let exists = self
                .software
                .iter()
                .any(|s| s.package_id() == request.package_id());
            if !exists {
                self.software.push(request);
                added += 1;
            }
        }
        log::info!("从 {} 导入 {} 个软件", path.display(), added);
        Ok(added)
    }
}

impl SoftwareStore for Config {
    fn software_list(&self) -> &[InstallRequest] {
        &self.software
    }

    fn add_software(&mut self, request: InstallRequest) {
        self.software.push(request);
    }

    fn update_software(&mut self, index: usize, request: InstallRequest) -> Result<()> {
        match self.software.get_mut(index) {
            Some(slot) => {
                *slot = request;
                Ok(())
            }
            None => bail!("软件索引越界: {} (共 {} 项)", index, self.software.len()),
        }
    }

    fn remove_software(&mut self, index: usize) -> Result<InstallRequest> {
        if index >= self.software.len() {
            bail!("软件索引越界: {} (共 {} 项)", index, self.software.len());
        }
        Ok(self.software.remove(index))
    }

    fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&self.path, content)
            .with_context(|| format!("写入配置失败: {}", self.path.display()))?;
        Ok(())
    }
}
