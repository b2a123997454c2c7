//! 批量安装/卸载调度
//!
//! 每个请求对应一个结果槽位（按提交顺序编号）。结果写入和进度读取共用同一把锁；
//! 单个请求的任何失败（包括工作线程 panic）都只影响自己的槽位。

use crate::package_manager::{
    Backend, InstallRequest, InstallResult, InstallStatus, InstallerError, Operation, PackageInfo,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

/// 并行模式下同时运行的后端调用上限
pub const DEFAULT_POOL_SIZE: usize = 4;

/// 观察者轮询进度的建议间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sequential,
    Parallel,
}

/// 单个请求的实时状态（用于逐行刷新状态图标）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Running,
    Done(InstallStatus),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    fn count(&mut self, status: InstallStatus) {
        match status {
            InstallStatus::Success => self.success += 1,
            InstallStatus::Failed => self.failed += 1,
            InstallStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

/// 某一时刻的进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub summary: Summary,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// 批次共享状态，只在一次 `run` 内存在
struct BatchState {
    states: Vec<ItemState>,
    results: Vec<Option<InstallResult>>,
    summary: Summary,
    /// 编排器已结束（正常完成、批次级错误或被丢弃）
    finished: bool,
}

impl BatchState {
    fn new(total: usize) -> Self {
        Self {
            states: vec![ItemState::Pending; total],
            results: vec![None; total],
            summary: Summary::default(),
            finished: false,
        }
    }

    fn mark_running(&mut self, index: usize) {
        if let Some(state @ ItemState::Pending) = self.states.get_mut(index) {
            *state = ItemState::Running;
        }
    }

    /// 每个槽位只写一次
    fn record(&mut self, index: usize, result: InstallResult) {
        let Some(slot) = self.results.get_mut(index) else {
            return;
        };
        if slot.is_some() {
            log::warn!("结果槽位 {} 重复写入，已忽略", index);
            return;
        }
        let status = result.status();
        self.summary.count(status);
        self.states[index] = ItemState::Done(status);
        *slot = Some(result);
    }

    fn progress(&self) -> Progress {
        Progress {
            completed: self.summary.completed(),
            total: self.results.len(),
            summary: self.summary,
        }
    }
}

fn lock(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    // 槽位数据在任何时刻都是完整的，中毒后继续使用是安全的
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 只读进度观察句柄，可在批次运行时从其它任务并发读取
#[derive(Clone)]
pub struct ProgressHandle {
    state: Arc<Mutex<BatchState>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> Progress {
        lock(&self.state).progress()
    }

    pub fn item_states(&self) -> Vec<ItemState> {
        lock(&self.state).states.clone()
    }

    /// 已完成的结果，未完成的槽位为 None
    pub fn results(&self) -> Vec<Option<InstallResult>> {
        lock(&self.state).results.clone()
    }

    /// 编排器是否已结束；批次级错误时结果槽位可能仍为空
    pub fn is_finished(&self) -> bool {
        lock(&self.state).finished
    }

    /// 按固定间隔轮询，直到批次完成或编排器结束
    pub async fn watch<F>(self, interval: Duration, mut on_tick: F)
    where
        F: FnMut(&Progress, &[ItemState]),
    {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let (progress, states, finished) = {
                let guard = lock(&self.state);
                (guard.progress(), guard.states.clone(), guard.finished)
            };
            on_tick(&progress, &states);
            if progress.is_complete() || finished {
                break;
            }
        }
    }
}

/// 批次最终结果：`results[i]` 对应第 i 个请求
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<InstallResult>,
    pub summary: Summary,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

pub struct Orchestrator {
    backend: Option<Arc<dyn Backend>>,
    operation: Operation,
    requests: Vec<InstallRequest>,
    pool_size: usize,
    state: Arc<Mutex<BatchState>>,
}

impl Orchestrator {
    /// `backend` 为 None 表示平台不受支持
    pub fn new(
        backend: Option<Arc<dyn Backend>>,
        operation: Operation,
        requests: Vec<InstallRequest>,
    ) -> Self {
        let state = Arc::new(Mutex::new(BatchState::new(requests.len())));
        Self {
            backend,
            operation,
            requests,
            pool_size: DEFAULT_POOL_SIZE,
            state,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn progress(&self) -> ProgressHandle {
        ProgressHandle {
            state: self.state.clone(),
        }
    }

    /// 执行整个批次，所有请求结束后返回
    ///
    /// 只有两种批次级错误：并行模式遇到不支持并发的后端（在派发任何调用之前返回），
    /// 以及不受支持的平台（此时每个请求都记为 Failed，不返回 Err）。
    pub async fn run(self, mode: Mode) -> Result<BatchReport, InstallerError> {
        let total = self.requests.len();

        let Some(backend) = self.backend.clone() else {
            let platform = format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH);
            log::warn!("不支持的平台 {}，{} 个请求全部标记失败", platform, total);
            let mut state = lock(&self.state);
            for (index, request) in self.requests.iter().enumerate() {
                state.record(
                    index,
                    InstallResult::failed(
                        package_for(request),
                        InstallerError::UnsupportedPlatform(platform.clone()),
                    ),
                );
            }
            drop(state);
            return Ok(self.finish());
        };

        if mode == Mode::Parallel && !backend.supports_concurrent() {
            return Err(InstallerError::ConcurrencyUnsupported {
                backend: backend.name().to_string(),
            });
        }

        log::info!(
            "{} 批次开始: {} 个请求, 模式 {:?}, 后端 {}",
            self.operation.verb(),
            total,
            mode,
            backend.name()
        );

        match mode {
            Mode::Sequential => {
                for (index, request) in self.requests.iter().enumerate() {
                    let result =
                        execute(backend.clone(), self.operation, request.clone(), index, self.state.clone())
                            .await;
                    lock(&self.state).record(index, result);
                }
            }
            Mode::Parallel => self.run_parallel(backend).await,
        }

        let report = self.finish();
        log::info!(
            "{} 批次结束: 成功 {}, 失败 {}, 跳过 {}",
            self.operation.verb(),
            report.summary.success,
            report.summary.failed,
            report.summary.skipped
        );
        Ok(report)
    }

    async fn run_parallel(&self, backend: Arc<dyn Backend>) {
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut handles = Vec::with_capacity(self.requests.len());

        for (index, request) in self.requests.iter().enumerate() {
            let semaphore = semaphore.clone();
            let backend = backend.clone();
            let state = self.state.clone();
            let request = request.clone();
            let operation = self.operation;

            handles.push((
                index,
                tokio::spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => execute(backend, operation, request, index, state.clone()).await,
                        Err(_) => InstallResult::failed(
                            package_for(&request),
                            InstallerError::UnexpectedFault("worker pool closed".to_string()),
                        ),
                    };
                    lock(&state).record(index, result);
                }),
            ));
        }

        // 等待全部任务结束
        for (index, handle) in handles {
            if let Err(e) = handle.await {
                log::warn!("工作任务 {} 异常退出: {}", index, e);
                let request = &self.requests[index];
                lock(&self.state).record(
                    index,
                    InstallResult::failed(package_for(request), InstallerError::UnexpectedFault(e.to_string())),
                );
            }
        }
    }

    /// 汇总结果；任何意外空槽位都补为 Failed，保证一请求一结果
    fn finish(&self) -> BatchReport {
        let slots = lock(&self.state).results.clone();
        let mut summary = Summary::default();
        let results: Vec<InstallResult> = slots
            .into_iter()
            .zip(&self.requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    InstallResult::failed(
                        package_for(request),
                        InstallerError::UnexpectedFault("no result recorded".to_string()),
                    )
                })
            })
            .inspect(|r| summary.count(r.status()))
            .collect();
        BatchReport { results, summary }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        lock(&self.state).finished = true;
    }
}

fn package_for(request: &InstallRequest) -> PackageInfo {
    PackageInfo {
        name: request.name.clone(),
        id: request.package_id().to_string(),
        ..PackageInfo::default()
    }
}

/// 在阻塞线程池中执行一次后端调用，panic 转换为 Failed 结果
async fn execute(
    backend: Arc<dyn Backend>,
    operation: Operation,
    request: InstallRequest,
    index: usize,
    state: Arc<Mutex<BatchState>>,
) -> InstallResult {
    let package = package_for(&request);
    if package.id.is_empty() {
        return InstallResult::failed(package, InstallerError::MissingPackageId(request.name));
    }

    lock(&state).mark_running(index);

    let id = package.id.clone();
    let joined = tokio::task::spawn_blocking(move || match operation {
        Operation::Install => backend.install(&id),
        Operation::Uninstall => backend.uninstall(&id),
    })
    .await;

    match joined {
        Ok(mut result) => {
            if !request.name.is_empty() && result.package.name == result.package.id {
                result.package.name = request.name;
            }
            result
        }
        Err(e) => {
            let reason = panic_message(e);
            log::warn!("{} {} 工作线程异常: {}", operation.verb(), package.id, reason);
            InstallResult::failed(package, InstallerError::UnexpectedFault(reason))
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}
