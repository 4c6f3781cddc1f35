#[cfg(feature = "cli")]
use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
}

/// 每個 job 的耗時，以及（啟用時）行程 CPU / 記憶體用量
#[cfg(feature = "cli")]
pub struct JobMonitor {
    system: Option<Mutex<(System, Pid)>>,
    peak_memory_mb: Mutex<u64>,
}

#[cfg(feature = "cli")]
impl JobMonitor {
    pub fn new(enabled: bool) -> Self {
        let system = if enabled {
            match sysinfo::get_current_pid() {
                Ok(pid) => {
                    let mut system = System::new_with_specifics(RefreshKind::everything());
                    system.refresh_all();
                    Some(Mutex::new((system, pid)))
                }
                Err(e) => {
                    tracing::warn!("⚠️ Process monitoring unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            system,
            peak_memory_mb: Mutex::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.system.is_some()
    }

    pub fn sample(&self) -> Option<ProcessStats> {
        let mut guard = self.system.as_ref()?.lock().ok()?;
        let (system, pid) = &mut *guard;
        system.refresh_all();
        let process = system.process(*pid)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory_mb.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: *peak,
        })
    }

    pub fn start(&self) -> JobTimer {
        JobTimer {
            started: Instant::now(),
        }
    }

    pub fn finish(&self, job_id: &str, timer: JobTimer, succeeded: bool) -> Duration {
        let elapsed = timer.started.elapsed();
        let status = if succeeded { "✅" } else { "❌" };
        match self.sample() {
            Some(stats) => tracing::info!(
                "📊 {} job {} - {:?}, CPU: {:.1}%, Memory: {}MB, Peak: {}MB",
                status,
                job_id,
                elapsed,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb
            ),
            None => tracing::info!("📊 {} job {} - {:?}", status, job_id, elapsed),
        }
        elapsed
    }
}

// 非 CLI 建置（例如 lambda）只記錄耗時
#[cfg(not(feature = "cli"))]
pub struct JobMonitor;

#[cfg(not(feature = "cli"))]
impl JobMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn sample(&self) -> Option<ProcessStats> {
        None
    }

    pub fn start(&self) -> JobTimer {
        JobTimer {
            started: Instant::now(),
        }
    }

    pub fn finish(&self, job_id: &str, timer: JobTimer, succeeded: bool) -> Duration {
        let elapsed = timer.started.elapsed();
        tracing::info!(
            "📊 {} job {} - {:?}",
            if succeeded { "✅" } else { "❌" },
            job_id,
            elapsed
        );
        elapsed
    }
}

impl Default for JobMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

pub struct JobTimer {
    started: Instant,
}
