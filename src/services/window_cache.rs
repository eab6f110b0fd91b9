use crate::error::Result;
use crate::events::{MonitorHandle, MonitorInfo, WindowHandle, WindowRecord};
use crate::platform::{is_system_window, NativePlatform};
use crate::utils::process_name;
use crate::{debug_if_enabled, trace_if_enabled};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Время, в течение которого снимок считается свежим
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(2);

/// Одно поколение снимка: все подходящие окна верхнего уровня в Z-порядке
#[derive(Debug)]
pub struct WindowSnapshot {
    pub generation: u64,
    pub captured_at: Option<Instant>,
    pub windows: Vec<Arc<WindowRecord>>,
}

impl WindowSnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            captured_at: None,
            windows: Vec::new(),
        }
    }

    pub fn get(&self, handle: WindowHandle) -> Option<&Arc<WindowRecord>> {
        self.windows.iter().find(|w| w.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

struct CacheState {
    snapshot: Arc<WindowSnapshot>,
    last_refresh: Option<Instant>,
}

/// Кэш снимков окон верхнего уровня.
///
/// Каждое обновление - полный проход перечисления, результат которого целиком
/// заменяет предыдущее поколение. Читатели получают `Arc` на неизменяемое
/// поколение и никогда не видят наполовину построенный снимок.
pub struct WindowSnapshotCache {
    platform: Arc<dyn NativePlatform>,
    staleness: Duration,
    state: Mutex<CacheState>,
    // Имена процессов по pid: без TTL, записи живут пока pid встречается в снимках
    process_names: DashMap<u32, String>,
}

impl WindowSnapshotCache {
    pub fn new(platform: Arc<dyn NativePlatform>) -> Self {
        Self::with_staleness(platform, DEFAULT_STALENESS)
    }

    pub fn with_staleness(platform: Arc<dyn NativePlatform>, staleness: Duration) -> Self {
        Self {
            platform,
            staleness,
            state: Mutex::new(CacheState {
                snapshot: Arc::new(WindowSnapshot::empty()),
                last_refresh: None,
            }),
            process_names: DashMap::new(),
        }
    }

    /// Текущее поколение; устаревший снимок перестраивается перед возвратом
    pub fn snapshot(&self) -> Arc<WindowSnapshot> {
        let mut state = self.state.lock();
        if self.is_stale(state.last_refresh) {
            self.refresh_locked(&mut state);
        }
        Arc::clone(&state.snapshot)
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().snapshot.generation
    }

    pub fn get_windows(&self) -> Vec<Arc<WindowRecord>> {
        self.snapshot().windows.clone()
    }

    pub fn get_windows_on_monitor(
        &self,
        monitor: MonitorHandle,
        exclude: Option<WindowHandle>,
    ) -> Vec<Arc<WindowRecord>> {
        self.snapshot()
            .windows
            .iter()
            .filter(|w| w.monitor == monitor && Some(w.handle) != exclude)
            .cloned()
            .collect()
    }

    pub fn get_windows_by_process(&self, name: &str) -> Vec<Arc<WindowRecord>> {
        let name = process_name::normalize(name);
        if name.is_empty() {
            return Vec::new();
        }

        self.snapshot()
            .windows
            .iter()
            .filter(|w| w.process_name == name)
            .cloned()
            .collect()
    }

    /// Первое в Z-порядке развернутое окно целевого процесса, покрывающее рабочую область своего монитора
    pub fn find_fullscreen_window(&self, target_processes: &[String]) -> Option<Arc<WindowRecord>> {
        if target_processes.is_empty() {
            return None;
        }

        let snapshot = self.snapshot();
        let mut monitors: HashMap<MonitorHandle, Option<MonitorInfo>> = HashMap::new();

        for record in &snapshot.windows {
            if !record.is_valid() || !record.is_maximized() {
                continue;
            }

            if !target_processes.iter().any(|t| *t == record.process_name) {
                continue;
            }

            let monitor_info = *monitors.entry(record.monitor).or_insert_with(|| {
                match self.platform.get_monitor_info(record.monitor) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        trace_if_enabled!("Не удалось получить данные монитора {}: {}", record.monitor, e);
                        None
                    }
                }
            });

            let Some(monitor_info) = monitor_info else {
                continue;
            };

            if record.is_full_screen(&monitor_info) {
                return Some(Arc::clone(record));
            }
        }

        None
    }

    /// Имя процесса, владеющего окном; окно может отсутствовать в снимке (например, свежее foreground-окно)
    pub fn resolve_process_name(&self, window: WindowHandle) -> Option<String> {
        if let Some(record) = self.snapshot().get(window) {
            return Some(record.process_name.clone());
        }

        let process_id = self.platform.get_window_process_id(window).ok()?;
        self.process_name(process_id)
    }

    /// Отсортированные имена процессов, у которых есть подходящие окна
    pub fn process_names_with_windows(&self) -> Vec<String> {
        self.snapshot()
            .windows
            .iter()
            .map(|w| w.process_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn force_refresh(&self) {
        let mut state = self.state.lock();
        self.refresh_locked(&mut state);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.snapshot = Arc::new(WindowSnapshot::empty());
        state.last_refresh = None;
        self.process_names.clear();
        info!("Кэш окон очищен");
    }

    fn is_stale(&self, last_refresh: Option<Instant>) -> bool {
        match last_refresh {
            Some(at) => at.elapsed() > self.staleness,
            None => true,
        }
    }

    fn refresh_locked(&self, state: &mut CacheState) {
        let handles = match self.platform.enumerate_top_level_windows() {
            Ok(handles) => handles,
            Err(e) => {
                // Отметка времени не сдвигается: следующий запрос попробует снова
                warn!(
                    "Не удалось перечислить окна: {}. Используется предыдущий снимок (поколение {})",
                    e, state.snapshot.generation
                );
                return;
            }
        };

        let captured_at = Instant::now();
        let mut windows = Vec::with_capacity(handles.len());
        let mut failed = 0usize;

        for handle in handles {
            match self.build_record(handle, captured_at) {
                Ok(Some(record)) => windows.push(Arc::new(record)),
                Ok(None) => {}
                Err(e) => {
                    failed += 1;
                    trace_if_enabled!("Окно {} пропущено: {}", handle, e);
                }
            }
        }

        let live_pids: HashSet<u32> = windows.iter().map(|w| w.process_id).collect();
        self.process_names.retain(|pid, _| live_pids.contains(pid));

        let generation = state.snapshot.generation + 1;
        debug_if_enabled!(
            "Кэш окон обновлён: поколение {}, окон {}, ошибок {}",
            generation,
            windows.len(),
            failed
        );

        state.snapshot = Arc::new(WindowSnapshot {
            generation,
            captured_at: Some(captured_at),
            windows,
        });
        state.last_refresh = Some(captured_at);
    }

    fn build_record(&self, handle: WindowHandle, captured_at: Instant) -> Result<Option<WindowRecord>> {
        if !self.platform.is_window_visible(handle) {
            return Ok(None);
        }

        if is_system_window(self.platform.as_ref(), handle)? {
            return Ok(None);
        }

        let process_id = self.platform.get_window_process_id(handle)?;
        let Some(process_name) = self.process_name(process_id) else {
            return Ok(None);
        };

        let show_state = self.platform.get_window_placement(handle)?;
        let bounds = self.platform.get_window_rect(handle)?;
        let monitor = self.platform.monitor_from_window(handle)?;
        let title = self.platform.get_window_title(handle)?;

        Ok(Some(WindowRecord {
            handle,
            process_id,
            process_name,
            title,
            show_state,
            monitor,
            bounds,
            visible: true,
            is_system_window: false,
            captured_at,
        }))
    }

    fn process_name(&self, process_id: u32) -> Option<String> {
        if let Some(name) = self.process_names.get(&process_id) {
            return Some(name.value().clone());
        }

        match self.platform.get_process_image_name(process_id) {
            Ok(path) => {
                let name = process_name::from_image_path(&path);
                if name.is_empty() {
                    return None;
                }
                self.process_names.insert(process_id, name.clone());
                Some(name)
            }
            Err(e) => {
                trace_if_enabled!("Имя процесса {} недоступно: {}", process_id, e);
                None
            }
        }
    }
}
