//! Lazy-SMP worker pool.
//!
//! Helper threads are spawned on the first multi-threaded search and kept
//! alive across searches, parking on a condition variable between tasks.
//! Each thread owns its history/correction/node-cache tables; only the
//! transposition table is shared, which is all the coordination lazy SMP
//! needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use super::worker::{ThreadTables, WorkerResult};

type Task = Box<dyn FnOnce(&mut ThreadTables) -> WorkerResult + Send + 'static>;

/// Deep recursion plus per-ply state wants a roomy stack.
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

#[derive(Default)]
struct SlotState {
    pending: Option<Task>,
    result: Option<WorkerResult>,
}

struct SlotShared {
    state: Mutex<SlotState>,
    new_task: Condvar,
    task_finished: Condvar,
    stop_thread: AtomicBool,
}

struct Slot {
    shared: Arc<SlotShared>,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct WorkerPool {
    slots: Vec<Slot>,
}

impl WorkerPool {
    #[must_use]
    pub fn new() -> Self {
        WorkerPool { slots: Vec::new() }
    }

    /// Grow the pool to `count` helper threads (never shrinks).
    pub fn ensure_threads(&mut self, count: usize) {
        while self.slots.len() < count {
            let index = self.slots.len();
            let shared = Arc::new(SlotShared {
                state: Mutex::new(SlotState::default()),
                new_task: Condvar::new(),
                task_finished: Condvar::new(),
                stop_thread: AtomicBool::new(false),
            });

            let thread_shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("search-{}", index + 1))
                .stack_size(SEARCH_STACK_SIZE)
                .spawn(move || worker_loop(&thread_shared))
                .expect("failed to spawn search worker");

            log::trace!("spawned search worker {}", index + 1);
            self.slots.push(Slot {
                shared,
                handle: Some(handle),
            });
        }
    }

    /// Hand a task to helper `index`; it starts immediately.
    pub fn dispatch(&self, index: usize, task: Task) {
        let shared = &self.slots[index].shared;
        let mut state = shared.state.lock();
        debug_assert!(state.pending.is_none());
        state.result = None;
        state.pending = Some(task);
        shared.new_task.notify_one();
    }

    /// Wait for the first `count` helpers and return their results.
    pub fn collect(&self, count: usize) -> Vec<WorkerResult> {
        let mut results = Vec::with_capacity(count);
        for slot in self.slots.iter().take(count) {
            let mut state = slot.shared.state.lock();
            while state.result.is_none() {
                slot.shared.task_finished.wait(&mut state);
            }
            if let Some(result) = state.result.take() {
                results.push(result);
            }
        }
        results
    }

    /// Reset every helper's per-thread tables (UCI `Clear Hash` path).
    pub fn clear_tables(&self) {
        for index in 0..self.slots.len() {
            self.dispatch(
                index,
                Box::new(|tables| {
                    *tables = ThreadTables::new();
                    WorkerResult {
                        lines: Vec::new(),
                        depth_completed: 0,
                        nodes: 0,
                    }
                }),
            );
        }
        let _ = self.collect(self.slots.len());
    }
}

fn worker_loop(shared: &SlotShared) {
    let mut tables = ThreadTables::new();
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.pending.take() {
                    break task;
                }
                if shared.stop_thread.load(Ordering::Acquire) {
                    return;
                }
                shared.new_task.wait(&mut state);
            }
        };

        let result = task(&mut tables);

        let mut state = shared.state.lock();
        state.result = Some(result);
        shared.task_finished.notify_all();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.shared.stop_thread.store(true, Ordering::Release);
            slot.shared.new_task.notify_all();
        }
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_result(depth: u32) -> WorkerResult {
        WorkerResult {
            lines: Vec::new(),
            depth_completed: depth,
            nodes: 0,
        }
    }

    #[test]
    fn test_dispatch_and_collect() {
        let mut pool = WorkerPool::new();
        pool.ensure_threads(2);
        pool.dispatch(0, Box::new(|_| dummy_result(1)));
        pool.dispatch(1, Box::new(|_| dummy_result(2)));
        let results = pool.collect(2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].depth_completed, 1);
        assert_eq!(results[1].depth_completed, 2);
    }

    #[test]
    fn test_threads_survive_across_tasks() {
        let mut pool = WorkerPool::new();
        pool.ensure_threads(1);
        for round in 0..3 {
            pool.dispatch(0, Box::new(move |_| dummy_result(round)));
            let results = pool.collect(1);
            assert_eq!(results[0].depth_completed, round);
        }
    }

    #[test]
    fn test_tables_persist_between_tasks() {
        use crate::board::{Move, Piece, Square};
        use crate::search::history::HistoryContext;

        let mut pool = WorkerPool::new();
        pool.ensure_threads(1);
        let mv = Move::quiet(Square::from_index(8), Square::from_index(16));

        pool.dispatch(
            0,
            Box::new(move |tables| {
                let ctx = HistoryContext {
                    stm_white: true,
                    ..Default::default()
                };
                tables
                    .orderer
                    .update_quiet_histories(&ctx, 1, &[(mv, Piece::Pawn)], mv, 8);
                dummy_result(0)
            }),
        );
        let _ = pool.collect(1);

        pool.dispatch(
            0,
            Box::new(move |tables| {
                let ctx = HistoryContext {
                    stm_white: true,
                    ..Default::default()
                };
                let score = tables.orderer.stat_score(&ctx, mv, Piece::Pawn);
                dummy_result(u32::from(score > 0))
            }),
        );
        let results = pool.collect(1);
        assert_eq!(results[0].depth_completed, 1);
    }

    #[test]
    fn test_drop_shuts_down_threads() {
        let mut pool = WorkerPool::new();
        pool.ensure_threads(2);
        drop(pool);
        // reaching here without hanging is the assertion
    }
}
