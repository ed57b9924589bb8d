//! State machine stress tests

use evcast_core::lifecycle::{Settle, StageState, StateCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const CONTENDERS: usize = 16;

#[test]
fn test_stop_runs_terminal_action_exactly_once() {
    for _ in 0..200 {
        let cell = Arc::new(StateCell::new("stress"));
        assert!(cell.try_activate());

        let barrier = Arc::new(Barrier::new(CONTENDERS));
        let signaled = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let terminal_runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..CONTENDERS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                let signaled = Arc::clone(&signaled);
                let finished = Arc::clone(&finished);
                let terminal_runs = Arc::clone(&terminal_runs);
                thread::spawn(move || {
                    barrier.wait();
                    if cell.signal_stop().is_some() {
                        signaled.fetch_add(1, Ordering::AcqRel);
                    }
                    let won = cell.try_finish_stop(|| {
                        assert!(cell.is(StageState::Stopping));
                        terminal_runs.fetch_add(1, Ordering::AcqRel);
                    });
                    if won {
                        finished.fetch_add(1, Ordering::AcqRel);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(signaled.load(Ordering::Acquire), 1);
        assert_eq!(finished.load(Ordering::Acquire), 1);
        assert_eq!(terminal_runs.load(Ordering::Acquire), 1);
        assert!(cell.is(StageState::Stopped));
    }
}

#[test]
fn test_activation_races_have_one_winner() {
    for _ in 0..200 {
        let cell = Arc::new(StateCell::new("activate"));
        let barrier = Arc::new(Barrier::new(CONTENDERS));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..CONTENDERS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    if cell.try_activate() {
                        winners.fetch_add(1, Ordering::AcqRel);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::Acquire), 1);
        assert!(cell.is(StageState::Active));
    }
}

#[test]
fn test_stop_during_suspend_cycle_is_observed() {
    let cell = Arc::new(StateCell::new("cycle"));
    assert!(cell.try_activate());

    let worker_cell = Arc::clone(&cell);
    let worker = thread::spawn(move || loop {
        match worker_cell.settle_idle(|| false) {
            Settle::Stop => return,
            Settle::Idle => {
                while !worker_cell.try_activate() {
                    if worker_cell.current().is_stopping() {
                        return;
                    }
                    thread::yield_now();
                }
            }
            Settle::Resume => {}
        }
    });

    thread::sleep(Duration::from_millis(20));
    assert!(cell.signal_stop().is_some());
    worker.join().unwrap();

    assert!(cell.try_finish_stop(|| {}));
    assert!(cell.wait_for_timeout(StageState::Stopped, Duration::from_secs(1)));
}
