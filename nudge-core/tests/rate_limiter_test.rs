//! Integration tests for RateLimiter window enforcement and admission order

use nudge_core::gateway::RateLimiter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Largest number of admissions inside any half-open window of `span`.
fn max_in_window(admissions: &[Instant], span: Duration) -> usize {
    admissions
        .iter()
        .map(|&start| {
            admissions
                .iter()
                .filter(|&&t| t >= start && t < start + span)
                .count()
        })
        .max()
        .unwrap_or(0)
}

#[tokio::test(start_paused = true)]
async fn test_randomized_timings_never_exceed_either_window() {
    for seed in [7_u64, 42, 1234] {
        let mut rng = StdRng::seed_from_u64(seed);
        let limiter = RateLimiter::new(10, 3).unwrap();
        let mut admissions = Vec::new();

        for _ in 0..40 {
            let gap = rng.random_range(0..400);
            tokio::time::sleep(Duration::from_millis(gap)).await;
            limiter.throttle().await;
            admissions.push(Instant::now());
        }

        assert!(
            max_in_window(&admissions, Duration::from_secs(1)) <= 3,
            "burst window exceeded for seed {}",
            seed
        );
        assert!(
            max_in_window(&admissions, Duration::from_secs(60)) <= 10,
            "minute window exceeded for seed {}",
            seed
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_stay_within_burst() {
    let limiter = Arc::new(RateLimiter::new(100, 2).unwrap());
    let admissions = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let admissions = Arc::clone(&admissions);
            tokio::spawn(async move {
                limiter.throttle().await;
                admissions.lock().unwrap().push(Instant::now());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let admissions = admissions.lock().unwrap().clone();
    assert_eq!(admissions.len(), 8);
    assert!(max_in_window(&admissions, Duration::from_secs(1)) <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_callers_are_admitted_in_arrival_order() {
    let limiter = Arc::new(RateLimiter::new(100, 2).unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..6)
        .map(|index| {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                limiter.throttle().await;
                order.lock().unwrap().push(index);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_third_call_in_burst_waits_out_the_window() {
    let limiter = RateLimiter::new(20, 2).unwrap();
    let start = Instant::now();
    for _ in 0..2 {
        limiter.throttle().await;
    }
    limiter.throttle().await;
    let waited = start.elapsed();
    // 1s window plus the 100ms safety margin
    assert!(waited >= Duration::from_millis(1100));
    assert!(waited < Duration::from_millis(1200));
}
